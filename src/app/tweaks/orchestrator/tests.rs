use super::*;

use std::sync::Mutex;

use crate::app::root::fake::FakeExecutor;

struct Harness {
    _dir: tempfile::TempDir,
    executor: Arc<FakeExecutor>,
    events: Arc<Mutex<Vec<TweakEvent>>>,
    orchestrator: TweakOrchestrator,
    prefs_path: PathBuf,
    scripts_dir: PathBuf,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let prefs_path = dir.path().join("prefs.json");
    let scripts_dir = dir.path().join("scripts");
    let executor = Arc::new(FakeExecutor::default());
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let emitter: TweakEmitter = Arc::new(move |event: TweakEvent| {
        sink.lock().expect("events").push(event);
    });
    let orchestrator = TweakOrchestrator::new(
        executor.clone(),
        PrefsStore::open(&prefs_path),
        &scripts_dir,
        TweakSettings::default(),
        emitter,
    );
    Harness {
        _dir: dir,
        executor,
        events,
        orchestrator,
        prefs_path,
        scripts_dir,
    }
}

impl Harness {
    fn stopped_events(&self) -> usize {
        self.events
            .lock()
            .expect("events")
            .iter()
            .filter(|event| event.kind == TweakEventKind::TweaksStopped)
            .count()
    }

    fn mirror(&self) -> PrefsStore {
        PrefsStore::open(&self.prefs_path)
    }
}

#[test]
fn led_mutual_exclusion_round_trip() {
    let mut h = harness();
    h.orchestrator
        .dispatch(TweakAction::start(TweakCategory::RainbowLed), "t1");
    assert_eq!(h.orchestrator.state(TweakCategory::RainbowLed), CategoryState::Running);

    h.executor.clear();
    h.orchestrator
        .dispatch(TweakAction::start(TweakCategory::CustomLed), "t2");
    assert_eq!(h.orchestrator.state(TweakCategory::RainbowLed), CategoryState::Stopped);
    assert_eq!(h.orchestrator.state(TweakCategory::CustomLed), CategoryState::Running);

    // The previous LED is killed and the nodes cleared before the new launch.
    let kill = h.executor.position(r"/rgb_led\.sh").expect("rgb kill");
    let off = h
        .executor
        .position("echo 0 > /sys/class/leds/red/brightness")
        .expect("leds off");
    let launch = h.executor.position("nohup").expect("launch");
    assert!(kill < off && off < launch);

    h.orchestrator
        .dispatch(TweakAction::start(TweakCategory::RainbowLed), "t3");
    assert_eq!(h.orchestrator.state(TweakCategory::CustomLed), CategoryState::Stopped);
    assert_eq!(h.orchestrator.state(TweakCategory::RainbowLed), CategoryState::Running);

    let mirror = h.mirror();
    assert!(mirror.get_bool("rgb_led_is_running", false));
    assert!(!mirror.get_bool("custom_led_is_running", true));
}

#[test]
fn led_start_leaves_independent_categories_alone() {
    let mut h = harness();
    h.orchestrator
        .dispatch(TweakAction::start(TweakCategory::MinFreqGpuLock), "t1");
    h.orchestrator
        .dispatch(TweakAction::start(TweakCategory::PowerLed), "t2");
    assert_eq!(
        h.orchestrator.state(TweakCategory::MinFreqGpuLock),
        CategoryState::Running
    );
    assert_eq!(h.orchestrator.state(TweakCategory::PowerLed), CategoryState::Running);
}

#[test]
fn stop_all_emits_exactly_one_notification_even_when_idle() {
    let mut h = harness();
    let lifecycle = h.orchestrator.dispatch(TweakAction::StopAll, "t1");
    assert_eq!(lifecycle, WorkerLifecycle::Shutdown);
    assert_eq!(h.stopped_events(), 1);
    for category in TweakCategory::ALL {
        assert_eq!(h.orchestrator.state(category), CategoryState::Stopped);
    }
}

#[test]
fn stop_all_drives_everything_to_stopped() {
    let mut h = harness();
    h.orchestrator
        .dispatch(TweakAction::start(TweakCategory::CustomLed), "t1");
    h.orchestrator
        .dispatch(TweakAction::start(TweakCategory::UsbNotificationInterceptor), "t2");
    h.orchestrator
        .dispatch(TweakAction::start(TweakCategory::MaxFreqGpuLock), "t3");
    h.executor.clear();

    let lifecycle = h.orchestrator.dispatch(TweakAction::StopAll, "t4");
    assert_eq!(lifecycle, WorkerLifecycle::Shutdown);
    assert!(!h.orchestrator.any_active());
    assert_eq!(h.stopped_events(), 1);
    for category in TweakCategory::ALL {
        assert!(h.executor.position(&kill_command(category)).is_some(), "{category}");
    }
    assert!(h.executor.position("echo '690000000' > ").is_some());

    let mirror = h.mirror();
    for category in TweakCategory::ALL {
        assert!(!mirror.get_bool(category.running_key(), true), "{category}");
    }
}

#[test]
fn min_freq_start_is_optimistic_until_reconciled() {
    let mut h = harness();
    let lifecycle = h
        .orchestrator
        .dispatch(TweakAction::start(TweakCategory::MinFreqCpuLock), "t1");
    assert_eq!(lifecycle, WorkerLifecycle::Continue);
    assert_eq!(
        h.orchestrator.state(TweakCategory::MinFreqCpuLock),
        CategoryState::Running
    );

    let script = fs::read_to_string(h.scripts_dir.join("min_freq_lock.sh")).expect("script");
    assert!(script.contains("while true"));
    assert!(script.contains("sleep 2"));
    assert_eq!(script.matches("scaling_min_freq").count(), 7);

    let launch = h
        .executor
        .batches()
        .into_iter()
        .find(|batch| batch.starts_with("nohup"))
        .expect("launch");
    assert!(launch.contains("min_freq_lock.sh"));
    assert!(launch.trim_end().ends_with('&'));
    let chmod = h.executor.position("chmod +x").expect("chmod");
    let launch_at = h.executor.position("nohup").expect("launch");
    assert!(chmod < launch_at);

    h.executor.set_processes(&[]);
    let snapshot = h.orchestrator.reconcile("t2").expect("snapshot");
    assert_eq!(snapshot.is_alive(TweakCategory::MinFreqCpuLock), Some(false));
    assert_eq!(
        h.orchestrator.state(TweakCategory::MinFreqCpuLock),
        CategoryState::Stopped
    );
    assert!(h.orchestrator.last_reconciled_at().is_some());
    assert!(!h.mirror().get_bool("min_freq_is_running", true));
}

#[test]
fn reconcile_corrects_drift_without_a_dispatch() {
    let mut h = harness();
    h.executor.set_processes(&["power_led.sh"]);
    h.orchestrator.reconcile("t1");
    assert_eq!(h.orchestrator.state(TweakCategory::PowerLed), CategoryState::Running);
    assert!(h.mirror().get_bool("power_led_is_running", false));

    h.executor.set_processes(&[]);
    h.orchestrator.reconcile("t2");
    assert_eq!(h.orchestrator.state(TweakCategory::PowerLed), CategoryState::Stopped);
}

#[test]
fn reconcile_reports_two_categories_independently() {
    let mut h = harness();
    h.executor
        .set_processes(&["usb_interceptor.sh", "gpu_max_freq_lock.sh"]);
    let snapshot = h.orchestrator.reconcile("t1").expect("snapshot");
    assert_eq!(
        snapshot.is_alive(TweakCategory::UsbNotificationInterceptor),
        Some(true)
    );
    assert_eq!(snapshot.is_alive(TweakCategory::MaxFreqGpuLock), Some(true));
    assert_eq!(
        snapshot.is_alive(TweakCategory::AppLaunchInterceptor),
        Some(false)
    );
    assert_eq!(
        h.orchestrator.state(TweakCategory::UsbNotificationInterceptor),
        CategoryState::Running
    );
    assert_eq!(
        h.orchestrator.state(TweakCategory::MaxFreqGpuLock),
        CategoryState::Running
    );
    assert_eq!(
        h.orchestrator.state(TweakCategory::MinFreqGpuLock),
        CategoryState::Stopped
    );
}

#[test]
fn failed_status_read_keeps_previous_beliefs() {
    let mut h = harness();
    h.orchestrator
        .dispatch(TweakAction::start(TweakCategory::AppLaunchInterceptor), "t1");
    h.executor.set_failing(true);
    assert!(h.orchestrator.reconcile("t2").is_none());
    assert_eq!(
        h.orchestrator.state(TweakCategory::AppLaunchInterceptor),
        CategoryState::Running
    );
    assert!(h.orchestrator.last_reconciled_at().is_none());
}

#[test]
fn launch_failure_settles_stopped_and_shuts_down() {
    let mut h = harness();
    h.executor.set_failing(true);
    let lifecycle = h
        .orchestrator
        .dispatch(TweakAction::start(TweakCategory::RainbowLed), "t1");
    assert_eq!(h.orchestrator.state(TweakCategory::RainbowLed), CategoryState::Stopped);
    assert_eq!(lifecycle, WorkerLifecycle::Shutdown);
}

#[test]
fn stopping_last_active_category_requests_shutdown() {
    let mut h = harness();
    h.orchestrator
        .dispatch(TweakAction::start(TweakCategory::MinFreqGpuLock), "t1");
    h.orchestrator
        .dispatch(TweakAction::start(TweakCategory::AppLaunchInterceptor), "t2");
    let lifecycle = h
        .orchestrator
        .dispatch(TweakAction::Stop(TweakCategory::MinFreqGpuLock), "t3");
    assert_eq!(lifecycle, WorkerLifecycle::Continue);
    let lifecycle = h
        .orchestrator
        .dispatch(TweakAction::Stop(TweakCategory::AppLaunchInterceptor), "t4");
    assert_eq!(lifecycle, WorkerLifecycle::Shutdown);
}

#[test]
fn stopping_app_interceptor_spares_usb_interceptor() {
    let mut h = harness();
    h.orchestrator
        .dispatch(TweakAction::Stop(TweakCategory::AppLaunchInterceptor), "t1");
    let batches = h.executor.batches();
    assert!(batches
        .iter()
        .any(|batch| batch == r"pkill -f '/interceptor\.sh' || true"));
    assert!(!batches.iter().any(|batch| batch.contains("usb_interceptor")));
}

#[test]
fn custom_led_params_fall_back_to_persisted_channels() {
    let mut h = harness();
    let params = TweakParams {
        color: Some(LedColor {
            red: 12,
            green: 34,
            blue: 56,
        }),
        gpu_max_freq_mhz: None,
    };
    h.orchestrator.dispatch(
        TweakAction::start(TweakCategory::CustomLed).with_params(params),
        "t1",
    );
    let mirror = h.mirror();
    assert_eq!(mirror.get_i64(LED_RED_KEY, 0), 12);
    assert_eq!(mirror.get_i64(LED_BLUE_KEY, 0), 56);

    h.orchestrator
        .dispatch(TweakAction::start(TweakCategory::CustomLed), "t2");
    let script = fs::read_to_string(h.scripts_dir.join("custom_led.sh")).expect("script");
    assert!(script.contains("echo 12 > \"$RED_LED\""));
    assert!(script.contains("echo 34 > \"$GREEN_LED\""));
}

#[test]
fn gpu_max_uses_explicit_then_persisted_selection() {
    let mut h = harness();
    h.orchestrator
        .dispatch(TweakAction::start(TweakCategory::MaxFreqGpuLock), "t1");
    let script = fs::read_to_string(h.scripts_dir.join("gpu_max_freq_lock.sh")).expect("script");
    assert!(script.contains("492000000"));

    let params = TweakParams {
        color: None,
        gpu_max_freq_mhz: Some("599".to_string()),
    };
    h.orchestrator.dispatch(
        TweakAction::start(TweakCategory::MaxFreqGpuLock).with_params(params),
        "t2",
    );
    h.orchestrator
        .dispatch(TweakAction::start(TweakCategory::MaxFreqGpuLock), "t3");
    let script = fs::read_to_string(h.scripts_dir.join("gpu_max_freq_lock.sh")).expect("script");
    assert!(script.contains("599000000"));
}

#[test]
fn cold_start_beliefs_come_from_mirror() {
    let dir = tempfile::tempdir().expect("tempdir");
    let prefs_path = dir.path().join("prefs.json");
    let mut prefs = PrefsStore::open(&prefs_path);
    prefs
        .put_bool("usb_interceptor_is_running", true, "seed")
        .expect("seed");
    let orchestrator = TweakOrchestrator::new(
        Arc::new(FakeExecutor::default()),
        PrefsStore::open(&prefs_path),
        dir.path().join("scripts"),
        TweakSettings::default(),
        crate::app::models::noop_tweak_emitter(),
    );
    assert_eq!(
        orchestrator.state(TweakCategory::UsbNotificationInterceptor),
        CategoryState::Running
    );
    assert!(orchestrator.last_reconciled_at().is_none());
}

#[test]
fn every_dispatch_emits_state() {
    let mut h = harness();
    h.orchestrator
        .dispatch(TweakAction::start(TweakCategory::PowerLed), "t1");
    h.orchestrator.dispatch(TweakAction::Refresh, "t2");
    let events = h.events.lock().expect("events");
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|event| event.kind == TweakEventKind::State));
    assert_eq!(events[0].trace_id, "t1");
    assert!(events[0].states.is_running(TweakCategory::PowerLed));
}
