//! Owner of the per-category state map.
//!
//! All mutation happens through [`TweakOrchestrator::dispatch`], which the service
//! worker calls one action at a time. Starts are optimistic: a category is marked
//! `Running` as soon as its detached launch has been issued, and only the next
//! [`TweakOrchestrator::reconcile`] can correct that belief. The persisted mirror is
//! written through on every settled transition and never read back except in
//! [`TweakOrchestrator::new`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::app::config::TweakSettings;
use crate::app::error::AppError;
use crate::app::models::{TweakEmitter, TweakEvent, TweakEventKind, TweakStatesView};
use crate::app::prefs::PrefsStore;
use crate::app::root::runner::{MountNamespace, RootExecutor};
use crate::app::tweaks::action::{LedColor, TweakAction, TweakParams};
use crate::app::tweaks::category::{CategoryState, TweakCategory};
use crate::app::tweaks::scripts::{
    app_interceptor_script, chmod_command, cpu_min_freq_script, custom_led_script,
    gpu_max_freq_script, gpu_max_reset_command, gpu_min_freq_script, kill_command,
    launch_command, power_led_script, rainbow_led_script, usb_interceptor_script, LEDS_OFF,
};
use crate::app::tweaks::status::{
    build_status_command, parse_status_output, ReconcileSnapshot, SystemStates,
};
use crate::app::tweaks::system;

pub const LED_RED_KEY: &str = "led_red";
pub const LED_GREEN_KEY: &str = "led_green";
pub const LED_BLUE_KEY: &str = "led_blue";
pub const GPU_MAX_SELECTION_KEY: &str = "gpu_max_freq_selection";
pub const WIRELESS_ADB_RUNNING_KEY: &str = "wireless_adb_is_running";

/// Whether the worker should keep consuming actions after a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerLifecycle {
    Continue,
    Shutdown,
}

pub struct TweakOrchestrator {
    executor: Arc<dyn RootExecutor>,
    prefs: PrefsStore,
    scripts_dir: PathBuf,
    settings: TweakSettings,
    emitter: TweakEmitter,
    states: BTreeMap<TweakCategory, CategoryState>,
    system: SystemStates,
    last_reconciled_at: Option<DateTime<Utc>>,
}

impl TweakOrchestrator {
    /// Seeds beliefs from the mirror; callers reconcile right after.
    pub fn new(
        executor: Arc<dyn RootExecutor>,
        prefs: PrefsStore,
        scripts_dir: impl Into<PathBuf>,
        settings: TweakSettings,
        emitter: TweakEmitter,
    ) -> Self {
        let states = TweakCategory::ALL
            .into_iter()
            .map(|category| {
                let believed = prefs.get_bool(category.running_key(), false);
                (category, CategoryState::from_liveness(believed))
            })
            .collect();
        Self {
            executor,
            prefs,
            scripts_dir: scripts_dir.into(),
            settings,
            emitter,
            states,
            system: SystemStates::default(),
            last_reconciled_at: None,
        }
    }

    pub fn state(&self, category: TweakCategory) -> CategoryState {
        self.states.get(&category).copied().unwrap_or_default()
    }

    pub fn any_active(&self) -> bool {
        self.states.values().any(|state| state.is_active())
    }

    pub fn last_reconciled_at(&self) -> Option<DateTime<Utc>> {
        self.last_reconciled_at
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    pub fn states_view(&self) -> TweakStatesView {
        TweakStatesView {
            categories: self.states.clone(),
            system: self.system.clone(),
            last_reconciled_at: self.last_reconciled_at,
        }
    }

    pub fn dispatch(&mut self, action: TweakAction, trace_id: &str) -> WorkerLifecycle {
        info!(trace_id = %trace_id, action = %action, "dispatching tweak action");
        match action {
            TweakAction::StopAll => {
                self.stop_all(trace_id);
                self.emit(TweakEventKind::TweaksStopped, trace_id);
                return WorkerLifecycle::Shutdown;
            }
            TweakAction::Start { category, params } => self.start(category, &params, trace_id),
            TweakAction::Stop(category) => self.stop(category, trace_id),
            TweakAction::Refresh => {
                self.reconcile(trace_id);
            }
            TweakAction::StartWirelessAdb => self.set_wireless_adb(true, trace_id),
            TweakAction::StopWirelessAdb => self.set_wireless_adb(false, trace_id),
            TweakAction::ApplyPassthroughFix => {
                if let Err(err) = system::apply_passthrough_fix(self.executor.as_ref(), trace_id) {
                    warn!(trace_id = %trace_id, error = %err, "passthrough fix failed");
                }
            }
        }
        self.emit(TweakEventKind::State, trace_id);
        if self.any_active() {
            WorkerLifecycle::Continue
        } else {
            debug!(trace_id = %trace_id, "no tweak active, worker can stop");
            WorkerLifecycle::Shutdown
        }
    }

    /// Refreshes beliefs from one batched status read. Fields it could not answer
    /// keep their previous value; on executor failure nothing changes.
    pub fn reconcile(&mut self, trace_id: &str) -> Option<ReconcileSnapshot> {
        let output = match self
            .executor
            .run(&build_status_command(), MountNamespace::Global, trace_id)
        {
            Ok(output) => output,
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "status read failed, keeping previous state");
                return None;
            }
        };
        let snapshot = parse_status_output(&output.stdout, Utc::now());
        if snapshot.categories.is_empty() {
            warn!(trace_id = %trace_id, "status read returned no process table");
        }

        let mut mirror = Vec::new();
        for (&category, &alive) in &snapshot.categories {
            let observed = CategoryState::from_liveness(alive);
            let previous = self.state(category);
            if previous != observed {
                info!(
                    trace_id = %trace_id,
                    category = %category,
                    previous = ?previous,
                    observed = ?observed,
                    "reconciliation corrected category state"
                );
            }
            self.states.insert(category, observed);
            mirror.push((category.running_key(), alive));
        }
        self.write_mirror(&mirror, trace_id);
        self.merge_system(&snapshot.system);
        self.last_reconciled_at = Some(snapshot.taken_at);
        Some(snapshot)
    }

    fn merge_system(&mut self, observed: &SystemStates) {
        let current = &mut self.system;
        if observed.root_blocker_enabled.is_some() {
            current.root_blocker_enabled = observed.root_blocker_enabled;
        }
        if observed.cpu_performance_mode.is_some() {
            current.cpu_performance_mode = observed.cpu_performance_mode;
        }
        if observed.wireless_adb_enabled.is_some() {
            current.wireless_adb_enabled = observed.wireless_adb_enabled;
        }
        if observed.update_folders_locked.is_some() {
            current.update_folders_locked = observed.update_folders_locked;
        }
        for (key, value) in &observed.shell_preferences {
            current.shell_preferences.insert(key.clone(), value.clone());
        }
    }

    fn start(&mut self, category: TweakCategory, params: &TweakParams, trace_id: &str) {
        if category.is_led() {
            // Two LED scripts writing the same nodes race; clear all of them first,
            // including a previous instance of this one.
            self.stop_leds(trace_id);
        } else {
            self.run_quiet(&kill_command(category), trace_id);
        }

        let content = self.render_script(category, params, trace_id);
        let script_path = match self.write_script(category, &content, trace_id) {
            Ok(path) => path,
            Err(err) => {
                warn!(trace_id = %trace_id, category = %category, error = %err, "failed to write script");
                self.settle(category, CategoryState::Stopped, trace_id);
                return;
            }
        };
        self.states.insert(category, CategoryState::Starting);

        let script_path = script_path.to_string_lossy().to_string();
        self.run_quiet(&chmod_command(&script_path), trace_id);
        match self
            .executor
            .run(&launch_command(&script_path), MountNamespace::Private, trace_id)
        {
            Ok(_) => {
                info!(trace_id = %trace_id, category = %category, script = %script_path, "launched tweak script");
                self.settle(category, CategoryState::Running, trace_id);
            }
            Err(err) => {
                warn!(trace_id = %trace_id, category = %category, error = %err, "failed to launch tweak script");
                self.settle(category, CategoryState::Stopped, trace_id);
            }
        }
    }

    fn stop(&mut self, category: TweakCategory, trace_id: &str) {
        self.states.insert(category, CategoryState::Stopping);
        self.run_quiet(&kill_command(category), trace_id);
        match category {
            TweakCategory::RainbowLed | TweakCategory::CustomLed | TweakCategory::PowerLed => {
                self.run_quiet(LEDS_OFF, trace_id);
            }
            TweakCategory::MaxFreqGpuLock => {
                let reset = gpu_max_reset_command(&self.settings.gpu_max_reset_hz);
                self.run_quiet(&reset, trace_id);
            }
            _ => {}
        }
        self.settle(category, CategoryState::Stopped, trace_id);
    }

    fn stop_leds(&mut self, trace_id: &str) {
        for category in TweakCategory::LEDS {
            if self.state(category).is_active() {
                self.states.insert(category, CategoryState::Stopping);
            }
            self.run_quiet(&kill_command(category), trace_id);
        }
        self.run_quiet(LEDS_OFF, trace_id);
        let mirror = TweakCategory::LEDS.map(|category| {
            self.states.insert(category, CategoryState::Stopped);
            (category.running_key(), false)
        });
        self.write_mirror(&mirror, trace_id);
    }

    /// Stops every category regardless of believed state.
    pub fn stop_all(&mut self, trace_id: &str) {
        self.stop_leds(trace_id);
        for category in TweakCategory::ALL.into_iter().filter(|c| !c.is_led()) {
            self.stop(category, trace_id);
        }
        info!(trace_id = %trace_id, "all tweaks stopped");
    }

    fn set_wireless_adb(&mut self, enabled: bool, trace_id: &str) {
        match system::set_wireless_adb(self.executor.as_ref(), enabled, trace_id) {
            Ok(verified) => {
                if !verified {
                    warn!(trace_id = %trace_id, enabled, "adb tcp port did not read back as requested");
                }
                let actual = enabled == verified;
                self.system.wireless_adb_enabled = Some(actual);
                self.write_mirror(&[(WIRELESS_ADB_RUNNING_KEY, actual)], trace_id);
            }
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "failed to toggle wireless adb");
            }
        }
    }

    fn render_script(
        &mut self,
        category: TweakCategory,
        params: &TweakParams,
        trace_id: &str,
    ) -> String {
        match category {
            TweakCategory::RainbowLed => rainbow_led_script(),
            TweakCategory::PowerLed => power_led_script(),
            TweakCategory::CustomLed => {
                let color = match params.color {
                    Some(color) => {
                        self.remember_color(color, trace_id);
                        color
                    }
                    None => self.persisted_color(),
                };
                custom_led_script(color)
            }
            TweakCategory::MinFreqCpuLock => cpu_min_freq_script(
                &self.settings.cpu_little_freq_khz,
                &self.settings.cpu_big_freq_khz,
            ),
            TweakCategory::MinFreqGpuLock => gpu_min_freq_script(&self.settings.gpu_min_freq_mhz),
            TweakCategory::MaxFreqGpuLock => {
                let selection = match params.gpu_max_freq_mhz.as_deref() {
                    Some(mhz) => {
                        if let Err(err) = self.prefs.put_string(GPU_MAX_SELECTION_KEY, mhz, trace_id) {
                            warn!(trace_id = %trace_id, error = %err, "failed to persist gpu max selection");
                        }
                        mhz.to_string()
                    }
                    None => self
                        .prefs
                        .get_string(GPU_MAX_SELECTION_KEY)
                        .unwrap_or_else(|| self.settings.gpu_max_freq_mhz.clone()),
                };
                gpu_max_freq_script(&selection, &self.settings.gpu_max_freq_mhz)
            }
            TweakCategory::AppLaunchInterceptor => app_interceptor_script(),
            TweakCategory::UsbNotificationInterceptor => usb_interceptor_script(),
        }
    }

    fn persisted_color(&self) -> LedColor {
        let channel = |key: &str| self.prefs.get_i64(key, 255).clamp(0, 255) as u8;
        LedColor {
            red: channel(LED_RED_KEY),
            green: channel(LED_GREEN_KEY),
            blue: channel(LED_BLUE_KEY),
        }
    }

    fn remember_color(&mut self, color: LedColor, trace_id: &str) {
        let channels = [
            (LED_RED_KEY, color.red),
            (LED_GREEN_KEY, color.green),
            (LED_BLUE_KEY, color.blue),
        ];
        for (key, value) in channels {
            if let Err(err) = self.prefs.put_i64(key, i64::from(value), trace_id) {
                warn!(trace_id = %trace_id, key, error = %err, "failed to persist led color");
            }
        }
    }

    /// Scripts are rewritten on every start, never diffed and never deleted.
    fn write_script(
        &self,
        category: TweakCategory,
        content: &str,
        trace_id: &str,
    ) -> Result<PathBuf, AppError> {
        fs::create_dir_all(&self.scripts_dir).map_err(|err| {
            AppError::system(format!("Failed to create script directory: {err}"), trace_id)
        })?;
        let path = self.scripts_dir.join(category.script_name());
        fs::write(&path, content)
            .map_err(|err| AppError::system(format!("Failed to write script: {err}"), trace_id))?;
        Ok(path)
    }

    fn settle(&mut self, category: TweakCategory, state: CategoryState, trace_id: &str) {
        self.states.insert(category, state);
        self.write_mirror(&[(category.running_key(), state.is_active())], trace_id);
    }

    fn write_mirror(&mut self, entries: &[(&str, bool)], trace_id: &str) {
        if entries.is_empty() {
            return;
        }
        if let Err(err) = self.prefs.put_bools(entries, trace_id) {
            warn!(trace_id = %trace_id, error = %err, "failed to update prefs mirror");
        }
    }

    /// Best-effort command: failures are logged and otherwise ignored.
    fn run_quiet(&self, command: &str, trace_id: &str) {
        if let Err(err) = self.executor.run(command, MountNamespace::Private, trace_id) {
            warn!(trace_id = %trace_id, command, error = %err, "root command failed");
        }
    }

    fn emit(&self, kind: TweakEventKind, trace_id: &str) {
        (self.emitter)(TweakEvent {
            kind,
            trace_id: trace_id.to_string(),
            states: self.states_view(),
        });
    }
}

#[cfg(test)]
mod tests;
