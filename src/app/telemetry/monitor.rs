use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::app::error::AppError;
use crate::app::models::{TelemetryEmitter, TelemetrySnapshot};
use crate::app::root::runner::{MountNamespace, RootExecutor};
use crate::app::telemetry::parse::{
    build_telemetry_script, parse_core_totals, parse_cpu_telemetry, parse_gpu_telemetry,
    split_marked_sections, CoreTotals, MARK_PROC_STAT,
};

pub const MIN_POLL_INTERVAL_MS: u64 = 500;
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;

pub fn clamp_poll_interval_ms(interval_ms: u64) -> u64 {
    interval_ms.clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS)
}

/// Keeps the previous `/proc/stat` sample so usage can be derived from deltas.
#[derive(Debug, Default)]
pub struct TelemetrySampler {
    cores_prev: Option<CoreTotals>,
}

impl TelemetrySampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample(
        &mut self,
        executor: &dyn RootExecutor,
        trace_id: &str,
    ) -> Result<TelemetrySnapshot, AppError> {
        let output = executor.run(&build_telemetry_script(), MountNamespace::Private, trace_id)?;
        let sections = split_marked_sections(&output.stdout);
        let proc_stat = sections
            .get(MARK_PROC_STAT)
            .map(String::as_str)
            .unwrap_or("");
        let cores_curr = parse_core_totals(proc_stat);
        if cores_curr.is_empty() {
            return Err(AppError::system("Missing per-core lines in /proc/stat", trace_id));
        }

        let cpu = parse_cpu_telemetry(&sections, self.cores_prev.as_ref(), &cores_curr);
        let gpu = parse_gpu_telemetry(&sections);
        self.cores_prev = Some(cores_curr);

        Ok(TelemetrySnapshot {
            ts_ms: Utc::now().timestamp_millis(),
            cpu,
            gpu,
        })
    }
}

pub struct TelemetryMonitorHandle {
    stop_flag: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl TelemetryMonitorHandle {
    pub fn stop(self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        let _ = self.join.join();
    }

    /// Waits for a bounded monitor to take all of its samples.
    pub fn wait(self) {
        let _ = self.join.join();
    }
}

/// Polls telemetry until stopped, or until `max_samples` snapshots were emitted.
/// Failed samples are logged and skipped. Tweak state is never touched here.
pub fn start_telemetry_monitor(
    executor: Arc<dyn RootExecutor>,
    interval_ms: u64,
    max_samples: Option<usize>,
    emitter: TelemetryEmitter,
    trace_id: &str,
) -> TelemetryMonitorHandle {
    let interval = Duration::from_millis(clamp_poll_interval_ms(interval_ms));
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_spawn = Arc::clone(&stop_flag);
    let trace_spawn = trace_id.to_string();

    let join = std::thread::spawn(move || {
        let mut sampler = TelemetrySampler::new();
        let mut samples = 0usize;

        loop {
            if stop_spawn.load(Ordering::Relaxed) {
                break;
            }
            if max_samples.is_some_and(|max| samples >= max) {
                break;
            }

            let loop_started = Instant::now();
            match sampler.sample(executor.as_ref(), &trace_spawn) {
                Ok(snapshot) => {
                    emitter(snapshot);
                    samples += 1;
                }
                Err(err) => {
                    warn!(trace_id = %trace_spawn, error = %err, "telemetry sample failed");
                }
            }

            let elapsed = loop_started.elapsed();
            if elapsed < interval {
                sleep_with_stop(interval - elapsed, &stop_spawn);
            }
        }
        debug!(trace_id = %trace_spawn, samples, "telemetry monitor stopped");
    });

    TelemetryMonitorHandle { stop_flag, join }
}

fn sleep_with_stop(duration: Duration, stop_flag: &AtomicBool) {
    let mut remaining = duration;
    let chunk = Duration::from_millis(50);
    while remaining > Duration::from_millis(0) {
        if stop_flag.load(Ordering::Relaxed) {
            break;
        }
        let step = if remaining > chunk { chunk } else { remaining };
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::app::root::fake::FakeExecutor;
    use crate::app::telemetry::parse::{MARK_CPU_FREQ, MARK_GPU_MAX};

    fn telemetry_output(user: u64) -> String {
        format!(
            "{MARK_PROC_STAT}\ncpu0 {user} 0 0 100\ncpu4 0 0 0 100\n{MARK_CPU_FREQ}\n0 691200 1804800\n{MARK_GPU_MAX}\n492\n"
        )
    }

    #[test]
    fn sampler_needs_two_distinct_samples_for_usage() {
        let executor = FakeExecutor::default();
        executor.answer(MARK_PROC_STAT, &telemetry_output(0));
        let mut sampler = TelemetrySampler::new();

        let first = sampler.sample(&executor, "t1").expect("first");
        assert_eq!(first.cpu.little_usage_percent, None);
        assert_eq!(first.cpu.little_min_freq_mhz, Some(691));
        assert_eq!(first.gpu.max_freq_mhz, Some(492));

        // Same counters again: no elapsed ticks, so usage stays unknown.
        let second = sampler.sample(&executor, "t2").expect("second");
        assert_eq!(second.cpu.little_usage_percent, None);
        assert_eq!(executor.calls()[0].1, MountNamespace::Private);
    }

    #[test]
    fn sampler_rejects_output_without_cores() {
        let executor = FakeExecutor::default();
        let mut sampler = TelemetrySampler::new();
        let err = sampler.sample(&executor, "t1").expect_err("no cores");
        assert_eq!(err.trace_id, "t1");
    }

    #[test]
    fn bounded_monitor_emits_requested_samples() {
        let executor = Arc::new(FakeExecutor::default());
        executor.answer(MARK_PROC_STAT, &telemetry_output(10));
        let snapshots = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&snapshots);

        let handle = start_telemetry_monitor(
            executor.clone(),
            MIN_POLL_INTERVAL_MS,
            Some(2),
            Arc::new(move |snapshot: TelemetrySnapshot| {
                sink.lock().expect("sink").push(snapshot)
            }),
            "t1",
        );
        handle.wait();

        assert_eq!(snapshots.lock().expect("snapshots").len(), 2);
        assert!(executor
            .batches()
            .iter()
            .all(|batch| !batch.contains("__EH_STATUS_PROCESSES__")));
    }

    #[test]
    fn stop_interrupts_running_monitor() {
        let executor = Arc::new(FakeExecutor::default());
        executor.set_failing(true);
        let handle = start_telemetry_monitor(
            executor,
            MAX_POLL_INTERVAL_MS,
            None,
            Arc::new(|_snapshot: TelemetrySnapshot| {}),
            "t1",
        );
        let started = Instant::now();
        handle.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn poll_interval_is_clamped() {
        assert_eq!(clamp_poll_interval_ms(0), MIN_POLL_INTERVAL_MS);
        assert_eq!(clamp_poll_interval_ms(2_000), 2_000);
        assert_eq!(clamp_poll_interval_ms(u64::MAX), MAX_POLL_INTERVAL_MS);
    }
}
