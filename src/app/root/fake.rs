//! Recording executor for tests: never spawns anything.

use std::sync::Mutex;

use crate::app::error::AppError;
use crate::app::root::runner::{MountNamespace, RootExecutor, ShellOutput};
use crate::app::tweaks::status::{MARK_ADB_PORT, MARK_PROCESSES};

#[derive(Default)]
pub struct FakeExecutor {
    batches: Mutex<Vec<(String, MountNamespace)>>,
    process_rows: Mutex<Vec<String>>,
    canned: Mutex<Vec<(String, String)>>,
    failing: Mutex<bool>,
}

impl FakeExecutor {
    /// Scripts listed here appear in the process table of the next status read.
    pub fn set_processes(&self, scripts: &[&str]) {
        let rows = scripts
            .iter()
            .enumerate()
            .map(|(idx, script)| {
                format!(
                    "root {} 1 0 10:00:00 ? 00:00:00 /system/bin/sh /data/eh/{script}",
                    1000 + idx
                )
            })
            .collect();
        *self.process_rows.lock().expect("rows") = rows;
    }

    /// Any batch containing `needle` answers with `stdout`.
    pub fn answer(&self, needle: &str, stdout: &str) {
        self.canned
            .lock()
            .expect("canned")
            .push((needle.to_string(), stdout.to_string()));
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("failing") = failing;
    }

    pub fn batches(&self) -> Vec<String> {
        self.calls().into_iter().map(|(batch, _)| batch).collect()
    }

    pub fn calls(&self) -> Vec<(String, MountNamespace)> {
        self.batches.lock().expect("batches").clone()
    }

    pub fn clear(&self) {
        self.batches.lock().expect("batches").clear();
    }

    pub fn position(&self, needle: &str) -> Option<usize> {
        self.batches()
            .iter()
            .position(|batch| batch.contains(needle))
    }

    fn status_output(&self) -> String {
        let mut lines = vec![
            MARK_PROCESSES.to_string(),
            "UID PID PPID C STIME TTY TIME CMD".to_string(),
        ];
        lines.extend(self.process_rows.lock().expect("rows").iter().cloned());
        lines.push(MARK_ADB_PORT.to_string());
        lines.push("-1".to_string());
        lines.join("\n")
    }
}

impl RootExecutor for FakeExecutor {
    fn run(
        &self,
        batch: &str,
        namespace: MountNamespace,
        trace_id: &str,
    ) -> Result<ShellOutput, AppError> {
        self.batches
            .lock()
            .expect("batches")
            .push((batch.to_string(), namespace));
        if *self.failing.lock().expect("failing") {
            return Err(AppError::dependency(
                "Superuser binary not found: su",
                trace_id,
            ));
        }
        let canned = self
            .canned
            .lock()
            .expect("canned")
            .iter()
            .find(|(needle, _)| batch.contains(needle.as_str()))
            .map(|(_, stdout)| stdout.clone());
        let stdout = match canned {
            Some(stdout) => stdout,
            None if batch.contains(MARK_PROCESSES) => self.status_output(),
            None => String::new(),
        };
        Ok(ShellOutput {
            stdout,
            stderr: String::new(),
            exit_code: Some(0),
        })
    }

    fn is_privilege_available(&self, _trace_id: &str) -> bool {
        !*self.failing.lock().expect("failing")
    }
}
