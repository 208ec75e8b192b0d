//! Privileged shell execution.
//!
//! Every call opens a fresh superuser process, feeds it the whole command batch
//! followed by `exit`, collects stdout and stderr and tears the process down. There is
//! no session reuse and no timeout: a batch that never finishes blocks its caller.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::app::config::RootSettings;
use crate::app::error::AppError;
use crate::app::root::locator::resolve_su_program;

/// Prefix of the text returned by [`RootExecutor::execute`] when no session could run.
pub const FAILURE_PREFIX: &str = "Execution failed: ";
/// Prefix attached to every stderr line in the text form of an output.
pub const STDERR_PREFIX: &str = "ERROR: ";

const UID_ROOT_MARKER: &str = "uid=0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MountNamespace {
    /// The broker's default namespace for the calling app.
    #[default]
    Private,
    /// The global mount namespace (`--mount-master`), needed for bind mounts that
    /// must be visible system-wide.
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ShellOutput {
    /// Stdout lines first, then every stderr line prefixed with [`STDERR_PREFIX`].
    /// The two streams are never interleaved chronologically.
    pub fn to_text(&self) -> String {
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len());
        for line in self.stdout.lines() {
            text.push_str(line);
            text.push('\n');
        }
        for line in self.stderr.lines() {
            text.push_str(STDERR_PREFIX);
            text.push_str(line);
            text.push('\n');
        }
        text
    }

    pub fn has_stderr(&self) -> bool {
        !self.stderr.trim().is_empty()
    }
}

/// The seam between the orchestrator and the privilege broker.
pub trait RootExecutor: Send + Sync {
    /// Runs `batch` in one privileged session.
    fn run(
        &self,
        batch: &str,
        namespace: MountNamespace,
        trace_id: &str,
    ) -> Result<ShellOutput, AppError>;

    /// True iff a minimal check command reports uid 0. Never errors; fails closed.
    fn is_privilege_available(&self, trace_id: &str) -> bool;

    /// Text form of [`RootExecutor::run`]. Failures become a sentinel string that
    /// starts with [`FAILURE_PREFIX`].
    fn execute(&self, batch: &str, namespace: MountNamespace, trace_id: &str) -> String {
        match self.run(batch, namespace, trace_id) {
            Ok(output) => output.to_text(),
            Err(err) => format!("{FAILURE_PREFIX}{}", err.error),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RootShell {
    program: String,
    mount_master_args: Vec<String>,
    check_args: Vec<String>,
}

impl RootShell {
    pub fn new(program: impl Into<String>) -> Self {
        let defaults = RootSettings::default();
        Self {
            program: program.into(),
            mount_master_args: defaults.mount_master_args,
            check_args: defaults.check_args,
        }
    }

    pub fn from_settings(settings: &RootSettings) -> Self {
        Self {
            program: resolve_su_program(&settings.su_program),
            mount_master_args: settings.mount_master_args.clone(),
            check_args: settings.check_args.clone(),
        }
    }

    pub fn with_check_args(mut self, args: Vec<String>) -> Self {
        self.check_args = args;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn with_mount_master_args(mut self, args: Vec<String>) -> Self {
        self.mount_master_args = args;
        self
    }

    /// Arguments passed to the superuser binary when opening a session.
    pub fn session_args(&self, namespace: MountNamespace) -> &[String] {
        match namespace {
            MountNamespace::Private => &[],
            MountNamespace::Global => &self.mount_master_args,
        }
    }

    fn session_command(&self, namespace: MountNamespace) -> Command {
        let mut command = Command::new(&self.program);
        command.args(self.session_args(namespace));
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

impl RootExecutor for RootShell {
    fn run(
        &self,
        batch: &str,
        namespace: MountNamespace,
        trace_id: &str,
    ) -> Result<ShellOutput, AppError> {
        let mut child = self
            .session_command(namespace)
            .spawn()
            .map_err(|err| spawn_error(&self.program, err, trace_id))?;

        // Both pipes are drained in parallel so a chatty stderr cannot stall the shell
        // while we are still reading stdout. Ordering is restored when assembling text.
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::system("Failed to capture stdout", trace_id))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::system("Failed to capture stderr", trace_id))?;
        let stdout_handle = drain_pipe(stdout);
        let stderr_handle = drain_pipe(stderr);

        let write_result = match child.stdin.take() {
            Some(mut stdin) => write_batch(&mut stdin, batch),
            None => Err(std::io::Error::other("Failed to capture stdin")),
        };

        let status = child.wait();
        let stdout_bytes = join_drained(stdout_handle, trace_id);
        let stderr_bytes = join_drained(stderr_handle, trace_id);
        let (stdout_bytes, stderr_bytes) = (stdout_bytes?, stderr_bytes?);

        if let Err(err) = write_result {
            return Err(AppError::system(
                format!("Failed to write to privileged shell: {err}"),
                trace_id,
            ));
        }
        let status = status.map_err(|err| {
            AppError::system(format!("Failed to wait for privileged shell: {err}"), trace_id)
        })?;

        let exit_code = status.code();
        if exit_code != Some(0) {
            debug!(trace_id = %trace_id, exit_code = ?exit_code, "privileged session exited non-zero");
        }

        Ok(ShellOutput {
            stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
            stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
            exit_code,
        })
    }

    fn is_privilege_available(&self, trace_id: &str) -> bool {
        let output = Command::new(&self.program)
            .args(&self.check_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output();
        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let first_line = stdout.lines().next().unwrap_or_default();
                first_line.contains(UID_ROOT_MARKER)
            }
            Err(err) => {
                debug!(trace_id = %trace_id, program = %self.program, error = %err, "root check failed");
                false
            }
        }
    }
}

fn write_batch(stdin: &mut impl Write, batch: &str) -> std::io::Result<()> {
    stdin.write_all(batch.as_bytes())?;
    if !batch.ends_with('\n') {
        stdin.write_all(b"\n")?;
    }
    stdin.write_all(b"exit\n")?;
    stdin.flush()
}

fn drain_pipe<R: Read + Send + 'static>(reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut reader = reader;
        let mut buffer = Vec::<u8>::new();
        let mut temp = [0u8; 4096];
        loop {
            match reader.read(&mut temp) {
                Ok(0) => break,
                Ok(count) => buffer.extend_from_slice(&temp[..count]),
                Err(_) => break,
            }
        }
        buffer
    })
}

/// A drain thread that panicked would otherwise hand back silently truncated output.
fn join_drained(handle: JoinHandle<Vec<u8>>, trace_id: &str) -> Result<Vec<u8>, AppError> {
    handle
        .join()
        .map_err(|_| AppError::system("Failed to drain shell output", trace_id))
}

fn spawn_error(program: &str, err: std::io::Error, trace_id: &str) -> AppError {
    if err.kind() == std::io::ErrorKind::NotFound {
        AppError::dependency(format!("Superuser binary not found: {program}"), trace_id)
    } else {
        AppError::system(format!("Failed to start {program}: {err}"), trace_id)
    }
}
