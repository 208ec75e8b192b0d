use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::app::boot::{run_boot, BootReport};
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::models::{noop_tweak_emitter, TweakEmitter, TweakStatesView};
use crate::app::prefs::PrefsStore;
use crate::app::root::runner::{RootExecutor, RootShell};
use crate::app::tweaks::action::TweakAction;
use crate::app::tweaks::orchestrator::TweakOrchestrator;
use crate::app::tweaks::service::{start_tweak_service, TweakServiceHandle};
use crate::app::tweaks::system::SystemTweakOptions;

pub struct AppState {
    pub config: AppConfig,
    executor: Arc<dyn RootExecutor>,
    emitter: TweakEmitter,
    tweak_service: Mutex<Option<TweakServiceHandle>>,
}

impl AppState {
    pub fn new(config: AppConfig, executor: Arc<dyn RootExecutor>, emitter: TweakEmitter) -> Self {
        Self {
            config,
            executor,
            emitter,
            tweak_service: Mutex::new(None),
        }
    }

    /// State backed by the configured superuser binary.
    pub fn from_config(config: AppConfig) -> Self {
        let executor = Arc::new(RootShell::from_settings(&config.root));
        Self::new(config, executor, noop_tweak_emitter())
    }

    pub fn with_emitter(mut self, emitter: TweakEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn executor(&self) -> Arc<dyn RootExecutor> {
        Arc::clone(&self.executor)
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.config.data_dir()
    }

    pub fn prefs(&self) -> PrefsStore {
        PrefsStore::open(self.config.prefs_path())
    }

    pub fn system_options(&self) -> SystemTweakOptions<'_> {
        let hosts = self.config.paths.hosts_source.trim();
        SystemTweakOptions {
            hosts_source: (!hosts.is_empty()).then(|| Path::new(hosts)),
            wifi_guard: false,
        }
    }

    fn orchestrator(&self) -> TweakOrchestrator {
        TweakOrchestrator::new(
            self.executor(),
            self.prefs(),
            self.scripts_dir(),
            self.config.tweaks.clone(),
            Arc::clone(&self.emitter),
        )
    }

    /// Queues `action` on the tweak service, spawning a fresh worker when none is
    /// running. A worker that stopped itself is joined before being replaced.
    pub fn dispatch(&self, action: TweakAction, trace_id: &str) -> Result<(), AppError> {
        let mut guard = self
            .tweak_service
            .lock()
            .map_err(|_| AppError::system("Tweak service registry locked", trace_id))?;

        // The worker may close its gate at any moment; a rejected send comes back here
        // and falls through to a respawn instead of being reported as an error.
        let action = match guard.as_ref() {
            Some(handle) => match handle.try_send(action, trace_id) {
                Ok(()) => return Ok(()),
                Err(rejected) => rejected,
            },
            None => action,
        };
        if let Some(stale) = guard.take() {
            if let Err(err) = stale.join(trace_id) {
                warn!(trace_id = %trace_id, error = %err, "previous tweak service ended abnormally");
            }
        }

        info!(trace_id = %trace_id, "spawning tweak service");
        let handle = start_tweak_service(self.orchestrator(), trace_id);
        let sent = handle.send(action, trace_id);
        *guard = Some(handle);
        sent
    }

    pub fn is_tweak_service_running(&self) -> bool {
        self.tweak_service
            .lock()
            .map(|guard| guard.as_ref().is_some_and(TweakServiceHandle::is_running))
            .unwrap_or(false)
    }

    /// Current beliefs. Without a live worker a one-off orchestrator is built from the
    /// mirror and reconciled, so the answer reflects the process table.
    pub fn tweak_states(&self, trace_id: &str) -> Result<TweakStatesView, AppError> {
        {
            let guard = self
                .tweak_service
                .lock()
                .map_err(|_| AppError::system("Tweak service registry locked", trace_id))?;
            if let Some(handle) = guard.as_ref().filter(|handle| handle.is_running()) {
                return Ok(handle.states());
            }
        }
        let mut orchestrator = self.orchestrator();
        orchestrator.reconcile(trace_id);
        Ok(orchestrator.states_view())
    }

    /// Closes the queue and waits for the worker to drain it. Returns the final view,
    /// or `None` when no worker was ever started.
    pub fn wait_for_tweak_service(
        &self,
        trace_id: &str,
    ) -> Result<Option<TweakStatesView>, AppError> {
        let handle = self
            .tweak_service
            .lock()
            .map_err(|_| AppError::system("Tweak service registry locked", trace_id))?
            .take();
        match handle {
            Some(handle) => handle.join(trace_id).map(Some),
            None => Ok(None),
        }
    }

    pub fn boot(&self, trace_id: &str) -> BootReport {
        let mut prefs = self.prefs();
        let options = self.system_options();
        run_boot(
            self.executor.as_ref(),
            &mut prefs,
            &options,
            |action| self.dispatch(action, trace_id),
            trace_id,
        )
    }
}
