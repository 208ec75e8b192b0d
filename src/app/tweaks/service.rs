//! Background worker that owns a [`TweakOrchestrator`] and drains its action queue.
//!
//! Actions are consumed one at a time on a single thread, so the orchestrator's map
//! never sees two dispatches at once. The worker reconciles before taking its first
//! action and exits on its own once a dispatch leaves nothing active and the queue
//! is empty.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};

use tracing::{debug, info};

use crate::app::error::AppError;
use crate::app::models::TweakStatesView;
use crate::app::tweaks::action::TweakAction;
use crate::app::tweaks::orchestrator::{TweakOrchestrator, WorkerLifecycle};

struct QueuedAction {
    action: TweakAction,
    trace_id: String,
}

pub struct TweakServiceHandle {
    sender: Sender<QueuedAction>,
    /// Open while the worker accepts actions. Held across every send and across the
    /// worker's final empty-queue check, so an accepted action is never dropped.
    gate: Arc<Mutex<bool>>,
    view: Arc<RwLock<TweakStatesView>>,
    join: JoinHandle<()>,
}

fn lock_gate(gate: &Mutex<bool>) -> MutexGuard<'_, bool> {
    match gate.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl TweakServiceHandle {
    /// Queues `action`. Fails once the worker has stopped.
    pub fn send(&self, action: TweakAction, trace_id: &str) -> Result<(), AppError> {
        self.try_send(action, trace_id)
            .map_err(|_| AppError::system("Tweak service is not running", trace_id))
    }

    /// Queues `action`, handing it back untouched when the gate is already closed.
    /// The gate check and the send happen under one lock, so an `Ok` is never dropped.
    pub fn try_send(&self, action: TweakAction, trace_id: &str) -> Result<(), TweakAction> {
        let open = lock_gate(&self.gate);
        if !*open {
            return Err(action);
        }
        self.sender
            .send(QueuedAction {
                action,
                trace_id: trace_id.to_string(),
            })
            .map_err(|rejected| rejected.0.action)
    }

    pub fn is_running(&self) -> bool {
        *lock_gate(&self.gate)
    }

    /// Latest published view, readable while the worker is busy.
    pub fn states(&self) -> TweakStatesView {
        match self.view.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Closes the queue and waits for the worker to finish what it already accepted.
    pub fn join(self, trace_id: &str) -> Result<TweakStatesView, AppError> {
        let Self {
            sender, view, join, ..
        } = self;
        drop(sender);
        join.join()
            .map_err(|_| AppError::system("Tweak service thread panicked", trace_id))?;
        let view = match view.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        Ok(view)
    }
}

pub fn start_tweak_service(orchestrator: TweakOrchestrator, trace_id: &str) -> TweakServiceHandle {
    let (sender, receiver) = mpsc::channel::<QueuedAction>();
    let gate = Arc::new(Mutex::new(true));
    let view = Arc::new(RwLock::new(orchestrator.states_view()));
    let gate_worker = Arc::clone(&gate);
    let view_worker = Arc::clone(&view);
    let trace_worker = trace_id.to_string();

    let join = thread::spawn(move || {
        run_worker(orchestrator, receiver, &gate_worker, &view_worker, &trace_worker);
        *lock_gate(&gate_worker) = false;
    });

    TweakServiceHandle {
        sender,
        gate,
        view,
        join,
    }
}

fn run_worker(
    mut orchestrator: TweakOrchestrator,
    receiver: Receiver<QueuedAction>,
    gate: &Mutex<bool>,
    view: &RwLock<TweakStatesView>,
    trace_id: &str,
) {
    info!(trace_id = %trace_id, "tweak service started");
    orchestrator.reconcile(trace_id);
    publish(view, &orchestrator);

    let mut next = receiver.recv().ok();
    while let Some(queued) = next.take() {
        let lifecycle = orchestrator.dispatch(queued.action, &queued.trace_id);
        publish(view, &orchestrator);
        next = match lifecycle {
            WorkerLifecycle::Continue => receiver.recv().ok(),
            WorkerLifecycle::Shutdown => {
                let mut open = lock_gate(gate);
                match receiver.try_recv() {
                    Ok(pending) => {
                        debug!(trace_id = %pending.trace_id, "queued action keeps tweak service alive");
                        Some(pending)
                    }
                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
                        *open = false;
                        None
                    }
                }
            }
        };
    }
    info!(trace_id = %trace_id, "tweak service stopped");
}

fn publish(view: &RwLock<TweakStatesView>, orchestrator: &TweakOrchestrator) {
    let snapshot = orchestrator.states_view();
    match view.write() {
        Ok(mut guard) => *guard = snapshot,
        Err(poisoned) => *poisoned.into_inner() = snapshot,
    }
}
