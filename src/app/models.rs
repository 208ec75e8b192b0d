use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::tweaks::category::{CategoryState, TweakCategory};
use crate::app::tweaks::status::SystemStates;

/// What observers see of the orchestrator without going through its queue.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TweakStatesView {
    pub categories: BTreeMap<TweakCategory, CategoryState>,
    pub system: SystemStates,
    /// Start of the current eventual-consistency window; `None` until the first
    /// successful reconciliation.
    pub last_reconciled_at: Option<DateTime<Utc>>,
}

impl TweakStatesView {
    pub fn state(&self, category: TweakCategory) -> CategoryState {
        self.categories.get(&category).copied().unwrap_or_default()
    }

    pub fn is_running(&self, category: TweakCategory) -> bool {
        self.state(category) == CategoryState::Running
    }

    pub fn any_active(&self) -> bool {
        self.categories.values().any(|state| state.is_active())
    }
}

impl Default for TweakStatesView {
    fn default() -> Self {
        Self {
            categories: TweakCategory::ALL
                .into_iter()
                .map(|category| (category, CategoryState::Stopped))
                .collect(),
            system: SystemStates::default(),
            last_reconciled_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TweakEventKind {
    #[serde(rename = "tweak-state")]
    State,
    #[serde(rename = "tweaks-stopped")]
    TweaksStopped,
}

impl TweakEventKind {
    pub fn name(self) -> &'static str {
        match self {
            TweakEventKind::State => "tweak-state",
            TweakEventKind::TweaksStopped => "tweaks-stopped",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TweakEvent {
    pub kind: TweakEventKind,
    pub trace_id: String,
    pub states: TweakStatesView,
}

pub type TweakEmitter = Arc<dyn Fn(TweakEvent) + Send + Sync>;

pub fn noop_tweak_emitter() -> TweakEmitter {
    Arc::new(|_event: TweakEvent| {})
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CpuTelemetry {
    pub temp_celsius: Option<i64>,
    pub little_min_freq_mhz: Option<u64>,
    pub little_max_freq_mhz: Option<u64>,
    pub big_min_freq_mhz: Option<u64>,
    pub big_max_freq_mhz: Option<u64>,
    /// Busy share of cores 0-3 since the previous sample.
    pub little_usage_percent: Option<f64>,
    /// Busy share of cores 4-6 since the previous sample.
    pub big_usage_percent: Option<f64>,
    pub governor: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct GpuTelemetry {
    pub temp_celsius: Option<i64>,
    pub freq_mhz: Option<u64>,
    pub min_freq_mhz: Option<u64>,
    pub max_freq_mhz: Option<u64>,
    pub usage_percent: Option<u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TelemetrySnapshot {
    pub ts_ms: i64,
    pub cpu: CpuTelemetry,
    pub gpu: GpuTelemetry,
}

pub type TelemetryEmitter = Arc<dyn Fn(TelemetrySnapshot) + Send + Sync>;

/// Outcome of a privileged command run from the console.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RootCommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RootCheckResult {
    pub available: bool,
    pub program: String,
    pub installed_su: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SystemTweakResult {
    pub tweak: String,
    pub enabled: bool,
    pub verified: bool,
}
