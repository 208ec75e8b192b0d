//! Boot dispatcher: turns the persisted `*_on_boot` flags into orchestrator actions
//! and one-shot system tweaks.

use serde::Serialize;
use tracing::{info, warn};

use crate::app::error::AppError;
use crate::app::models::SystemTweakResult;
use crate::app::prefs::PrefsStore;
use crate::app::root::runner::RootExecutor;
use crate::app::tweaks::action::{LedColor, TweakAction, TweakParams};
use crate::app::tweaks::category::TweakCategory;
use crate::app::tweaks::orchestrator::{LED_BLUE_KEY, LED_GREEN_KEY, LED_RED_KEY};
use crate::app::tweaks::system::{apply_system_tweak, SystemTweak, SystemTweakOptions};

pub const WIRELESS_ADB_ON_BOOT_KEY: &str = "wireless_adb_on_boot";
pub const CYCLE_WIFI_ON_BOOT_KEY: &str = "cycle_wifi_on_boot";
pub const ROOT_BLOCKER_ON_BOOT_KEY: &str = "root_blocker_on_boot";
pub const PROX_SENSOR_DISABLED_KEY: &str = "prox_sensor_disabled";
pub const UPDATE_FOLDERS_LOCKED_KEY: &str = "lock_update_folders_is_locked";

/// LED categories in boot precedence order; only the first enabled one starts.
const LED_PRECEDENCE: [TweakCategory; 3] = [
    TweakCategory::CustomLed,
    TweakCategory::RainbowLed,
    TweakCategory::PowerLed,
];

const INDEPENDENT_ON_BOOT: [TweakCategory; 5] = [
    TweakCategory::MinFreqCpuLock,
    TweakCategory::MinFreqGpuLock,
    TweakCategory::MaxFreqGpuLock,
    TweakCategory::AppLaunchInterceptor,
    TweakCategory::UsbNotificationInterceptor,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootPlan {
    pub actions: Vec<TweakAction>,
    /// Categories whose `*_is_running` key is cleared because nothing restarts them.
    pub running_resets: Vec<TweakCategory>,
    pub one_shots: Vec<(SystemTweak, bool)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootReport {
    pub trace_id: String,
    pub actions: Vec<String>,
    pub one_shots: Vec<SystemTweakResult>,
    pub errors: Vec<AppError>,
}

pub fn plan_boot(prefs: &PrefsStore) -> BootPlan {
    let on_boot = |category: TweakCategory| prefs.get_bool(category.boot_key(), false);
    let mut actions = Vec::new();

    let led = LED_PRECEDENCE.into_iter().find(|category| on_boot(*category));
    if let Some(category) = led {
        let action = TweakAction::start(category);
        actions.push(if category == TweakCategory::CustomLed {
            action.with_params(TweakParams {
                color: Some(persisted_color(prefs)),
                gpu_max_freq_mhz: None,
            })
        } else {
            action
        });
    }
    actions.extend(
        INDEPENDENT_ON_BOOT
            .into_iter()
            .filter(|category| on_boot(*category))
            .map(TweakAction::start),
    );

    let mut running_resets: Vec<TweakCategory> = TweakCategory::LEDS
        .into_iter()
        .filter(|category| Some(*category) != led)
        .collect();
    if !on_boot(TweakCategory::MinFreqCpuLock) {
        running_resets.push(TweakCategory::MinFreqCpuLock);
    }

    let mut one_shots = Vec::new();
    if prefs.get_bool(WIRELESS_ADB_ON_BOOT_KEY, false) {
        one_shots.push((SystemTweak::WirelessAdb, true));
    }
    if prefs.get_bool(CYCLE_WIFI_ON_BOOT_KEY, false) {
        one_shots.push((SystemTweak::WifiCycle, true));
    }
    if prefs.get_bool(ROOT_BLOCKER_ON_BOOT_KEY, false) {
        one_shots.push((SystemTweak::RootBlocker, true));
    }
    // The proximity broadcast always goes out so the sensor lands in a known mode.
    one_shots.push((
        SystemTweak::ProximitySensorDisabled,
        prefs.get_bool(PROX_SENSOR_DISABLED_KEY, false),
    ));
    if prefs.get_bool(UPDATE_FOLDERS_LOCKED_KEY, false) {
        one_shots.push((SystemTweak::UpdateFolderLock, true));
    }

    BootPlan {
        actions,
        running_resets,
        one_shots,
    }
}

fn persisted_color(prefs: &PrefsStore) -> LedColor {
    let channel = |key: &str| prefs.get_i64(key, 255).clamp(0, 255) as u8;
    LedColor {
        red: channel(LED_RED_KEY),
        green: channel(LED_GREEN_KEY),
        blue: channel(LED_BLUE_KEY),
    }
}

/// Executes the boot plan. Start actions go through `dispatch`; one-shots run on
/// the calling thread. Failures are collected into the report, never propagated.
pub fn run_boot(
    executor: &dyn RootExecutor,
    prefs: &mut PrefsStore,
    options: &SystemTweakOptions<'_>,
    mut dispatch: impl FnMut(TweakAction) -> Result<(), AppError>,
    trace_id: &str,
) -> BootReport {
    let plan = plan_boot(prefs);
    info!(
        trace_id = %trace_id,
        actions = plan.actions.len(),
        one_shots = plan.one_shots.len(),
        "running boot plan"
    );
    let mut report = BootReport {
        trace_id: trace_id.to_string(),
        actions: Vec::new(),
        one_shots: Vec::new(),
        errors: Vec::new(),
    };

    let resets: Vec<(&str, bool)> = plan
        .running_resets
        .iter()
        .map(|category| (category.running_key(), false))
        .collect();
    if let Err(err) = prefs.put_bools(&resets, trace_id) {
        warn!(trace_id = %trace_id, error = %err, "failed to reset running flags");
        report.errors.push(err);
    }

    for action in plan.actions {
        let identifier = action.identifier();
        match dispatch(action) {
            Ok(()) => report.actions.push(identifier),
            Err(err) => {
                warn!(trace_id = %trace_id, action = %identifier, error = %err, "boot dispatch failed");
                report.errors.push(err);
            }
        }
    }

    for (tweak, enabled) in plan.one_shots {
        match apply_system_tweak(executor, tweak, enabled, options, trace_id) {
            Ok(verified) => {
                if let Some(key) = recorded_key(tweak).filter(|_| verified) {
                    if let Err(err) = prefs.put_bool(key, enabled, trace_id) {
                        warn!(trace_id = %trace_id, key, error = %err, "failed to record boot tweak");
                    }
                }
                report.one_shots.push(SystemTweakResult {
                    tweak: format!("{tweak:?}"),
                    enabled,
                    verified,
                });
            }
            Err(err) => {
                warn!(trace_id = %trace_id, tweak = ?tweak, error = %err, "boot tweak failed");
                report.errors.push(err);
            }
        }
    }

    report
}

/// Mirror keys written back after a verified boot one-shot. The proximity flag is the
/// user's choice, not an observed state, so it is left alone.
fn recorded_key(tweak: SystemTweak) -> Option<&'static str> {
    match tweak {
        SystemTweak::ProximitySensorDisabled => None,
        other => other.state_key(),
    }
}
