//! One-shot root tweaks that change system state without a background script.
//!
//! Each operation runs through the executor and checks its own effect where the
//! device gives something to check, returning `Ok(true)` when the change took.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::{info, warn};

use crate::app::error::AppError;
use crate::app::root::runner::{MountNamespace, RootExecutor};
use crate::app::tweaks::scripts::shell_quote;
use crate::app::tweaks::status::WIRELESS_ADB_PORT;

pub const HOSTS_TARGET: &str = "/system/etc/hosts";
pub const MODULE_DIR: &str = "/data/adb/event_horizon";
pub const UPDATE_FOLDERS: [&str; 3] = [
    "/data/data/com.oculus.updater",
    "/data/ota",
    "/data/ota_package",
];
/// Modes restored on unlock, index-aligned with [`UPDATE_FOLDERS`].
const UPDATE_FOLDER_MODES: [&str; 3] = ["700", "771", "770"];
const LOCK_SUCCESS_MARKER: &str = "EH_LOCK_SUCCESS";
const SHELL_PACKAGE: &str = "com.oculus.vrshell";
/// Telemetry daemons shadowed by a no-op stub while telemetry is blocked.
pub const TELEMETRY_BINARIES: [&str; 2] = [
    "/system_ext/bin/crashtelemetry",
    "/system_ext/bin/telemetry",
];
const TELEMETRY_STUB_NAME: &str = "telemetry";
const GOVERNOR_PATHS: [&str; 2] = [
    "/sys/devices/system/cpu/cpu0/cpufreq/scaling_governor",
    "/sys/devices/system/cpu/cpu4/cpufreq/scaling_governor",
];

/// Shell settings stored by `oculuspreferences`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellPreference {
    NavigatorUi,
    ImmersiveTransitions,
    TeleportAnywhere,
    NavigatorBackgroundDisabled,
    PanelScaling,
    InfiniteSpatialPanels,
}

impl ShellPreference {
    pub const ALL: [ShellPreference; 6] = [
        ShellPreference::NavigatorUi,
        ShellPreference::ImmersiveTransitions,
        ShellPreference::TeleportAnywhere,
        ShellPreference::NavigatorBackgroundDisabled,
        ShellPreference::PanelScaling,
        ShellPreference::InfiniteSpatialPanels,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ShellPreference::NavigatorUi => "debug_navigator_state",
            ShellPreference::ImmersiveTransitions => "shell_immersive_transitions_enabled",
            ShellPreference::TeleportAnywhere => "shell_teleport_anywhere",
            ShellPreference::NavigatorBackgroundDisabled => "navigator_background_disabled",
            ShellPreference::PanelScaling => "panel_scaling",
            ShellPreference::InfiniteSpatialPanels => "debug_infinite_spatial_panels_enabled",
        }
    }

    /// Value assumed when the preference tool does not answer.
    pub fn default_state(self) -> &'static str {
        match self {
            ShellPreference::NavigatorUi => "0",
            ShellPreference::ImmersiveTransitions => "true",
            ShellPreference::TeleportAnywhere => "false",
            ShellPreference::NavigatorBackgroundDisabled => "true",
            ShellPreference::PanelScaling => "false",
            ShellPreference::InfiniteSpatialPanels => "false",
        }
    }

    /// The shell only picks these up after a restart.
    pub fn restarts_shell(self) -> bool {
        !matches!(self, ShellPreference::TeleportAnywhere)
    }

    /// `debug_navigator_state` is numeric; everything else is a boolean.
    pub fn encode(self, enabled: bool) -> &'static str {
        match (self, enabled) {
            (ShellPreference::NavigatorUi, true) => "1",
            (ShellPreference::NavigatorUi, false) => "0",
            (_, true) => "true",
            (_, false) => "false",
        }
    }
}

impl FromStr for ShellPreference {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        Self::ALL
            .into_iter()
            .find(|preference| preference.key() == normalized)
            .ok_or_else(|| format!("Unknown shell preference: {value}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuGovernor {
    Performance,
    Schedutil,
}

impl CpuGovernor {
    pub fn as_str(self) -> &'static str {
        match self {
            CpuGovernor::Performance => "performance",
            CpuGovernor::Schedutil => "schedutil",
        }
    }
}

impl fmt::Display for CpuGovernor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values accepted for the spoofed `ro.build.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildType {
    User,
    Userdebug,
    Eng,
}

impl BuildType {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildType::User => "user",
            BuildType::Userdebug => "userdebug",
            BuildType::Eng => "eng",
        }
    }
}

impl FromStr for BuildType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(BuildType::User),
            "userdebug" => Ok(BuildType::Userdebug),
            "eng" => Ok(BuildType::Eng),
            _ => Err(format!("Unknown build type: {value}")),
        }
    }
}

/// Tweaks addressable from the console as `system <tweak> [on|off]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemTweak {
    WirelessAdb,
    PassthroughFix,
    RootBlocker,
    UpdateFolderLock,
    CpuPerformance,
    WifiCycle,
    ProximitySensorDisabled,
    TelemetryBlocked,
    /// One-shot: sets the property and restarts zygote; there is no off state.
    BuildType(BuildType),
    Preference(ShellPreference),
}

impl SystemTweak {
    /// Mirror key recording the applied state, if the tweak has one.
    pub fn state_key(self) -> Option<&'static str> {
        match self {
            SystemTweak::WirelessAdb => Some("wireless_adb_is_running"),
            SystemTweak::RootBlocker => Some("root_blocker_is_running"),
            SystemTweak::UpdateFolderLock => Some("lock_update_folders_is_locked"),
            SystemTweak::ProximitySensorDisabled => Some("prox_sensor_disabled"),
            SystemTweak::TelemetryBlocked => Some("telemetry_toggle_enabled"),
            _ => None,
        }
    }
}

impl FromStr for SystemTweak {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "wireless_adb" => Ok(SystemTweak::WirelessAdb),
            "passthrough_fix" => Ok(SystemTweak::PassthroughFix),
            "root_blocker" => Ok(SystemTweak::RootBlocker),
            "update_lock" | "lock_update_folders" => Ok(SystemTweak::UpdateFolderLock),
            "cpu_performance" | "performance_governor" => Ok(SystemTweak::CpuPerformance),
            "wifi_cycle" | "cycle_wifi" => Ok(SystemTweak::WifiCycle),
            "prox_sensor" | "proximity_sensor_disabled" => {
                Ok(SystemTweak::ProximitySensorDisabled)
            }
            "telemetry_block" | "disable_telemetry" => Ok(SystemTweak::TelemetryBlocked),
            other if other.starts_with("build_type_") => other["build_type_".len()..]
                .parse::<BuildType>()
                .map(SystemTweak::BuildType),
            other => other
                .parse::<ShellPreference>()
                .map(SystemTweak::Preference)
                .map_err(|_| format!("Unknown system tweak: {value}")),
        }
    }
}

/// Options that change how a system tweak is applied.
#[derive(Debug, Clone, Default)]
pub struct SystemTweakOptions<'a> {
    /// Hosts file bind-mounted by the root blocker.
    pub hosts_source: Option<&'a Path>,
    /// Cycle Wi-Fi around shell restarts (the shell can hang with a DNS blocker active).
    pub wifi_guard: bool,
}

/// Applies `tweak`; `enabled` is ignored for one-shot actions without an off state.
pub fn apply_system_tweak(
    executor: &dyn RootExecutor,
    tweak: SystemTweak,
    enabled: bool,
    options: &SystemTweakOptions<'_>,
    trace_id: &str,
) -> Result<bool, AppError> {
    info!(trace_id = %trace_id, tweak = ?tweak, enabled, "applying system tweak");
    match tweak {
        SystemTweak::WirelessAdb => set_wireless_adb(executor, enabled, trace_id),
        SystemTweak::PassthroughFix => apply_passthrough_fix(executor, trace_id),
        SystemTweak::RootBlocker if enabled => {
            let source = options.hosts_source.ok_or_else(|| {
                AppError::validation("No hosts file configured for the root blocker", trace_id)
            })?;
            enable_root_blocker(executor, source, trace_id)
        }
        SystemTweak::RootBlocker => disable_root_blocker(executor, trace_id),
        SystemTweak::UpdateFolderLock if enabled => lock_update_folders(executor, trace_id),
        SystemTweak::UpdateFolderLock => restore_update_folders(executor, trace_id),
        SystemTweak::CpuPerformance => {
            let governor = if enabled {
                CpuGovernor::Performance
            } else {
                CpuGovernor::Schedutil
            };
            set_cpu_governor(executor, governor, trace_id)
        }
        SystemTweak::WifiCycle => cycle_wifi(executor, trace_id),
        SystemTweak::ProximitySensorDisabled => {
            set_proximity_sensor_disabled(executor, enabled, trace_id)
        }
        SystemTweak::TelemetryBlocked if enabled => block_telemetry(executor, trace_id),
        SystemTweak::TelemetryBlocked => unblock_telemetry(executor, trace_id),
        SystemTweak::BuildType(build_type) => spoof_build_type(executor, build_type, trace_id),
        SystemTweak::Preference(preference) => {
            set_shell_preference(executor, preference, enabled, options.wifi_guard, trace_id)
        }
    }
}

pub fn set_wireless_adb(
    executor: &dyn RootExecutor,
    enabled: bool,
    trace_id: &str,
) -> Result<bool, AppError> {
    let port = if enabled { WIRELESS_ADB_PORT } else { "-1" };
    let output = executor.run(
        &format!(
            "setprop service.adb.tcp.port {port}\nstop adbd\nstart adbd\ngetprop service.adb.tcp.port"
        ),
        MountNamespace::Private,
        trace_id,
    )?;
    let reported = output.stdout.lines().last().unwrap_or_default().trim() == WIRELESS_ADB_PORT;
    Ok(reported == enabled)
}

/// Restarts the guardian and shell in the global namespace.
pub fn apply_passthrough_fix(executor: &dyn RootExecutor, trace_id: &str) -> Result<bool, AppError> {
    executor.run(
        &format!("am force-stop com.oculus.guardian\nam force-stop {SHELL_PACKAGE}\nsleep 5"),
        MountNamespace::Global,
        trace_id,
    )?;
    Ok(true)
}

fn hosts_mounted(executor: &dyn RootExecutor, trace_id: &str) -> Result<bool, AppError> {
    let output = executor.run(
        &format!("mount | grep {HOSTS_TARGET}"),
        MountNamespace::Global,
        trace_id,
    )?;
    Ok(!output.stdout.trim().is_empty())
}

pub fn enable_root_blocker(
    executor: &dyn RootExecutor,
    hosts_source: &Path,
    trace_id: &str,
) -> Result<bool, AppError> {
    let source = hosts_source.to_string_lossy();
    let installed = format!("{MODULE_DIR}/hosts");
    let install = format!(
        "mkdir -p {MODULE_DIR}\ncp {} {installed}\nchmod 644 {installed}",
        shell_quote(&source)
    );
    executor.run(&install, MountNamespace::Private, trace_id)?;
    executor.run(
        &format!("umount -l {HOSTS_TARGET}\nmount -o bind {installed} {HOSTS_TARGET}"),
        MountNamespace::Global,
        trace_id,
    )?;
    let mounted = hosts_mounted(executor, trace_id)?;
    if !mounted {
        warn!(trace_id = %trace_id, "hosts bind mount not visible after enabling root blocker");
    }
    Ok(mounted)
}

/// Unmounts the hosts override and bounces airplane mode so cached lookups are dropped.
pub fn disable_root_blocker(executor: &dyn RootExecutor, trace_id: &str) -> Result<bool, AppError> {
    let commands = [
        format!("umount -l {HOSTS_TARGET}"),
        "settings put global airplane_mode_on 1".to_string(),
        "am broadcast -a android.intent.action.AIRPLANE_MODE --ez state true".to_string(),
        "sleep 4".to_string(),
        "settings put global airplane_mode_on 0".to_string(),
        "am broadcast -a android.intent.action.AIRPLANE_MODE --ez state false".to_string(),
    ]
    .join("\n");
    executor.run(&commands, MountNamespace::Global, trace_id)?;
    Ok(!hosts_mounted(executor, trace_id)?)
}

fn telemetry_stub_path() -> String {
    format!("{MODULE_DIR}/{TELEMETRY_STUB_NAME}")
}

/// Installs the no-op stub and bind-mounts it over every telemetry binary.
pub fn telemetry_block_commands() -> (String, String) {
    let stub = telemetry_stub_path();
    let install = format!(
        "mkdir -p {MODULE_DIR}\nprintf '#!/system/bin/sh\\nexit 0\\n' > {stub}\nchmod 755 {stub}"
    );
    let mounts = TELEMETRY_BINARIES
        .iter()
        .map(|target| format!("mount -o bind {stub} {target}"))
        .collect::<Vec<_>>()
        .join("\n");
    (install, mounts)
}

pub fn telemetry_unblock_command() -> String {
    TELEMETRY_BINARIES
        .iter()
        .map(|target| format!("umount -l {target} || true"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Number of telemetry binaries currently shadowed by a bind mount.
fn telemetry_mounts(executor: &dyn RootExecutor, trace_id: &str) -> Result<usize, AppError> {
    let patterns = TELEMETRY_BINARIES
        .iter()
        .map(|target| format!("-e ' {target} '"))
        .collect::<Vec<_>>()
        .join(" ");
    let output = executor.run(
        &format!("mount | grep -c {patterns}"),
        MountNamespace::Global,
        trace_id,
    )?;
    Ok(output
        .stdout
        .lines()
        .next()
        .and_then(|line| line.trim().parse::<usize>().ok())
        .unwrap_or(0))
}

pub fn block_telemetry(executor: &dyn RootExecutor, trace_id: &str) -> Result<bool, AppError> {
    let (install, mounts) = telemetry_block_commands();
    executor.run(&install, MountNamespace::Private, trace_id)?;
    executor.run(&mounts, MountNamespace::Global, trace_id)?;
    let mounted = telemetry_mounts(executor, trace_id)?;
    if mounted != TELEMETRY_BINARIES.len() {
        warn!(trace_id = %trace_id, mounted, "telemetry stub not visible over every binary");
    }
    Ok(mounted == TELEMETRY_BINARIES.len())
}

pub fn unblock_telemetry(executor: &dyn RootExecutor, trace_id: &str) -> Result<bool, AppError> {
    executor.run(&telemetry_unblock_command(), MountNamespace::Global, trace_id)?;
    Ok(telemetry_mounts(executor, trace_id)? == 0)
}

pub fn build_type_command(build_type: BuildType) -> String {
    format!(
        "magisk resetprop ro.build.type {}\ngetprop ro.build.type\nsetprop ctl.restart zygote",
        build_type.as_str()
    )
}

/// Spoofs `ro.build.type` and restarts zygote. Verified by the value read back
/// before the restart.
pub fn spoof_build_type(
    executor: &dyn RootExecutor,
    build_type: BuildType,
    trace_id: &str,
) -> Result<bool, AppError> {
    let output = executor.run(&build_type_command(build_type), MountNamespace::Private, trace_id)?;
    Ok(output.stdout.lines().next().unwrap_or_default().trim() == build_type.as_str())
}

pub fn lock_update_folders(executor: &dyn RootExecutor, trace_id: &str) -> Result<bool, AppError> {
    let folders = UPDATE_FOLDERS.join(" ");
    let output = executor.run(
        &format!("mkdir -p {folders}\nchmod 000 {folders}\necho {LOCK_SUCCESS_MARKER}"),
        MountNamespace::Global,
        trace_id,
    )?;
    Ok(output.stdout.contains(LOCK_SUCCESS_MARKER))
}

pub fn restore_update_folders(
    executor: &dyn RootExecutor,
    trace_id: &str,
) -> Result<bool, AppError> {
    let commands = UPDATE_FOLDERS
        .iter()
        .zip(UPDATE_FOLDER_MODES)
        .map(|(folder, mode)| format!("chmod {mode} {folder}"))
        .collect::<Vec<_>>()
        .join("\n");
    executor.run(&commands, MountNamespace::Global, trace_id)?;
    Ok(true)
}

pub fn set_cpu_governor(
    executor: &dyn RootExecutor,
    governor: CpuGovernor,
    trace_id: &str,
) -> Result<bool, AppError> {
    let mut commands: Vec<String> = GOVERNOR_PATHS
        .iter()
        .map(|path| format!("echo {governor} > {path}"))
        .collect();
    commands.push(format!("cat {}", GOVERNOR_PATHS[0]));
    let output = executor.run(&commands.join("\n"), MountNamespace::Private, trace_id)?;
    Ok(output.stdout.lines().last().unwrap_or_default().trim() == governor.as_str())
}

pub fn cycle_wifi(executor: &dyn RootExecutor, trace_id: &str) -> Result<bool, AppError> {
    executor.run(
        "svc wifi disable\nsleep 3\nsvc wifi enable",
        MountNamespace::Private,
        trace_id,
    )?;
    Ok(true)
}

pub fn set_proximity_sensor_disabled(
    executor: &dyn RootExecutor,
    disabled: bool,
    trace_id: &str,
) -> Result<bool, AppError> {
    let broadcast = if disabled {
        "com.oculus.vrpowermanager.prox_close"
    } else {
        "com.oculus.vrpowermanager.automation_disable"
    };
    executor.run(
        &format!("am broadcast -a {broadcast}"),
        MountNamespace::Private,
        trace_id,
    )?;
    Ok(true)
}

pub fn shell_preference_command(
    preference: ShellPreference,
    enabled: bool,
    wifi_guard: bool,
) -> String {
    let mut lines = vec![format!(
        "oculuspreferences --setc {} {}",
        preference.key(),
        preference.encode(enabled)
    )];
    if preference.restarts_shell() {
        lines.push(format!("am force-stop {SHELL_PACKAGE}"));
        if wifi_guard {
            lines.insert(0, "svc wifi disable".to_string());
            lines.push("svc wifi enable".to_string());
        }
    }
    lines.join("\n")
}

pub fn set_shell_preference(
    executor: &dyn RootExecutor,
    preference: ShellPreference,
    enabled: bool,
    wifi_guard: bool,
    trace_id: &str,
) -> Result<bool, AppError> {
    let output = executor.run(
        &shell_preference_command(preference, enabled, wifi_guard),
        MountNamespace::Private,
        trace_id,
    )?;
    Ok(!output.has_stderr())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::root::fake::FakeExecutor;

    fn answering(stdout: &str) -> FakeExecutor {
        let executor = FakeExecutor::default();
        executor.answer("", stdout);
        executor
    }

    #[test]
    fn lock_checks_success_marker_in_global_namespace() {
        let executor = answering("EH_LOCK_SUCCESS\n");
        assert_eq!(lock_update_folders(&executor, "t"), Ok(true));
        let batches = executor.calls();
        assert_eq!(batches[0].1, MountNamespace::Global);
        assert!(batches[0].0.contains("chmod 000 /data/data/com.oculus.updater /data/ota"));

        let silent = answering("");
        assert_eq!(lock_update_folders(&silent, "t"), Ok(false));
    }

    #[test]
    fn restore_uses_per_folder_modes() {
        let executor = answering("");
        restore_update_folders(&executor, "t").expect("restore");
        let batch = &executor.batches()[0];
        assert!(batch.contains("chmod 700 /data/data/com.oculus.updater"));
        assert!(batch.contains("chmod 771 /data/ota"));
        assert!(batch.contains("chmod 770 /data/ota_package"));
    }

    #[test]
    fn root_blocker_verifies_mount() {
        let executor = answering("/dev/block/dm-5 on /system/etc/hosts type ext4\n");
        let ok = enable_root_blocker(&executor, Path::new("/sdcard/hosts"), "t").expect("enable");
        assert!(ok);
        let batches = executor.calls();
        assert_eq!(batches.len(), 3);
        assert!(batches[0].0.contains("cp '/sdcard/hosts' /data/adb/event_horizon/hosts"));
        assert!(batches[1]
            .0
            .contains("mount -o bind /data/adb/event_horizon/hosts /system/etc/hosts"));
        assert_eq!(batches[1].1, MountNamespace::Global);
    }

    #[test]
    fn root_blocker_requires_hosts_source() {
        let executor = answering("");
        let err = apply_system_tweak(
            &executor,
            SystemTweak::RootBlocker,
            true,
            &SystemTweakOptions::default(),
            "t",
        )
        .expect_err("missing hosts");
        assert_eq!(err.code, crate::app::error::ERR_VALIDATION);
        assert!(executor.batches().is_empty());
    }

    #[test]
    fn wireless_adb_reads_back_port() {
        let executor = answering("5555\n");
        assert_eq!(set_wireless_adb(&executor, true, "t"), Ok(true));
        assert_eq!(set_wireless_adb(&executor, false, "t"), Ok(false));
    }

    #[test]
    fn governor_reads_back_value() {
        let executor = answering("performance\n");
        assert_eq!(
            set_cpu_governor(&executor, CpuGovernor::Performance, "t"),
            Ok(true)
        );
        let batch = &executor.batches()[0];
        assert!(batch.contains("echo performance > /sys/devices/system/cpu/cpu4/"));
    }

    #[test]
    fn preference_command_restarts_shell_with_wifi_guard() {
        let command = shell_preference_command(ShellPreference::PanelScaling, true, true);
        assert_eq!(
            command,
            "svc wifi disable\noculuspreferences --setc panel_scaling true\nam force-stop com.oculus.vrshell\nsvc wifi enable"
        );
        let teleport = shell_preference_command(ShellPreference::TeleportAnywhere, false, true);
        assert_eq!(teleport, "oculuspreferences --setc shell_teleport_anywhere false");
        assert!(shell_preference_command(ShellPreference::NavigatorUi, true, false)
            .contains("debug_navigator_state 1"));
    }

    #[test]
    fn telemetry_block_mounts_stub_in_global_namespace() {
        let executor = answering("2\n");
        assert_eq!(block_telemetry(&executor, "t"), Ok(true));
        let calls = executor.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].1, MountNamespace::Private);
        assert!(calls[0].0.contains("chmod 755 /data/adb/event_horizon/telemetry"));
        assert_eq!(calls[1].1, MountNamespace::Global);
        assert_eq!(
            calls[1].0,
            "mount -o bind /data/adb/event_horizon/telemetry /system_ext/bin/crashtelemetry\n\
             mount -o bind /data/adb/event_horizon/telemetry /system_ext/bin/telemetry"
        );
        assert_eq!(calls[2].1, MountNamespace::Global);
        assert!(calls[2].0.starts_with("mount | grep -c"));

        let half = answering("1\n");
        assert_eq!(block_telemetry(&half, "t"), Ok(false));
    }

    #[test]
    fn telemetry_unblock_tolerates_missing_mounts() {
        assert_eq!(
            telemetry_unblock_command(),
            "umount -l /system_ext/bin/crashtelemetry || true\n\
             umount -l /system_ext/bin/telemetry || true"
        );
        let executor = answering("0\n");
        assert_eq!(unblock_telemetry(&executor, "t"), Ok(true));
        assert_eq!(executor.calls()[0].1, MountNamespace::Global);
    }

    #[test]
    fn build_type_spoof_restarts_zygote() {
        assert_eq!(
            build_type_command(BuildType::Userdebug),
            "magisk resetprop ro.build.type userdebug\ngetprop ro.build.type\nsetprop ctl.restart zygote"
        );
        let executor = answering("userdebug\n");
        assert_eq!(spoof_build_type(&executor, BuildType::Userdebug, "t"), Ok(true));
        assert_eq!(spoof_build_type(&executor, BuildType::Eng, "t"), Ok(false));
    }

    #[test]
    fn parses_tweak_names() {
        assert_eq!(
            "build-type-eng".parse::<SystemTweak>(),
            Ok(SystemTweak::BuildType(BuildType::Eng))
        );
        assert!("build-type-root".parse::<SystemTweak>().is_err());
        assert_eq!(
            "telemetry-block".parse::<SystemTweak>(),
            Ok(SystemTweak::TelemetryBlocked)
        );
        assert_eq!("wireless-adb".parse::<SystemTweak>(), Ok(SystemTweak::WirelessAdb));
        assert_eq!(
            "panel_scaling".parse::<SystemTweak>(),
            Ok(SystemTweak::Preference(ShellPreference::PanelScaling))
        );
        assert!("warp_drive".parse::<SystemTweak>().is_err());
        assert_eq!(
            SystemTweak::RootBlocker.state_key(),
            Some("root_blocker_is_running")
        );
    }
}
