//! Reconciliation protocol: one batched privileged command, marker-split output.
//!
//! The process table is shipped raw and matched here, so liveness is decided on exact
//! script-name tokens rather than on a shell `grep` substring. A section that is
//! missing or empty leaves the corresponding fields unknown (`None`), and the
//! orchestrator keeps its previous belief for them.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::app::tweaks::category::TweakCategory;
use crate::app::tweaks::system::{ShellPreference, HOSTS_TARGET, UPDATE_FOLDERS};

pub const MARK_PROCESSES: &str = "__EH_STATUS_PROCESSES__";
pub const MARK_ROOT_BLOCK: &str = "__EH_STATUS_ROOT_BLOCK__";
pub const MARK_CPU_GOVERNOR: &str = "__EH_STATUS_CPU_GOVERNOR__";
pub const MARK_ADB_PORT: &str = "__EH_STATUS_ADB_PORT__";
pub const MARK_LOCK_STATE: &str = "__EH_STATUS_LOCK_STATE__";
const MARK_PREFERENCE_PREFIX: &str = "__EH_STATUS_PREF_";

pub const WIRELESS_ADB_PORT: &str = "5555";
const PERFORMANCE_GOVERNOR: &str = "performance";
const LOCKED_MODE_SIGNATURE: &str = "d---------";

/// Observed state of the one-shot tweaks, each `None` when its section did not answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SystemStates {
    pub root_blocker_enabled: Option<bool>,
    pub cpu_performance_mode: Option<bool>,
    pub wireless_adb_enabled: Option<bool>,
    pub update_folders_locked: Option<bool>,
    /// Raw `state:` values keyed by preference name.
    pub shell_preferences: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileSnapshot {
    pub taken_at: DateTime<Utc>,
    /// Only categories whose liveness could be determined.
    pub categories: BTreeMap<TweakCategory, bool>,
    pub system: SystemStates,
}

impl ReconcileSnapshot {
    pub fn is_alive(&self, category: TweakCategory) -> Option<bool> {
        self.categories.get(&category).copied()
    }
}

fn preference_marker(preference: ShellPreference) -> String {
    format!(
        "{MARK_PREFERENCE_PREFIX}{}__",
        preference.key().to_ascii_uppercase()
    )
}

pub fn build_status_command() -> String {
    let folders = UPDATE_FOLDERS.join(" ");
    let mut lines = vec![
        format!("echo {MARK_PROCESSES}"),
        "ps -ef 2>/dev/null".to_string(),
        format!("echo {MARK_ROOT_BLOCK}"),
        format!("mount | grep {HOSTS_TARGET}"),
        format!("echo {MARK_CPU_GOVERNOR}"),
        "cat /sys/devices/system/cpu/cpu0/cpufreq/scaling_governor 2>/dev/null || echo 'N/A'"
            .to_string(),
        format!("echo {MARK_ADB_PORT}"),
        "getprop service.adb.tcp.port 2>/dev/null || echo '-1'".to_string(),
        format!("echo {MARK_LOCK_STATE}"),
        format!("ls -ld {folders} 2>/dev/null | grep -c '{LOCKED_MODE_SIGNATURE}'"),
    ];
    for preference in ShellPreference::ALL {
        lines.push(format!("echo {}", preference_marker(preference)));
        lines.push(format!(
            "oculuspreferences --getc {} 2>/dev/null || echo 'state: {}'",
            preference.key(),
            preference.default_state()
        ));
    }
    lines.join("\n")
}

/// Splits output on marker lines. Lines before the first marker are dropped.
pub fn split_marked_sections(output: &str) -> HashMap<String, String> {
    let mut sections: HashMap<String, String> = HashMap::new();
    let mut current: Option<String> = None;

    for line in output.lines() {
        let trimmed = line.trim();
        if is_marker(trimmed) {
            sections.entry(trimmed.to_string()).or_default();
            current = Some(trimmed.to_string());
            continue;
        }
        if let Some(buf) = current.as_ref().and_then(|key| sections.get_mut(key)) {
            buf.push_str(line);
            buf.push('\n');
        }
    }

    sections
}

fn is_marker(line: &str) -> bool {
    line.starts_with("__EH_STATUS_") && line.ends_with("__") && !line.contains(' ')
}

/// True when any process line carries `script_name` as a whole path component of a
/// token. Lines mentioning `grep` are ignored.
pub fn process_table_contains(process_table: &str, script_name: &str) -> bool {
    let suffix = format!("/{script_name}");
    process_table
        .lines()
        .filter(|line| !line.contains("grep"))
        .flat_map(str::split_whitespace)
        .any(|token| token == script_name || token.ends_with(&suffix))
}

pub fn parse_category_liveness(process_table: &str) -> BTreeMap<TweakCategory, bool> {
    TweakCategory::ALL
        .into_iter()
        .map(|category| {
            (
                category,
                process_table_contains(process_table, category.script_name()),
            )
        })
        .collect()
}

fn state_regex() -> &'static Regex {
    static STATE: OnceLock<Regex> = OnceLock::new();
    STATE.get_or_init(|| Regex::new(r"state:\s*(\S+)").expect("state pattern"))
}

/// Extracts the value from `oculuspreferences --getc` output (`... state: <value>`).
pub fn parse_preference_state(raw: &str) -> Option<String> {
    state_regex()
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|value| value.as_str().to_string())
}

fn single_value(sections: &HashMap<String, String>, marker: &str) -> Option<String> {
    sections
        .get(marker)
        .map(|body| body.lines().next().unwrap_or_default().trim().to_string())
}

pub fn parse_system_states(sections: &HashMap<String, String>) -> SystemStates {
    let root_blocker_enabled = sections
        .get(MARK_ROOT_BLOCK)
        .map(|body| !body.trim().is_empty());
    let cpu_performance_mode =
        single_value(sections, MARK_CPU_GOVERNOR).map(|value| value == PERFORMANCE_GOVERNOR);
    let wireless_adb_enabled =
        single_value(sections, MARK_ADB_PORT).map(|value| value == WIRELESS_ADB_PORT);
    let update_folders_locked = single_value(sections, MARK_LOCK_STATE)
        .and_then(|value| value.parse::<usize>().ok())
        .map(|count| count == UPDATE_FOLDERS.len());

    let shell_preferences = ShellPreference::ALL
        .into_iter()
        .filter_map(|preference| {
            let body = sections.get(&preference_marker(preference))?;
            let value = parse_preference_state(body)?;
            Some((preference.key().to_string(), value))
        })
        .collect();

    SystemStates {
        root_blocker_enabled,
        cpu_performance_mode,
        wireless_adb_enabled,
        update_folders_locked,
        shell_preferences,
    }
}

pub fn parse_status_output(output: &str, taken_at: DateTime<Utc>) -> ReconcileSnapshot {
    let sections = split_marked_sections(output);
    let categories = sections
        .get(MARK_PROCESSES)
        .filter(|table| !table.trim().is_empty())
        .map(|table| parse_category_liveness(table))
        .unwrap_or_default();
    ReconcileSnapshot {
        taken_at,
        categories,
        system: parse_system_states(&sections),
    }
}
