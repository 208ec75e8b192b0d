use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::app::error::AppError;
use crate::app::tweaks::category::TweakCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Default for LedColor {
    fn default() -> Self {
        Self {
            red: 255,
            green: 255,
            blue: 255,
        }
    }
}

impl FromStr for LedColor {
    type Err = String;

    /// Parses `R,G,B` with each channel in `0..=255`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let channels = value
            .split(',')
            .map(|part| part.trim().parse::<u8>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| format!("Invalid color channel in '{value}' (expected 0-255)"))?;
        match channels.as_slice() {
            [red, green, blue] => Ok(Self {
                red: *red,
                green: *green,
                blue: *blue,
            }),
            _ => Err(format!("Expected three channels R,G,B but got '{value}'")),
        }
    }
}

/// Optional parameters carried by a start action. Missing values fall back to the
/// persisted selection, then to configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TweakParams {
    pub color: Option<LedColor>,
    pub gpu_max_freq_mhz: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TweakAction {
    Start {
        category: TweakCategory,
        params: TweakParams,
    },
    Stop(TweakCategory),
    StopAll,
    Refresh,
    StartWirelessAdb,
    StopWirelessAdb,
    ApplyPassthroughFix,
}

impl TweakAction {
    pub fn start(category: TweakCategory) -> Self {
        TweakAction::Start {
            category,
            params: TweakParams::default(),
        }
    }

    pub fn with_params(self, params: TweakParams) -> Self {
        match self {
            TweakAction::Start { category, .. } => TweakAction::Start { category, params },
            other => other,
        }
    }

    /// Parses an identifier such as `START_CUSTOM_LED` or `STOP_ALL`.
    pub fn parse(value: &str, trace_id: &str) -> Result<Self, AppError> {
        value
            .parse::<TweakAction>()
            .map_err(|err| AppError::validation(err, trace_id))
    }

    pub fn identifier(&self) -> String {
        match self {
            TweakAction::Start { category, .. } => format!("START_{}", category.action_suffix()),
            TweakAction::Stop(category) => format!("STOP_{}", category.action_suffix()),
            TweakAction::StopAll => "STOP_ALL".to_string(),
            TweakAction::Refresh => "REFRESH".to_string(),
            TweakAction::StartWirelessAdb => "START_WIRELESS_ADB".to_string(),
            TweakAction::StopWirelessAdb => "STOP_WIRELESS_ADB".to_string(),
            TweakAction::ApplyPassthroughFix => "APPLY_PASSTHROUGH_FIX".to_string(),
        }
    }
}

impl fmt::Display for TweakAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

impl FromStr for TweakAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "STOP_ALL" => return Ok(TweakAction::StopAll),
            "REFRESH" => return Ok(TweakAction::Refresh),
            "START_WIRELESS_ADB" => return Ok(TweakAction::StartWirelessAdb),
            "STOP_WIRELESS_ADB" => return Ok(TweakAction::StopWirelessAdb),
            "APPLY_PASSTHROUGH_FIX" => return Ok(TweakAction::ApplyPassthroughFix),
            _ => {}
        }
        if let Some(category) = normalized
            .strip_prefix("START_")
            .and_then(TweakCategory::from_action_suffix)
        {
            return Ok(TweakAction::start(category));
        }
        if let Some(category) = normalized
            .strip_prefix("STOP_")
            .and_then(TweakCategory::from_action_suffix)
        {
            return Ok(TweakAction::Stop(category));
        }
        Err(format!("Unknown action: {value}"))
    }
}
