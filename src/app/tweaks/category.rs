use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One independently controllable root-owned background script.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TweakCategory {
    RainbowLed,
    CustomLed,
    PowerLed,
    MinFreqCpuLock,
    MinFreqGpuLock,
    MaxFreqGpuLock,
    AppLaunchInterceptor,
    UsbNotificationInterceptor,
}

impl TweakCategory {
    pub const ALL: [TweakCategory; 8] = [
        TweakCategory::RainbowLed,
        TweakCategory::CustomLed,
        TweakCategory::PowerLed,
        TweakCategory::MinFreqCpuLock,
        TweakCategory::MinFreqGpuLock,
        TweakCategory::MaxFreqGpuLock,
        TweakCategory::AppLaunchInterceptor,
        TweakCategory::UsbNotificationInterceptor,
    ];

    /// These drive the same LED nodes and must never run together.
    pub const LEDS: [TweakCategory; 3] = [
        TweakCategory::RainbowLed,
        TweakCategory::CustomLed,
        TweakCategory::PowerLed,
    ];

    pub fn is_led(self) -> bool {
        Self::LEDS.contains(&self)
    }

    pub fn script_name(self) -> &'static str {
        match self {
            TweakCategory::RainbowLed => "rgb_led.sh",
            TweakCategory::CustomLed => "custom_led.sh",
            TweakCategory::PowerLed => "power_led.sh",
            TweakCategory::MinFreqCpuLock => "min_freq_lock.sh",
            TweakCategory::MinFreqGpuLock => "gpu_min_freq_lock.sh",
            TweakCategory::MaxFreqGpuLock => "gpu_max_freq_lock.sh",
            TweakCategory::AppLaunchInterceptor => "interceptor.sh",
            TweakCategory::UsbNotificationInterceptor => "usb_interceptor.sh",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            TweakCategory::RainbowLed => "rgb_led",
            TweakCategory::CustomLed => "custom_led",
            TweakCategory::PowerLed => "power_led",
            TweakCategory::MinFreqCpuLock => "min_freq",
            TweakCategory::MinFreqGpuLock => "gpu_min_freq",
            TweakCategory::MaxFreqGpuLock => "gpu_max_freq",
            TweakCategory::AppLaunchInterceptor => "interceptor",
            TweakCategory::UsbNotificationInterceptor => "usb_interceptor",
        }
    }

    /// Mirror key holding the orchestrator's belief.
    pub fn running_key(self) -> &'static str {
        match self {
            TweakCategory::RainbowLed => "rgb_led_is_running",
            TweakCategory::CustomLed => "custom_led_is_running",
            TweakCategory::PowerLed => "power_led_is_running",
            TweakCategory::MinFreqCpuLock => "min_freq_is_running",
            TweakCategory::MinFreqGpuLock => "gpu_min_freq_is_running",
            TweakCategory::MaxFreqGpuLock => "gpu_max_freq_is_running",
            TweakCategory::AppLaunchInterceptor => "interceptor_is_running",
            TweakCategory::UsbNotificationInterceptor => "usb_interceptor_is_running",
        }
    }

    pub fn boot_key(self) -> &'static str {
        match self {
            TweakCategory::RainbowLed => "rgb_on_boot",
            TweakCategory::CustomLed => "custom_led_on_boot",
            TweakCategory::PowerLed => "power_led_on_boot",
            TweakCategory::MinFreqCpuLock => "min_freq_on_boot",
            TweakCategory::MinFreqGpuLock => "gpu_min_freq_on_boot",
            TweakCategory::MaxFreqGpuLock => "gpu_max_freq_on_boot",
            TweakCategory::AppLaunchInterceptor => "intercept_startup_apps",
            TweakCategory::UsbNotificationInterceptor => "usb_interceptor_on_boot",
        }
    }

    /// Identifier fragment used by action names such as `START_RGB`.
    pub fn action_suffix(self) -> &'static str {
        match self {
            TweakCategory::RainbowLed => "RGB",
            TweakCategory::CustomLed => "CUSTOM_LED",
            TweakCategory::PowerLed => "POWER_LED",
            TweakCategory::MinFreqCpuLock => "MIN_FREQ",
            TweakCategory::MinFreqGpuLock => "GPU_MIN_FREQ",
            TweakCategory::MaxFreqGpuLock => "GPU_MAX_FREQ",
            TweakCategory::AppLaunchInterceptor => "INTERCEPTOR",
            TweakCategory::UsbNotificationInterceptor => "USB_INTERCEPTOR",
        }
    }

    pub fn from_action_suffix(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.action_suffix() == value)
    }
}

impl fmt::Display for TweakCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for TweakCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| {
                category.key() == normalized
                    || category.script_name() == normalized
                    || category.action_suffix().eq_ignore_ascii_case(&normalized)
            })
            .ok_or_else(|| format!("Unknown tweak category: {value}"))
    }
}

/// Lifecycle of a category as believed by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CategoryState {
    #[default]
    Stopped,
    /// Script written, launch not yet issued.
    Starting,
    /// Launched, or confirmed by reconciliation.
    Running,
    /// Kill issued.
    Stopping,
}

impl CategoryState {
    pub fn is_active(self) -> bool {
        matches!(self, CategoryState::Starting | CategoryState::Running)
    }

    pub fn from_liveness(alive: bool) -> Self {
        if alive {
            CategoryState::Running
        } else {
            CategoryState::Stopped
        }
    }
}
