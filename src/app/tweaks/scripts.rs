//! Script payloads and the shell one-liners that manage them.
//!
//! Payloads are opaque templates; parameters are substituted into `{{NAME}}`
//! placeholders and nothing else about the text is interpreted here.

use crate::app::tweaks::action::LedColor;
use crate::app::tweaks::category::TweakCategory;

pub const RED_LED_PATH: &str = "/sys/class/leds/red/brightness";
pub const GREEN_LED_PATH: &str = "/sys/class/leds/green/brightness";
pub const BLUE_LED_PATH: &str = "/sys/class/leds/blue/brightness";

pub const LEDS_OFF: &str = "echo 0 > /sys/class/leds/red/brightness\n\
echo 0 > /sys/class/leds/green/brightness\n\
echo 0 > /sys/class/leds/blue/brightness";

/// Cores 0-3 are the little cluster, 4-6 the big/prime cores.
pub const LITTLE_CORES: std::ops::RangeInclusive<u8> = 0..=3;
pub const BIG_CORES: std::ops::RangeInclusive<u8> = 4..=6;

pub const GPU_MIN_FREQ_MHZ_PATH: &str = "/sys/class/kgsl/kgsl-3d0/min_clock_mhz";
pub const GPU_MAX_FREQ_HZ_PATH: &str = "/sys/class/kgsl/kgsl-3d0/devfreq/max_freq";

const RAINBOW_TEMPLATE: &str = r#"#!/system/bin/sh
RED_LED="/sys/class/leds/red/brightness"
GREEN_LED="/sys/class/leds/green/brightness"
BLUE_LED="/sys/class/leds/blue/brightness"
set_rgb() { echo "${1}" > "$RED_LED"; echo "${2}" > "$GREEN_LED"; echo "${3}" > "$BLUE_LED"; }
clamp() { if [ "$1" -lt 0 ]; then echo 0; elif [ "$1" -gt 255 ]; then echo 255; else echo "$1"; fi; }
trap "set_rgb 0 0 0; exit" INT TERM
while true; do
    for i in $(seq 0 5 255); do set_rgb $(clamp $((255 - i))) $(clamp ${i}) 0; sleep 0.005; done
    for i in $(seq 0 5 255); do set_rgb 0 $(clamp $((255 - i))) $(clamp ${i}); sleep 0.005; done
    for i in $(seq 0 5 255); do set_rgb $(clamp ${i}) 0 $(clamp $((255 - i))); sleep 0.005; done
done
"#;

const CUSTOM_LED_TEMPLATE: &str = r#"#!/system/bin/sh
RED_LED="/sys/class/leds/red/brightness"
GREEN_LED="/sys/class/leds/green/brightness"
BLUE_LED="/sys/class/leds/blue/brightness"
while true; do
    echo {{RED}} > "$RED_LED"
    echo {{GREEN}} > "$GREEN_LED"
    echo {{BLUE}} > "$BLUE_LED"
    sleep 1
done
"#;

const POWER_LED_TEMPLATE: &str = r#"#!/system/bin/sh
RED_LED="/sys/class/leds/red/brightness"
GREEN_LED="/sys/class/leds/green/brightness"
BLUE_LED="/sys/class/leds/blue/brightness"
BATTERY_PATH="/sys/class/power_supply/battery/capacity"

set_led() {
    echo "$1" > "$RED_LED"
    echo "$2" > "$GREEN_LED"
    echo "$3" > "$BLUE_LED"
}

while true; do
    battery_level=$(cat "$BATTERY_PATH")

    if [ "$battery_level" -ge 95 ]; then
        set_led 0 255 0
    elif [ "$battery_level" -ge 90 ]; then
        set_led 64 255 0
    elif [ "$battery_level" -ge 80 ]; then
        set_led 128 255 0
    elif [ "$battery_level" -ge 70 ]; then
        set_led 180 255 0
    elif [ "$battery_level" -ge 60 ]; then
        set_led 220 255 0
    elif [ "$battery_level" -ge 50 ]; then
        set_led 255 255 0
    elif [ "$battery_level" -ge 40 ]; then
        set_led 255 180 0
    elif [ "$battery_level" -ge 30 ]; then
        set_led 255 128 0
    elif [ "$battery_level" -ge 20 ]; then
        set_led 255 64 0
    elif [ "$battery_level" -ge 10 ]; then
        set_led 255 32 0
    else
        set_led 255 0 0
    fi
    sleep 5
done
"#;

const CPU_MIN_FREQ_TEMPLATE: &str = r#"#!/system/bin/sh
while true; do
{{CORE_WRITES}}
    sleep 2
done
"#;

const GPU_MIN_FREQ_TEMPLATE: &str = r#"#!/system/bin/sh
while true; do
    echo "{{FREQ}}" > {{NODE}}
    sleep 2
done
"#;

const GPU_MAX_FREQ_TEMPLATE: &str = r#"#!/system/bin/sh
while true; do
    echo "{{FREQ}}" > {{NODE}}
    sleep 2
done
"#;

const APP_INTERCEPTOR_TEMPLATE: &str = r#"#!/system/bin/sh
TARGET_EXPLORE_ACTIVITY="com.oculus.explore/.ExploreActivity"
TARGET_CONNECTIONS_ACTIVITY="com.oculus.socialplatform/com.oculus.panelapp.people.PeopleShelfActivity"

logcat -c
logcat -T 0 ActivityTaskManager:D *:S | while read -r line; do
    case "$line" in
        *"START u0"*cmp=$TARGET_EXPLORE_ACTIVITY*)
            pm disable "$TARGET_EXPLORE_ACTIVITY"
            pm enable "$TARGET_EXPLORE_ACTIVITY"
            ;;
        *"START u0"*cmp=$TARGET_CONNECTIONS_ACTIVITY*)
            pm disable "$TARGET_CONNECTIONS_ACTIVITY"
            pm enable "$TARGET_CONNECTIONS_ACTIVITY"
            ;;
    esac
done
"#;

const USB_INTERCEPTOR_TEMPLATE: &str = r#"#!/system/bin/sh

logcat -c
logcat -T 0 OculusNotificationListenerService:D *:S | while read -r line; do
    case "$line" in
        *"Notification posted:"*"usb_connect_enable_mtp"*)
            svc usb setFunctions mtp
            am force-stop com.oculus.notification_proxy
            ;;
    esac
done
"#;

/// Replaces every `{{NAME}}` placeholder with its value.
pub fn render_template(template: &str, params: &[(&str, &str)]) -> String {
    params
        .iter()
        .fold(template.to_string(), |text, (name, value)| {
            text.replace(&format!("{{{{{name}}}}}"), value)
        })
}

pub fn cpu_scaling_min_path(core: u8) -> String {
    format!("/sys/devices/system/cpu/cpu{core}/cpufreq/scaling_min_freq")
}

pub fn rainbow_led_script() -> String {
    RAINBOW_TEMPLATE.to_string()
}

pub fn power_led_script() -> String {
    POWER_LED_TEMPLATE.to_string()
}

pub fn custom_led_script(color: LedColor) -> String {
    render_template(
        CUSTOM_LED_TEMPLATE,
        &[
            ("RED", &color.red.to_string()),
            ("GREEN", &color.green.to_string()),
            ("BLUE", &color.blue.to_string()),
        ],
    )
}

pub fn cpu_min_freq_script(little_freq_khz: &str, big_freq_khz: &str) -> String {
    let writes = LITTLE_CORES
        .map(|core| (core, little_freq_khz))
        .chain(BIG_CORES.map(|core| (core, big_freq_khz)))
        .map(|(core, freq)| format!("    echo \"{freq}\" > {}", cpu_scaling_min_path(core)))
        .collect::<Vec<_>>()
        .join("\n");
    render_template(CPU_MIN_FREQ_TEMPLATE, &[("CORE_WRITES", &writes)])
}

pub fn gpu_min_freq_script(min_freq_mhz: &str) -> String {
    render_template(
        GPU_MIN_FREQ_TEMPLATE,
        &[("FREQ", min_freq_mhz), ("NODE", GPU_MIN_FREQ_MHZ_PATH)],
    )
}

/// The devfreq node takes Hz; an unparsable selection falls back to `fallback_mhz`.
pub fn gpu_max_freq_script(max_freq_mhz: &str, fallback_mhz: &str) -> String {
    let mhz = max_freq_mhz
        .trim()
        .parse::<u64>()
        .or_else(|_| fallback_mhz.trim().parse::<u64>())
        .unwrap_or(0);
    let hz = mhz.saturating_mul(1_000_000).to_string();
    render_template(
        GPU_MAX_FREQ_TEMPLATE,
        &[("FREQ", &hz), ("NODE", GPU_MAX_FREQ_HZ_PATH)],
    )
}

pub fn app_interceptor_script() -> String {
    APP_INTERCEPTOR_TEMPLATE.to_string()
}

pub fn usb_interceptor_script() -> String {
    USB_INTERCEPTOR_TEMPLATE.to_string()
}

/// Wraps `value` in single quotes for `sh`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

pub fn chmod_command(script_path: &str) -> String {
    format!("chmod +x {}", shell_quote(script_path))
}

/// Launches detached: output discarded, survives the launching session.
pub fn launch_command(script_path: &str) -> String {
    format!("nohup {} > /dev/null 2>&1 &", shell_quote(script_path))
}

/// Pattern anchored on the directory separator so `interceptor.sh` never matches
/// `usb_interceptor.sh`. `|| true` makes "nothing to kill" a success.
pub fn kill_command(category: TweakCategory) -> String {
    let escaped = category.script_name().replace('.', r"\.");
    format!("pkill -f '/{escaped}' || true")
}

pub fn gpu_max_reset_command(reset_hz: &str) -> String {
    format!("echo {} > {GPU_MAX_FREQ_HZ_PATH}", shell_quote(reset_hz.trim()))
}
