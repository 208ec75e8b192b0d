use std::collections::{BTreeMap, HashMap};

use crate::app::models::{CpuTelemetry, GpuTelemetry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTotals {
    pub total: u64,
    pub idle: u64,
}

/// Counters for every `cpuN` line, keyed by core index.
pub type CoreTotals = BTreeMap<u32, CpuTotals>;

pub const MARK_PROC_STAT: &str = "__EH_TELEMETRY_PROC_STAT__";
pub const MARK_CPU_FREQ: &str = "__EH_TELEMETRY_CPU_FREQ__";
pub const MARK_THERMAL: &str = "__EH_TELEMETRY_THERMAL__";
pub const MARK_GOVERNOR: &str = "__EH_TELEMETRY_GOVERNOR__";
pub const MARK_GPU_FREQ: &str = "__EH_TELEMETRY_GPU_FREQ__";
pub const MARK_GPU_MIN: &str = "__EH_TELEMETRY_GPU_MIN__";
pub const MARK_GPU_MAX: &str = "__EH_TELEMETRY_GPU_MAX__";
pub const MARK_GPU_BUSY: &str = "__EH_TELEMETRY_GPU_BUSY__";
pub const MARK_GPU_TEMP: &str = "__EH_TELEMETRY_GPU_TEMP__";

const MARKERS: [&str; 9] = [
    MARK_PROC_STAT,
    MARK_CPU_FREQ,
    MARK_THERMAL,
    MARK_GOVERNOR,
    MARK_GPU_FREQ,
    MARK_GPU_MIN,
    MARK_GPU_MAX,
    MARK_GPU_BUSY,
    MARK_GPU_TEMP,
];

pub const LITTLE_CORES: [u32; 4] = [0, 1, 2, 3];
pub const BIG_CORES: [u32; 3] = [4, 5, 6];

const KGSL: &str = "/sys/class/kgsl/kgsl-3d0";
const HZ_THRESHOLD: u64 = 100_000_000;

/// `cat` of the first readable node among `paths`.
fn first_readable(paths: &[String]) -> String {
    paths
        .iter()
        .map(|path| format!("cat {path} 2>/dev/null"))
        .collect::<Vec<_>>()
        .join(" || ")
}

pub fn build_telemetry_script() -> String {
    let gpu_freq = first_readable(&[format!("{KGSL}/gpuclk"), format!("{KGSL}/devfreq/cur_freq")]);
    let gpu_min = first_readable(&[
        format!("{KGSL}/min_clock_mhz"),
        format!("{KGSL}/devfreq/min_freq"),
    ]);
    let gpu_max = first_readable(&[
        format!("{KGSL}/max_clock_mhz"),
        format!("{KGSL}/devfreq/max_freq"),
        format!("{KGSL}/max_gpuclk"),
    ]);
    let gpu_busy = first_readable(&[
        format!("{KGSL}/gpubusy"),
        format!("{KGSL}/gpu_busy_percentage"),
    ]);
    let gpu_temp = first_readable(&[
        format!("{KGSL}/temp"),
        "/sys/class/thermal/thermal_zone10/temp".to_string(),
        "/sys/class/thermal/thermal_zone9/temp".to_string(),
    ]);
    let cpufreq = "/sys/devices/system/cpu/cpu$c/cpufreq";

    [
        format!("echo {MARK_PROC_STAT}"),
        "cat /proc/stat".to_string(),
        format!("echo {MARK_CPU_FREQ}"),
        format!(
            "for c in 0 4; do echo \"$c $(cat {cpufreq}/scaling_min_freq 2>/dev/null) $(cat {cpufreq}/scaling_max_freq 2>/dev/null)\"; done"
        ),
        format!("echo {MARK_THERMAL}"),
        "for z in /sys/class/thermal/thermal_zone*; do echo \"$(cat $z/type 2>/dev/null) $(cat $z/temp 2>/dev/null)\"; done".to_string(),
        format!("echo {MARK_GOVERNOR}"),
        "cat /sys/devices/system/cpu/cpu0/cpufreq/scaling_governor 2>/dev/null".to_string(),
        format!("echo {MARK_GPU_FREQ}"),
        gpu_freq,
        format!("echo {MARK_GPU_MIN}"),
        gpu_min,
        format!("echo {MARK_GPU_MAX}"),
        gpu_max,
        format!("echo {MARK_GPU_BUSY}"),
        gpu_busy,
        format!("echo {MARK_GPU_TEMP}"),
        gpu_temp,
    ]
    .join("; ")
}

pub fn split_marked_sections(output: &str) -> HashMap<&'static str, String> {
    let mut sections: HashMap<&'static str, String> = HashMap::new();
    let mut current: Option<&'static str> = None;

    for line in output.lines() {
        if let Some(marker) = MARKERS.iter().copied().find(|marker| *marker == line.trim()) {
            current = Some(marker);
            sections.entry(marker).or_default();
            continue;
        }

        if let Some(buf) = current.and_then(|key| sections.get_mut(key)) {
            buf.push_str(line);
            buf.push('\n');
        }
    }

    sections
}

/// Per-core counters from `/proc/stat`; the aggregate `cpu` line is skipped.
pub fn parse_core_totals(proc_stat: &str) -> CoreTotals {
    let mut cores = CoreTotals::new();
    for line in proc_stat.lines() {
        let mut parts = line.split_whitespace();
        let Some(label) = parts.next() else {
            continue;
        };
        let Some(index) = label.strip_prefix("cpu").and_then(|idx| idx.parse::<u32>().ok())
        else {
            continue;
        };
        let values: Vec<u64> = parts.map_while(|part| part.parse::<u64>().ok()).collect();
        if values.len() < 4 {
            continue;
        }
        // user nice system idle iowait irq softirq
        let counter = |idx: usize| values.get(idx).copied().unwrap_or(0);
        let idle = counter(3);
        let total = (0..7).map(counter).fold(0u64, u64::saturating_add);
        cores.insert(index, CpuTotals { total, idle });
    }
    cores
}

pub fn compute_cpu_percent_x100(prev: CpuTotals, curr: CpuTotals) -> Option<u16> {
    let delta_total = curr.total.saturating_sub(prev.total);
    if delta_total == 0 {
        return None;
    }
    let delta_idle = curr.idle.saturating_sub(prev.idle);
    let busy = delta_total.saturating_sub(delta_idle);
    let percent_x100 = ((busy as u128) * 10_000u128 / (delta_total as u128)).min(10_000u128) as u16;
    Some(percent_x100)
}

/// Mean busy share of `cores` between two samples. Cores missing from either sample
/// are left out; `None` when none remain.
pub fn cluster_usage_percent(prev: &CoreTotals, curr: &CoreTotals, cores: &[u32]) -> Option<f64> {
    let samples: Vec<f64> = cores
        .iter()
        .filter_map(|core| {
            let before = prev.get(core)?;
            let after = curr.get(core)?;
            compute_cpu_percent_x100(*before, *after)
        })
        .map(|x100| f64::from(x100) / 100.0)
        .collect();
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

fn parse_u64(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok()
}

pub fn khz_to_mhz(khz: u64) -> u64 {
    khz / 1_000
}

/// GPU nodes report MHz or Hz depending on the kernel; anything above 100 MHz
/// expressed in Hz is converted.
pub fn normalize_gpu_freq_mhz(value: u64) -> u64 {
    if value > HZ_THRESHOLD {
        value / 1_000_000
    } else {
        value
    }
}

pub fn normalize_temp_celsius(raw: i64) -> i64 {
    if raw > 1_000 {
        raw / 1_000
    } else {
        raw
    }
}

/// `gpubusy` prints "busy total"; `gpu_busy_percentage` prints a bare number,
/// sometimes with a trailing `%`.
pub fn parse_gpu_busy(raw: &str) -> Option<u64> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    match parts.as_slice() {
        [busy, total] => {
            let busy = parse_u64(busy)?;
            let total = parse_u64(total)?;
            if total == 0 {
                return Some(0);
            }
            Some((busy.saturating_mul(100) / total).min(100))
        }
        [single] => parse_u64(single.trim_end_matches('%')).map(|value| value.min(100)),
        _ => None,
    }
}

/// First thermal zone whose type mentions `cpu`, case-insensitively.
pub fn parse_cpu_temperature(thermal: &str) -> Option<i64> {
    thermal.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let zone_type = parts.next()?;
        if !zone_type.to_ascii_lowercase().contains("cpu") {
            return None;
        }
        let temp = parts.next()?.parse::<i64>().ok()?;
        Some(normalize_temp_celsius(temp))
    })
}

/// Lines of `<core> <min_khz> <max_khz>`, values in MHz.
pub fn parse_cpu_freqs(section: &str) -> HashMap<u32, (Option<u64>, Option<u64>)> {
    let mut freqs = HashMap::new();
    for line in section.lines() {
        let mut parts = line.split_whitespace();
        let Some(core) = parts.next().and_then(|core| core.parse::<u32>().ok()) else {
            continue;
        };
        let min = parts.next().and_then(parse_u64).map(khz_to_mhz);
        let max = parts.next().and_then(parse_u64).map(khz_to_mhz);
        freqs.insert(core, (min, max));
    }
    freqs
}

pub fn parse_cpu_telemetry(
    sections: &HashMap<&'static str, String>,
    prev: Option<&CoreTotals>,
    curr: &CoreTotals,
) -> CpuTelemetry {
    let freqs = sections
        .get(MARK_CPU_FREQ)
        .map(|section| parse_cpu_freqs(section))
        .unwrap_or_default();
    let little = freqs.get(&LITTLE_CORES[0]).copied().unwrap_or((None, None));
    let big = freqs.get(&BIG_CORES[0]).copied().unwrap_or((None, None));

    CpuTelemetry {
        temp_celsius: sections
            .get(MARK_THERMAL)
            .and_then(|section| parse_cpu_temperature(section)),
        little_min_freq_mhz: little.0,
        little_max_freq_mhz: little.1,
        big_min_freq_mhz: big.0,
        big_max_freq_mhz: big.1,
        little_usage_percent: prev
            .and_then(|prev| cluster_usage_percent(prev, curr, &LITTLE_CORES)),
        big_usage_percent: prev.and_then(|prev| cluster_usage_percent(prev, curr, &BIG_CORES)),
        governor: sections
            .get(MARK_GOVERNOR)
            .map(|section| section.trim().to_string())
            .filter(|governor| !governor.is_empty()),
    }
}

pub fn parse_gpu_telemetry(sections: &HashMap<&'static str, String>) -> GpuTelemetry {
    let freq = |marker: &str| {
        sections
            .get(marker)
            .and_then(|section| parse_u64(section))
            .map(normalize_gpu_freq_mhz)
    };
    GpuTelemetry {
        temp_celsius: sections
            .get(MARK_GPU_TEMP)
            .and_then(|section| section.trim().parse::<i64>().ok())
            .map(normalize_temp_celsius),
        freq_mhz: freq(MARK_GPU_FREQ),
        min_freq_mhz: freq(MARK_GPU_MIN),
        max_freq_mhz: freq(MARK_GPU_MAX),
        usage_percent: sections
            .get(MARK_GPU_BUSY)
            .and_then(|section| parse_gpu_busy(section)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(lines: &[&str]) -> CoreTotals {
        parse_core_totals(&lines.join("\n"))
    }

    #[test]
    fn parse_core_totals_skips_aggregate_line() {
        let cores = stat(&[
            "cpu  900 0 300 1800 0 0 0 0 0 0",
            "cpu0 100 0 50 200 10 5 5 0 0 0",
            "cpu4 10 0 10 80 0 0 0",
            "intr 12345",
        ]);
        assert_eq!(cores.len(), 2);
        assert_eq!(cores[&0], CpuTotals { total: 370, idle: 200 });
        assert_eq!(cores[&4], CpuTotals { total: 100, idle: 80 });
    }

    #[test]
    fn cluster_usage_averages_only_cores_present_in_both_samples() {
        let prev = stat(&["cpu0 0 0 0 100", "cpu1 0 0 0 100", "cpu2 0 0 0 100"]);
        let curr = stat(&[
            "cpu0 50 0 0 150",
            "cpu1 100 0 0 100",
            "cpu3 10 0 0 10",
        ]);
        // cpu0: 50/100 busy, cpu1: 100/100 busy, cpu2 and cpu3 dropped
        assert_eq!(cluster_usage_percent(&prev, &curr, &LITTLE_CORES), Some(75.0));
        assert_eq!(cluster_usage_percent(&prev, &curr, &BIG_CORES), None);
    }

    #[test]
    fn compute_cpu_percent_x100_returns_none_when_no_delta() {
        let sample = CpuTotals { total: 10, idle: 5 };
        assert_eq!(compute_cpu_percent_x100(sample, sample), None);
    }

    #[test]
    fn gpu_frequencies_accept_mhz_and_hz() {
        assert_eq!(normalize_gpu_freq_mhz(492), 492);
        assert_eq!(normalize_gpu_freq_mhz(690_000_000), 690);
        assert_eq!(normalize_gpu_freq_mhz(100_000_000), 100_000_000);
    }

    #[test]
    fn temperatures_accept_millidegrees() {
        assert_eq!(normalize_temp_celsius(42_500), 42);
        assert_eq!(normalize_temp_celsius(38), 38);
    }

    #[test]
    fn gpu_busy_handles_both_node_formats() {
        assert_eq!(parse_gpu_busy("250 1000\n"), Some(25));
        assert_eq!(parse_gpu_busy("0 0"), Some(0));
        assert_eq!(parse_gpu_busy("37 %"), None);
        assert_eq!(parse_gpu_busy("37%"), Some(37));
        assert_eq!(parse_gpu_busy("  61\n"), Some(61));
        assert_eq!(parse_gpu_busy(""), None);
    }

    #[test]
    fn cpu_temperature_uses_first_cpu_zone() {
        let thermal = "battery 30000\nCPU0-silver 45000\ncpu4-gold 52000\n";
        assert_eq!(parse_cpu_temperature(thermal), Some(45));
        assert_eq!(parse_cpu_temperature("gpu 50000\n"), None);
    }

    #[test]
    fn full_batch_parses_into_snapshots() {
        let output = [
            MARK_PROC_STAT,
            "cpu  0 0 0 0",
            "cpu0 50 0 0 150",
            "cpu4 25 0 0 175",
            MARK_CPU_FREQ,
            "0 691200 1804800",
            "4 691200 2419200",
            MARK_THERMAL,
            "cpu-0-0-usr 47100",
            MARK_GOVERNOR,
            "schedutil",
            MARK_GPU_FREQ,
            "285000000",
            MARK_GPU_MIN,
            "285",
            MARK_GPU_MAX,
            "690000000",
            MARK_GPU_BUSY,
            "120 400",
            MARK_GPU_TEMP,
            "51000",
        ]
        .join("\n");
        let sections = split_marked_sections(&output);
        let prev = stat(&["cpu0 0 0 0 100", "cpu4 0 0 0 100"]);
        let curr = parse_core_totals(&sections[MARK_PROC_STAT]);

        let cpu = parse_cpu_telemetry(&sections, Some(&prev), &curr);
        assert_eq!(cpu.temp_celsius, Some(47));
        assert_eq!(cpu.little_min_freq_mhz, Some(691));
        assert_eq!(cpu.little_max_freq_mhz, Some(1804));
        assert_eq!(cpu.big_max_freq_mhz, Some(2419));
        assert_eq!(cpu.little_usage_percent, Some(50.0));
        assert_eq!(cpu.big_usage_percent, Some(25.0));
        assert_eq!(cpu.governor.as_deref(), Some("schedutil"));

        let gpu = parse_gpu_telemetry(&sections);
        assert_eq!(gpu.freq_mhz, Some(285));
        assert_eq!(gpu.min_freq_mhz, Some(285));
        assert_eq!(gpu.max_freq_mhz, Some(690));
        assert_eq!(gpu.usage_percent, Some(30));
        assert_eq!(gpu.temp_celsius, Some(51));
    }

    #[test]
    fn first_sample_has_no_usage() {
        let sections = split_marked_sections(&format!("{MARK_PROC_STAT}\ncpu0 1 0 0 1\n"));
        let curr = parse_core_totals(&sections[MARK_PROC_STAT]);
        let cpu = parse_cpu_telemetry(&sections, None, &curr);
        assert_eq!(cpu.little_usage_percent, None);
        assert_eq!(cpu.temp_celsius, None);
        assert_eq!(cpu.governor, None);
    }

    #[test]
    fn telemetry_script_marks_every_section() {
        let script = build_telemetry_script();
        for marker in MARKERS {
            assert!(script.contains(&format!("echo {marker}")), "{marker}");
        }
        assert!(script.contains("cat /sys/class/kgsl/kgsl-3d0/gpuclk 2>/dev/null || cat"));
    }
}
