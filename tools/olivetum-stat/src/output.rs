//! Human-readable and JSON rendering of status samples.

use colored::Colorize;
use olivetum_supervisor::api::TelemetrySample;
use serde_json::{json, Value};

/// Output formatting configuration
pub struct OutputConfig {
    pub use_color: bool,
}

/// One status block, several lines.
pub fn format_sample(sample: &TelemetrySample, config: &OutputConfig) -> String {
    let rate = sample.hashrate().to_human_readable();
    let rate = if config.use_color {
        rate.bright_green().bold().to_string()
    } else {
        rate
    };

    let rejected = if config.use_color && sample.rejected > 0 {
        sample.rejected.to_string().red().to_string()
    } else {
        sample.rejected.to_string()
    };

    let mut out = format!(
        "{}  up {}  shares {}/{}/{}  pool {}",
        rate,
        uptime(sample.uptime_minutes),
        sample.accepted,
        rejected,
        sample.invalid,
        sample.pool,
    );

    for (i, khs) in sample.per_gpu_khs.iter().enumerate() {
        let label = format!("GPU{}", i);
        let label = if config.use_color {
            label.bright_cyan().to_string()
        } else {
            label
        };
        out.push_str(&format!("\n  {} {:>9.2} MH/s", label, *khs as f64 / 1_000.0));
        if let Some(s) = sample.sensors.get(i) {
            out.push_str(&format!("  {}C  fan {}%", s.temp_c, s.fan_percent));
        }
    }
    out
}

pub fn sample_json(sample: &TelemetrySample) -> Value {
    json!({
        "version": sample.version,
        "uptimeMinutes": sample.uptime_minutes,
        "totalKhs": sample.total_khs,
        "accepted": sample.accepted,
        "rejected": sample.rejected,
        "invalid": sample.invalid,
        "poolSwitches": sample.pool_switches,
        "perGpuKhs": sample.per_gpu_khs,
        "sensors": sample
            .sensors
            .iter()
            .map(|s| json!({ "tempC": s.temp_c, "fanPercent": s.fan_percent }))
            .collect::<Vec<_>>(),
        "pool": sample.pool,
    })
}

fn uptime(minutes: u64) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{}m", m),
        (h, m) => format!("{}h{:02}m", h, m),
    }
}
