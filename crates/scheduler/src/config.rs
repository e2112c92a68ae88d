//! Scheduler configuration from environment variables.

use std::env;

/// Default safe windows in minutes from local midnight:
/// 00:45–02:30, 03:00–05:30, 21:30–23:30.
pub const DEFAULT_WINDOWS: &[(u32, u32)] = &[(45, 150), (180, 330), (1290, 1410)];

/// Scheduler knobs.
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | `SCHEDULER_ALWAYS_ON` | unset | `1`/`true`/`yes` bypasses the window gate |
/// | `SCHEDULER_COOLDOWN_HOURS` | 48 | Per-group cooldown |
/// | `SCHEDULER_MIN_DELAY_SEC` | 45 | Post-send jitter lower bound |
/// | `SCHEDULER_MAX_DELAY_SEC` | 120 | Post-send jitter upper bound |
/// | `SCHEDULER_RISK_THRESHOLD` | 3 | Eligibility cutoff and auto-pause level |
/// | `SCHEDULER_WINDOWS` | see above | Comma-separated `start-end` minute ranges |
/// | `TZ_NAME` | Asia/Jakarta | IANA zone for windows and `{time_now}` |
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub always_on: bool,
    pub cooldown_hours: i64,
    pub min_delay_secs: u64,
    pub max_delay_secs: u64,
    pub risk_threshold: i64,
    pub windows: Vec<(u32, u32)>,
    pub tz_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            always_on: false,
            cooldown_hours: 48,
            min_delay_secs: 45,
            max_delay_secs: 120,
            risk_threshold: 3,
            windows: DEFAULT_WINDOWS.to_vec(),
            tz_name: "Asia/Jakarta".to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration, applying environment overrides on top of the
    /// conservative defaults. Malformed values are ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = env::var("SCHEDULER_ALWAYS_ON") {
            cfg.always_on = matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(n) = env_i64("SCHEDULER_COOLDOWN_HOURS") {
            cfg.cooldown_hours = n;
        }
        if let Some(n) = env_i64("SCHEDULER_MIN_DELAY_SEC") {
            cfg.min_delay_secs = n as u64;
        }
        if let Some(n) = env_i64("SCHEDULER_MAX_DELAY_SEC") {
            cfg.max_delay_secs = n as u64;
        }
        if let Some(n) = env_i64("SCHEDULER_RISK_THRESHOLD") {
            cfg.risk_threshold = n;
        }
        if let Ok(v) = env::var("SCHEDULER_WINDOWS") {
            if let Some(windows) = parse_windows(&v) {
                cfg.windows = windows;
            }
        }
        if let Ok(v) = env::var("TZ_NAME") {
            let v = v.trim();
            if !v.is_empty() {
                cfg.tz_name = v.to_string();
            }
        }

        cfg
    }
}

fn env_i64(name: &str) -> Option<i64> {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|n| *n >= 0)
}

/// Parse `"45-150,180-330,1290-1410"` into minute-of-day ranges.
pub fn parse_windows(s: &str) -> Option<Vec<(u32, u32)>> {
    let mut windows = Vec::new();
    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (start, end) = part.split_once('-')?;
        let start: u32 = start.trim().parse().ok()?;
        let end: u32 = end.trim().parse().ok()?;
        if start > end || end >= 1440 {
            return None;
        }
        windows.push((start, end));
    }
    if windows.is_empty() {
        None
    } else {
        Some(windows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let cfg = SchedulerConfig::default();
        assert!(!cfg.always_on);
        assert_eq!(cfg.cooldown_hours, 48);
        assert_eq!(cfg.min_delay_secs, 45);
        assert_eq!(cfg.max_delay_secs, 120);
        assert_eq!(cfg.risk_threshold, 3);
        assert_eq!(cfg.windows.len(), 3);
        assert_eq!(cfg.tz_name, "Asia/Jakarta");
    }

    #[test]
    fn window_parsing() {
        assert_eq!(
            parse_windows("45-150,180-330"),
            Some(vec![(45, 150), (180, 330)])
        );
        assert_eq!(parse_windows(" 45-150 "), Some(vec![(45, 150)]));
        assert_eq!(parse_windows(""), None);
        assert_eq!(parse_windows("150-45"), None);
        assert_eq!(parse_windows("0-1440"), None);
        assert_eq!(parse_windows("abc"), None);
    }
}
