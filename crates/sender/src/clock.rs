//! Local-time resolution for the configured zone.

use chrono::{FixedOffset, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// Fallback offset when the configured zone name cannot be resolved: +07:00.
const FALLBACK_OFFSET_SECS: i32 = 7 * 3600;

/// The zone used for `{time_now}` substitution and the scheduler's safe
/// windows.
#[derive(Debug, Clone, Copy)]
pub enum Zone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl Zone {
    /// Resolve an IANA zone name, falling back to a fixed +07:00 offset when
    /// the name is unknown.
    pub fn resolve(name: &str) -> Zone {
        match name.parse::<Tz>() {
            Ok(tz) => Zone::Named(tz),
            Err(_) => Zone::Fixed(
                FixedOffset::east_opt(FALLBACK_OFFSET_SECS).expect("static offset is in range"),
            ),
        }
    }

    /// Current wall-clock time in this zone.
    pub fn now_local(&self) -> NaiveDateTime {
        match self {
            Zone::Named(tz) => Utc::now().with_timezone(tz).naive_local(),
            Zone::Fixed(offset) => Utc::now().with_timezone(offset).naive_local(),
        }
    }

    /// Current local time as "HH:MM".
    pub fn now_hhmm(&self) -> String {
        self.now_local().format("%H:%M").to_string()
    }

    /// Human-readable zone label for logging.
    pub fn label(&self) -> String {
        match self {
            Zone::Named(tz) => tz.name().to_string(),
            Zone::Fixed(offset) => offset.to_string(),
        }
    }
}

impl Default for Zone {
    fn default() -> Self {
        Zone::resolve("Asia/Jakarta")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_zone() {
        assert!(matches!(Zone::resolve("Asia/Jakarta"), Zone::Named(_)));
    }

    #[test]
    fn unknown_zone_falls_back_to_fixed_offset() {
        let zone = Zone::resolve("Not/AZone");
        match zone {
            Zone::Fixed(offset) => assert_eq!(offset.local_minus_utc(), 7 * 3600),
            Zone::Named(_) => panic!("expected fixed offset"),
        }
    }

    #[test]
    fn hhmm_shape() {
        let s = Zone::default().now_hhmm();
        assert_eq!(s.len(), 5);
        assert_eq!(s.as_bytes()[2], b':');
    }
}
