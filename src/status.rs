//! Display status of a repeater, derived from its keyed flag and report age.
use chrono::{DateTime, Utc};

/// A node whose last report is older than this is considered stale.
///
/// Independent of the refresh interval.
pub const STALE_AFTER_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayStatus {
    /// Currently transmitting.
    Active,
    /// Last report is older than [`STALE_AFTER_SECS`].
    Stale,
    Normal,
}

impl DisplayStatus {
    /// Marker image for this status. ATAK renders these at 32px.
    pub fn icon_href(self) -> &'static str {
        match self {
            DisplayStatus::Active => "https://maps.google.com/mapfiles/kml/paddle/ylw-blank.png",
            DisplayStatus::Stale => "https://maps.google.com/mapfiles/kml/paddle/X.png",
            DisplayStatus::Normal => "https://maps.google.com/mapfiles/kml/paddle/grn-blank.png",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            DisplayStatus::Active => "yellow",
            DisplayStatus::Stale => "red",
            DisplayStatus::Normal => "green",
        }
    }
}

/// Keyed state wins over staleness: a transmitting node is always highlighted,
/// however old its last report.
pub fn classify(keyed: &str, last_report_epoch_secs: i64, now: DateTime<Utc>) -> DisplayStatus {
    if keyed == "1" {
        return DisplayStatus::Active;
    }

    let age = now.timestamp().saturating_sub(last_report_epoch_secs);
    if age > STALE_AFTER_SECS {
        DisplayStatus::Stale
    } else {
        DisplayStatus::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn keyed_is_always_active() {
        let now = at(1_700_000_000);
        for last in [0, 1_699_000_000, 1_700_000_000, 1_800_000_000] {
            assert_eq!(classify("1", last, now), DisplayStatus::Active);
        }
    }

    #[test]
    fn old_report_is_stale() {
        let now = at(1_700_000_000);
        assert_eq!(classify("0", 1_700_000_000 - 301, now), DisplayStatus::Stale);
        assert_eq!(classify("0", 0, now), DisplayStatus::Stale);
        assert_eq!(classify("", 1_700_000_000 - 3600, now), DisplayStatus::Stale);
    }

    #[test]
    fn threshold_is_exclusive() {
        let now = at(1_700_000_000);
        assert_eq!(classify("0", 1_700_000_000 - 300, now), DisplayStatus::Normal);
        assert_eq!(classify("0", 1_700_000_000, now), DisplayStatus::Normal);
    }

    #[test]
    fn future_report_is_normal() {
        let now = at(1_700_000_000);
        assert_eq!(classify("0", 1_700_000_500, now), DisplayStatus::Normal);
    }

    #[test]
    fn only_literal_one_counts_as_keyed() {
        let now = at(1_700_000_000);
        assert_eq!(classify("true", 0, now), DisplayStatus::Stale);
        assert_eq!(classify(" 1", 0, now), DisplayStatus::Stale);
    }

    #[test]
    fn marker_per_status() {
        assert!(DisplayStatus::Active.icon_href().ends_with("ylw-blank.png"));
        assert!(DisplayStatus::Stale.icon_href().ends_with("X.png"));
        assert!(DisplayStatus::Normal.icon_href().ends_with("grn-blank.png"));
        assert_eq!(DisplayStatus::Stale.color(), "red");
    }
}
