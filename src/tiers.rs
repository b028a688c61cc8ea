use serde::Serialize;

use crate::aggregate::UserAggregate;
use crate::models::MeetingRecord;

pub const HIGH_LOAD_MIN: f64 = 5.0;
pub const MEDIUM_LOAD_MIN: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadTier {
    High,
    Medium,
    Low,
}

impl LoadTier {
    /// Band for a daily meeting count.
    pub fn for_value(daily_meeting_count: f64) -> Self {
        if daily_meeting_count >= HIGH_LOAD_MIN {
            LoadTier::High
        } else if daily_meeting_count >= MEDIUM_LOAD_MIN {
            LoadTier::Medium
        } else {
            LoadTier::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LoadTier::High => "高负担 (≥5)",
            LoadTier::Medium => "中负担 (2-5)",
            LoadTier::Low => "低负担 (<2)",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TierStats {
    pub count: usize,
    pub mean: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TierSummary {
    pub high: TierStats,
    pub medium: TierStats,
    pub low: TierStats,
}

impl TierSummary {
    pub fn get(&self, tier: LoadTier) -> TierStats {
        match tier {
            LoadTier::High => self.high,
            LoadTier::Medium => self.medium,
            LoadTier::Low => self.low,
        }
    }

    pub fn total(&self) -> usize {
        self.high.count + self.medium.count + self.low.count
    }

    fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut sums = [0.0f64; 3];
        let mut counts = [0usize; 3];
        for value in values {
            let slot = match LoadTier::for_value(value) {
                LoadTier::High => 0,
                LoadTier::Medium => 1,
                LoadTier::Low => 2,
            };
            sums[slot] += value;
            counts[slot] += 1;
        }

        let stats = |slot: usize| TierStats {
            count: counts[slot],
            mean: if counts[slot] == 0 {
                0.0
            } else {
                sums[slot] / counts[slot] as f64
            },
        };

        TierSummary {
            high: stats(0),
            medium: stats(1),
            low: stats(2),
        }
    }
}

/// Bands every row by its own daily meeting count.
pub fn classify_rows(records: &[MeetingRecord]) -> TierSummary {
    TierSummary::from_values(records.iter().map(|record| record.daily_meeting_count))
}

/// Bands users by their mean daily meeting count.
pub fn classify_users(users: &[UserAggregate]) -> TierSummary {
    TierSummary::from_values(users.iter().map(|user| user.mean))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::fixtures::record;
    use crate::aggregate::user_aggregates;
    use crate::models::Metric;

    #[test]
    fn boundaries_belong_to_upper_band() {
        assert_eq!(LoadTier::for_value(5.0), LoadTier::High);
        assert_eq!(LoadTier::for_value(4.999), LoadTier::Medium);
        assert_eq!(LoadTier::for_value(2.0), LoadTier::Medium);
        assert_eq!(LoadTier::for_value(1.999), LoadTier::Low);
        assert_eq!(LoadTier::for_value(0.0), LoadTier::Low);
    }

    #[test]
    fn rows_are_counted_and_averaged_per_band() {
        let rows = vec![
            record("Avery", "9月", 6.0),
            record("Jules", "9月", 8.0),
            record("Kiara", "9月", 3.0),
            record("Morgan", "9月", 1.0),
        ];
        let summary = classify_rows(&rows);
        assert_eq!(summary.high.count, 2);
        assert!((summary.high.mean - 7.0).abs() < 1e-12);
        assert_eq!(summary.get(LoadTier::Medium).count, 1);
        assert!((summary.low.mean - 1.0).abs() < 1e-12);
        assert_eq!(summary.total(), 4);
    }

    #[test]
    fn users_are_banded_by_their_mean() {
        let rows = vec![
            record("Avery", "9月", 6.0),
            record("Avery", "10月", 3.0),
            record("Jules", "9月", 1.0),
        ];
        let users = user_aggregates(&rows, Metric::DailyMeetingCount);
        let summary = classify_users(&users);
        assert_eq!(summary.high.count, 0);
        assert_eq!(summary.high.mean, 0.0);
        assert_eq!(summary.medium.count, 1);
        assert!((summary.medium.mean - 4.5).abs() < 1e-12);
        assert_eq!(summary.low.count, 1);
    }
}
