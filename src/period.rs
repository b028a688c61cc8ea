use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Period, PeriodType, SortKey};

static MONTHLY_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})月").expect("monthly label pattern is valid")
});

// A weekly-shaped label whose start date does not exist (e.g. `2.30-3.05`)
// is classified as unknown, not weekly.
static WEEKLY_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})\.(\d{1,2})-(\d{1,2})\.(\d{1,2})")
        .expect("weekly label pattern is valid")
});

/// Type-specific fields recovered from a period label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodDetail {
    Monthly {
        month: u32,
    },
    Weekly {
        start_month: u32,
        start_day: u32,
        end_month: u32,
        end_day: u32,
    },
    Unknown,
}

impl PeriodDetail {
    pub fn period_type(&self) -> PeriodType {
        match self {
            PeriodDetail::Monthly { .. } => PeriodType::Monthly,
            PeriodDetail::Weekly { .. } => PeriodType::Weekly,
            PeriodDetail::Unknown => PeriodType::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedPeriod {
    pub name: String,
    pub detail: PeriodDetail,
    pub sort_key: SortKey,
}

impl ClassifiedPeriod {
    pub fn period_type(&self) -> PeriodType {
        self.detail.period_type()
    }

    pub fn month(&self) -> Option<u32> {
        match self.detail {
            PeriodDetail::Monthly { month } => Some(month),
            _ => None,
        }
    }

    pub fn into_period(self) -> Period {
        Period {
            period_type: self.detail.period_type(),
            name: self.name,
            sort_key: self.sort_key,
        }
    }
}

/// Turns export labels such as `9月会议详情` or `10.20-10.26会议详情` into
/// sortable periods. Labels carry no year, so dates are anchored on a
/// configured reference year.
#[derive(Debug, Clone, Copy)]
pub struct PeriodClassifier {
    reference_year: i32,
}

impl Default for PeriodClassifier {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_REFERENCE_YEAR)
    }
}

impl PeriodClassifier {
    pub fn new(reference_year: i32) -> Self {
        Self { reference_year }
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }

    pub fn classify(&self, label: &str) -> ClassifiedPeriod {
        let name = label.trim().to_string();

        if let Some(classified) = self.classify_monthly(&name) {
            return classified;
        }
        if let Some(classified) = self.classify_weekly(&name) {
            return classified;
        }

        ClassifiedPeriod {
            sort_key: SortKey::Label(name.clone()),
            name,
            detail: PeriodDetail::Unknown,
        }
    }

    /// True when the label matches one of the recognized export shapes.
    pub fn is_recognized(&self, label: &str) -> bool {
        self.classify(label).period_type() != PeriodType::Unknown
    }

    fn classify_monthly(&self, name: &str) -> Option<ClassifiedPeriod> {
        let caps = MONTHLY_LABEL.captures(name)?;
        let month: u32 = caps[1].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(self.reference_year, month, 1)?;

        Some(ClassifiedPeriod {
            name: name.to_string(),
            detail: PeriodDetail::Monthly { month },
            sort_key: SortKey::Dated(date),
        })
    }

    fn classify_weekly(&self, name: &str) -> Option<ClassifiedPeriod> {
        let caps = WEEKLY_LABEL.captures(name)?;
        let start_month: u32 = caps[1].parse().ok()?;
        let start_day: u32 = caps[2].parse().ok()?;
        let end_month: u32 = caps[3].parse().ok()?;
        let end_day: u32 = caps[4].parse().ok()?;

        let start = NaiveDate::from_ymd_opt(self.reference_year, start_month, start_day)?;
        // The end date may fall in the following year; only its shape is checked.
        if !(1..=12).contains(&end_month) || !(1..=31).contains(&end_day) {
            return None;
        }

        Some(ClassifiedPeriod {
            name: name.to_string(),
            detail: PeriodDetail::Weekly {
                start_month,
                start_day,
                end_month,
                end_day,
            },
            sort_key: SortKey::Dated(start),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monthly_labels_anchor_on_first_of_month() {
        let classifier = PeriodClassifier::new(2024);
        let period = classifier.classify("9月会议详情");
        assert_eq!(period.period_type(), PeriodType::Monthly);
        assert_eq!(period.month(), Some(9));
        assert_eq!(period.sort_key.to_string(), "2024-09-01");
    }

    #[test]
    fn weekly_labels_use_start_date() {
        let classifier = PeriodClassifier::new(2024);
        let period = classifier.classify("10.20-10.26会议详情");
        assert_eq!(
            period.detail,
            PeriodDetail::Weekly {
                start_month: 10,
                start_day: 20,
                end_month: 10,
                end_day: 26
            }
        );
        assert_eq!(period.sort_key.to_string(), "2024-10-20");
    }

    #[test]
    fn unmatched_and_out_of_range_labels_are_unknown() {
        let classifier = PeriodClassifier::new(2024);
        for label in ["summary", "13月会议详情", "2.30-3.05会议详情"] {
            let period = classifier.classify(label);
            assert_eq!(period.period_type(), PeriodType::Unknown, "{label}");
            assert_eq!(period.sort_key, SortKey::Label(label.to_string()));
        }
    }

    #[test]
    fn chronological_order_puts_unknown_last() {
        let classifier = PeriodClassifier::new(2024);
        let mut periods: Vec<Period> = ["archive", "11.03-11.09会议详情", "10月会议详情", "9月会议详情"]
            .into_iter()
            .map(|label| classifier.classify(label).into_period())
            .collect();
        periods.sort_by(|a, b| a.chronological_cmp(b));

        let names: Vec<&str> = periods.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["9月会议详情", "10月会议详情", "11.03-11.09会议详情", "archive"]
        );
    }

    #[test]
    fn recognizes_only_export_shapes() {
        let classifier = PeriodClassifier::default();
        assert!(classifier.is_recognized("12月会议详情"));
        assert!(classifier.is_recognized("12.29-1.04会议详情"));
        assert!(!classifier.is_recognized("会议详情"));
    }
}
