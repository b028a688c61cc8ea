use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::debug;

use crate::models::{GroupColumn, GroupMean, MeetingRecord, Metric, Period, PeriodType, SortKey};
use crate::period::PeriodClassifier;

pub fn values(records: &[MeetingRecord], metric: Metric) -> Vec<f64> {
    records.iter().map(|record| metric.value(record)).collect()
}

pub fn mean(records: &[MeetingRecord], metric: Metric) -> f64 {
    crate::stats::mean(&values(records, metric))
}

pub fn sum(records: &[MeetingRecord], metric: Metric) -> f64 {
    records.iter().map(|record| metric.value(record)).sum()
}

/// `Σ numerator / Σ denominator × 100`, 0 when the denominator sums to 0.
pub fn share_percent(records: &[MeetingRecord], numerator: Metric, denominator: Metric) -> f64 {
    let total = sum(records, denominator);
    if total > 0.0 {
        sum(records, numerator) / total * 100.0
    } else {
        0.0
    }
}

/// Distinct periods present in the table, oldest first.
pub fn periods(records: &[MeetingRecord]) -> Vec<Period> {
    let mut seen = BTreeSet::new();
    let mut periods: Vec<Period> = records
        .iter()
        .filter(|record| seen.insert(record.period_name.as_str()))
        .map(MeetingRecord::period)
        .collect();
    periods.sort_by(|a, b| a.chronological_cmp(b));
    periods
}

struct GroupTotal {
    group: String,
    sort_key: SortKey,
    total: f64,
    count: usize,
}

fn group_totals(records: &[MeetingRecord], group: GroupColumn, metric: Metric) -> Vec<GroupTotal> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<GroupTotal> = Vec::new();

    for record in records {
        let key = group.key(record);
        let slot = *index.entry(key).or_insert_with(|| {
            let sort_key = match group {
                GroupColumn::Period => record.sort_key.clone(),
                _ => SortKey::Label(key.to_string()),
            };
            groups.push(GroupTotal {
                group: key.to_string(),
                sort_key,
                total: 0.0,
                count: 0,
            });
            groups.len() - 1
        });
        groups[slot].total += metric.value(record);
        groups[slot].count += 1;
    }

    groups
}

/// Mean of `metric` per group, in order of each group's first appearance.
pub fn group_means(records: &[MeetingRecord], group: GroupColumn, metric: Metric) -> Vec<GroupMean> {
    group_totals(records, group, metric)
        .into_iter()
        .map(|entry| GroupMean {
            mean: entry.total / entry.count as f64,
            group: entry.group,
            sort_key: entry.sort_key,
            count: entry.count,
        })
        .collect()
}

/// Per-period means ordered chronologically (sort key, then label).
pub fn period_means(records: &[MeetingRecord], metric: Metric) -> Vec<GroupMean> {
    let mut means = group_means(records, GroupColumn::Period, metric);
    means.sort_by(|a, b| a.sort_key.cmp(&b.sort_key).then_with(|| a.group.cmp(&b.group)));
    means
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAggregate {
    pub user_name: String,
    pub mean: f64,
    pub sum: f64,
    pub data_points: usize,
}

/// Per-user mean/sum/count of `metric`, in order of first appearance.
pub fn user_aggregates(records: &[MeetingRecord], metric: Metric) -> Vec<UserAggregate> {
    group_totals(records, GroupColumn::User, metric)
        .into_iter()
        .map(|entry| UserAggregate {
            mean: entry.total / entry.count as f64,
            sum: entry.total,
            data_points: entry.count,
            user_name: entry.group,
        })
        .collect()
}

pub fn by_period_type(records: &[MeetingRecord], period_type: PeriodType) -> Vec<MeetingRecord> {
    records
        .iter()
        .filter(|record| record.period_type == period_type)
        .cloned()
        .collect()
}

pub fn by_periods(records: &[MeetingRecord], names: &[String]) -> Vec<MeetingRecord> {
    records
        .iter()
        .filter(|record| names.iter().any(|name| name == &record.period_name))
        .cloned()
        .collect()
}

/// Records of one period per entry, oldest period first.
pub fn split_by_period(records: &[MeetingRecord]) -> Vec<(String, Vec<MeetingRecord>)> {
    periods(records)
        .into_iter()
        .map(|period| {
            let subset = by_periods(records, std::slice::from_ref(&period.name));
            (period.name, subset)
        })
        .collect()
}

/// Selects the two cohorts compared by the KPI calculator.
#[derive(Debug, Clone)]
pub struct CohortSelector {
    classifier: PeriodClassifier,
    baseline_months: Vec<u32>,
    recent_weeks: usize,
}

impl CohortSelector {
    pub fn new(classifier: PeriodClassifier, baseline_months: Vec<u32>, recent_weeks: usize) -> Self {
        Self {
            classifier,
            baseline_months,
            recent_weeks,
        }
    }

    /// Monthly records whose month is one of the baseline months.
    pub fn baseline(&self, records: &[MeetingRecord]) -> Vec<MeetingRecord> {
        let selected: Vec<MeetingRecord> = records
            .iter()
            .filter(|record| record.period_type == PeriodType::Monthly)
            .filter(|record| {
                self.classifier
                    .classify(&record.period_name)
                    .month()
                    .is_some_and(|month| self.baseline_months.contains(&month))
            })
            .cloned()
            .collect();
        debug!(
            months = ?self.baseline_months,
            records = selected.len(),
            "selected baseline cohort"
        );
        selected
    }

    /// Records of the most recent weekly periods, by sort key.
    pub fn current(&self, records: &[MeetingRecord]) -> Vec<MeetingRecord> {
        let weekly = by_period_type(records, PeriodType::Weekly);
        let recent: Vec<String> = periods(&weekly)
            .into_iter()
            .rev()
            .take(self.recent_weeks)
            .map(|period| period.name)
            .collect();
        let selected = by_periods(&weekly, &recent);
        debug!(
            weeks = ?recent,
            records = selected.len(),
            "selected current cohort"
        );
        selected
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::models::MeetingRecord;
    use crate::period::PeriodClassifier;

    /// Record with only the daily meeting count set.
    pub fn record(user: &str, period: &str, daily_count: f64) -> MeetingRecord {
        full_record(user, period, daily_count, 0.0, 0.0, 0.0, 0.0)
    }

    pub fn full_record(
        user: &str,
        period: &str,
        daily_count: f64,
        daily_minutes: f64,
        instant: f64,
        total: f64,
        one_on_one: f64,
    ) -> MeetingRecord {
        let classified = PeriodClassifier::new(2024).classify(period);
        MeetingRecord {
            user_name: user.to_string(),
            period_name: classified.name.clone(),
            period_type: classified.period_type(),
            sort_key: classified.sort_key,
            daily_meeting_count: daily_count,
            daily_meeting_minutes: daily_minutes,
            instant_meetings: instant,
            scheduled_meetings: (total - instant).max(0.0),
            total_meetings: total,
            one_on_one_calls: one_on_one,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{full_record, record};
    use super::*;

    fn sample_table() -> Vec<MeetingRecord> {
        vec![
            record("Avery", "10.27-11.02会议详情", 4.0),
            record("Avery", "9月会议详情", 6.0),
            record("Jules", "9月会议详情", 2.0),
            record("Jules", "10月会议详情", 3.0),
            record("Avery", "11.03-11.09会议详情", 1.0),
            record("Jules", "10.20-10.26会议详情", 5.0),
            record("Kiara", "11.10-11.16会议详情", 2.0),
        ]
    }

    #[test]
    fn periods_are_chronological_and_distinct() {
        let names: Vec<String> = periods(&sample_table()).into_iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            vec![
                "9月会议详情",
                "10月会议详情",
                "10.20-10.26会议详情",
                "10.27-11.02会议详情",
                "11.03-11.09会议详情",
                "11.10-11.16会议详情",
            ]
        );
    }

    #[test]
    fn period_means_follow_calendar_order() {
        let means = period_means(&sample_table(), Metric::DailyMeetingCount);
        assert_eq!(means[0].group, "9月会议详情");
        assert!((means[0].mean - 4.0).abs() < 1e-12);
        assert_eq!(means[0].count, 2);
    }

    #[test]
    fn user_aggregates_keep_first_appearance_order() {
        let users = user_aggregates(&sample_table(), Metric::DailyMeetingCount);
        let names: Vec<&str> = users.iter().map(|u| u.user_name.as_str()).collect();
        assert_eq!(names, vec!["Avery", "Jules", "Kiara"]);
        assert!((users[0].sum - 11.0).abs() < 1e-12);
        assert_eq!(users[0].data_points, 3);
    }

    #[test]
    fn share_guards_zero_denominator() {
        let rows = vec![full_record("Avery", "9月", 1.0, 30.0, 4.0, 0.0, 0.0)];
        assert_eq!(
            share_percent(&rows, Metric::InstantMeetings, Metric::TotalMeetings),
            0.0
        );
        let rows = vec![
            full_record("Avery", "9月", 1.0, 30.0, 2.0, 10.0, 0.0),
            full_record("Jules", "9月", 1.0, 30.0, 3.0, 10.0, 0.0),
        ];
        assert!(
            (share_percent(&rows, Metric::InstantMeetings, Metric::TotalMeetings) - 25.0).abs()
                < 1e-12
        );
    }

    #[test]
    fn cohorts_pick_baseline_months_and_recent_weeks() {
        let selector = CohortSelector::new(PeriodClassifier::new(2024), vec![9], 2);
        let table = sample_table();

        let baseline = selector.baseline(&table);
        assert_eq!(baseline.len(), 2);
        assert!(baseline.iter().all(|r| r.period_name == "9月会议详情"));

        let current = selector.current(&table);
        let mut weeks: Vec<&str> = current.iter().map(|r| r.period_name.as_str()).collect();
        weeks.sort();
        assert_eq!(weeks, vec!["11.03-11.09会议详情", "11.10-11.16会议详情"]);
    }

    #[test]
    fn split_by_period_preserves_every_row() {
        let table = sample_table();
        let split = split_by_period(&table);
        assert_eq!(split.len(), 6);
        assert_eq!(split.iter().map(|(_, rows)| rows.len()).sum::<usize>(), table.len());
    }
}
