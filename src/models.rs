use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Monthly,
    Weekly,
    Unknown,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Monthly => "monthly",
            PeriodType::Weekly => "weekly",
            PeriodType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chronological ordering key for a period label.
///
/// Dated keys order by calendar date; unclassified labels order lexically
/// and always after every dated key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SortKey {
    Dated(NaiveDate),
    Label(String),
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Dated(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            SortKey::Label(label) => f.write_str(label),
        }
    }
}

impl Serialize for SortKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Period {
    pub name: String,
    pub period_type: PeriodType,
    pub sort_key: SortKey,
}

impl Period {
    /// Sort key first, label second so equal keys still order deterministically.
    pub fn chronological_cmp(&self, other: &Period) -> Ordering {
        self.sort_key
            .cmp(&other.sort_key)
            .then_with(|| self.name.cmp(&other.name))
    }
}

/// One row per (user, period) as delivered by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeetingRecord {
    pub user_name: String,
    pub period_name: String,
    pub period_type: PeriodType,
    pub sort_key: SortKey,
    pub daily_meeting_count: f64,
    pub daily_meeting_minutes: f64,
    pub instant_meetings: f64,
    pub scheduled_meetings: f64,
    pub total_meetings: f64,
    pub one_on_one_calls: f64,
}

impl MeetingRecord {
    pub fn period(&self) -> Period {
        Period {
            name: self.period_name.clone(),
            period_type: self.period_type,
            sort_key: self.sort_key.clone(),
        }
    }
}

/// The numeric fields of a [`MeetingRecord`] that analyses can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    DailyMeetingCount,
    DailyMeetingMinutes,
    InstantMeetings,
    ScheduledMeetings,
    TotalMeetings,
    OneOnOneCalls,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::DailyMeetingCount,
        Metric::DailyMeetingMinutes,
        Metric::InstantMeetings,
        Metric::ScheduledMeetings,
        Metric::TotalMeetings,
        Metric::OneOnOneCalls,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::DailyMeetingCount => "daily_meeting_count",
            Metric::DailyMeetingMinutes => "daily_meeting_minutes",
            Metric::InstantMeetings => "instant_meetings",
            Metric::ScheduledMeetings => "scheduled_meetings",
            Metric::TotalMeetings => "total_meetings",
            Metric::OneOnOneCalls => "one_on_one_calls",
        }
    }

    /// Column heading used by the source exports.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::DailyMeetingCount => "日人均线上会议数",
            Metric::DailyMeetingMinutes => "日人均线上会议时长(分钟)",
            Metric::InstantMeetings => "即时会议数",
            Metric::ScheduledMeetings => "日程会议数",
            Metric::TotalMeetings => "人的会议数",
            Metric::OneOnOneCalls => "1v1通话数",
        }
    }

    pub fn value(&self, record: &MeetingRecord) -> f64 {
        match self {
            Metric::DailyMeetingCount => record.daily_meeting_count,
            Metric::DailyMeetingMinutes => record.daily_meeting_minutes,
            Metric::InstantMeetings => record.instant_meetings,
            Metric::ScheduledMeetings => record.scheduled_meetings,
            Metric::TotalMeetings => record.total_meetings,
            Metric::OneOnOneCalls => record.one_on_one_calls,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Metric::ALL
            .into_iter()
            .find(|metric| metric.as_str() == name || metric.label() == name)
            .or(match name {
                "daily_count" | "count" => Some(Metric::DailyMeetingCount),
                "daily_minutes" | "duration" | "minutes" => Some(Metric::DailyMeetingMinutes),
                "instant" => Some(Metric::InstantMeetings),
                "scheduled" => Some(Metric::ScheduledMeetings),
                "total" => Some(Metric::TotalMeetings),
                "one_on_one" | "1v1" => Some(Metric::OneOnOneCalls),
                _ => None,
            })
            .ok_or_else(|| AnalysisError::UnknownField {
                name: name.to_string(),
            })
    }
}

/// Grouping keys available to trend and improvement analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupColumn {
    User,
    Period,
    PeriodType,
}

impl GroupColumn {
    pub fn key<'r>(&self, record: &'r MeetingRecord) -> &'r str {
        match self {
            GroupColumn::User => &record.user_name,
            GroupColumn::Period => &record.period_name,
            GroupColumn::PeriodType => record.period_type.as_str(),
        }
    }
}

impl FromStr for GroupColumn {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "user" | "user_name" => Ok(GroupColumn::User),
            "period" | "period_name" => Ok(GroupColumn::Period),
            "period_type" => Ok(GroupColumn::PeriodType),
            other => Err(AnalysisError::UnknownField {
                name: other.to_string(),
            }),
        }
    }
}

/// A single target check comparing a baseline cohort to a current cohort.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiResult {
    pub name: String,
    pub baseline_value: f64,
    pub current_value: f64,
    pub change_metric: f64,
    pub target_description: String,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyType {
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRecord {
    pub user_name: String,
    pub period_name: String,
    pub metric: Metric,
    pub value: f64,
    pub z_score: f64,
    pub anomaly_type: AnomalyType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Stable,
    Increasing,
    Decreasing,
    InsufficientData,
}

impl TrendDirection {
    pub const STABLE_SLOPE: f64 = 0.01;

    pub fn from_slope(slope: f64) -> Self {
        if slope.abs() < Self::STABLE_SLOPE {
            TrendDirection::Stable
        } else if slope > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        }
    }
}

/// Mean of a metric within one group, carrying the group's ordering key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMean {
    pub group: String,
    pub sort_key: SortKey,
    pub mean: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendResult {
    pub metric: Metric,
    pub ordered_series: Vec<GroupMean>,
    pub direction: TrendDirection,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub p_value: f64,
    pub change_rate: f64,
    pub first_value: f64,
    pub last_value: f64,
}
