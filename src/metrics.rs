use serde::Serialize;
use tracing::debug;

use crate::aggregate;
use crate::models::{KpiResult, MeetingRecord, Metric};
use crate::stats;

pub const REDUCTION_TARGET_PERCENT: f64 = 10.0;
pub const INSTANT_SHARE_TARGET_POINTS: f64 = 10.0;
pub const BURDEN_BALANCE_TARGET_PERCENT: f64 = 10.0;
pub const HEAVY_USER_TARGET_PERCENT: f64 = 20.0;
pub const WEEKLY_VOLATILITY_LIMIT: f64 = 0.15;
pub const HEAVY_USER_COUNT: usize = 10;

/// `(baseline - current) / baseline × 100`, 0 when the baseline is 0.
pub fn reduction_rate(baseline: f64, current: f64) -> f64 {
    if baseline > 0.0 {
        (baseline - current) / baseline * 100.0
    } else {
        0.0
    }
}

fn kpi(name: &str, baseline: f64, current: f64, change: f64, target: &str, passed: bool) -> KpiResult {
    KpiResult {
        name: name.to_string(),
        baseline_value: baseline,
        current_value: current,
        change_metric: change,
        target_description: target.to_string(),
        passed,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrimaryKpis {
    pub meeting_count_reduction: KpiResult,
    pub duration_reduction: KpiResult,
    pub instant_share_decline: KpiResult,
}

impl PrimaryKpis {
    pub fn all(&self) -> [&KpiResult; 3] {
        [
            &self.meeting_count_reduction,
            &self.duration_reduction,
            &self.instant_share_decline,
        ]
    }

    pub fn passed_count(&self) -> usize {
        self.all().iter().filter(|kpi| kpi.passed).count()
    }
}

/// Banding of the one-on-one share decline (percentage points).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubstitutionStatus {
    #[serde(rename = "优秀")]
    Excellent,
    #[serde(rename = "良好")]
    Good,
    #[serde(rename = "接近目标")]
    NearTarget,
    #[serde(rename = "需关注")]
    NeedsAttention,
}

impl SubstitutionStatus {
    pub fn from_decline(decline: f64) -> Self {
        if decline > 10.0 {
            SubstitutionStatus::Excellent
        } else if decline >= 5.0 {
            SubstitutionStatus::Good
        } else if decline >= 0.0 {
            SubstitutionStatus::NearTarget
        } else {
            SubstitutionStatus::NeedsAttention
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, SubstitutionStatus::Excellent | SubstitutionStatus::Good)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SubstitutionStatus::Excellent => "优秀",
            SubstitutionStatus::Good => "良好",
            SubstitutionStatus::NearTarget => "接近目标",
            SubstitutionStatus::NeedsAttention => "需关注",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OneOnOneSubstitution {
    #[serde(flatten)]
    pub kpi: KpiResult,
    pub status: SubstitutionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecondaryKpis {
    pub one_on_one: OneOnOneSubstitution,
    pub burden_balance: KpiResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeavyUserImprovement {
    #[serde(flatten)]
    pub kpi: KpiResult,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyVolatility {
    pub period_count: usize,
    pub period_std: f64,
    pub period_mean: f64,
    pub volatility: f64,
    pub target_description: String,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringKpis {
    pub top10_improvement: HeavyUserImprovement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_volatility: Option<WeeklyVolatility>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiReport {
    pub primary: PrimaryKpis,
    pub secondary: SecondaryKpis,
    pub monitoring: MonitoringKpis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeetingEfficiency {
    #[serde(flatten)]
    pub kpi: KpiResult,
    pub minute_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodRow {
    pub period: String,
    pub mean_daily_count: f64,
    pub mean_daily_minutes: f64,
    pub instant_ratio: f64,
    pub record_count: usize,
}

/// Compares a baseline cohort against a current cohort.
///
/// Both ratio KPIs (instant share, one-on-one share) divide by
/// `total_meetings`.
#[derive(Debug, Clone, Copy)]
pub struct MetricsCalculator<'a> {
    baseline: &'a [MeetingRecord],
    current: &'a [MeetingRecord],
}

impl<'a> MetricsCalculator<'a> {
    pub fn new(baseline: &'a [MeetingRecord], current: &'a [MeetingRecord]) -> Self {
        Self { baseline, current }
    }

    fn instant_ratio(records: &[MeetingRecord]) -> f64 {
        aggregate::share_percent(records, Metric::InstantMeetings, Metric::TotalMeetings)
    }

    fn one_on_one_ratio(records: &[MeetingRecord]) -> f64 {
        aggregate::share_percent(records, Metric::OneOnOneCalls, Metric::TotalMeetings)
    }

    pub fn primary_kpis(&self) -> PrimaryKpis {
        let baseline_count = aggregate::mean(self.baseline, Metric::DailyMeetingCount);
        let current_count = aggregate::mean(self.current, Metric::DailyMeetingCount);
        let count_rate = reduction_rate(baseline_count, current_count);

        let baseline_minutes = aggregate::mean(self.baseline, Metric::DailyMeetingMinutes);
        let current_minutes = aggregate::mean(self.current, Metric::DailyMeetingMinutes);
        let minutes_rate = reduction_rate(baseline_minutes, current_minutes);

        let baseline_ratio = Self::instant_ratio(self.baseline);
        let current_ratio = Self::instant_ratio(self.current);
        let decline = baseline_ratio - current_ratio;

        debug!(count_rate, minutes_rate, decline, "computed primary KPIs");

        PrimaryKpis {
            meeting_count_reduction: kpi(
                "日人均会议数减少率",
                baseline_count,
                current_count,
                count_rate,
                "≥10%",
                count_rate >= REDUCTION_TARGET_PERCENT,
            ),
            duration_reduction: kpi(
                "日人均会议时长减少率",
                baseline_minutes,
                current_minutes,
                minutes_rate,
                "≥10%",
                minutes_rate >= REDUCTION_TARGET_PERCENT,
            ),
            instant_share_decline: kpi(
                "即时会议占比下降",
                baseline_ratio,
                current_ratio,
                decline,
                "≥10个百分点",
                decline >= INSTANT_SHARE_TARGET_POINTS,
            ),
        }
    }

    /// Change in the daily duration field, read as average meeting length.
    pub fn meeting_efficiency(&self) -> MeetingEfficiency {
        let baseline = aggregate::mean(self.baseline, Metric::DailyMeetingMinutes);
        let current = aggregate::mean(self.current, Metric::DailyMeetingMinutes);
        let reduction = reduction_rate(baseline, current);

        MeetingEfficiency {
            kpi: kpi(
                "平均单次会议时长",
                baseline,
                current,
                reduction,
                "时长缩短≥10%",
                reduction >= REDUCTION_TARGET_PERCENT,
            ),
            minute_delta: current - baseline,
        }
    }

    pub fn one_on_one_substitution(&self) -> OneOnOneSubstitution {
        let baseline_ratio = Self::one_on_one_ratio(self.baseline);
        let current_ratio = Self::one_on_one_ratio(self.current);
        let decline = baseline_ratio - current_ratio;
        let status = SubstitutionStatus::from_decline(decline);

        OneOnOneSubstitution {
            kpi: kpi(
                "1v1通话占比",
                baseline_ratio,
                current_ratio,
                decline,
                "减少5-10个百分点",
                status.passed(),
            ),
            status,
        }
    }

    pub fn burden_balance(&self) -> KpiResult {
        let baseline_cv =
            stats::coefficient_of_variation(&aggregate::values(self.baseline, Metric::DailyMeetingCount));
        let current_cv =
            stats::coefficient_of_variation(&aggregate::values(self.current, Metric::DailyMeetingCount));
        let improvement = reduction_rate(baseline_cv, current_cv);

        kpi(
            "团队会议负担分布均衡度",
            baseline_cv,
            current_cv,
            improvement,
            "变异系数下降≥10%",
            improvement >= BURDEN_BALANCE_TARGET_PERCENT,
        )
    }

    /// Users with the highest baseline daily count rows, up to `limit`
    /// distinct names. Equal values keep their row order.
    pub fn heavy_users(&self, limit: usize) -> Vec<String> {
        let mut rows: Vec<&MeetingRecord> = self.baseline.iter().collect();
        rows.sort_by(|a, b| b.daily_meeting_count.total_cmp(&a.daily_meeting_count));

        let mut users: Vec<String> = Vec::with_capacity(limit);
        for row in rows {
            if users.len() == limit {
                break;
            }
            if !users.contains(&row.user_name) {
                users.push(row.user_name.clone());
            }
        }
        users
    }

    /// Baseline vs current daily count of the ten heaviest baseline users,
    /// averaged over their rows on each side. A user with no current rows
    /// contributes their baseline rows to the current side.
    pub fn top10_improvement(&self) -> HeavyUserImprovement {
        let users = self.heavy_users(HEAVY_USER_COUNT);

        let mut baseline_values = Vec::new();
        let mut current_values = Vec::new();
        for user in &users {
            let baseline: Vec<f64> = self
                .baseline
                .iter()
                .filter(|record| &record.user_name == user)
                .map(|record| record.daily_meeting_count)
                .collect();
            let current: Vec<f64> = self
                .current
                .iter()
                .filter(|record| &record.user_name == user)
                .map(|record| record.daily_meeting_count)
                .collect();
            if current.is_empty() {
                current_values.extend_from_slice(&baseline);
            } else {
                current_values.extend(current);
            }
            baseline_values.extend(baseline);
        }

        let baseline_avg = stats::mean(&baseline_values);
        let current_avg = stats::mean(&current_values);
        let improvement = reduction_rate(baseline_avg, current_avg);

        HeavyUserImprovement {
            kpi: kpi(
                "Top10重度用户改善率",
                baseline_avg,
                current_avg,
                improvement,
                "≥20%",
                improvement >= HEAVY_USER_TARGET_PERCENT,
            ),
            users,
        }
    }

    /// Dispersion of per-week means over a weekly-typed table.
    pub fn weekly_volatility(&self, weekly: &[MeetingRecord]) -> WeeklyVolatility {
        let means: Vec<f64> = aggregate::period_means(weekly, Metric::DailyMeetingCount)
            .into_iter()
            .map(|period| period.mean)
            .collect();
        let period_std = stats::sample_std(&means);
        let period_mean = stats::mean(&means);
        let volatility = if period_mean > 0.0 {
            period_std / period_mean
        } else {
            0.0
        };

        WeeklyVolatility {
            period_count: means.len(),
            period_std,
            period_mean,
            volatility,
            target_description: "<0.15".to_string(),
            passed: means.len() >= 2 && volatility < WEEKLY_VOLATILITY_LIMIT,
        }
    }

    pub fn all_kpis(&self, weekly: Option<&[MeetingRecord]>) -> KpiReport {
        KpiReport {
            primary: self.primary_kpis(),
            secondary: SecondaryKpis {
                one_on_one: self.one_on_one_substitution(),
                burden_balance: self.burden_balance(),
            },
            monitoring: MonitoringKpis {
                top10_improvement: self.top10_improvement(),
                weekly_volatility: weekly.map(|records| self.weekly_volatility(records)),
            },
        }
    }

    /// One row per non-empty period subset, in the order given.
    pub fn period_comparison(periods: &[(String, Vec<MeetingRecord>)]) -> Vec<PeriodRow> {
        periods
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(name, records)| PeriodRow {
                period: name.clone(),
                mean_daily_count: aggregate::mean(records, Metric::DailyMeetingCount),
                mean_daily_minutes: aggregate::mean(records, Metric::DailyMeetingMinutes),
                instant_ratio: Self::instant_ratio(records),
                record_count: records.len(),
            })
            .collect()
    }
}
