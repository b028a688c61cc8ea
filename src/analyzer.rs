use serde::Serialize;
use tracing::{debug, instrument};

use crate::aggregate::{self, UserAggregate};
use crate::error::{AnalysisError, AnalysisResult};
use crate::metrics::reduction_rate;
use crate::models::{
    AnomalyRecord, AnomalyType, GroupColumn, MeetingRecord, Metric, TrendDirection, TrendResult,
};
use crate::stats;

pub const SIGNIFICANCE_LEVEL: f64 = 0.05;
pub const MIN_CORRELATION_PAIRS: usize = 3;
pub const MIN_TREND_POINTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub metric: Metric,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub q25: f64,
    pub q75: f64,
    pub skewness: f64,
    pub kurtosis: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodPairComparison {
    pub metric: Metric,
    pub period1: String,
    pub period2: String,
    pub mean1: f64,
    pub mean2: f64,
    pub change_rate: f64,
    pub t_statistic: f64,
    pub degrees_of_freedom: f64,
    pub p_value: f64,
    pub significant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlation {
    pub metric1: Metric,
    pub metric2: Metric,
    pub pearson_correlation: f64,
    pub pearson_p_value: f64,
    pub spearman_correlation: f64,
    pub spearman_p_value: f64,
    pub sample_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupImprovement {
    pub group: String,
    pub baseline: f64,
    pub current: f64,
    pub improvement_rate: f64,
    pub improved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodChange {
    pub period_name: String,
    pub value: f64,
    pub previous_value: f64,
    pub change: f64,
    pub change_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub metric: Metric,
    pub distribution: Distribution,
    pub trend: TrendResult,
    pub top_users: Vec<UserAggregate>,
    pub anomalies: Vec<AnomalyRecord>,
}

/// Longitudinal analyses over the full record table.
///
/// The table is borrowed immutably; every derived value (z-scores, ranks,
/// group means) is built fresh inside the call that needs it.
#[derive(Debug, Clone, Copy)]
pub struct StatisticalAnalyzer<'a> {
    records: &'a [MeetingRecord],
}

impl<'a> StatisticalAnalyzer<'a> {
    pub fn new(records: &'a [MeetingRecord]) -> Self {
        Self { records }
    }

    /// Regression of group means against their position. Period groups are
    /// ordered by sort key; other groupings by name.
    #[instrument(skip(self))]
    pub fn analyze_trend(&self, metric: Metric, group: GroupColumn) -> TrendResult {
        let mut series = aggregate::group_means(self.records, group, metric);
        match group {
            GroupColumn::Period => series.sort_by(|a, b| {
                a.sort_key.cmp(&b.sort_key).then_with(|| a.group.cmp(&b.group))
            }),
            _ => series.sort_by(|a, b| a.group.cmp(&b.group)),
        }

        let values: Vec<f64> = series.iter().map(|point| point.mean).collect();
        let first_value = values.first().copied().unwrap_or(0.0);
        let last_value = values.last().copied().unwrap_or(0.0);

        if values.len() < MIN_TREND_POINTS {
            debug!(points = values.len(), "not enough points for a trend");
            return TrendResult {
                metric,
                ordered_series: series,
                direction: TrendDirection::InsufficientData,
                slope: 0.0,
                intercept: 0.0,
                r_squared: 0.0,
                p_value: 0.0,
                change_rate: 0.0,
                first_value,
                last_value,
            };
        }

        let positions: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
        let fit = stats::linear_regression(&positions, &values);
        let change_rate = if first_value != 0.0 {
            (last_value - first_value) / first_value * 100.0
        } else {
            0.0
        };

        TrendResult {
            metric,
            ordered_series: series,
            direction: TrendDirection::from_slope(fit.slope),
            slope: fit.slope,
            intercept: fit.intercept,
            r_squared: fit.r_squared(),
            p_value: fit.p_value,
            change_rate,
            first_value,
            last_value,
        }
    }

    /// Rows whose population z-score exceeds `threshold` in magnitude,
    /// highest z first.
    #[instrument(skip(self))]
    pub fn detect_anomalies(&self, metric: Metric, threshold: f64) -> Vec<AnomalyRecord> {
        let values = aggregate::values(self.records, metric);
        let mean = stats::mean(&values);
        let std = stats::population_std(&values);
        if std <= 0.0 {
            return Vec::new();
        }

        let mut anomalies: Vec<AnomalyRecord> = self
            .records
            .iter()
            .zip(&values)
            .filter_map(|(record, value)| {
                let z_score = (value - mean) / std;
                (z_score.abs() > threshold).then(|| AnomalyRecord {
                    user_name: record.user_name.clone(),
                    period_name: record.period_name.clone(),
                    metric,
                    value: *value,
                    z_score,
                    anomaly_type: if z_score > threshold {
                        AnomalyType::High
                    } else {
                        AnomalyType::Low
                    },
                })
            })
            .collect();
        anomalies.sort_by(|a, b| b.z_score.total_cmp(&a.z_score));

        debug!(found = anomalies.len(), "anomaly scan finished");
        anomalies
    }

    pub fn analyze_distribution(&self, metric: Metric) -> Distribution {
        let mut values: Vec<f64> = aggregate::values(self.records, metric)
            .into_iter()
            .filter(|value| value.is_finite())
            .collect();
        values.sort_by(f64::total_cmp);

        Distribution {
            metric,
            count: values.len(),
            mean: stats::mean(&values),
            median: stats::quantile_sorted(&values, 0.5),
            std: stats::population_std(&values),
            min: values.first().copied().unwrap_or(0.0),
            max: values.last().copied().unwrap_or(0.0),
            q25: stats::quantile_sorted(&values, 0.25),
            q75: stats::quantile_sorted(&values, 0.75),
            skewness: stats::skewness(&values),
            kurtosis: stats::excess_kurtosis(&values),
        }
    }

    /// Pooled two-sample t-test between two named periods.
    pub fn compare_periods(
        &self,
        metric: Metric,
        period1: &str,
        period2: &str,
    ) -> AnalysisResult<PeriodPairComparison> {
        let group1 = self.period_values(metric, period1)?;
        let group2 = self.period_values(metric, period2)?;

        let test = stats::pooled_t_test(&group1, &group2).ok_or(
            AnalysisError::InsufficientData {
                required: 3,
                actual: group1.len() + group2.len(),
            },
        )?;

        let mean1 = stats::mean(&group1);
        let mean2 = stats::mean(&group2);
        let change_rate = if mean1 != 0.0 {
            (mean2 - mean1) / mean1 * 100.0
        } else {
            0.0
        };

        Ok(PeriodPairComparison {
            metric,
            period1: period1.to_string(),
            period2: period2.to_string(),
            mean1,
            mean2,
            change_rate,
            t_statistic: test.t_statistic,
            degrees_of_freedom: test.degrees_of_freedom,
            p_value: test.p_value,
            significant: test.p_value < SIGNIFICANCE_LEVEL,
        })
    }

    fn period_values(&self, metric: Metric, period: &str) -> AnalysisResult<Vec<f64>> {
        let values: Vec<f64> = self
            .records
            .iter()
            .filter(|record| record.period_name == period)
            .map(|record| metric.value(record))
            .collect();
        if values.is_empty() {
            return Err(AnalysisError::EmptyPeriod {
                period: period.to_string(),
            });
        }
        Ok(values)
    }

    /// Users ranked by their mean `metric`.
    ///
    /// Users are grouped in order of first appearance and the sort is
    /// stable, so equal means keep that order; this decides who takes the
    /// last slot when values tie at the cut.
    pub fn identify_top_users(&self, metric: Metric, n: usize, ascending: bool) -> Vec<UserAggregate> {
        let mut users = aggregate::user_aggregates(self.records, metric);
        if ascending {
            users.sort_by(|a, b| a.mean.total_cmp(&b.mean));
        } else {
            users.sort_by(|a, b| b.mean.total_cmp(&a.mean));
        }
        users.truncate(n);
        users
    }

    pub fn analyze_correlation(&self, metric1: Metric, metric2: Metric) -> AnalysisResult<Correlation> {
        let (xs, ys): (Vec<f64>, Vec<f64>) = self
            .records
            .iter()
            .map(|record| (metric1.value(record), metric2.value(record)))
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .unzip();

        if xs.len() < MIN_CORRELATION_PAIRS {
            return Err(AnalysisError::InsufficientData {
                required: MIN_CORRELATION_PAIRS,
                actual: xs.len(),
            });
        }

        let pearson = stats::pearson(&xs, &ys);
        let spearman = stats::spearman(&xs, &ys);

        Ok(Correlation {
            metric1,
            metric2,
            pearson_correlation: pearson,
            pearson_p_value: stats::correlation_p_value(pearson, xs.len()),
            spearman_correlation: spearman,
            spearman_p_value: stats::correlation_p_value(spearman, xs.len()),
            sample_size: xs.len(),
        })
    }

    /// Per-group improvement between two period sets, best first. Only groups
    /// present in both sets are reported.
    pub fn analyze_improvement_by_group(
        &self,
        metric: Metric,
        group: GroupColumn,
        baseline_periods: &[String],
        current_periods: &[String],
    ) -> Vec<GroupImprovement> {
        let baseline = aggregate::by_periods(self.records, baseline_periods);
        let current = aggregate::by_periods(self.records, current_periods);
        let current_means = aggregate::group_means(&current, group, metric);

        let mut rows: Vec<GroupImprovement> = aggregate::group_means(&baseline, group, metric)
            .into_iter()
            .filter_map(|before| {
                let after = current_means.iter().find(|after| after.group == before.group)?;
                let improvement_rate = reduction_rate(before.mean, after.mean);
                Some(GroupImprovement {
                    group: before.group,
                    baseline: before.mean,
                    current: after.mean,
                    improvement_rate,
                    improved: improvement_rate > 0.0,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.improvement_rate.total_cmp(&a.improvement_rate));
        rows
    }

    /// Change of each period's mean against the chronologically previous
    /// period. The first period reports zeros.
    pub fn calculate_week_over_week_change(&self, metric: Metric) -> Vec<PeriodChange> {
        let series = aggregate::period_means(self.records, metric);
        let mut changes = Vec::with_capacity(series.len());
        let mut previous: Option<f64> = None;

        for point in series {
            let (previous_value, change, change_rate) = match previous {
                Some(prev) => {
                    let change = point.mean - prev;
                    let rate = if prev != 0.0 { change / prev * 100.0 } else { 0.0 };
                    (prev, change, rate)
                }
                None => (0.0, 0.0, 0.0),
            };
            previous = Some(point.mean);
            changes.push(PeriodChange {
                period_name: point.group,
                value: point.mean,
                previous_value,
                change,
                change_rate,
            });
        }

        changes
    }

    /// Distribution, trend, top users and anomalies for each metric.
    pub fn summary(&self, metrics: &[Metric], top_n: usize, threshold: f64) -> Vec<MetricSummary> {
        metrics
            .iter()
            .map(|&metric| MetricSummary {
                metric,
                distribution: self.analyze_distribution(metric),
                trend: self.analyze_trend(metric, GroupColumn::Period),
                top_users: self.identify_top_users(metric, top_n, false),
                anomalies: self.detect_anomalies(metric, threshold),
            })
            .collect()
    }
}
