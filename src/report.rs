use std::fmt::Write;

use serde::Serialize;

use crate::analyzer::MetricSummary;
use crate::metrics::{KpiReport, MeetingEfficiency, PeriodRow};
use crate::aggregate;
use crate::models::{KpiResult, MeetingRecord, Metric, TrendDirection};
use crate::tiers::{LoadTier, TierSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    AllPassed,
    PartiallyPassed,
    NotEffective,
}

impl Verdict {
    /// All passed, at least half passed, or fewer.
    pub fn from_counts(passed: usize, total: usize) -> Self {
        if passed == total {
            Verdict::AllPassed
        } else if passed * 2 >= total {
            Verdict::PartiallyPassed
        } else {
            Verdict::NotEffective
        }
    }

    pub fn conclusion(&self) -> &'static str {
        match self {
            Verdict::AllPassed => "会议改善措施效果显著,所有主要KPI均已达标",
            Verdict::PartiallyPassed => "会议改善措施取得一定成效,部分KPI已达标,仍需持续优化",
            Verdict::NotEffective => "会议改善效果不明显,需要重新审视改善措施并加强执行",
        }
    }
}

fn status(passed: bool) -> &'static str {
    if passed {
        "达标"
    } else {
        "未达标"
    }
}

fn direction_label(direction: TrendDirection) -> &'static str {
    match direction {
        TrendDirection::Stable => "平稳",
        TrendDirection::Increasing => "上升",
        TrendDirection::Decreasing => "下降",
        TrendDirection::InsufficientData => "数据不足",
    }
}

fn kpi_row(output: &mut String, kpi: &KpiResult) {
    let _ = writeln!(
        output,
        "| {} | {:.2} | {:.2} | {:.2} | {} | {} |",
        kpi.name,
        kpi.baseline_value,
        kpi.current_value,
        kpi.change_metric,
        kpi.target_description,
        status(kpi.passed)
    );
}

fn kpi_table_header(output: &mut String) {
    let _ = writeln!(output, "| 指标 | 基线 | 当前 | 变化 | 目标 | 状态 |");
    let _ = writeln!(output, "| --- | ---: | ---: | ---: | --- | --- |");
}

pub fn build_report(
    source: &str,
    kpis: &KpiReport,
    efficiency: &MeetingEfficiency,
    summaries: &[MetricSummary],
    tiers: &TierSummary,
    periods: &[PeriodRow],
) -> String {
    let mut output = String::new();
    let passed = kpis.primary.passed_count();
    let total = kpis.primary.all().len();
    let verdict = Verdict::from_counts(passed, total);

    let _ = writeln!(output, "# 会议负担改善评估报告");
    let _ = writeln!(output, "Generated from {source}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## 核心结论");
    let _ = writeln!(output, "**主要KPI达标情况**: {passed}/{total} 项达标");
    let _ = writeln!(output);
    let _ = writeln!(output, "**评估结论**: {}", verdict.conclusion());

    let _ = writeln!(output);
    let _ = writeln!(output, "## 主要KPI");
    kpi_table_header(&mut output);
    for kpi in kpis.primary.all() {
        kpi_row(&mut output, kpi);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## 会议效率");
    kpi_table_header(&mut output);
    kpi_row(&mut output, &efficiency.kpi);
    let _ = writeln!(
        output,
        "\n平均单次会议时长变化 {:+.2} 分钟",
        efficiency.minute_delta
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## 次要KPI");
    kpi_table_header(&mut output);
    kpi_row(&mut output, &kpis.secondary.one_on_one.kpi);
    kpi_row(&mut output, &kpis.secondary.burden_balance);
    let _ = writeln!(
        output,
        "\n1v1替代效果: {}",
        kpis.secondary.one_on_one.status.label()
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## 监控指标");
    let improvement = &kpis.monitoring.top10_improvement;
    let _ = writeln!(
        output,
        "- {}: {:.2}% (目标 {}, {})",
        improvement.kpi.name,
        improvement.kpi.change_metric,
        improvement.kpi.target_description,
        status(improvement.kpi.passed)
    );
    match &kpis.monitoring.weekly_volatility {
        Some(volatility) => {
            let _ = writeln!(
                output,
                "- 周度波动系数: {:.3} across {} weeks (目标 {}, {})",
                volatility.volatility,
                volatility.period_count,
                volatility.target_description,
                status(volatility.passed)
            );
        }
        None => {
            let _ = writeln!(output, "- 周度波动系数: 无周度数据");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## 周期对比");
    if periods.is_empty() {
        let _ = writeln!(output, "No periods loaded.");
    } else {
        let _ = writeln!(output, "| 周期 | 日人均会议数 | 日人均时长 | 即时会议占比 | 记录数 |");
        let _ = writeln!(output, "| --- | ---: | ---: | ---: | ---: |");
        for row in periods {
            let _ = writeln!(
                output,
                "| {} | {:.2} | {:.1} | {:.1}% | {} |",
                row.period,
                row.mean_daily_count,
                row.mean_daily_minutes,
                row.instant_ratio,
                row.record_count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## 趋势分析");
    for summary in summaries {
        let trend = &summary.trend;
        let _ = writeln!(
            output,
            "- {}: {} (slope {:.3}, R² {:.2}, p {:.3}, {:+.1}%)",
            summary.metric.label(),
            direction_label(trend.direction),
            trend.slope,
            trend.r_squared,
            trend.p_value,
            trend.change_rate
        );
    }

    if let Some(first) = summaries.first() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Top用户 ({})", first.metric.label());
        if first.top_users.is_empty() {
            let _ = writeln!(output, "No users recorded.");
        }
        for (rank, user) in first.top_users.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. {} avg {:.2} across {} periods",
                rank + 1,
                user.user_name,
                user.mean,
                user.data_points
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## 异常检测");
    let mut any_anomaly = false;
    for summary in summaries {
        for anomaly in summary.anomalies.iter().take(5) {
            any_anomaly = true;
            let _ = writeln!(
                output,
                "- {} ({}) {} = {:.2}, z {:+.2}",
                anomaly.user_name,
                anomaly.period_name,
                anomaly.metric.label(),
                anomaly.value,
                anomaly.z_score
            );
        }
    }
    if !any_anomaly {
        let _ = writeln!(output, "No anomalies above threshold.");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## 用户负担分层");
    for tier in [LoadTier::High, LoadTier::Medium, LoadTier::Low] {
        let stats = tiers.get(tier);
        let _ = writeln!(
            output,
            "- {}: {} users, avg {:.2}",
            tier.label(),
            stats.count,
            stats.mean
        );
    }

    output
}

/// Overview and heaviest rows of a single period.
pub fn build_weekly_summary(period: &str, records: &[MeetingRecord]) -> String {
    let rows: Vec<&MeetingRecord> = records
        .iter()
        .filter(|record| record.period_name == period)
        .collect();
    let owned: Vec<MeetingRecord> = rows.iter().map(|record| (*record).clone()).collect();

    let mut output = String::new();
    let _ = writeln!(output, "# 会议数据周报 - {period}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## 本周概览");
    let _ = writeln!(output, "- 数据记录数: {}", rows.len());
    let _ = writeln!(
        output,
        "- 日人均会议数: {:.2}",
        aggregate::mean(&owned, Metric::DailyMeetingCount)
    );
    let _ = writeln!(
        output,
        "- 日人均会议时长: {:.1} 分钟",
        aggregate::mean(&owned, Metric::DailyMeetingMinutes)
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top 10 会议最多的用户");
    if rows.is_empty() {
        let _ = writeln!(output, "无数据");
        return output;
    }

    let mut heaviest = rows;
    heaviest.sort_by(|a, b| b.daily_meeting_count.total_cmp(&a.daily_meeting_count));
    let _ = writeln!(output, "| 排名 | 用户 | 日人均会议数 | 日人均会议时长(分钟) |");
    let _ = writeln!(output, "| ---: | --- | ---: | ---: |");
    for (rank, row) in heaviest.iter().take(10).enumerate() {
        let _ = writeln!(
            output,
            "| {} | {} | {:.2} | {:.1} |",
            rank + 1,
            row.user_name,
            row.daily_meeting_count,
            row.daily_meeting_minutes
        );
    }

    output
}

/// Where one user's daily meeting count sits relative to the team.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadAdvice {
    Heavy,
    Moderate,
    WellManaged,
}

impl LoadAdvice {
    /// Heavy above 1.2x the team mean, well managed below 0.8x.
    pub fn compare(user_mean: f64, team_mean: f64) -> Self {
        if user_mean > team_mean * 1.2 {
            LoadAdvice::Heavy
        } else if user_mean < team_mean * 0.8 {
            LoadAdvice::WellManaged
        } else {
            LoadAdvice::Moderate
        }
    }
}

fn percent_diff(user: f64, team: f64) -> f64 {
    if team > 0.0 {
        (user - team) / team * 100.0
    } else {
        0.0
    }
}

/// One user's averages against the whole table, their per-period trend and
/// advice. `None` when the user has no rows.
pub fn build_personal_report(user: &str, records: &[MeetingRecord]) -> Option<String> {
    let own: Vec<MeetingRecord> = records
        .iter()
        .filter(|record| record.user_name == user)
        .cloned()
        .collect();
    if own.is_empty() {
        return None;
    }

    let user_count = aggregate::mean(&own, Metric::DailyMeetingCount);
    let team_count = aggregate::mean(records, Metric::DailyMeetingCount);
    let user_minutes = aggregate::mean(&own, Metric::DailyMeetingMinutes);
    let team_minutes = aggregate::mean(records, Metric::DailyMeetingMinutes);

    let mut output = String::new();
    let _ = writeln!(output, "# 个人会议健康报告 - {user}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## 与团队对比");
    let _ = writeln!(output, "| 指标 | 个人均值 | 团队均值 | 对比 |");
    let _ = writeln!(output, "| --- | ---: | ---: | ---: |");
    let _ = writeln!(
        output,
        "| 日人均会议数 | {:.2} | {:.2} | {:+.1}% |",
        user_count,
        team_count,
        percent_diff(user_count, team_count)
    );
    let _ = writeln!(
        output,
        "| 日人均会议时长 | {:.1} | {:.1} | {:+.1}% |",
        user_minutes,
        team_minutes,
        percent_diff(user_minutes, team_minutes)
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## 个人趋势");
    let _ = writeln!(output, "| 周期 | 日人均会议数 |");
    let _ = writeln!(output, "| --- | ---: |");
    for period in aggregate::period_means(&own, Metric::DailyMeetingCount) {
        let _ = writeln!(output, "| {} | {:.2} |", period.group, period.mean);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## 建议");
    match LoadAdvice::compare(user_count, team_count) {
        LoadAdvice::Heavy => {
            let _ = writeln!(output, "### ⚠️ 会议负担较重");
            let _ = writeln!(output, "日人均会议数高于团队均值20%以上,建议:");
            let _ = writeln!(output, "1. 审查日历,取消或合并价值不高的会议");
            let _ = writeln!(output, "2. 与主管讨论优先级,减少非必要的参会");
            let _ = writeln!(output, "3. 尝试将部分会议改为异步沟通");
        }
        LoadAdvice::WellManaged => {
            let _ = writeln!(output, "### ✅ 会议管理良好");
            let _ = writeln!(output, "日人均会议数低于团队均值,请继续保持。");
        }
        LoadAdvice::Moderate => {
            let _ = writeln!(output, "### 会议负担适中");
            let _ = writeln!(output, "日人均会议数接近团队均值。");
        }
    }

    Some(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::fixtures::{full_record, record};
    use crate::aggregate::{split_by_period, user_aggregates};
    use crate::analyzer::StatisticalAnalyzer;
    use crate::metrics::MetricsCalculator;
    use crate::tiers::classify_users;

    #[test]
    fn verdict_bands_follow_pass_share() {
        assert_eq!(Verdict::from_counts(3, 3), Verdict::AllPassed);
        assert_eq!(Verdict::from_counts(2, 3), Verdict::PartiallyPassed);
        assert_eq!(Verdict::from_counts(1, 2), Verdict::PartiallyPassed);
        assert_eq!(Verdict::from_counts(1, 3), Verdict::NotEffective);
        assert_eq!(Verdict::from_counts(0, 3), Verdict::NotEffective);
    }

    fn table() -> Vec<MeetingRecord> {
        vec![
            full_record("Avery", "9月", 8.0, 240.0, 5.0, 10.0, 2.0),
            full_record("Jules", "9月", 4.0, 120.0, 4.0, 10.0, 2.0),
            full_record("Avery", "11.03-11.09", 4.0, 100.0, 1.0, 10.0, 1.0),
            full_record("Jules", "11.03-11.09", 2.0, 50.0, 1.0, 10.0, 1.0),
        ]
    }

    #[test]
    fn report_lists_verdict_and_sections() {
        let records = table();
        let baseline: Vec<MeetingRecord> = records[..2].to_vec();
        let current: Vec<MeetingRecord> = records[2..].to_vec();
        let calculator = MetricsCalculator::new(&baseline, &current);
        let kpis = calculator.all_kpis(Some(current.as_slice()));
        let efficiency = calculator.meeting_efficiency();
        let analyzer = StatisticalAnalyzer::new(&records);
        let summaries = analyzer.summary(&[Metric::DailyMeetingCount], 10, 2.0);
        let tiers = classify_users(&user_aggregates(&records, Metric::DailyMeetingCount));
        let periods = MetricsCalculator::period_comparison(&split_by_period(&records));

        let report = build_report("input", &kpis, &efficiency, &summaries, &tiers, &periods);

        assert!(report.starts_with("# 会议负担改善评估报告"));
        assert!(report.contains("**主要KPI达标情况**: 3/3 项达标"));
        assert!(report.contains(Verdict::AllPassed.conclusion()));
        assert!(report.contains("| 日人均会议数减少率 | 6.00 | 3.00 | 50.00 | ≥10% | 达标 |"));
        assert!(report.contains("1. Avery avg 6.00 across 2 periods"));

        let primary = report
            .split("## 主要KPI")
            .nth(1)
            .and_then(|rest| rest.split("## 会议效率").next())
            .unwrap();
        assert_eq!(primary.matches("\n| ").count(), 5);
        assert!(!primary.contains("平均单次会议时长"));
        let efficiency_section = report.split("## 会议效率").nth(1).unwrap();
        assert!(efficiency_section.starts_with("\n| 指标 |"));
        assert!(efficiency_section.contains("| 平均单次会议时长 |"));
        assert!(report.contains("## 用户负担分层"));
        assert!(report.contains("No anomalies above threshold."));
    }

    #[test]
    fn weekly_summary_covers_one_period() {
        let mut records = table();
        records.push(full_record("Kiara", "11.03-11.09", 6.0, 150.0, 2.0, 10.0, 1.0));

        let summary = build_weekly_summary("11.03-11.09", &records);
        assert!(summary.starts_with("# 会议数据周报 - 11.03-11.09"));
        assert!(summary.contains("- 数据记录数: 3"));
        assert!(summary.contains("- 日人均会议数: 4.00"));
        assert!(summary.contains("- 日人均会议时长: 100.0 分钟"));
        assert!(summary.contains("| 1 | Kiara | 6.00 | 150.0 |"));
        assert!(summary.contains("| 3 | Jules | 2.00 | 50.0 |"));

        let empty = build_weekly_summary("12.01-12.07", &records);
        assert!(empty.contains("- 数据记录数: 0"));
        assert!(empty.contains("无数据"));
    }

    #[test]
    fn weekly_summary_keeps_ten_rows() {
        let records: Vec<MeetingRecord> = (0..12)
            .map(|i| record(&format!("user{i:02}"), "11.10-11.16", i as f64))
            .collect();
        let summary = build_weekly_summary("11.10-11.16", &records);
        assert!(summary.contains("| 1 | user11 | 11.00 |"));
        assert!(summary.contains("| 10 | user02 | 2.00 |"));
        assert!(!summary.contains("user01"));
    }

    #[test]
    fn load_advice_bands_around_team_mean() {
        assert_eq!(LoadAdvice::compare(6.1, 5.0), LoadAdvice::Heavy);
        assert_eq!(LoadAdvice::compare(5.9, 5.0), LoadAdvice::Moderate);
        assert_eq!(LoadAdvice::compare(4.1, 5.0), LoadAdvice::Moderate);
        assert_eq!(LoadAdvice::compare(3.9, 5.0), LoadAdvice::WellManaged);
    }

    #[test]
    fn personal_report_compares_user_with_team() {
        let records = table();
        let report = build_personal_report("Avery", &records).unwrap();

        // Avery 6.00 vs team 4.50, minutes 170.0 vs 127.5
        assert!(report.starts_with("# 个人会议健康报告 - Avery"));
        assert!(report.contains("| 日人均会议数 | 6.00 | 4.50 | +33.3% |"));
        assert!(report.contains("| 日人均会议时长 | 170.0 | 127.5 | +33.3% |"));
        let september = report.find("| 9月 | 8.00 |").unwrap();
        let november = report.find("| 11.03-11.09 | 4.00 |").unwrap();
        assert!(september < november);
        assert!(report.contains("### ⚠️ 会议负担较重"));

        let jules = build_personal_report("Jules", &records).unwrap();
        assert!(jules.contains("### ✅ 会议管理良好"));
        assert!(build_personal_report("Morgan", &records).is_none());
    }
}
