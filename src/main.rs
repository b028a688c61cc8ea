use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

mod aggregate;
mod analyzer;
mod config;
mod db;
mod error;
mod ingest;
mod metrics;
mod models;
mod period;
mod report;
mod stats;
mod tiers;

use aggregate::CohortSelector;
use analyzer::StatisticalAnalyzer;
use config::AnalysisConfig;
use error::AnalysisResult;
use metrics::MetricsCalculator;
use models::{GroupColumn, KpiResult, MeetingRecord, Metric, PeriodType};
use report::Verdict;

#[derive(Parser)]
#[command(name = "meeting-load-review")]
#[command(about = "Meeting load KPI tracking and statistics over per-user exports", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: AnalysisConfig,

    /// Directory holding one CSV export per period
    #[arg(long, global = true, env = "MEETING_LOAD_DATA_DIR", default_value = "input")]
    data_dir: PathBuf,

    /// Read records from Postgres (DATABASE_URL) instead of the data directory
    #[arg(long, global = true)]
    from_db: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log debug events to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample records
    Seed,
    /// Import the data directory into Postgres
    Import,
    /// List periods with their type and sort key
    Periods,
    /// Baseline vs current KPI report
    Kpi,
    /// Average meeting length change between cohorts
    Efficiency,
    /// Linear trend of a metric across groups
    Trend {
        #[arg(long, default_value = "daily_meeting_count")]
        metric: Metric,
        #[arg(long, default_value = "period")]
        group: GroupColumn,
    },
    /// Rows with an extreme z-score
    Anomalies {
        #[arg(long, default_value = "daily_meeting_count")]
        metric: Metric,
        /// Overrides the configured anomaly threshold
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Descriptive statistics of a metric
    Distribution {
        #[arg(long, default_value = "daily_meeting_count")]
        metric: Metric,
    },
    /// Two-sample t-test between two periods
    Compare {
        #[arg(long, default_value = "daily_meeting_count")]
        metric: Metric,
        period1: String,
        period2: String,
    },
    /// Users ranked by their mean
    TopUsers {
        #[arg(long, default_value = "daily_meeting_count")]
        metric: Metric,
        /// Overrides the configured top N
        #[arg(long)]
        n: Option<usize>,
        /// Lowest first
        #[arg(long)]
        ascending: bool,
    },
    /// Pearson and Spearman correlation of two metrics
    Correlate {
        #[arg(long, default_value = "daily_meeting_count")]
        metric1: Metric,
        #[arg(long, default_value = "daily_meeting_minutes")]
        metric2: Metric,
    },
    /// Per-group improvement between two period sets
    Improvement {
        #[arg(long, default_value = "daily_meeting_count")]
        metric: Metric,
        #[arg(long, default_value = "user")]
        group: GroupColumn,
        /// Baseline periods; defaults to the baseline cohort's periods
        #[arg(long, value_delimiter = ',')]
        baseline: Vec<String>,
        /// Current periods; defaults to the current cohort's periods
        #[arg(long, value_delimiter = ',')]
        current: Vec<String>,
    },
    /// Change of each period's mean against the previous period
    Wow {
        #[arg(long, default_value = "daily_meeting_count")]
        metric: Metric,
    },
    /// High/medium/low load bands
    Tiers {
        /// Band users by their mean instead of banding rows
        #[arg(long)]
        per_user: bool,
    },
    /// Per-period means and instant ratio
    PeriodTable,
    /// Distribution, trend, top users and anomalies per metric
    Summary {
        #[arg(long, value_delimiter = ',', default_value = "daily_meeting_count,daily_meeting_minutes")]
        metrics: Vec<Metric>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Markdown summary of one period (latest by default)
    WeeklyReport {
        #[arg(long)]
        period: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Markdown report of one user against the team
    UserReport {
        #[arg(long)]
        user: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_records(cli: &Cli) -> anyhow::Result<Vec<MeetingRecord>> {
    let classifier = cli.config.classifier();
    if cli.from_db {
        let pool = connect().await?;
        db::fetch_records(&pool, &classifier).await
    } else {
        ingest::load_dir(&cli.data_dir, &classifier)
    }
}

fn emit<T: Serialize>(json: bool, value: &T, render: impl FnOnce(&T)) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        render(value);
    }
    Ok(())
}

/// JSON mode prints analysis errors as their serialized marker.
fn emit_result<T: Serialize>(
    json: bool,
    result: AnalysisResult<T>,
    render: impl FnOnce(&T),
) -> anyhow::Result<()> {
    match result {
        Ok(value) => emit(json, &value, render),
        Err(err) if json => {
            println!("{}", serde_json::to_string_pretty(&err)?);
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn print_kpi(kpi: &KpiResult) {
    println!(
        "- [{}] {}: {:.2} -> {:.2}, change {:.2} (target {})",
        if kpi.passed { "pass" } else { "fail" },
        kpi.name,
        kpi.baseline_value,
        kpi.current_value,
        kpi.change_metric,
        kpi.target_description
    );
}

fn period_names(records: &[MeetingRecord]) -> Vec<String> {
    aggregate::periods(records)
        .into_iter()
        .map(|period| period.name)
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let json = cli.json;
    let config = &cli.config;
    let selector = CohortSelector::new(
        config.classifier(),
        config.baseline_months.clone(),
        config.recent_weeks,
    );

    match &cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            let inserted = db::seed(&pool, &config.classifier()).await?;
            println!("Inserted {inserted} seed records.");
        }
        Commands::Import => {
            let records = ingest::load_dir(&cli.data_dir, &config.classifier())?;
            let pool = connect().await?;
            let inserted = db::import_records(&pool, &records).await?;
            println!(
                "Inserted {inserted} of {} records from {}.",
                records.len(),
                cli.data_dir.display()
            );
        }
        Commands::Periods => {
            let records = load_records(&cli).await?;
            let periods = aggregate::periods(&records);
            emit(json, &periods, |periods| {
                for period in periods {
                    println!("{} [{}] {}", period.name, period.period_type, period.sort_key);
                }
            })?;
        }
        Commands::Kpi => {
            let records = load_records(&cli).await?;
            let baseline = selector.baseline(&records);
            let current = selector.current(&records);
            let weekly = aggregate::by_period_type(&records, PeriodType::Weekly);
            let weekly = (!weekly.is_empty()).then_some(weekly.as_slice());
            let kpis = MetricsCalculator::new(&baseline, &current).all_kpis(weekly);

            emit(json, &kpis, |kpis| {
                let passed = kpis.primary.passed_count();
                let total = kpis.primary.all().len();
                println!("Primary KPIs passed: {passed}/{total}");
                println!("{}", Verdict::from_counts(passed, total).conclusion());
                for kpi in kpis.primary.all() {
                    print_kpi(kpi);
                }
                print_kpi(&kpis.secondary.one_on_one.kpi);
                println!("  status: {}", kpis.secondary.one_on_one.status.label());
                print_kpi(&kpis.secondary.burden_balance);
                print_kpi(&kpis.monitoring.top10_improvement.kpi);
                if let Some(volatility) = &kpis.monitoring.weekly_volatility {
                    println!(
                        "- [{}] weekly volatility {:.3} over {} weeks (target {})",
                        if volatility.passed { "pass" } else { "fail" },
                        volatility.volatility,
                        volatility.period_count,
                        volatility.target_description
                    );
                }
            })?;
        }
        Commands::Efficiency => {
            let records = load_records(&cli).await?;
            let baseline = selector.baseline(&records);
            let current = selector.current(&records);
            let efficiency = MetricsCalculator::new(&baseline, &current).meeting_efficiency();
            emit(json, &efficiency, |efficiency| {
                print_kpi(&efficiency.kpi);
                println!("  minute delta {:+.2}", efficiency.minute_delta);
            })?;
        }
        Commands::Trend { metric, group } => {
            let records = load_records(&cli).await?;
            let trend = StatisticalAnalyzer::new(&records).analyze_trend(*metric, *group);
            emit(json, &trend, |trend| {
                println!(
                    "{}: {:?} slope {:.4} R² {:.3} p {:.4} change {:+.1}%",
                    trend.metric,
                    trend.direction,
                    trend.slope,
                    trend.r_squared,
                    trend.p_value,
                    trend.change_rate
                );
                for point in &trend.ordered_series {
                    println!("  {} {:.2} (n={})", point.group, point.mean, point.count);
                }
            })?;
        }
        Commands::Anomalies { metric, threshold } => {
            let records = load_records(&cli).await?;
            let threshold = threshold.unwrap_or(config.anomaly_threshold);
            let anomalies = StatisticalAnalyzer::new(&records).detect_anomalies(*metric, threshold);
            emit(json, &anomalies, |anomalies| {
                if anomalies.is_empty() {
                    println!("No anomalies above |z| > {threshold}.");
                }
                for anomaly in anomalies {
                    println!(
                        "- {} ({}) {:.2} z {:+.2} {:?}",
                        anomaly.user_name,
                        anomaly.period_name,
                        anomaly.value,
                        anomaly.z_score,
                        anomaly.anomaly_type
                    );
                }
            })?;
        }
        Commands::Distribution { metric } => {
            let records = load_records(&cli).await?;
            let distribution = StatisticalAnalyzer::new(&records).analyze_distribution(*metric);
            emit(json, &distribution, |d| {
                println!(
                    "{}: n={} mean {:.3} median {:.3} std {:.3} min {:.3} q25 {:.3} q75 {:.3} max {:.3} skew {:.3} kurt {:.3}",
                    d.metric, d.count, d.mean, d.median, d.std, d.min, d.q25, d.q75, d.max, d.skewness, d.kurtosis
                );
            })?;
        }
        Commands::Compare {
            metric,
            period1,
            period2,
        } => {
            let records = load_records(&cli).await?;
            let result =
                StatisticalAnalyzer::new(&records).compare_periods(*metric, period1, period2);
            emit_result(json, result, |c| {
                println!(
                    "{} {:.3} vs {} {:.3}: change {:+.1}%, t {:.3}, p {:.4}{}",
                    c.period1,
                    c.mean1,
                    c.period2,
                    c.mean2,
                    c.change_rate,
                    c.t_statistic,
                    c.p_value,
                    if c.significant { " (significant)" } else { "" }
                );
            })?;
        }
        Commands::TopUsers {
            metric,
            n,
            ascending,
        } => {
            let records = load_records(&cli).await?;
            let n = n.unwrap_or(config.top_n);
            let users = StatisticalAnalyzer::new(&records).identify_top_users(*metric, n, *ascending);
            emit(json, &users, |users| {
                for (rank, user) in users.iter().enumerate() {
                    println!(
                        "{}. {} avg {:.2} sum {:.2} across {} periods",
                        rank + 1,
                        user.user_name,
                        user.mean,
                        user.sum,
                        user.data_points
                    );
                }
            })?;
        }
        Commands::Correlate { metric1, metric2 } => {
            let records = load_records(&cli).await?;
            let result = StatisticalAnalyzer::new(&records).analyze_correlation(*metric1, *metric2);
            emit_result(json, result, |c| {
                println!(
                    "{} ~ {} (n={}): pearson {:.3} (p {:.4}), spearman {:.3} (p {:.4})",
                    c.metric1,
                    c.metric2,
                    c.sample_size,
                    c.pearson_correlation,
                    c.pearson_p_value,
                    c.spearman_correlation,
                    c.spearman_p_value
                );
            })?;
        }
        Commands::Improvement {
            metric,
            group,
            baseline,
            current,
        } => {
            let records = load_records(&cli).await?;
            let baseline = if baseline.is_empty() {
                period_names(&selector.baseline(&records))
            } else {
                baseline.clone()
            };
            let current = if current.is_empty() {
                period_names(&selector.current(&records))
            } else {
                current.clone()
            };
            let rows = StatisticalAnalyzer::new(&records)
                .analyze_improvement_by_group(*metric, *group, &baseline, &current);
            emit(json, &rows, |rows| {
                for row in rows {
                    println!(
                        "- {}: {:.2} -> {:.2} ({:+.1}%)",
                        row.group, row.baseline, row.current, row.improvement_rate
                    );
                }
            })?;
        }
        Commands::Wow { metric } => {
            let records = load_records(&cli).await?;
            let changes = StatisticalAnalyzer::new(&records).calculate_week_over_week_change(*metric);
            emit(json, &changes, |changes| {
                for change in changes {
                    println!(
                        "{} {:.2} ({:+.2}, {:+.1}%)",
                        change.period_name, change.value, change.change, change.change_rate
                    );
                }
            })?;
        }
        Commands::Tiers { per_user } => {
            let records = load_records(&cli).await?;
            let summary = if *per_user {
                tiers::classify_users(&aggregate::user_aggregates(
                    &records,
                    Metric::DailyMeetingCount,
                ))
            } else {
                tiers::classify_rows(&records)
            };
            emit(json, &summary, |summary| {
                println!("{} classified", summary.total());
                for tier in [tiers::LoadTier::High, tiers::LoadTier::Medium, tiers::LoadTier::Low] {
                    let stats = summary.get(tier);
                    println!("{}: {} (avg {:.2})", tier.label(), stats.count, stats.mean);
                }
            })?;
        }
        Commands::PeriodTable => {
            let records = load_records(&cli).await?;
            let rows = MetricsCalculator::period_comparison(&aggregate::split_by_period(&records));
            emit(json, &rows, |rows| {
                for row in rows {
                    println!(
                        "{}: count {:.2} minutes {:.1} instant {:.1}% ({} rows)",
                        row.period,
                        row.mean_daily_count,
                        row.mean_daily_minutes,
                        row.instant_ratio,
                        row.record_count
                    );
                }
            })?;
        }
        Commands::Summary { metrics } => {
            let records = load_records(&cli).await?;
            let summaries = StatisticalAnalyzer::new(&records).summary(
                metrics,
                config.top_n,
                config.anomaly_threshold,
            );
            emit(json, &summaries, |summaries| {
                for summary in summaries {
                    let d = &summary.distribution;
                    println!(
                        "{}: mean {:.2} median {:.2} std {:.2}, trend {:?} ({:+.1}%), {} anomalies",
                        summary.metric,
                        d.mean,
                        d.median,
                        d.std,
                        summary.trend.direction,
                        summary.trend.change_rate,
                        summary.anomalies.len()
                    );
                    for user in &summary.top_users {
                        println!("  {} {:.2}", user.user_name, user.mean);
                    }
                }
            })?;
        }
        Commands::Report { out } => {
            let records = load_records(&cli).await?;
            let baseline = selector.baseline(&records);
            let current = selector.current(&records);
            let weekly = aggregate::by_period_type(&records, PeriodType::Weekly);
            let calculator = MetricsCalculator::new(&baseline, &current);
            let kpis = calculator.all_kpis((!weekly.is_empty()).then_some(weekly.as_slice()));
            let efficiency = calculator.meeting_efficiency();
            let summaries = StatisticalAnalyzer::new(&records).summary(
                &[Metric::DailyMeetingCount, Metric::DailyMeetingMinutes],
                config.top_n,
                config.anomaly_threshold,
            );
            let tiers = tiers::classify_users(&aggregate::user_aggregates(
                &records,
                Metric::DailyMeetingCount,
            ));
            let periods = MetricsCalculator::period_comparison(&aggregate::split_by_period(&records));

            let source = if cli.from_db {
                "Postgres".to_string()
            } else {
                cli.data_dir.display().to_string()
            };
            let report =
                report::build_report(&source, &kpis, &efficiency, &summaries, &tiers, &periods);
            std::fs::write(out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::WeeklyReport { period, out } => {
            let records = load_records(&cli).await?;
            let period = match period {
                Some(period) => period.clone(),
                None => period_names(&records)
                    .pop()
                    .context("no periods loaded")?,
            };
            let out = out
                .clone()
                .unwrap_or_else(|| PathBuf::from(format!("weekly_summary_{period}.md")));
            let summary = report::build_weekly_summary(&period, &records);
            std::fs::write(&out, summary)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Weekly summary for {period} written to {}.", out.display());
        }
        Commands::UserReport { user, out } => {
            let records = load_records(&cli).await?;
            let Some(personal) = report::build_personal_report(user, &records) else {
                anyhow::bail!("no records for user {user}");
            };
            let out = out
                .clone()
                .unwrap_or_else(|| PathBuf::from(format!("personal_report_{user}.md")));
            std::fs::write(&out, personal)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Personal report for {user} written to {}.", out.display());
        }
    }

    Ok(())
}
