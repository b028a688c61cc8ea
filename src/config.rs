use clap::Args;

use crate::period::PeriodClassifier;

pub const DEFAULT_REFERENCE_YEAR: i32 = 2024;

/// Analysis knobs shared by every subcommand. Each flag can also be set
/// through its `MEETING_LOAD_*` environment variable.
#[derive(Debug, Clone, Args)]
pub struct AnalysisConfig {
    /// Year used to date period labels, which carry only month and day
    #[arg(long, global = true, env = "MEETING_LOAD_REFERENCE_YEAR", default_value_t = DEFAULT_REFERENCE_YEAR)]
    pub reference_year: i32,

    /// Months (1-12) whose monthly periods form the baseline cohort
    #[arg(
        long,
        global = true,
        env = "MEETING_LOAD_BASELINE_MONTHS",
        value_delimiter = ',',
        default_values_t = [9u32, 10u32]
    )]
    pub baseline_months: Vec<u32>,

    /// Number of most recent weekly periods forming the current cohort
    #[arg(long, global = true, env = "MEETING_LOAD_RECENT_WEEKS", default_value_t = 4)]
    pub recent_weeks: usize,

    /// |z| above which a row is reported as an anomaly
    #[arg(long, global = true, env = "MEETING_LOAD_ANOMALY_THRESHOLD", default_value_t = 2.0)]
    pub anomaly_threshold: f64,

    /// Users listed in rankings and reports
    #[arg(long, global = true, env = "MEETING_LOAD_TOP_N", default_value_t = 10)]
    pub top_n: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            reference_year: DEFAULT_REFERENCE_YEAR,
            baseline_months: vec![9, 10],
            recent_weeks: 4,
            anomaly_threshold: 2.0,
            top_n: 10,
        }
    }
}

impl AnalysisConfig {
    pub fn classifier(&self) -> PeriodClassifier {
        PeriodClassifier::new(self.reference_year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        config: AnalysisConfig,
    }

    #[test]
    fn defaults_match_flag_defaults() {
        let parsed = Harness::parse_from(["harness"]).config;
        let defaults = AnalysisConfig::default();
        assert_eq!(parsed.reference_year, defaults.reference_year);
        assert_eq!(parsed.baseline_months, defaults.baseline_months);
        assert_eq!(parsed.recent_weeks, defaults.recent_weeks);
        assert_eq!(parsed.top_n, defaults.top_n);
        assert!((parsed.anomaly_threshold - defaults.anomaly_threshold).abs() < 1e-12);
    }

    #[test]
    fn baseline_months_accept_comma_list() {
        let parsed =
            Harness::parse_from(["harness", "--baseline-months", "8,9,10", "--recent-weeks", "6"])
                .config;
        assert_eq!(parsed.baseline_months, vec![8, 9, 10]);
        assert_eq!(parsed.recent_weeks, 6);
        assert_eq!(parsed.classifier().reference_year(), 2024);
    }
}
