use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::models::MeetingRecord;
use crate::period::PeriodClassifier;

const BOM: char = '\u{feff}';

/// One exported row. Headers may use the canonical names or the export's
/// Chinese column titles.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default, alias = "用户名", alias = "用户", alias = "姓名")]
    user_name: String,
    #[serde(default, deserialize_with = "lenient_number", alias = "日人均线上会议数")]
    daily_meeting_count: f64,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        alias = "日人均线上会议时长(分钟)",
        alias = "日人均线上会议时长"
    )]
    daily_meeting_minutes: f64,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        alias = "即时会议数",
        alias = "即时会议"
    )]
    instant_meetings: f64,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        alias = "日程会议数",
        alias = "日程会议"
    )]
    scheduled_meetings: f64,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        alias = "人的会议数",
        alias = "即时+日程会议"
    )]
    total_meetings: f64,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        alias = "1v1通话数",
        alias = "1v1通话"
    )]
    one_on_one_calls: f64,
}

/// Empty, unparsable or non-finite cells read as 0.
fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .and_then(|value| value.trim().replace(',', "").parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(0.0))
}

/// Drops a UTF-8 BOM and a leading title line such as `表格 1`.
fn strip_preamble(text: &str) -> &str {
    let text = text.trim_start_matches(BOM);
    match text.split_once('\n') {
        Some((first, rest)) if !first.contains(',') => rest,
        _ => text,
    }
}

/// Parses one export. The period label is the file stem.
pub fn load_file(path: &Path, classifier: &PeriodClassifier) -> anyhow::Result<Vec<MeetingRecord>> {
    let label = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .with_context(|| format!("file name of {} is not valid UTF-8", path.display()))?;
    if !classifier.is_recognized(label) {
        warn!(label, "unrecognized period label, ordering it after dated periods");
    }
    let period = classifier.classify(label).into_period();

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(strip_preamble(&text).as_bytes());

    let mut records = Vec::new();
    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("bad row {} in {}", line + 1, path.display()))?;
        if row.user_name.trim().is_empty() {
            warn!(file = %path.display(), row = line + 1, "skipping row without user");
            continue;
        }

        let total_meetings = if row.total_meetings > 0.0 {
            row.total_meetings
        } else {
            row.instant_meetings + row.scheduled_meetings
        };

        records.push(MeetingRecord {
            user_name: row.user_name.trim().to_string(),
            period_name: period.name.clone(),
            period_type: period.period_type,
            sort_key: period.sort_key.clone(),
            daily_meeting_count: row.daily_meeting_count,
            daily_meeting_minutes: row.daily_meeting_minutes,
            instant_meetings: row.instant_meetings,
            scheduled_meetings: row.scheduled_meetings,
            total_meetings,
            one_on_one_calls: row.one_on_one_calls,
        });
    }

    debug!(
        file = %path.display(),
        period = %period.name,
        period_type = %period.period_type,
        records = records.len(),
        "loaded export"
    );
    Ok(records)
}

/// `*.csv` files directly under `dir`, by file name.
pub fn csv_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read data directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Loads every export in `dir`. Files that fail to parse are skipped with a
/// warning; a directory without any CSV is an error.
pub fn load_dir(dir: &Path, classifier: &PeriodClassifier) -> anyhow::Result<Vec<MeetingRecord>> {
    let files = csv_files(dir)?;
    if files.is_empty() {
        anyhow::bail!("no CSV files found in {}", dir.display());
    }

    let mut records = Vec::new();
    for path in &files {
        match load_file(path, classifier) {
            Ok(mut rows) => records.append(&mut rows),
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(file = %path.display(), error = %reason, "skipping file");
            }
        }
    }

    debug!(
        files = files.len(),
        records = records.len(),
        reference_year = classifier.reference_year(),
        "data directory loaded"
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PeriodType;

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn chinese_headers_title_line_and_bom_are_handled() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "9月会议详情.csv",
            "\u{feff}表格 1\nuser_name,日人均线上会议数,日人均线上会议时长(分钟),即时会议数,日程会议数,人的会议数,1v1通话数\n\
             Avery,4.5,120,6,4,10,3\n\
             Jules,,90,n/a,2,2,\n",
        );

        let records = load_dir(dir.path(), &PeriodClassifier::new(2024)).unwrap();
        assert_eq!(records.len(), 2);

        let avery = &records[0];
        assert_eq!(avery.period_name, "9月会议详情");
        assert_eq!(avery.period_type, PeriodType::Monthly);
        assert!((avery.daily_meeting_count - 4.5).abs() < 1e-12);
        assert!((avery.total_meetings - 10.0).abs() < 1e-12);
        assert!((avery.one_on_one_calls - 3.0).abs() < 1e-12);

        let jules = &records[1];
        assert_eq!(jules.daily_meeting_count, 0.0);
        assert_eq!(jules.instant_meetings, 0.0);
        assert_eq!(jules.one_on_one_calls, 0.0);
    }

    #[test]
    fn canonical_headers_and_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "11.03-11.09.csv",
            "user_name,daily_meeting_count,即时会议,日程会议\nAvery,3,2,5\n,9,9,9\n",
        );

        let records = load_dir(dir.path(), &PeriodClassifier::new(2024)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].period_type, PeriodType::Weekly);
        assert_eq!(records[0].daily_meeting_minutes, 0.0);
        assert!((records[0].total_meetings - 7.0).abs() < 1e-12);
    }

    #[test]
    fn files_load_in_name_order_and_others_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.csv", "user_name,daily_meeting_count\nJules,2\n");
        write(dir.path(), "a.csv", "user_name,daily_meeting_count\nAvery,1\n");
        write(dir.path(), "notes.txt", "not data");

        let records = load_dir(dir.path(), &PeriodClassifier::new(2024)).unwrap();
        let users: Vec<&str> = records.iter().map(|r| r.user_name.as_str()).collect();
        assert_eq!(users, vec!["Avery", "Jules"]);
        assert_eq!(records[0].period_type, PeriodType::Unknown);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_dir(dir.path(), &PeriodClassifier::new(2024)).is_err());
    }
}
