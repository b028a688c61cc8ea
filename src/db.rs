use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use crate::models::MeetingRecord;
use crate::period::PeriodClassifier;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Two baseline months and four recent weeks for a small team.
pub async fn seed(pool: &PgPool, classifier: &PeriodClassifier) -> anyhow::Result<usize> {
    import_records(pool, &seed_records(classifier)).await
}

fn seed_records(classifier: &PeriodClassifier) -> Vec<MeetingRecord> {
    // (user, daily meeting count, minutes per meeting)
    let users: [(&str, f64, f64); 4] = [
        ("Avery Lee", 6.2, 41.0),
        ("Jules Moreno", 4.1, 35.0),
        ("Kiara Patel", 2.6, 28.0),
        ("Morgan Chen", 1.4, 22.0),
    ];
    // (label, load factor, instant share)
    let periods: [(&str, f64, f64); 6] = [
        ("9月会议详情", 1.0, 0.45),
        ("10月会议详情", 0.97, 0.43),
        ("10.20-10.26会议详情", 0.9, 0.38),
        ("10.27-11.02会议详情", 0.86, 0.35),
        ("11.03-11.09会议详情", 0.84, 0.33),
        ("11.10-11.16会议详情", 0.82, 0.31),
    ];

    let mut records = Vec::new();
    for (label, factor, instant_share) in periods {
        let period = classifier.classify(label);
        for (user, daily_count, minutes_per_meeting) in users {
            let count = daily_count * factor;
            let total = (count * 5.0).round();
            let instant = (total * instant_share).round();
            records.push(MeetingRecord {
                user_name: user.to_string(),
                period_name: period.name.clone(),
                period_type: period.period_type(),
                sort_key: period.sort_key.clone(),
                daily_meeting_count: count,
                daily_meeting_minutes: count * minutes_per_meeting,
                instant_meetings: instant,
                scheduled_meetings: total - instant,
                total_meetings: total,
                one_on_one_calls: (total * 0.2).round(),
            });
        }
    }

    records
}

/// Inserts records, skipping any (user, period) pair already stored.
pub async fn import_records(pool: &PgPool, records: &[MeetingRecord]) -> anyhow::Result<usize> {
    let mut inserted = 0usize;

    for record in records {
        let result = sqlx::query(
            r#"
            INSERT INTO meeting_load.records
            (id, user_name, period_name, period_type, daily_meeting_count,
             daily_meeting_minutes, instant_meetings, scheduled_meetings,
             total_meetings, one_on_one_calls)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (user_name, period_name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.user_name)
        .bind(&record.period_name)
        .bind(record.period_type.as_str())
        .bind(record.daily_meeting_count)
        .bind(record.daily_meeting_minutes)
        .bind(record.instant_meetings)
        .bind(record.scheduled_meetings)
        .bind(record.total_meetings)
        .bind(record.one_on_one_calls)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    debug!(offered = records.len(), inserted, "import finished");
    Ok(inserted)
}

/// Loads every stored record. Period type and sort key are derived again
/// from the label so stored rows follow the current reference year.
pub async fn fetch_records(
    pool: &PgPool,
    classifier: &PeriodClassifier,
) -> anyhow::Result<Vec<MeetingRecord>> {
    let rows = sqlx::query(
        "SELECT user_name, period_name, daily_meeting_count, daily_meeting_minutes, \
         instant_meetings, scheduled_meetings, total_meetings, one_on_one_calls \
         FROM meeting_load.records \
         ORDER BY imported_at, period_name, user_name",
    )
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let period = classifier.classify(row.get::<String, _>("period_name").as_str());
        records.push(MeetingRecord {
            user_name: row.get("user_name"),
            period_type: period.period_type(),
            sort_key: period.sort_key,
            period_name: period.name,
            daily_meeting_count: row.get("daily_meeting_count"),
            daily_meeting_minutes: row.get("daily_meeting_minutes"),
            instant_meetings: row.get("instant_meetings"),
            scheduled_meetings: row.get("scheduled_meetings"),
            total_meetings: row.get("total_meetings"),
            one_on_one_calls: row.get("one_on_one_calls"),
        });
    }

    debug!(records = records.len(), "loaded records from Postgres");
    Ok(records)
}
