//! Postgres persistence for indicator records: schema migration, the
//! upserting loader and the rank update pass.

use mea_core::{IndicatorRecord, CPI_INDICATOR_CODE};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "mea-store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Connect with a single shared connection; the pipeline is strictly
/// sequential and the loader issues one statement at a time.
pub async fn connect(database_url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Outcome of a load pass. Per-row failures are logged and counted, never
/// fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub attempted: usize,
    pub inserted: usize,
    pub failed: usize,
}

const UPSERT_SQL: &str = "\
INSERT INTO indicator_info (country_code, year, value, rank, name, indicator_code) \
VALUES ($1, $2, $3, $4, $5, $6) \
ON CONFLICT (indicator_code, year, COALESCE(country_code, '')) \
DO UPDATE SET value = EXCLUDED.value, rank = EXCLUDED.rank, name = EXCLUDED.name";

/// Upsert one row per record, sequentially. Re-running the pipeline
/// replaces rows on the (indicator, country, year) key instead of
/// appending duplicates.
pub async fn load_records(
    pool: &PgPool,
    records: &[IndicatorRecord],
) -> Result<LoadReport, StoreError> {
    let mut report = LoadReport {
        attempted: records.len(),
        ..LoadReport::default()
    };

    for record in records {
        let outcome = sqlx::query(UPSERT_SQL)
            .bind(&record.country_code)
            .bind(record.year)
            .bind(numeric_value(record.value.as_deref()))
            .bind(numeric_rank(record.rank.as_deref()))
            .bind(&record.indicator_name)
            .bind(&record.indicator_code)
            .execute(pool)
            .await;

        match outcome {
            Ok(_) => report.inserted += 1,
            Err(err) => {
                report.failed += 1;
                warn!(
                    indicator = %record.indicator_code,
                    country = record.country_code.as_deref().unwrap_or("-"),
                    year = record.year,
                    %err,
                    "row upsert failed"
                );
            }
        }
    }

    info!(
        attempted = report.attempted,
        inserted = report.inserted,
        failed = report.failed,
        "load finished"
    );
    Ok(report)
}

const RANK_UPDATE_SQL: &str = "\
UPDATE indicator_info AS i1 \
   SET rank = (SELECT COUNT(*) + 1 \
                 FROM indicator_info AS i2 \
                WHERE i2.name = i1.name \
                  AND i2.year = i1.year \
                  AND i2.value > i1.value) \
 WHERE i1.indicator_code <> $1 \
   AND i1.value IS NOT NULL";

/// Recompute the dense descending rank for every non-CPI row with a value:
/// rank 1 is the highest value within (name, year), ties share a rank and
/// the next distinct value resumes at count + 1. CPI rows keep the rank
/// that arrived with the source file. Idempotent over whatever rows exist.
pub async fn update_ranks(pool: &PgPool) -> Result<u64, StoreError> {
    let result = sqlx::query(RANK_UPDATE_SQL)
        .bind(CPI_INDICATOR_CODE)
        .execute(pool)
        .await?;
    let ranked = result.rows_affected();
    info!(rows = ranked, "rank update finished");
    Ok(ranked)
}

/// Raw source text becomes a nullable double at the table boundary;
/// unparsable or empty input loads as NULL.
pub fn numeric_value(raw: Option<&str>) -> Option<f64> {
    raw.map(str::trim)
        .filter(|text| !text.is_empty())
        .and_then(|text| text.parse().ok())
}

/// Same boundary rule for the pre-assigned CPI rank column.
pub fn numeric_rank(raw: Option<&str>) -> Option<i32> {
    raw.map(str::trim)
        .filter(|text| !text.is_empty())
        .and_then(|text| text.parse().ok())
}
