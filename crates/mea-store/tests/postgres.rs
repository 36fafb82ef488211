//! Postgres-backed tests. Run them against a disposable database with
//! `DATABASE_URL=... cargo test -p mea-store -- --ignored --test-threads=1`.

use mea_core::IndicatorRecord;
use sqlx::{PgPool, Row};

async fn fresh_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
    let pool = mea_store::connect(&url).await.expect("connect");
    mea_store::run_migrations(&pool).await.expect("migrate");
    sqlx::query("DELETE FROM indicator_info")
        .execute(&pool)
        .await
        .expect("clean table");
    pool
}

fn record(code: &str, name: &str, country: &str, year: i32, value: Option<&str>, rank: Option<&str>) -> IndicatorRecord {
    IndicatorRecord {
        indicator_name: name.to_string(),
        indicator_code: code.to_string(),
        country_code: Some(country.to_string()),
        year,
        value: value.map(str::to_string),
        rank: rank.map(str::to_string),
    }
}

async fn rank_of(pool: &PgPool, code: &str, country: &str, year: i32) -> Option<i32> {
    sqlx::query("SELECT rank FROM indicator_info WHERE indicator_code = $1 AND country_code = $2 AND year = $3")
        .bind(code)
        .bind(country)
        .bind(year)
        .fetch_one(pool)
        .await
        .expect("row present")
        .get("rank")
}

#[tokio::test]
#[ignore]
async fn rerunning_the_load_replaces_instead_of_appending() {
    let pool = fresh_pool().await;
    let first = vec![record("X", "Series X", "KEN", 2020, Some("50"), None)];
    let second = vec![record("X", "Series X", "KEN", 2020, Some("75"), None)];

    let report = mea_store::load_records(&pool, &first).await.expect("load");
    assert_eq!(report.inserted, 1);
    mea_store::load_records(&pool, &second).await.expect("reload");

    let row = sqlx::query("SELECT COUNT(*) AS n FROM indicator_info")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(row.get::<i64, _>("n"), 1);

    let row = sqlx::query("SELECT value FROM indicator_info WHERE indicator_code = 'X'")
        .fetch_one(&pool)
        .await
        .expect("row");
    assert_eq!(row.get::<Option<f64>, _>("value"), Some(75.0));
    pool.close().await;
}

#[tokio::test]
#[ignore]
async fn rank_update_is_dense_descending_with_shared_ties() {
    let pool = fresh_pool().await;
    let records = vec![
        record("X", "Series X", "KEN", 2020, Some("50"), None),
        record("X", "Series X", "NZL", 2020, Some("80"), None),
        record("X", "Series X", "BRA", 2020, Some("80"), None),
    ];
    mea_store::load_records(&pool, &records).await.expect("load");
    let ranked = mea_store::update_ranks(&pool).await.expect("rank");
    assert_eq!(ranked, 3);

    assert_eq!(rank_of(&pool, "X", "KEN", 2020).await, Some(3));
    assert_eq!(rank_of(&pool, "X", "NZL", 2020).await, Some(1));
    assert_eq!(rank_of(&pool, "X", "BRA", 2020).await, Some(1));
    pool.close().await;
}

#[tokio::test]
#[ignore]
async fn rank_update_skips_cpi_and_null_values() {
    let pool = fresh_pool().await;
    let records = vec![
        record("CPI", "Corruption Perception Index", "KEN", 2020, Some("30"), Some("100")),
        record("X", "Series X", "KEN", 2020, None, None),
        record("X", "Series X", "NZL", 2020, Some("80"), None),
    ];
    mea_store::load_records(&pool, &records).await.expect("load");
    mea_store::update_ranks(&pool).await.expect("rank");

    assert_eq!(rank_of(&pool, "CPI", "KEN", 2020).await, Some(100));
    assert_eq!(rank_of(&pool, "X", "KEN", 2020).await, None);
    assert_eq!(rank_of(&pool, "X", "NZL", 2020).await, Some(1));
    pool.close().await;
}
