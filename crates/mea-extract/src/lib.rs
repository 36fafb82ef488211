//! Extraction stages: the local CPI file reader, the CPI transformer and
//! the World Bank indicator page walker.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use mea_core::{IndicatorRecord, CPI_INDICATOR_CODE, CPI_INDICATOR_NAME, CPI_YEARS};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "mea-extract";

/// One data row of the local file, keyed by the verbatim header spelling.
pub type RowMap = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("opening {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("malformed row in {path}: {source}")]
    MalformedRow {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Read a comma-separated file with a header row into one map per data
/// row, in file order. Any failure aborts the whole extraction; callers
/// never see a partial sequence.
pub fn extract_csv_rows(path: impl AsRef<Path>) -> Result<Vec<RowMap>, ExtractError> {
    let path = path.as_ref();
    let path_text = path.display().to_string();

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|source| ExtractError::Open {
            path: path_text.clone(),
            source,
        })?;

    let headers = reader
        .headers()
        .map_err(|source| ExtractError::Open {
            path: path_text.clone(),
            source,
        })?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| ExtractError::MalformedRow {
            path: path_text.clone(),
            source,
        })?;
        let mut row = RowMap::with_capacity(headers.len());
        for (index, name) in headers.iter().enumerate() {
            if let Some(field) = record.get(index) {
                row.insert(name.to_string(), field.to_string());
            }
        }
        rows.push(row);
    }

    debug!(path = %path_text, rows = rows.len(), "local csv extracted");
    Ok(rows)
}

/// Expand each CPI file row into one record per year, newest year first.
/// Values stay raw strings; the store coerces them at the table boundary.
pub fn transform_cpi_rows(rows: &[RowMap]) -> Vec<IndicatorRecord> {
    let mut records = Vec::with_capacity(rows.len() * CPI_YEARS.clone().count());
    for row in rows {
        for year in CPI_YEARS.rev() {
            records.push(IndicatorRecord {
                indicator_name: CPI_INDICATOR_NAME.to_string(),
                indicator_code: CPI_INDICATOR_CODE.to_string(),
                country_code: row
                    .get("ISO3")
                    .map(|iso3| iso3.trim().to_string())
                    .filter(|iso3| !iso3.is_empty()),
                year,
                value: score_for_year(row, year),
                rank: row.get(&format!("Rank {year}")).cloned(),
            });
        }
    }
    records
}

/// The file carries two header spellings for the score column; the
/// capitalized one wins when both are present and non-empty.
fn score_for_year(row: &RowMap, year: i32) -> Option<String> {
    for key in [format!("CPI Score {year}"), format!("CPI score {year}")] {
        if let Some(value) = row.get(&key) {
            if !value.is_empty() {
                return Some(value.clone());
            }
        }
    }
    None
}

#[derive(Debug, Clone)]
pub enum CountryScope {
    All,
    Codes(Vec<String>),
}

impl CountryScope {
    pub fn path_segment(&self) -> String {
        match self {
            CountryScope::All => "all".to_string(),
            CountryScope::Codes(codes) => codes.join(";"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorldBankConfig {
    pub base_url: String,
    pub indicator_codes: Vec<String>,
    pub countries: CountryScope,
    /// Inclusive `from:to` year window sent as the `date` query parameter.
    pub date_range: (i32, i32),
    pub per_page: u32,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for WorldBankConfig {
    fn default() -> Self {
        Self {
            base_url: "http://api.worldbank.org/v2".to_string(),
            indicator_codes: vec![
                "ER.FSH.PROD.MT".to_string(),
                "AG.SRF.TOTL.K2".to_string(),
                "IC.REG.DURS".to_string(),
                "IC.BUS.NREG".to_string(),
                "SL.AGR.EMPL.ZS".to_string(),
                "SL.EMP.SELF.ZS".to_string(),
            ],
            countries: CountryScope::All,
            date_range: (2019, 2022),
            per_page: 100,
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

/// Pagination metadata, the first element of the API's response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct PageMeta {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub pages: u32,
    #[serde(default)]
    pub total: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorRef {
    pub id: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Observation {
    pub indicator: IndicatorRef,
    #[serde(default)]
    pub countryiso3code: Option<String>,
    pub date: String,
    #[serde(default)]
    pub value: Option<f64>,
}

/// The API's two-element response wrapper: metadata, then a nullable data
/// array.
#[derive(Debug, Clone, Deserialize)]
pub struct PageEnvelope(pub PageMeta, pub Option<Vec<Observation>>);

#[derive(Debug, Error)]
pub enum RemoteExtractError {
    #[error("requesting {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("decoding page {page}: {source}")]
    Decode {
        page: u32,
        #[source]
        source: serde_json::Error,
    },
    #[error("page {page} observation has non-integer date {date:?}")]
    BadDate { page: u32, date: String },
}

/// Anything that can serve indicator pages. The production implementation
/// is [`WorldBankClient`]; tests script their own.
#[async_trait]
pub trait IndicatorSource: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<PageEnvelope, RemoteExtractError>;
}

#[derive(Debug)]
pub struct WorldBankClient {
    config: WorldBankConfig,
    client: reqwest::Client,
}

impl WorldBankClient {
    pub fn new(config: WorldBankConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;
        Ok(Self { config, client })
    }

    fn page_url(&self, page: u32) -> String {
        format!(
            "{}/country/{}/indicator/{}?format=json&date={}:{}&source=2&per_page={}&page={}",
            self.config.base_url,
            self.config.countries.path_segment(),
            self.config.indicator_codes.join(";"),
            self.config.date_range.0,
            self.config.date_range.1,
            self.config.per_page,
            page,
        )
    }
}

#[async_trait]
impl IndicatorSource for WorldBankClient {
    async fn fetch_page(&self, page: u32) -> Result<PageEnvelope, RemoteExtractError> {
        let url = self.page_url(page);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| RemoteExtractError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteExtractError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| RemoteExtractError::Request {
                url: url.clone(),
                source,
            })?;
        serde_json::from_str(&body).map_err(|source| RemoteExtractError::Decode { page, source })
    }
}

/// Walk every page of the source and return the flattened observations in
/// per-page, per-element order. Page 1 is always fetched once to learn the
/// page count; `pages == 0` leaves the result empty without an error. Any
/// failure aborts with no partial result.
pub async fn extract_remote_records(
    source: &dyn IndicatorSource,
) -> Result<Vec<IndicatorRecord>, RemoteExtractError> {
    let first = source.fetch_page(1).await?;
    let total_pages = first.0.pages;

    let mut records = Vec::new();
    append_page(&mut records, 1, &first)?;
    for page in 2..=total_pages {
        let envelope = source.fetch_page(page).await?;
        append_page(&mut records, page, &envelope)?;
    }

    debug!(pages = total_pages, records = records.len(), "remote extraction finished");
    Ok(records)
}

fn append_page(
    out: &mut Vec<IndicatorRecord>,
    page: u32,
    envelope: &PageEnvelope,
) -> Result<(), RemoteExtractError> {
    let Some(observations) = &envelope.1 else {
        return Ok(());
    };
    for observation in observations {
        let year = observation
            .date
            .trim()
            .parse::<i32>()
            .map_err(|_| RemoteExtractError::BadDate {
                page,
                date: observation.date.clone(),
            })?;
        out.push(IndicatorRecord {
            indicator_name: observation.indicator.value.clone(),
            indicator_code: observation.indicator.id.clone(),
            country_code: observation
                .countryiso3code
                .clone()
                .filter(|code| !code.is_empty()),
            year,
            value: observation.value.map(|value| value.to_string()),
            rank: None,
        });
    }
    Ok(())
}
