//! OpenFEMA disaster declaration summaries.
//!
//! A single GET per call. The server does the recency filtering and ordering;
//! the response envelope carries the records under `DisasterDeclarationsSummaries`.

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;

use crate::error::SourceError;
use crate::types::{DeclarationsResponse, RawDeclaration};

const SOURCE: &str = "OpenFEMA declarations";

/// Maximum records requested per call
pub const PAGE_SIZE: u32 = 1000;

/// OData filter selecting declarations made since `now - window_days`.
pub fn filter_expression(window_days: i64, now: DateTime<Utc>) -> String {
    let since = now - TimeDelta::days(window_days);
    format!(
        "declarationDate ge '{}'",
        since.format("%Y-%m-%dT%H:%M:%S.000z")
    )
}

/// Query parameters for one request
pub fn query_params(window_days: i64, now: DateTime<Utc>) -> [(&'static str, String); 4] {
    [
        ("$filter", filter_expression(window_days, now)),
        ("$orderby", "declarationDate desc".to_string()),
        ("$top", PAGE_SIZE.to_string()),
        ("$format", "json".to_string()),
    ]
}

/// Fetch declarations from `url`. Zero matching records is `Ok(vec![])`.
pub async fn fetch_recent(
    http_client: &Client,
    url: &str,
    window_days: i64,
    now: DateTime<Utc>,
) -> Result<Vec<RawDeclaration>, SourceError> {
    tracing::info!(url, window_days, "fetching disaster declarations");

    let response = http_client
        .get(url)
        .query(&query_params(window_days, now))
        .send()
        .await
        .map_err(|e| SourceError::unavailable(SOURCE, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::unavailable(SOURCE, format!("HTTP {status}")));
    }

    let body = response
        .text()
        .await
        .map_err(|e| SourceError::unavailable(SOURCE, e))?;

    let parsed: DeclarationsResponse =
        serde_json::from_str(&body).map_err(|e| SourceError::malformed(SOURCE, e))?;

    tracing::info!(count = parsed.declarations.len(), "declarations fetched");
    Ok(parsed.declarations)
}
