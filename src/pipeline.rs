//! Fetch, join and normalize in one call.
//!
//! The two upstream fetches are independent, so they run concurrently and each
//! goes through its own TTL cache. Failures never escape as `Err`: the caller
//! always gets a [`PipelineOutcome`] whose status says what happened.

use std::sync::Arc;

use chrono::TimeDelta;
use futures::future;
use serde::Serialize;

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::client::DisasterClient;
use crate::error::{NormalizeError, SourceError};
use crate::gazetteer::GeoReference;
use crate::normalize::normalize_report;
use crate::types::{NormalizedRecord, RawDeclaration};

/// How a pipeline run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "errors", rename_all = "snake_case")]
pub enum PipelineStatus {
    Ready,
    /// Both sources answered but there is nothing to show.
    NoDataForPeriod,
    /// One message per source that failed.
    SourceUnavailable(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub status: PipelineStatus,
    pub records: Vec<NormalizedRecord>,
    pub rejected: Vec<NormalizeError>,
}

impl PipelineOutcome {
    fn unavailable(errors: Vec<String>) -> Self {
        Self {
            status: PipelineStatus::SourceUnavailable(errors),
            records: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

/// Cached access to both sources plus the join.
#[derive(Clone)]
pub struct Pipeline {
    client: DisasterClient,
    clock: Arc<dyn Clock>,
    declarations: TtlCache<i64, Vec<RawDeclaration>>,
    reference: TtlCache<String, GeoReference>,
}

impl Pipeline {
    pub fn new(client: DisasterClient) -> Self {
        Self::with_clock(client, Arc::new(SystemClock))
    }

    pub fn with_clock(client: DisasterClient, clock: Arc<dyn Clock>) -> Self {
        let ttl = TimeDelta::from_std(client.config().cache_ttl).unwrap_or(TimeDelta::hours(1));
        Self {
            declarations: TtlCache::new("declarations", ttl, Arc::clone(&clock)),
            reference: TtlCache::new("gazetteer", ttl, Arc::clone(&clock)),
            client,
            clock,
        }
    }

    pub fn client(&self) -> &DisasterClient {
        &self.client
    }

    /// Raw declarations for the configured window (cached).
    pub async fn declarations(&self) -> Result<Arc<Vec<RawDeclaration>>, SourceError> {
        let window_days = self.client.config().window_days;
        self.declarations
            .get_or_fetch(window_days, || {
                self.client
                    .fetch_recent_declarations(window_days, self.clock.now())
            })
            .await
    }

    /// Geographic reference (cached).
    pub async fn reference(&self) -> Result<Arc<GeoReference>, SourceError> {
        let url = self.client.config().gazetteer_url.clone();
        self.reference
            .get_or_fetch(url, || self.client.load_reference())
            .await
    }

    /// Fetch both sources (or reuse cached copies) and normalize.
    pub async fn run(&self) -> PipelineOutcome {
        let (declarations, reference) =
            future::join(self.declarations(), self.reference()).await;

        let (declarations, reference) = match (declarations, reference) {
            (Ok(d), Ok(r)) => (d, r),
            (d, r) => {
                let errors: Vec<String> = [d.err(), r.err()]
                    .into_iter()
                    .flatten()
                    .map(|e| {
                        tracing::warn!(source = e.source_name(), error = %e, "source failed");
                        e.to_string()
                    })
                    .collect();
                return PipelineOutcome::unavailable(errors);
            }
        };

        let report = normalize_report(&declarations, &reference);
        let status = if report.records.is_empty() {
            PipelineStatus::NoDataForPeriod
        } else {
            PipelineStatus::Ready
        };

        tracing::info!(
            declarations = declarations.len(),
            records = report.records.len(),
            rejected = report.rejected.len(),
            "pipeline run complete"
        );

        PipelineOutcome {
            status,
            records: report.records,
            rejected: report.rejected,
        }
    }

    /// Forget both cached sources so the next run refetches.
    pub async fn invalidate(&self) {
        self.declarations.invalidate().await;
        self.reference.invalidate().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::client::ClientConfig;
    use crate::export::{from_csv, to_csv};
    use crate::types::ZipCodes;
    use httpmock::prelude::*;
    use std::io::{Cursor, Write};

    const GAZETTEER: &str = "GEOID\tALAND\tAWATER\n06037\t1\t0\n06037\t2\t0\n48201\t3\t0\n";

    fn gazetteer_zip() -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("gaz.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(GAZETTEER.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn declaration(number: u64, state: &str, area: &str) -> serde_json::Value {
        serde_json::json!({
            "disasterNumber": number,
            "declarationDate": "2024-01-10T00:00:00.000Z",
            "incidentType": "Flood",
            "state": state,
            "designatedArea": area,
            "iaProgramDeclared": true,
            "ihProgramDeclared": false,
            "paProgramDeclared": false,
            "hmProgramDeclared": false
        })
    }

    fn pipeline_for(server: &MockServer) -> (Pipeline, ManualClock) {
        let clock = ManualClock::new("2024-01-15T12:00:00Z".parse().unwrap());
        let client = DisasterClient::with_config(ClientConfig {
            declarations_url: server.url("/declarations"),
            gazetteer_url: server.url("/gazetteer.zip"),
            ..Default::default()
        })
        .unwrap();
        (Pipeline::with_clock(client, Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_run_joins_both_sources() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/declarations");
                then.status(200).json_body(serde_json::json!({
                    "DisasterDeclarationsSummaries": [
                        declaration(1, "CA", "037 (County code)"),
                        declaration(2, "TX", "Harris (County)"),
                    ]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gazetteer.zip");
                then.status(200).body(gazetteer_zip());
            })
            .await;

        let (pipeline, _) = pipeline_for(&server);
        let outcome = pipeline.run().await;

        assert_eq!(outcome.status, PipelineStatus::Ready);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(
            outcome.records[0].zip_codes,
            ZipCodes::Resolved(vec!["06037".to_string(), "06037".to_string()])
        );
        assert_eq!(outcome.records[1].zip_codes, ZipCodes::Unavailable);
        assert_eq!(outcome.records[1].eligibility, "Individual Assistance");

        // Rows with the sentinel still export
        let exported = from_csv(&to_csv(&outcome.records).unwrap()).unwrap();
        assert_eq!(exported, outcome.records);
    }

    #[tokio::test]
    async fn test_sources_cached_for_ttl() {
        let server = MockServer::start_async().await;
        let declarations = server
            .mock_async(|when, then| {
                when.method(GET).path("/declarations");
                then.status(200).json_body(serde_json::json!({
                    "DisasterDeclarationsSummaries": [declaration(1, "CA", "Kern (County)")]
                }));
            })
            .await;
        let gazetteer = server
            .mock_async(|when, then| {
                when.method(GET).path("/gazetteer.zip");
                then.status(200).body(gazetteer_zip());
            })
            .await;

        let (pipeline, clock) = pipeline_for(&server);
        pipeline.run().await;
        clock.advance(TimeDelta::minutes(30));
        pipeline.run().await;

        declarations.assert_hits_async(1).await;
        gazetteer.assert_hits_async(1).await;

        clock.advance(TimeDelta::minutes(31));
        pipeline.run().await;

        declarations.assert_hits_async(2).await;
        gazetteer.assert_hits_async(2).await;

        pipeline.invalidate().await;
        pipeline.run().await;
        declarations.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn test_zero_records_is_no_data() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/declarations");
                then.status(200)
                    .json_body(serde_json::json!({ "DisasterDeclarationsSummaries": [] }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gazetteer.zip");
                then.status(200).body(gazetteer_zip());
            })
            .await;

        let (pipeline, _) = pipeline_for(&server);
        let outcome = pipeline.run().await;

        assert_eq!(outcome.status, PipelineStatus::NoDataForPeriod);
        assert!(outcome.records.is_empty());
    }

    #[tokio::test]
    async fn test_source_failure_is_a_value() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/declarations");
                then.status(500);
            })
            .await;
        let gazetteer = server
            .mock_async(|when, then| {
                when.method(GET).path("/gazetteer.zip");
                then.status(200).body(gazetteer_zip());
            })
            .await;

        let (pipeline, _) = pipeline_for(&server);
        let outcome = pipeline.run().await;

        match &outcome.status {
            PipelineStatus::SourceUnavailable(errors) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("OpenFEMA"));
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert!(outcome.records.is_empty());

        // The healthy source was still cached
        pipeline.run().await;
        gazetteer.assert_hits_async(1).await;
    }
}
