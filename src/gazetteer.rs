//! Census ZCTA gazetteer: the geographic reference for the ZIP join.
//!
//! The published file is a zip archive holding one tab-separated text file.
//! Only the `GEOID` column is used. It must stay text so leading zeros survive;
//! its first two characters are read as the region code and the next three as
//! the county code.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use reqwest::Client;
use zip::ZipArchive;

use crate::error::SourceError;

const SOURCE: &str = "Census gazetteer";
const GEOID_COLUMN: &str = "GEOID";

/// Lookup from (region code, county code) to the GEOIDs filed under it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoReference {
    index: HashMap<(String, String), Vec<String>>,
    rows: usize,
}

impl GeoReference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw GEOIDs, deriving region and county from each prefix.
    pub fn from_geoids<I, S>(geoids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut reference = Self::new();
        for geoid in geoids {
            reference.insert_geoid(geoid.into());
        }
        reference
    }

    /// File `geoid` under its own prefix-derived key.
    pub fn insert_geoid(&mut self, geoid: String) {
        let (region, county) = split_geoid(&geoid);
        self.insert(region, county, geoid);
    }

    /// File `geoid` under an explicit key.
    pub fn insert(&mut self, region: impl Into<String>, county: impl Into<String>, geoid: String) {
        self.index
            .entry((region.into(), county.into()))
            .or_default()
            .push(geoid);
        self.rows += 1;
    }

    /// GEOIDs for a key, in file order. Empty when the key is unknown.
    pub fn lookup(&self, region: &str, county: &str) -> &[String] {
        self.index
            .get(&(region.to_string(), county.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of GEOIDs loaded
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Number of distinct (region, county) keys
    pub fn key_count(&self) -> usize {
        self.index.len()
    }
}

/// Region code (chars 1-2) and county code (chars 3-5) of a GEOID.
///
/// Short identifiers yield short (possibly empty) codes rather than an error.
pub fn split_geoid(geoid: &str) -> (String, String) {
    let region: String = geoid.chars().take(2).collect();
    let county: String = geoid.chars().skip(2).take(3).collect();
    (region, county)
}

/// Parse the tab-separated body. The header row must contain `GEOID`.
pub fn parse_tsv<R: Read>(reader: R) -> Result<GeoReference, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| SourceError::malformed(SOURCE, e))?;
    // The published header carries trailing whitespace on its last column
    let geoid_idx = headers
        .iter()
        .position(|h| h.trim() == GEOID_COLUMN)
        .ok_or_else(|| SourceError::malformed(SOURCE, "no GEOID column"))?;

    let mut reference = GeoReference::new();
    for result in reader.records() {
        let record = result.map_err(|e| SourceError::malformed(SOURCE, e))?;
        match record.get(geoid_idx).map(str::trim) {
            Some(geoid) if !geoid.is_empty() => reference.insert_geoid(geoid.to_string()),
            _ => continue,
        }
    }

    Ok(reference)
}

/// Decompress the archive and parse its single data file.
pub fn parse_archive(bytes: &[u8]) -> Result<GeoReference, SourceError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| SourceError::malformed(SOURCE, e))?;

    let index = (0..archive.len())
        .find(|&i| archive.by_index(i).map(|f| !f.is_dir()).unwrap_or(false))
        .ok_or_else(|| SourceError::malformed(SOURCE, "archive contains no file"))?;

    let file = archive
        .by_index(index)
        .map_err(|e| SourceError::malformed(SOURCE, e))?;
    tracing::debug!(name = file.name(), size = file.size(), "parsing gazetteer member");

    parse_tsv(file)
}

/// Download and parse the gazetteer at `url`.
pub async fn load(http_client: &Client, url: &str) -> Result<GeoReference, SourceError> {
    tracing::info!(url, "fetching gazetteer");

    let response = http_client
        .get(url)
        .send()
        .await
        .map_err(|e| SourceError::unavailable(SOURCE, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::unavailable(SOURCE, format!("HTTP {status}")));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| SourceError::unavailable(SOURCE, e))?;
    tracing::info!(bytes = bytes.len(), "gazetteer downloaded");

    // Decompression and parsing of the ~1MB archive is CPU-bound
    let reference = tokio::task::spawn_blocking(move || parse_archive(&bytes))
        .await
        .map_err(|e| SourceError::malformed(SOURCE, e))??;

    tracing::info!(
        geoids = reference.len(),
        keys = reference.key_count(),
        "gazetteer indexed"
    );
    Ok(reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::io::Write;

    const SAMPLE: &str = "GEOID\tALAND\tAWATER\tALAND_SQMI\tAWATER_SQMI\tINTPTLAT\tINTPTLONG                                                                                                               \n\
        00601\t166847909\t799292\t64.42\t0.309\t18.180555\t-66.749961\n\
        00602\t79288158\t4446273\t30.613\t1.717\t18.36195\t-67.17613\n\
        06001\t1000\t0\t0.1\t0\t37.0\t-122.0\n\
        06001\t1001\t0\t0.1\t0\t37.0\t-122.0\n\
        90001\t9071359\t0\t3.502\t0\t33.972914\t-118.248716\n";

    fn zipped(name: &str, body: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(body.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_split_geoid() {
        assert_eq!(split_geoid("90001"), ("90".to_string(), "001".to_string()));
        assert_eq!(split_geoid("0600123"), ("06".to_string(), "001".to_string()));
        assert_eq!(split_geoid("7"), ("7".to_string(), String::new()));
    }

    #[test]
    fn test_parse_tsv_preserves_leading_zeros() {
        let reference = parse_tsv(SAMPLE.as_bytes()).unwrap();

        assert_eq!(reference.len(), 5);
        assert_eq!(reference.lookup("00", "601"), &["00601".to_string()]);
        assert_eq!(
            reference.lookup("06", "001"),
            &["06001".to_string(), "06001".to_string()]
        );
        assert!(reference.lookup("06", "999").is_empty());
    }

    #[test]
    fn test_parse_tsv_requires_geoid_column() {
        let err = parse_tsv("ZCTA\tALAND\n00601\t1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));
    }

    #[test]
    fn test_parse_archive() {
        let bytes = zipped("2019_Gaz_zcta_national.txt", SAMPLE);
        let reference = parse_archive(&bytes).unwrap();
        assert_eq!(reference.lookup("90", "001"), &["90001".to_string()]);
    }

    #[test]
    fn test_parse_archive_rejects_garbage() {
        let err = parse_archive(b"not a zip").unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));
    }

    #[test]
    fn test_explicit_insert() {
        let mut reference = GeoReference::new();
        reference.insert("06", "Los Angeles", "90001".to_string());
        assert_eq!(reference.lookup("06", "Los Angeles"), &["90001".to_string()]);
        assert_eq!(reference.key_count(), 1);
    }

    #[tokio::test]
    async fn test_load_downloads_and_indexes() {
        let server = MockServer::start_async().await;
        let archive = zipped("gaz.txt", SAMPLE);
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gaz.zip");
                then.status(200)
                    .header("content-type", "application/zip")
                    .body(archive);
            })
            .await;

        let reference = load(&Client::new(), &server.url("/gaz.zip")).await.unwrap();
        assert_eq!(reference.len(), 5);
    }

    #[tokio::test]
    async fn test_load_not_found_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gaz.zip");
                then.status(404);
            })
            .await;

        let err = load(&Client::new(), &server.url("/gaz.zip")).await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }
}
