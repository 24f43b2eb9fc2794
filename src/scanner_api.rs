//! Scanner REST endpoint: page type, fetch trait and the blocking reqwest client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::profile::QueryProfile;
use crate::row::ScannerRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerPage {
    pub page_index: u32,
    pub pairs: Vec<ScannerRow>,
    pub total_rows: u64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid scanner url: {0}")]
    InvalidUrl(String),
    #[error("HTTP client build error: {0}")]
    HttpClientBuild(String),
    #[error("HTTP request failed for {url}: {message}")]
    HttpRequest { url: String, message: String },
    #[error("unauthorized scanner request: {url}")]
    Unauthorized { url: String },
    #[error("failed to decode scanner page from {url}: {message}")]
    Decode { url: String, message: String },
}

pub trait ScannerApi: Send + Sync + 'static {
    fn fetch_page(&self, profile: &QueryProfile, page: u32) -> Result<ScannerPage, FetchError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScannerResponse {
    #[serde(default)]
    pairs: Vec<ScannerRow>,
    #[serde(default)]
    total_rows: u64,
}

pub fn scanner_url(base_url: &str, profile: &QueryProfile, page: u32) -> Result<Url, FetchError> {
    let endpoint = format!("{}/scanner", base_url.trim_end_matches('/'));
    Url::parse_with_params(&endpoint, profile.query_pairs(page))
        .map_err(|err| FetchError::InvalidUrl(format!("{endpoint}: {err}")))
}

pub fn decode_scanner_page(url: &str, page: u32, body: &[u8]) -> Result<ScannerPage, FetchError> {
    let response: ScannerResponse =
        serde_json::from_slice(body).map_err(|err| FetchError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        })?;

    Ok(ScannerPage {
        page_index: page,
        pairs: response.pairs,
        total_rows: response.total_rows,
    })
}

pub struct ReqwestScannerApi {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl ReqwestScannerApi {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| FetchError::HttpClientBuild(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl ScannerApi for ReqwestScannerApi {
    fn fetch_page(&self, profile: &QueryProfile, page: u32) -> Result<ScannerPage, FetchError> {
        let url = scanner_url(&self.base_url, profile, page)?;
        let url_text = url.to_string();
        debug!(
            component = "scanner_api",
            event = "scanner.fetch.start",
            profile = profile.kind.as_str(),
            page,
            url = %url_text
        );

        let response = self
            .client
            .get(url)
            .header("Content-Type", "application/json")
            .send()
            .map_err(|err| FetchError::HttpRequest {
                url: url_text.clone(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            error!(
                component = "scanner_api",
                event = "scanner.fetch.unauthorized",
                profile = profile.kind.as_str(),
                page
            );
            return Err(FetchError::Unauthorized { url: url_text });
        }
        if !status.is_success() {
            return Err(FetchError::HttpRequest {
                url: url_text,
                message: format!("unexpected HTTP status {status}"),
            });
        }

        let body = response.bytes().map_err(|err| FetchError::HttpRequest {
            url: url_text.clone(),
            message: err.to_string(),
        })?;

        decode_scanner_page(&url_text, page, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_profile_query_and_page() {
        let url = scanner_url(
            "https://api.example.com/",
            &QueryProfile::new_pairs(),
            2,
        )
        .unwrap();

        assert_eq!(url.path(), "/scanner");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("rankBy".to_string(), "age".to_string())));
        assert!(query.contains(&("page".to_string(), "2".to_string())));
    }

    #[test]
    fn decodes_pairs_and_total_rows() {
        let body = br#"{"pairs":[{"pairAddress":"A","volume":"10"},{"pairAddress":"B"}],"totalRows":120}"#;
        let page = decode_scanner_page("u", 1, body).unwrap();

        assert_eq!(page.page_index, 1);
        assert_eq!(page.total_rows, 120);
        assert_eq!(page.pairs.len(), 2);
        assert_eq!(page.pairs[0].volume, "10");
    }

    #[test]
    fn decode_failure_is_typed() {
        let err = decode_scanner_page("u", 1, b"<html>").unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }
}
