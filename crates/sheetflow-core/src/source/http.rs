//! Spreadsheet client over the CSV export endpoint

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::secrets::{SecretProvider, GOOGLE_ACCESS_TOKEN};

use super::{FetchError, Locator, SheetClient, SheetRecord};

pub const DEFAULT_BASE_URL: &str = "https://docs.google.com";

#[derive(Debug, Clone)]
pub struct HttpSheetClient {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl HttpSheetClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sheetflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: None,
        })
    }

    /// Client that authenticates with `google-access-token` when that secret exists
    pub fn from_secrets(
        base_url: impl Into<String>,
        secrets: &dyn SecretProvider,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Self::new(base_url, timeout)?;
        Ok(match secrets.get_optional(GOOGLE_ACCESS_TOKEN)? {
            Some(token) => client.with_access_token(token),
            None => client,
        })
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn export_url(&self, locator: &Locator) -> String {
        let mut url = format!(
            "{}/spreadsheets/d/{}/export?format=csv",
            self.base_url,
            locator.spreadsheet_id()
        );
        if let Some(gid) = locator.gid() {
            url.push_str(&format!("&gid={}", gid));
        }
        url
    }
}

#[async_trait]
impl SheetClient for HttpSheetClient {
    async fn fetch_rows(&self, locator: &Locator) -> std::result::Result<Vec<SheetRecord>, FetchError> {
        let url = self.export_url(locator);
        debug!(url = %url, "Fetching sheet export");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_request_error)?;
        let status = response.status();
        if !status.is_success() {
            let message = format!("HTTP {} from {}", status, url);
            return Err(if is_transient_status(status) {
                FetchError::Transient(message)
            } else {
                FetchError::Permanent(message)
            });
        }

        let body = response.bytes().await.map_err(classify_request_error)?;
        parse_csv(&body)
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

fn classify_request_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        FetchError::Transient(err.to_string())
    } else {
        FetchError::Permanent(err.to_string())
    }
}

/// First record is the header row; short rows are padded with empty cells
pub fn parse_csv(body: &[u8]) -> std::result::Result<Vec<SheetRecord>, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(body);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| FetchError::Permanent(format!("unreadable CSV header: {}", e)))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut records = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| FetchError::Permanent(format!("unreadable CSV row {}: {}", index + 1, e)))?;
        let fields = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (header.clone(), record.get(i).unwrap_or_default().to_string()))
            .collect();
        records.push(SheetRecord { fields });
    }

    Ok(records)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_export_url_includes_gid() {
        let client = HttpSheetClient::new("https://sheets.example.com/", Duration::from_secs(5)).unwrap();
        let locator = Locator::parse("1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms#gid=9").unwrap();
        assert_eq!(
            client.export_url(&locator),
            "https://sheets.example.com/spreadsheets/d/1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms/export?format=csv&gid=9"
        );
    }

    #[test]
    fn test_token_taken_from_secrets() {
        let secrets = crate::secrets::StaticSecretProvider::new([(GOOGLE_ACCESS_TOKEN, "tok")]);
        let client = HttpSheetClient::from_secrets(DEFAULT_BASE_URL, &secrets, Duration::from_secs(5)).unwrap();
        assert_eq!(client.access_token.as_deref(), Some("tok"));

        let empty = crate::secrets::StaticSecretProvider::default();
        let client = HttpSheetClient::from_secrets(DEFAULT_BASE_URL, &empty, Duration::from_secs(5)).unwrap();
        assert!(client.access_token.is_none());
    }

    #[test]
    fn test_parse_csv_pads_short_rows() {
        let records = parse_csv(b"id,name\n1,Chai\n2\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("name"), Some(""));
        assert_eq!(records[0].headers().collect::<Vec<_>>(), vec!["id", "name"]);
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::FORBIDDEN));
    }
}
