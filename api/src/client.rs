use crate::wire::CurrentBracketResponse;
use chrono::{DateTime, Datelike, Utc};
use reqwest::Client;
use std::time::Duration;

pub use reqwest::StatusCode;

pub type ApiResult<T> = Result<T, ApiError>;

pub const DEFAULT_BASE_URL: &str = "https://api.ncaa.com/casablanca/march-madness";

/// Client for the authoritative tournament results feed.
#[derive(Debug, Clone)]
pub struct NcaaApi {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Network error for {1}: {0}")]
    Network(#[source] reqwest::Error, String),
    #[error("Upstream error {status} for {url}")]
    Upstream { status: StatusCode, url: String },
    #[error("Request rejected with {status} for {url}")]
    Rejected { status: StatusCode, url: String },
    #[error("Parse error for {1}: {0}")]
    Parsing(#[source] reqwest::Error, String),
}

impl ApiError {
    /// Network failures and 5xx responses are worth another attempt; a
    /// rejected request or an unreadable body will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(..) | ApiError::Upstream { .. } => true,
            ApiError::Rejected { status, .. } => *status == StatusCode::TOO_MANY_REQUESTS,
            ApiError::Parsing(..) => false,
        }
    }
}

impl NcaaApi {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .user_agent(concat!("mmscore/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the current state of the tournament: every game the feed knows
    /// about, finished or not.
    pub async fn fetch_current_bracket(&self) -> ApiResult<CurrentBracketResponse> {
        let url = format!("{}/brackets/current", self.base_url);
        self.get(&url).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ApiError::Network(e, url.to_owned()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(ApiError::Rejected {
                status,
                url: url.to_owned(),
            });
        }
        if !status.is_success() {
            return Err(ApiError::Upstream {
                status,
                url: url.to_owned(),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Parsing(e, url.to_owned()))
    }
}

/// Tournament year for the season containing `now`. The championship year
/// tracks the season, so Nov/Dec roll forward to the next calendar year.
pub fn season_tournament_year(now: DateTime<Utc>) -> u16 {
    let year = if now.month() >= 11 { now.year() + 1 } else { now.year() };
    u16::try_from(year).unwrap_or(u16::MAX)
}
