use async_trait::async_trait;
use ncaa_api::client::{ApiError, NcaaApi};
use ncaa_api::wire::CurrentBracketResponse;

/// Where authoritative results come from.
#[async_trait]
pub trait BracketSource: Send + Sync {
    async fn fetch_current_bracket(&self) -> Result<CurrentBracketResponse, ApiError>;
}

#[async_trait]
impl BracketSource for NcaaApi {
    async fn fetch_current_bracket(&self) -> Result<CurrentBracketResponse, ApiError> {
        NcaaApi::fetch_current_bracket(self).await
    }
}
