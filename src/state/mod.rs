pub mod app_settings;
pub mod cache;
pub mod messages;
pub mod normalize;
pub mod rate_limiter;
pub mod refresher;
pub mod retry;
pub mod synchronizer;
