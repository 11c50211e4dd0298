pub mod error;
pub mod leaderboard;
pub mod metrics;
pub mod scoring;
pub mod source;
pub mod state;
pub mod store;

#[cfg(test)]
mod test_support;
