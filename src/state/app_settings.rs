use crate::state::rate_limiter::RateLimiter;
use crate::state::refresher::{PeakHours, PollSchedule};
use crate::state::retry::RetryPolicy;
use crate::state::synchronizer::SyncConfig;
use chrono::Utc;
use ncaa_api::client::{DEFAULT_BASE_URL, season_tournament_year};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_PREFIX: &str = "MMSCORE_";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(String),
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid { key: String, value: String, reason: String },
}

/// Runtime configuration, read from `MMSCORE_*` environment variables.
#[derive(Clone, PartialEq, Eq)]
pub struct AppSettings {
    pub source_url: String,
    pub api_key: String,
    pub poll_interval: Duration,
    pub peak_hours: PeakHours,
    pub off_peak_multiplier: u32,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub rate_limit: u32,
    pub rate_limit_interval: Duration,
    pub cache_ttl: Duration,
    pub fetch_timeout: Duration,
    pub tournament_year: u16,
}

// Keeps the credential out of logs.
impl std::fmt::Debug for AppSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSettings")
            .field("source_url", &self.source_url)
            .field("api_key", &"<redacted>")
            .field("poll_interval", &self.poll_interval)
            .field("peak_hours", &self.peak_hours)
            .field("off_peak_multiplier", &self.off_peak_multiplier)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("rate_limit", &self.rate_limit)
            .field("rate_limit_interval", &self.rate_limit_interval)
            .field("cache_ttl", &self.cache_ttl)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("tournament_year", &self.tournament_year)
            .finish()
    }
}

impl AppSettings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; `load` passes the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars { lookup };

        let api_key = vars
            .get("API_KEY")
            .ok_or_else(|| ConfigError::Missing(format!("{ENV_PREFIX}API_KEY")))?;
        let source_url = vars.get("SOURCE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        if !(source_url.starts_with("http://") || source_url.starts_with("https://")) {
            return Err(vars.invalid("SOURCE_URL", &source_url, "expected an http(s) URL"));
        }

        let peak_hours = match vars.get("PEAK_HOURS") {
            Some(raw) => parse_peak_hours(&raw)
                .map_err(|reason| vars.invalid("PEAK_HOURS", &raw, reason))?,
            None => PeakHours::default(),
        };

        Ok(Self {
            source_url,
            api_key,
            poll_interval: Duration::from_millis(vars.positive("POLL_INTERVAL_MS", 60_000)?),
            peak_hours,
            off_peak_multiplier: vars.positive("OFF_PEAK_MULTIPLIER", 6)?,
            max_attempts: vars.positive("MAX_ATTEMPTS", 3)?,
            retry_base_delay: Duration::from_millis(vars.parse("RETRY_BASE_MS", 1_000)?),
            rate_limit: vars.positive("RATE_LIMIT", 30)?,
            rate_limit_interval: Duration::from_secs(
                vars.positive("RATE_LIMIT_INTERVAL_SECS", 60)?,
            ),
            cache_ttl: Duration::from_secs(vars.positive("CACHE_TTL_SECS", 300)?),
            fetch_timeout: Duration::from_millis(vars.positive("FETCH_TIMEOUT_MS", 10_000)?),
            tournament_year: vars.parse("TOURNAMENT_YEAR", season_tournament_year(Utc::now()))?,
        })
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            year: self.tournament_year,
            cache_ttl: self.cache_ttl,
            fetch_timeout: self.fetch_timeout,
            retry: RetryPolicy::new(self.max_attempts, self.retry_base_delay),
        }
    }

    pub fn poll_schedule(&self) -> PollSchedule {
        PollSchedule {
            peak_interval: self.poll_interval,
            peak_hours: self.peak_hours,
            off_peak_multiplier: self.off_peak_multiplier,
        }
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.rate_limit, self.rate_limit_interval)
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(&format!("{ENV_PREFIX}{key}"))
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw.parse().map_err(|e: T::Err| self.invalid(key, &raw, e.to_string())),
            None => Ok(default),
        }
    }

    fn positive<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default + Copy,
        T::Err: std::fmt::Display,
    {
        let value = self.parse(key, default)?;
        if value > T::default() {
            Ok(value)
        } else {
            Err(self.invalid(key, &self.get(key).unwrap_or_default(), "must be greater than zero"))
        }
    }

    fn invalid(&self, key: &str, value: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::Invalid {
            key: format!("{ENV_PREFIX}{key}"),
            value: value.to_owned(),
            reason: reason.into(),
        }
    }
}

/// "12-23" style inclusive hour range.
fn parse_peak_hours(raw: &str) -> Result<PeakHours, &'static str> {
    let (start, end) = raw.split_once('-').ok_or("expected START-END")?;
    let hour = |s: &str| {
        s.trim()
            .parse::<u32>()
            .ok()
            .filter(|h| *h < 24)
            .ok_or("hours must be 0-23")
    };
    Ok(PeakHours {
        start: hour(start)?,
        end: hour(end)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<AppSettings, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), v.to_string()))
            .collect();
        AppSettings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_credential_is_set() {
        let s = settings(&[("API_KEY", "secret")]).unwrap();
        assert_eq!(s.source_url, DEFAULT_BASE_URL);
        assert_eq!(s.poll_interval, Duration::from_secs(60));
        assert_eq!(s.peak_hours, PeakHours { start: 12, end: 23 });
        assert_eq!(s.off_peak_multiplier, 6);
        assert_eq!(s.max_attempts, 3);
        assert_eq!(s.retry_base_delay, Duration::from_secs(1));
        assert_eq!(s.rate_limit, 30);
        assert_eq!(s.cache_ttl, Duration::from_secs(300));
        assert_eq!(s.fetch_timeout, Duration::from_secs(10));
    }

    #[test]
    fn credential_is_required() {
        assert_eq!(settings(&[]).unwrap_err(), ConfigError::Missing("MMSCORE_API_KEY".into()));
        assert!(settings(&[("API_KEY", "   ")]).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let s = settings(&[
            ("API_KEY", "k"),
            ("SOURCE_URL", "http://localhost:9000"),
            ("POLL_INTERVAL_MS", "15000"),
            ("PEAK_HOURS", "18-2"),
            ("MAX_ATTEMPTS", "5"),
            ("CACHE_TTL_SECS", "30"),
            ("TOURNAMENT_YEAR", "2027"),
        ])
        .unwrap();
        assert_eq!(s.poll_interval, Duration::from_secs(15));
        assert_eq!(s.peak_hours, PeakHours { start: 18, end: 2 });
        assert_eq!(s.sync_config().retry.max_attempts(), 5);
        assert_eq!(s.sync_config().year, 2027);
        assert_eq!(s.poll_schedule().interval_for_hour(12), Duration::from_secs(90));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = settings(&[("API_KEY", "k"), ("POLL_INTERVAL_MS", "soon")]).unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { ref key, .. } if key == "MMSCORE_POLL_INTERVAL_MS")
        );

        assert!(settings(&[("API_KEY", "k"), ("RATE_LIMIT", "0")]).is_err());
        assert!(settings(&[("API_KEY", "k"), ("PEAK_HOURS", "12-24")]).is_err());
        assert!(settings(&[("API_KEY", "k"), ("PEAK_HOURS", "noon")]).is_err());
        assert!(settings(&[("API_KEY", "k"), ("SOURCE_URL", "ftp://feed")]).is_err());
    }

    #[test]
    fn debug_output_redacts_credential() {
        let s = settings(&[("API_KEY", "hunter2")]).unwrap();
        assert!(!format!("{s:?}").contains("hunter2"));
    }
}
