use crate::source::BracketSource;
use async_trait::async_trait;
use ncaa_api::client::{ApiError, StatusCode};
use ncaa_api::wire::CurrentBracketResponse;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Step {
    Games(Vec<Value>),
    Unavailable,
    Rejected,
}

/// Upstream feed that plays back a script, then repeats `fallback`.
#[derive(Debug)]
pub struct FakeSource {
    script: Mutex<VecDeque<Step>>,
    fallback: Mutex<Step>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
    inflight: AtomicUsize,
    max_inflight: AtomicUsize,
}

impl FakeSource {
    pub fn new(fallback: Step) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
            inflight: AtomicUsize::new(0),
            max_inflight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(delay);
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn then(self, step: Step) -> Self {
        self.script.lock().push_back(step);
        self
    }

    pub fn set_fallback(&self, step: Step) {
        *self.fallback.lock() = step;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_inflight(&self) -> usize {
        self.max_inflight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BracketSource for FakeSource {
    async fn fetch_current_bracket(&self) -> Result<CurrentBracketResponse, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inflight.fetch_max(now, Ordering::SeqCst);
        let _inflight = InflightGuard(&self.inflight);

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().clone());

        match step {
            Step::Games(games) => Ok(CurrentBracketResponse {
                year: Some(2026),
                games,
            }),
            Step::Unavailable => Err(ApiError::Upstream {
                status: StatusCode::SERVICE_UNAVAILABLE,
                url: "fake://brackets/current".into(),
            }),
            Step::Rejected => Err(ApiError::Rejected {
                status: StatusCode::BAD_REQUEST,
                url: "fake://brackets/current".into(),
            }),
        }
    }
}

// Decrements on drop so calls abandoned by a timeout or shutdown still count
// as finished.
struct InflightGuard<'a>(&'a AtomicUsize);

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Upstream record for a finished game won by `winner`.
pub fn final_record(id: &str, round: u32, winner: &str, loser: &str) -> Value {
    json!({
        "id": id,
        "team1": { "id": winner, "score": 70 },
        "team2": { "id": loser, "score": 60 },
        "status": "completed",
        "round": round,
        "region": "East",
        "winnerId": winner
    })
}

pub fn scheduled_record(id: &str, round: u32, a: &str, b: &str) -> Value {
    json!({
        "id": id,
        "team1": { "id": a },
        "team2": { "id": b },
        "status": "not started",
        "round": round,
        "region": "East"
    })
}
