use std::fmt;

/// What a single poll tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The rate limiter had no token; nothing was fetched.
    Skipped,
    Updated { games: usize, dropped: usize },
    /// Every attempt failed. The cached bracket was left alone.
    Failed { message: String },
}

impl PollOutcome {
    pub fn is_update(&self) -> bool {
        matches!(self, PollOutcome::Updated { .. })
    }
}

impl fmt::Display for PollOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollOutcome::Skipped => write!(f, "skipped (rate limited)"),
            PollOutcome::Updated { games, dropped: 0 } => write!(f, "updated {games} games"),
            PollOutcome::Updated { games, dropped } => {
                write!(f, "updated {games} games, dropped {dropped} malformed records")
            }
            PollOutcome::Failed { message } => write!(f, "failed: {message}"),
        }
    }
}
