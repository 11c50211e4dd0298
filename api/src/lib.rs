pub mod client;
pub mod wire;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Owner recorded on the authoritative bracket.
pub const SYSTEM_OWNER: &str = "system";

// ---------------------------------------------------------------------------
// Domain types: clean model, independent of the upstream wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    pub id: String,
    pub owner: String, // user id, or SYSTEM_OWNER for the master bracket
    pub name: String,
    pub year: u16,
    pub games: Vec<Game>,
    pub is_master: bool,
    /// Derived from the last scoring pass; never authoritative.
    #[serde(default)]
    pub total_points: u32,
}

impl Bracket {
    /// A master bracket for `year`. The id is assigned by the store.
    pub fn master(year: u16, games: Vec<Game>) -> Self {
        Self {
            id: String::new(),
            owner: SYSTEM_OWNER.into(),
            name: "Official Tournament Results".into(),
            year,
            games,
            is_master: true,
            total_points: 0,
        }
    }

    pub fn find_game(&self, game_id: &str) -> Option<&Game> {
        self.games.iter().find(|g| g.id == game_id)
    }

    pub fn find_game_mut(&mut self, game_id: &str) -> Option<&mut Game> {
        self.games.iter_mut().find(|g| g.id == game_id)
    }

    pub fn games_in_round(&self, round: RoundKind) -> impl Iterator<Item = &Game> {
        self.games.iter().filter(move |g| g.round == round)
    }
}

/// One of the six elimination rounds. Ordered from earliest to latest and
/// serialized as its round number.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum RoundKind {
    #[default]
    First,        // Round of 64
    Second,       // Round of 32
    Sweet16,
    Elite8,
    FinalFour,    // National semifinals
    Championship,
}

impl RoundKind {
    pub const ALL: [RoundKind; 6] = [
        RoundKind::First,
        RoundKind::Second,
        RoundKind::Sweet16,
        RoundKind::Elite8,
        RoundKind::FinalFour,
        RoundKind::Championship,
    ];

    pub fn number(self) -> u8 {
        match self {
            RoundKind::First => 1,
            RoundKind::Second => 2,
            RoundKind::Sweet16 => 3,
            RoundKind::Elite8 => 4,
            RoundKind::FinalFour => 5,
            RoundKind::Championship => 6,
        }
    }

    pub fn from_number(number: u32) -> Option<Self> {
        match number {
            1 => Some(RoundKind::First),
            2 => Some(RoundKind::Second),
            3 => Some(RoundKind::Sweet16),
            4 => Some(RoundKind::Elite8),
            5 => Some(RoundKind::FinalFour),
            6 => Some(RoundKind::Championship),
            _ => None,
        }
    }

    /// Scoring weight; each round doubles the one before it.
    pub fn points(self) -> u32 {
        1u32 << (self.number() - 1)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RoundKind::First => "1st Round",
            RoundKind::Second => "2nd Round",
            RoundKind::Sweet16 => "Sweet 16",
            RoundKind::Elite8 => "Elite Eight",
            RoundKind::FinalFour => "Final Four",
            RoundKind::Championship => "Championship",
        }
    }

    pub fn prev(self) -> Option<Self> {
        Self::from_number(u32::from(self.number()) - 1)
    }

    pub fn next(self) -> Option<Self> {
        Self::from_number(u32::from(self.number()) + 1)
    }
}

impl TryFrom<u8> for RoundKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_number(u32::from(value)).ok_or_else(|| format!("round {value} is outside 1..=6"))
    }
}

impl From<RoundKind> for u8 {
    fn from(round: RoundKind) -> Self {
        round.number()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub team_a: String,
    pub team_b: String,
    pub score_a: u32,
    pub score_b: u32,
    pub status: GameStatus,
    pub round: RoundKind,
    pub region: String,
    /// Present iff `status` is `Completed`.
    pub winner_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    /// User brackets only: the predicted winner.
    #[serde(default)]
    pub user_pick: Option<String>,
    #[serde(default)]
    pub pick_status: PickStatus,
}

impl Game {
    pub fn is_completed(&self) -> bool {
        self.status == GameStatus::Completed
    }

    pub fn is_live(&self) -> bool {
        self.status == GameStatus::InProgress
    }

    /// Whether the winner/status invariant holds.
    pub fn is_consistent(&self) -> bool {
        self.is_completed() == self.winner_id.is_some()
    }

    /// "72-65" style final score.
    pub fn final_score(&self) -> String {
        format!("{}-{}", self.score_a, self.score_b)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickStatus {
    Correct,
    Incorrect,
    #[default]
    Pending,
}

impl PickStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickStatus::Correct => "correct",
            PickStatus::Incorrect => "incorrect",
            PickStatus::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub user_id: String,
    pub bracket_id: String,
    pub year: u16,
    pub total_correct: u32,
    pub total_points: u32,
    pub round_scores: Vec<RoundScore>,
    /// Position on the leaderboard, filled in at query time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundScore {
    pub round: RoundKind,
    pub correct: u32,
    pub points: u32,
}
