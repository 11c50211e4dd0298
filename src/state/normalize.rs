use chrono::Utc;
use ncaa_api::wire::{CurrentBracketResponse, WireGame, WireTeam};
use ncaa_api::{Bracket, Game, GameStatus, RoundKind};
use std::collections::HashSet;
use std::fmt;

/// An upstream game record that could not be mapped onto a `Game`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    pub index: usize,
    pub game_id: Option<String>,
    pub reason: MalformedReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    Shape(String),
    MissingId,
    MissingTeam,
    InvalidStatus(Option<String>),
    InvalidRound(Option<u32>),
    MissingWinner,
    /// A record with the same id appeared earlier in the payload.
    DuplicateId,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedReason::Shape(e) => write!(f, "unexpected shape: {e}"),
            MalformedReason::MissingId => write!(f, "missing game id"),
            MalformedReason::MissingTeam => write!(f, "missing team identifier"),
            MalformedReason::InvalidStatus(s) => write!(f, "invalid status {s:?}"),
            MalformedReason::InvalidRound(r) => write!(f, "invalid round {r:?}"),
            MalformedReason::MissingWinner => write!(f, "completed without a winner"),
            MalformedReason::DuplicateId => write!(f, "duplicate game id"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub bracket: Bracket,
    pub dropped: Vec<MalformedRecord>,
}

/// Map the feed's payload onto a master bracket. Bad records are set aside
/// individually; the rest of the payload still goes through.
pub fn normalize_bracket(raw: CurrentBracketResponse, default_year: u16) -> Normalized {
    let year = raw.year.unwrap_or(default_year);
    let mut games = Vec::with_capacity(raw.games.len());
    let mut dropped = Vec::new();
    let mut seen = HashSet::new();

    for (index, value) in raw.games.into_iter().enumerate() {
        let wire: WireGame = match serde_json::from_value(value) {
            Ok(w) => w,
            Err(e) => {
                dropped.push(MalformedRecord {
                    index,
                    game_id: None,
                    reason: MalformedReason::Shape(e.to_string()),
                });
                continue;
            }
        };
        let game_id = wire.id.clone();
        // First record for an id wins; later copies are dropped.
        match map_game(wire) {
            Ok(game) if !seen.insert(game.id.clone()) => dropped.push(MalformedRecord {
                index,
                game_id,
                reason: MalformedReason::DuplicateId,
            }),
            Ok(game) => games.push(game),
            Err(reason) => dropped.push(MalformedRecord {
                index,
                game_id,
                reason,
            }),
        }
    }

    Normalized {
        bracket: Bracket::master(year, games),
        dropped,
    }
}

fn map_game(wire: WireGame) -> Result<Game, MalformedReason> {
    let id = wire
        .id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(MalformedReason::MissingId)?
        .to_owned();

    let team_a = wire
        .team1
        .as_ref()
        .and_then(WireTeam::identifier)
        .ok_or(MalformedReason::MissingTeam)?;
    let team_b = wire
        .team2
        .as_ref()
        .and_then(WireTeam::identifier)
        .ok_or(MalformedReason::MissingTeam)?;

    let status = wire
        .status
        .as_deref()
        .and_then(parse_status)
        .ok_or_else(|| MalformedReason::InvalidStatus(wire.status.clone()))?;

    let round = wire
        .round
        .and_then(RoundKind::from_number)
        .ok_or(MalformedReason::InvalidRound(wire.round))?;

    // The winner is only meaningful once the game is over.
    let winner_id = if status == GameStatus::Completed {
        let winner = wire
            .winner_id
            .as_deref()
            .or_else(|| wire.winner.as_ref().and_then(WireTeam::identifier))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(MalformedReason::MissingWinner)?;
        Some(winner.to_owned())
    } else {
        None
    };

    let start_time = wire
        .start_time
        .as_deref()
        .and_then(|d| chrono::DateTime::parse_from_rfc3339(d).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(Game {
        id,
        team_a: team_a.to_owned(),
        team_b: team_b.to_owned(),
        score_a: wire.team1.as_ref().and_then(|t| t.score).unwrap_or(0),
        score_b: wire.team2.as_ref().and_then(|t| t.score).unwrap_or(0),
        status,
        round,
        region: wire.region.unwrap_or_default(),
        winner_id,
        start_time,
        user_pick: None,
        pick_status: Default::default(),
    })
}

fn parse_status(s: &str) -> Option<GameStatus> {
    match s.trim().to_ascii_lowercase().replace(['_', '-'], " ").as_str() {
        "not started" | "scheduled" | "pre" => Some(GameStatus::NotStarted),
        "in progress" | "live" | "halftime" => Some(GameStatus::InProgress),
        "completed" | "final" => Some(GameStatus::Completed),
        _ => None,
    }
}
