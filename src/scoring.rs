//! Reconciles a user bracket against the master bracket.
//!
//! Only master games that are completed count. A game the master has not
//! finished (or does not know about) adds to neither the correct count nor
//! the number of decided picks, so a half-played tournament yields a partial
//! score rather than a penalized one.

use crate::error::ScoringError;
use ncaa_api::{Bracket, Game, PickStatus, RoundKind, RoundScore, ScoreRecord};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// New pick status for one game of a user bracket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickUpdate {
    pub game_id: String,
    pub status: PickStatus,
}

/// Result of scoring one user bracket. Nothing here has been persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scorecard {
    pub record: ScoreRecord,
    /// Picks per round that had a completed master game behind them.
    pub decided: [u32; 6],
    pub pick_updates: Vec<PickUpdate>,
}

pub fn score_bracket(master: &Bracket, user: &Bracket) -> Result<Scorecard, ScoringError> {
    check_preconditions(master, user)?;

    let completed: HashMap<&str, &Game> = master
        .games
        .iter()
        .filter(|g| g.is_completed())
        .map(|g| (g.id.as_str(), g))
        .collect();

    let mut decided = [0u32; 6];
    let mut round_scores = Vec::with_capacity(RoundKind::ALL.len());
    for round in RoundKind::ALL {
        let mut correct = 0;
        for user_game in user.games_in_round(round) {
            let Some(master_game) = completed.get(user_game.id.as_str()) else {
                continue;
            };
            if master_game.round != round {
                continue;
            }
            decided[usize::from(round.number() - 1)] += 1;
            if is_correct(user_game, master_game) {
                correct += 1;
            }
        }
        round_scores.push(RoundScore {
            round,
            correct,
            points: correct * round.points(),
        });
    }

    let pick_updates = user
        .games
        .iter()
        .map(|g| PickUpdate {
            game_id: g.id.clone(),
            status: pick_status(g, completed.get(g.id.as_str()).copied()),
        })
        .collect();

    Ok(Scorecard {
        record: ScoreRecord {
            user_id: user.owner.clone(),
            bracket_id: user.id.clone(),
            year: user.year,
            total_correct: round_scores.iter().map(|r| r.correct).sum(),
            total_points: round_scores.iter().map(|r| r.points).sum(),
            round_scores,
            rank: None,
        },
        decided,
        pick_updates,
    })
}

/// Status of a single pick against the master's version of the game.
pub fn pick_status(user_game: &Game, master_game: Option<&Game>) -> PickStatus {
    match master_game {
        Some(m) if m.is_completed() && m.round == user_game.round => {
            if is_correct(user_game, m) { PickStatus::Correct } else { PickStatus::Incorrect }
        }
        _ => PickStatus::Pending,
    }
}

// The user's own copy of winner_id is never consulted: it may be stale.
fn is_correct(user_game: &Game, master_game: &Game) -> bool {
    matches!(
        (user_game.user_pick.as_deref(), master_game.winner_id.as_deref()),
        (Some(pick), Some(winner)) if pick == winner
    )
}

fn check_preconditions(master: &Bracket, user: &Bracket) -> Result<(), ScoringError> {
    if !master.is_master {
        return Err(ScoringError::NotMaster(master.id.clone()));
    }
    if master.year != user.year {
        return Err(ScoringError::YearMismatch {
            master: master.year,
            user: user.year,
        });
    }
    let mut seen = HashSet::with_capacity(user.games.len());
    for (index, game) in user.games.iter().enumerate() {
        if game.id.trim().is_empty() {
            return Err(ScoringError::EmptyGameId {
                bracket_id: user.id.clone(),
                index,
            });
        }
        if !seen.insert(game.id.as_str()) {
            return Err(ScoringError::DuplicateGame {
                bracket_id: user.id.clone(),
                game_id: game.id.clone(),
            });
        }
    }
    Ok(())
}
