use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::scoring::{self, Scorecard};
use crate::state::synchronizer::MasterBracketSynchronizer;
use crate::store::BracketStore;
use log::{debug, info};
use ncaa_api::{PickStatus, ScoreRecord};
use serde::Serialize;
use std::cmp::Reverse;
use std::sync::Arc;

/// Most records returned by `get_leaderboard`.
pub const LEADERBOARD_LIMIT: usize = 100;

/// One line of a pick status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PickReport {
    pub game_id: String,
    pub status: PickStatus,
    /// `"<team> (<status>)"`, or `"No pick"`.
    pub pick: String,
    /// The master winner, or `"Not completed"`.
    pub actual: String,
}

pub struct LeaderboardAggregator {
    store: Arc<dyn BracketStore>,
    sync: Arc<MasterBracketSynchronizer>,
    metrics: Arc<Metrics>,
}

impl LeaderboardAggregator {
    pub fn new(
        store: Arc<dyn BracketStore>,
        sync: Arc<MasterBracketSynchronizer>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            sync,
            metrics,
        }
    }

    /// Score `bracket_id` against the current master bracket and persist the
    /// result. Pick statuses are written back to the user bracket.
    ///
    /// The two writes are not atomic. The score record goes first, so a
    /// failure leaves the bracket's statuses behind rather than ahead of it,
    /// and rescoring repairs either.
    pub async fn update_user_score(&self, bracket_id: &str, user_id: &str) -> Result<ScoreRecord> {
        let bracket = self
            .store
            .get_bracket(bracket_id)
            .await?
            .filter(|b| b.owner == user_id && !b.is_master)
            .ok_or_else(|| Error::NotFound(format!("bracket {bracket_id}")))?;

        let master = self.sync.get_master_bracket().await?;
        let Scorecard {
            record,
            pick_updates,
            ..
        } = scoring::score_bracket(&master, &bracket)?;

        let record = self.store.upsert_score(record).await?;
        self.store
            .update_pick_statuses(&bracket.id, &pick_updates, record.total_points)
            .await?;
        self.metrics.increment_score_update();

        info!(
            "scored bracket {} for {}: {} correct, {} points",
            record.bracket_id, record.user_id, record.total_correct, record.total_points
        );
        Ok(record)
    }

    /// Top records for `year` (the tournament year when `None`), ranked by
    /// points then correct picks.
    pub async fn get_leaderboard(&self, year: Option<u16>) -> Result<Vec<ScoreRecord>> {
        let year = year.unwrap_or(self.sync.config().year);
        let mut records = self.store.scores_for_year(year).await?;

        // sort_by_key is stable, so equal records keep store order
        records.sort_by_key(|r| (Reverse(r.total_points), Reverse(r.total_correct)));
        records.truncate(LEADERBOARD_LIMIT);
        for (position, record) in records.iter_mut().enumerate() {
            record.rank = Some(position as u32 + 1);
        }

        debug!("leaderboard for {year}: {} entries", records.len());
        Ok(records)
    }

    pub async fn get_pick_status(&self, bracket_id: &str) -> Result<Vec<PickReport>> {
        let bracket = self
            .store
            .get_bracket(bracket_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("bracket {bracket_id}")))?;
        let master = self.sync.get_master_bracket().await?;

        Ok(bracket
            .games
            .iter()
            .map(|game| {
                let master_game = master.find_game(&game.id);
                let status = scoring::pick_status(game, master_game);
                PickReport {
                    game_id: game.id.clone(),
                    status,
                    pick: match &game.user_pick {
                        Some(team) => format!("{team} ({})", status.as_str()),
                        None => "No pick".to_owned(),
                    },
                    actual: master_game
                        .filter(|g| g.is_completed())
                        .and_then(|g| g.winner_id.clone())
                        .unwrap_or_else(|| "Not completed".to_owned()),
                }
            })
            .collect())
    }

    /// Every record for `user_id`, newest tournament first.
    pub async fn user_scores(&self, user_id: &str) -> Result<Vec<ScoreRecord>> {
        let mut records = self.store.scores_for_user(user_id).await?;
        records.sort_by_key(|r| Reverse(r.year));
        Ok(records)
    }
}
