use crate::error::StoreError;
use crate::scoring::PickUpdate;
use async_trait::async_trait;
use ncaa_api::{Bracket, ScoreRecord};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Durable storage for brackets and score records.
#[async_trait]
pub trait BracketStore: Send + Sync {
    async fn get_bracket(&self, id: &str) -> Result<Option<Bracket>, StoreError>;

    /// Insert or replace a user bracket; assigns an id when it has none.
    async fn save_bracket(&self, bracket: Bracket) -> Result<Bracket, StoreError>;

    async fn master_bracket(&self, year: u16) -> Result<Option<Bracket>, StoreError>;

    /// Replace the games of the year's master bracket wholesale, creating it
    /// on first use. The bracket keeps its id across updates.
    async fn save_master_bracket(&self, bracket: Bracket) -> Result<Bracket, StoreError>;

    async fn update_pick_statuses(
        &self,
        bracket_id: &str,
        updates: &[PickUpdate],
        total_points: u32,
    ) -> Result<(), StoreError>;

    /// Insert or replace the record keyed by (bracket_id, user_id).
    async fn upsert_score(&self, record: ScoreRecord) -> Result<ScoreRecord, StoreError>;

    async fn scores_for_year(&self, year: u16) -> Result<Vec<ScoreRecord>, StoreError>;

    async fn scores_for_user(&self, user_id: &str) -> Result<Vec<ScoreRecord>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    brackets: RwLock<BTreeMap<String, Bracket>>,
    scores: RwLock<BTreeMap<(String, String), ScoreRecord>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn master_id(year: u16) -> String {
        format!("master-{year}")
    }
}

#[async_trait]
impl BracketStore for MemoryStore {
    async fn get_bracket(&self, id: &str) -> Result<Option<Bracket>, StoreError> {
        Ok(self.brackets.read().await.get(id).cloned())
    }

    async fn save_bracket(&self, mut bracket: Bracket) -> Result<Bracket, StoreError> {
        if bracket.id.is_empty() {
            let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            bracket.id = format!("bracket-{n}");
        }
        self.brackets.write().await.insert(bracket.id.clone(), bracket.clone());
        Ok(bracket)
    }

    async fn master_bracket(&self, year: u16) -> Result<Option<Bracket>, StoreError> {
        Ok(self.brackets.read().await.get(&Self::master_id(year)).cloned())
    }

    async fn save_master_bracket(&self, bracket: Bracket) -> Result<Bracket, StoreError> {
        let id = Self::master_id(bracket.year);
        let mut brackets = self.brackets.write().await;
        let master = brackets.entry(id.clone()).or_insert_with(|| Bracket {
            id,
            ..Bracket::master(bracket.year, Vec::new())
        });
        master.games = bracket.games;
        Ok(master.clone())
    }

    async fn update_pick_statuses(
        &self,
        bracket_id: &str,
        updates: &[PickUpdate],
        total_points: u32,
    ) -> Result<(), StoreError> {
        let mut brackets = self.brackets.write().await;
        let bracket = brackets.get_mut(bracket_id).ok_or_else(|| StoreError::Missing {
            kind: "bracket",
            id: bracket_id.to_owned(),
        })?;
        for update in updates {
            if let Some(game) = bracket.find_game_mut(&update.game_id) {
                game.pick_status = update.status;
            }
        }
        bracket.total_points = total_points;
        Ok(())
    }

    async fn upsert_score(&self, record: ScoreRecord) -> Result<ScoreRecord, StoreError> {
        let key = (record.bracket_id.clone(), record.user_id.clone());
        let stored = ScoreRecord {
            rank: None,
            ..record
        };
        self.scores.write().await.insert(key, stored.clone());
        Ok(stored)
    }

    async fn scores_for_year(&self, year: u16) -> Result<Vec<ScoreRecord>, StoreError> {
        Ok(self
            .scores
            .read()
            .await
            .values()
            .filter(|r| r.year == year)
            .cloned()
            .collect())
    }

    async fn scores_for_user(&self, user_id: &str) -> Result<Vec<ScoreRecord>, StoreError> {
        Ok(self
            .scores
            .read()
            .await
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }
}
