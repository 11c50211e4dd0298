/// Wire types for the authoritative bracket feed.
/// Endpoint: {base_url}/brackets/current
///
/// Game records are kept as raw JSON values so that one malformed record can
/// be rejected on its own during normalization instead of failing the whole
/// payload at deserialization time.
use serde::Deserialize;

#[derive(Deserialize, Default, Debug, Clone)]
pub struct CurrentBracketResponse {
    pub year: Option<u16>,
    #[serde(default)]
    pub games: Vec<serde_json::Value>,
}

#[derive(Deserialize, Default, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WireGame {
    pub id: Option<String>,
    pub team1: Option<WireTeam>,
    pub team2: Option<WireTeam>,
    pub status: Option<String>, // "not started" | "in progress" | "completed"
    pub round: Option<u32>,
    pub region: Option<String>,
    pub winner_id: Option<String>,
    pub winner: Option<WireTeam>,
    pub start_time: Option<String>, // ISO 8601
}

#[derive(Deserialize, Default, Debug, Clone)]
pub struct WireTeam {
    pub id: Option<String>,
    pub name: Option<String>,
    pub score: Option<u32>,
}

impl WireTeam {
    /// Team identifier: the feed's id when present, otherwise its name.
    pub fn identifier(&self) -> Option<&str> {
        non_blank(&self.id).or_else(|| non_blank(&self.name))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
