use serde::{Deserialize, Serialize};

/// Terminal result of one trade session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum TradeOutcome {
    Success,
    Cancelled,
    Failed { reason: String },
}

/// Point-in-time view of the session, published after every exchanged byte.
/// Observers get a clone; nothing here is a live reference into session state.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub phase: &'static str,
    pub bytes_exchanged_in_phase: u32,
    pub received_species: Option<u8>,
    pub last_error: Option<String>,
    pub outcome: Option<TradeOutcome>,
}

impl StatusSnapshot {
    pub fn idle() -> Self {
        Self {
            phase: "not_connected",
            bytes_exchanged_in_phase: 0,
            received_species: None,
            last_error: None,
            outcome: None,
        }
    }
}
