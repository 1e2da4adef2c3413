use serde::{Deserialize, Serialize};

/// Coarse trend classification used to gate signal evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegimeState {
    Bull,
    Bear,
    /// Choppy or non-trending market. Signals are not evaluated.
    Neutral,
}

impl RegimeState {
    pub fn is_trending(&self) -> bool {
        !matches!(self, Self::Neutral)
    }
}

impl std::fmt::Display for RegimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bull => write!(f, "Bull"),
            Self::Bear => write!(f, "Bear"),
            Self::Neutral => write!(f, "Neutral"),
        }
    }
}
