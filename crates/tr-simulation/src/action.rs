use std::fmt;

use serde::{Deserialize, Serialize};

/// An action verb sent by a remote model.
///
/// Parsing never fails: unrecognised verbs are kept so the action can be
/// answered as unsuccessful rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionVerb {
    /// Step onto an empty neighbouring cell.
    Move,
    /// Eat food on a neighbouring cell.
    Consume,
    /// Anything else, as sent.
    Other(String),
}

impl ActionVerb {
    /// Case-insensitive.
    pub fn parse(verb: &str) -> Self {
        match verb.to_ascii_uppercase().as_str() {
            "MOVE" => ActionVerb::Move,
            "CONSUME" => ActionVerb::Consume,
            _ => ActionVerb::Other(verb.to_string()),
        }
    }
}

impl fmt::Display for ActionVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionVerb::Move => write!(f, "MOVE"),
            ActionVerb::Consume => write!(f, "CONSUME"),
            ActionVerb::Other(verb) => write!(f, "{verb}"),
        }
    }
}

/// Result of an agent action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    /// Whether the move or consume took effect.
    pub was_successful: bool,
    /// Whether the agent still exists after the action and any inline
    /// living cost.
    pub is_alive: bool,
}
