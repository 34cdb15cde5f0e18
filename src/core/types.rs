use serde::{Deserialize, Serialize};
use std::fmt;

/// Which node of the primary/replica pair a statement goes to.
///
/// Doubles as the connection role handed to [`crate::ScalarQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Primary,
    Replica,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Primary => "primary",
            NodeRole::Replica => "replica",
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, NodeRole::Primary)
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
