//! Lifecycle configuration.

use serde::{Deserialize, Serialize};

/// Tunables for the lifecycle state machine.
///
/// Every field has a default, so a partial JSON object (or `{}`) is a
/// valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Connected participants needed to move from `Connecting` to `Lobby`.
    pub lobby_threshold: usize,

    /// Reject `player_action` from anyone but the current turn holder.
    pub enforce_turn_order: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            lobby_threshold: 2,
            enforce_turn_order: true,
        }
    }
}
