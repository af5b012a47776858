//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use tabletalk_protocol::Compat;
use tabletalk_session::LifecycleConfig;

use crate::TabletalkError;

/// Default command channel size for session actors.
pub const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Settings shared by every session a [`Pipeline`](crate::Pipeline) or
/// [`Hub`](crate::Hub) runs.
///
/// Every field has a default, so a config document only lists what it
/// changes:
///
/// ```json
/// { "compat": { "strict": "v4" }, "lifecycle": { "lobby_threshold": 5 } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Which schema revision(s) the decoder accepts.
    pub compat: Compat,
    pub lifecycle: LifecycleConfig,
    /// Bounded queue length in front of each session actor. When full,
    /// submitters wait.
    pub channel_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            compat: Compat::Union,
            lifecycle: LifecycleConfig::default(),
            channel_size: DEFAULT_CHANNEL_SIZE,
        }
    }
}

impl PipelineConfig {
    /// Parses a JSON config document.
    ///
    /// # Errors
    /// [`TabletalkError::Config`] if the document is not valid JSON or a
    /// field has the wrong shape.
    pub fn from_json(text: &str) -> Result<Self, TabletalkError> {
        serde_json::from_str(text).map_err(TabletalkError::Config)
    }
}
