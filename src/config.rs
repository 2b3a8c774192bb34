//! Tunables for the aggregator, the admission gate and the session.
//!
//! Every field has a default, so a partial JSON document only overrides what it names:
//!
//! ```json
//! { "gate": { "cooldownMs": 10000 }, "aggregator": { "iouThreshold": 0.6 } }
//! ```

use serde_derive::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Error;

pub const DEFAULT_MIN_STABILITY_FRAMES: u32 = 5;
pub const DEFAULT_MIN_STABILITY_AGE_MS: u64 = 500;
pub const DEFAULT_COOLDOWN_MS: u64 = 3_000;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;
pub const DEFAULT_REASSOCIATION_WINDOW_MS: u64 = 1_000;
pub const DEFAULT_LABEL_HISTORY: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatorConfig {
    /// Minimum overlap for re-associating a new tracking id with an existing item.
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    /// How long after its last sighting an item may still absorb a new tracking id.
    #[serde(default = "default_reassociation_window_ms")]
    pub reassociation_window_ms: u64,

    /// Number of recent top labels kept per item for the coarse category vote.
    #[serde(default = "default_label_history")]
    pub label_history: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            iou_threshold: default_iou_threshold(),
            reassociation_window_ms: default_reassociation_window_ms(),
            label_history: default_label_history(),
        }
    }
}

impl AggregatorConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.iou_threshold > 0.0 && self.iou_threshold <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "aggregator.iouThreshold must be in (0, 1], got {}",
                self.iou_threshold
            )));
        }

        if self.label_history == 0 {
            return Err(Error::InvalidConfig(
                "aggregator.labelHistory must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateConfig {
    #[serde(default = "default_min_stability_frames")]
    pub min_stability_frames: u32,

    #[serde(default = "default_min_stability_age_ms")]
    pub min_stability_age_ms: u64,

    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_stability_frames: default_min_stability_frames(),
            min_stability_age_ms: default_min_stability_age_ms(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl GateConfig {
    pub fn with_cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.cooldown_ms = cooldown_ms;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default)]
    pub aggregator: AggregatorConfig,

    #[serde(default)]
    pub gate: GateConfig,
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.aggregator.validate()
    }
}

fn default_min_stability_frames() -> u32 {
    DEFAULT_MIN_STABILITY_FRAMES
}

fn default_min_stability_age_ms() -> u64 {
    DEFAULT_MIN_STABILITY_AGE_MS
}

fn default_cooldown_ms() -> u64 {
    DEFAULT_COOLDOWN_MS
}

fn default_iou_threshold() -> f32 {
    DEFAULT_IOU_THRESHOLD
}

fn default_reassociation_window_ms() -> u64 {
    DEFAULT_REASSOCIATION_WINDOW_MS
}

fn default_label_history() -> usize {
    DEFAULT_LABEL_HISTORY
}
