//! AI configuration - TOML to [`AiConfig`] conversion
//!
//! Every section and field is optional; omitted values fall back to the
//! stock tuning.
//!
//! # Config Format
//!
//! ```toml
//! [perception]
//! sound_ttl = 2.0
//! decay_rate = 0.1
//! touch_range = 1.5
//!
//! [perception.profiles.guard]
//! view_dist = 30
//! view_angle = 90
//!
//! [planner]
//! max_iterations = 1000
//!
//! [agent]
//! replan_interval = 1.0
//!
//! [tactical]
//! grid_size = 2.0
//! cover_search_radius = 20.0
//!
//! [tactical.personality]
//! aggressiveness = 0.9
//!
//! [pipeline]
//! target_confidence = 0.5
//! ```

use crate::error::{AiError, Result};
use crate::perception::PerceptionProfile;
use crate::tactical::Personality;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use void_math::{Aabb, Vec3};

/// Root configuration for the decision pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub perception: PerceptionConfig,
    pub planner: PlannerConfig,
    pub agent: AgentConfig,
    pub tactical: TacticalConfig,
    pub pipeline: PipelineConfig,
}

/// Perception system tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    /// Seconds a sound event stays audible
    pub sound_ttl: f64,
    /// Confidence lost per second without reinforcement
    pub decay_rate: f32,
    /// Distance at which contact is always detected
    pub touch_range: f32,
    /// Named sensing profiles
    pub profiles: BTreeMap<String, PerceptionProfile>,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            sound_ttl: 2.0,
            decay_rate: 0.1,
            touch_range: 1.5,
            profiles: BTreeMap::new(),
        }
    }
}

/// GOAP planner tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Upper bound on open-list pops per planning call
    pub max_iterations: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self { max_iterations: 1000 }
    }
}

/// GOAP agent tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Seconds between periodic replans
    pub replan_interval: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { replan_interval: 1.0 }
    }
}

/// Tactical map and evaluator tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TacticalConfig {
    /// Edge length of one tactical grid cell
    pub grid_size: f32,
    /// Map extents
    pub bounds: Aabb,
    /// How far an NPC will look for cover
    pub cover_search_radius: f32,
    /// Distance of flanking points from the target
    pub flank_distance: f32,
    /// How far a retreat moves away from the threats
    pub retreat_distance: f32,
    /// Allies closer than this count as "near"
    pub ally_support_radius: f32,
    /// Default personality for new evaluators
    pub personality: Personality,
}

impl Default for TacticalConfig {
    fn default() -> Self {
        Self {
            grid_size: 2.0,
            bounds: Aabb::new(Vec3::ZERO, Vec3::new(100.0, 100.0, 10.0)),
            cover_search_radius: 20.0,
            flank_distance: 15.0,
            retreat_distance: 20.0,
            ally_support_radius: 10.0,
            personality: Personality::default(),
        }
    }
}

/// Glue between perception and the deciders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Beliefs must be strictly more confident than this to count as a
    /// target or threat
    pub target_confidence: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { target_confidence: 0.5 }
    }
}

impl AiConfig {
    /// Parse and validate a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AiConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| AiError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject values the subsystems cannot work with
    pub fn validate(&self) -> Result<()> {
        let p = &self.perception;
        if p.sound_ttl < 0.0 || p.decay_rate < 0.0 || p.touch_range < 0.0 {
            return Err(AiError::invalid_config(
                "perception timings and ranges must be non-negative",
            ));
        }
        for (id, profile) in &p.profiles {
            profile.validate().map_err(|msg| {
                AiError::invalid_config(format!("perception profile '{}': {}", id, msg))
            })?;
        }

        if self.planner.max_iterations == 0 {
            return Err(AiError::invalid_config("planner.max_iterations must be at least 1"));
        }
        if self.agent.replan_interval < 0.0 {
            return Err(AiError::invalid_config("agent.replan_interval must be non-negative"));
        }

        let t = &self.tactical;
        if t.grid_size <= 0.0 {
            return Err(AiError::invalid_config("tactical.grid_size must be positive"));
        }
        if !t.bounds.is_valid() {
            return Err(AiError::invalid_config("tactical.bounds min must not exceed max"));
        }
        if t.cover_search_radius < 0.0 || t.flank_distance < 0.0 || t.retreat_distance < 0.0 {
            return Err(AiError::invalid_config("tactical distances must be non-negative"));
        }
        t.personality
            .validate()
            .map_err(|msg| AiError::invalid_config(format!("tactical.personality: {}", msg)))?;

        if !(0.0..=1.0).contains(&self.pipeline.target_confidence) {
            return Err(AiError::invalid_config(
                "pipeline.target_confidence must be within [0, 1]",
            ));
        }
        Ok(())
    }

    /// Resolve a perception profile by id, falling back to the stock profile
    pub fn profile(&self, id: &str) -> PerceptionProfile {
        self.perception.profiles.get(id).cloned().unwrap_or_default()
    }
}
