//! Void AI - NPC Sense and Decide Pipeline
//!
//! This crate turns what NPCs sense into what they decide to do.
//!
//! # Features
//!
//! - Multi-sense perception (sight cone, hearing, smell, touch) with
//!   confidence that fades over time
//! - Goal-oriented action planning (GOAP) with agents that replan and execute
//!   suspendable actions
//! - Tactical evaluation over a shared cover map (cover, flank, retreat,
//!   support, hold)
//! - A pipeline wiring the three together per NPC, configured from TOML
//!
//! # Example
//!
//! ```ignore
//! use void_ai::prelude::*;
//!
//! let config = AiConfig::load("ai.toml")?;
//! let mut pipeline = DecisionPipeline::new(config);
//! pipeline.set_entity_provider(world.clone());
//! pipeline.register_npc(guard, "guard")?;
//!
//! for report in pipeline.tick(dt, now) {
//!     if let Some(decision) = report.decision {
//!         println!("{}: {} ({})", report.entity, decision.action, decision.reason);
//!     }
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod goap;
pub mod perception;
pub mod pipeline;
pub mod tactical;

pub mod prelude {
    pub use crate::config::AiConfig;
    pub use crate::error::AiError;
    pub use crate::goap::{
        combat_actions, ActionError, AgentEvent, GoapAction, GoapAgent, GoapContext, GoapGoal,
        GoapPlanner, Plan, Value, WorldState,
    };
    pub use crate::perception::{
        EntityProvider, EntitySnapshot, EntityTransform, LosChecker, NearbyEntity,
        PerceivedEntity, PerceptionProfile, PerceptionSystem, SenseSource, SoundEmission,
        SoundKind,
    };
    pub use crate::pipeline::{DecisionPipeline, NpcReport, Situation};
    pub use crate::tactical::{
        AllyInfo, CoverPoint, CoverType, DecisionTarget, Personality, TacticalAction, TacticalAi,
        TacticalContext, TacticalDecision, TacticalMap, TacticalNode, ThreatInfo,
    };
    pub use void_core::EntityId;
    pub use void_math::Vec3;
}

pub use prelude::*;
