//! Tactical layer: cover, flanking and situational decisions

pub mod evaluator;
pub mod map;

pub use evaluator::{
    AllyInfo, DecisionTarget, Personality, TacticalAction, TacticalAi, TacticalContext,
    TacticalDecision,
};
pub use map::{CoverPoint, CoverType, TacticalMap, TacticalNode, ThreatInfo};
