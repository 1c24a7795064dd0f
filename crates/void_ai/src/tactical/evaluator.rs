//! Utility-style tactical decisions
//!
//! [`TacticalAi::evaluate`] walks a fixed ladder of situations, most urgent
//! first, and returns the first decision that applies. It always returns a
//! decision; with nothing better to do the NPC holds position.

use super::map::{TacticalMap, ThreatInfo};
use crate::config::TacticalConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use void_core::EntityId;
use void_math::Vec3;

/// Threats farther than this contribute nothing to the threat level
const THREAT_FALLOFF_DIST: f32 = 30.0;
/// Penalty per unit of distance when picking a target
const TARGET_DIST_WEIGHT: f32 = 0.1;

/// Behavioral traits, each in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Personality {
    pub aggressiveness: f32,
    pub caution: f32,
    pub teamwork: f32,
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            aggressiveness: 0.5,
            caution: 0.5,
            teamwork: 0.5,
        }
    }
}

impl Personality {
    pub fn new(aggressiveness: f32, caution: f32, teamwork: f32) -> Self {
        Self {
            aggressiveness,
            caution,
            teamwork,
        }
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        for (name, value) in [
            ("aggressiveness", self.aggressiveness),
            ("caution", self.caution),
            ("teamwork", self.teamwork),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be within [0, 1], got {}", name, value));
            }
        }
        Ok(())
    }
}

/// A friendly entity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllyInfo {
    pub entity: EntityId,
    pub pos: Vec3,
}

/// Situation an NPC is deciding in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TacticalContext {
    pub my_pos: Vec3,
    pub my_team: u32,
    pub threats: Vec<ThreatInfo>,
    pub allies: Vec<AllyInfo>,
    pub objective: Option<Vec3>,
    /// How pressed the NPC is, in [0, 1]; above 0.7 counts as low health
    pub urgency: f32,
}

impl TacticalContext {
    pub fn new(my_pos: Vec3) -> Self {
        Self {
            my_pos,
            ..Default::default()
        }
    }

    pub fn with_team(mut self, team: u32) -> Self {
        self.my_team = team;
        self
    }

    pub fn with_threat(mut self, threat: ThreatInfo) -> Self {
        self.threats.push(threat);
        self
    }

    pub fn with_ally(mut self, entity: EntityId, pos: Vec3) -> Self {
        self.allies.push(AllyInfo { entity, pos });
        self
    }

    pub fn with_objective(mut self, objective: Vec3) -> Self {
        self.objective = Some(objective);
        self
    }

    pub fn with_urgency(mut self, urgency: f32) -> Self {
        self.urgency = urgency;
        self
    }
}

/// What the NPC should do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TacticalAction {
    Move,
    Cover,
    Attack,
    Flank,
    Retreat,
    Support,
    Hold,
}

impl TacticalAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TacticalAction::Move => "move",
            TacticalAction::Cover => "cover",
            TacticalAction::Attack => "attack",
            TacticalAction::Flank => "flank",
            TacticalAction::Retreat => "retreat",
            TacticalAction::Support => "support",
            TacticalAction::Hold => "hold",
        }
    }
}

impl fmt::Display for TacticalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a decision points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DecisionTarget {
    Position(Vec3),
    Entity(EntityId),
    None,
}

impl DecisionTarget {
    pub fn position(&self) -> Option<Vec3> {
        match self {
            DecisionTarget::Position(pos) => Some(*pos),
            _ => None,
        }
    }

    pub fn entity(&self) -> Option<EntityId> {
        match self {
            DecisionTarget::Entity(id) => Some(*id),
            _ => None,
        }
    }
}

/// Outcome of a tactical evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticalDecision {
    pub action: TacticalAction,
    pub target: DecisionTarget,
    pub priority: f32,
    /// Human-readable explanation, stable for logs and tests
    pub reason: String,
}

impl TacticalDecision {
    fn new(action: TacticalAction, target: DecisionTarget, priority: f32, reason: &str) -> Self {
        Self {
            action,
            target,
            priority,
            reason: reason.to_string(),
        }
    }
}

/// Tactical decision maker for one NPC
pub struct TacticalAi {
    entity: EntityId,
    map: Arc<TacticalMap>,
    threats: BTreeMap<EntityId, ThreatInfo>,
    current_cover: Option<String>,
    personality: Personality,
    cover_search_radius: f32,
    retreat_distance: f32,
    ally_support_radius: f32,
}

impl TacticalAi {
    pub fn new(entity: EntityId, map: Arc<TacticalMap>) -> Self {
        Self::from_config(entity, map, &TacticalConfig::default())
    }

    pub fn from_config(entity: EntityId, map: Arc<TacticalMap>, config: &TacticalConfig) -> Self {
        Self {
            entity,
            map,
            threats: BTreeMap::new(),
            current_cover: None,
            personality: config.personality.clone(),
            cover_search_radius: config.cover_search_radius,
            retreat_distance: config.retreat_distance,
            ally_support_radius: config.ally_support_radius,
        }
    }

    pub fn with_personality(mut self, personality: Personality) -> Self {
        self.personality = personality;
        self
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn map(&self) -> &Arc<TacticalMap> {
        &self.map
    }

    pub fn personality(&self) -> &Personality {
        &self.personality
    }

    pub fn set_personality(&mut self, personality: Personality) {
        self.personality = personality;
    }

    // ========== Threat Tracking ==========

    /// Track a threat, replacing any entry for the same entity
    pub fn add_threat(&mut self, threat: ThreatInfo) {
        self.threats.insert(threat.entity, threat);
    }

    pub fn remove_threat(&mut self, entity: EntityId) -> Option<ThreatInfo> {
        self.threats.remove(&entity)
    }

    /// Move a tracked threat; returns false when it is not tracked
    pub fn update_threat(&mut self, entity: EntityId, pos: Vec3, now: f64) -> bool {
        match self.threats.get_mut(&entity) {
            Some(threat) => {
                threat.pos = pos;
                threat.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Tracked threats ordered by entity id
    pub fn threats(&self) -> impl Iterator<Item = &ThreatInfo> {
        self.threats.values()
    }

    // ========== Cover ==========

    /// Give up the current cover and try to claim `cover`
    ///
    /// Returns whether the new cover was claimed. `None` only releases.
    pub fn set_cover(&mut self, cover: Option<&str>) -> bool {
        if let Some(previous) = self.current_cover.take() {
            self.map.release_cover(&previous);
        }
        let Some(id) = cover else {
            return true;
        };
        if self.map.occupy_cover(id, self.entity) {
            self.current_cover = Some(id.to_string());
            true
        } else {
            log::debug!("{}: cover '{}' is taken", self.entity, id);
            false
        }
    }

    pub fn current_cover(&self) -> Option<&str> {
        self.current_cover.as_deref()
    }

    // ========== Evaluation ==========

    /// Pick one decision for the situation
    pub fn evaluate(&self, ctx: &TacticalContext) -> TacticalDecision {
        let threat_level = self.threat_level(ctx);
        let has_threats = !ctx.threats.is_empty();
        let low_health = ctx.urgency > 0.7;
        let p = &self.personality;

        if low_health && threat_level > 0.6 {
            if let Some(cover) = self.best_cover(ctx) {
                return TacticalDecision::new(
                    TacticalAction::Cover,
                    DecisionTarget::Position(cover),
                    0.9,
                    "low health, seeking cover",
                );
            }
            return TacticalDecision::new(
                TacticalAction::Retreat,
                DecisionTarget::Position(self.retreat_pos(ctx)),
                0.85,
                "low health, retreating",
            );
        }

        if has_threats && p.aggressiveness > 0.7 && threat_level < 0.4 {
            if let Some(target) = Self::select_target(ctx) {
                if p.aggressiveness > 0.8 {
                    if let Some(flank) = self.map.find_flanking_pos(target.pos, ctx.my_pos) {
                        return TacticalDecision::new(
                            TacticalAction::Flank,
                            DecisionTarget::Position(flank),
                            0.7,
                            "flanking target",
                        );
                    }
                }
                return TacticalDecision::new(
                    TacticalAction::Attack,
                    DecisionTarget::Entity(target.entity),
                    0.75,
                    "engaging target",
                );
            }
        }

        if has_threats && p.caution > 0.6 {
            if let Some(cover) = self.best_cover(ctx) {
                return TacticalDecision::new(
                    TacticalAction::Cover,
                    DecisionTarget::Position(cover),
                    0.65,
                    "taking defensive position",
                );
            }
        }

        let near_allies = ctx
            .allies
            .iter()
            .filter(|a| ctx.my_pos.distance(a.pos) < self.ally_support_radius)
            .count();
        if near_allies < 2 && p.teamwork > 0.6 {
            if let Some(ally) = Self::nearest_ally(ctx) {
                return TacticalDecision::new(
                    TacticalAction::Support,
                    DecisionTarget::Position(ally.pos),
                    0.5,
                    "moving to support allies",
                );
            }
        }

        if let Some(objective) = ctx.objective {
            return TacticalDecision::new(
                TacticalAction::Move,
                DecisionTarget::Position(objective),
                0.4,
                "moving to objective",
            );
        }

        TacticalDecision::new(TacticalAction::Hold, DecisionTarget::None, 0.1, "holding position")
    }

    /// Average distance-weighted danger of the context's threats, capped at 1
    pub fn threat_level(&self, ctx: &TacticalContext) -> f32 {
        if ctx.threats.is_empty() {
            return 0.0;
        }
        let total: f32 = ctx
            .threats
            .iter()
            .map(|t| {
                let dist = ctx.my_pos.distance(t.pos);
                t.threat * (1.0 - (dist / THREAT_FALLOFF_DIST).min(1.0))
            })
            .sum();
        (total / ctx.threats.len() as f32).min(1.0)
    }

    fn best_cover(&self, ctx: &TacticalContext) -> Option<Vec3> {
        self.map
            .find_best_cover(ctx.my_pos, &ctx.threats, self.cover_search_radius)
            .map(|c| c.pos)
    }

    fn select_target(ctx: &TacticalContext) -> Option<&ThreatInfo> {
        let mut best = None;
        let mut best_score = f32::NEG_INFINITY;
        for threat in &ctx.threats {
            let score = threat.threat - ctx.my_pos.distance(threat.pos) * TARGET_DIST_WEIGHT;
            if score > best_score {
                best_score = score;
                best = Some(threat);
            }
        }
        best
    }

    /// Point away from the average threat direction, in the XY plane
    fn retreat_pos(&self, ctx: &TacticalContext) -> Vec3 {
        if ctx.threats.is_empty() {
            return ctx.my_pos;
        }
        let mut away = Vec3::ZERO;
        for threat in &ctx.threats {
            away += (threat.pos - ctx.my_pos).flatten_xy();
        }
        let away = away.normalize_or_zero();
        Vec3::new(
            ctx.my_pos.x - away.x * self.retreat_distance,
            ctx.my_pos.y - away.y * self.retreat_distance,
            ctx.my_pos.z,
        )
    }

    fn nearest_ally(ctx: &TacticalContext) -> Option<&AllyInfo> {
        ctx.allies.iter().fold(None, |nearest: Option<&AllyInfo>, ally| match nearest {
            Some(n) if ctx.my_pos.distance(n.pos) <= ctx.my_pos.distance(ally.pos) => Some(n),
            _ => Some(ally),
        })
    }
}

impl fmt::Debug for TacticalAi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TacticalAi")
            .field("entity", &self.entity)
            .field("threats", &self.threats.len())
            .field("current_cover", &self.current_cover)
            .field("personality", &self.personality)
            .finish()
    }
}
