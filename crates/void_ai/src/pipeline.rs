//! Per-frame sense/decide loop for a set of NPCs
//!
//! [`DecisionPipeline`] owns the perception system and the shared tactical
//! map. Every [`tick`](DecisionPipeline::tick) fades old beliefs, lets each
//! NPC perceive, picks or drops its target, evaluates the tactical ladder and
//! drives its GOAP agent if it has one.

use crate::bridge;
use crate::config::AiConfig;
use crate::error::{AiError, Result};
use crate::goap::{AgentEvent, GoapAgent};
use crate::perception::{EntityProvider, LosChecker, PerceptionSystem, SoundEmission};
use crate::tactical::{AllyInfo, TacticalAi, TacticalContext, TacticalDecision, TacticalMap};
use std::sync::Arc;
use void_core::EntityId;
use void_math::Vec3;

/// Host-supplied facts about an NPC's situation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Situation {
    pub team: u32,
    /// How pressed the NPC is, in [0, 1]
    pub urgency: f32,
    pub allies: Vec<AllyInfo>,
    pub objective: Option<Vec3>,
}

/// Everything the pipeline keeps for one NPC
struct NpcMind {
    entity: EntityId,
    profile_id: String,
    tactical: TacticalAi,
    agent: Option<GoapAgent>,
    target: Option<EntityId>,
    situation: Situation,
}

/// What one NPC decided during a tick
#[derive(Debug, Clone, PartialEq)]
pub struct NpcReport {
    pub entity: EntityId,
    /// `None` when the NPC could not be located or is dead
    pub decision: Option<TacticalDecision>,
    pub target: Option<EntityId>,
    /// Name of the plan step the agent is on
    pub current_action: Option<String>,
    pub agent_events: Vec<AgentEvent>,
}

impl NpcReport {
    fn idle(entity: EntityId) -> Self {
        Self {
            entity,
            decision: None,
            target: None,
            current_action: None,
            agent_events: Vec::new(),
        }
    }
}

/// Sense/decide pipeline
pub struct DecisionPipeline {
    config: AiConfig,
    perception: PerceptionSystem,
    map: Arc<TacticalMap>,
    minds: Vec<NpcMind>,
}

impl DecisionPipeline {
    /// Create a pipeline with its own tactical map
    pub fn new(config: AiConfig) -> Self {
        let map = Arc::new(TacticalMap::from_config(&config.tactical));
        Self::with_map(config, map)
    }

    /// Create a pipeline sharing an existing tactical map
    pub fn with_map(config: AiConfig, map: Arc<TacticalMap>) -> Self {
        Self {
            perception: PerceptionSystem::from_config(&config.perception),
            config,
            map,
            minds: Vec::new(),
        }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    pub fn perception(&self) -> &PerceptionSystem {
        &self.perception
    }

    pub fn perception_mut(&mut self) -> &mut PerceptionSystem {
        &mut self.perception
    }

    pub fn map(&self) -> &Arc<TacticalMap> {
        &self.map
    }

    pub fn set_entity_provider(&mut self, provider: Arc<dyn EntityProvider>) {
        self.perception.set_entity_provider(provider);
    }

    pub fn set_los_checker(&mut self, checker: Arc<dyn LosChecker>) {
        self.perception.set_los_checker(checker);
    }

    // ========== NPC Management ==========

    /// Start deciding for an NPC using the named perception profile
    pub fn register_npc(&mut self, entity: EntityId, profile_id: impl Into<String>) -> Result<()> {
        if self.minds.iter().any(|m| m.entity == entity) {
            return Err(AiError::NpcAlreadyRegistered(entity));
        }

        let profile_id = profile_id.into();
        log::debug!("Registering NPC {} with profile '{}'", entity, profile_id);
        self.perception.register_entity(entity);
        self.minds.push(NpcMind {
            entity,
            profile_id,
            tactical: TacticalAi::from_config(entity, Arc::clone(&self.map), &self.config.tactical),
            agent: None,
            target: None,
            situation: Situation::default(),
        });
        Ok(())
    }

    /// Stop deciding for an NPC, releasing its cover and forgetting it
    pub fn unregister_npc(&mut self, entity: EntityId) -> Result<()> {
        let idx = self.index_of(entity)?;
        let mut mind = self.minds.remove(idx);
        mind.tactical.set_cover(None);
        if let Some(agent) = mind.agent.as_mut() {
            agent.cancel_plan();
        }
        self.perception.unregister_entity(entity);
        log::debug!("Unregistered NPC {}", entity);
        Ok(())
    }

    pub fn is_registered(&self, entity: EntityId) -> bool {
        self.minds.iter().any(|m| m.entity == entity)
    }

    /// Registered NPCs in registration order
    pub fn npcs(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.minds.iter().map(|m| m.entity)
    }

    /// Give an NPC a GOAP agent, replacing any previous one
    pub fn set_agent(&mut self, entity: EntityId, agent: GoapAgent) -> Result<()> {
        let mind = self.mind_mut(entity)?;
        if let Some(previous) = mind.agent.as_mut() {
            previous.cancel_plan();
        }
        mind.agent = Some(agent);
        Ok(())
    }

    pub fn agent(&self, entity: EntityId) -> Option<&GoapAgent> {
        self.mind(entity).ok()?.agent.as_ref()
    }

    pub fn agent_mut(&mut self, entity: EntityId) -> Option<&mut GoapAgent> {
        self.mind_mut(entity).ok()?.agent.as_mut()
    }

    pub fn tactical(&self, entity: EntityId) -> Option<&TacticalAi> {
        self.mind(entity).ok().map(|m| &m.tactical)
    }

    pub fn tactical_mut(&mut self, entity: EntityId) -> Option<&mut TacticalAi> {
        self.mind_mut(entity).ok().map(|m| &mut m.tactical)
    }

    /// Replace an NPC's situation
    pub fn set_situation(&mut self, entity: EntityId, situation: Situation) -> Result<()> {
        self.mind_mut(entity)?.situation = situation;
        Ok(())
    }

    /// Current target of an NPC
    pub fn target_of(&self, entity: EntityId) -> Option<EntityId> {
        self.mind(entity).ok()?.target
    }

    /// Force or clear an NPC's target
    pub fn set_target(&mut self, entity: EntityId, target: Option<EntityId>) -> Result<()> {
        self.mind_mut(entity)?.target = target;
        Ok(())
    }

    pub fn emit_sound(&mut self, emission: SoundEmission) {
        self.perception.emit_sound(emission);
    }

    // ========== Update ==========

    /// Advance perception by `dt` seconds and decide for every NPC at time
    /// `now`
    ///
    /// Returns one report per registered NPC, in registration order.
    pub fn tick(&mut self, dt: f32, now: f64) -> Vec<NpcReport> {
        self.perception.upd(dt);
        let provider = self.perception.entity_provider().cloned();
        let min_confidence = self.config.pipeline.target_confidence;

        let mut reports = Vec::with_capacity(self.minds.len());
        for mind in self.minds.iter_mut() {
            let mut report = NpcReport::idle(mind.entity);

            let me = provider
                .as_ref()
                .and_then(|p| p.get(mind.entity))
                .filter(|s| s.alive);
            let (Some(provider), Some(me)) = (provider.as_ref(), me) else {
                log::trace!("NPC {} not in the world; skipping", mind.entity);
                report.target = mind.target;
                reports.push(report);
                continue;
            };

            self.perception.upd_perception(mind.entity, &mind.profile_id);
            let beliefs = self.perception.get_perceived(mind.entity);
            let ally_ids: Vec<EntityId> = mind.situation.allies.iter().map(|a| a.entity).collect();

            // Drop targets that died or faded from memory, then acquire anew
            if let Some(target) = mind.target {
                let alive = provider.get(target).is_some_and(|t| t.alive);
                if !alive || !self.perception.is_aware_of(mind.entity, target) {
                    log::debug!("NPC {} lost target {}", mind.entity, target);
                    mind.target = None;
                }
            }
            if mind.target.is_none() {
                let candidates: Vec<_> = beliefs
                    .iter()
                    .filter(|b| !ally_ids.contains(&b.id))
                    .filter(|b| provider.get(b.id).is_some_and(|t| t.alive))
                    .cloned()
                    .collect();
                mind.target = bridge::strongest_belief(&candidates, min_confidence).map(|b| b.id);
                if let Some(target) = mind.target {
                    log::debug!("NPC {} acquired target {}", mind.entity, target);
                }
            }

            let ctx = TacticalContext {
                my_pos: me.transform.pos,
                my_team: mind.situation.team,
                threats: bridge::beliefs_to_threats(&beliefs, min_confidence, &ally_ids),
                allies: mind.situation.allies.clone(),
                objective: mind.situation.objective,
                urgency: mind.situation.urgency,
            };
            let decision = mind.tactical.evaluate(&ctx);
            log::trace!(
                "NPC {} decided {} ({}): {}",
                mind.entity,
                decision.action,
                decision.priority,
                decision.reason
            );

            if let Some(agent) = mind.agent.as_mut() {
                let target_belief = mind
                    .target
                    .and_then(|t| beliefs.iter().find(|b| b.id == t));
                bridge::apply_target(agent, target_belief);
                report.agent_events = agent.upd(now);
                report.current_action = agent.current_action().map(|a| a.name.clone());
            }

            report.decision = Some(decision);
            report.target = mind.target;
            reports.push(report);
        }
        reports
    }

    fn index_of(&self, entity: EntityId) -> Result<usize> {
        self.minds
            .iter()
            .position(|m| m.entity == entity)
            .ok_or(AiError::NpcNotRegistered(entity))
    }

    fn mind(&self, entity: EntityId) -> Result<&NpcMind> {
        let idx = self.index_of(entity)?;
        Ok(&self.minds[idx])
    }

    fn mind_mut(&mut self, entity: EntityId) -> Result<&mut NpcMind> {
        let idx = self.index_of(entity)?;
        Ok(&mut self.minds[idx])
    }
}

impl std::fmt::Debug for DecisionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionPipeline")
            .field("npcs", &self.minds.len())
            .field("perceivers", &self.perception.perceiver_count())
            .field("map", &self.map)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tactical::{CoverPoint, CoverType};

    const GUARD: EntityId = EntityId::new(1);

    #[test]
    fn test_registration_errors() {
        let mut pipeline = DecisionPipeline::new(AiConfig::default());
        pipeline.register_npc(GUARD, "default").unwrap();
        assert!(matches!(
            pipeline.register_npc(GUARD, "default"),
            Err(AiError::NpcAlreadyRegistered(id)) if id == GUARD
        ));
        assert!(pipeline.perception().is_registered(GUARD));

        pipeline.unregister_npc(GUARD).unwrap();
        assert!(!pipeline.perception().is_registered(GUARD));
        assert!(matches!(
            pipeline.unregister_npc(GUARD),
            Err(AiError::NpcNotRegistered(_))
        ));
        assert!(pipeline.set_situation(GUARD, Situation::default()).is_err());
    }

    #[test]
    fn test_unregister_releases_cover() {
        let mut pipeline = DecisionPipeline::new(AiConfig::default());
        pipeline
            .map()
            .add_cover_point(CoverPoint::new("c1", Vec3::ZERO, CoverType::Half, Vec3::X, 1.0));
        pipeline.register_npc(GUARD, "default").unwrap();
        assert!(pipeline.tactical_mut(GUARD).unwrap().set_cover(Some("c1")));
        assert_eq!(pipeline.map().occupant("c1"), Some(GUARD));

        pipeline.unregister_npc(GUARD).unwrap();
        assert_eq!(pipeline.map().occupant("c1"), None);
    }

    #[test]
    fn test_tick_without_provider_reports_idle() {
        let mut pipeline = DecisionPipeline::new(AiConfig::default());
        pipeline.register_npc(GUARD, "default").unwrap();
        pipeline.register_npc(EntityId::new(2), "default").unwrap();

        let reports = pipeline.tick(0.1, 0.1);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].entity, GUARD);
        assert!(reports.iter().all(|r| r.decision.is_none()));
        assert!((pipeline.perception().now() - 0.1).abs() < 1e-6);
    }
}
