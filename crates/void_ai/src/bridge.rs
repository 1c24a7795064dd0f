//! Translating beliefs into tactical threats and planner facts

use crate::goap::GoapAgent;
use crate::perception::{PerceivedEntity, SenseSource};
use crate::tactical::ThreatInfo;
use void_core::EntityId;

/// Beliefs strictly above `min_confidence` about non-allies, as threats
///
/// The belief's confidence doubles as the threat rating.
pub fn beliefs_to_threats(
    beliefs: &[PerceivedEntity],
    min_confidence: f32,
    allies: &[EntityId],
) -> Vec<ThreatInfo> {
    beliefs
        .iter()
        .filter(|b| b.confidence > min_confidence && !allies.contains(&b.id))
        .map(|b| ThreatInfo::new(b.id, b.last_pos, b.confidence).with_last_seen(b.last_seen))
        .collect()
}

/// The most confident belief strictly above `min_confidence`; ties go to the
/// lower entity id
pub fn strongest_belief(beliefs: &[PerceivedEntity], min_confidence: f32) -> Option<&PerceivedEntity> {
    beliefs
        .iter()
        .filter(|b| b.confidence > min_confidence)
        .fold(None, |best: Option<&PerceivedEntity>, b| match best {
            Some(best) if best.confidence > b.confidence => Some(best),
            Some(best) if best.confidence == b.confidence && best.id < b.id => Some(best),
            _ => Some(b),
        })
}

/// Write the target facts an agent plans with
///
/// Sets `hasTarget` and one flag per sense (`targetVisible`, `targetHeard`,
/// `targetSmelled`, `targetTouching`), and the blackboard `targetId`.
pub fn apply_target(agent: &mut GoapAgent, target: Option<&PerceivedEntity>) {
    let source = target.map(|t| t.source);
    agent.set_entity_state("hasTarget", target.is_some());
    agent.set_entity_state("targetVisible", source == Some(SenseSource::Sight));
    agent.set_entity_state("targetHeard", source == Some(SenseSource::Sound));
    agent.set_entity_state("targetSmelled", source == Some(SenseSource::Smell));
    agent.set_entity_state("targetTouching", source == Some(SenseSource::Touch));

    match target {
        Some(t) => agent.set_blackboard("targetId", serde_json::json!(t.id.raw())),
        None => {
            agent.remove_blackboard("targetId");
        }
    }
}

/// Point the agent at its strongest belief; returns the chosen target
pub fn apply_beliefs_to_agent(
    agent: &mut GoapAgent,
    beliefs: &[PerceivedEntity],
    min_confidence: f32,
) -> Option<EntityId> {
    let target = strongest_belief(beliefs, min_confidence);
    apply_target(agent, target);
    target.map(|t| t.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goap::{GoapPlanner, Value};
    use std::sync::Arc;
    use void_math::Vec3;

    fn belief(id: u64, confidence: f32, source: SenseSource) -> PerceivedEntity {
        PerceivedEntity {
            id: EntityId::new(id),
            last_pos: Vec3::new(id as f32, 0.0, 0.0),
            last_seen: 1.5,
            confidence,
            source,
        }
    }

    #[test]
    fn test_threats_skip_weak_beliefs_and_allies() {
        let beliefs = vec![
            belief(2, 0.9, SenseSource::Sight),
            belief(3, 0.3, SenseSource::Sound),
            belief(4, 0.7, SenseSource::Smell),
        ];
        let threats = beliefs_to_threats(&beliefs, 0.5, &[EntityId::new(4)]);
        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].entity, EntityId::new(2));
        assert_eq!(threats[0].threat, 0.9);
        assert_eq!(threats[0].pos, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(threats[0].last_seen, 1.5);
    }

    #[test]
    fn test_strongest_belief() {
        let beliefs = vec![
            belief(5, 0.6, SenseSource::Sound),
            belief(2, 0.6, SenseSource::Sight),
            belief(3, 0.4, SenseSource::Touch),
        ];
        assert_eq!(strongest_belief(&beliefs, 0.5).unwrap().id, EntityId::new(2));
        assert!(strongest_belief(&beliefs, 0.7).is_none());
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let beliefs = vec![belief(2, 0.5, SenseSource::Sight)];
        assert!(beliefs_to_threats(&beliefs, 0.5, &[]).is_empty());
        assert!(strongest_belief(&beliefs, 0.5).is_none());

        let mut agent = GoapAgent::new(EntityId::new(1), Arc::new(GoapPlanner::new()));
        assert_eq!(apply_beliefs_to_agent(&mut agent, &beliefs, 0.5), None);
        assert_eq!(apply_beliefs_to_agent(&mut agent, &beliefs, 0.49), Some(EntityId::new(2)));
    }

    #[test]
    fn test_agent_flags() {
        let mut agent = GoapAgent::new(EntityId::new(1), Arc::new(GoapPlanner::new()));
        let beliefs = vec![belief(8, 0.8, SenseSource::Sound)];

        let target = apply_beliefs_to_agent(&mut agent, &beliefs, 0.5);
        assert_eq!(target, Some(EntityId::new(8)));
        let state = agent.current_state();
        assert_eq!(state.get("hasTarget"), Some(&Value::Bool(true)));
        assert_eq!(state.get("targetHeard"), Some(&Value::Bool(true)));
        assert_eq!(state.get("targetVisible"), Some(&Value::Bool(false)));
        assert_eq!(agent.context().blackboard.get("targetId"), Some(&serde_json::json!(8)));

        assert_eq!(apply_beliefs_to_agent(&mut agent, &[], 0.5), None);
        assert_eq!(agent.current_state().get("hasTarget"), Some(&Value::Bool(false)));
        assert!(agent.context().blackboard.get("targetId").is_none());
    }
}
