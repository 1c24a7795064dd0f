//! Ready-made action sets

use super::action::GoapAction;

/// Basic combat catalogue
///
/// Every action succeeds as soon as it runs; hosts that need real behavior
/// rebuild the actions with their own executors.
pub fn combat_actions() -> Vec<GoapAction> {
    vec![
        GoapAction::new("attack", 1.0)
            .with_precondition("hasTarget", true)
            .with_precondition("inRange", true)
            .with_precondition("hasWeapon", true)
            .with_effect("targetDead", true),
        GoapAction::new("moveToTarget", 2.0)
            .with_precondition("hasTarget", true)
            .with_effect("inRange", true),
        GoapAction::new("findTarget", 3.0).with_effect("hasTarget", true),
        GoapAction::new("equipWeapon", 1.0)
            .with_precondition("hasWeaponInInventory", true)
            .with_effect("hasWeapon", true),
        GoapAction::new("heal", 2.0)
            .with_precondition("hasPotion", true)
            .with_precondition("lowHealth", true)
            .with_effect("lowHealth", false),
        GoapAction::new("flee", 5.0)
            .with_precondition("lowHealth", true)
            .with_effect("isSafe", true),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goap::{GoapContext, GoapGoal, GoapPlanner, WorldState};
    use void_core::EntityId;

    #[test]
    fn test_catalogue() {
        let names: Vec<_> = combat_actions().into_iter().map(|a| a.name).collect();
        assert_eq!(
            names,
            vec!["attack", "moveToTarget", "findTarget", "equipWeapon", "heal", "flee"]
        );
    }

    #[test]
    fn test_heal_when_potion_available() {
        let planner = GoapPlanner::new().with_actions(combat_actions());
        let goal = GoapGoal::new("recover", 5.0).with_condition("lowHealth", false);
        let start = WorldState::new()
            .with("lowHealth", true)
            .with("hasPotion", true);
        let plan = planner
            .plan(EntityId::new(1), &start, &goal, &GoapContext::default())
            .unwrap();
        assert_eq!(plan.action_names(), vec!["heal"]);
    }
}
