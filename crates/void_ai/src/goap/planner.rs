//! Forward state-space search over symbolic facts
//!
//! The heuristic counts goal conditions that do not hold yet. It ignores
//! action costs, so it is not admissible and the planner does not promise
//! the cheapest plan. Nodes with equal `g + h` are expanded in the order
//! they were generated.

use super::action::{GoapAction, GoapContext, GoapGoal, SharedAction};
use super::state::WorldState;
use crate::config::PlannerConfig;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;
use void_core::EntityId;

/// Default bound on node expansions per planning call
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

/// An ordered sequence of actions reaching a goal
#[derive(Debug, Clone)]
pub struct Plan {
    pub actions: Vec<SharedAction>,
    /// Sum of the effective costs used while planning
    pub cost: f32,
    /// Node expansions the search needed
    pub iterations: usize,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Action names in execution order
    pub fn action_names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name.as_str()).collect()
    }
}

/// Search node stored in the arena
struct PlanNode {
    state: WorldState,
    action: Option<usize>,
    parent: Option<usize>,
    cost: f32,
    heuristic: usize,
}

/// Open-list entry; the heap pops the lowest `f`, then the oldest entry
struct OpenEntry {
    node: usize,
    f_score: f32,
    seq: u64,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_score
            .partial_cmp(&self.f_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// GOAP planner holding the action catalogue
#[derive(Debug)]
pub struct GoapPlanner {
    actions: Vec<SharedAction>,
    max_iterations: usize,
}

impl Default for GoapPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl GoapPlanner {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn from_config(config: &PlannerConfig) -> Self {
        Self::new().with_max_iterations(config.max_iterations)
    }

    /// Bound the number of node expansions per call
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Add an action; accepts either an owned definition or a shared one
    pub fn add_action(&mut self, action: impl Into<SharedAction>) {
        self.actions.push(action.into());
    }

    /// Add several actions at once
    pub fn with_actions(mut self, actions: impl IntoIterator<Item = GoapAction>) -> Self {
        for action in actions {
            self.add_action(action);
        }
        self
    }

    /// Remove the first action with this name
    pub fn remove_action(&mut self, name: &str) -> Option<SharedAction> {
        let idx = self.actions.iter().position(|a| a.name == name)?;
        Some(self.actions.remove(idx))
    }

    pub fn actions(&self) -> &[SharedAction] {
        &self.actions
    }

    /// Search for a sequence of actions turning `current` into a state that
    /// satisfies `goal`
    ///
    /// Returns `None` when the goal is invalid, unreachable, or the search
    /// runs out of iterations. A goal already satisfied yields an empty plan.
    pub fn plan(
        &self,
        entity: EntityId,
        current: &WorldState,
        goal: &GoapGoal,
        ctx: &GoapContext,
    ) -> Option<Plan> {
        if !goal.is_valid(entity, ctx) {
            log::trace!("{}: goal '{}' is not valid", entity, goal.name);
            return None;
        }

        let valid: Vec<&SharedAction> = self
            .actions
            .iter()
            .filter(|a| a.is_valid(entity, ctx))
            .collect();

        let mut arena = vec![PlanNode {
            state: current.clone(),
            action: None,
            parent: None,
            cost: 0.0,
            heuristic: current.unmet_count(&goal.conditions),
        }];

        let mut open = BinaryHeap::new();
        let mut seq = 0u64;
        open.push(OpenEntry {
            node: 0,
            f_score: arena[0].heuristic as f32,
            seq,
        });

        let mut closed: HashSet<String> = HashSet::new();
        let mut iterations = 0;

        while iterations < self.max_iterations {
            let Some(entry) = open.pop() else {
                break;
            };
            iterations += 1;

            let node_idx = entry.node;
            if arena[node_idx].state.satisfies(&goal.conditions) {
                let plan = Self::reconstruct(&arena, &valid, node_idx, iterations);
                log::debug!(
                    "{}: plan for '{}' found in {} iterations: {:?} (cost {})",
                    entity,
                    goal.name,
                    iterations,
                    plan.action_names(),
                    plan.cost
                );
                return Some(plan);
            }

            if !closed.insert(arena[node_idx].state.canonical_key()) {
                continue;
            }

            for (action_idx, action) in valid.iter().enumerate() {
                let node = &arena[node_idx];
                if !node.state.satisfies(&action.preconditions) {
                    continue;
                }
                let next_state = node.state.merged(&action.effects);
                if closed.contains(&next_state.canonical_key()) {
                    continue;
                }

                let cost = node.cost + action.effective_cost(entity, ctx);
                let heuristic = next_state.unmet_count(&goal.conditions);
                arena.push(PlanNode {
                    state: next_state,
                    action: Some(action_idx),
                    parent: Some(node_idx),
                    cost,
                    heuristic,
                });
                seq += 1;
                open.push(OpenEntry {
                    node: arena.len() - 1,
                    f_score: cost + heuristic as f32,
                    seq,
                });
            }
        }

        log::debug!(
            "{}: no plan for '{}' after {} iterations",
            entity,
            goal.name,
            iterations
        );
        None
    }

    fn reconstruct(
        arena: &[PlanNode],
        valid: &[&SharedAction],
        goal_node: usize,
        iterations: usize,
    ) -> Plan {
        let mut actions = Vec::new();
        let mut current = Some(goal_node);
        while let Some(idx) = current {
            let node = &arena[idx];
            if let Some(action_idx) = node.action {
                actions.push(Arc::clone(valid[action_idx]));
            }
            current = node.parent;
        }
        actions.reverse();

        Plan {
            actions,
            cost: arena[goal_node].cost,
            iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goap::presets::combat_actions;

    fn minimal_domain() -> GoapPlanner {
        let mut planner = GoapPlanner::new();
        planner.add_action(
            GoapAction::new("equipWeapon", 1.0)
                .with_precondition("hasWeaponInInventory", true)
                .with_effect("hasWeapon", true),
        );
        planner.add_action(GoapAction::new("findTarget", 3.0).with_effect("hasTarget", true));
        planner.add_action(
            GoapAction::new("moveToTarget", 2.0)
                .with_precondition("hasTarget", true)
                .with_effect("inRange", true),
        );
        planner.add_action(
            GoapAction::new("attack", 1.0)
                .with_precondition("hasTarget", true)
                .with_precondition("inRange", true)
                .with_precondition("hasWeapon", true)
                .with_effect("targetDead", true),
        );
        planner
    }

    fn kill_goal() -> GoapGoal {
        GoapGoal::new("kill", 1.0).with_condition("targetDead", true)
    }

    #[test]
    fn test_minimal_domain_plan() {
        let planner = minimal_domain();
        let start = WorldState::new().with("hasWeaponInInventory", true);
        let plan = planner
            .plan(EntityId::new(1), &start, &kill_goal(), &GoapContext::default())
            .unwrap();

        assert_eq!(plan.len(), 4);
        assert!((plan.cost - 7.0).abs() < f32::EPSILON);

        // Replaying the plan must respect preconditions and reach the goal
        let mut state = start.clone();
        for action in &plan.actions {
            assert!(state.satisfies(&action.preconditions), "{} not applicable", action.name);
            state.apply(&action.effects);
        }
        assert!(state.satisfies(&kill_goal().conditions));
    }

    #[test]
    fn test_unreachable_goal() {
        let planner = minimal_domain();
        let plan = planner.plan(
            EntityId::new(1),
            &WorldState::new(),
            &kill_goal(),
            &GoapContext::default(),
        );
        assert!(plan.is_none());
    }

    #[test]
    fn test_satisfied_goal_gives_empty_plan() {
        let planner = minimal_domain();
        let start = WorldState::new().with("targetDead", true);
        let plan = planner
            .plan(EntityId::new(1), &start, &kill_goal(), &GoapContext::default())
            .unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.iterations, 1);
    }

    #[test]
    fn test_invalid_goal_and_actions() {
        let mut planner = minimal_domain();
        let start = WorldState::new().with("hasWeaponInInventory", true);
        let ctx = GoapContext::default();

        let blocked = kill_goal().with_validator(|_, _| false);
        assert!(planner.plan(EntityId::new(1), &start, &blocked, &ctx).is_none());

        planner.remove_action("equipWeapon");
        planner.add_action(
            GoapAction::new("equipWeapon", 1.0)
                .with_precondition("hasWeaponInInventory", true)
                .with_effect("hasWeapon", true)
                .with_validator(|_, ctx| ctx.blackboard.contains_key("armory")),
        );
        assert!(planner.plan(EntityId::new(1), &start, &kill_goal(), &ctx).is_none());

        let mut ctx = GoapContext::default();
        ctx.blackboard.insert("armory".into(), serde_json::json!(true));
        assert!(planner.plan(EntityId::new(1), &start, &kill_goal(), &ctx).is_some());
    }

    #[test]
    fn test_dynamic_cost_used() {
        let mut planner = GoapPlanner::new();
        planner.add_action(
            GoapAction::new("sprint", 1.0)
                .with_effect("atCover", true)
                .with_dynamic_cost(|_, ctx| {
                    ctx.blackboard
                        .get("fatigue")
                        .and_then(|v| v.as_f64())
                        .unwrap_or(0.0) as f32
                }),
        );
        let goal = GoapGoal::new("cover", 1.0).with_condition("atCover", true);
        let mut ctx = GoapContext::default();
        ctx.blackboard.insert("fatigue".into(), serde_json::json!(4.5));

        let plan = planner
            .plan(EntityId::new(2), &WorldState::new(), &goal, &ctx)
            .unwrap();
        assert_eq!(plan.action_names(), vec!["sprint"]);
        assert!((plan.cost - 4.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_equal_cost_ties_follow_insertion_order() {
        let mut planner = GoapPlanner::new();
        planner.add_action(GoapAction::new("pathA", 1.0).with_effect("done", true));
        planner.add_action(GoapAction::new("pathB", 1.0).with_effect("done", true));
        let goal = GoapGoal::new("done", 1.0).with_condition("done", true);

        for _ in 0..10 {
            let plan = planner
                .plan(EntityId::new(1), &WorldState::new(), &goal, &GoapContext::default())
                .unwrap();
            assert_eq!(plan.action_names(), vec!["pathA"]);
        }
    }

    #[test]
    fn test_iteration_bound() {
        let mut planner = GoapPlanner::new().with_max_iterations(2);
        planner.add_action(GoapAction::new("a", 1.0).with_effect("a", true));
        planner.add_action(
            GoapAction::new("b", 1.0)
                .with_precondition("a", true)
                .with_effect("b", true),
        );
        planner.add_action(
            GoapAction::new("c", 1.0)
                .with_precondition("b", true)
                .with_effect("c", true),
        );
        let goal = GoapGoal::new("c", 1.0).with_condition("c", true);
        let ctx = GoapContext::default();
        assert!(planner.plan(EntityId::new(1), &WorldState::new(), &goal, &ctx).is_none());

        let planner = GoapPlanner {
            max_iterations: 10,
            ..planner
        };
        let plan = planner
            .plan(EntityId::new(1), &WorldState::new(), &goal, &ctx)
            .unwrap();
        assert_eq!(plan.action_names(), vec!["a", "b", "c"]);
        assert!(plan.iterations <= 10);
    }

    #[test]
    fn test_combat_presets_plan_flee() {
        let planner = GoapPlanner::new().with_actions(combat_actions());
        let goal = GoapGoal::new("survive", 10.0).with_condition("isSafe", true);
        let start = WorldState::new().with("lowHealth", true);
        let plan = planner
            .plan(EntityId::new(1), &start, &goal, &GoapContext::default())
            .unwrap();
        assert_eq!(plan.action_names(), vec!["flee"]);
        assert!((plan.cost - 5.0).abs() < f32::EPSILON);
    }
}
