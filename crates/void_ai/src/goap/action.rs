//! GOAP actions, goals and the planning context

use super::state::{Value, WorldState};
use futures_util::future::{self, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use void_core::EntityId;

/// Why an action's execution failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    /// The action ran and could not complete
    #[error("Action failed: {0}")]
    Failed(String),

    /// Something outside the action stopped it
    #[error("Action interrupted: {0}")]
    Interrupted(String),
}

/// Outcome of running an action: `Ok(true)` succeeded, `Ok(false)` or
/// `Err(_)` failed
pub type ActionResult = Result<bool, ActionError>;

/// Pending execution of an action
pub type ActionFuture = BoxFuture<'static, ActionResult>;

/// Facts and scratch data an agent plans and acts against
#[derive(Debug, Clone, Default)]
pub struct GoapContext {
    /// Facts shared by everyone
    pub world_state: WorldState,
    /// Facts about this agent; override world facts with the same key
    pub entity_state: WorldState,
    /// Arbitrary keyed data for actions
    pub blackboard: HashMap<String, serde_json::Value>,
}

impl GoapContext {
    /// World facts overlaid with entity facts
    pub fn combined_state(&self) -> WorldState {
        self.world_state.merged(&self.entity_state)
    }
}

type Validator = Box<dyn Fn(EntityId, &GoapContext) -> bool + Send + Sync>;
type DynamicCost = Box<dyn Fn(EntityId, &GoapContext) -> f32 + Send + Sync>;
type Executor = Box<dyn Fn(EntityId, &GoapContext) -> ActionFuture + Send + Sync>;

/// Something an agent can do to change world state
///
/// Definitions are immutable once built and shared between planning calls
/// as `Arc<GoapAction>`.
pub struct GoapAction {
    pub name: String,
    /// Static cost used when no dynamic cost is installed
    pub cost: f32,
    pub preconditions: WorldState,
    pub effects: WorldState,
    executor: Executor,
    validator: Option<Validator>,
    dynamic_cost: Option<DynamicCost>,
}

impl GoapAction {
    /// Create an action that succeeds immediately when executed
    pub fn new(name: impl Into<String>, cost: f32) -> Self {
        Self {
            name: name.into(),
            cost,
            preconditions: WorldState::new(),
            effects: WorldState::new(),
            executor: Box::new(|_: EntityId, _: &GoapContext| future::ready(Ok(true)).boxed()),
            validator: None,
            dynamic_cost: None,
        }
    }

    /// Require a fact before the action can run
    pub fn with_precondition(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.preconditions.set(key, value);
        self
    }

    /// Declare a fact the action makes true
    pub fn with_effect(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.effects.set(key, value);
        self
    }

    /// Install the execution behavior
    ///
    /// The closure receives the acting entity and a snapshot of its context;
    /// the returned future may stay pending across many agent updates.
    pub fn with_executor<F, Fut>(mut self, executor: F) -> Self
    where
        F: Fn(EntityId, &GoapContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        self.executor = Box::new(move |entity: EntityId, ctx: &GoapContext| executor(entity, ctx).boxed());
        self
    }

    /// Exclude the action from planning when the check fails
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(EntityId, &GoapContext) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Compute the cost per planning call instead of using `cost`
    pub fn with_dynamic_cost<F>(mut self, cost: F) -> Self
    where
        F: Fn(EntityId, &GoapContext) -> f32 + Send + Sync + 'static,
    {
        self.dynamic_cost = Some(Box::new(cost));
        self
    }

    /// Whether the action may take part in planning for this entity
    pub fn is_valid(&self, entity: EntityId, ctx: &GoapContext) -> bool {
        self.validator.as_ref().map_or(true, |v| v(entity, ctx))
    }

    /// Cost for this planning call
    pub fn effective_cost(&self, entity: EntityId, ctx: &GoapContext) -> f32 {
        self.dynamic_cost.as_ref().map_or(self.cost, |c| c(entity, ctx))
    }

    /// Start executing the action
    pub fn execute(&self, entity: EntityId, ctx: &GoapContext) -> ActionFuture {
        (self.executor)(entity, ctx)
    }
}

impl fmt::Debug for GoapAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoapAction")
            .field("name", &self.name)
            .field("cost", &self.cost)
            .field("preconditions", &self.preconditions)
            .field("effects", &self.effects)
            .field("has_validator", &self.validator.is_some())
            .field("has_dynamic_cost", &self.dynamic_cost.is_some())
            .finish()
    }
}

/// A desired set of facts
pub struct GoapGoal {
    pub name: String,
    /// Higher priorities are attempted first
    pub priority: f32,
    pub conditions: WorldState,
    validator: Option<Validator>,
}

impl GoapGoal {
    /// Create a goal with no conditions yet
    pub fn new(name: impl Into<String>, priority: f32) -> Self {
        Self {
            name: name.into(),
            priority,
            conditions: WorldState::new(),
            validator: None,
        }
    }

    /// Add a desired fact
    pub fn with_condition(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.set(key, value);
        self
    }

    /// Skip the goal entirely when the check fails
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(EntityId, &GoapContext) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Whether the goal is currently worth pursuing
    pub fn is_valid(&self, entity: EntityId, ctx: &GoapContext) -> bool {
        self.validator.as_ref().map_or(true, |v| v(entity, ctx))
    }
}

impl fmt::Debug for GoapGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoapGoal")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("conditions", &self.conditions)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

/// Shared handle to an action definition
pub type SharedAction = Arc<GoapAction>;

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;

    #[test]
    fn test_default_executor_succeeds() {
        let action = GoapAction::new("wait", 1.0);
        let result = action
            .execute(EntityId::new(1), &GoapContext::default())
            .now_or_never();
        assert_eq!(result, Some(Ok(true)));
    }

    #[test]
    fn test_validator_and_dynamic_cost() {
        let action = GoapAction::new("reload", 2.0)
            .with_validator(|_, ctx| ctx.blackboard.contains_key("magazine"))
            .with_dynamic_cost(|_, ctx| {
                ctx.blackboard
                    .get("reloadCost")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(5.0) as f32
            });

        let mut ctx = GoapContext::default();
        let me = EntityId::new(7);
        assert!(!action.is_valid(me, &ctx));
        assert_eq!(action.effective_cost(me, &ctx), 5.0);

        ctx.blackboard.insert("magazine".into(), serde_json::json!(1));
        ctx.blackboard.insert("reloadCost".into(), serde_json::json!(0.5));
        assert!(action.is_valid(me, &ctx));
        assert_eq!(action.effective_cost(me, &ctx), 0.5);
    }

    #[test]
    fn test_custom_executor_sees_context() {
        let action = GoapAction::new("check", 1.0).with_executor(|entity, ctx| {
            let armed = ctx.entity_state.get("armed") == Some(&Value::Bool(true));
            async move {
                if armed {
                    Ok(true)
                } else {
                    Err(ActionError::Failed(format!("{} is unarmed", entity)))
                }
            }
        });

        let mut ctx = GoapContext::default();
        let result = action.execute(EntityId::new(3), &ctx).now_or_never();
        assert_eq!(result, Some(Err(ActionError::Failed("#3 is unarmed".into()))));

        ctx.entity_state.set("armed", true);
        assert_eq!(action.execute(EntityId::new(3), &ctx).now_or_never(), Some(Ok(true)));
    }

    #[test]
    fn test_combined_state_prefers_entity_facts() {
        let mut ctx = GoapContext::default();
        ctx.world_state.set("alarm", false);
        ctx.world_state.set("night", true);
        ctx.entity_state.set("alarm", true);
        let combined = ctx.combined_state();
        assert_eq!(combined.get("alarm"), Some(&Value::Bool(true)));
        assert_eq!(combined.get("night"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_goal_validator() {
        let goal = GoapGoal::new("survive", 10.0)
            .with_condition("isSafe", true)
            .with_validator(|_, ctx| ctx.entity_state.get("lowHealth") == Some(&Value::Bool(true)));
        let mut ctx = GoapContext::default();
        assert!(!goal.is_valid(EntityId::new(1), &ctx));
        ctx.entity_state.set("lowHealth", true);
        assert!(goal.is_valid(EntityId::new(1), &ctx));
    }
}
