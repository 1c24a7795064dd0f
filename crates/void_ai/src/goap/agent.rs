//! Goal-driven agent that replans periodically and executes its plan

use super::action::{ActionFuture, ActionResult, GoapContext, GoapGoal, SharedAction};
use super::planner::GoapPlanner;
use super::state::{Value, WorldState};
use crate::config::AgentConfig;
use futures_util::task::noop_waker_ref;
use futures_util::FutureExt;
use std::sync::Arc;
use std::task::{Context, Poll};
use void_core::EntityId;

/// Default seconds between replans
pub const DEFAULT_REPLAN_INTERVAL: f64 = 1.0;

/// Cancelled executions kept polling before the oldest is dropped
pub const MAX_DETACHED: usize = 16;

/// Something that happened during an agent update
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A new plan was installed
    Replanned { goal: String, steps: usize },
    /// No goal produced a plan
    NoPlan,
    ActionStarted(String),
    ActionSucceeded(String),
    /// The action failed and the rest of the plan was dropped
    ActionFailed { action: String, reason: String },
    /// The last action of the plan succeeded
    PlanCompleted,
    /// A cancelled action finished; its outcome was ignored
    ResultDiscarded(String),
}

/// An action whose execution has not resolved yet
struct InFlight {
    action: SharedAction,
    future: ActionFuture,
    epoch: u64,
}

impl InFlight {
    fn poll(&mut self) -> Poll<ActionResult> {
        let mut cx = Context::from_waker(noop_waker_ref());
        self.future.poll_unpin(&mut cx)
    }
}

/// GOAP agent bound to one entity
pub struct GoapAgent {
    entity: EntityId,
    planner: Arc<GoapPlanner>,
    goals: Vec<GoapGoal>,
    plan: Vec<SharedAction>,
    cursor: usize,
    ctx: GoapContext,
    in_flight: Option<InFlight>,
    /// Cancelled executions still running
    detached: Vec<InFlight>,
    epoch: u64,
    replan_interval: f64,
    last_replan: f64,
}

impl GoapAgent {
    pub fn new(entity: EntityId, planner: Arc<GoapPlanner>) -> Self {
        Self {
            entity,
            planner,
            goals: Vec::new(),
            plan: Vec::new(),
            cursor: 0,
            ctx: GoapContext::default(),
            in_flight: None,
            detached: Vec::new(),
            epoch: 0,
            replan_interval: DEFAULT_REPLAN_INTERVAL,
            last_replan: 0.0,
        }
    }

    pub fn from_config(entity: EntityId, planner: Arc<GoapPlanner>, config: &AgentConfig) -> Self {
        Self::new(entity, planner).with_replan_interval(config.replan_interval)
    }

    /// Seconds between periodic replans
    pub fn with_replan_interval(mut self, seconds: f64) -> Self {
        self.replan_interval = seconds;
        self
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn planner(&self) -> &Arc<GoapPlanner> {
        &self.planner
    }

    /// Add a goal; goals stay sorted by descending priority, equal
    /// priorities in insertion order
    pub fn add_goal(&mut self, goal: GoapGoal) {
        let idx = self
            .goals
            .iter()
            .position(|g| g.priority < goal.priority)
            .unwrap_or(self.goals.len());
        self.goals.insert(idx, goal);
    }

    /// Remove the first goal with this name
    pub fn remove_goal(&mut self, name: &str) -> Option<GoapGoal> {
        let idx = self.goals.iter().position(|g| g.name == name)?;
        Some(self.goals.remove(idx))
    }

    pub fn goals(&self) -> &[GoapGoal] {
        &self.goals
    }

    pub fn set_world_state(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.ctx.world_state.set(key, value);
    }

    pub fn set_entity_state(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.ctx.entity_state.set(key, value);
    }

    pub fn set_blackboard(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.ctx.blackboard.insert(key.into(), value);
    }

    pub fn remove_blackboard(&mut self, key: &str) -> Option<serde_json::Value> {
        self.ctx.blackboard.remove(key)
    }

    pub fn context(&self) -> &GoapContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut GoapContext {
        &mut self.ctx
    }

    /// World facts overlaid with this entity's facts
    pub fn current_state(&self) -> WorldState {
        self.ctx.combined_state()
    }

    /// The action the plan cursor points at
    pub fn current_action(&self) -> Option<&SharedAction> {
        self.plan.get(self.cursor)
    }

    pub fn plan(&self) -> &[SharedAction] {
        &self.plan
    }

    /// Whether an action of the current plan is running
    pub fn is_executing(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Drop the plan now
    ///
    /// A running action is left to finish on its own; its result will be
    /// discarded. At most [`MAX_DETACHED`] such actions are kept, after
    /// which the oldest is dropped without ever resolving.
    pub fn cancel_plan(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            log::debug!("{}: cancelling '{}' in flight", self.entity, flight.action.name);
            if self.detached.len() >= MAX_DETACHED {
                let oldest = self.detached.remove(0);
                log::warn!(
                    "{}: dropping unresolved cancelled action '{}'",
                    self.entity,
                    oldest.action.name
                );
            }
            self.detached.push(flight);
        }
        self.clear_plan();
    }

    /// Cancelled actions that have not resolved yet
    pub fn detached_count(&self) -> usize {
        self.detached.len()
    }

    /// Advance the agent to time `now` (seconds)
    ///
    /// Resolves finished executions, replans when the interval elapsed or no
    /// plan is held, and starts the next action when idle. Replanning waits
    /// while an action is running.
    pub fn upd(&mut self, now: f64) -> Vec<AgentEvent> {
        let mut events = Vec::new();

        self.poll_detached(&mut events);

        if let Some(mut flight) = self.in_flight.take() {
            match flight.poll() {
                Poll::Pending => {
                    self.in_flight = Some(flight);
                    return events;
                }
                Poll::Ready(result) => self.finish(flight, result, &mut events),
            }
        }

        if now - self.last_replan >= self.replan_interval || self.plan.is_empty() {
            self.replan(&mut events);
            self.last_replan = now;
        }

        if !self.plan.is_empty() {
            self.dispatch(&mut events);
        }

        events
    }

    fn poll_detached(&mut self, events: &mut Vec<AgentEvent>) {
        let entity = self.entity;
        self.detached.retain_mut(|flight| match flight.poll() {
            Poll::Pending => true,
            Poll::Ready(_) => {
                log::trace!("{}: discarded result of '{}'", entity, flight.action.name);
                events.push(AgentEvent::ResultDiscarded(flight.action.name.clone()));
                false
            }
        });
    }

    fn replan(&mut self, events: &mut Vec<AgentEvent>) {
        let state = self.current_state();
        for goal in &self.goals {
            if !goal.is_valid(self.entity, &self.ctx) {
                continue;
            }
            let Some(plan) = self.planner.plan(self.entity, &state, goal, &self.ctx) else {
                continue;
            };
            if plan.is_empty() {
                continue;
            }

            log::debug!(
                "{}: installing plan for '{}': {:?}",
                self.entity,
                goal.name,
                plan.action_names()
            );
            events.push(AgentEvent::Replanned {
                goal: goal.name.clone(),
                steps: plan.len(),
            });
            self.plan = plan.actions;
            self.cursor = 0;
            self.epoch += 1;
            return;
        }

        log::trace!("{}: no plan for any goal", self.entity);
        events.push(AgentEvent::NoPlan);
        self.clear_plan();
    }

    fn dispatch(&mut self, events: &mut Vec<AgentEvent>) {
        let Some(action) = self.plan.get(self.cursor).cloned() else {
            self.clear_plan();
            return;
        };

        log::debug!("{}: starting '{}'", self.entity, action.name);
        events.push(AgentEvent::ActionStarted(action.name.clone()));

        let mut flight = InFlight {
            future: action.execute(self.entity, &self.ctx),
            action,
            epoch: self.epoch,
        };
        match flight.poll() {
            Poll::Pending => self.in_flight = Some(flight),
            Poll::Ready(result) => self.finish(flight, result, events),
        }
    }

    fn finish(&mut self, flight: InFlight, result: ActionResult, events: &mut Vec<AgentEvent>) {
        let name = flight.action.name.clone();
        if flight.epoch != self.epoch {
            events.push(AgentEvent::ResultDiscarded(name));
            return;
        }

        let reason = match result {
            Ok(true) => {
                self.ctx.entity_state.apply(&flight.action.effects);
                self.cursor += 1;
                log::debug!("{}: '{}' succeeded", self.entity, name);
                events.push(AgentEvent::ActionSucceeded(name));
                if self.cursor >= self.plan.len() {
                    self.clear_plan();
                    events.push(AgentEvent::PlanCompleted);
                }
                return;
            }
            Ok(false) => "action reported failure".to_string(),
            Err(e) => e.to_string(),
        };

        log::warn!("{}: '{}' failed: {}", self.entity, name, reason);
        events.push(AgentEvent::ActionFailed {
            action: name,
            reason,
        });
        self.clear_plan();
    }

    fn clear_plan(&mut self) {
        self.plan.clear();
        self.cursor = 0;
        self.epoch += 1;
    }
}

impl std::fmt::Debug for GoapAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoapAgent")
            .field("entity", &self.entity)
            .field("goals", &self.goals.len())
            .field("plan", &self.plan.iter().map(|a| a.name.as_str()).collect::<Vec<_>>())
            .field("cursor", &self.cursor)
            .field("executing", &self.in_flight.is_some())
            .finish()
    }
}
