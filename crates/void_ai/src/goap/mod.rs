//! Goal-oriented action planning
//!
//! [`GoapPlanner`] searches for an action sequence reaching a goal;
//! [`GoapAgent`] owns goals and a plan and executes it one action at a time.

pub mod action;
pub mod agent;
pub mod planner;
pub mod presets;
pub mod state;

pub use action::{
    ActionError, ActionFuture, ActionResult, GoapAction, GoapContext, GoapGoal, SharedAction,
};
pub use agent::{AgentEvent, GoapAgent};
pub use planner::{GoapPlanner, Plan};
pub use presets::combat_actions;
pub use state::{Value, WorldState};
