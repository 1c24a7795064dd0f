//! Symbolic world state

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Write};

/// A single fact value
///
/// Equality is exact and never coerces between variants: `Bool(true)` is
/// not equal to `Number(1.0)` or `Text("true")`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// Mapping from fact name to value
///
/// Absent keys are "unknown": they never match any required value, not even
/// `false`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldState {
    facts: BTreeMap<String, Value>,
}

impl WorldState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a fact
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.facts.insert(key.into(), value.into());
    }

    /// Get a fact
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.facts.get(key)
    }

    /// Remove a fact, making it unknown again
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.facts.remove(key)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Facts in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.facts.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether every fact in `conditions` holds here
    pub fn satisfies(&self, conditions: &WorldState) -> bool {
        conditions
            .facts
            .iter()
            .all(|(key, value)| self.facts.get(key) == Some(value))
    }

    /// Number of facts in `conditions` that do not hold here
    pub fn unmet_count(&self, conditions: &WorldState) -> usize {
        conditions
            .facts
            .iter()
            .filter(|(key, value)| self.facts.get(*key) != Some(*value))
            .count()
    }

    /// Overwrite matching keys with `effects`
    pub fn apply(&mut self, effects: &WorldState) {
        for (key, value) in &effects.facts {
            self.facts.insert(key.clone(), value.clone());
        }
    }

    /// Copy of this state with `effects` applied
    pub fn merged(&self, effects: &WorldState) -> WorldState {
        let mut next = self.clone();
        next.apply(effects);
        next
    }

    /// Stable, type-tagged serialization used to detect revisited states
    pub fn canonical_key(&self) -> String {
        let mut key = String::new();
        for (name, value) in &self.facts {
            // Writing to a String cannot fail
            let _ = match value {
                Value::Bool(b) => write!(key, "{:?}=b:{};", name, b),
                Value::Number(n) => write!(key, "{:?}=n:{:?};", name, n),
                Value::Text(s) => write!(key, "{:?}=s:{:?};", name, s),
            };
        }
        key
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for WorldState {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut state = WorldState::new();
        for (k, v) in iter {
            state.set(k, v);
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_cross_type_equality() {
        let state = WorldState::new().with("ammo", 1.0).with("armed", true);
        assert!(!state.satisfies(&WorldState::new().with("ammo", true)));
        assert!(!state.satisfies(&WorldState::new().with("armed", "true")));
        assert!(state.satisfies(&WorldState::new().with("ammo", 1)));
    }

    #[test]
    fn test_absent_is_not_false() {
        let state = WorldState::new();
        let goal = WorldState::new().with("alarmRaised", false);
        assert!(!state.satisfies(&goal));
        assert_eq!(state.unmet_count(&goal), 1);
    }

    #[test]
    fn test_apply_overwrites_only_effect_keys() {
        let state = WorldState::new().with("a", true).with("b", 2.0);
        let next = state.merged(&WorldState::new().with("b", 3.0).with("c", "x"));
        assert_eq!(next.get("a"), Some(&Value::Bool(true)));
        assert_eq!(next.get("b"), Some(&Value::Number(3.0)));
        assert_eq!(next.get("c"), Some(&Value::Text("x".into())));
        // Original untouched
        assert_eq!(state.get("b"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_canonical_key_is_order_independent_and_typed() {
        let a = WorldState::new().with("x", true).with("y", 1.0);
        let b = WorldState::new().with("y", 1.0).with("x", true);
        assert_eq!(a.canonical_key(), b.canonical_key());

        let text = WorldState::new().with("x", "true").with("y", 1.0);
        assert_ne!(a.canonical_key(), text.canonical_key());
    }

    #[test]
    fn test_serde_untagged_values() {
        let state: WorldState =
            serde_json::from_str(r#"{"hasTarget": true, "ammo": 3.0, "stance": "crouch"}"#).unwrap();
        assert_eq!(state.get("hasTarget"), Some(&Value::Bool(true)));
        assert_eq!(state.get("ammo"), Some(&Value::Number(3.0)));
        assert_eq!(state.get("stance"), Some(&Value::Text("crouch".into())));
    }
}
