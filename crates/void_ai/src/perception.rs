//! Perception and sensing system
//!
//! Each registered perceiver owns a belief table: what it thinks it knows
//! about nearby entities, how sure it is, and which sense told it. Beliefs are
//! refreshed by [`PerceptionSystem::upd_perception`] and fade in
//! [`PerceptionSystem::upd`] until they are forgotten.
//!
//! The system never looks at the world directly. Positions, liveness and
//! range queries come from an injected [`EntityProvider`]; occlusion comes
//! from an optional [`LosChecker`].

use crate::config::PerceptionConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use void_core::EntityId;
use void_math::Vec3;

/// A fresh detection only nudges an existing belief when it exceeds this
/// fraction of the belief's confidence.
const REINFORCE_THRESHOLD: f32 = 0.8;
/// Share of a fresh detection's confidence added to an existing belief
const REINFORCE_FACTOR: f32 = 0.1;
/// Smell never yields more than half confidence
const SMELL_CONFIDENCE_SCALE: f32 = 0.5;

/// Sense that produced a belief
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenseSource {
    Sight,
    Sound,
    Smell,
    Touch,
}

/// Sensing ranges for one kind of perceiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionProfile {
    /// Maximum sight distance
    pub view_dist: f32,
    /// Full view cone angle in degrees
    pub view_angle: f32,
    /// Maximum distance at which sounds from a target register
    pub hear_dist: f32,
    /// Maximum smell distance
    pub smell_dist: f32,
}

impl Default for PerceptionProfile {
    fn default() -> Self {
        Self {
            view_dist: 20.0,
            view_angle: 120.0,
            hear_dist: 15.0,
            smell_dist: 10.0,
        }
    }
}

impl PerceptionProfile {
    /// Largest range any sense reaches
    pub fn max_range(&self) -> f32 {
        self.view_dist.max(self.hear_dist).max(self.smell_dist)
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if self.view_dist < 0.0 || self.hear_dist < 0.0 || self.smell_dist < 0.0 {
            return Err("ranges must be non-negative".into());
        }
        if !(0.0..=360.0).contains(&self.view_angle) {
            return Err("view_angle must be within [0, 360] degrees".into());
        }
        Ok(())
    }
}

/// One perceiver's belief about one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceivedEntity {
    /// The target
    pub id: EntityId,
    /// Where the target was when last detected
    pub last_pos: Vec3,
    /// Perception clock time of the last detection
    pub last_seen: f64,
    /// How sure the perceiver is (0.0 - 1.0)
    pub confidence: f32,
    /// Sense behind the current confidence
    pub source: SenseSource,
}

/// Kind of noise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundKind {
    Footstep,
    Attack,
    Voice,
    Explosion,
    Ambient,
}

/// A sound about to be emitted into the world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundEmission {
    pub pos: Vec3,
    /// Audible radius around `pos`
    pub radius: f32,
    /// Loudness multiplier applied to hearing confidence
    pub intensity: f32,
    pub kind: SoundKind,
    /// Entity that made the noise
    pub source_id: EntityId,
}

impl SoundEmission {
    /// Create a sound emission
    pub fn new(source_id: EntityId, pos: Vec3, radius: f32, intensity: f32, kind: SoundKind) -> Self {
        Self {
            pos,
            radius,
            intensity,
            kind,
            source_id,
        }
    }
}

/// A sound that was emitted, stamped with the perception clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundEvent {
    pub pos: Vec3,
    pub radius: f32,
    pub intensity: f32,
    pub kind: SoundKind,
    pub source_id: EntityId,
    pub timestamp: f64,
}

/// Position and orientation of an entity; `rot` holds Euler angles in
/// degrees with yaw in `rot.y`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntityTransform {
    pub pos: Vec3,
    pub rot: Vec3,
}

/// What the world knows about an entity right now
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntitySnapshot {
    pub transform: EntityTransform,
    pub alive: bool,
}

/// Result of a range query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyEntity {
    pub id: EntityId,
    pub pos: Vec3,
}

/// World access supplied by the host simulation
pub trait EntityProvider: Send + Sync {
    /// Look up a single entity
    fn get(&self, id: EntityId) -> Option<EntitySnapshot>;
    /// All entities within `range` of `pos`
    fn get_in_range(&self, pos: Vec3, range: f32) -> Vec<NearbyEntity>;
}

/// Occlusion test supplied by collision or rendering
pub trait LosChecker: Send + Sync {
    /// Whether `to` is visible from `from`
    fn check_los(&self, from: Vec3, to: Vec3) -> bool;
}

/// Check whether `target` lies inside a view cone
///
/// `angle` is the full cone angle in degrees. A target on top of the origin
/// is always inside.
pub fn check_view_cone(origin: Vec3, forward: Vec3, target: Vec3, dist: f32, angle: f32) -> bool {
    let to_target = target - origin;
    let dist_sq = to_target.length_squared();
    if dist_sq > dist * dist {
        return false;
    }
    let len = dist_sq.sqrt();
    if len < 0.001 {
        return true;
    }
    let dot = forward.dot(to_target / len);
    let half_angle = void_math::radians(angle / 2.0);
    dot >= half_angle.cos()
}

#[derive(Debug, Clone, Copy)]
struct Detection {
    source: SenseSource,
    confidence: f32,
}

/// Multi-sense perception for every registered perceiver
pub struct PerceptionSystem {
    profiles: HashMap<String, PerceptionProfile>,
    /// Perceiver -> target -> belief
    perceived: HashMap<EntityId, HashMap<EntityId, PerceivedEntity>>,
    sound_events: Vec<SoundEvent>,
    entity_provider: Option<Arc<dyn EntityProvider>>,
    los_checker: Option<Arc<dyn LosChecker>>,
    sound_ttl: f64,
    decay_rate: f32,
    touch_range: f32,
    /// Perception clock in seconds
    now: f64,
}

impl Default for PerceptionSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl PerceptionSystem {
    /// Create a perception system with stock tuning
    pub fn new() -> Self {
        Self::from_config(&PerceptionConfig::default())
    }

    /// Create a perception system from configuration
    pub fn from_config(config: &PerceptionConfig) -> Self {
        Self {
            profiles: config
                .profiles
                .iter()
                .map(|(id, profile)| (id.clone(), profile.clone()))
                .collect(),
            perceived: HashMap::new(),
            sound_events: Vec::new(),
            entity_provider: None,
            los_checker: None,
            sound_ttl: config.sound_ttl,
            decay_rate: config.decay_rate,
            touch_range: config.touch_range,
            now: 0.0,
        }
    }

    // ========== Configuration ==========

    /// Register or replace a named sensing profile
    pub fn set_profile(&mut self, id: impl Into<String>, profile: PerceptionProfile) {
        self.profiles.insert(id.into(), profile);
    }

    /// Get a profile; unknown ids resolve to the stock profile
    pub fn profile(&self, id: &str) -> PerceptionProfile {
        self.profiles.get(id).cloned().unwrap_or_default()
    }

    /// Install the world access capability
    pub fn set_entity_provider(&mut self, provider: Arc<dyn EntityProvider>) {
        self.entity_provider = Some(provider);
    }

    /// The installed world access, if any
    pub fn entity_provider(&self) -> Option<&Arc<dyn EntityProvider>> {
        self.entity_provider.as_ref()
    }

    /// Install the occlusion capability
    pub fn set_los_checker(&mut self, checker: Arc<dyn LosChecker>) {
        self.los_checker = Some(checker);
    }

    /// Current perception clock in seconds
    pub fn now(&self) -> f64 {
        self.now
    }

    // ========== Perceivers ==========

    /// Give an entity an (empty) belief table
    pub fn register_entity(&mut self, id: EntityId) {
        self.perceived.entry(id).or_default();
    }

    /// Drop an entity's belief table and every belief others hold about it
    pub fn unregister_entity(&mut self, id: EntityId) {
        self.perceived.remove(&id);
        for table in self.perceived.values_mut() {
            table.remove(&id);
        }
    }

    /// Whether an entity has a belief table
    pub fn is_registered(&self, id: EntityId) -> bool {
        self.perceived.contains_key(&id)
    }

    /// Number of registered perceivers
    pub fn perceiver_count(&self) -> usize {
        self.perceived.len()
    }

    // ========== Update ==========

    /// Advance the clock, fade every belief and expire old sounds
    pub fn upd(&mut self, dt: f32) {
        self.now += dt as f64;
        let now = self.now;
        let ttl = self.sound_ttl;
        self.sound_events.retain(|e| now - e.timestamp < ttl);

        let decay = dt * self.decay_rate;
        for table in self.perceived.values_mut() {
            table.retain(|_, belief| {
                belief.confidence -= decay;
                belief.confidence > 0.0
            });
        }
    }

    /// Run every sense for one perceiver and merge the detections into its
    /// belief table
    pub fn upd_perception(&mut self, perceiver: EntityId, profile_id: &str) {
        let Some(provider) = self.entity_provider.clone() else {
            log::trace!("No entity provider; skipping perception for {}", perceiver);
            return;
        };
        let Some(me) = provider.get(perceiver) else {
            return;
        };
        if !me.alive || !self.perceived.contains_key(&perceiver) {
            return;
        }

        let profile = self.profile(profile_id);
        let origin = me.transform.pos;
        let forward = Vec3::forward_from_yaw_degrees(me.transform.rot.y);

        let mut detections = Vec::new();
        for candidate in provider.get_in_range(origin, profile.max_range()) {
            if candidate.id == perceiver {
                continue;
            }
            let Some(target) = provider.get(candidate.id) else {
                continue;
            };
            if !target.alive {
                continue;
            }
            let target_pos = target.transform.pos;
            if let Some(detection) = self.detect(&profile, origin, forward, candidate.id, target_pos) {
                detections.push((candidate.id, target_pos, detection));
            }
        }

        let now = self.now;
        let Some(table) = self.perceived.get_mut(&perceiver) else {
            return;
        };
        for (target_id, target_pos, detection) in detections {
            merge_detection(table, target_id, target_pos, detection, now);
        }
    }

    /// Evaluate sight, sound, smell, then touch for one candidate
    fn detect(
        &self,
        profile: &PerceptionProfile,
        origin: Vec3,
        forward: Vec3,
        target_id: EntityId,
        target_pos: Vec3,
    ) -> Option<Detection> {
        let dist = origin.distance(target_pos);
        let mut detection = None;

        if dist <= profile.view_dist
            && check_view_cone(origin, forward, target_pos, profile.view_dist, profile.view_angle)
            && self.check_los(origin, target_pos)
        {
            detection = Some(Detection {
                source: SenseSource::Sight,
                confidence: 1.0 - dist / profile.view_dist,
            });
        }

        if detection.is_none() && dist <= profile.hear_dist {
            detection = self
                .sound_events
                .iter()
                .filter(|e| e.source_id == target_id && self.now - e.timestamp < self.sound_ttl)
                .find_map(|e| {
                    let sound_dist = origin.distance(e.pos);
                    (sound_dist <= e.radius).then(|| Detection {
                        source: SenseSource::Sound,
                        confidence: (1.0 - sound_dist / e.radius) * e.intensity,
                    })
                });
        }

        if detection.is_none() && dist <= profile.smell_dist {
            detection = Some(Detection {
                source: SenseSource::Smell,
                confidence: (1.0 - dist / profile.smell_dist) * SMELL_CONFIDENCE_SCALE,
            });
        }

        if dist <= self.touch_range {
            detection = Some(Detection {
                source: SenseSource::Touch,
                confidence: 1.0,
            });
        }

        detection
    }

    /// Line of sight; unobstructed when no checker is installed
    pub fn check_los(&self, from: Vec3, to: Vec3) -> bool {
        match &self.los_checker {
            Some(checker) => checker.check_los(from, to),
            None => true,
        }
    }

    /// Emit a sound, stamped with the current clock
    pub fn emit_sound(&mut self, emission: SoundEmission) {
        self.sound_events.push(SoundEvent {
            pos: emission.pos,
            radius: emission.radius,
            intensity: emission.intensity,
            kind: emission.kind,
            source_id: emission.source_id,
            timestamp: self.now,
        });
    }

    /// Sounds still audible
    pub fn sound_events(&self) -> &[SoundEvent] {
        &self.sound_events
    }

    // ========== Queries ==========

    /// All beliefs of a perceiver, ordered by target id
    pub fn get_perceived(&self, perceiver: EntityId) -> Vec<PerceivedEntity> {
        let Some(table) = self.perceived.get(&perceiver) else {
            return Vec::new();
        };
        let mut beliefs: Vec<PerceivedEntity> = table.values().cloned().collect();
        beliefs.sort_by_key(|b| b.id);
        beliefs
    }

    /// Beliefs whose current confidence came from one sense
    pub fn get_perceived_by_source(&self, perceiver: EntityId, source: SenseSource) -> Vec<PerceivedEntity> {
        self.get_perceived(perceiver)
            .into_iter()
            .filter(|b| b.source == source)
            .collect()
    }

    /// The belief the perceiver is most sure about
    pub fn get_highest_confidence(&self, perceiver: EntityId) -> Option<PerceivedEntity> {
        self.get_perceived(perceiver).into_iter().max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    /// The belief whose last known position is closest to the perceiver
    pub fn get_nearest(&self, perceiver: EntityId) -> Option<PerceivedEntity> {
        let provider = self.entity_provider.as_ref()?;
        let me = provider.get(perceiver)?;
        let mut nearest = None;
        let mut min_dist = f32::INFINITY;
        for belief in self.get_perceived(perceiver) {
            let dist = me.transform.pos.distance(belief.last_pos);
            if dist < min_dist {
                min_dist = dist;
                nearest = Some(belief);
            }
        }
        nearest
    }

    /// Drop a single belief
    pub fn forget_entity(&mut self, perceiver: EntityId, target: EntityId) {
        if let Some(table) = self.perceived.get_mut(&perceiver) {
            table.remove(&target);
        }
    }

    /// Drop every belief of a perceiver (the perceiver stays registered)
    pub fn forget_all(&mut self, perceiver: EntityId) {
        if let Some(table) = self.perceived.get_mut(&perceiver) {
            table.clear();
        }
    }

    /// Whether the perceiver holds any belief about the target
    pub fn is_aware_of(&self, perceiver: EntityId, target: EntityId) -> bool {
        self.perceived
            .get(&perceiver)
            .is_some_and(|table| table.contains_key(&target))
    }

    /// Confidence about a target, 0 when unaware
    pub fn awareness_level(&self, perceiver: EntityId, target: EntityId) -> f32 {
        self.perceived
            .get(&perceiver)
            .and_then(|table| table.get(&target))
            .map_or(0.0, |b| b.confidence)
    }
}

fn merge_detection(
    table: &mut HashMap<EntityId, PerceivedEntity>,
    target_id: EntityId,
    target_pos: Vec3,
    detection: Detection,
    now: f64,
) {
    match table.get_mut(&target_id) {
        Some(existing) if existing.confidence >= detection.confidence => {
            existing.last_pos = target_pos;
            existing.last_seen = now;
            if detection.confidence > existing.confidence * REINFORCE_THRESHOLD {
                existing.confidence =
                    (existing.confidence + detection.confidence * REINFORCE_FACTOR).min(1.0);
            }
        }
        _ => {
            table.insert(
                target_id,
                PerceivedEntity {
                    id: target_id,
                    last_pos: target_pos,
                    last_seen: now,
                    confidence: detection.confidence,
                    source: detection.source,
                },
            );
        }
    }
}
