//! Tactical grid and cover registry
//!
//! The map is shared by every evaluator in a level. Nodes and cover points
//! sit behind `RwLock`s so claims on cover stay exclusive no matter which
//! thread ticks which NPC.

use crate::config::TacticalConfig;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use void_core::EntityId;
use void_math::{Aabb, Vec3};

/// Distance at which visibility drops to zero
const MAX_VISIBILITY_DIST: f32 = 50.0;

/// How much protection a spot offers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoverType {
    #[default]
    None,
    Half,
    Full,
}

impl CoverType {
    /// Scoring weight: 0, 1 or 2
    pub fn weight(self) -> f32 {
        match self {
            CoverType::None => 0.0,
            CoverType::Half => 1.0,
            CoverType::Full => 2.0,
        }
    }
}

/// A claimable position offering protection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverPoint {
    pub id: String,
    pub pos: Vec3,
    pub cover_type: CoverType,
    /// Direction the protected side faces
    pub dir: Vec3,
    /// Entity currently holding the cover
    pub occupied: Option<EntityId>,
    /// Designer-assigned quality
    pub rating: f32,
}

impl CoverPoint {
    pub fn new(id: impl Into<String>, pos: Vec3, cover_type: CoverType, dir: Vec3, rating: f32) -> Self {
        Self {
            id: id.into(),
            pos,
            cover_type,
            dir,
            occupied: None,
            rating,
        }
    }
}

/// One walkable cell of the tactical grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticalNode {
    pub id: String,
    pub pos: Vec3,
    pub cover: CoverType,
    pub visibility: f32,
    pub elevation: f32,
    pub neighbors: Vec<String>,
    pub cover_points: Vec<String>,
}

impl TacticalNode {
    pub fn new(id: impl Into<String>, pos: Vec3) -> Self {
        Self {
            id: id.into(),
            pos,
            cover: CoverType::None,
            visibility: 1.0,
            elevation: pos.z,
            neighbors: Vec::new(),
            cover_points: Vec::new(),
        }
    }
}

/// A hostile entity as seen by the tactical layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatInfo {
    pub entity: EntityId,
    pub pos: Vec3,
    /// Facing of the threat
    pub dir: Vec3,
    /// Danger in [0, 1]
    pub threat: f32,
    /// Seconds timestamp of the last sighting
    pub last_seen: f64,
    pub accuracy: f32,
    pub damage: f32,
}

impl ThreatInfo {
    pub fn new(entity: EntityId, pos: Vec3, threat: f32) -> Self {
        Self {
            entity,
            pos,
            dir: Vec3::ZERO,
            threat,
            last_seen: 0.0,
            accuracy: 0.0,
            damage: 0.0,
        }
    }

    pub fn with_last_seen(mut self, last_seen: f64) -> Self {
        self.last_seen = last_seen;
        self
    }
}

#[derive(Default)]
struct CoverStore {
    points: Vec<CoverPoint>,
    index: HashMap<String, usize>,
}

impl CoverStore {
    fn get_mut(&mut self, id: &str) -> Option<&mut CoverPoint> {
        let idx = *self.index.get(id)?;
        self.points.get_mut(idx)
    }
}

/// Uniform tactical grid plus the level's cover points
pub struct TacticalMap {
    grid_size: f32,
    bounds: Aabb,
    flank_distance: f32,
    /// Nodes by grid cell of their position
    nodes: RwLock<HashMap<(i32, i32), TacticalNode>>,
    covers: RwLock<CoverStore>,
}

impl TacticalMap {
    /// Create an empty map with the given cell size
    pub fn new(grid_size: f32) -> Self {
        let defaults = TacticalConfig::default();
        Self {
            grid_size,
            bounds: defaults.bounds,
            flank_distance: defaults.flank_distance,
            nodes: RwLock::new(HashMap::new()),
            covers: RwLock::new(CoverStore::default()),
        }
    }

    pub fn from_config(config: &TacticalConfig) -> Self {
        Self {
            bounds: config.bounds,
            flank_distance: config.flank_distance,
            ..Self::new(config.grid_size)
        }
    }

    pub fn grid_size(&self) -> f32 {
        self.grid_size
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Grid cell containing `pos`
    pub fn cell(&self, pos: Vec3) -> (i32, i32) {
        (
            (pos.x / self.grid_size).floor() as i32,
            (pos.y / self.grid_size).floor() as i32,
        )
    }

    /// Add a node, replacing any node already in its cell
    pub fn add_node(&self, node: TacticalNode) {
        if !self.bounds.contains_point(node.pos) {
            log::trace!("Tactical node '{}' lies outside the map bounds", node.id);
        }
        let cell = self.cell(node.pos);
        self.nodes.write().insert(cell, node);
    }

    /// Node in the cell containing `pos`
    pub fn node_at(&self, pos: Vec3) -> Option<TacticalNode> {
        self.nodes.read().get(&self.cell(pos)).cloned()
    }

    fn has_node_at(&self, pos: Vec3) -> bool {
        self.nodes.read().contains_key(&self.cell(pos))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Add a cover point; a point with the same id is replaced in place
    pub fn add_cover_point(&self, cover: CoverPoint) {
        let mut guard = self.covers.write();
        let store = &mut *guard;
        if let Some(&idx) = store.index.get(&cover.id) {
            store.points[idx] = cover;
            return;
        }
        store.index.insert(cover.id.clone(), store.points.len());
        store.points.push(cover);
    }

    /// Snapshot of a cover point
    pub fn cover_point(&self, id: &str) -> Option<CoverPoint> {
        let store = self.covers.read();
        store.index.get(id).map(|&idx| store.points[idx].clone())
    }

    /// Snapshot of every cover point in insertion order
    pub fn cover_points(&self) -> Vec<CoverPoint> {
        self.covers.read().points.clone()
    }

    pub fn cover_count(&self) -> usize {
        self.covers.read().points.len()
    }

    /// Closest unoccupied cover strictly nearer than `max_dist`
    pub fn find_nearest_cover(&self, pos: Vec3, max_dist: f32) -> Option<CoverPoint> {
        let store = self.covers.read();
        let mut nearest = None;
        let mut min_dist = max_dist;
        for cover in store.points.iter().filter(|c| c.occupied.is_none()) {
            let dist = pos.distance(cover.pos);
            if dist < min_dist {
                min_dist = dist;
                nearest = Some(cover);
            }
        }
        nearest.cloned()
    }

    /// Highest-scoring unoccupied cover within `max_dist` of `pos`
    ///
    /// Closer cover scores higher; every threat the cover faces away from
    /// adds `10 × weight`, and distant threats add `0.2 × distance`. Ties keep
    /// the earlier cover.
    pub fn find_best_cover(&self, pos: Vec3, threats: &[ThreatInfo], max_dist: f32) -> Option<CoverPoint> {
        let store = self.covers.read();
        let mut best = None;
        let mut best_score = f32::NEG_INFINITY;

        for cover in store.points.iter().filter(|c| c.occupied.is_none()) {
            let dist = pos.distance(cover.pos);
            if dist > max_dist {
                continue;
            }

            let mut score = cover.rating - dist * 0.5;
            for threat in threats {
                let to_threat = cover.pos.direction_to(threat.pos);
                if cover.dir.dot(to_threat) < 0.0 {
                    score += cover.cover_type.weight() * 10.0;
                }
                score += cover.pos.distance(threat.pos) * 0.2;
            }

            if score > best_score {
                best_score = score;
                best = Some(cover);
            }
        }
        best.cloned()
    }

    /// Point beside `target`, perpendicular to the target-to-me axis
    ///
    /// Of the two candidates, only those standing on a node qualify; the one
    /// closer to `my_pos` wins.
    pub fn find_flanking_pos(&self, target: Vec3, my_pos: Vec3) -> Option<Vec3> {
        let perpendicular = target.direction_to(my_pos).perpendicular_xy();
        let offset = perpendicular * self.flank_distance;
        let candidates = [target + offset, target - offset];

        let mut best = None;
        let mut best_dist = f32::INFINITY;
        for pos in candidates {
            let dist = my_pos.distance(pos);
            if self.has_node_at(pos) && dist < best_dist {
                best_dist = dist;
                best = Some(pos);
            }
        }
        best
    }

    /// Visibility falling linearly from 1 to 0 at 50 units
    pub fn visibility(&self, from: Vec3, to: Vec3) -> f32 {
        1.0 - (from.distance(to) / MAX_VISIBILITY_DIST).min(1.0)
    }

    /// Claim a cover point for `entity`
    ///
    /// Fails when the cover is unknown or held by anyone, including `entity`.
    pub fn occupy_cover(&self, id: &str, entity: EntityId) -> bool {
        let mut store = self.covers.write();
        match store.get_mut(id) {
            Some(cover) if cover.occupied.is_none() => {
                cover.occupied = Some(entity);
                log::debug!("{} occupied cover '{}'", entity, id);
                true
            }
            _ => false,
        }
    }

    /// Free a cover point, returning the previous holder
    pub fn release_cover(&self, id: &str) -> Option<EntityId> {
        let mut store = self.covers.write();
        let previous = store.get_mut(id)?.occupied.take();
        if let Some(entity) = previous {
            log::debug!("{} released cover '{}'", entity, id);
        }
        previous
    }

    /// Current holder of a cover point
    pub fn occupant(&self, id: &str) -> Option<EntityId> {
        let store = self.covers.read();
        store.index.get(id).and_then(|&idx| store.points[idx].occupied)
    }
}

impl Default for TacticalMap {
    fn default() -> Self {
        Self::from_config(&TacticalConfig::default())
    }
}

impl std::fmt::Debug for TacticalMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TacticalMap")
            .field("grid_size", &self.grid_size)
            .field("bounds", &self.bounds)
            .field("nodes", &self.node_count())
            .field("covers", &self.cover_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn cover(id: &str, pos: Vec3) -> CoverPoint {
        CoverPoint::new(id, pos, CoverType::Full, Vec3::X, 1.0)
    }

    #[test]
    fn test_cover_exclusivity() {
        let map = TacticalMap::new(2.0);
        map.add_cover_point(cover("c1", Vec3::ZERO));
        let e1 = EntityId::new(1);
        let e2 = EntityId::new(2);

        assert!(map.occupy_cover("c1", e1));
        assert!(!map.occupy_cover("c1", e2));
        assert!(!map.occupy_cover("c1", e1));
        assert_eq!(map.occupant("c1"), Some(e1));

        assert_eq!(map.release_cover("c1"), Some(e1));
        assert!(map.occupy_cover("c1", e2));
        assert_eq!(map.occupant("c1"), Some(e2));

        assert!(!map.occupy_cover("missing", e1));
        assert_eq!(map.release_cover("missing"), None);
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let map = Arc::new(TacticalMap::new(2.0));
        map.add_cover_point(cover("contested", Vec3::ZERO));
        let winners = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for i in 0..8 {
                let map = &map;
                let winners = &winners;
                s.spawn(move || {
                    if map.occupy_cover("contested", EntityId::new(i)) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_best_cover_prefers_facing_away() {
        let map = TacticalMap::new(2.0);
        // Threat sits on +x; "good" faces -x, "bad" faces +x
        map.add_cover_point(CoverPoint::new("bad", Vec3::new(2.0, 0.0, 0.0), CoverType::Full, Vec3::X, 1.0));
        map.add_cover_point(CoverPoint::new("good", Vec3::new(2.0, 1.0, 0.0), CoverType::Full, -Vec3::X, 1.0));
        let threats = [ThreatInfo::new(EntityId::new(9), Vec3::new(20.0, 0.0, 0.0), 0.8)];

        let best = map.find_best_cover(Vec3::ZERO, &threats, 20.0).unwrap();
        assert_eq!(best.id, "good");

        map.occupy_cover("good", EntityId::new(1));
        let best = map.find_best_cover(Vec3::ZERO, &threats, 20.0).unwrap();
        assert_eq!(best.id, "bad");
    }

    #[test]
    fn test_best_cover_respects_range_and_ties() {
        let map = TacticalMap::new(2.0);
        map.add_cover_point(cover("far", Vec3::new(30.0, 0.0, 0.0)));
        assert!(map.find_best_cover(Vec3::ZERO, &[], 20.0).is_none());

        map.add_cover_point(cover("a", Vec3::new(0.0, 5.0, 0.0)));
        map.add_cover_point(cover("b", Vec3::new(5.0, 0.0, 0.0)));
        assert_eq!(map.find_best_cover(Vec3::ZERO, &[], 20.0).unwrap().id, "a");
    }

    #[test]
    fn test_nearest_cover() {
        let map = TacticalMap::new(2.0);
        map.add_cover_point(cover("a", Vec3::new(8.0, 0.0, 0.0)));
        map.add_cover_point(cover("b", Vec3::new(3.0, 0.0, 0.0)));
        assert_eq!(map.find_nearest_cover(Vec3::ZERO, 20.0).unwrap().id, "b");
        assert!(map.find_nearest_cover(Vec3::ZERO, 3.0).is_none());
    }

    #[test]
    fn test_replacing_cover_keeps_order() {
        let map = TacticalMap::new(2.0);
        map.add_cover_point(cover("a", Vec3::ZERO));
        map.add_cover_point(cover("b", Vec3::X));
        map.add_cover_point(cover("a", Vec3::Y));
        let ids: Vec<_> = map.cover_points().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(map.cover_point("a").unwrap().pos, Vec3::Y);
    }

    #[test]
    fn test_node_lookup_by_cell() {
        let map = TacticalMap::new(2.0);
        map.add_node(TacticalNode::new("n", Vec3::new(3.0, 5.0, 0.0)));
        assert_eq!(map.cell(Vec3::new(3.0, 5.0, 0.0)), (1, 2));
        assert!(map.node_at(Vec3::new(2.1, 4.9, 0.0)).is_some());
        assert!(map.node_at(Vec3::new(4.0, 5.0, 0.0)).is_none());
        assert_eq!(map.cell(Vec3::new(-0.5, -0.5, 0.0)), (-1, -1));
    }

    #[test]
    fn test_cover_type_defaults_to_none() {
        assert_eq!(CoverType::default(), CoverType::None);
        assert_eq!(CoverType::default().weight(), 0.0);
        assert_eq!(TacticalNode::new("n", Vec3::ZERO).cover, CoverType::default());
    }

    #[test]
    fn test_flanking_needs_node() {
        let map = TacticalMap::new(2.0);
        let target = Vec3::new(10.0, 0.0, 0.0);
        assert!(map.find_flanking_pos(target, Vec3::ZERO).is_none());

        map.add_node(TacticalNode::new("side", Vec3::new(10.0, 15.0, 0.0)));
        assert_eq!(
            map.find_flanking_pos(target, Vec3::ZERO),
            Some(Vec3::new(10.0, 15.0, 0.0))
        );
    }

    #[test]
    fn test_visibility_falloff() {
        let map = TacticalMap::default();
        assert_eq!(map.visibility(Vec3::ZERO, Vec3::ZERO), 1.0);
        assert!((map.visibility(Vec3::ZERO, Vec3::new(25.0, 0.0, 0.0)) - 0.5).abs() < 1e-6);
        assert_eq!(map.visibility(Vec3::ZERO, Vec3::new(80.0, 0.0, 0.0)), 0.0);
    }
}
