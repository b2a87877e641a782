//! Transient spring links between compatible particles.

use quanta_index::NeighborhoodIndex;
use rand::Rng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

use crate::Position;
use crate::config::LinkConfig;
use crate::geometry::EPSILON;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpringLink {
    pub a: usize,
    pub b: usize,
    /// Seconds left before the link dissolves.
    pub ttl: f32,
}

impl SpringLink {
    fn touches(&self, slot: usize) -> bool {
        self.a == slot || self.b == slot
    }
}

/// Read-only particle columns consulted when forming links.
#[derive(Clone, Copy)]
pub struct LinkInputs<'a> {
    pub index: &'a dyn NeighborhoodIndex,
    pub valences: &'a [f32],
    pub coherences: &'a [f32],
}

/// Bounded link list with per-slot degree counters.
#[derive(Debug, Clone, Default)]
pub struct LinkSet {
    links: Vec<SpringLink>,
    degrees: Vec<u8>,
    candidates: Vec<(usize, usize)>,
}

impl LinkSet {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            links: Vec::new(),
            degrees: vec![0; capacity],
            candidates: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    #[must_use]
    pub fn links(&self) -> &[SpringLink] {
        &self.links
    }

    #[must_use]
    pub fn degree(&self, slot: usize) -> u8 {
        self.degrees.get(slot).copied().unwrap_or(0)
    }

    fn release(&mut self, link: SpringLink) {
        for slot in [link.a, link.b] {
            if let Some(degree) = self.degrees.get_mut(slot) {
                *degree = degree.saturating_sub(1);
            }
        }
    }

    fn retain(&mut self, mut keep: impl FnMut(&SpringLink) -> bool) {
        let mut idx = 0;
        while idx < self.links.len() {
            if keep(&self.links[idx]) {
                idx += 1;
            } else {
                let link = self.links.swap_remove(idx);
                self.release(link);
            }
        }
    }

    /// Age links by `dt`; expired links and links touching slots `>= live` are dropped.
    pub fn decay(&mut self, dt: f32, live: usize) {
        for link in &mut self.links {
            link.ttl -= dt;
        }
        self.retain(|link| link.ttl > 0.0 && link.a < live && link.b < live);
    }

    /// Drop every link attached to `slot`.
    pub fn drop_touching(&mut self, slot: usize) {
        self.retain(|link| !link.touches(slot));
    }

    pub fn clear(&mut self) {
        self.links.clear();
        self.degrees.fill(0);
    }

    fn contains(&self, a: usize, b: usize) -> bool {
        self.links
            .iter()
            .any(|link| (link.a == a && link.b == b) || (link.a == b && link.b == a))
    }

    /// Roll for new links between nearby compatible pairs. Returns how many formed.
    pub fn form(&mut self, config: &LinkConfig, inputs: LinkInputs<'_>, rng: &mut SmallRng) -> usize {
        let n = inputs.valences.len().min(inputs.coherences.len());
        if config.probability <= 0.0 || self.links.len() >= config.max_links {
            return 0;
        }
        let radius_sq = config.radius * config.radius;
        self.candidates.clear();
        for i in 0..n {
            if self.degree(i) >= config.max_degree || inputs.coherences[i] <= config.min_coherence {
                continue;
            }
            let candidates = &mut self.candidates;
            inputs.index.neighbors_within(i, radius_sq, &mut |j, _| {
                if j > i && j < n {
                    candidates.push((i, j));
                }
            });
        }

        let mut formed = 0;
        let candidates = std::mem::take(&mut self.candidates);
        for &(a, b) in &candidates {
            if self.links.len() >= config.max_links {
                break;
            }
            if self.degree(a) >= config.max_degree
                || self.degree(b) >= config.max_degree
                || inputs.coherences[b] <= config.min_coherence
                || (inputs.valences[a] - inputs.valences[b]).abs() >= config.max_valence_gap
            {
                continue;
            }
            if rng.random::<f32>() >= config.probability || self.contains(a, b) {
                continue;
            }
            let ttl = rng.random_range(config.ttl_min..=config.ttl_max);
            self.links.push(SpringLink { a, b, ttl });
            for slot in [a, b] {
                if let Some(degree) = self.degrees.get_mut(slot) {
                    *degree += 1;
                }
            }
            formed += 1;
        }
        self.candidates = candidates;
        formed
    }

    /// Add Hookean forces toward the rest length into `forces`.
    pub fn apply_forces(&self, config: &LinkConfig, positions: &[Position], forces: &mut [(f32, f32)]) {
        for link in &self.links {
            let (Some(pa), Some(pb)) = (positions.get(link.a), positions.get(link.b)) else {
                continue;
            };
            let (dx, dy) = (pb.x - pa.x, pb.y - pa.y);
            let dist = (dx * dx + dy * dy).sqrt();
            if dist <= EPSILON {
                continue;
            }
            let pull = config.stiffness * (dist - config.rest_length) / dist;
            let (fx, fy) = (dx * pull, dy * pull);
            if let Some(force) = forces.get_mut(link.a) {
                force.0 += fx;
                force.1 += fy;
            }
            if let Some(force) = forces.get_mut(link.b) {
                force.0 -= fx;
                force.1 -= fy;
            }
        }
    }

    /// Close part of the coherence gap across every link; the pair's sum is preserved.
    pub fn exchange_coherence(&self, config: &LinkConfig, coherences: &mut [f32], dt: f32) {
        let rate = (config.coherence_exchange * dt).clamp(0.0, 0.5);
        for link in &self.links {
            if link.a >= coherences.len() || link.b >= coherences.len() {
                continue;
            }
            let delta = (coherences[link.b] - coherences[link.a]) * rate;
            coherences[link.a] += delta;
            coherences[link.b] -= delta;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quanta_index::UniformGridIndex;
    use rand::SeedableRng;

    fn certain() -> LinkConfig {
        LinkConfig {
            probability: 1.0,
            ttl_min: 1.0,
            ttl_max: 1.0,
            ..LinkConfig::default()
        }
    }

    fn grid(points: &[(f32, f32)]) -> UniformGridIndex {
        let mut index = UniformGridIndex::new(0.1, 1.0);
        index.rebuild(points).expect("rebuild");
        index
    }

    #[test]
    fn formation_respects_degree_and_compatibility() {
        let points: Vec<(f32, f32)> = (0..6).map(|i| (i as f32 * 0.01, 0.0)).collect();
        let index = grid(&points);
        let valences = [0.0, 0.1, 0.0, 0.9, 0.0, 0.0];
        let coherences = [0.9, 0.9, 0.9, 0.9, 0.2, 0.9];
        let mut links = LinkSet::new(6);
        let mut rng = SmallRng::seed_from_u64(3);
        let inputs = LinkInputs {
            index: &index,
            valences: &valences,
            coherences: &coherences,
        };
        let formed = links.form(&certain(), inputs, &mut rng);
        assert!(formed > 0);
        for slot in 0..6 {
            assert!(links.degree(slot) <= 3);
        }
        assert_eq!(links.degree(3), 0);
        assert_eq!(links.degree(4), 0);
        assert_eq!(links.form(&certain(), inputs, &mut rng), 0);
        let mut pairs: Vec<_> = links.links().iter().map(|l| (l.a, l.b)).collect();
        pairs.sort_unstable();
        pairs.dedup();
        assert_eq!(pairs.len(), links.len());
    }

    #[test]
    fn decay_drops_expired_and_out_of_range() {
        let points = [(0.0, 0.0), (0.02, 0.0), (0.04, 0.0)];
        let index = grid(&points);
        let mut links = LinkSet::new(3);
        let mut rng = SmallRng::seed_from_u64(1);
        links.form(
            &certain(),
            LinkInputs {
                index: &index,
                valences: &[0.0; 3],
                coherences: &[0.9; 3],
            },
            &mut rng,
        );
        assert_eq!(links.len(), 3);
        links.decay(0.5, 2);
        assert_eq!(links.len(), 1);
        assert_eq!(links.degree(2), 0);
        links.decay(0.6, 2);
        assert!(links.is_empty());
        assert_eq!(links.degree(0), 0);
    }

    #[test]
    fn spring_pulls_stretched_pair_together() {
        let mut links = LinkSet::new(2);
        links.links.push(SpringLink { a: 0, b: 1, ttl: 1.0 });
        let positions = [Position::new(0.0, 0.0), Position::new(0.2, 0.0)];
        let mut forces = vec![(0.0, 0.0); 2];
        links.apply_forces(&LinkConfig::default(), &positions, &mut forces);
        assert!(forces[0].0 > 0.0);
        assert!((forces[0].0 + forces[1].0).abs() < 1e-6);

        let mut coherences = [0.2, 0.8];
        links.exchange_coherence(&LinkConfig::default(), &mut coherences, 1.0);
        assert!(coherences[0] > 0.2 && coherences[1] < 0.8);
        assert!((coherences[0] + coherences[1] - 1.0).abs() < 1e-6);
        links.drop_touching(1);
        assert!(links.is_empty());
    }
}
