use std::f32::consts::TAU;

use rand::Rng;
use rand::rngs::SmallRng;

use crate::store::{SpawnKind, Spawner, StateColumns};
use crate::{Position, Velocity};

use super::archetype::Archetype;
use super::region::Region;

/// Centre of the conscious spawn cloud.
const CONSCIOUS_SPAWN: Position = Position::new(0.0, 0.55);
/// Centre of the unconscious spawn cloud.
const UNCONSCIOUS_SPAWN: Position = Position::new(0.0, -0.55);
const CONSCIOUS_SHARE: f32 = 0.6;
const SPAWN_SIGMA: f32 = 0.18;
const SPAWN_LIMIT: f32 = 0.95;
const STATE_JITTER: f32 = 0.1;

/// Copy of one particle's bounded scalars.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InnerState {
    pub charge: f32,
    /// In `[-1, 1]`.
    pub valence: f32,
    pub coherence: f32,
    pub arousal: f32,
    pub inhibition: f32,
}

impl InnerState {
    /// Clamp every field into its documented range.
    pub fn clamp(&mut self) {
        self.charge = crate::clamp01(self.charge);
        self.valence = self.valence.clamp(-1.0, 1.0);
        self.coherence = crate::clamp01(self.coherence);
        self.arousal = crate::clamp01(self.arousal);
        self.inhibition = crate::clamp01(self.inhibition);
    }
}

/// Psyche-specific per-particle columns.
#[derive(Debug, Clone)]
pub struct PsycheColumns {
    pub charges: Vec<f32>,
    pub valences: Vec<f32>,
    pub coherences: Vec<f32>,
    pub arousals: Vec<f32>,
    pub inhibitions: Vec<f32>,
    pub regions: Vec<Region>,
    pub tags: Vec<Option<Archetype>>,
    /// Seconds left before the current tag is released.
    pub tag_timers: Vec<f32>,
    /// Permanent identity hue in `[0, 1)`; never reassigned.
    pub soul_hues: Vec<f32>,
    pub above_since: Vec<f32>,
}

impl StateColumns for PsycheColumns {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            charges: vec![0.0; capacity],
            valences: vec![0.0; capacity],
            coherences: vec![0.0; capacity],
            arousals: vec![0.0; capacity],
            inhibitions: vec![0.0; capacity],
            regions: vec![Region::Threshold; capacity],
            tags: vec![None; capacity],
            tag_timers: vec![0.0; capacity],
            soul_hues: vec![0.0; capacity],
            above_since: vec![0.0; capacity],
        }
    }
}

impl PsycheColumns {
    #[must_use]
    pub fn inner(&self, slot: usize) -> InnerState {
        InnerState {
            charge: self.charges[slot],
            valence: self.valences[slot],
            coherence: self.coherences[slot],
            arousal: self.arousals[slot],
            inhibition: self.inhibitions[slot],
        }
    }

    pub fn set_inner(&mut self, slot: usize, mut state: InnerState) {
        state.clamp();
        self.charges[slot] = state.charge;
        self.valences[slot] = state.valence;
        self.coherences[slot] = state.coherence;
        self.arousals[slot] = state.arousal;
        self.inhibitions[slot] = state.inhibition;
    }
}

/// Standard normal sample via Box-Muller.
fn gaussian(rng: &mut SmallRng) -> f32 {
    let u1: f32 = rng.random_range(f32::EPSILON..1.0);
    let u2: f32 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

/// Region-biased spawn: a conscious cloud above and an unconscious cloud below.
#[derive(Debug, Clone, Copy, Default)]
pub struct PsycheSpawner;

impl Spawner<PsycheColumns> for PsycheSpawner {
    fn spawn(
        &self,
        rng: &mut SmallRng,
        slot: usize,
        state: &mut PsycheColumns,
        kind: SpawnKind,
    ) -> (Position, Velocity) {
        if kind == SpawnKind::Fresh {
            state.soul_hues[slot] = rng.random();
        }
        let center = if rng.random::<f32>() < CONSCIOUS_SHARE {
            CONSCIOUS_SPAWN
        } else {
            UNCONSCIOUS_SPAWN
        };
        let mut p = Position::new(
            center.x + gaussian(rng) * SPAWN_SIGMA,
            center.y + gaussian(rng) * SPAWN_SIGMA,
        );
        let r = (p.x * p.x + p.y * p.y).sqrt();
        if r > SPAWN_LIMIT {
            p = Position::new(p.x / r * SPAWN_LIMIT, p.y / r * SPAWN_LIMIT);
        }

        let region = Region::classify(p);
        let base = region.baseline();
        let mut jitter = || rng.random_range(-STATE_JITTER..=STATE_JITTER);
        let inner = InnerState {
            charge: base.charge + jitter(),
            valence: base.valence + 2.0 * jitter(),
            coherence: base.coherence + jitter(),
            arousal: base.arousal + jitter(),
            inhibition: base.inhibition + jitter(),
        };
        state.set_inner(slot, inner);
        state.regions[slot] = region;
        state.tags[slot] = None;
        state.tag_timers[slot] = 0.0;
        state.above_since[slot] = 0.0;

        let heading = rng.random_range(0.0..TAU);
        let speed = rng.random_range(0.0..0.05);
        (p, Velocity::new(speed * heading.cos(), speed * heading.sin()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ParticleStore;
    use rand::SeedableRng;

    #[test]
    fn spawn_is_region_biased_and_inside_disk() {
        let mut rng = SmallRng::seed_from_u64(9);
        let store: ParticleStore<PsycheColumns> = ParticleStore::create(2_000, 2_000, 0, &PsycheSpawner, &mut rng);
        let upper = store.positions().iter().filter(|p| p.y > 0.0).count();
        assert!((1_050..1_350).contains(&upper), "upper = {upper}");
        for p in store.positions() {
            assert!(p.x * p.x + p.y * p.y <= SPAWN_LIMIT * SPAWN_LIMIT + 1e-4);
        }
        assert!(store.state().valences[..2_000].iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn soul_hue_survives_recycling() {
        let mut rng = SmallRng::seed_from_u64(4);
        let mut store: ParticleStore<PsycheColumns> = ParticleStore::create(8, 8, 0, &PsycheSpawner, &mut rng);
        let hue = store.state().soul_hues[3];
        store.state_mut().tags[3] = Some(Archetype::Hero);
        assert!(store.recycle(3, &PsycheSpawner, &mut rng));
        assert_eq!(store.state().soul_hues[3], hue);
        assert_eq!(store.state().tags[3], None);
    }
}
