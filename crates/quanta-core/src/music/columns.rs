use std::f32::consts::{PI, TAU};

use rand::Rng;
use rand::rngs::SmallRng;

use crate::store::{SpawnKind, Spawner, StateColumns};
use crate::{Position, Velocity};

use super::roles::{RoleTable, Scale, VoiceRole};

/// Music-specific per-particle columns.
#[derive(Debug, Clone)]
pub struct MusicColumns {
    /// Voice role; kept across recycling.
    pub roles: Vec<VoiceRole>,
    /// Timbre variant; kept across recycling.
    pub timbre_indices: Vec<Option<u8>>,
    /// Scale degree the particle sounds.
    pub degrees: Vec<u8>,
    pub charges: Vec<f32>,
    /// Oscillator phase in `(-π, π]`.
    pub phases: Vec<f32>,
    /// Natural angular velocity (rad/s).
    pub frequencies: Vec<f32>,
    pub brightness: Vec<f32>,
    /// Seconds charge has stayed above the discharge threshold.
    pub above_since: Vec<f32>,
    /// Semitone shift set by pitch zones this tick.
    pub transpose: Vec<i8>,
    /// Set by mute zones this tick.
    pub muted: Vec<bool>,
}

impl StateColumns for MusicColumns {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            roles: vec![VoiceRole::Lead; capacity],
            timbre_indices: vec![None; capacity],
            degrees: vec![0; capacity],
            charges: vec![0.0; capacity],
            phases: vec![0.0; capacity],
            frequencies: vec![0.0; capacity],
            brightness: vec![0.0; capacity],
            above_since: vec![0.0; capacity],
            transpose: vec![0; capacity],
            muted: vec![false; capacity],
        }
    }
}

/// Uniform-disk spawn with weighted roles and random oscillator state.
pub struct MusicSpawner<'a> {
    pub roles: &'a RoleTable,
    pub scale: Scale,
    pub radius: f32,
    pub natural_frequency: f32,
    pub frequency_spread: f32,
}

impl Spawner<MusicColumns> for MusicSpawner<'_> {
    fn spawn(
        &self,
        rng: &mut SmallRng,
        slot: usize,
        state: &mut MusicColumns,
        kind: SpawnKind,
    ) -> (Position, Velocity) {
        if kind == SpawnKind::Fresh {
            let role = self.roles.pick(rng.random());
            state.roles[slot] = role;
            let variants = self.roles.spec(role).timbre_variants;
            state.timbre_indices[slot] = (variants > 0).then(|| rng.random_range(0..variants));
        }
        let spec = self.roles.spec(state.roles[slot]);
        let degrees = self.scale.degrees(spec.octave_span).min(u8::MAX as usize) as u8;
        state.degrees[slot] = rng.random_range(0..degrees.max(1));
        state.charges[slot] = rng.random_range(0.0..0.3);
        state.phases[slot] = rng.random_range(-PI..PI);
        state.frequencies[slot] = self.natural_frequency + self.frequency_spread * rng.random_range(-1.0..=1.0);
        state.brightness[slot] = 0.0;
        state.above_since[slot] = 0.0;
        state.transpose[slot] = 0;
        state.muted[slot] = false;

        let r = self.radius.max(0.0) * rng.random::<f32>().sqrt();
        let angle = rng.random_range(0.0..TAU);
        let heading = rng.random_range(0.0..TAU);
        let speed = rng.random_range(0.0..0.15);
        (
            Position::new(r * angle.cos(), r * angle.sin()),
            Velocity::new(speed * heading.cos(), speed * heading.sin()),
        )
    }
}
