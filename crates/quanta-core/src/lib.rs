//! Core simulation types shared by the Quanta Music and Psyche labs.
//!
//! Both labs own a fixed-capacity struct-of-arrays [`store::ParticleStore`], a set of
//! [`interaction`] objects, and a staged `step()` pipeline that integrates forces,
//! resolves collisions, and hands discrete events to a caller-supplied callback.
//! Renderers and audio layers only ever receive shared references.

use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod config;
pub mod discharge;
pub mod events;
pub mod geometry;
pub mod interaction;
pub mod motion;
pub mod music;
pub mod psyche;
pub mod ring;
pub mod store;

pub use config::{BoundaryPolicy, MusicConfig, PsycheConfig};
pub use events::{NoteEvent, NoteSource, VisualEvent, VisualKind};
pub use interaction::InteractionSet;
pub use motion::{MotionParams, MotionStyle};
pub use music::{MusicLab, MusicTick, VoiceRole};
pub use psyche::{Archetype, Phase, PsycheEvent, PsycheLab, PsycheTick};
pub use ring::RingBuffer;
pub use store::{ParticleStore, SpawnKind, Spawner};

/// Largest `dt` a single step will integrate; longer frames are clamped.
pub const MAX_DT: f32 = 0.1;

/// World-units travelled per second per unit of velocity.
pub const POSITION_SCALE: f32 = 0.5;

/// Hard ceiling on particle slots per store.
pub const MAX_CAPACITY: usize = 8_192;

const FULL_TURN: f32 = std::f32::consts::TAU;
const HALF_TURN: f32 = std::f32::consts::PI;

/// Errors that can occur when constructing a lab.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// High level simulation clock (ticks processed since construction).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The initial tick.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// 2D position in normalized world space.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    /// Construct a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Squared distance to `other`.
    #[must_use]
    pub fn distance_sq(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        self.distance_sq(other).sqrt()
    }

    /// Both coordinates are finite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Velocity in world units per second (before [`POSITION_SCALE`]).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Velocity {
    pub vx: f32,
    pub vy: f32,
}

impl Velocity {
    /// Construct a new velocity vector.
    #[must_use]
    pub const fn new(vx: f32, vy: f32) -> Self {
        Self { vx, vy }
    }

    /// Magnitude of the vector.
    #[must_use]
    pub fn speed(self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }

    /// Both components are finite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.vx.is_finite() && self.vy.is_finite()
    }
}

/// Wrap an angle into `(-π, π]`.
#[must_use]
pub fn wrap_signed_angle(mut angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    angle %= FULL_TURN;
    if angle <= -HALF_TURN {
        angle += FULL_TURN;
    }
    if angle > HALF_TURN {
        angle -= FULL_TURN;
    }
    angle
}

/// Wrap an angle into `[0, 2π)`.
#[must_use]
pub fn wrap_unsigned_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = angle.rem_euclid(FULL_TURN);
    if wrapped >= FULL_TURN { 0.0 } else { wrapped }
}

#[inline]
pub(crate) fn clamp01(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

fn seeded_rng(seed: Option<u64>) -> SmallRng {
    match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => {
            let seed: u64 = rand::random();
            SmallRng::seed_from_u64(seed)
        }
    }
}

/// Deterministic noise in `[-1, 1]` keyed by particle slot, tick and salt.
#[must_use]
pub fn hash_noise(slot: usize, tick: u64, salt: u64) -> f32 {
    let mut z = (slot as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(tick.wrapping_mul(0xBF58_476D_1CE4_E5B9))
        .wrapping_add(salt.wrapping_mul(0x94D0_49BB_1331_11EB));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    ((z >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
}

/// Divergence-free noise field derived from an analytic stream function.
#[must_use]
pub fn curl_noise(x: f32, y: f32, time: f32) -> (f32, f32) {
    // psi = sin(3x + t) cos(3y - 0.7t) + 0.5 sin(5y + 1.3t) cos(4x)
    let a = 3.0 * x + time;
    let b = 3.0 * y - 0.7 * time;
    let c = 5.0 * y + 1.3 * time;
    let d = 4.0 * x;
    let dpsi_dy = -3.0 * a.sin() * b.sin() + 2.5 * c.cos() * d.cos();
    let dpsi_dx = 3.0 * a.cos() * b.cos() - 2.0 * c.sin() * d.sin();
    (dpsi_dy, -dpsi_dx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_angle_wraps_into_half_open_range() {
        assert!((wrap_signed_angle(3.0 * HALF_TURN) - HALF_TURN).abs() < 1e-5);
        assert!((wrap_signed_angle(-0.5) + 0.5).abs() < 1e-6);
        assert_eq!(wrap_signed_angle(f32::NAN), 0.0);
    }

    #[test]
    fn unsigned_angle_wraps_negative_values() {
        let wrapped = wrap_unsigned_angle(-0.25);
        assert!((wrapped - (FULL_TURN - 0.25)).abs() < 1e-5);
    }

    #[test]
    fn hash_noise_is_bounded_and_deterministic() {
        for slot in 0..64 {
            let a = hash_noise(slot, 17, 3);
            assert!((-1.0..=1.0).contains(&a));
            assert_eq!(a, hash_noise(slot, 17, 3));
        }
        assert_ne!(hash_noise(1, 2, 0), hash_noise(2, 1, 0));
    }

    #[test]
    fn curl_noise_is_finite() {
        let (u, v) = curl_noise(0.3, -0.7, 12.5);
        assert!(u.is_finite() && v.is_finite());
    }
}
