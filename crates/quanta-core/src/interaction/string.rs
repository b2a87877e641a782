//! Resonant strings: reflective segments that ring when struck.

use std::f32::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::geometry::{EPSILON, lerp, reflect, segment_intersection, segment_normal, side_of};
use crate::{Position, Velocity};

/// Vibration frequency in Hz per unit of tension.
const HZ_PER_TENSION: f32 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonicString {
    pub a: Position,
    pub b: Position,
    pub tension: f32,
    /// Exponential amplitude decay rate per second.
    pub decay: f32,
    /// Semitones above the lab root when plucked.
    pub pitch_offset: i32,
    #[serde(skip)]
    pub amplitude: f32,
    #[serde(skip)]
    pub phase: f32,
}

impl HarmonicString {
    #[must_use]
    pub fn new(a: Position, b: Position, tension: f32, pitch_offset: i32) -> Self {
        Self {
            a,
            b,
            tension,
            decay: 2.5,
            pitch_offset,
            amplitude: 0.0,
            phase: 0.0,
        }
    }

    /// Reflect a particle whose path crosses the string and excite the string.
    ///
    /// Returns the strike strength (the particle's pre-impact speed).
    pub fn strike(&mut self, previous: Position, position: &mut Position, velocity: &mut Velocity) -> Option<f32> {
        let t = segment_intersection(previous, *position, self.a, self.b)?;
        let normal = segment_normal(self.a, self.b);
        let sign = if side_of(previous, self.a, self.b) >= 0.0 { 1.0 } else { -1.0 };
        let hit = lerp(previous, *position, t);
        let speed = velocity.speed();
        *velocity = reflect(*velocity, normal);
        *position = Position::new(
            hit.x + normal.0 * sign * EPSILON * 10.0,
            hit.y + normal.1 * sign * EPSILON * 10.0,
        );
        self.amplitude = (self.amplitude + speed * 0.5).min(1.0);
        self.phase = 0.0;
        Some(speed)
    }

    /// Advance the oscillation and decay its amplitude.
    pub fn vibrate(&mut self, dt: f32) {
        self.phase = (self.phase + TAU * HZ_PER_TENSION * self.tension.max(0.0) * dt) % TAU;
        self.amplitude *= (-self.decay.max(0.0) * dt).exp();
        if self.amplitude < 1e-4 {
            self.amplitude = 0.0;
        }
    }

    /// Perpendicular displacement at parameter `s ∈ [0, 1]` along the string, for rendering.
    #[must_use]
    pub fn displacement(&self, s: f32) -> f32 {
        self.amplitude * (PI * s.clamp(0.0, 1.0)).sin() * self.phase.sin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strike_reflects_and_excites() {
        let mut string = HarmonicString::new(Position::new(-0.5, 0.0), Position::new(0.5, 0.0), 1.0, 7);
        let mut pos = Position::new(0.0, -0.05);
        let mut vel = Velocity::new(0.0, -0.6);
        let strength = string
            .strike(Position::new(0.0, 0.05), &mut pos, &mut vel)
            .expect("crossed");
        assert!((strength - 0.6).abs() < 1e-6);
        assert!(pos.y > 0.0);
        assert!((vel.vy - 0.6).abs() < 1e-6);
        assert!(string.amplitude > 0.0);
    }

    #[test]
    fn vibration_decays_to_rest() {
        let mut string = HarmonicString::new(Position::new(-0.5, 0.0), Position::new(0.5, 0.0), 1.0, 0);
        string.amplitude = 1.0;
        for _ in 0..600 {
            string.vibrate(1.0 / 60.0);
        }
        assert_eq!(string.amplitude, 0.0);
        assert_eq!(string.displacement(0.5), 0.0);
    }
}
