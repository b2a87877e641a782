//! Polygonal FX zones applying one named effect to the particles inside them.

use serde::{Deserialize, Serialize};

use crate::geometry::{EPSILON, point_in_polygon, polygon_bounds, polygon_centroid};
use crate::{Position, Velocity, hash_noise, wrap_signed_angle};

/// Most vertices kept per zone polygon.
pub const MAX_ZONE_VERTICES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FxEffect {
    Slow,
    Fast,
    Mute,
    PitchUp,
    PitchDown,
    Gravity,
    AntiGravity,
    Vortex,
    Attract,
    Repel,
    Freeze,
    Jitter,
    Charge,
    Drain,
    Reverse,
    Brighten,
    Sync,
    Scatter,
    Orbit,
    Wind,
    Retrigger,
}

impl FxEffect {
    pub const ALL: [Self; 21] = [
        Self::Slow,
        Self::Fast,
        Self::Mute,
        Self::PitchUp,
        Self::PitchDown,
        Self::Gravity,
        Self::AntiGravity,
        Self::Vortex,
        Self::Attract,
        Self::Repel,
        Self::Freeze,
        Self::Jitter,
        Self::Charge,
        Self::Drain,
        Self::Reverse,
        Self::Brighten,
        Self::Sync,
        Self::Scatter,
        Self::Orbit,
        Self::Wind,
        Self::Retrigger,
    ];
}

/// Polygon tagged with an effect.
///
/// `strength` scales the effect; `param` is effect-specific (semitones for pitch
/// shifts, target phase for sync, radius for orbit, heading in radians for wind).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxZone {
    pub vertices: Vec<Position>,
    pub effect: FxEffect,
    pub strength: f32,
    #[serde(default)]
    pub param: f32,
    #[serde(skip)]
    bounds: Option<(Position, Position)>,
    #[serde(skip)]
    centroid: Position,
}

/// Per-particle view an effect may mutate. Optional fields are lab-specific.
pub struct ZoneTarget<'a> {
    pub velocity: &'a mut Velocity,
    pub energy: &'a mut f32,
    pub phase: Option<&'a mut f32>,
    pub transpose: Option<&'a mut i8>,
    pub brightness: Option<&'a mut f32>,
    pub muted: Option<&'a mut bool>,
}

/// Side effects the caller must act on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZoneOutcome {
    pub retrigger: bool,
    pub frozen: bool,
}

impl ZoneOutcome {
    fn merge(&mut self, other: Self) {
        self.retrigger |= other.retrigger;
        self.frozen |= other.frozen;
    }
}

impl FxZone {
    #[must_use]
    pub fn new(vertices: Vec<Position>, effect: FxEffect, strength: f32, param: f32) -> Self {
        let mut zone = Self {
            vertices,
            effect,
            strength,
            param,
            bounds: None,
            centroid: Position::default(),
        };
        zone.refresh();
        zone
    }

    /// Clamp the vertex count and recompute cached bounds and centroid.
    pub fn refresh(&mut self) {
        self.vertices.truncate(MAX_ZONE_VERTICES);
        if self.vertices.len() < 3 {
            self.bounds = None;
            return;
        }
        self.bounds = Some(polygon_bounds(&self.vertices));
        self.centroid = polygon_centroid(&self.vertices);
    }

    #[must_use]
    pub fn centroid(&self) -> Position {
        self.centroid
    }

    /// Bounding-box prefilter followed by the exact polygon test.
    #[must_use]
    pub fn contains(&self, p: Position) -> bool {
        match self.bounds {
            Some((min, max)) => {
                p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y && point_in_polygon(p, &self.vertices)
            }
            None => false,
        }
    }

    /// Apply the effect to one particle inside the zone.
    pub fn apply(&self, p: Position, target: &mut ZoneTarget<'_>, dt: f32, slot: usize, tick: u64) -> ZoneOutcome {
        let mut outcome = ZoneOutcome::default();
        let s = self.strength;
        let v = &mut *target.velocity;
        let (radial, tangent, r) = frame(p, self.centroid);
        match self.effect {
            FxEffect::Slow => scale(v, (1.0 - s * dt * 3.0).max(0.0)),
            FxEffect::Fast => scale(v, 1.0 + s * dt * 3.0),
            FxEffect::Mute => {
                if let Some(muted) = target.muted.as_deref_mut() {
                    *muted = true;
                }
            }
            FxEffect::PitchUp | FxEffect::PitchDown => {
                let semitones = if self.param.abs() > EPSILON { self.param.abs() } else { 12.0 };
                let sign = if self.effect == FxEffect::PitchUp { 1.0 } else { -1.0 };
                if let Some(transpose) = target.transpose.as_deref_mut() {
                    *transpose = (sign * semitones).round().clamp(-24.0, 24.0) as i8;
                }
            }
            FxEffect::Gravity => v.vy -= s * dt,
            FxEffect::AntiGravity => v.vy += s * dt,
            FxEffect::Vortex => push(v, tangent, s * dt),
            FxEffect::Attract => push(v, radial, -s * dt),
            FxEffect::Repel => push(v, radial, s * dt),
            FxEffect::Freeze => {
                scale(v, 1.0 - s.clamp(0.0, 1.0));
                outcome.frozen = true;
            }
            FxEffect::Jitter => {
                v.vx += hash_noise(slot, tick, 31) * s * dt;
                v.vy += hash_noise(slot, tick, 32) * s * dt;
            }
            FxEffect::Charge => *target.energy = (*target.energy + s * dt).min(1.0),
            FxEffect::Drain => *target.energy = (*target.energy - s * dt).max(0.0),
            FxEffect::Reverse => scale(v, 1.0 - 2.0 * (s * dt * 10.0).min(1.0)),
            FxEffect::Brighten => {
                if let Some(brightness) = target.brightness.as_deref_mut() {
                    *brightness = brightness.max(s.clamp(0.0, 1.0));
                }
            }
            FxEffect::Sync => {
                if let Some(phase) = target.phase.as_deref_mut() {
                    *phase = wrap_signed_angle(*phase + s * dt * (self.param - *phase).sin());
                }
            }
            FxEffect::Scatter => {
                push(v, radial, s * dt);
                v.vx += hash_noise(slot, tick, 33) * s * dt * 0.5;
                v.vy += hash_noise(slot, tick, 34) * s * dt * 0.5;
            }
            FxEffect::Orbit => {
                let target_radius = if self.param > EPSILON { self.param } else { 0.1 };
                push(v, tangent, s * dt);
                push(v, radial, (target_radius - r) * s * dt * 4.0);
            }
            FxEffect::Wind => {
                v.vx += self.param.cos() * s * dt;
                v.vy += self.param.sin() * s * dt;
            }
            FxEffect::Retrigger => outcome.retrigger = true,
        }
        outcome
    }
}

/// Apply every zone containing `p`, in order.
pub fn apply_zones(
    zones: &[FxZone],
    p: Position,
    target: &mut ZoneTarget<'_>,
    dt: f32,
    slot: usize,
    tick: u64,
) -> ZoneOutcome {
    let mut outcome = ZoneOutcome::default();
    for zone in zones.iter().filter(|zone| zone.contains(p)) {
        outcome.merge(zone.apply(p, target, dt, slot, tick));
    }
    outcome
}

fn frame(p: Position, center: Position) -> ((f32, f32), (f32, f32), f32) {
    let dx = p.x - center.x;
    let dy = p.y - center.y;
    let r = (dx * dx + dy * dy).sqrt();
    if r < EPSILON {
        return ((0.0, 0.0), (0.0, 0.0), r);
    }
    ((dx / r, dy / r), (-dy / r, dx / r), r)
}

fn scale(v: &mut Velocity, factor: f32) {
    v.vx *= factor;
    v.vy *= factor;
}

fn push(v: &mut Velocity, dir: (f32, f32), amount: f32) {
    v.vx += dir.0 * amount;
    v.vy += dir.1 * amount;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(effect: FxEffect, strength: f32, param: f32) -> FxZone {
        FxZone::new(
            vec![
                Position::new(-0.5, -0.5),
                Position::new(0.5, -0.5),
                Position::new(0.5, 0.5),
                Position::new(-0.5, 0.5),
            ],
            effect,
            strength,
            param,
        )
    }

    struct Scratch {
        velocity: Velocity,
        energy: f32,
        phase: f32,
        transpose: i8,
        brightness: f32,
        muted: bool,
    }

    impl Scratch {
        fn new() -> Self {
            Self {
                velocity: Velocity::new(0.2, 0.0),
                energy: 0.5,
                phase: 1.0,
                transpose: 0,
                brightness: 0.0,
                muted: false,
            }
        }

        fn run(&mut self, zone: &FxZone, p: Position) -> ZoneOutcome {
            let mut target = ZoneTarget {
                velocity: &mut self.velocity,
                energy: &mut self.energy,
                phase: Some(&mut self.phase),
                transpose: Some(&mut self.transpose),
                brightness: Some(&mut self.brightness),
                muted: Some(&mut self.muted),
            };
            apply_zones(std::slice::from_ref(zone), p, &mut target, 0.1, 3, 9)
        }
    }

    #[test]
    fn every_effect_keeps_state_finite() {
        for effect in FxEffect::ALL {
            let zone = square(effect, 1.0, 0.5);
            let mut scratch = Scratch::new();
            scratch.run(&zone, Position::new(0.1, 0.2));
            assert!(scratch.velocity.is_finite(), "{effect:?}");
            assert!((0.0..=1.0).contains(&scratch.energy), "{effect:?}");
            assert!(scratch.phase.is_finite(), "{effect:?}");
        }
    }

    #[test]
    fn outside_particles_are_untouched() {
        let zone = square(FxEffect::Freeze, 1.0, 0.0);
        let mut scratch = Scratch::new();
        let outcome = scratch.run(&zone, Position::new(0.7, 0.0));
        assert_eq!(outcome, ZoneOutcome::default());
        assert_eq!(scratch.velocity, Velocity::new(0.2, 0.0));
    }

    #[test]
    fn pitch_and_mute_effects_set_flags() {
        let mut scratch = Scratch::new();
        scratch.run(&square(FxEffect::PitchDown, 1.0, 5.0), Position::default());
        assert_eq!(scratch.transpose, -5);
        scratch.run(&square(FxEffect::PitchUp, 1.0, 0.0), Position::default());
        assert_eq!(scratch.transpose, 12);
        scratch.run(&square(FxEffect::Mute, 1.0, 0.0), Position::default());
        assert!(scratch.muted);
    }

    #[test]
    fn freeze_and_retrigger_report_outcomes() {
        let mut scratch = Scratch::new();
        let outcome = scratch.run(&square(FxEffect::Freeze, 1.0, 0.0), Position::default());
        assert!(outcome.frozen);
        assert_eq!(scratch.velocity, Velocity::new(0.0, 0.0));
        let outcome = scratch.run(&square(FxEffect::Retrigger, 1.0, 0.0), Position::default());
        assert!(outcome.retrigger);
    }

    #[test]
    fn degenerate_polygons_contain_nothing() {
        let zone = FxZone::new(vec![Position::default(), Position::new(1.0, 0.0)], FxEffect::Slow, 1.0, 0.0);
        assert!(!zone.contains(Position::new(0.5, 0.0)));
    }
}
