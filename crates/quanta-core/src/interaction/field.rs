//! Continuous force sources: point fields, painted channels and magnetic rails.

use serde::{Deserialize, Serialize};

use crate::Position;
use crate::geometry::{EPSILON, closest_point_on_segment, direction};

/// Most samples kept per painted channel.
pub const MAX_CHANNEL_SAMPLES: usize = 256;

/// Softening term added to the squared rail distance.
const RAIL_SOFTENING: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    Attractor,
    Repulsor,
    Vortex,
    /// Pulses outward for the first tenth of every period.
    Metronome,
}

/// Radial/tangential point source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointField {
    pub position: Position,
    pub kind: PointKind,
    /// Signed radial strength; positive pulls inward.
    pub strength: f32,
    /// Tangential strength; positive spins counter-clockwise.
    #[serde(default)]
    pub spin: f32,
    pub radius: f32,
    /// Metronome period in seconds.
    #[serde(default = "default_period")]
    pub period: f32,
}

fn default_period() -> f32 {
    0.5
}

impl PointField {
    #[must_use]
    pub fn new(position: Position, kind: PointKind, strength: f32, radius: f32) -> Self {
        Self {
            position,
            kind,
            strength,
            spin: 0.0,
            radius,
            period: default_period(),
        }
    }

    /// Force on a particle at `p`; zero outside the radius.
    #[must_use]
    pub fn force(&self, p: Position, time: f32) -> (f32, f32) {
        let (dir, dist) = direction(p, self.position);
        if dist >= self.radius || dist < EPSILON {
            return (0.0, 0.0);
        }
        let falloff = 1.0 - dist / self.radius;
        let tangent = (dir.1, -dir.0);
        let (radial, spin) = match self.kind {
            PointKind::Attractor => (self.strength.abs(), self.spin),
            PointKind::Repulsor => (-self.strength.abs(), self.spin),
            PointKind::Vortex => (self.strength, if self.spin == 0.0 { 1.0 } else { self.spin }),
            PointKind::Metronome => {
                let beat = if self.period > EPSILON {
                    (time / self.period).fract()
                } else {
                    0.0
                };
                if beat < 0.1 {
                    (-self.strength.abs(), 0.0)
                } else {
                    (0.0, 0.0)
                }
            }
        };
        (
            falloff * (dir.0 * radial + tangent.0 * spin),
            falloff * (dir.1 * radial + tangent.1 * spin),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelSample {
    pub position: Position,
    /// Unit flow direction at this sample.
    pub direction: (f32, f32),
}

/// Painted flow path pushing nearby particles along it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub samples: Vec<ChannelSample>,
    pub radius: f32,
    pub strength: f32,
}

impl Channel {
    /// Build a channel from a painted stroke. Needs at least two distinct points.
    #[must_use]
    pub fn from_path(points: &[Position], radius: f32, strength: f32) -> Option<Self> {
        let points = &points[..points.len().min(MAX_CHANNEL_SAMPLES)];
        if points.len() < 2 {
            return None;
        }
        let mut samples = Vec::with_capacity(points.len());
        for (idx, point) in points.iter().enumerate() {
            let from = points[idx.saturating_sub(1)];
            let to = points[(idx + 1).min(points.len() - 1)];
            let (dir, dist) = direction(from, to);
            if dist < EPSILON {
                continue;
            }
            samples.push(ChannelSample {
                position: *point,
                direction: dir,
            });
        }
        if samples.is_empty() {
            return None;
        }
        Some(Self {
            samples,
            radius,
            strength,
        })
    }

    /// Push along the nearest sample within the radius.
    #[must_use]
    pub fn force(&self, p: Position) -> (f32, f32) {
        let radius_sq = self.radius * self.radius;
        let nearest = self
            .samples
            .iter()
            .map(|sample| (sample, p.distance_sq(sample.position)))
            .filter(|(_, dist_sq)| *dist_sq < radius_sq)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match nearest {
            Some((sample, dist_sq)) => {
                let w = self.strength * (1.0 - dist_sq.sqrt() / self.radius);
                (sample.direction.0 * w, sample.direction.1 * w)
            }
            None => (0.0, 0.0),
        }
    }

    pub(crate) fn truncate(&mut self) {
        self.samples.truncate(MAX_CHANNEL_SAMPLES);
    }
}

/// Segment attracting particles toward its nearest point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rail {
    pub a: Position,
    pub b: Position,
    pub strength: f32,
    /// Ceiling on the force magnitude near the rail.
    pub max_force: f32,
}

impl Rail {
    #[must_use]
    pub fn new(a: Position, b: Position, strength: f32) -> Self {
        Self {
            a,
            b,
            strength,
            max_force: 2.0,
        }
    }

    /// Softened inverse-square pull toward the closest point on the segment.
    #[must_use]
    pub fn force(&self, p: Position) -> (f32, f32) {
        let (closest, _) = closest_point_on_segment(p, self.a, self.b);
        let (dir, dist) = direction(p, closest);
        let magnitude = (self.strength / (dist * dist + RAIL_SOFTENING)).min(self.max_force);
        (dir.0 * magnitude, dir.1 * magnitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attractor_pulls_and_repulsor_pushes() {
        let p = Position::new(0.1, 0.0);
        let attractor = PointField::new(Position::default(), PointKind::Attractor, 1.0, 0.5);
        let repulsor = PointField::new(Position::default(), PointKind::Repulsor, 1.0, 0.5);
        assert!(attractor.force(p, 0.0).0 < 0.0);
        assert!(repulsor.force(p, 0.0).0 > 0.0);
        assert_eq!(attractor.force(Position::new(0.9, 0.0), 0.0), (0.0, 0.0));
    }

    #[test]
    fn metronome_only_pulses_on_the_beat() {
        let metronome = PointField::new(Position::default(), PointKind::Metronome, 1.0, 0.5);
        let p = Position::new(0.1, 0.0);
        assert!(metronome.force(p, 1.01).0 > 0.0);
        assert_eq!(metronome.force(p, 1.2), (0.0, 0.0));
    }

    #[test]
    fn channel_needs_two_distinct_points() {
        assert!(Channel::from_path(&[Position::default()], 0.1, 1.0).is_none());
        let same = [Position::default(), Position::default()];
        assert!(Channel::from_path(&same, 0.1, 1.0).is_none());
        let channel = Channel::from_path(
            &[Position::new(0.0, 0.0), Position::new(0.1, 0.0), Position::new(0.2, 0.0)],
            0.1,
            1.0,
        )
        .expect("channel");
        let (fx, fy) = channel.force(Position::new(0.1, 0.02));
        assert!(fx > 0.0);
        assert!(fy.abs() < 1e-6);
    }

    #[test]
    fn rail_force_is_capped_and_handles_zero_length() {
        let rail = Rail::new(Position::new(-0.5, 0.0), Position::new(0.5, 0.0), 1.0);
        let (_, fy) = rail.force(Position::new(0.0, 0.001));
        assert!(fy < 0.0);
        assert!(fy.abs() <= rail.max_force + 1e-6);
        let dot = Rail::new(Position::default(), Position::default(), 1.0);
        let (fx, fy) = dot.force(Position::new(0.3, 0.0));
        assert!(fx < 0.0 && fx.is_finite() && fy.is_finite());
    }
}
