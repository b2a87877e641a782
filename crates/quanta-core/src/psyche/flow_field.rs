//! Coarse vector field over `[-1, 1]²`, refreshed periodically and sampled bilinearly.

use serde::{Deserialize, Serialize};

use crate::Position;
use crate::config::FlowFieldConfig;

use super::archetype::{Archetype, ArchetypeTable};
use super::region::Region;

/// Inputs that vary between refreshes.
#[derive(Debug, Clone, Copy)]
pub struct FieldDrivers<'a> {
    pub time: f32,
    /// Share of the population carrying each archetype, indexed by [`Archetype::index`].
    pub shares: &'a [f32; 6],
    pub archetypes: &'a ArchetypeTable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowField {
    resolution: usize,
    vectors: Vec<(f32, f32)>,
}

impl FlowField {
    /// Zero field with `resolution` nodes per axis (at least 2).
    #[must_use]
    pub fn new(resolution: usize) -> Self {
        let resolution = resolution.max(2);
        Self {
            resolution,
            vectors: vec![(0.0, 0.0); resolution * resolution],
        }
    }

    #[must_use]
    pub const fn resolution(&self) -> usize {
        self.resolution
    }

    /// Row-major node vectors, `y` outer.
    #[must_use]
    pub fn vectors(&self) -> &[(f32, f32)] {
        &self.vectors
    }

    fn node_coord(&self, i: usize) -> f32 {
        -1.0 + 2.0 * i as f32 / (self.resolution - 1) as f32
    }

    /// Blend freshly computed targets into the grid. Non-finite targets leave their node untouched.
    pub fn refresh(&mut self, config: &FlowFieldConfig, drivers: FieldDrivers<'_>) {
        let smoothing = config.smoothing.clamp(0.0, 1.0);
        for row in 0..self.resolution {
            let y = self.node_coord(row);
            for col in 0..self.resolution {
                let x = self.node_coord(col);
                let (tx, ty) = target(config, drivers, x, y);
                if !(tx.is_finite() && ty.is_finite()) {
                    continue;
                }
                let node = &mut self.vectors[row * self.resolution + col];
                node.0 += (tx - node.0) * smoothing;
                node.1 += (ty - node.1) * smoothing;
            }
        }
    }

    /// Bilinear sample; coordinates outside the grid are clamped to its edge.
    #[must_use]
    pub fn sample(&self, p: Position) -> (f32, f32) {
        if !p.is_finite() {
            return (0.0, 0.0);
        }
        let last = (self.resolution - 1) as f32;
        let gx = ((p.x + 1.0) * 0.5 * last).clamp(0.0, last);
        let gy = ((p.y + 1.0) * 0.5 * last).clamp(0.0, last);
        let x0 = (gx.floor() as usize).min(self.resolution - 2);
        let y0 = (gy.floor() as usize).min(self.resolution - 2);
        let (fx, fy) = (gx - x0 as f32, gy - y0 as f32);
        let at = |x: usize, y: usize| self.vectors[y * self.resolution + x];
        let (a, b, c, d) = (at(x0, y0), at(x0 + 1, y0), at(x0, y0 + 1), at(x0 + 1, y0 + 1));
        let lerp = |p: f32, q: f32, t: f32| p + (q - p) * t;
        (
            lerp(lerp(a.0, b.0, fx), lerp(c.0, d.0, fx), fy),
            lerp(lerp(a.1, b.1, fx), lerp(c.1, d.1, fx), fy),
        )
    }
}

fn target(config: &FlowFieldConfig, drivers: FieldDrivers<'_>, x: f32, y: f32) -> (f32, f32) {
    let t = drivers.time;
    let mut u = config.wave_gain * ((2.1 * y + 0.6 * t).sin() + 0.5 * (3.3 * x - 0.9 * t).cos());
    let mut v = config.wave_gain * ((1.7 * x - 0.4 * t).cos() + 0.5 * (2.7 * y + 1.1 * t).sin());

    u -= config.center_pull * x;
    v -= config.center_pull * y;

    let (rx, ry) = match Region::classify(Position::new(x, y)) {
        Region::SelfCore => (-y, x),
        Region::Conscious => (0.6, 0.2 * (0.55 - y)),
        Region::Threshold => (0.0, (3.0 * x + t).sin()),
        Region::Unconscious => (-(y + 0.55), x),
    };
    u += config.region_gain * rx;
    v += config.region_gain * ry;

    for archetype in Archetype::ALL {
        let share = drivers.shares[archetype.index()];
        if share <= 0.0 || !drivers.archetypes.is_enabled(archetype) {
            continue;
        }
        let (fx, fy) = archetype.field(x, y);
        let weight = config.archetype_gain * share;
        u += fx * weight;
        v += fy * weight;
    }

    for attractor in &config.attractors {
        let (dx, dy) = (attractor.position.x - x, attractor.position.y - y);
        let dist = (dx * dx + dy * dy).sqrt();
        if dist >= attractor.radius || dist <= crate::geometry::EPSILON {
            continue;
        }
        let falloff = 1.0 - dist / attractor.radius;
        u += dx / dist * attractor.strength * falloff;
        v += dy / dist * attractor.strength * falloff;
    }
    (u, v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlowAttractor;

    fn drivers<'a>(shares: &'a [f32; 6], table: &'a ArchetypeTable) -> FieldDrivers<'a> {
        FieldDrivers {
            time: 0.0,
            shares,
            archetypes: table,
        }
    }

    #[test]
    fn sampling_interpolates_and_clamps() {
        let mut field = FlowField::new(2);
        field.vectors = vec![(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)];
        let (u, v) = field.sample(Position::new(0.0, 0.0));
        assert!((u - 0.5).abs() < 1e-6 && (v - 0.5).abs() < 1e-6);
        assert_eq!(field.sample(Position::new(5.0, -5.0)), (1.0, 0.0));
        assert_eq!(field.sample(Position::new(f32::NAN, 0.0)), (0.0, 0.0));
    }

    #[test]
    fn refresh_smooths_toward_target() {
        let config = FlowFieldConfig {
            resolution: 8,
            ..FlowFieldConfig::default()
        };
        let table = ArchetypeTable::with_overrides(0.25, &[]);
        let shares = [0.0; 6];
        let mut field = FlowField::new(config.resolution);
        field.refresh(&config, drivers(&shares, &table));
        let first = field.vectors()[10];
        field.refresh(&config, drivers(&shares, &table));
        let second = field.vectors()[10];
        let full = target(&config, drivers(&shares, &table), field.node_coord(2), field.node_coord(1));
        assert!((first.0 - full.0 * config.smoothing).abs() < 1e-5);
        assert!((second.0 - full.0).abs() < (first.0 - full.0).abs() + 1e-6);
    }

    #[test]
    fn attractors_pull_inward() {
        let config = FlowFieldConfig {
            wave_gain: 0.0,
            center_pull: 0.0,
            region_gain: 0.0,
            attractors: vec![FlowAttractor {
                position: Position::new(0.5, 0.5),
                strength: 1.0,
                radius: 0.4,
            }],
            ..FlowFieldConfig::default()
        };
        let table = ArchetypeTable::with_overrides(0.25, &[]);
        let shares = [0.0; 6];
        let (u, v) = target(&config, drivers(&shares, &table), 0.3, 0.5);
        assert!(u > 0.0 && v.abs() < 1e-6);
    }
}
