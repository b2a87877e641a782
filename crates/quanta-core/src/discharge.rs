//! Threshold-and-hold energy discharge shared by both labs.

use quanta_index::NeighborhoodIndex;

use crate::geometry::EPSILON;
use crate::motion::clamp_speed;
use crate::{Position, Velocity};

/// Discharge tuning taken from a lab config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DischargeParams {
    pub threshold: f32,
    /// Seconds the charge must stay at or above `threshold`.
    pub hold: f32,
    pub reset: f32,
    pub radius: f32,
    /// Fraction of the released energy handed to neighbours, `[0, 1]`.
    pub transfer: f32,
    pub impulse: f32,
    pub max_speed: f32,
}

/// Advance hold timers and collect the slots that fire this tick.
pub fn collect_firing(
    params: &DischargeParams,
    charges: &[f32],
    above_since: &mut [f32],
    dt: f32,
    firing: &mut Vec<usize>,
) {
    firing.clear();
    for (slot, (charge, held)) in charges.iter().zip(above_since.iter_mut()).enumerate() {
        if *charge >= params.threshold {
            *held += dt;
            if *held >= params.hold {
                firing.push(slot);
            }
        } else {
            *held = 0.0;
        }
    }
}

/// Release `slot`'s charge into its neighbourhood and reset it. Returns the released energy.
///
/// Each neighbour within the radius gets weight `w = 1 - d/R`, an outward impulse scaled by
/// `w`, and `E·transfer·w / max(Σw, 1)` of charge, so the total handed out never exceeds `E`.
#[allow(clippy::too_many_arguments)]
pub fn release(
    params: &DischargeParams,
    index: &dyn NeighborhoodIndex,
    slot: usize,
    positions: &[Position],
    velocities: &mut [Velocity],
    charges: &mut [f32],
    above_since: &mut [f32],
    scratch: &mut Vec<(usize, f32)>,
) -> f32 {
    let n = positions.len();
    let energy = charges[slot];
    let origin = positions[slot];
    let radius = params.radius;
    scratch.clear();
    if radius > 0.0 {
        index.neighbors_within(slot, radius * radius, &mut |j, dist_sq| {
            if j < n {
                scratch.push((j, dist_sq.into_inner().sqrt()));
            }
        });
    }
    let total_weight: f32 = scratch.iter().map(|(_, d)| 1.0 - d / radius).sum();
    let share = energy * params.transfer / total_weight.max(1.0);
    for &(j, dist) in scratch.iter() {
        let w = 1.0 - dist / radius;
        charges[j] = (charges[j] + share * w).min(1.0);
        if dist > EPSILON {
            let target = positions[j];
            let kick = params.impulse * w / dist;
            let v = velocities[j];
            velocities[j] = clamp_speed(
                Velocity::new(v.vx + (target.x - origin.x) * kick, v.vy + (target.y - origin.y) * kick),
                params.max_speed,
            );
        }
    }
    charges[slot] = params.reset;
    above_since[slot] = 0.0;
    energy
}

#[cfg(test)]
mod tests {
    use super::*;
    use quanta_index::UniformGridIndex;

    fn params() -> DischargeParams {
        DischargeParams {
            threshold: 0.9,
            hold: 0.1,
            reset: 0.08,
            radius: 0.2,
            transfer: 1.0,
            impulse: 0.5,
            max_speed: 1.0,
        }
    }

    #[test]
    fn hold_must_elapse_before_firing() {
        let charges = [0.95, 0.5];
        let mut held = [0.0, 0.3];
        let mut firing = Vec::new();
        collect_firing(&params(), &charges, &mut held, 0.06, &mut firing);
        assert!(firing.is_empty());
        assert_eq!(held[1], 0.0);
        collect_firing(&params(), &charges, &mut held, 0.06, &mut firing);
        assert_eq!(firing, vec![0]);
    }

    #[test]
    fn released_energy_never_exceeds_the_pool() {
        let positions: Vec<Position> = (0..5).map(|i| Position::new(i as f32 * 0.01, 0.0)).collect();
        let points: Vec<(f32, f32)> = positions.iter().map(|p| (p.x, p.y)).collect();
        let mut index = UniformGridIndex::new(0.2, 1.0);
        index.rebuild(&points).expect("rebuild");
        let mut charges = [0.97, 0.0, 0.0, 0.0, 0.0];
        let mut held = [0.2; 5];
        let mut velocities = vec![Velocity::default(); 5];
        let mut scratch = Vec::new();
        let energy = release(
            &params(),
            &index,
            0,
            &positions,
            &mut velocities,
            &mut charges,
            &mut held,
            &mut scratch,
        );
        assert_eq!(energy, 0.97);
        let handed_out: f32 = charges[1..].iter().sum();
        assert!(handed_out > 0.0 && handed_out <= energy + 1e-6);
        assert_eq!(charges[0], 0.08);
        assert_eq!(held[0], 0.0);
        assert!(velocities[1..].iter().all(|v| v.vx > 0.0));
    }
}
