//! Population-level music measures: phase synchrony and per-role energy.

use serde::{Deserialize, Serialize};

use super::roles::VoiceRole;

/// Kuramoto order parameter: mean resultant length `R` and mean phase `Ψ`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderParameter {
    pub magnitude: f32,
    pub mean_phase: f32,
}

impl OrderParameter {
    /// Measure over a set of phases; empty input yields zero synchrony.
    #[must_use]
    pub fn measure(phases: &[f32]) -> Self {
        if phases.is_empty() {
            return Self::default();
        }
        let (sum_cos, sum_sin) = phases
            .iter()
            .fold((0.0f32, 0.0f32), |(c, s), theta| (c + theta.cos(), s + theta.sin()));
        let n = phases.len() as f32;
        let (c, s) = (sum_cos / n, sum_sin / n);
        Self {
            magnitude: (c * c + s * s).sqrt().min(1.0),
            mean_phase: s.atan2(c),
        }
    }
}

/// Exponentially decaying note energy per role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleEnergy {
    levels: [f32; 5],
}

impl RoleEnergy {
    pub fn add(&mut self, role: VoiceRole, velocity: f32) {
        self.levels[role.index()] += velocity.max(0.0);
    }

    pub fn decay(&mut self, rate: f32, dt: f32) {
        let factor = (-rate.max(0.0) * dt).exp();
        for level in &mut self.levels {
            *level *= factor;
        }
    }

    #[must_use]
    pub fn get(&self, role: VoiceRole) -> f32 {
        self.levels[role.index()]
    }

    #[must_use]
    pub fn total(&self) -> f32 {
        self.levels.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_phases_are_fully_synchronised() {
        let order = OrderParameter::measure(&[0.4; 16]);
        assert!((order.magnitude - 1.0).abs() < 1e-5);
        assert!((order.mean_phase - 0.4).abs() < 1e-5);
    }

    #[test]
    fn opposed_phases_cancel() {
        let order = OrderParameter::measure(&[0.0, std::f32::consts::PI]);
        assert!(order.magnitude < 1e-5);
        assert_eq!(OrderParameter::measure(&[]).magnitude, 0.0);
    }

    #[test]
    fn role_energy_decays_exponentially() {
        let mut energy = RoleEnergy::default();
        energy.add(VoiceRole::Arp, 1.0);
        energy.decay(1.5, 1.0);
        assert!((energy.get(VoiceRole::Arp) - (-1.5f32).exp()).abs() < 1e-6);
        assert_eq!(energy.get(VoiceRole::Bass), 0.0);
    }
}
