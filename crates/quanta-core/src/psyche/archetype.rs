//! Archetype tags: acquisition rules, particle operators and flow-field operators.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ArchetypeOverride;
use crate::{Position, hash_noise};

use super::columns::InnerState;
use super::region::Region;

/// Radius of each archetype's flow-field influence.
const FIELD_RADIUS: f32 = 0.45;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    Shadow,
    Persona,
    Anima,
    Hero,
    Trickster,
    Sage,
}

impl Archetype {
    pub const ALL: [Self; 6] = [
        Self::Shadow,
        Self::Persona,
        Self::Anima,
        Self::Hero,
        Self::Trickster,
        Self::Sage,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Shadow => 0,
            Self::Persona => 1,
            Self::Anima => 2,
            Self::Hero => 3,
            Self::Trickster => 4,
            Self::Sage => 5,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Shadow => "shadow",
            Self::Persona => "persona",
            Self::Anima => "anima",
            Self::Hero => "hero",
            Self::Trickster => "trickster",
            Self::Sage => "sage",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|archetype| archetype.name() == name)
    }

    /// Home position the archetype's operators organise around.
    #[must_use]
    pub const fn anchor(self) -> Position {
        match self {
            Self::Shadow => Position::new(0.0, -0.6),
            Self::Persona => Position::new(0.0, 0.6),
            Self::Anima => Position::new(-0.5, 0.0),
            Self::Hero => Position::new(0.4, 0.45),
            Self::Trickster => Position::new(0.5, -0.2),
            Self::Sage => Position::new(0.0, 0.0),
        }
    }

    #[must_use]
    pub const fn color(self) -> [f32; 3] {
        match self {
            Self::Shadow => [0.35, 0.1, 0.45],
            Self::Persona => [0.85, 0.8, 0.7],
            Self::Anima => [0.9, 0.45, 0.7],
            Self::Hero => [0.95, 0.7, 0.2],
            Self::Trickster => [0.3, 0.9, 0.4],
            Self::Sage => [0.4, 0.6, 0.95],
        }
    }

    /// Force on a tagged particle at `p`, before the gain.
    #[must_use]
    pub fn particle_force(self, p: Position, slot: usize, tick: u64) -> (f32, f32) {
        let anchor = self.anchor();
        let (dx, dy) = (anchor.x - p.x, anchor.y - p.y);
        match self {
            Self::Shadow => (dx * 0.8, dy * 0.8),
            Self::Persona => (dx * 0.6, dy * 0.9),
            // Orbit the anchor counter-clockwise with a weak spring.
            Self::Anima => (-dy * 0.9 + dx * 0.3, dx * 0.9 + dy * 0.3),
            Self::Hero => (dx * 1.2, dy * 1.2),
            Self::Trickster => (
                hash_noise(slot, tick, 71) * 1.5 + dx * 0.2,
                hash_noise(slot, tick, 72) * 1.5 + dy * 0.2,
            ),
            Self::Sage => (dx * 0.5, dy * 0.5),
        }
    }

    /// Per-second drift of a tagged particle's inner state.
    pub fn drift(self, state: &mut InnerState, dt: f32) {
        match self {
            Self::Shadow => {
                state.valence -= 0.08 * dt;
                state.arousal += 0.05 * dt;
                state.coherence -= 0.03 * dt;
            }
            Self::Persona => {
                state.inhibition += 0.06 * dt;
                state.coherence += 0.02 * dt;
            }
            Self::Anima => {
                state.valence += (0.2 - state.valence) * 0.1 * dt;
                state.coherence += 0.04 * dt;
            }
            Self::Hero => {
                state.arousal += 0.05 * dt;
                state.valence += 0.05 * dt;
                state.charge += 0.03 * dt;
            }
            Self::Trickster => {
                state.coherence -= 0.06 * dt;
                state.charge += 0.04 * dt;
            }
            Self::Sage => {
                state.coherence += 0.06 * dt;
                state.arousal -= 0.04 * dt;
            }
        }
    }

    /// Unit-strength flow-field contribution at `(x, y)`; zero outside the influence radius.
    #[must_use]
    pub fn field(self, x: f32, y: f32) -> (f32, f32) {
        let anchor = self.anchor();
        let (dx, dy) = (anchor.x - x, anchor.y - y);
        let dist_sq = dx * dx + dy * dy;
        if dist_sq >= FIELD_RADIUS * FIELD_RADIUS {
            return (0.0, 0.0);
        }
        let falloff = 1.0 - dist_sq.sqrt() / FIELD_RADIUS;
        let (fx, fy) = match self {
            Self::Shadow | Self::Hero | Self::Sage => (dx, dy),
            Self::Persona => (dx * 0.5, dy),
            Self::Anima => (-dy, dx),
            Self::Trickster => (dy - dx, -dx - dy),
        };
        (fx * falloff, fy * falloff)
    }
}

struct AcquisitionRule {
    archetype: Archetype,
    region: Option<Region>,
    test: fn(&InnerState) -> bool,
}

/// Checked in order; the first match wins.
const ACQUISITION_RULES: [AcquisitionRule; 6] = [
    AcquisitionRule {
        archetype: Archetype::Shadow,
        region: Some(Region::Unconscious),
        test: |s| s.valence < -0.35 && s.arousal > 0.6,
    },
    AcquisitionRule {
        archetype: Archetype::Sage,
        region: Some(Region::SelfCore),
        test: |s| s.coherence > 0.75,
    },
    AcquisitionRule {
        archetype: Archetype::Hero,
        region: Some(Region::Conscious),
        test: |s| s.arousal > 0.55 && s.valence > 0.3,
    },
    AcquisitionRule {
        archetype: Archetype::Persona,
        region: Some(Region::Conscious),
        test: |s| s.inhibition > 0.72,
    },
    AcquisitionRule {
        archetype: Archetype::Anima,
        region: Some(Region::Threshold),
        test: |s| s.valence > 0.15 && s.coherence > 0.5,
    },
    AcquisitionRule {
        archetype: Archetype::Trickster,
        region: None,
        test: |s| s.charge > 0.85 && s.coherence < 0.3,
    },
];

/// Per-archetype gain and enable flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeTable {
    gains: [f32; 6],
    enabled: [bool; 6],
}

impl ArchetypeTable {
    /// Every archetype at `gain`, with `overrides` applied; unknown names are logged and skipped.
    #[must_use]
    pub fn with_overrides(gain: f32, overrides: &[ArchetypeOverride]) -> Self {
        let mut table = Self {
            gains: [gain; 6],
            enabled: [true; 6],
        };
        for entry in overrides {
            let Some(archetype) = Archetype::from_name(&entry.archetype) else {
                warn!(archetype = %entry.archetype, "skipping override for unknown archetype");
                continue;
            };
            if let Some(gain) = entry.gain.filter(|g| g.is_finite()) {
                table.gains[archetype.index()] = gain;
            }
            if let Some(enabled) = entry.enabled {
                table.enabled[archetype.index()] = enabled;
            }
        }
        table
    }

    #[must_use]
    pub fn gain(&self, archetype: Archetype) -> f32 {
        self.gains[archetype.index()]
    }

    #[must_use]
    pub fn is_enabled(&self, archetype: Archetype) -> bool {
        self.enabled[archetype.index()]
    }

    /// First enabled archetype whose acquisition rule matches.
    #[must_use]
    pub fn acquire(&self, region: Region, state: &InnerState) -> Option<Archetype> {
        ACQUISITION_RULES
            .iter()
            .filter(|rule| self.is_enabled(rule.archetype))
            .find(|rule| rule.region.is_none_or(|r| r == region) && (rule.test)(state))
            .map(|rule| rule.archetype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(charge: f32, valence: f32, coherence: f32, arousal: f32, inhibition: f32) -> InnerState {
        InnerState {
            charge,
            valence,
            coherence,
            arousal,
            inhibition,
        }
    }

    #[test]
    fn acquisition_follows_rule_order() {
        let table = ArchetypeTable::with_overrides(0.25, &[]);
        let dark = state(0.9, -0.6, 0.2, 0.8, 0.1);
        assert_eq!(table.acquire(Region::Unconscious, &dark), Some(Archetype::Shadow));
        assert_eq!(table.acquire(Region::Threshold, &dark), Some(Archetype::Trickster));

        let bold = state(0.4, 0.5, 0.6, 0.7, 0.9);
        assert_eq!(table.acquire(Region::Conscious, &bold), Some(Archetype::Hero));
        let guarded = state(0.4, 0.0, 0.6, 0.3, 0.9);
        assert_eq!(table.acquire(Region::Conscious, &guarded), Some(Archetype::Persona));
        assert_eq!(table.acquire(Region::SelfCore, &guarded), None);
    }

    #[test]
    fn disabled_archetypes_are_skipped() {
        let table = ArchetypeTable::with_overrides(
            0.25,
            &[
                ArchetypeOverride {
                    archetype: "shadow".into(),
                    enabled: Some(false),
                    ..ArchetypeOverride::default()
                },
                ArchetypeOverride {
                    archetype: "minotaur".into(),
                    gain: Some(9.0),
                    ..ArchetypeOverride::default()
                },
            ],
        );
        let dark = state(0.9, -0.6, 0.2, 0.8, 0.1);
        assert_eq!(table.acquire(Region::Unconscious, &dark), Some(Archetype::Trickster));
        assert!(Archetype::ALL.iter().all(|a| table.gain(*a) == 0.25));
    }

    #[test]
    fn field_vanishes_outside_influence() {
        assert_eq!(Archetype::Hero.field(-0.9, -0.9), (0.0, 0.0));
        let (fx, fy) = Archetype::Shadow.field(0.0, -0.4);
        assert!(fx.abs() < 1e-6 && fy < 0.0);
    }
}
