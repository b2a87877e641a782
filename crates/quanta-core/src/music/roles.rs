//! Voice roles, scales and consonance.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::RoleOverride;

/// Instrument voice a particle speaks with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceRole {
    Bass,
    Pad,
    Lead,
    Arp,
    Percussion,
}

impl VoiceRole {
    pub const ALL: [Self; 5] = [Self::Bass, Self::Pad, Self::Lead, Self::Arp, Self::Percussion];

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Bass => 0,
            Self::Pad => 1,
            Self::Lead => 2,
            Self::Arp => 3,
            Self::Percussion => 4,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bass => "bass",
            Self::Pad => "pad",
            Self::Lead => "lead",
            Self::Arp => "arp",
            Self::Percussion => "percussion",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.name() == name)
    }
}

/// Per-role synthesis and spawn parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoleSpec {
    /// Semitones above the lab root.
    pub base_pitch: i32,
    /// Octaves of scale degrees a particle may be assigned.
    pub octave_span: u8,
    /// Note duration in seconds.
    pub duration: f32,
    /// Relative share of spawned particles.
    pub weight: f32,
    pub timbre: f32,
    pub color: [f32; 3],
    /// Distinct timbre variants handed out per particle; 0 means none.
    pub timbre_variants: u8,
}

/// Specs for every role, indexed by [`VoiceRole::index`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleTable {
    specs: [RoleSpec; 5],
}

impl Default for RoleTable {
    fn default() -> Self {
        Self {
            specs: [
                RoleSpec {
                    base_pitch: -12,
                    octave_span: 1,
                    duration: 1.2,
                    weight: 0.15,
                    timbre: 0.2,
                    color: [0.25, 0.35, 0.95],
                    timbre_variants: 2,
                },
                RoleSpec {
                    base_pitch: 0,
                    octave_span: 2,
                    duration: 2.5,
                    weight: 0.2,
                    timbre: 0.35,
                    color: [0.55, 0.35, 0.85],
                    timbre_variants: 3,
                },
                RoleSpec {
                    base_pitch: 12,
                    octave_span: 2,
                    duration: 0.6,
                    weight: 0.25,
                    timbre: 0.6,
                    color: [0.95, 0.75, 0.3],
                    timbre_variants: 4,
                },
                RoleSpec {
                    base_pitch: 24,
                    octave_span: 1,
                    duration: 0.25,
                    weight: 0.25,
                    timbre: 0.75,
                    color: [0.3, 0.9, 0.7],
                    timbre_variants: 4,
                },
                RoleSpec {
                    base_pitch: 0,
                    octave_span: 1,
                    duration: 0.12,
                    weight: 0.15,
                    timbre: 0.9,
                    color: [0.95, 0.35, 0.35],
                    timbre_variants: 8,
                },
            ],
        }
    }
}

impl RoleTable {
    /// Defaults with `overrides` applied; unknown role names are logged and skipped.
    #[must_use]
    pub fn with_overrides(overrides: &[RoleOverride]) -> Self {
        let mut table = Self::default();
        for entry in overrides {
            let Some(role) = VoiceRole::from_name(&entry.role) else {
                warn!(role = %entry.role, "skipping override for unknown voice role");
                continue;
            };
            let spec = &mut table.specs[role.index()];
            if let Some(base_pitch) = entry.base_pitch {
                spec.base_pitch = base_pitch;
            }
            if let Some(octave_span) = entry.octave_span {
                spec.octave_span = octave_span.max(1);
            }
            if let Some(duration) = entry.duration.filter(|d| d.is_finite() && *d > 0.0) {
                spec.duration = duration;
            }
            if let Some(weight) = entry.weight.filter(|w| w.is_finite() && *w >= 0.0) {
                spec.weight = weight;
            }
            if let Some(timbre) = entry.timbre {
                spec.timbre = crate::clamp01(timbre);
            }
            if let Some(color) = entry.color {
                spec.color = color;
            }
        }
        table
    }

    #[must_use]
    pub fn spec(&self, role: VoiceRole) -> &RoleSpec {
        &self.specs[role.index()]
    }

    /// Pick a role from a uniform sample `u ∈ [0, 1)` by spawn weight.
    #[must_use]
    pub fn pick(&self, u: f32) -> VoiceRole {
        let total: f32 = self.specs.iter().map(|spec| spec.weight).sum();
        if total <= 0.0 {
            return VoiceRole::Lead;
        }
        let mut remaining = u * total;
        for role in VoiceRole::ALL {
            remaining -= self.specs[role.index()].weight;
            if remaining < 0.0 {
                return role;
            }
        }
        VoiceRole::Percussion
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    Major,
    Minor,
    #[default]
    Pentatonic,
    Dorian,
    Chromatic,
}

impl Scale {
    #[must_use]
    pub const fn intervals(self) -> &'static [i32] {
        match self {
            Self::Major => &[0, 2, 4, 5, 7, 9, 11],
            Self::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Self::Pentatonic => &[0, 2, 4, 7, 9],
            Self::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Self::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }

    /// Semitone offset of scale degree `degree`, wrapping into higher octaves.
    #[must_use]
    pub fn semitone(self, degree: u8) -> i32 {
        let intervals = self.intervals();
        let len = intervals.len();
        let degree = degree as usize;
        intervals[degree % len] + 12 * (degree / len) as i32
    }

    /// Degrees available across `octaves`.
    #[must_use]
    pub fn degrees(self, octaves: u8) -> usize {
        self.intervals().len() * octaves.max(1) as usize
    }
}

/// Whether encounters reward consonant or dissonant pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarmonyMode {
    #[default]
    Consonant,
    Dissonant,
}

impl HarmonyMode {
    /// Whether `score` qualifies under this mode.
    #[must_use]
    pub fn accepts(self, score: f32, threshold: f32) -> bool {
        match self {
            Self::Consonant => score >= threshold,
            Self::Dissonant => score <= threshold,
        }
    }
}

/// Consonance by interval class (unison through tritone).
const CONSONANCE: [f32; 7] = [1.0, 0.1, 0.3, 0.7, 0.8, 0.9, 0.2];

/// Consonance score in `[0, 1]` of two pitches.
#[must_use]
pub fn consonance(a: i32, b: i32) -> f32 {
    let interval = (a - b).rem_euclid(12) as usize;
    CONSONANCE[interval.min(12 - interval)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consonance_folds_inversions() {
        assert_eq!(consonance(60, 67), consonance(60, 65));
        assert_eq!(consonance(60, 72), 1.0);
        assert!(consonance(60, 61) < consonance(60, 64));
        assert_eq!(consonance(60, 66), 0.2);
    }

    #[test]
    fn scale_degrees_wrap_octaves() {
        assert_eq!(Scale::Pentatonic.semitone(0), 0);
        assert_eq!(Scale::Pentatonic.semitone(5), 12);
        assert_eq!(Scale::Major.semitone(8), 14);
        assert_eq!(Scale::Dorian.degrees(2), 14);
    }

    #[test]
    fn unknown_role_overrides_are_skipped() {
        let table = RoleTable::with_overrides(&[
            RoleOverride {
                role: "kazoo".into(),
                base_pitch: Some(99),
                ..RoleOverride::default()
            },
            RoleOverride {
                role: "bass".into(),
                duration: Some(3.0),
                ..RoleOverride::default()
            },
        ]);
        assert_eq!(table.spec(VoiceRole::Bass).duration, 3.0);
        let defaults = RoleTable::default();
        for role in [VoiceRole::Pad, VoiceRole::Lead, VoiceRole::Arp, VoiceRole::Percussion] {
            assert_eq!(table.spec(role), defaults.spec(role));
        }
    }

    #[test]
    fn pick_follows_weights() {
        let table = RoleTable::default();
        assert_eq!(table.pick(0.0), VoiceRole::Bass);
        assert_eq!(table.pick(0.999), VoiceRole::Percussion);
        assert_eq!(table.pick(0.4), VoiceRole::Lead);
    }

    #[test]
    fn harmony_modes_split_on_threshold() {
        assert!(HarmonyMode::Consonant.accepts(0.8, 0.6));
        assert!(!HarmonyMode::Dissonant.accepts(0.8, 0.6));
        assert!(HarmonyMode::Dissonant.accepts(0.1, 0.6));
    }
}
