//! Named regions of the psyche disk and their inner-state baselines.

use serde::{Deserialize, Serialize};

use crate::Position;

/// Radius of the central self region.
pub const SELF_CORE_RADIUS: f32 = 0.2;
/// Height above which the conscious band starts.
pub const CONSCIOUS_EDGE: f32 = 0.25;
/// Height below which the unconscious band starts.
pub const UNCONSCIOUS_EDGE: f32 = -0.25;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    SelfCore,
    Conscious,
    #[default]
    Threshold,
    Unconscious,
}

/// Resting inner state a particle relaxes toward while inside a region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub charge: f32,
    pub coherence: f32,
    pub arousal: f32,
    pub inhibition: f32,
    pub valence: f32,
}

impl Region {
    pub const ALL: [Self; 4] = [Self::SelfCore, Self::Conscious, Self::Threshold, Self::Unconscious];

    /// Region containing `p`; the self core takes precedence over the bands.
    #[must_use]
    pub fn classify(p: Position) -> Self {
        if p.x * p.x + p.y * p.y < SELF_CORE_RADIUS * SELF_CORE_RADIUS {
            Self::SelfCore
        } else if p.y > CONSCIOUS_EDGE {
            Self::Conscious
        } else if p.y < UNCONSCIOUS_EDGE {
            Self::Unconscious
        } else {
            Self::Threshold
        }
    }

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::SelfCore => 0,
            Self::Conscious => 1,
            Self::Threshold => 2,
            Self::Unconscious => 3,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SelfCore => "self_core",
            Self::Conscious => "conscious",
            Self::Threshold => "threshold",
            Self::Unconscious => "unconscious",
        }
    }

    #[must_use]
    pub const fn baseline(self) -> Baseline {
        match self {
            Self::SelfCore => Baseline {
                charge: 0.3,
                coherence: 0.8,
                arousal: 0.3,
                inhibition: 0.3,
                valence: 0.3,
            },
            Self::Conscious => Baseline {
                charge: 0.35,
                coherence: 0.6,
                arousal: 0.45,
                inhibition: 0.55,
                valence: 0.2,
            },
            Self::Threshold => Baseline {
                charge: 0.45,
                coherence: 0.45,
                arousal: 0.5,
                inhibition: 0.4,
                valence: 0.0,
            },
            Self::Unconscious => Baseline {
                charge: 0.6,
                coherence: 0.3,
                arousal: 0.6,
                inhibition: 0.2,
                valence: -0.25,
            },
        }
    }
}
