//! Population indices, phase classification and the narrative log.
//!
//! Each index is a weighted sum of population aggregates, shifted by a calibration
//! baseline, divided by a span and clamped to `[0, 1]`. The phase is the first row of
//! [`PHASE_RULES`] whose bounds all hold. The constants are tuned by eye; keep them as-is.

use serde::{Deserialize, Serialize};

use crate::events::NarrativeEntry;
use crate::ring::RingBuffer;
use crate::{Position, clamp01};

use super::archetype::Archetype;
use super::columns::PsycheColumns;
use super::region::Region;

/// Distance from the centroid treated as full dispersion.
const DISPERSION_SCALE: f32 = 0.95;

/// Population means and fractions the indices are built from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregates {
    pub arousal: f32,
    pub inhibition: f32,
    /// Fraction of particles in the unconscious band.
    pub unconscious: f32,
    pub coherence: f32,
    /// Fraction of particles in the self core.
    pub self_core: f32,
    /// Links relative to the most the population could hold.
    pub link_density: f32,
    pub dispersion: f32,
    pub valence_variance: f32,
}

impl Aggregates {
    /// Aggregate the live rows `[0, positions.len())`.
    #[must_use]
    pub fn gather(positions: &[Position], state: &PsycheColumns, links: usize, max_degree: u8) -> Self {
        let n = positions.len();
        if n == 0 {
            return Self::default();
        }
        let count = n as f32;
        let mean = |column: &[f32]| column[..n].iter().sum::<f32>() / count;
        let fraction = |region: Region| state.regions[..n].iter().filter(|r| **r == region).count() as f32 / count;

        let valence = mean(&state.valences);
        let valence_variance = state.valences[..n]
            .iter()
            .map(|v| (v - valence) * (v - valence))
            .sum::<f32>()
            / count;

        let (sx, sy) = positions.iter().fold((0.0, 0.0), |(x, y), p| (x + p.x, y + p.y));
        let centroid = Position::new(sx / count, sy / count);
        let spread = positions.iter().map(|p| p.distance(centroid)).sum::<f32>() / count;

        let max_links = count * f32::from(max_degree.max(1));
        Self {
            arousal: mean(&state.arousals),
            inhibition: mean(&state.inhibitions),
            unconscious: fraction(Region::Unconscious),
            coherence: mean(&state.coherences),
            self_core: fraction(Region::SelfCore),
            link_density: clamp01(2.0 * links as f32 / max_links),
            dispersion: clamp01(spread / DISPERSION_SCALE),
            valence_variance,
        }
    }
}

/// Calibration applied to a raw weighted sum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub baseline: f32,
    pub span: f32,
}

impl Calibration {
    #[must_use]
    pub fn normalize(self, raw: f32) -> f32 {
        clamp01((raw - self.baseline) / self.span)
    }
}

pub const TENSION: Calibration = Calibration {
    baseline: 0.35,
    span: 0.5,
};
pub const INTEGRATION: Calibration = Calibration {
    baseline: 0.2,
    span: 0.6,
};
pub const FRAGMENTATION: Calibration = Calibration {
    baseline: 0.25,
    span: 0.55,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Indices {
    pub tension: f32,
    pub integration: f32,
    pub fragmentation: f32,
}

impl Indices {
    #[must_use]
    pub fn from_aggregates(a: &Aggregates) -> Self {
        let tension = 0.4 * a.arousal + 0.3 * a.inhibition + 0.3 * a.unconscious;
        let integration = 0.45 * a.coherence + 0.25 * (2.0 * a.self_core).min(1.0) + 0.3 * a.link_density;
        let fragmentation =
            0.4 * a.dispersion + 0.35 * a.valence_variance.max(0.0).sqrt() + 0.25 * (1.0 - a.coherence);
        Self {
            tension: TENSION.normalize(tension),
            integration: INTEGRATION.normalize(integration),
            fragmentation: FRAGMENTATION.normalize(fragmentation),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Equilibrium,
    Anxiety,
    Repression,
    Integration,
    Individuation,
    Fragmentation,
    Crisis,
    Dreaming,
}

impl Phase {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Equilibrium => "equilibrium",
            Self::Anxiety => "anxiety",
            Self::Repression => "repression",
            Self::Integration => "integration",
            Self::Individuation => "individuation",
            Self::Fragmentation => "fragmentation",
            Self::Crisis => "crisis",
            Self::Dreaming => "dreaming",
        }
    }

    #[must_use]
    pub const fn color(self) -> [f32; 3] {
        match self {
            Self::Equilibrium => [0.7, 0.8, 0.9],
            Self::Anxiety => [0.95, 0.6, 0.3],
            Self::Repression => [0.5, 0.4, 0.6],
            Self::Integration => [0.4, 0.85, 0.6],
            Self::Individuation => [0.95, 0.9, 0.5],
            Self::Fragmentation => [0.8, 0.3, 0.5],
            Self::Crisis => [0.95, 0.2, 0.2],
            Self::Dreaming => [0.5, 0.5, 0.95],
        }
    }
}

/// Inclusive lower bounds and exclusive upper bounds on the three indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseRule {
    pub phase: Phase,
    pub min_tension: f32,
    pub max_tension: f32,
    pub min_integration: f32,
    pub max_integration: f32,
    pub min_fragmentation: f32,
    pub max_fragmentation: f32,
}

impl PhaseRule {
    const ANY: Self = Self {
        phase: Phase::Equilibrium,
        min_tension: 0.0,
        max_tension: f32::INFINITY,
        min_integration: 0.0,
        max_integration: f32::INFINITY,
        min_fragmentation: 0.0,
        max_fragmentation: f32::INFINITY,
    };

    #[must_use]
    pub fn matches(&self, i: &Indices) -> bool {
        (self.min_tension..self.max_tension).contains(&i.tension)
            && (self.min_integration..self.max_integration).contains(&i.integration)
            && (self.min_fragmentation..self.max_fragmentation).contains(&i.fragmentation)
    }
}

/// Checked in order; [`Phase::Equilibrium`] when none match.
pub const PHASE_RULES: [PhaseRule; 7] = [
    PhaseRule {
        phase: Phase::Crisis,
        min_tension: 0.75,
        min_fragmentation: 0.6,
        ..PhaseRule::ANY
    },
    PhaseRule {
        phase: Phase::Fragmentation,
        min_fragmentation: 0.65,
        ..PhaseRule::ANY
    },
    PhaseRule {
        phase: Phase::Repression,
        min_tension: 0.6,
        max_integration: 0.4,
        ..PhaseRule::ANY
    },
    PhaseRule {
        phase: Phase::Individuation,
        min_integration: 0.7,
        max_tension: 0.4,
        ..PhaseRule::ANY
    },
    PhaseRule {
        phase: Phase::Integration,
        min_integration: 0.5,
        ..PhaseRule::ANY
    },
    PhaseRule {
        phase: Phase::Anxiety,
        min_tension: 0.5,
        ..PhaseRule::ANY
    },
    PhaseRule {
        phase: Phase::Dreaming,
        min_fragmentation: 0.4,
        max_tension: 0.3,
        ..PhaseRule::ANY
    },
];

/// Pure classification of a set of indices.
#[must_use]
pub fn classify_phase(indices: &Indices) -> Phase {
    PHASE_RULES
        .iter()
        .find(|rule| rule.matches(indices))
        .map_or(Phase::Equilibrium, |rule| rule.phase)
}

const TENSION_EDGE: f32 = 0.7;
const INTEGRATION_EDGE: f32 = 0.6;
const FRAGMENTATION_EDGE: f32 = 0.6;

/// Interval-driven evaluator holding the latest indices, phase and narrative log.
#[derive(Debug, Clone)]
pub struct MetricsTracker {
    interval: f32,
    elapsed: f32,
    indices: Indices,
    phase: Phase,
    above: [bool; 3],
    seen: [bool; 6],
    narrative: RingBuffer<NarrativeEntry>,
}

impl MetricsTracker {
    #[must_use]
    pub fn new(interval: f32, narrative_capacity: usize) -> Self {
        Self {
            interval,
            elapsed: 0.0,
            indices: Indices::default(),
            phase: Phase::Equilibrium,
            above: [false; 3],
            seen: [false; 6],
            narrative: RingBuffer::new(narrative_capacity),
        }
    }

    /// Accumulate `dt`; true once a full interval has passed (the remainder carries over).
    pub fn due(&mut self, dt: f32) -> bool {
        self.elapsed += dt;
        if self.elapsed < self.interval {
            return false;
        }
        self.elapsed %= self.interval;
        true
    }

    /// Store new indices and log rising edges. Returns `(from, to)` when the phase changed.
    pub fn update(&mut self, indices: Indices, time: f32) -> Option<(Phase, Phase)> {
        self.indices = indices;
        let edges = [
            (indices.tension >= TENSION_EDGE, "Tension is rising", [0.95, 0.5, 0.3]),
            (indices.integration >= INTEGRATION_EDGE, "The parts begin to integrate", [0.4, 0.85, 0.6]),
            (indices.fragmentation >= FRAGMENTATION_EDGE, "The field is fragmenting", [0.8, 0.3, 0.5]),
        ];
        for (slot, (now_above, text, color)) in edges.into_iter().enumerate() {
            if now_above && !self.above[slot] {
                self.log(text.to_string(), color, time);
            }
            self.above[slot] = now_above;
        }

        let phase = classify_phase(&indices);
        if phase == self.phase {
            return None;
        }
        let from = std::mem::replace(&mut self.phase, phase);
        self.log(format!("Phase shift: {} to {}", from.name(), phase.name()), phase.color(), time);
        Some((from, phase))
    }

    /// Log an archetype's first appearance. Returns true the first time only.
    pub fn note_archetype(&mut self, archetype: Archetype, time: f32) -> bool {
        let seen = &mut self.seen[archetype.index()];
        if *seen {
            return false;
        }
        *seen = true;
        self.log(format!("The {} emerges", archetype.name()), archetype.color(), time);
        true
    }

    fn log(&mut self, text: String, color: [f32; 3], time: f32) {
        self.narrative.push(NarrativeEntry { text, color, time });
    }

    #[must_use]
    pub const fn indices(&self) -> Indices {
        self.indices
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn narrative(&self) -> &RingBuffer<NarrativeEntry> {
        &self.narrative
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(tension: f32, integration: f32, fragmentation: f32) -> Indices {
        Indices {
            tension,
            integration,
            fragmentation,
        }
    }

    #[test]
    fn rules_apply_in_order() {
        assert_eq!(classify_phase(&indices(0.8, 0.9, 0.7)), Phase::Crisis);
        assert_eq!(classify_phase(&indices(0.2, 0.9, 0.7)), Phase::Fragmentation);
        assert_eq!(classify_phase(&indices(0.65, 0.3, 0.1)), Phase::Repression);
        assert_eq!(classify_phase(&indices(0.3, 0.8, 0.1)), Phase::Individuation);
        assert_eq!(classify_phase(&indices(0.45, 0.8, 0.1)), Phase::Integration);
        assert_eq!(classify_phase(&indices(0.65, 0.45, 0.1)), Phase::Anxiety);
        assert_eq!(classify_phase(&indices(0.1, 0.1, 0.5)), Phase::Dreaming);
        assert_eq!(classify_phase(&indices(0.35, 0.2, 0.2)), Phase::Equilibrium);
    }

    #[test]
    fn classification_is_deterministic() {
        let sample = indices(0.61, 0.39, 0.62);
        let first = classify_phase(&sample);
        for _ in 0..10 {
            assert_eq!(classify_phase(&sample), first);
        }
    }

    #[test]
    fn calibration_clamps() {
        assert_eq!(TENSION.normalize(0.0), 0.0);
        assert_eq!(TENSION.normalize(2.0), 1.0);
        assert!((TENSION.normalize(0.6) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn tracker_logs_edges_and_transitions_once() {
        let mut tracker = MetricsTracker::new(0.5, 4);
        assert!(!tracker.due(0.3));
        assert!(tracker.due(0.3));
        assert_eq!(tracker.update(indices(0.8, 0.1, 0.7), 1.0), Some((Phase::Equilibrium, Phase::Crisis)));
        let logged = tracker.narrative().len();
        assert_eq!(logged, 3);
        assert_eq!(tracker.update(indices(0.8, 0.1, 0.7), 1.5), None);
        assert_eq!(tracker.narrative().len(), logged);
        assert!(tracker.note_archetype(Archetype::Sage, 2.0));
        assert!(!tracker.note_archetype(Archetype::Sage, 2.5));
        assert_eq!(tracker.narrative().len(), 4);
        tracker.update(indices(0.1, 0.1, 0.1), 3.0);
        assert_eq!(tracker.narrative().len(), 4);
        assert_eq!(tracker.phase(), Phase::Equilibrium);
    }
}
