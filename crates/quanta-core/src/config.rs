//! Lab configuration records.
//!
//! Every struct is `#[serde(default)]`, so a partial JSON object merges onto the
//! documented defaults. `validate()` only rejects values no step could run with;
//! softer problems (unknown role names, oversized layouts) are skipped or clamped.

use serde::{Deserialize, Serialize};

use crate::LabError;
use crate::discharge::DischargeParams;
use crate::interaction::InteractionSet;
use crate::motion::MotionParams;
use crate::music::{HarmonyMode, Scale};
use crate::{MotionStyle, Position};

pub use crate::motion::BoundaryPolicy;

/// Partial override of one voice role, addressed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleOverride {
    pub role: String,
    pub base_pitch: Option<i32>,
    pub octave_span: Option<u8>,
    pub duration: Option<f32>,
    pub weight: Option<f32>,
    pub timbre: Option<f32>,
    pub color: Option<[f32; 3]>,
}

/// Partial override of one archetype, addressed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchetypeOverride {
    pub archetype: String,
    pub gain: Option<f32>,
    pub enabled: Option<bool>,
}

/// Configuration for [`crate::MusicLab`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicConfig {
    /// Fixed particle slots (clamped to [`crate::MAX_CAPACITY`]).
    pub capacity: usize,
    /// Initial live particles (clamped to capacity).
    pub particle_count: usize,
    /// Trail points kept per particle; 0 disables trails.
    pub trail_len: usize,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    pub motion: MotionParams,
    pub boundary: BoundaryPolicy,
    /// Speed kept when bouncing off a wall.
    pub restitution: f32,
    pub max_speed: f32,
    /// Velocity retained per 60 Hz frame.
    pub damping: f32,
    /// Constant acceleration applied to every particle.
    pub gravity: [f32; 2],
    /// Curl-noise gain.
    pub turbulence: f32,
    /// Seconds before a particle is recycled; 0 disables ageing out.
    pub max_age: f32,
    pub spawn_radius: f32,
    /// Root semitone of the active scale.
    pub root: i32,
    pub scale: Scale,
    pub bpm: f32,
    pub roles: Vec<RoleOverride>,
    pub charge_rate: f32,
    pub speed_charge_gain: f32,
    pub discharge_threshold: f32,
    /// Seconds charge must stay above the threshold before discharging.
    pub discharge_hold: f32,
    pub discharge_reset: f32,
    pub discharge_radius: f32,
    /// Fraction of the discharged energy shared with neighbours, `[0, 1]`.
    pub discharge_transfer: f32,
    pub discharge_impulse: f32,
    /// Per-particle silence after any note, in seconds.
    pub note_cooldown: f32,
    /// Mean oscillator angular velocity (rad/s).
    pub natural_frequency: f32,
    pub frequency_spread: f32,
    /// Kuramoto coupling strength.
    pub coupling: f32,
    /// Ticks between encounter scans; 0 disables encounters.
    pub encounter_interval: u32,
    pub encounter_radius: f32,
    pub harmony_mode: HarmonyMode,
    pub consonance_threshold: f32,
    pub max_encounters: usize,
    /// Ticks between order-parameter measurements; 0 disables sync bursts.
    pub sync_interval: u32,
    pub sync_threshold: f32,
    /// Phase distance from zero that answers a sync burst.
    pub sync_window: f32,
    pub sync_max_notes: usize,
    pub sync_cooldown: f32,
    pub role_energy_decay: f32,
    /// Seconds a teleported particle ignores tunnels.
    pub portal_lock: f32,
    pub teleport_jitter: f32,
    /// Flash intensity lost per second.
    pub flash_decay: f32,
    pub visual_capacity: usize,
    pub interactions: InteractionSet,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            particle_count: 240,
            trail_len: 12,
            rng_seed: None,
            motion: MotionParams::default(),
            boundary: BoundaryPolicy::Wrap,
            restitution: 0.85,
            max_speed: 1.2,
            damping: 0.985,
            gravity: [0.0, 0.0],
            turbulence: 0.15,
            max_age: 90.0,
            spawn_radius: 0.9,
            root: 48,
            scale: Scale::Pentatonic,
            bpm: 100.0,
            roles: Vec::new(),
            charge_rate: 0.05,
            speed_charge_gain: 0.25,
            discharge_threshold: 0.9,
            discharge_hold: 0.15,
            discharge_reset: 0.08,
            discharge_radius: 0.18,
            discharge_transfer: 0.35,
            discharge_impulse: 0.6,
            note_cooldown: 0.25,
            natural_frequency: 1.2,
            frequency_spread: 0.3,
            coupling: 0.8,
            encounter_interval: 4,
            encounter_radius: 0.08,
            harmony_mode: HarmonyMode::Consonant,
            consonance_threshold: 0.6,
            max_encounters: 3,
            sync_interval: 6,
            sync_threshold: 0.82,
            sync_window: 0.15,
            sync_max_notes: 6,
            sync_cooldown: 1.5,
            role_energy_decay: 1.5,
            portal_lock: 0.3,
            teleport_jitter: 0.01,
            flash_decay: 3.0,
            visual_capacity: 128,
            interactions: InteractionSet::default(),
        }
    }
}

impl MusicConfig {
    /// Reject values no step could run with.
    pub fn validate(&self) -> Result<(), LabError> {
        validate_kinematics(self.capacity, self.max_speed, self.damping, self.restitution, &self.motion)?;
        for radius in [
            self.spawn_radius,
            self.discharge_radius,
            self.encounter_radius,
            self.teleport_jitter,
        ] {
            if !(radius.is_finite() && radius >= 0.0) {
                return Err(LabError::InvalidConfig("radii must be finite and non-negative"));
            }
        }
        if !(0.0..=1.0).contains(&self.discharge_transfer) {
            return Err(LabError::InvalidConfig("discharge_transfer must lie in [0, 1]"));
        }
        if !(self.bpm.is_finite() && self.bpm >= 0.0) {
            return Err(LabError::InvalidConfig("bpm must be finite and non-negative"));
        }
        Ok(())
    }

    #[must_use]
    pub fn discharge_params(&self) -> DischargeParams {
        DischargeParams {
            threshold: self.discharge_threshold,
            hold: self.discharge_hold,
            reset: self.discharge_reset,
            radius: self.discharge_radius,
            transfer: self.discharge_transfer,
            impulse: self.discharge_impulse,
            max_speed: self.max_speed,
        }
    }

    /// Effective boundary: ballistic motion always bounces.
    #[must_use]
    pub fn effective_boundary(&self) -> BoundaryPolicy {
        if self.motion.style == MotionStyle::Ballistic {
            BoundaryPolicy::Bounce
        } else {
            self.boundary
        }
    }
}

/// Extra point attractor superposed on the psyche flow field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowAttractor {
    pub position: Position,
    /// Positive pulls inward, negative pushes out.
    pub strength: f32,
    pub radius: f32,
}

/// Coarse vector field settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowFieldConfig {
    /// Grid nodes per axis over `[-1, 1]²`.
    pub resolution: usize,
    /// Ticks between recomputations.
    pub refresh_interval: u32,
    /// EMA weight of each new target, `(0, 1]`.
    pub smoothing: f32,
    pub wave_gain: f32,
    pub center_pull: f32,
    pub region_gain: f32,
    pub archetype_gain: f32,
    pub attractors: Vec<FlowAttractor>,
}

impl Default for FlowFieldConfig {
    fn default() -> Self {
        Self {
            resolution: 24,
            refresh_interval: 3,
            smoothing: 0.25,
            wave_gain: 0.35,
            center_pull: 0.25,
            region_gain: 0.2,
            archetype_gain: 0.6,
            attractors: Vec::new(),
        }
    }
}

/// Spring-link formation and force settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Chance per compatible pair per tick.
    pub probability: f32,
    pub radius: f32,
    pub max_valence_gap: f32,
    pub min_coherence: f32,
    pub max_degree: u8,
    pub max_links: usize,
    pub ttl_min: f32,
    pub ttl_max: f32,
    pub rest_length: f32,
    pub stiffness: f32,
    /// Fraction of the coherence gap closed per second along a link.
    pub coherence_exchange: f32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            probability: 0.03,
            radius: 0.07,
            max_valence_gap: 0.35,
            min_coherence: 0.4,
            max_degree: 3,
            max_links: 240,
            ttl_min: 2.0,
            ttl_max: 6.0,
            rest_length: 0.05,
            stiffness: 4.0,
            coherence_exchange: 0.05,
        }
    }
}

/// Configuration for [`crate::PsycheLab`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsycheConfig {
    pub capacity: usize,
    pub particle_count: usize,
    pub trail_len: usize,
    pub rng_seed: Option<u64>,
    pub motion: MotionParams,
    pub boundary: BoundaryPolicy,
    /// Circle used by [`BoundaryPolicy::Radial`].
    pub boundary_radius: f32,
    pub restitution: f32,
    pub max_speed: f32,
    pub damping: f32,
    pub turbulence: f32,
    /// Seconds before a particle is recycled; 0 disables ageing out.
    pub max_age: f32,
    pub flow: FlowFieldConfig,
    /// Gain on the sampled flow-field vector.
    pub flow_gain: f32,
    /// Rate at which inner states relax toward their region baseline.
    pub relax_rate: f32,
    /// Charge gained per second per unit of arousal.
    pub charge_gain: f32,
    pub links: LinkConfig,
    pub dwell_min: f32,
    pub dwell_max: f32,
    /// Gain on archetype particle operators.
    pub archetype_gain: f32,
    pub archetypes: Vec<ArchetypeOverride>,
    pub discharge_threshold: f32,
    pub discharge_hold: f32,
    pub discharge_reset: f32,
    pub discharge_radius: f32,
    pub discharge_transfer: f32,
    pub discharge_impulse: f32,
    /// Per-particle silence after an emitted event.
    pub event_cooldown: f32,
    /// Seconds of accumulated step time between metric evaluations.
    pub metrics_interval: f32,
    pub narrative_capacity: usize,
    pub visual_capacity: usize,
    pub portal_lock: f32,
    pub teleport_jitter: f32,
    pub flash_decay: f32,
    pub interactions: InteractionSet,
}

impl Default for PsycheConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            particle_count: 600,
            trail_len: 6,
            rng_seed: None,
            motion: MotionParams::default(),
            boundary: BoundaryPolicy::Radial,
            boundary_radius: 0.98,
            restitution: 0.5,
            max_speed: 0.9,
            damping: 0.96,
            turbulence: 0.05,
            max_age: 0.0,
            flow: FlowFieldConfig::default(),
            flow_gain: 0.8,
            relax_rate: 0.6,
            charge_gain: 0.12,
            links: LinkConfig::default(),
            dwell_min: 4.0,
            dwell_max: 10.0,
            archetype_gain: 0.25,
            archetypes: Vec::new(),
            discharge_threshold: 0.92,
            discharge_hold: 0.3,
            discharge_reset: 0.1,
            discharge_radius: 0.15,
            discharge_transfer: 0.3,
            discharge_impulse: 0.4,
            event_cooldown: 0.5,
            metrics_interval: 0.5,
            narrative_capacity: 24,
            visual_capacity: 128,
            portal_lock: 0.3,
            teleport_jitter: 0.01,
            flash_decay: 3.0,
            interactions: InteractionSet::default(),
        }
    }
}

impl PsycheConfig {
    /// Reject values no step could run with.
    pub fn validate(&self) -> Result<(), LabError> {
        validate_kinematics(self.capacity, self.max_speed, self.damping, self.restitution, &self.motion)?;
        if !(self.boundary_radius.is_finite() && self.boundary_radius > 0.0) {
            return Err(LabError::InvalidConfig("boundary_radius must be positive"));
        }
        for radius in [self.discharge_radius, self.links.radius, self.teleport_jitter] {
            if !(radius.is_finite() && radius >= 0.0) {
                return Err(LabError::InvalidConfig("radii must be finite and non-negative"));
            }
        }
        if self.flow.resolution < 2 {
            return Err(LabError::InvalidConfig("flow resolution must be at least 2"));
        }
        if !(self.flow.smoothing > 0.0 && self.flow.smoothing <= 1.0) {
            return Err(LabError::InvalidConfig("flow smoothing must lie in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.links.probability) {
            return Err(LabError::InvalidConfig("link probability must lie in [0, 1]"));
        }
        if !(self.links.ttl_min >= 0.0 && self.links.ttl_min <= self.links.ttl_max) {
            return Err(LabError::InvalidConfig("link ttl range is empty"));
        }
        if !(self.dwell_min >= 0.0 && self.dwell_min <= self.dwell_max) {
            return Err(LabError::InvalidConfig("archetype dwell range is empty"));
        }
        if !(0.0..=1.0).contains(&self.discharge_transfer) {
            return Err(LabError::InvalidConfig("discharge_transfer must lie in [0, 1]"));
        }
        if !(self.metrics_interval.is_finite() && self.metrics_interval > 0.0) {
            return Err(LabError::InvalidConfig("metrics_interval must be positive"));
        }
        Ok(())
    }

    #[must_use]
    pub fn discharge_params(&self) -> DischargeParams {
        DischargeParams {
            threshold: self.discharge_threshold,
            hold: self.discharge_hold,
            reset: self.discharge_reset,
            radius: self.discharge_radius,
            transfer: self.discharge_transfer,
            impulse: self.discharge_impulse,
            max_speed: self.max_speed,
        }
    }
}

fn validate_kinematics(
    capacity: usize,
    max_speed: f32,
    damping: f32,
    restitution: f32,
    motion: &MotionParams,
) -> Result<(), LabError> {
    if capacity == 0 {
        return Err(LabError::InvalidConfig("capacity must be non-zero"));
    }
    if !(max_speed.is_finite() && max_speed > 0.0) {
        return Err(LabError::InvalidConfig("max_speed must be positive"));
    }
    if !(damping > 0.0 && damping <= 1.0) {
        return Err(LabError::InvalidConfig("damping must lie in (0, 1]"));
    }
    if !(0.0..=1.0).contains(&restitution) {
        return Err(LabError::InvalidConfig("restitution must lie in [0, 1]"));
    }
    for radius in [
        motion.separation_radius,
        motion.alignment_radius,
        motion.cohesion_radius,
        motion.polarization_radius,
        motion.predation_radius,
    ] {
        if !(radius.is_finite() && radius >= 0.0) {
            return Err(LabError::InvalidConfig("motion radii must be finite and non-negative"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(MusicConfig::default().validate(), Ok(()));
        assert_eq!(PsycheConfig::default().validate(), Ok(()));
    }

    #[test]
    fn partial_json_merges_onto_defaults() {
        let config: MusicConfig = serde_json::from_str(
            r#"{ "particle_count": 12, "motion": { "style": "jazz", "group_size": 4 }, "scale": "dorian" }"#,
        )
        .expect("partial config");
        assert_eq!(config.particle_count, 12);
        assert_eq!(config.motion.style, MotionStyle::Jazz);
        assert_eq!(config.motion.group_size, 4);
        assert_eq!(config.motion.cohesion_radius, MotionParams::default().cohesion_radius);
        assert_eq!(config.scale, Scale::Dorian);
        assert_eq!(config.capacity, 1024);
    }

    #[test]
    fn structural_errors_are_rejected() {
        let config = MusicConfig {
            damping: 1.5,
            ..MusicConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(LabError::InvalidConfig("damping must lie in (0, 1]"))
        );
        let config = PsycheConfig {
            capacity: 0,
            ..PsycheConfig::default()
        };
        assert!(config.validate().is_err());
        let mut config = PsycheConfig::default();
        config.links.ttl_min = 9.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn restitution_outside_unit_range_is_rejected() {
        let expected = Err(LabError::InvalidConfig("restitution must lie in [0, 1]"));
        let config = MusicConfig {
            restitution: 1.2,
            ..MusicConfig::default()
        };
        assert_eq!(config.validate(), expected);
        let config = PsycheConfig {
            restitution: -0.1,
            ..PsycheConfig::default()
        };
        assert_eq!(config.validate(), expected);
        let config = MusicConfig {
            restitution: 1.0,
            ..MusicConfig::default()
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn ballistic_forces_bounce() {
        let mut config = MusicConfig::default();
        assert_eq!(config.effective_boundary(), BoundaryPolicy::Wrap);
        config.motion.style = MotionStyle::Ballistic;
        assert_eq!(config.effective_boundary(), BoundaryPolicy::Bounce);
    }
}
