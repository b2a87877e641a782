//! Psyche lab: particles as fragments of a mind drifting between regions.
//!
//! Forces come from the active motion style, a periodically refreshed flow field,
//! archetype operators and spring links. Inner states relax toward the baseline of the
//! region a particle sits in. Population indices and the phase are re-evaluated on a
//! fixed interval of simulated time.

pub mod archetype;
mod columns;
pub mod flow_field;
pub mod links;
pub mod metrics;
pub mod region;

use std::f32::consts::PI;

use quanta_index::{NeighborhoodIndex, UniformGridIndex};
use rand::Rng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::PsycheConfig;
use crate::discharge;
use crate::events::{NarrativeEntry, VisualEvent, VisualKind, age_visuals};
use crate::interaction::{InteractionSet, ZoneTarget};
use crate::motion::{
    MotionContext, MotionStyle, PopulationStats, clamp_speed, compute_forces, damping_factor,
    integrate_velocity,
};
use crate::ring::RingBuffer;
use crate::store::{ColumnsMut, ParticleStore};
use crate::{LabError, MAX_CAPACITY, MAX_DT, POSITION_SCALE, Position, Tick, curl_noise, hash_noise};

pub use archetype::{Archetype, ArchetypeTable};
pub use columns::{InnerState, PsycheColumns, PsycheSpawner};
pub use flow_field::{FieldDrivers, FlowField};
pub use links::{LinkInputs, LinkSet, SpringLink};
pub use metrics::{Aggregates, Indices, MetricsTracker, Phase, classify_phase};
pub use region::{Baseline, Region};

/// Discrete event handed to the caller of [`PsycheLab::step`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PsycheEvent {
    Discharge {
        particle: usize,
        position: Position,
        energy: f32,
    },
    TagAcquired {
        particle: usize,
        archetype: Archetype,
    },
    TagReleased {
        particle: usize,
        archetype: Archetype,
    },
    PhaseChanged {
        from: Phase,
        to: Phase,
    },
}

/// Summary of one psyche step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PsycheTick {
    pub tick: Tick,
    pub events: usize,
    pub discharges: usize,
    pub recycled: usize,
    /// Live spring links after the step.
    pub links: usize,
    pub phase: Phase,
}

/// The Psyche particle system.
#[derive(Debug, Clone)]
pub struct PsycheLab {
    config: PsycheConfig,
    archetypes: ArchetypeTable,
    store: ParticleStore<PsycheColumns>,
    interactions: InteractionSet,
    index: UniformGridIndex,
    flow: FlowField,
    links: LinkSet,
    metrics: MetricsTracker,
    rng: SmallRng,
    tick: Tick,
    time: f32,
    visuals: RingBuffer<VisualEvent>,
    shares: [f32; 6],
    forces: Vec<(f32, f32)>,
    grid_points: Vec<(f32, f32)>,
    groups: Vec<u8>,
    opinions: Vec<f32>,
    stats: PopulationStats,
    pending: Vec<PsycheEvent>,
    recycle_queue: Vec<usize>,
    firing: Vec<usize>,
    neighbor_scratch: Vec<(usize, f32)>,
}

impl PsycheLab {
    /// Build a lab from `config`; the interaction layout is moved out of the config.
    pub fn new(mut config: PsycheConfig) -> Result<Self, LabError> {
        config.validate()?;
        if config.capacity > MAX_CAPACITY {
            debug!(requested = config.capacity, limit = MAX_CAPACITY, "psyche capacity clamped");
        }
        if config.particle_count > config.capacity.min(MAX_CAPACITY) {
            debug!(
                requested = config.particle_count,
                capacity = config.capacity.min(MAX_CAPACITY),
                "psyche particle count clamped"
            );
        }
        let archetypes = ArchetypeTable::with_overrides(config.archetype_gain, &config.archetypes);
        let mut interactions = std::mem::take(&mut config.interactions);
        interactions.sanitize();
        let mut rng = crate::seeded_rng(config.rng_seed);
        let store = ParticleStore::create(
            config.capacity,
            config.particle_count,
            config.trail_len,
            &PsycheSpawner,
            &mut rng,
        );
        let cell_size = config.discharge_radius.max(config.links.radius).max(0.05);
        Ok(Self {
            archetypes,
            interactions,
            index: UniformGridIndex::new(cell_size, 1.0),
            flow: FlowField::new(config.flow.resolution),
            links: LinkSet::new(store.capacity()),
            metrics: MetricsTracker::new(config.metrics_interval, config.narrative_capacity),
            rng,
            tick: Tick::zero(),
            time: 0.0,
            visuals: RingBuffer::new(config.visual_capacity),
            shares: [0.0; 6],
            forces: Vec::new(),
            grid_points: Vec::new(),
            groups: Vec::new(),
            opinions: Vec::new(),
            stats: PopulationStats::default(),
            pending: Vec::new(),
            recycle_queue: Vec::new(),
            firing: Vec::new(),
            neighbor_scratch: Vec::new(),
            store,
            config,
        })
    }

    /// Advance the simulation by `dt` seconds, handing every event to `emit`.
    ///
    /// `dt` is clamped to [`MAX_DT`]; non-positive or non-finite values do nothing.
    pub fn step(&mut self, dt: f32, emit: &mut dyn FnMut(PsycheEvent)) -> PsycheTick {
        let mut summary = PsycheTick {
            tick: self.tick,
            links: self.links.len(),
            phase: self.metrics.phase(),
            ..PsycheTick::default()
        };
        if !(dt.is_finite() && dt > 0.0) {
            return summary;
        }
        let dt = dt.min(MAX_DT);
        self.pending.clear();

        self.stage_timers(dt);
        self.rebuild_index();
        self.stage_flow_field();
        self.stage_forces();
        self.stage_inner_state(dt);
        self.stage_integrate(dt);
        summary.recycled = self.stage_lifecycle();
        self.rebuild_index();
        self.stage_links(dt);
        summary.discharges = self.stage_discharge(dt);
        self.stage_tags();
        self.stage_metrics(dt);
        age_visuals(&mut self.visuals, dt);
        self.interactions.tick(dt);

        summary.events = self.pending.len();
        for event in self.pending.drain(..) {
            emit(event);
        }
        self.time += dt;
        self.tick = self.tick.next();
        summary.tick = self.tick;
        summary.links = self.links.len();
        summary.phase = self.metrics.phase();
        summary
    }

    /// Decay per-particle timers and release tags whose dwell has run out.
    fn stage_timers(&mut self, dt: f32) {
        self.store.tick_timers(dt, self.config.flash_decay);
        let n = self.store.len();
        let state = self.store.state_mut();
        for i in 0..n {
            let Some(archetype) = state.tags[i] else {
                continue;
            };
            state.tag_timers[i] -= dt;
            if state.tag_timers[i] <= 0.0 {
                state.tags[i] = None;
                state.tag_timers[i] = 0.0;
                self.pending.push(PsycheEvent::TagReleased { particle: i, archetype });
            }
        }
    }

    fn rebuild_index(&mut self) {
        self.grid_points.clear();
        self.grid_points
            .extend(self.store.positions().iter().map(|p| (p.x, p.y)));
        if let Err(err) = self.index.rebuild(&self.grid_points) {
            debug!(?err, "psyche neighbourhood index rebuild failed");
        }
    }

    fn stage_flow_field(&mut self) {
        let interval = u64::from(self.config.flow.refresh_interval.max(1));
        if !self.tick.0.is_multiple_of(interval) {
            return;
        }
        let n = self.store.len();
        self.shares = [0.0; 6];
        if n > 0 {
            for archetype in self.store.state().tags[..n].iter().flatten() {
                self.shares[archetype.index()] += 1.0;
            }
            for share in &mut self.shares {
                *share /= n as f32;
            }
        }
        self.flow.refresh(
            &self.config.flow,
            FieldDrivers {
                time: self.time,
                shares: &self.shares,
                archetypes: &self.archetypes,
            },
        );
    }

    /// Motion style, flow field, archetype operators, turbulence and springs.
    fn stage_forces(&mut self) {
        let n = self.store.len();
        let state = self.store.state();
        self.groups.clear();
        self.groups
            .extend(state.regions[..n].iter().map(|region| region.index() as u8));
        // Valence stands in for the oscillator phase opinion rules compare.
        self.opinions.clear();
        self.opinions.extend(state.valences[..n].iter().map(|v| v * PI));
        self.stats.refresh(
            self.store.positions(),
            self.store.velocities(),
            &self.groups,
            self.config.motion.group_size,
        );
        let ctx = MotionContext {
            positions: self.store.positions(),
            velocities: self.store.velocities(),
            phases: &self.opinions,
            energies: &state.charges[..n],
            groups: &self.groups,
            index: &self.index,
            stats: &self.stats,
            params: &self.config.motion,
            time: self.time,
            tick: self.tick.0,
        };
        compute_forces(&ctx, &mut self.forces);

        let config = &self.config;
        let positions = self.store.positions();
        for (i, (force, p)) in self.forces.iter_mut().zip(positions).enumerate() {
            let (fx, fy) = self.flow.sample(*p);
            force.0 += fx * config.flow_gain;
            force.1 += fy * config.flow_gain;
            if let Some(archetype) = state.tags[i] {
                let gain = self.archetypes.gain(archetype);
                let (ax, ay) = archetype.particle_force(*p, i, self.tick.0);
                force.0 += ax * gain;
                force.1 += ay * gain;
            }
            if config.turbulence != 0.0 {
                let (nx, ny) = curl_noise(p.x, p.y, self.time);
                force.0 += nx * config.turbulence;
                force.1 += ny * config.turbulence;
            }
            let (ix, iy) = self.interactions.field_force(*p, self.time);
            force.0 += ix;
            force.1 += iy;
        }
        self.links.apply_forces(&config.links, positions, &mut self.forces);
    }

    /// Region relaxation, archetype drift, charge build-up and link coherence exchange.
    fn stage_inner_state(&mut self, dt: f32) {
        let n = self.store.len();
        let relax = 1.0 - (-self.config.relax_rate.max(0.0) * dt).exp();
        let charge_gain = self.config.charge_gain;
        let state = self.store.state_mut();
        for i in 0..n {
            let base = state.regions[i].baseline();
            let mut inner = state.inner(i);
            inner.valence += (base.valence - inner.valence) * relax;
            inner.coherence += (base.coherence - inner.coherence) * relax;
            inner.arousal += (base.arousal - inner.arousal) * relax;
            inner.inhibition += (base.inhibition - inner.inhibition) * relax;
            if let Some(archetype) = state.tags[i] {
                archetype.drift(&mut inner, dt);
            }
            inner.charge += inner.arousal * charge_gain * dt;
            state.set_inner(i, inner);
        }
        self.links
            .exchange_coherence(&self.config.links, &mut state.coherences[..n], dt);
    }

    fn stage_integrate(&mut self, dt: f32) {
        let Self {
            config,
            store,
            interactions,
            forces,
            visuals,
            recycle_queue,
            tick,
            ..
        } = self;
        let decay = damping_factor(config.damping, dt);
        let tick = tick.0;
        let ColumnsMut {
            positions,
            previous,
            velocities,
            portal_locks,
            trails,
            state,
            ..
        } = store.columns_mut();

        recycle_queue.clear();
        for i in 0..positions.len() {
            previous[i] = positions[i];
            let start = previous[i];
            let force = forces.get(i).copied().unwrap_or((0.0, 0.0));
            let mut v = integrate_velocity(velocities[i], force, dt, decay, config.max_speed);
            let mut p = Position::new(
                start.x + v.vx * dt * POSITION_SCALE,
                start.y + v.vy * dt * POSITION_SCALE,
            );
            config
                .boundary
                .apply(&mut p, &mut v, config.restitution, config.boundary_radius);
            let mut path_start = if p.distance_sq(start) > 1.0 { p } else { start };

            if portal_locks[i] <= 0.0 {
                let jitter = (
                    hash_noise(i, tick, 51) * config.teleport_jitter,
                    hash_noise(i, tick, 52) * config.teleport_jitter,
                );
                if let Some((tunnel, exit)) = interactions.teleport(p, &mut v, jitter) {
                    let color = interactions.tunnels()[tunnel].color;
                    visuals.push(VisualEvent::new(VisualKind::Teleport, p, 1.0, color));
                    visuals.push(VisualEvent::new(VisualKind::Teleport, exit, 1.0, color));
                    p = exit;
                    path_start = exit;
                    portal_locks[i] = config.portal_lock;
                }
            }
            interactions.contain(path_start, &mut p, &mut v);
            {
                let mut target = ZoneTarget {
                    velocity: &mut v,
                    energy: &mut state.charges[i],
                    phase: None,
                    transpose: None,
                    brightness: None,
                    muted: None,
                };
                interactions.apply_zones(p, &mut target, dt, i, tick);
            }
            v = clamp_speed(v, config.max_speed);

            if !(p.is_finite() && v.is_finite()) {
                recycle_queue.push(i);
                continue;
            }
            positions[i] = p;
            velocities[i] = v;
            state.regions[i] = Region::classify(p);
            trails.push(i, p);
        }
    }

    fn stage_lifecycle(&mut self) -> usize {
        let Self {
            config,
            store,
            links,
            rng,
            recycle_queue,
            ..
        } = self;
        if config.max_age > 0.0 {
            recycle_queue.extend(
                store
                    .ages()
                    .iter()
                    .enumerate()
                    .filter(|(_, age)| **age > config.max_age)
                    .map(|(idx, _)| idx),
            );
        }
        recycle_queue.sort_unstable();
        recycle_queue.dedup();
        for &slot in recycle_queue.iter() {
            if store.recycle(slot, &PsycheSpawner, rng) {
                links.drop_touching(slot);
                trace!(slot, "recycled psyche particle");
            }
        }
        recycle_queue.len()
    }

    fn stage_links(&mut self, dt: f32) {
        let n = self.store.len();
        self.links.decay(dt, n);
        let state = self.store.state();
        let inputs = LinkInputs {
            index: &self.index,
            valences: &state.valences[..n],
            coherences: &state.coherences[..n],
        };
        self.links.form(&self.config.links, inputs, &mut self.rng);
    }

    fn stage_discharge(&mut self, dt: f32) -> usize {
        let Self {
            config,
            store,
            index,
            pending,
            visuals,
            firing,
            neighbor_scratch,
            ..
        } = self;
        let ColumnsMut {
            positions,
            velocities,
            cooldowns,
            flashes,
            state,
            ..
        } = store.columns_mut();
        let n = positions.len();
        let params = config.discharge_params();
        discharge::collect_firing(&params, &state.charges[..n], &mut state.above_since[..n], dt, firing);
        for &i in firing.iter() {
            let origin = positions[i];
            let energy = discharge::release(
                &params,
                &*index,
                i,
                positions,
                velocities,
                &mut state.charges[..n],
                &mut state.above_since[..n],
                neighbor_scratch,
            );
            flashes[i] = 1.0;
            let color = state.tags[i].map_or([1.0, 0.85, 0.6], Archetype::color);
            visuals.push(VisualEvent::new(VisualKind::Discharge, origin, energy, color));
            if cooldowns[i] <= 0.0 {
                cooldowns[i] = config.event_cooldown;
                pending.push(PsycheEvent::Discharge {
                    particle: i,
                    position: origin,
                    energy,
                });
            }
        }
        firing.len()
    }

    /// Untagged particles off cooldown take the first archetype whose rule matches.
    fn stage_tags(&mut self) {
        let Self {
            config,
            archetypes,
            store,
            metrics,
            rng,
            pending,
            time,
            ..
        } = self;
        let ColumnsMut { cooldowns, state, .. } = store.columns_mut();
        for i in 0..cooldowns.len() {
            if state.tags[i].is_some() || cooldowns[i] > 0.0 {
                continue;
            }
            let Some(archetype) = archetypes.acquire(state.regions[i], &state.inner(i)) else {
                continue;
            };
            state.tags[i] = Some(archetype);
            state.tag_timers[i] = rng.random_range(config.dwell_min..=config.dwell_max);
            cooldowns[i] = config.event_cooldown;
            pending.push(PsycheEvent::TagAcquired { particle: i, archetype });
            metrics.note_archetype(archetype, *time);
        }
    }

    fn stage_metrics(&mut self, dt: f32) {
        if !self.metrics.due(dt) {
            return;
        }
        let aggregates = Aggregates::gather(
            self.store.positions(),
            self.store.state(),
            self.links.len(),
            self.config.links.max_degree,
        );
        let indices = Indices::from_aggregates(&aggregates);
        if let Some((from, to)) = self.metrics.update(indices, self.time + dt) {
            debug!(from = from.name(), to = to.name(), tension = indices.tension, "psyche phase changed");
            self.pending.push(PsycheEvent::PhaseChanged { from, to });
        }
    }

    /// Change the live particle count, spawning as needed. Returns the new count.
    pub fn resize(&mut self, count: usize) -> usize {
        let live = self.store.resize(count, &PsycheSpawner, &mut self.rng);
        self.links.decay(0.0, live);
        live
    }

    /// Switch the motion style; particle identity and all other state are untouched.
    pub fn set_motion_style(&mut self, style: MotionStyle) {
        self.config.motion.style = style;
    }

    #[must_use]
    pub fn config(&self) -> &PsycheConfig {
        &self.config
    }

    #[must_use]
    pub fn archetypes(&self) -> &ArchetypeTable {
        &self.archetypes
    }

    /// Read-only particle columns for renderers.
    #[must_use]
    pub fn store(&self) -> &ParticleStore<PsycheColumns> {
        &self.store
    }

    /// Exclusive access for editors and tests; never hold this across a step.
    #[must_use]
    pub fn store_mut(&mut self) -> &mut ParticleStore<PsycheColumns> {
        &mut self.store
    }

    #[must_use]
    pub fn interactions(&self) -> &InteractionSet {
        &self.interactions
    }

    #[must_use]
    pub fn interactions_mut(&mut self) -> &mut InteractionSet {
        &mut self.interactions
    }

    #[must_use]
    pub fn flow_field(&self) -> &FlowField {
        &self.flow
    }

    #[must_use]
    pub fn links(&self) -> &LinkSet {
        &self.links
    }

    /// Population share of each archetype at the last flow-field refresh.
    #[must_use]
    pub const fn archetype_shares(&self) -> [f32; 6] {
        self.shares
    }

    /// Indices from the most recent evaluation.
    #[must_use]
    pub const fn indices(&self) -> Indices {
        self.metrics.indices()
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.metrics.phase()
    }

    #[must_use]
    pub fn narrative(&self) -> &RingBuffer<NarrativeEntry> {
        self.metrics.narrative()
    }

    #[must_use]
    pub fn visuals(&self) -> &RingBuffer<VisualEvent> {
        &self.visuals
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    #[must_use]
    pub const fn time(&self) -> f32 {
        self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Velocity;

    fn still_config(count: usize) -> PsycheConfig {
        let mut config = PsycheConfig {
            capacity: count,
            particle_count: count,
            rng_seed: Some(21),
            turbulence: 0.0,
            flow_gain: 0.0,
            archetype_gain: 0.0,
            relax_rate: 0.0,
            charge_gain: 0.0,
            ..PsycheConfig::default()
        };
        config.links.probability = 0.0;
        config
    }

    fn freeze(lab: &mut PsycheLab) {
        for v in lab.store_mut().velocities_mut() {
            *v = Velocity::default();
        }
    }

    #[test]
    fn default_run_stays_inside_the_disk() {
        let config = PsycheConfig {
            particle_count: 200,
            rng_seed: Some(5),
            ..PsycheConfig::default()
        };
        let radius = config.boundary_radius;
        let max_speed = config.max_speed;
        let mut lab = PsycheLab::new(config).expect("lab");
        for _ in 0..300 {
            lab.step(1.0 / 60.0, &mut |_| {});
            for (p, v) in lab.store().positions().iter().zip(lab.store().velocities()) {
                assert!(p.is_finite() && v.is_finite());
                assert!(p.x * p.x + p.y * p.y <= radius * radius + 1e-4);
                assert!(v.speed() <= max_speed + 1e-4);
            }
        }
        assert!(lab.links().len() <= lab.config().links.max_links);
    }

    #[test]
    fn non_positive_dt_is_a_no_op() {
        let mut lab = PsycheLab::new(still_config(4)).expect("lab");
        let summary = lab.step(-0.5, &mut |_| panic!("no events expected"));
        assert_eq!(summary.tick, Tick::zero());
        assert_eq!(lab.time(), 0.0);
    }

    #[test]
    fn expired_tags_are_released() {
        let mut lab = PsycheLab::new(still_config(2)).expect("lab");
        {
            let state = lab.store_mut().state_mut();
            state.tags[0] = Some(Archetype::Sage);
            state.tag_timers[0] = 0.01;
        }
        let mut events = Vec::new();
        lab.step(0.016, &mut |event| events.push(event));
        assert!(events.contains(&PsycheEvent::TagReleased {
            particle: 0,
            archetype: Archetype::Sage
        }));
    }

    #[test]
    fn discharge_resets_charge_and_respects_cooldown() {
        let mut config = still_config(2);
        config.discharge_hold = 0.0;
        let reset = config.discharge_reset;
        let mut lab = PsycheLab::new(config).expect("lab");
        freeze(&mut lab);
        let mut events = Vec::new();
        lab.store_mut().state_mut().charges[0] = 0.99;
        lab.step(0.016, &mut |event| events.push(event));
        assert!((lab.store().state().charges[0] - reset).abs() < 1e-6);

        lab.store_mut().state_mut().charges[0] = 0.99;
        lab.step(0.016, &mut |event| events.push(event));
        let discharges = events
            .iter()
            .filter(|event| matches!(event, PsycheEvent::Discharge { particle: 0, .. }))
            .count();
        assert_eq!(discharges, 1);
    }

    #[test]
    fn tense_population_reports_a_phase_change() {
        let mut config = still_config(32);
        config.metrics_interval = 0.01;
        let mut lab = PsycheLab::new(config).expect("lab");
        freeze(&mut lab);
        for (i, p) in lab.store_mut().positions_mut().iter_mut().enumerate() {
            *p = Position::new(i as f32 * 1e-3, -0.6);
        }
        {
            let state = lab.store_mut().state_mut();
            for i in 0..32 {
                state.set_inner(
                    i,
                    InnerState {
                        charge: 0.2,
                        valence: 0.0,
                        coherence: 0.5,
                        arousal: 1.0,
                        inhibition: 1.0,
                    },
                );
            }
        }
        let mut events = Vec::new();
        lab.step(0.016, &mut |event| events.push(event));
        assert!(events.contains(&PsycheEvent::PhaseChanged {
            from: Phase::Equilibrium,
            to: Phase::Repression
        }));
        assert_eq!(lab.phase(), Phase::Repression);
        assert!(lab.indices().tension > 0.9);
        assert!(!lab.narrative().is_empty());
    }

    #[test]
    fn shrinking_drops_links_to_dead_slots() {
        let mut config = still_config(8);
        config.links.probability = 1.0;
        config.links.radius = 0.5;
        config.links.max_valence_gap = 2.0;
        config.links.min_coherence = 0.0;
        let mut lab = PsycheLab::new(config).expect("lab");
        freeze(&mut lab);
        for (i, p) in lab.store_mut().positions_mut().iter_mut().enumerate() {
            *p = Position::new(i as f32 * 0.01, 0.5);
        }
        lab.step(0.016, &mut |_| {});
        assert!(!lab.links().is_empty());
        lab.resize(3);
        assert!(lab.links().links().iter().all(|link| link.a < 3 && link.b < 3));
    }
}
