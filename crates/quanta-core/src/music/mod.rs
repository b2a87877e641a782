//! Music lab: particles as voices.
//!
//! Each step runs a fixed pipeline of stages. Forces come from the active motion
//! style plus interaction objects; the integrator then resolves tunnels, cages, zones,
//! strings and gates in that order. Notes produced anywhere in the step are buffered
//! and handed to the caller's callback before `step` returns.

mod columns;
pub mod metrics;
pub mod roles;

use quanta_index::{NeighborhoodIndex, UniformGridIndex};
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::MusicConfig;
use crate::discharge;
use crate::events::{NoteEvent, NoteSource, VisualEvent, VisualKind, age_visuals};
use crate::interaction::{GateKind, InteractionSet, ZoneTarget};
use crate::motion::{
    MotionContext, MotionStyle, PopulationStats, clamp_speed, compute_forces, damping_factor,
    integrate_velocity,
};
use crate::ring::RingBuffer;
use crate::store::{ColumnsMut, ParticleStore};
use crate::{
    LabError, MAX_CAPACITY, MAX_DT, POSITION_SCALE, Position, Tick, clamp01, curl_noise,
    hash_noise, wrap_signed_angle,
};

pub use columns::{MusicColumns, MusicSpawner};
pub use metrics::{OrderParameter, RoleEnergy};
pub use roles::{HarmonyMode, RoleSpec, RoleTable, Scale, VoiceRole, consonance};

/// Charge kept by a particle caught in an absorber gate.
const ABSORB_CHARGE_KEEP: f32 = 0.2;

/// Summary of one music step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicTick {
    /// Tick reached after the step.
    pub tick: Tick,
    pub notes: usize,
    pub discharges: usize,
    pub recycled: usize,
}

/// Builds note records for a particle.
struct Voicing<'a> {
    config: &'a MusicConfig,
    roles: &'a RoleTable,
}

impl Voicing<'_> {
    fn pitch(&self, state: &MusicColumns, slot: usize) -> i32 {
        let spec = self.roles.spec(state.roles[slot]);
        self.config.root
            + spec.base_pitch
            + self.config.scale.semitone(state.degrees[slot])
            + i32::from(state.transpose[slot])
    }

    /// Note for `slot`, or `None` when a zone has muted it.
    fn note(
        &self,
        state: &MusicColumns,
        slot: usize,
        position: Position,
        velocity: f32,
        source: NoteSource,
    ) -> Option<NoteEvent> {
        if state.muted[slot] {
            return None;
        }
        let role = state.roles[slot];
        let spec = self.roles.spec(role);
        Some(NoteEvent {
            pitch: self.pitch(state, slot),
            velocity: clamp01(velocity),
            role,
            position,
            duration: spec.duration,
            timbre: clamp01(spec.timbre + 0.5 * state.brightness[slot]),
            timbre_index: state.timbre_indices[slot],
            source,
            particle: slot,
        })
    }

    /// Note gated by the particle cooldown; firing arms the cooldown and the flash.
    #[allow(clippy::too_many_arguments)]
    fn cooled_note(
        &self,
        state: &MusicColumns,
        cooldown: &mut f32,
        flash: &mut f32,
        slot: usize,
        position: Position,
        velocity: f32,
        source: NoteSource,
    ) -> Option<NoteEvent> {
        if *cooldown > 0.0 {
            return None;
        }
        let note = self.note(state, slot, position, velocity, source)?;
        *cooldown = self.config.note_cooldown;
        *flash = 1.0;
        Some(note)
    }
}

fn spawner<'a>(config: &MusicConfig, roles: &'a RoleTable) -> MusicSpawner<'a> {
    MusicSpawner {
        roles,
        scale: config.scale,
        radius: config.spawn_radius,
        natural_frequency: config.natural_frequency,
        frequency_spread: config.frequency_spread,
    }
}

/// The Music particle system.
#[derive(Debug, Clone)]
pub struct MusicLab {
    config: MusicConfig,
    roles: RoleTable,
    store: ParticleStore<MusicColumns>,
    interactions: InteractionSet,
    index: UniformGridIndex,
    rng: SmallRng,
    tick: Tick,
    time: f32,
    order: OrderParameter,
    role_energy: RoleEnergy,
    burst_cooldown: f32,
    visuals: RingBuffer<VisualEvent>,
    forces: Vec<(f32, f32)>,
    grid_points: Vec<(f32, f32)>,
    groups: Vec<u8>,
    stats: PopulationStats,
    pending: Vec<NoteEvent>,
    recycle_queue: Vec<usize>,
    firing: Vec<usize>,
    neighbor_scratch: Vec<(usize, f32)>,
    fired_steps: Vec<usize>,
}

impl MusicLab {
    /// Build a lab from `config`; the interaction layout is moved out of the config.
    pub fn new(mut config: MusicConfig) -> Result<Self, LabError> {
        config.validate()?;
        if config.capacity > MAX_CAPACITY {
            debug!(requested = config.capacity, limit = MAX_CAPACITY, "music capacity clamped");
        }
        if config.particle_count > config.capacity.min(MAX_CAPACITY) {
            debug!(
                requested = config.particle_count,
                capacity = config.capacity.min(MAX_CAPACITY),
                "music particle count clamped"
            );
        }
        let roles = RoleTable::with_overrides(&config.roles);
        let mut interactions = std::mem::take(&mut config.interactions);
        interactions.sanitize();
        let mut rng = crate::seeded_rng(config.rng_seed);
        let store = ParticleStore::create(
            config.capacity,
            config.particle_count,
            config.trail_len,
            &spawner(&config, &roles),
            &mut rng,
        );
        let cell_size = config.discharge_radius.max(config.encounter_radius).max(0.05);
        let visuals = RingBuffer::new(config.visual_capacity);
        Ok(Self {
            config,
            roles,
            store,
            interactions,
            index: UniformGridIndex::new(cell_size, 1.0),
            rng,
            tick: Tick::zero(),
            time: 0.0,
            order: OrderParameter::default(),
            role_energy: RoleEnergy::default(),
            burst_cooldown: 0.0,
            visuals,
            forces: Vec::new(),
            grid_points: Vec::new(),
            groups: Vec::new(),
            stats: PopulationStats::default(),
            pending: Vec::new(),
            recycle_queue: Vec::new(),
            firing: Vec::new(),
            neighbor_scratch: Vec::new(),
            fired_steps: Vec::new(),
        })
    }

    /// Advance the simulation by `dt` seconds, handing every note to `emit`.
    ///
    /// `dt` is clamped to [`MAX_DT`]; non-positive or non-finite values do nothing.
    pub fn step(&mut self, dt: f32, emit: &mut dyn FnMut(NoteEvent)) -> MusicTick {
        let mut summary = MusicTick {
            tick: self.tick,
            ..MusicTick::default()
        };
        if !(dt.is_finite() && dt > 0.0) {
            return summary;
        }
        let dt = dt.min(MAX_DT);
        self.pending.clear();

        self.stage_timers(dt);
        self.stage_inner_state(dt);
        self.stage_forces();
        self.stage_integrate(dt);
        summary.recycled = self.stage_lifecycle();
        self.rebuild_index();
        summary.discharges = self.stage_discharge(dt);
        self.stage_encounters();
        self.stage_sync();
        self.stage_sequencer(dt);
        self.stage_role_energy(dt);
        age_visuals(&mut self.visuals, dt);
        self.interactions.tick(dt);

        summary.notes = self.pending.len();
        for note in self.pending.drain(..) {
            emit(note);
        }
        self.time += dt;
        self.tick = self.tick.next();
        summary.tick = self.tick;
        summary
    }

    fn stage_timers(&mut self, dt: f32) {
        self.store.tick_timers(dt, self.config.flash_decay);
        self.burst_cooldown = (self.burst_cooldown - dt).max(0.0);
    }

    /// Charge accumulation, Kuramoto phase coupling and brightness decay.
    fn stage_inner_state(&mut self, dt: f32) {
        let config = &self.config;
        let order = self.order;
        let cols = self.store.columns_mut();
        for i in 0..cols.positions.len() {
            let speed = cols.velocities[i].speed();
            let charge = &mut cols.state.charges[i];
            *charge = clamp01(*charge + (config.charge_rate + config.speed_charge_gain * speed) * dt);

            let theta = cols.state.phases[i];
            let pull = config.coupling * order.magnitude * (order.mean_phase - theta).sin();
            cols.state.phases[i] = wrap_signed_angle(theta + (cols.state.frequencies[i] + pull) * dt);

            let brightness = &mut cols.state.brightness[i];
            *brightness = (*brightness - dt).max(0.0);
        }
    }

    fn rebuild_index(&mut self) {
        self.grid_points.clear();
        self.grid_points
            .extend(self.store.positions().iter().map(|p| (p.x, p.y)));
        if let Err(err) = self.index.rebuild(&self.grid_points) {
            debug!(?err, "music neighbourhood index rebuild failed");
        }
    }

    /// Motion-style forces from the start-of-tick snapshot plus global fields.
    fn stage_forces(&mut self) {
        self.rebuild_index();
        let n = self.store.len();
        let state = self.store.state();
        self.groups.clear();
        self.groups
            .extend(state.roles[..n].iter().map(|role| role.index() as u8));
        self.stats.refresh(
            self.store.positions(),
            self.store.velocities(),
            &self.groups,
            self.config.motion.group_size,
        );
        let ctx = MotionContext {
            positions: self.store.positions(),
            velocities: self.store.velocities(),
            phases: &state.phases[..n],
            energies: &state.charges[..n],
            groups: &self.groups,
            index: &self.index,
            stats: &self.stats,
            params: &self.config.motion,
            time: self.time,
            tick: self.tick.0,
        };
        compute_forces(&ctx, &mut self.forces);

        let [gx, gy] = self.config.gravity;
        let turbulence = self.config.turbulence;
        let positions = self.store.positions();
        for (force, p) in self.forces.iter_mut().zip(positions) {
            let (fx, fy) = self.interactions.field_force(*p, self.time);
            let (nx, ny) = if turbulence == 0.0 {
                (0.0, 0.0)
            } else {
                curl_noise(p.x, p.y, self.time)
            };
            force.0 += gx + fx + nx * turbulence;
            force.1 += gy + fy + ny * turbulence;
        }
    }

    /// Integrate every particle and resolve interaction objects in priority order.
    fn stage_integrate(&mut self, dt: f32) {
        let Self {
            config,
            roles,
            store,
            interactions,
            forces,
            pending,
            visuals,
            recycle_queue,
            tick,
            ..
        } = self;
        let config: &MusicConfig = config;
        let voicing = Voicing { config, roles };
        let decay = damping_factor(config.damping, dt);
        let boundary = config.effective_boundary();
        let tick = tick.0;
        let ColumnsMut {
            positions,
            previous,
            velocities,
            cooldowns,
            portal_locks,
            flashes,
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
            let unbounded = Position::new(
                start.x + v.vx * dt * POSITION_SCALE,
                start.y + v.vy * dt * POSITION_SCALE,
            );
            let mut p = unbounded;
            boundary.apply(&mut p, &mut v, config.restitution, 1.0);
            // A wrapped path would cross the whole world; segment tests start afresh.
            let mut path_start = if p.distance_sq(unbounded) > 1.0 { p } else { start };

            if portal_locks[i] <= 0.0 {
                let jitter = (
                    hash_noise(i, tick, 41) * config.teleport_jitter,
                    hash_noise(i, tick, 42) * config.teleport_jitter,
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

            state.transpose[i] = 0;
            state.muted[i] = false;
            let outcome = {
                let mut target = ZoneTarget {
                    velocity: &mut v,
                    energy: &mut state.charges[i],
                    phase: Some(&mut state.phases[i]),
                    transpose: Some(&mut state.transpose[i]),
                    brightness: Some(&mut state.brightness[i]),
                    muted: Some(&mut state.muted[i]),
                };
                interactions.apply_zones(p, &mut target, dt, i, tick)
            };
            v = clamp_speed(v, config.max_speed);
            if outcome.retrigger {
                let velocity = 0.4 + 0.6 * state.charges[i];
                if let Some(note) =
                    voicing.cooled_note(state, &mut cooldowns[i], &mut flashes[i], i, p, velocity, NoteSource::Zone)
                {
                    pending.push(note);
                }
            }

            if let Some((string_idx, strength)) = interactions.strike_strings(path_start, &mut p, &mut v) {
                let string = &interactions.strings()[string_idx];
                let color = roles.spec(state.roles[i]).color;
                visuals.push(VisualEvent::new(VisualKind::Pluck, p, strength, color));
                let velocity = strength / config.max_speed;
                if let Some(mut note) = voicing.cooled_note(
                    state,
                    &mut cooldowns[i],
                    &mut flashes[i],
                    i,
                    p,
                    velocity,
                    NoteSource::String,
                ) {
                    note.pitch = config.root + string.pitch_offset + i32::from(state.transpose[i]);
                    pending.push(note);
                }
            }

            if let Some(hit) = interactions.resolve_gates(path_start, &mut p, &mut v) {
                let gate_color = interactions.gates()[hit.gate].color;
                match hit.kind {
                    GateKind::Trigger => {
                        if cooldowns[i] <= 0.0 && !state.muted[i] && interactions.fire_gate(hit.gate) {
                            let offset = interactions.gates()[hit.gate].pitch_offset;
                            let velocity = 0.5 + 0.5 * v.speed() / config.max_speed;
                            if let Some(mut note) = voicing.cooled_note(
                                state,
                                &mut cooldowns[i],
                                &mut flashes[i],
                                i,
                                hit.point,
                                velocity,
                                NoteSource::Gate,
                            ) {
                                note.pitch += offset;
                                pending.push(note);
                            }
                            visuals.push(VisualEvent::new(VisualKind::Flash, hit.point, velocity, gate_color));
                        }
                    }
                    GateKind::Absorber => {
                        state.charges[i] *= ABSORB_CHARGE_KEEP;
                        visuals.push(VisualEvent::new(VisualKind::Absorb, hit.point, 0.6, gate_color));
                    }
                    GateKind::Mirror | GateKind::Membrane => {}
                }
            }

            if !(p.is_finite() && v.is_finite()) {
                recycle_queue.push(i);
                continue;
            }
            positions[i] = p;
            velocities[i] = v;
            trails.push(i, p);
        }
    }

    /// Recycle corrupted and expired particles in place. Returns how many were recycled.
    fn stage_lifecycle(&mut self) -> usize {
        let Self {
            config,
            roles,
            store,
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
        let spawner = spawner(config, roles);
        for &slot in recycle_queue.iter() {
            if store.recycle(slot, &spawner, rng) {
                trace!(slot, "recycled music particle");
            }
        }
        recycle_queue.len()
    }

    /// Discharge particles whose charge stayed above threshold long enough.
    fn stage_discharge(&mut self, dt: f32) -> usize {
        let Self {
            config,
            roles,
            store,
            index,
            pending,
            visuals,
            firing,
            neighbor_scratch,
            ..
        } = self;
        let config: &MusicConfig = config;
        let voicing = Voicing { config, roles };
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
            let color = roles.spec(state.roles[i]).color;
            visuals.push(VisualEvent::new(VisualKind::Discharge, origin, energy, color));
            if let Some(note) = voicing.cooled_note(
                state,
                &mut cooldowns[i],
                &mut flashes[i],
                i,
                origin,
                energy,
                NoteSource::Discharge,
            ) {
                pending.push(note);
            }
        }
        firing.len()
    }

    /// Every few ticks, sound the first harmonically compatible close pairs.
    fn stage_encounters(&mut self) {
        let interval = self.config.encounter_interval;
        if interval == 0 || !self.tick.0.is_multiple_of(u64::from(interval)) {
            return;
        }
        let Self {
            config,
            roles,
            store,
            index,
            pending,
            neighbor_scratch,
            ..
        } = self;
        let config: &MusicConfig = config;
        let voicing = Voicing { config, roles };
        let ColumnsMut {
            positions,
            cooldowns,
            flashes,
            state,
            ..
        } = store.columns_mut();
        let n = positions.len();
        let radius_sq = config.encounter_radius * config.encounter_radius;

        let mut found = 0;
        for i in 0..n {
            if found >= config.max_encounters {
                break;
            }
            if cooldowns[i] > 0.0 || state.muted[i] {
                continue;
            }
            neighbor_scratch.clear();
            index.neighbors_within(i, radius_sq, &mut |j, dist_sq| {
                if j > i && j < n {
                    neighbor_scratch.push((j, dist_sq.into_inner()));
                }
            });
            neighbor_scratch.sort_by(|a, b| a.1.total_cmp(&b.1));
            let pitch = voicing.pitch(state, i);
            let partner = neighbor_scratch.iter().map(|(j, _)| *j).find(|&j| {
                cooldowns[j] <= 0.0
                    && !state.muted[j]
                    && config
                        .harmony_mode
                        .accepts(consonance(pitch, voicing.pitch(state, j)), config.consonance_threshold)
            });
            let Some(j) = partner else {
                continue;
            };
            let score = consonance(pitch, voicing.pitch(state, j));
            let midpoint = Position::new(
                (positions[i].x + positions[j].x) * 0.5,
                (positions[i].y + positions[j].y) * 0.5,
            );
            if let Some(note) = voicing.cooled_note(
                state,
                &mut cooldowns[i],
                &mut flashes[i],
                i,
                midpoint,
                0.35 + 0.4 * score,
                NoteSource::Encounter,
            ) {
                pending.push(note);
                cooldowns[j] = config.note_cooldown;
                flashes[j] = 1.0;
                found += 1;
            }
        }
    }

    /// Measure phase synchrony and fire a burst from particles near phase zero.
    fn stage_sync(&mut self) {
        let interval = self.config.sync_interval;
        if interval == 0 || !self.tick.0.is_multiple_of(u64::from(interval)) {
            return;
        }
        let n = self.store.len();
        self.order = OrderParameter::measure(&self.store.state().phases[..n]);
        if self.order.magnitude <= self.config.sync_threshold || self.burst_cooldown > 0.0 {
            return;
        }
        self.burst_cooldown = self.config.sync_cooldown;
        let Self {
            config,
            roles,
            store,
            pending,
            visuals,
            order,
            stats,
            ..
        } = self;
        let config: &MusicConfig = config;
        let voicing = Voicing { config, roles };
        let ColumnsMut {
            positions,
            cooldowns,
            flashes,
            state,
            ..
        } = store.columns_mut();
        let mut fired = 0;
        for i in 0..positions.len() {
            if fired >= config.sync_max_notes {
                break;
            }
            if state.phases[i].abs() >= config.sync_window {
                continue;
            }
            if let Some(note) = voicing.cooled_note(
                state,
                &mut cooldowns[i],
                &mut flashes[i],
                i,
                positions[i],
                order.magnitude,
                NoteSource::SyncBurst,
            ) {
                pending.push(note);
                fired += 1;
            }
        }
        debug!(order = order.magnitude, fired, "sync burst");
        visuals.push(VisualEvent::new(
            VisualKind::Burst,
            stats.centroid,
            order.magnitude,
            [1.0, 1.0, 1.0],
        ));
    }

    /// Fire swept sequencer steps against the globally nearest eligible particle.
    fn stage_sequencer(&mut self, dt: f32) {
        self.interactions
            .advance_sequencer(self.config.bpm, dt, &mut self.fired_steps);
        if self.fired_steps.is_empty() {
            return;
        }
        let Self {
            config,
            roles,
            store,
            interactions,
            pending,
            visuals,
            fired_steps,
            ..
        } = self;
        let Some(sequencer) = interactions.sequencer() else {
            return;
        };
        let config: &MusicConfig = config;
        let voicing = Voicing { config, roles };
        let ColumnsMut {
            positions,
            flashes,
            state,
            ..
        } = store.columns_mut();
        for &k in fired_steps.iter() {
            let step = &sequencer.steps[k];
            let anchor = sequencer.step_position(k);
            let nearest = (0..positions.len())
                .filter(|&i| step.role.is_none_or(|role| state.roles[i] == role))
                .min_by(|&a, &b| {
                    positions[a]
                        .distance_sq(anchor)
                        .total_cmp(&positions[b].distance_sq(anchor))
                });
            let Some(i) = nearest else {
                continue;
            };
            if let Some(mut note) = voicing.note(state, i, positions[i], step.velocity, NoteSource::Sequencer) {
                note.pitch += step.pitch_offset;
                pending.push(note);
                flashes[i] = 1.0;
            }
            let color = roles.spec(state.roles[i]).color;
            visuals.push(VisualEvent::new(VisualKind::Ripple, anchor, step.velocity, color));
        }
    }

    fn stage_role_energy(&mut self, dt: f32) {
        self.role_energy.decay(self.config.role_energy_decay, dt);
        for note in &self.pending {
            self.role_energy.add(note.role, note.velocity);
        }
    }

    /// Change the live particle count, spawning as needed. Returns the new count.
    pub fn resize(&mut self, count: usize) -> usize {
        let spawner = spawner(&self.config, &self.roles);
        self.store.resize(count, &spawner, &mut self.rng)
    }

    /// Switch the motion style; particle identity and all other state are untouched.
    pub fn set_motion_style(&mut self, style: MotionStyle) {
        self.config.motion.style = style;
    }

    /// Sounding pitch of a live particle.
    #[must_use]
    pub fn pitch_of(&self, slot: usize) -> Option<i32> {
        (slot < self.store.len()).then(|| {
            Voicing {
                config: &self.config,
                roles: &self.roles,
            }
            .pitch(self.store.state(), slot)
        })
    }

    #[must_use]
    pub fn config(&self) -> &MusicConfig {
        &self.config
    }

    #[must_use]
    pub fn roles(&self) -> &RoleTable {
        &self.roles
    }

    /// Read-only particle columns for renderers.
    #[must_use]
    pub fn store(&self) -> &ParticleStore<MusicColumns> {
        &self.store
    }

    /// Exclusive access for editors and tests; never hold this across a step.
    #[must_use]
    pub fn store_mut(&mut self) -> &mut ParticleStore<MusicColumns> {
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
    pub fn visuals(&self) -> &RingBuffer<VisualEvent> {
        &self.visuals
    }

    #[must_use]
    pub fn role_energy(&self) -> &RoleEnergy {
        &self.role_energy
    }

    /// Last measured phase synchrony.
    #[must_use]
    pub const fn order_parameter(&self) -> OrderParameter {
        self.order
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Simulated seconds since construction.
    #[must_use]
    pub const fn time(&self) -> f32 {
        self.time
    }
}
