//! Fixed-capacity struct-of-arrays particle storage.
//!
//! Every column is allocated at full capacity when the store is created and never
//! reallocated; only the logical count moves. Lab-specific inner state lives in a
//! second set of columns (`C`) owned by the store so that recycling can reset both
//! halves of a slot together.

use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

use crate::{MAX_CAPACITY, Position, Velocity};

/// Distinguishes first-time spawns from in-place resets of a slot that has lived before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpawnKind {
    /// The slot has never held a particle; identity fields must be assigned.
    Fresh,
    /// The slot is being reused; identity fields must be preserved.
    Recycled,
}

/// Lab-specific per-particle columns.
pub trait StateColumns {
    /// Allocate columns holding `capacity` rows.
    fn with_capacity(capacity: usize) -> Self;
}

/// Spawn distribution used to populate and recycle slots.
pub trait Spawner<C> {
    /// Reset the inner-state row at `slot` and return its initial kinematics.
    fn spawn(
        &self,
        rng: &mut SmallRng,
        slot: usize,
        state: &mut C,
        kind: SpawnKind,
    ) -> (Position, Velocity);
}

/// Flat arena of per-particle position history with ring semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailRing {
    cap: usize,
    points: Vec<Position>,
    heads: Vec<u16>,
    lens: Vec<u16>,
}

impl TrailRing {
    /// Allocate trails of `cap` points for `capacity` particles; `cap == 0` disables trails.
    #[must_use]
    pub fn new(capacity: usize, cap: usize) -> Self {
        let cap = cap.min(u16::MAX as usize);
        Self {
            cap,
            points: vec![Position::default(); capacity * cap],
            heads: vec![0; capacity],
            lens: vec![0; capacity],
        }
    }

    /// Points retained per particle.
    #[must_use]
    pub const fn cap(&self) -> usize {
        self.cap
    }

    /// Number of points currently stored for `slot`.
    #[must_use]
    pub fn len(&self, slot: usize) -> usize {
        self.lens.get(slot).map_or(0, |len| *len as usize)
    }

    /// Append a point, dropping the oldest past the cap.
    pub fn push(&mut self, slot: usize, point: Position) {
        if self.cap == 0 || slot >= self.heads.len() {
            return;
        }
        let base = slot * self.cap;
        let len = self.lens[slot] as usize;
        let head = self.heads[slot] as usize;
        if len < self.cap {
            self.points[base + (head + len) % self.cap] = point;
            self.lens[slot] += 1;
        } else {
            self.points[base + head] = point;
            self.heads[slot] = ((head + 1) % self.cap) as u16;
        }
    }

    /// Forget the history of `slot`.
    pub fn clear(&mut self, slot: usize) {
        if slot < self.heads.len() {
            self.heads[slot] = 0;
            self.lens[slot] = 0;
        }
    }

    /// Iterate a slot's history oldest to newest.
    pub fn iter(&self, slot: usize) -> impl Iterator<Item = Position> + '_ {
        let len = self.len(slot);
        let head = self.heads.get(slot).map_or(0, |head| *head as usize);
        let base = slot * self.cap;
        (0..len).map(move |offset| self.points[base + (head + offset) % self.cap])
    }
}

/// Mutable split borrow of every column for the integrator's hot loop.
pub struct ColumnsMut<'a, C> {
    pub positions: &'a mut [Position],
    pub previous: &'a mut [Position],
    pub velocities: &'a mut [Velocity],
    pub ages: &'a mut [f32],
    pub cooldowns: &'a mut [f32],
    pub portal_locks: &'a mut [f32],
    pub flashes: &'a mut [f32],
    pub trails: &'a mut TrailRing,
    pub state: &'a mut C,
}

/// Particle storage with a static capacity and a logical `len`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticleStore<C> {
    capacity: usize,
    count: usize,
    high_water: usize,
    positions: Vec<Position>,
    previous: Vec<Position>,
    velocities: Vec<Velocity>,
    ages: Vec<f32>,
    cooldowns: Vec<f32>,
    portal_locks: Vec<f32>,
    flashes: Vec<f32>,
    trails: TrailRing,
    state: C,
}

impl<C: StateColumns> ParticleStore<C> {
    /// Allocate `capacity` slots and spawn `initial_count` particles.
    ///
    /// Both values are clamped: capacity to [`MAX_CAPACITY`], the count to capacity.
    pub fn create(
        capacity: usize,
        initial_count: usize,
        trail_len: usize,
        spawner: &impl Spawner<C>,
        rng: &mut SmallRng,
    ) -> Self {
        let capacity = capacity.min(MAX_CAPACITY);
        let mut store = Self {
            capacity,
            count: 0,
            high_water: 0,
            positions: vec![Position::default(); capacity],
            previous: vec![Position::default(); capacity],
            velocities: vec![Velocity::default(); capacity],
            ages: vec![0.0; capacity],
            cooldowns: vec![0.0; capacity],
            portal_locks: vec![0.0; capacity],
            flashes: vec![0.0; capacity],
            trails: TrailRing::new(capacity, trail_len),
            state: C::with_capacity(capacity),
        };
        store.resize(initial_count, spawner, rng);
        store
    }
}

impl<C> ParticleStore<C> {
    /// Fixed number of slots.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live particles.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Returns true when no particles are live.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Set the live count, spawning new particles when growing. Returns the new count.
    ///
    /// Requests beyond capacity are clamped; shrinking keeps the data in place.
    pub fn resize(&mut self, new_count: usize, spawner: &impl Spawner<C>, rng: &mut SmallRng) -> usize {
        let target = new_count.min(self.capacity);
        for slot in self.count..target {
            let kind = if slot < self.high_water {
                SpawnKind::Recycled
            } else {
                SpawnKind::Fresh
            };
            self.reset_slot(slot, spawner, rng, kind);
        }
        self.count = target;
        self.high_water = self.high_water.max(target);
        self.count
    }

    /// Reset one live slot from the spawn distribution, preserving identity fields.
    ///
    /// Returns false (and does nothing) for indices outside `[0, len)`.
    pub fn recycle(&mut self, index: usize, spawner: &impl Spawner<C>, rng: &mut SmallRng) -> bool {
        if index >= self.count {
            return false;
        }
        self.reset_slot(index, spawner, rng, SpawnKind::Recycled);
        true
    }

    fn reset_slot(&mut self, slot: usize, spawner: &impl Spawner<C>, rng: &mut SmallRng, kind: SpawnKind) {
        let (position, velocity) = spawner.spawn(rng, slot, &mut self.state, kind);
        let (position, velocity) = if position.is_finite() && velocity.is_finite() {
            (position, velocity)
        } else {
            (Position::default(), Velocity::default())
        };
        self.positions[slot] = position;
        self.previous[slot] = position;
        self.velocities[slot] = velocity;
        self.ages[slot] = 0.0;
        self.cooldowns[slot] = 0.0;
        self.portal_locks[slot] = 0.0;
        self.flashes[slot] = 0.0;
        self.trails.clear(slot);
    }

    /// Copy current positions into the previous-position column.
    pub fn record_previous(&mut self) {
        let n = self.count;
        self.previous[..n].copy_from_slice(&self.positions[..n]);
    }

    /// Advance ages and decay cooldowns, portal locks and flashes by `dt`.
    pub fn tick_timers(&mut self, dt: f32, flash_decay: f32) {
        let n = self.count;
        for age in &mut self.ages[..n] {
            *age += dt;
        }
        for cooldown in &mut self.cooldowns[..n] {
            *cooldown = (*cooldown - dt).max(0.0);
        }
        for lock in &mut self.portal_locks[..n] {
            *lock = (*lock - dt).max(0.0);
        }
        for flash in &mut self.flashes[..n] {
            *flash = (*flash - flash_decay * dt).max(0.0);
        }
    }

    /// Whether the particle at `index` has finite kinematics.
    #[must_use]
    pub fn is_finite(&self, index: usize) -> bool {
        index < self.count && self.positions[index].is_finite() && self.velocities[index].is_finite()
    }

    /// Split borrow of all live columns.
    pub fn columns_mut(&mut self) -> ColumnsMut<'_, C> {
        let n = self.count;
        ColumnsMut {
            positions: &mut self.positions[..n],
            previous: &mut self.previous[..n],
            velocities: &mut self.velocities[..n],
            ages: &mut self.ages[..n],
            cooldowns: &mut self.cooldowns[..n],
            portal_locks: &mut self.portal_locks[..n],
            flashes: &mut self.flashes[..n],
            trails: &mut self.trails,
            state: &mut self.state,
        }
    }

    #[must_use]
    pub fn positions(&self) -> &[Position] {
        &self.positions[..self.count]
    }

    #[must_use]
    pub fn positions_mut(&mut self) -> &mut [Position] {
        &mut self.positions[..self.count]
    }

    #[must_use]
    pub fn previous(&self) -> &[Position] {
        &self.previous[..self.count]
    }

    #[must_use]
    pub fn velocities(&self) -> &[Velocity] {
        &self.velocities[..self.count]
    }

    #[must_use]
    pub fn velocities_mut(&mut self) -> &mut [Velocity] {
        &mut self.velocities[..self.count]
    }

    #[must_use]
    pub fn ages(&self) -> &[f32] {
        &self.ages[..self.count]
    }

    #[must_use]
    pub fn ages_mut(&mut self) -> &mut [f32] {
        &mut self.ages[..self.count]
    }

    /// Remaining event cooldown per particle, in seconds.
    #[must_use]
    pub fn cooldowns(&self) -> &[f32] {
        &self.cooldowns[..self.count]
    }

    #[must_use]
    pub fn cooldowns_mut(&mut self) -> &mut [f32] {
        &mut self.cooldowns[..self.count]
    }

    /// Remaining tunnel lock per particle, in seconds.
    #[must_use]
    pub fn portal_locks(&self) -> &[f32] {
        &self.portal_locks[..self.count]
    }

    /// Recently-fired flash intensity in `[0, 1]`.
    #[must_use]
    pub fn flashes(&self) -> &[f32] {
        &self.flashes[..self.count]
    }

    #[must_use]
    pub fn trails(&self) -> &TrailRing {
        &self.trails
    }

    /// Lab-specific columns. Rows at or beyond [`len`](Self::len) hold stale data.
    #[must_use]
    pub fn state(&self) -> &C {
        &self.state
    }

    #[must_use]
    pub fn state_mut(&mut self) -> &mut C {
        &mut self.state
    }
}
