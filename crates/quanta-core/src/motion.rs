//! Motion-style library: a closed set of pure force rules plus the shared integration helpers.
//!
//! Every rule reads a start-of-tick snapshot through [`MotionContext`] and returns an
//! additive `(fx, fy)` for one particle. Nothing here mutates particle state, so styles
//! can be swapped between steps without touching identity or any other subsystem.

use std::f32::consts::{PI, TAU};

use quanta_index::NeighborhoodIndex;
use serde::{Deserialize, Serialize};

use crate::geometry::EPSILON;
use crate::{Position, Velocity, curl_noise, hash_noise};

/// Number of distinct group ids a [`RoleMatrix`] can address.
pub const ROLE_SLOTS: usize = 8;

/// Signed attraction of row-group toward column-group (positive chases, negative flees).
pub type RoleMatrix = [[f32; ROLE_SLOTS]; ROLE_SLOTS];

/// Named force rule applied to every particle each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionStyle {
    /// No social force; particles only feel global fields and interaction objects.
    #[default]
    Drift,
    Murmuration,
    School,
    War,
    Polarization,
    Revolution,
    Explosion,
    Carnival,
    Jazz,
    Organism,
    Exodus,
    Dance,
    Chaos,
    Meditation,
    Ballistic,
    Predation,
    Lattice,
}

impl MotionStyle {
    pub const ALL: [Self; 17] = [
        Self::Drift,
        Self::Murmuration,
        Self::School,
        Self::War,
        Self::Polarization,
        Self::Revolution,
        Self::Explosion,
        Self::Carnival,
        Self::Jazz,
        Self::Organism,
        Self::Exodus,
        Self::Dance,
        Self::Chaos,
        Self::Meditation,
        Self::Ballistic,
        Self::Predation,
        Self::Lattice,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Drift => "drift",
            Self::Murmuration => "murmuration",
            Self::School => "school",
            Self::War => "war",
            Self::Polarization => "polarization",
            Self::Revolution => "revolution",
            Self::Explosion => "explosion",
            Self::Carnival => "carnival",
            Self::Jazz => "jazz",
            Self::Organism => "organism",
            Self::Exodus => "exodus",
            Self::Dance => "dance",
            Self::Chaos => "chaos",
            Self::Meditation => "meditation",
            Self::Ballistic => "ballistic",
            Self::Predation => "predation",
            Self::Lattice => "lattice",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|style| style.name() == name)
    }
}

/// How positions are kept inside the world after integration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Toroidal wrap over `[-1, 1]²`.
    #[default]
    Wrap,
    /// Elastic reflection off the `[-1, 1]²` walls.
    Bounce,
    /// Clamp onto a circle and strip the outward velocity component.
    Radial,
}

impl BoundaryPolicy {
    /// Apply the policy in place. `radius` is only used by [`BoundaryPolicy::Radial`].
    pub fn apply(self, position: &mut Position, velocity: &mut Velocity, restitution: f32, radius: f32) {
        match self {
            Self::Wrap => {
                position.x = (position.x + 1.0).rem_euclid(2.0) - 1.0;
                position.y = (position.y + 1.0).rem_euclid(2.0) - 1.0;
            }
            Self::Bounce => {
                bounce_axis(&mut position.x, &mut velocity.vx, restitution);
                bounce_axis(&mut position.y, &mut velocity.vy, restitution);
            }
            Self::Radial => {
                let r = (position.x * position.x + position.y * position.y).sqrt();
                if r > radius && r > EPSILON {
                    let nx = position.x / r;
                    let ny = position.y / r;
                    position.x = nx * radius;
                    position.y = ny * radius;
                    let outward = velocity.vx * nx + velocity.vy * ny;
                    if outward > 0.0 {
                        velocity.vx -= outward * nx;
                        velocity.vy -= outward * ny;
                    }
                }
            }
        }
    }
}

fn bounce_axis(coord: &mut f32, speed: &mut f32, restitution: f32) {
    if *coord > 1.0 {
        *coord = (2.0 - *coord).max(-1.0);
        *speed = -speed.abs() * restitution;
    } else if *coord < -1.0 {
        *coord = (-2.0 - *coord).min(1.0);
        *speed = speed.abs() * restitution;
    }
}

/// Gains and radii for every motion style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionParams {
    /// Active rule.
    pub style: MotionStyle,
    pub separation_radius: f32,
    pub separation_gain: f32,
    pub alignment_radius: f32,
    pub alignment_gain: f32,
    pub cohesion_radius: f32,
    pub cohesion_gain: f32,
    /// Cruising speed the school rule relaxes toward.
    pub preferred_speed: f32,
    pub speed_relax: f32,
    pub pursuit_gain: f32,
    pub flee_gain: f32,
    /// Circular phase difference below which polarized particles attract.
    pub polarization_threshold: f32,
    pub polarization_radius: f32,
    pub polarization_gain: f32,
    /// Distance under which polarized particles always repel.
    pub polarization_separation: f32,
    pub spiral_tangential: f32,
    pub spiral_radial: f32,
    pub spiral_cohesion: f32,
    /// Energy above which revolution particles are flung outward.
    pub ejection_energy: f32,
    pub ejection_gain: f32,
    /// Seconds per explosion burst/regroup cycle.
    pub burst_period: f32,
    pub burst_gain: f32,
    pub regroup_gain: f32,
    pub carnival_centers: usize,
    pub carnival_radius: f32,
    pub carnival_spin: f32,
    pub carnival_pull: f32,
    /// Particles per jazz micro-cluster.
    pub group_size: usize,
    pub group_cohesion: f32,
    pub group_separation: f32,
    pub breath_period: f32,
    pub breath_radius: f32,
    pub breath_amplitude: f32,
    pub breath_gain: f32,
    pub exodus_direction: [f32; 2],
    pub exodus_gain: f32,
    pub orbit_radius: f32,
    pub orbit_spin: f32,
    pub orbit_spring: f32,
    pub chaos_jolt: f32,
    /// Per-tick probability of a chaos burst impulse.
    pub chaos_burst_chance: f32,
    pub chaos_burst_gain: f32,
    pub meditation_noise: f32,
    pub meditation_radius: f32,
    pub meditation_gain: f32,
    pub ballistic_gravity: [f32; 2],
    pub predation_radius: f32,
    pub predation_gain: f32,
    pub role_matrix: RoleMatrix,
    pub lattice_cell: f32,
    pub lattice_gain: f32,
}

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            style: MotionStyle::Drift,
            separation_radius: 0.04,
            separation_gain: 0.8,
            alignment_radius: 0.12,
            alignment_gain: 0.4,
            cohesion_radius: 0.3,
            cohesion_gain: 0.2,
            preferred_speed: 0.4,
            speed_relax: 0.5,
            pursuit_gain: 0.6,
            flee_gain: 0.7,
            polarization_threshold: PI / 3.0,
            polarization_radius: 0.3,
            polarization_gain: 0.5,
            polarization_separation: 0.02,
            spiral_tangential: 0.5,
            spiral_radial: 0.3,
            spiral_cohesion: 0.5,
            ejection_energy: 0.85,
            ejection_gain: 1.2,
            burst_period: 4.0,
            burst_gain: 1.2,
            regroup_gain: 0.6,
            carnival_centers: 3,
            carnival_radius: 0.5,
            carnival_spin: 0.8,
            carnival_pull: 0.3,
            group_size: 6,
            group_cohesion: 1.0,
            group_separation: 0.3,
            breath_period: 6.0,
            breath_radius: 0.35,
            breath_amplitude: 0.15,
            breath_gain: 0.8,
            exodus_direction: [1.0, 0.2],
            exodus_gain: 0.35,
            orbit_radius: 0.06,
            orbit_spin: 0.8,
            orbit_spring: 1.5,
            chaos_jolt: 1.5,
            chaos_burst_chance: 0.02,
            chaos_burst_gain: 4.0,
            meditation_noise: 0.05,
            meditation_radius: 0.45,
            meditation_gain: 0.1,
            ballistic_gravity: [0.0, -0.9],
            predation_radius: 0.35,
            predation_gain: 0.5,
            role_matrix: default_role_matrix(),
            lattice_cell: 0.1,
            lattice_gain: 1.0,
        }
    }
}

/// Each of the first five groups chases the next one around the cycle and flees the previous.
#[must_use]
pub fn default_role_matrix() -> RoleMatrix {
    const CYCLE: usize = 5;
    let mut matrix = [[0.0; ROLE_SLOTS]; ROLE_SLOTS];
    for (hunter, row) in matrix.iter_mut().enumerate().take(CYCLE) {
        row[(hunter + 1) % CYCLE] = 1.0;
        row[(hunter + CYCLE - 1) % CYCLE] = -1.0;
    }
    matrix
}

/// Population aggregates gathered once per tick for rules that need global context.
#[derive(Debug, Clone, Default)]
pub struct PopulationStats {
    pub centroid: Position,
    pub mean_velocity: Velocity,
    /// Centroids of even and odd slots.
    pub parity_centroids: [Position; 2],
    pub group_centroids: [Position; ROLE_SLOTS],
    pub group_counts: [usize; ROLE_SLOTS],
    /// Centroid of each index-modulo micro-cluster.
    pub clusters: Vec<Position>,
    cluster_counts: Vec<usize>,
}

impl PopulationStats {
    /// Recompute aggregates; non-finite rows are skipped.
    pub fn refresh(
        &mut self,
        positions: &[Position],
        velocities: &[Velocity],
        groups: &[u8],
        cluster_size: usize,
    ) {
        let n = positions.len();
        let cluster_count = n.div_ceil(cluster_size.max(1)).max(1);
        self.clusters.clear();
        self.clusters.resize(cluster_count, Position::default());
        self.cluster_counts.clear();
        self.cluster_counts.resize(cluster_count, 0);

        let mut sum = (0.0, 0.0, 0.0, 0.0);
        let mut counted = 0usize;
        let mut parity = [(0.0f32, 0.0f32, 0usize); 2];
        let mut grouped = [(0.0f32, 0.0f32, 0usize); ROLE_SLOTS];
        for (idx, pos) in positions.iter().enumerate() {
            let vel = velocities.get(idx).copied().unwrap_or_default();
            if !pos.is_finite() || !vel.is_finite() {
                continue;
            }
            sum.0 += pos.x;
            sum.1 += pos.y;
            sum.2 += vel.vx;
            sum.3 += vel.vy;
            counted += 1;

            let side = &mut parity[idx % 2];
            side.0 += pos.x;
            side.1 += pos.y;
            side.2 += 1;

            let group = groups.get(idx).map_or(0, |g| *g as usize % ROLE_SLOTS);
            let slot = &mut grouped[group];
            slot.0 += pos.x;
            slot.1 += pos.y;
            slot.2 += 1;

            let cluster = idx % cluster_count;
            self.clusters[cluster].x += pos.x;
            self.clusters[cluster].y += pos.y;
            self.cluster_counts[cluster] += 1;
        }

        let mean = |x: f32, y: f32, count: usize| {
            if count == 0 {
                Position::default()
            } else {
                Position::new(x / count as f32, y / count as f32)
            }
        };
        self.centroid = mean(sum.0, sum.1, counted);
        let velocity = mean(sum.2, sum.3, counted);
        self.mean_velocity = Velocity::new(velocity.x, velocity.y);
        for (target, (x, y, count)) in self.parity_centroids.iter_mut().zip(parity) {
            *target = mean(x, y, count);
        }
        for (slot, (x, y, count)) in grouped.into_iter().enumerate() {
            self.group_centroids[slot] = mean(x, y, count);
            self.group_counts[slot] = count;
        }
        for (centroid, count) in self.clusters.iter_mut().zip(&self.cluster_counts) {
            *centroid = mean(centroid.x, centroid.y, *count);
        }
    }

    /// Micro-cluster id of a slot.
    #[must_use]
    pub fn cluster_of(&self, idx: usize) -> usize {
        idx % self.clusters.len().max(1)
    }
}

/// Read-only snapshot handed to every rule.
pub struct MotionContext<'a> {
    pub positions: &'a [Position],
    pub velocities: &'a [Velocity],
    /// Oscillator phase (or opinion angle) per particle; may be empty.
    pub phases: &'a [f32],
    /// Primary energy scalar per particle; may be empty.
    pub energies: &'a [f32],
    /// Role / tag group id per particle, indexing [`RoleMatrix`]; may be empty.
    pub groups: &'a [u8],
    /// Index rebuilt from `positions` this tick.
    pub index: &'a dyn NeighborhoodIndex,
    pub stats: &'a PopulationStats,
    pub params: &'a MotionParams,
    pub time: f32,
    pub tick: u64,
}

impl MotionContext<'_> {
    fn phase(&self, idx: usize) -> f32 {
        self.phases.get(idx).copied().unwrap_or(0.0)
    }

    fn energy(&self, idx: usize) -> f32 {
        self.energies.get(idx).copied().unwrap_or(0.0)
    }

    fn group(&self, idx: usize) -> usize {
        self.groups.get(idx).map_or(0, |g| *g as usize % ROLE_SLOTS)
    }

    /// Visit neighbours with their distance and the unit vector pointing at them.
    fn neighbors(&self, idx: usize, radius: f32, mut f: impl FnMut(usize, f32, (f32, f32))) {
        let origin = self.positions[idx];
        let len = self.positions.len();
        self.index
            .neighbors_within(idx, radius * radius, &mut |other, dist_sq| {
                if other >= len {
                    return;
                }
                let target = self.positions[other];
                let dist = dist_sq.into_inner().sqrt();
                let dir = if dist > EPSILON {
                    ((target.x - origin.x) / dist, (target.y - origin.y) / dist)
                } else {
                    let angle = hash_noise(idx, self.tick, other as u64) * PI;
                    (angle.cos(), angle.sin())
                };
                f(other, dist, dir);
            });
    }

    fn separation(&self, idx: usize, radius: f32, gain: f32) -> (f32, f32) {
        if radius <= 0.0 || gain == 0.0 {
            return (0.0, 0.0);
        }
        let mut force = (0.0, 0.0);
        self.neighbors(idx, radius, |_, dist, dir| {
            let w = 1.0 - dist / radius;
            force.0 -= dir.0 * w;
            force.1 -= dir.1 * w;
        });
        (force.0 * gain, force.1 * gain)
    }

    fn alignment(&self, idx: usize, radius: f32, gain: f32) -> (f32, f32) {
        let mut sum = (0.0, 0.0, 0usize);
        self.neighbors(idx, radius, |other, _, _| {
            let v = self.velocities[other];
            sum.0 += v.vx;
            sum.1 += v.vy;
            sum.2 += 1;
        });
        if sum.2 == 0 {
            return (0.0, 0.0);
        }
        let own = self.velocities[idx];
        let n = sum.2 as f32;
        ((sum.0 / n - own.vx) * gain, (sum.1 / n - own.vy) * gain)
    }
}

/// Fill `out` with the active style's force for every particle in the snapshot.
pub fn compute_forces(ctx: &MotionContext<'_>, out: &mut Vec<(f32, f32)>) {
    out.clear();
    let style = ctx.params.style;
    out.extend((0..ctx.positions.len()).map(|idx| {
        let force = motion_force(style, ctx, idx);
        if force.0.is_finite() && force.1.is_finite() {
            force
        } else {
            (0.0, 0.0)
        }
    }));
}

/// Force contribution of `style` on particle `idx`.
#[must_use]
pub fn motion_force(style: MotionStyle, ctx: &MotionContext<'_>, idx: usize) -> (f32, f32) {
    match style {
        MotionStyle::Drift => (0.0, 0.0),
        MotionStyle::Murmuration => murmuration(ctx, idx),
        MotionStyle::School => school(ctx, idx),
        MotionStyle::War => war(ctx, idx),
        MotionStyle::Polarization => polarization(ctx, idx),
        MotionStyle::Revolution => revolution(ctx, idx),
        MotionStyle::Explosion => explosion(ctx, idx),
        MotionStyle::Carnival => carnival(ctx, idx),
        MotionStyle::Jazz => jazz(ctx, idx),
        MotionStyle::Organism => organism(ctx, idx),
        MotionStyle::Exodus => exodus(ctx, idx),
        MotionStyle::Dance => dance(ctx, idx),
        MotionStyle::Chaos => chaos(ctx, idx),
        MotionStyle::Meditation => meditation(ctx, idx),
        MotionStyle::Ballistic => {
            let g = ctx.params.ballistic_gravity;
            (g[0], g[1])
        }
        MotionStyle::Predation => predation(ctx, idx),
        MotionStyle::Lattice => lattice(ctx, idx),
    }
}

fn add(a: (f32, f32), b: (f32, f32)) -> (f32, f32) {
    (a.0 + b.0, a.1 + b.1)
}

fn toward(from: Position, to: Position, gain: f32) -> (f32, f32) {
    ((to.x - from.x) * gain, (to.y - from.y) * gain)
}

/// Radial unit vector and tangent (counter-clockwise) of `p` around `center`, plus the radius.
fn polar_frame(p: Position, center: Position) -> ((f32, f32), (f32, f32), f32) {
    let dx = p.x - center.x;
    let dy = p.y - center.y;
    let r = (dx * dx + dy * dy).sqrt();
    if r < EPSILON {
        return ((0.0, 0.0), (0.0, 0.0), r);
    }
    let radial = (dx / r, dy / r);
    (radial, (-radial.1, radial.0), r)
}

fn murmuration(ctx: &MotionContext<'_>, idx: usize) -> (f32, f32) {
    let p = ctx.params;
    let pos = ctx.positions[idx];
    let vel = ctx.velocities[idx];
    let radius = p.cohesion_radius.max(p.alignment_radius).max(p.separation_radius);
    let mut sep = (0.0, 0.0);
    let mut align = (0.0, 0.0, 0usize);
    let mut coh = (0.0, 0.0, 0usize);
    ctx.neighbors(idx, radius, |other, dist, dir| {
        if dist < p.separation_radius {
            let w = 1.0 - dist / p.separation_radius;
            sep.0 -= dir.0 * w;
            sep.1 -= dir.1 * w;
        }
        if dist < p.alignment_radius {
            let v = ctx.velocities[other];
            align.0 += v.vx;
            align.1 += v.vy;
            align.2 += 1;
        }
        if dist < p.cohesion_radius {
            let q = ctx.positions[other];
            coh.0 += q.x;
            coh.1 += q.y;
            coh.2 += 1;
        }
    });
    let mut force = (sep.0 * p.separation_gain, sep.1 * p.separation_gain);
    if align.2 > 0 {
        let n = align.2 as f32;
        force.0 += (align.0 / n - vel.vx) * p.alignment_gain;
        force.1 += (align.1 / n - vel.vy) * p.alignment_gain;
    }
    if coh.2 > 0 {
        let n = coh.2 as f32;
        force = add(force, toward(pos, Position::new(coh.0 / n, coh.1 / n), p.cohesion_gain));
    }
    force
}

fn school(ctx: &MotionContext<'_>, idx: usize) -> (f32, f32) {
    let p = ctx.params;
    let vel = ctx.velocities[idx];
    let mut repel = (0.0, 0.0);
    let mut align = (0.0, 0.0, 0usize);
    let mut attract = (0.0, 0.0, 0usize);
    ctx.neighbors(idx, p.cohesion_radius, |other, dist, dir| {
        if dist < p.separation_radius {
            repel.0 -= dir.0;
            repel.1 -= dir.1;
        } else if dist < p.alignment_radius {
            let v = ctx.velocities[other];
            align.0 += v.vx;
            align.1 += v.vy;
            align.2 += 1;
        } else {
            attract.0 += dir.0;
            attract.1 += dir.1;
            attract.2 += 1;
        }
    });
    let mut force = (repel.0 * p.separation_gain, repel.1 * p.separation_gain);
    if align.2 > 0 {
        let n = align.2 as f32;
        force.0 += (align.0 / n - vel.vx) * p.alignment_gain;
        force.1 += (align.1 / n - vel.vy) * p.alignment_gain;
    }
    if attract.2 > 0 {
        let n = attract.2 as f32;
        force.0 += attract.0 / n * p.cohesion_gain;
        force.1 += attract.1 / n * p.cohesion_gain;
    }
    let speed = vel.speed();
    if speed > EPSILON {
        let relax = (p.preferred_speed - speed) * p.speed_relax / speed;
        force.0 += vel.vx * relax;
        force.1 += vel.vy * relax;
    }
    force
}

fn war(ctx: &MotionContext<'_>, idx: usize) -> (f32, f32) {
    let p = ctx.params;
    let faction = idx % 2;
    let mut crowd = (0.0, 0.0);
    let mut nearest: Option<(f32, (f32, f32))> = None;
    ctx.neighbors(idx, p.cohesion_radius, |other, dist, dir| {
        if other % 2 == faction {
            if dist < p.separation_radius {
                let w = 1.0 - dist / p.separation_radius;
                crowd.0 -= dir.0 * w;
                crowd.1 -= dir.1 * w;
            }
        } else if nearest.is_none_or(|(best, _)| dist < best) {
            nearest = Some((dist, dir));
        }
    });
    let mut force = (crowd.0 * p.separation_gain, crowd.1 * p.separation_gain);
    match (faction, nearest) {
        (0, Some((_, dir))) => force = add(force, (dir.0 * p.pursuit_gain, dir.1 * p.pursuit_gain)),
        (_, Some((_, dir))) => force = add(force, (-dir.0 * p.flee_gain, -dir.1 * p.flee_gain)),
        (0, None) => {
            let target = ctx.stats.parity_centroids[1];
            let (radial, _, _) = polar_frame(target, ctx.positions[idx]);
            force = add(force, (radial.0 * p.pursuit_gain * 0.5, radial.1 * p.pursuit_gain * 0.5));
        }
        (_, None) => {}
    }
    force
}

fn polarization(ctx: &MotionContext<'_>, idx: usize) -> (f32, f32) {
    let p = ctx.params;
    let own = ctx.phase(idx);
    let radius = p.polarization_radius.max(EPSILON);
    let mut force = (0.0, 0.0);
    ctx.neighbors(idx, radius, |other, dist, dir| {
        let w = 1.0 - dist / radius;
        let gain = if dist < p.polarization_separation {
            -p.separation_gain
        } else if crate::wrap_signed_angle(own - ctx.phase(other)).abs() < p.polarization_threshold {
            p.polarization_gain
        } else {
            -p.polarization_gain
        };
        force.0 += dir.0 * gain * w;
        force.1 += dir.1 * gain * w;
    });
    force
}

fn revolution(ctx: &MotionContext<'_>, idx: usize) -> (f32, f32) {
    let p = ctx.params;
    let (radial, tangent, r) = polar_frame(ctx.positions[idx], ctx.stats.centroid);
    let pull = p.spiral_radial * (1.0 + p.spiral_cohesion) * r;
    let mut force = (
        tangent.0 * p.spiral_tangential - radial.0 * pull,
        tangent.1 * p.spiral_tangential - radial.1 * pull,
    );
    if ctx.energy(idx) > p.ejection_energy {
        force = add(force, (radial.0 * p.ejection_gain, radial.1 * p.ejection_gain));
    }
    force
}

fn explosion(ctx: &MotionContext<'_>, idx: usize) -> (f32, f32) {
    let p = ctx.params;
    let pos = ctx.positions[idx];
    let cycle = if p.burst_period > EPSILON {
        (ctx.time / p.burst_period).fract()
    } else {
        0.5
    };
    let core = if cycle < 0.25 {
        let (radial, _, _) = polar_frame(pos, ctx.stats.centroid);
        (radial.0 * p.burst_gain, radial.1 * p.burst_gain)
    } else {
        toward(pos, ctx.stats.centroid, p.regroup_gain)
    };
    add(core, ctx.separation(idx, p.separation_radius, p.separation_gain))
}

fn carnival(ctx: &MotionContext<'_>, idx: usize) -> (f32, f32) {
    let p = ctx.params;
    let pos = ctx.positions[idx];
    let centers = p.carnival_centers.max(1);
    let radius = p.carnival_radius.max(EPSILON);
    let mut force = (0.0, 0.0);
    for k in 0..centers {
        let angle = ctx.time * 0.3 + k as f32 * TAU / centers as f32;
        let center = Position::new(0.5 * angle.cos(), 0.5 * angle.sin());
        let (radial, tangent, r) = polar_frame(pos, center);
        if r >= radius {
            continue;
        }
        let w = 1.0 - r / radius;
        let spin = if k % 2 == 0 { p.carnival_spin } else { -p.carnival_spin };
        force.0 += w * (tangent.0 * spin - radial.0 * p.carnival_pull);
        force.1 += w * (tangent.1 * spin - radial.1 * p.carnival_pull);
    }
    force
}

fn jazz(ctx: &MotionContext<'_>, idx: usize) -> (f32, f32) {
    let p = ctx.params;
    let pos = ctx.positions[idx];
    let cluster = ctx.stats.cluster_of(idx);
    let home = ctx.stats.clusters.get(cluster).copied().unwrap_or(pos);
    let mut force = toward(pos, home, p.group_cohesion);
    let mut apart = (0.0, 0.0);
    ctx.neighbors(idx, p.alignment_radius, |other, dist, dir| {
        if ctx.stats.cluster_of(other) != cluster {
            let w = 1.0 - dist / p.alignment_radius;
            apart.0 -= dir.0 * w;
            apart.1 -= dir.1 * w;
        }
    });
    force.0 += apart.0 * p.group_separation;
    force.1 += apart.1 * p.group_separation;
    add(force, ctx.separation(idx, p.separation_radius, p.separation_gain))
}

fn organism(ctx: &MotionContext<'_>, idx: usize) -> (f32, f32) {
    let p = ctx.params;
    let (radial, _, r) = polar_frame(ctx.positions[idx], ctx.stats.centroid);
    let breath = if p.breath_period > EPSILON {
        (TAU * ctx.time / p.breath_period).sin()
    } else {
        0.0
    };
    let target = p.breath_radius + p.breath_amplitude * breath;
    let spring = (target - r) * p.breath_gain;
    add(
        (radial.0 * spring, radial.1 * spring),
        ctx.separation(idx, p.separation_radius, p.separation_gain * 2.0),
    )
}

fn exodus(ctx: &MotionContext<'_>, idx: usize) -> (f32, f32) {
    let p = ctx.params;
    let [dx, dy] = p.exodus_direction;
    let len = (dx * dx + dy * dy).sqrt();
    let bias = if len > EPSILON {
        (dx / len * p.exodus_gain, dy / len * p.exodus_gain)
    } else {
        (0.0, 0.0)
    };
    let local = add(
        ctx.alignment(idx, p.alignment_radius, p.alignment_gain),
        ctx.separation(idx, p.separation_radius, p.separation_gain),
    );
    add(bias, local)
}

fn dance(ctx: &MotionContext<'_>, idx: usize) -> (f32, f32) {
    let p = ctx.params;
    let pos = ctx.positions[idx];
    let mut partner: Option<(usize, f32)> = None;
    ctx.neighbors(idx, p.cohesion_radius, |other, dist, _| {
        if partner.is_none_or(|(_, best)| dist < best) {
            partner = Some((other, dist));
        }
    });
    let Some((other, _)) = partner else {
        return (0.0, 0.0);
    };
    let (radial, tangent, r) = polar_frame(pos, ctx.positions[other]);
    let spin = if idx % 2 == 0 { p.orbit_spin } else { -p.orbit_spin };
    let spring = (p.orbit_radius - r) * p.orbit_spring;
    (
        tangent.0 * spin + radial.0 * spring,
        tangent.1 * spin + radial.1 * spring,
    )
}

fn chaos(ctx: &MotionContext<'_>, idx: usize) -> (f32, f32) {
    let p = ctx.params;
    let mut force = (
        hash_noise(idx, ctx.tick, 1) * p.chaos_jolt,
        hash_noise(idx, ctx.tick, 2) * p.chaos_jolt,
    );
    let roll = (hash_noise(idx, ctx.tick, 3) + 1.0) * 0.5;
    if roll < p.chaos_burst_chance {
        force.0 += hash_noise(idx, ctx.tick, 4) * p.chaos_burst_gain;
        force.1 += hash_noise(idx, ctx.tick, 5) * p.chaos_burst_gain;
    }
    add(force, toward(ctx.positions[idx], ctx.stats.centroid, 0.05))
}

fn meditation(ctx: &MotionContext<'_>, idx: usize) -> (f32, f32) {
    let p = ctx.params;
    let pos = ctx.positions[idx];
    let (nx, ny) = curl_noise(pos.x, pos.y, ctx.time * 0.1);
    let (radial, tangent, r) = polar_frame(pos, Position::default());
    let spring = p.meditation_radius - r;
    (
        nx * p.meditation_noise + p.meditation_gain * (tangent.0 * 0.5 + radial.0 * spring),
        ny * p.meditation_noise + p.meditation_gain * (tangent.1 * 0.5 + radial.1 * spring),
    )
}

fn predation(ctx: &MotionContext<'_>, idx: usize) -> (f32, f32) {
    let p = ctx.params;
    let own = ctx.group(idx);
    let radius = p.predation_radius.max(EPSILON);
    let mut chase = (0.0, 0.0);
    let mut align = (0.0, 0.0, 0usize);
    ctx.neighbors(idx, radius, |other, dist, dir| {
        let theirs = ctx.group(other);
        if theirs == own {
            let v = ctx.velocities[other];
            align.0 += v.vx;
            align.1 += v.vy;
            align.2 += 1;
        } else {
            let w = (1.0 - dist / radius) * p.role_matrix[own][theirs];
            chase.0 += dir.0 * w;
            chase.1 += dir.1 * w;
        }
    });
    let mut force = (chase.0 * p.predation_gain, chase.1 * p.predation_gain);
    if align.2 > 0 {
        let vel = ctx.velocities[idx];
        let n = align.2 as f32;
        force.0 += (align.0 / n - vel.vx) * p.alignment_gain;
        force.1 += (align.1 / n - vel.vy) * p.alignment_gain;
    }
    force
}

fn lattice(ctx: &MotionContext<'_>, idx: usize) -> (f32, f32) {
    let p = ctx.params;
    if p.lattice_cell <= EPSILON {
        return (0.0, 0.0);
    }
    let pos = ctx.positions[idx];
    let snapped = Position::new(
        (pos.x / p.lattice_cell).round() * p.lattice_cell,
        (pos.y / p.lattice_cell).round() * p.lattice_cell,
    );
    toward(pos, snapped, p.lattice_gain)
}

/// Per-tick velocity decay for a damping factor expressed per 60 Hz frame.
#[must_use]
pub fn damping_factor(damping: f32, dt: f32) -> f32 {
    damping.powf(dt * 60.0)
}

/// `v = (v + F·dt)·decay`, then clamp to `max_speed`.
#[must_use]
pub fn integrate_velocity(v: Velocity, force: (f32, f32), dt: f32, decay: f32, max_speed: f32) -> Velocity {
    clamp_speed(
        Velocity::new((v.vx + force.0 * dt) * decay, (v.vy + force.1 * dt) * decay),
        max_speed,
    )
}

/// Scale `v` down so its magnitude does not exceed `max_speed`.
#[must_use]
pub fn clamp_speed(v: Velocity, max_speed: f32) -> Velocity {
    let speed = v.speed();
    if speed > max_speed && speed > EPSILON {
        let scale = max_speed / speed;
        Velocity::new(v.vx * scale, v.vy * scale)
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quanta_index::UniformGridIndex;

    struct Fixture {
        positions: Vec<Position>,
        velocities: Vec<Velocity>,
        phases: Vec<f32>,
        groups: Vec<u8>,
        index: UniformGridIndex,
        stats: PopulationStats,
        params: MotionParams,
    }

    impl Fixture {
        fn new(positions: Vec<Position>, style: MotionStyle) -> Self {
            let n = positions.len();
            let velocities = vec![Velocity::default(); n];
            let mut index = UniformGridIndex::new(0.1, 1.0);
            let points: Vec<(f32, f32)> = positions.iter().map(|p| (p.x, p.y)).collect();
            index.rebuild(&points).expect("rebuild");
            let groups: Vec<u8> = (0..n).map(|i| (i % 5) as u8).collect();
            let mut stats = PopulationStats::default();
            stats.refresh(&positions, &velocities, &groups, 6);
            Self {
                positions,
                velocities,
                phases: vec![0.0; n],
                groups,
                index,
                stats,
                params: MotionParams {
                    style,
                    ..MotionParams::default()
                },
            }
        }

        fn force(&self, idx: usize) -> (f32, f32) {
            let ctx = MotionContext {
                positions: &self.positions,
                velocities: &self.velocities,
                phases: &self.phases,
                energies: &[],
                groups: &self.groups,
                index: &self.index,
                stats: &self.stats,
                params: &self.params,
                time: 1.0,
                tick: 7,
            };
            motion_force(self.params.style, &ctx, idx)
        }
    }

    fn scattered(n: usize) -> Vec<Position> {
        (0..n)
            .map(|i| Position::new(hash_noise(i, 0, 11) * 0.8, hash_noise(i, 0, 12) * 0.8))
            .collect()
    }

    #[test]
    fn every_style_yields_finite_forces() {
        for style in MotionStyle::ALL {
            let fixture = Fixture::new(scattered(64), style);
            for idx in 0..64 {
                let (fx, fy) = fixture.force(idx);
                assert!(fx.is_finite() && fy.is_finite(), "{style:?} produced non-finite force");
            }
        }
    }

    #[test]
    fn style_names_round_trip() {
        for style in MotionStyle::ALL {
            assert_eq!(MotionStyle::from_name(style.name()), Some(style));
        }
        assert_eq!(MotionStyle::from_name("waltz"), None);
    }

    #[test]
    fn polarization_attracts_similar_and_repels_dissimilar() {
        let mut fixture = Fixture::new(
            vec![Position::new(0.0, 0.0), Position::new(0.05, 0.0)],
            MotionStyle::Polarization,
        );
        fixture.phases = vec![0.0, 0.2];
        assert!(fixture.force(0).0 > 0.0);
        fixture.phases = vec![0.0, 2.5];
        assert!(fixture.force(0).0 < 0.0);
    }

    #[test]
    fn lattice_pulls_toward_nearest_grid_point() {
        let fixture = Fixture::new(vec![Position::new(0.13, -0.28)], MotionStyle::Lattice);
        let (fx, fy) = fixture.force(0);
        assert!(fx < 0.0);
        assert!(fy < 0.0);
    }

    #[test]
    fn dance_springs_toward_partner_and_spins_by_parity() {
        let fixture = Fixture::new(
            vec![Position::new(0.0, 0.0), Position::new(0.1, 0.0)],
            MotionStyle::Dance,
        );
        let even = fixture.force(0);
        let odd = fixture.force(1);
        assert!(even.0 > 0.0);
        assert!(odd.0 < 0.0);
        // Mirrored frames with opposite spin push the pair the same way.
        assert!(even.1 < 0.0);
        assert!(odd.1 < 0.0);
    }

    #[test]
    fn ballistic_is_pure_gravity() {
        let fixture = Fixture::new(scattered(4), MotionStyle::Ballistic);
        assert_eq!(fixture.force(2), (0.0, -0.9));
    }

    #[test]
    fn speed_clamp_preserves_direction() {
        let v = clamp_speed(Velocity::new(3.0, 4.0), 1.0);
        assert!((v.speed() - 1.0).abs() < 1e-6);
        assert!((v.vx - 0.6).abs() < 1e-6);
        let slow = Velocity::new(0.1, 0.0);
        assert_eq!(clamp_speed(slow, 1.0), slow);
    }

    #[test]
    fn damping_is_frame_rate_independent() {
        let one = damping_factor(0.9, 1.0 / 30.0);
        let two = damping_factor(0.9, 1.0 / 60.0).powi(2);
        assert!((one - two).abs() < 1e-5);
    }

    #[test]
    fn boundary_policies_keep_particles_inside() {
        let mut p = Position::new(1.2, -1.1);
        let mut v = Velocity::new(0.5, -0.5);
        BoundaryPolicy::Wrap.apply(&mut p, &mut v, 0.8, 1.0);
        assert!((p.x + 0.8).abs() < 1e-5 && (p.y - 0.9).abs() < 1e-5);

        let mut p = Position::new(1.2, 0.0);
        let mut v = Velocity::new(0.5, 0.0);
        BoundaryPolicy::Bounce.apply(&mut p, &mut v, 0.8, 1.0);
        assert!((p.x - 0.8).abs() < 1e-5);
        assert!((v.vx + 0.4).abs() < 1e-6);

        let mut p = Position::new(0.0, 1.5);
        let mut v = Velocity::new(0.2, 0.7);
        BoundaryPolicy::Radial.apply(&mut p, &mut v, 0.8, 0.95);
        assert!((p.y - 0.95).abs() < 1e-6);
        assert_eq!(v, Velocity::new(0.2, 0.0));
    }

    #[test]
    fn default_matrix_is_a_chase_cycle() {
        let matrix = default_role_matrix();
        assert_eq!(matrix[0][1], 1.0);
        assert_eq!(matrix[1][0], -1.0);
        assert_eq!(matrix[4][0], 1.0);
        assert_eq!(matrix[0][0], 0.0);
    }
}
