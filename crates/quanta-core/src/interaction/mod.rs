//! Spatial interaction objects and the collection that owns them.
//!
//! Each object kind lives in its own module with its force or collision function;
//! [`InteractionSet`] holds bounded collections of them and applies them in the
//! fixed order the integrators rely on.

pub mod field;
pub mod gate;
pub mod portal;
pub mod sequencer;
pub mod string;
pub mod zone;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Position, Velocity};

pub use field::{Channel, ChannelSample, PointField, PointKind, Rail};
pub use gate::{Gate, GateHit, GateKind};
pub use portal::{Cage, CageShape, Tunnel};
pub use sequencer::{Sequencer, SequencerStep};
pub use string::HarmonicString;
pub use zone::{FxEffect, FxZone, ZoneOutcome, ZoneTarget};

pub const MAX_GATES: usize = 32;
pub const MAX_POINT_FIELDS: usize = 32;
pub const MAX_CHANNELS: usize = 16;
pub const MAX_RAILS: usize = 16;
pub const MAX_TUNNELS: usize = 8;
pub const MAX_CAGES: usize = 8;
pub const MAX_STRINGS: usize = 16;
pub const MAX_ZONES: usize = 16;

fn push_bounded<T>(items: &mut Vec<T>, item: T, limit: usize) -> bool {
    if items.len() >= limit {
        return false;
    }
    items.push(item);
    true
}

fn truncate_logged<T>(items: &mut Vec<T>, limit: usize, kind: &'static str) {
    if items.len() > limit {
        debug!(kind, requested = items.len(), limit, "interaction objects clamped to capacity");
        items.truncate(limit);
    }
}

/// Owned, bounded collections of every interaction object kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionSet {
    gates: Vec<Gate>,
    points: Vec<PointField>,
    channels: Vec<Channel>,
    rails: Vec<Rail>,
    tunnels: Vec<Tunnel>,
    cages: Vec<Cage>,
    strings: Vec<HarmonicString>,
    zones: Vec<FxZone>,
    sequencer: Option<Sequencer>,
}

impl InteractionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamp every collection to its ceiling and rebuild cached geometry.
    ///
    /// Needed after deserialising a layout, since derived fields are not persisted.
    pub fn sanitize(&mut self) {
        truncate_logged(&mut self.gates, MAX_GATES, "gates");
        truncate_logged(&mut self.points, MAX_POINT_FIELDS, "points");
        truncate_logged(&mut self.channels, MAX_CHANNELS, "channels");
        truncate_logged(&mut self.rails, MAX_RAILS, "rails");
        truncate_logged(&mut self.tunnels, MAX_TUNNELS, "tunnels");
        truncate_logged(&mut self.cages, MAX_CAGES, "cages");
        truncate_logged(&mut self.strings, MAX_STRINGS, "strings");
        truncate_logged(&mut self.zones, MAX_ZONES, "zones");
        for channel in &mut self.channels {
            channel.truncate();
        }
        for zone in &mut self.zones {
            zone.refresh();
        }
        if let Some(sequencer) = self.sequencer.as_mut() {
            sequencer.truncate();
        }
    }

    pub fn add_gate(&mut self, gate: Gate) -> bool {
        push_bounded(&mut self.gates, gate, MAX_GATES)
    }

    pub fn add_point(&mut self, point: PointField) -> bool {
        push_bounded(&mut self.points, point, MAX_POINT_FIELDS)
    }

    pub fn add_channel(&mut self, mut channel: Channel) -> bool {
        channel.truncate();
        push_bounded(&mut self.channels, channel, MAX_CHANNELS)
    }

    pub fn add_rail(&mut self, rail: Rail) -> bool {
        push_bounded(&mut self.rails, rail, MAX_RAILS)
    }

    pub fn add_tunnel(&mut self, tunnel: Tunnel) -> bool {
        push_bounded(&mut self.tunnels, tunnel, MAX_TUNNELS)
    }

    pub fn add_cage(&mut self, cage: Cage) -> bool {
        push_bounded(&mut self.cages, cage, MAX_CAGES)
    }

    pub fn add_string(&mut self, string: HarmonicString) -> bool {
        push_bounded(&mut self.strings, string, MAX_STRINGS)
    }

    pub fn add_zone(&mut self, mut zone: FxZone) -> bool {
        zone.refresh();
        push_bounded(&mut self.zones, zone, MAX_ZONES)
    }

    /// Install (or replace) the sequencer ring.
    pub fn set_sequencer(&mut self, mut sequencer: Sequencer) {
        sequencer.truncate();
        self.sequencer = Some(sequencer);
    }

    pub fn clear_sequencer(&mut self) {
        self.sequencer = None;
    }

    /// Remove every object.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
            && self.points.is_empty()
            && self.channels.is_empty()
            && self.rails.is_empty()
            && self.tunnels.is_empty()
            && self.cages.is_empty()
            && self.strings.is_empty()
            && self.zones.is_empty()
            && self.sequencer.is_none()
    }

    #[must_use]
    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    #[must_use]
    pub fn points(&self) -> &[PointField] {
        &self.points
    }

    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    #[must_use]
    pub fn rails(&self) -> &[Rail] {
        &self.rails
    }

    #[must_use]
    pub fn tunnels(&self) -> &[Tunnel] {
        &self.tunnels
    }

    #[must_use]
    pub fn cages(&self) -> &[Cage] {
        &self.cages
    }

    #[must_use]
    pub fn strings(&self) -> &[HarmonicString] {
        &self.strings
    }

    #[must_use]
    pub fn zones(&self) -> &[FxZone] {
        &self.zones
    }

    #[must_use]
    pub fn sequencer(&self) -> Option<&Sequencer> {
        self.sequencer.as_ref()
    }

    /// Sum of point-field, channel and rail forces at `p`.
    #[must_use]
    pub fn field_force(&self, p: Position, time: f32) -> (f32, f32) {
        let mut force = (0.0, 0.0);
        let contributions = self
            .points
            .iter()
            .map(|point| point.force(p, time))
            .chain(self.channels.iter().map(|channel| channel.force(p)))
            .chain(self.rails.iter().map(|rail| rail.force(p)));
        for (fx, fy) in contributions {
            force.0 += fx;
            force.1 += fy;
        }
        force
    }

    /// First tunnel whose mouth contains `p`: its index and the exit position.
    pub fn teleport(&self, p: Position, velocity: &mut Velocity, jitter: (f32, f32)) -> Option<(usize, Position)> {
        self.tunnels
            .iter()
            .enumerate()
            .find_map(|(idx, tunnel)| tunnel.teleport(p, velocity, jitter).map(|exit| (idx, exit)))
    }

    /// Let every cage turn back an escaping particle. Returns true if any did.
    pub fn contain(&self, previous: Position, position: &mut Position, velocity: &mut Velocity) -> bool {
        let mut reflected = false;
        for cage in &self.cages {
            reflected |= cage.contain(previous, position, velocity);
        }
        reflected
    }

    pub fn apply_zones(
        &self,
        p: Position,
        target: &mut ZoneTarget<'_>,
        dt: f32,
        slot: usize,
        tick: u64,
    ) -> ZoneOutcome {
        zone::apply_zones(&self.zones, p, target, dt, slot, tick)
    }

    /// First string crossed by the path: its index and the strike strength.
    pub fn strike_strings(
        &mut self,
        previous: Position,
        position: &mut Position,
        velocity: &mut Velocity,
    ) -> Option<(usize, f32)> {
        self.strings
            .iter_mut()
            .enumerate()
            .find_map(|(idx, string)| string.strike(previous, position, velocity).map(|s| (idx, s)))
    }

    pub fn resolve_gates(
        &self,
        previous: Position,
        position: &mut Position,
        velocity: &mut Velocity,
    ) -> Option<GateHit> {
        gate::resolve_gates(&self.gates, previous, position, velocity)
    }

    /// Fire gate `idx` if its own cooldown has elapsed.
    pub fn fire_gate(&mut self, idx: usize) -> bool {
        self.gates.get_mut(idx).is_some_and(Gate::fire)
    }

    /// Advance the sequencer cursor, collecting fired step indices.
    pub fn advance_sequencer(&mut self, bpm: f32, dt: f32, fired: &mut Vec<usize>) {
        match self.sequencer.as_mut() {
            Some(sequencer) => sequencer.advance(bpm, dt, fired),
            None => fired.clear(),
        }
    }

    /// Decay gate cooldowns and ring the strings.
    pub fn tick(&mut self, dt: f32) {
        for gate in &mut self.gates {
            gate.remaining = (gate.remaining - dt).max(0.0);
        }
        for string in &mut self.strings {
            string.vibrate(dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn additions_past_capacity_are_refused() {
        let mut set = InteractionSet::new();
        for _ in 0..MAX_TUNNELS {
            assert!(set.add_tunnel(Tunnel::new(Position::new(-0.5, 0.0), Position::new(0.5, 0.0), 0.05)));
        }
        assert!(!set.add_tunnel(Tunnel::new(Position::default(), Position::new(0.1, 0.0), 0.05)));
        assert_eq!(set.tunnels().len(), MAX_TUNNELS);
    }

    #[test]
    fn sanitize_clamps_deserialised_layouts() {
        let rail = serde_json::json!({
            "a": {"x": 0.0, "y": 0.0},
            "b": {"x": 0.5, "y": 0.0},
            "strength": 0.1,
            "max_force": 1.0
        });
        let rails: Vec<_> = (0..MAX_RAILS + 4).map(|_| rail.clone()).collect();
        let mut set: InteractionSet =
            serde_json::from_value(serde_json::json!({ "rails": rails })).expect("layout");
        assert_eq!(set.rails().len(), MAX_RAILS + 4);
        set.sanitize();
        assert_eq!(set.rails().len(), MAX_RAILS);
        assert!(set.gates().is_empty());
    }

    #[test]
    fn gate_cooldown_decays_with_tick() {
        let mut set = InteractionSet::new();
        set.add_gate(Gate::new(Position::new(0.0, -1.0), Position::new(0.0, 1.0), GateKind::Trigger));
        assert!(set.fire_gate(0));
        assert!(!set.fire_gate(0));
        set.tick(0.5);
        assert!(set.fire_gate(0));
        assert!(!set.fire_gate(3));
    }

    #[test]
    fn zones_added_at_runtime_are_ready_for_containment() {
        let mut set = InteractionSet::new();
        let zone = FxZone::new(
            vec![Position::new(-0.1, -0.1), Position::new(0.1, -0.1), Position::new(0.0, 0.1)],
            FxEffect::Slow,
            1.0,
            0.0,
        );
        assert!(set.add_zone(zone));
        assert!(set.zones()[0].contains(Position::new(0.0, 0.0)));
        assert!(!set.is_empty());
        set.clear();
        assert!(set.is_empty());
    }
}
