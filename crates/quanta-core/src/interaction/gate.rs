//! Line gates crossed by particle paths.

use serde::{Deserialize, Serialize};

use crate::geometry::{EPSILON, lerp, reflect, segment_intersection, segment_normal, side_of};
use crate::{Position, Velocity};

/// Velocity retained by a particle caught in an absorber.
const ABSORB_RETAIN: f32 = 0.1;

/// Behaviour of a gate when crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    /// Lets the particle through and asks for a note.
    Trigger,
    /// Specular reflection.
    Mirror,
    /// Stops the particle on the line and drains its energy.
    Absorber,
    /// Passes particles moving along the normal, reflects the rest.
    Membrane,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    pub a: Position,
    pub b: Position,
    pub kind: GateKind,
    pub color: [f32; 3],
    /// Seconds a trigger gate stays silent after firing.
    pub cooldown: f32,
    /// Semitones added to the crossing particle's pitch.
    #[serde(default)]
    pub pitch_offset: i32,
    #[serde(skip)]
    pub remaining: f32,
}

impl Gate {
    #[must_use]
    pub fn new(a: Position, b: Position, kind: GateKind) -> Self {
        Self {
            a,
            b,
            kind,
            color: [1.0, 1.0, 1.0],
            cooldown: 0.12,
            pitch_offset: 0,
            remaining: 0.0,
        }
    }

    /// Arm the gate's own cooldown if it is ready; returns whether it fired.
    pub fn fire(&mut self) -> bool {
        if self.remaining > 0.0 {
            return false;
        }
        self.remaining = self.cooldown.max(0.0);
        true
    }
}

/// Result of the first gate crossed this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateHit {
    pub gate: usize,
    pub kind: GateKind,
    pub point: Position,
}

/// Test the path `previous → position` against every gate; the first crossing wins.
///
/// Mirror, absorber and blocking membrane hits rewrite `position`/`velocity` in place.
/// Gates themselves are never touched, so paths that cross nothing change nothing.
pub fn resolve_gates(
    gates: &[Gate],
    previous: Position,
    position: &mut Position,
    velocity: &mut Velocity,
) -> Option<GateHit> {
    let (gate, t) = gates.iter().enumerate().find_map(|(idx, gate)| {
        segment_intersection(previous, *position, gate.a, gate.b).map(|t| (idx, t))
    })?;
    let spec = &gates[gate];
    let point = lerp(previous, *position, t);
    let normal = segment_normal(spec.a, spec.b);
    let origin_side = side_of(previous, spec.a, spec.b);
    match spec.kind {
        GateKind::Trigger => {}
        GateKind::Mirror => bounce_back(point, normal, origin_side, position, velocity),
        GateKind::Absorber => {
            *position = nudge(point, normal, origin_side);
            velocity.vx *= ABSORB_RETAIN;
            velocity.vy *= ABSORB_RETAIN;
        }
        GateKind::Membrane => {
            if origin_side > 0.0 {
                bounce_back(point, normal, origin_side, position, velocity);
            }
        }
    }
    Some(GateHit {
        gate,
        kind: spec.kind,
        point,
    })
}

fn nudge(point: Position, normal: (f32, f32), origin_side: f32) -> Position {
    let sign = if origin_side >= 0.0 { 1.0 } else { -1.0 };
    Position::new(
        point.x + normal.0 * sign * EPSILON * 10.0,
        point.y + normal.1 * sign * EPSILON * 10.0,
    )
}

fn bounce_back(
    point: Position,
    normal: (f32, f32),
    origin_side: f32,
    position: &mut Position,
    velocity: &mut Velocity,
) {
    *velocity = reflect(*velocity, normal);
    *position = nudge(point, normal, origin_side);
}
