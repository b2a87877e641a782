//! Discrete records handed to external consumers: notes, visual flashes, narrative lines.

use serde::{Deserialize, Serialize};

use crate::Position;
use crate::music::VoiceRole;
use crate::ring::RingBuffer;

/// Which path of the event layer produced a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteSource {
    Discharge,
    Gate,
    Encounter,
    SyncBurst,
    Sequencer,
    String,
    Zone,
}

/// Abstract note record consumed by an external synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Semitone number (MIDI-style, 60 = middle C).
    pub pitch: i32,
    /// Loudness in `[0, 1]`.
    pub velocity: f32,
    pub role: VoiceRole,
    pub position: Position,
    /// Duration in seconds.
    pub duration: f32,
    /// Brightness of the timbre in `[0, 1]`.
    pub timbre: f32,
    /// Stable per-particle timbre variant, when the voice has one.
    pub timbre_index: Option<u8>,
    pub source: NoteSource,
    /// Slot of the particle that produced the note.
    pub particle: usize,
}

/// Kinds of short-lived visual records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualKind {
    Ripple,
    Flash,
    Teleport,
    Discharge,
    Pluck,
    Absorb,
    Burst,
}

impl VisualKind {
    /// Lifetime in seconds.
    #[must_use]
    pub const fn ttl(self) -> f32 {
        match self {
            Self::Ripple => 0.8,
            Self::Flash => 0.25,
            Self::Teleport => 0.4,
            Self::Discharge => 0.6,
            Self::Pluck => 0.5,
            Self::Absorb => 0.35,
            Self::Burst => 1.0,
        }
    }
}

/// Short-lived visual event record (ripple, flash, teleport trail).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisualEvent {
    pub kind: VisualKind,
    pub position: Position,
    pub age: f32,
    pub ttl: f32,
    pub intensity: f32,
    pub color: [f32; 3],
}

impl VisualEvent {
    #[must_use]
    pub fn new(kind: VisualKind, position: Position, intensity: f32, color: [f32; 3]) -> Self {
        Self {
            kind,
            position,
            age: 0.0,
            ttl: kind.ttl(),
            intensity: crate::clamp01(intensity),
            color,
        }
    }

    /// Normalised age in `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> f32 {
        if self.ttl <= 0.0 {
            1.0
        } else {
            crate::clamp01(self.age / self.ttl)
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.age >= self.ttl
    }
}

/// Age every visual record by `dt` and drop expired entries from the front.
///
/// Records expiring behind a longer-lived head stay until they reach the front;
/// consumers skip them with [`VisualEvent::is_expired`].
pub fn age_visuals(visuals: &mut RingBuffer<VisualEvent>, dt: f32) {
    visuals.for_each_mut(|event| event.age += dt);
    visuals.pop_front_while(VisualEvent::is_expired);
}

/// Timestamped narrative line for the UI log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeEntry {
    pub text: String,
    pub color: [f32; 3],
    /// Simulation time in seconds.
    pub time: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visuals_expire_after_their_ttl() {
        let mut ring = RingBuffer::new(4);
        ring.push(VisualEvent::new(
            VisualKind::Flash,
            Position::default(),
            2.0,
            [1.0, 1.0, 1.0],
        ));
        ring.push(VisualEvent::new(
            VisualKind::Burst,
            Position::default(),
            0.5,
            [1.0, 0.0, 0.0],
        ));
        assert_eq!(ring.front().map(|e| e.intensity), Some(1.0));
        age_visuals(&mut ring, 0.3);
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.front().map(|e| e.kind), Some(VisualKind::Burst));
        age_visuals(&mut ring, 0.8);
        assert!(ring.is_empty());
    }
}
