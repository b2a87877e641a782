//! Rotating step-sequencer ring.

use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::Position;
use crate::music::VoiceRole;

/// Most steps a ring may hold.
pub const MAX_STEPS: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencerStep {
    pub armed: bool,
    /// Semitones added to the chosen particle's pitch.
    #[serde(default)]
    pub pitch_offset: i32,
    pub velocity: f32,
    /// Only particles of this role may answer the step.
    #[serde(default)]
    pub role: Option<VoiceRole>,
    #[serde(skip)]
    pub cooldown: f32,
}

impl SequencerStep {
    #[must_use]
    pub fn armed(velocity: f32) -> Self {
        Self {
            armed: true,
            pitch_offset: 0,
            velocity,
            role: None,
            cooldown: 0.0,
        }
    }
}

/// Ring of steps swept by a cursor; one full revolution is one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequencer {
    pub center: Position,
    pub radius: f32,
    pub steps: Vec<SequencerStep>,
    /// Multiplier on the lab tempo.
    pub tempo: f32,
    /// Seconds a step stays silent after firing.
    pub step_cooldown: f32,
    /// Cursor position in revolutions, `[0, 1)`.
    #[serde(skip)]
    cursor: f32,
}

impl Sequencer {
    #[must_use]
    pub fn new(center: Position, radius: f32, steps: Vec<SequencerStep>) -> Self {
        let mut sequencer = Self {
            center,
            radius,
            steps,
            tempo: 1.0,
            step_cooldown: 0.05,
            cursor: 0.0,
        };
        sequencer.steps.truncate(MAX_STEPS);
        sequencer
    }

    #[must_use]
    pub const fn cursor(&self) -> f32 {
        self.cursor
    }

    /// World position of step `k` on the ring.
    #[must_use]
    pub fn step_position(&self, k: usize) -> Position {
        let n = self.steps.len().max(1);
        let angle = TAU * k as f32 / n as f32;
        Position::new(
            self.center.x + self.radius * angle.cos(),
            self.center.y + self.radius * angle.sin(),
        )
    }

    /// Advance the cursor by `tempo · bpm / 240 · dt` revolutions and collect the armed,
    /// ready steps it swept past into `fired`. Each step fires at most once per call.
    pub fn advance(&mut self, bpm: f32, dt: f32, fired: &mut Vec<usize>) {
        fired.clear();
        for step in &mut self.steps {
            step.cooldown = (step.cooldown - dt).max(0.0);
        }
        let delta = self.tempo * bpm / 240.0 * dt;
        if !delta.is_finite() || delta <= 0.0 || self.steps.is_empty() {
            return;
        }
        let start = self.cursor;
        let end = start + delta;
        let n = self.steps.len() as f32;
        for (k, step) in self.steps.iter_mut().enumerate() {
            let mark = k as f32 / n;
            let next = mark + (start - mark).floor() + 1.0;
            let swept = delta >= 1.0 || next <= end;
            if swept && step.armed && step.cooldown <= 0.0 {
                step.cooldown = self.step_cooldown;
                fired.push(k);
            }
        }
        self.cursor = end.fract();
    }

    pub(crate) fn truncate(&mut self) {
        self.steps.truncate(MAX_STEPS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_steps() -> Sequencer {
        Sequencer::new(Position::default(), 0.5, (0..4).map(|_| SequencerStep::armed(0.8)).collect())
    }

    #[test]
    fn one_bar_fires_every_step_once() {
        let mut sequencer = four_steps();
        let mut fired = Vec::new();
        let mut counts = [0; 4];
        // 120 bpm: one bar lasts two seconds; run a frame past it.
        for _ in 0..121 {
            sequencer.advance(120.0, 2.0 / 120.0, &mut fired);
            for k in &fired {
                counts[*k] += 1;
            }
        }
        assert_eq!(counts, [1, 1, 1, 1]);
    }

    #[test]
    fn disarmed_steps_stay_silent() {
        let mut sequencer = four_steps();
        sequencer.steps[2].armed = false;
        let mut fired = Vec::new();
        sequencer.advance(240.0, 0.9, &mut fired);
        assert_eq!(fired, vec![1, 3]);
    }

    #[test]
    fn huge_steps_fire_each_step_only_once() {
        let mut sequencer = four_steps();
        let mut fired = Vec::new();
        sequencer.advance(240.0, 3.5, &mut fired);
        assert_eq!(fired, vec![0, 1, 2, 3]);
        assert!((sequencer.cursor() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn step_positions_lie_on_the_ring() {
        let sequencer = four_steps();
        let p = sequencer.step_position(1);
        assert!(p.x.abs() < 1e-6);
        assert!((p.y - 0.5).abs() < 1e-6);
    }
}
