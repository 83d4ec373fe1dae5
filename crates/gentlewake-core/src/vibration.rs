//! Escalating vibration patterns.
//!
//! A pattern is a table of steps. Each step plays a prefix of one of the
//! segment tables (alternating on/off milliseconds) and names the delay until
//! the next step. Running off the end of a table means the wearer slept
//! through it; the machine then snoozes or resets.

use serde::{Deserialize, Serialize};

use crate::storage::config::VibePattern;

/// Literal on/off segment tables, in milliseconds.
const SEGMENTS: [&[u32]; 5] = [
    &[250, 750],
    &[300, 300, 300, 1100],
    &[600, 400, 600, 400, 600],
    &[1000, 500, 1000, 500, 1000],
    &[1500, 400, 1500, 400, 1500, 400],
];

/// One step of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternStep {
    pub next_delay_secs: u32,
    pub segment_index: usize,
    pub segment_length: usize,
}

const fn step(next_delay_secs: u32, segment_index: usize, segment_length: usize) -> PatternStep {
    PatternStep {
        next_delay_secs,
        segment_index,
        segment_length,
    }
}

const GENTLE: [PatternStep; 16] = [
    step(10, 0, 2),
    step(10, 0, 2),
    step(10, 0, 2),
    step(8, 1, 2),
    step(8, 1, 4),
    step(8, 1, 4),
    step(6, 2, 3),
    step(6, 2, 5),
    step(6, 2, 5),
    step(6, 2, 5),
    step(5, 3, 3),
    step(5, 3, 5),
    step(5, 3, 5),
    step(5, 3, 5),
    step(5, 4, 4),
    step(5, 4, 6),
];

const NOT_SO_GENTLE: [PatternStep; 16] = [
    step(4, 3, 5),
    step(4, 3, 5),
    step(4, 3, 5),
    step(4, 3, 5),
    step(4, 3, 5),
    step(4, 3, 5),
    step(4, 4, 6),
    step(4, 4, 6),
    step(4, 4, 6),
    step(4, 4, 6),
    step(4, 4, 6),
    step(4, 4, 6),
    step(4, 4, 6),
    step(4, 4, 6),
    step(4, 4, 6),
    step(4, 4, 6),
];

const GET_OUT_OF_BED: [PatternStep; 12] = [
    step(3, 4, 6),
    step(3, 4, 6),
    step(3, 4, 6),
    step(3, 4, 6),
    step(3, 4, 6),
    step(3, 4, 6),
    step(3, 4, 6),
    step(3, 4, 6),
    step(3, 4, 6),
    step(3, 4, 6),
    step(3, 4, 6),
    step(3, 4, 6),
];

/// The table a ringing alarm plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    #[default]
    Gentle,
    NotSoGentle,
    GetOutOfBed,
}

impl PatternKind {
    pub fn steps(self) -> &'static [PatternStep] {
        match self {
            PatternKind::Gentle => &GENTLE,
            PatternKind::NotSoGentle => &NOT_SO_GENTLE,
            PatternKind::GetOutOfBed => &GET_OUT_OF_BED,
        }
    }
}

/// Picks the table for the configured intensity.
///
/// `NsgAfterTwoSnoozes` stays gentle until the wearer has snoozed twice.
pub fn select_pattern(pattern: VibePattern, snooze_count: u32, goob: bool) -> PatternKind {
    if goob {
        return PatternKind::GetOutOfBed;
    }
    match pattern {
        VibePattern::Gentle => PatternKind::Gentle,
        VibePattern::NotSoGentle => PatternKind::NotSoGentle,
        VibePattern::NsgAfterTwoSnoozes if snooze_count >= 2 => PatternKind::NotSoGentle,
        VibePattern::NsgAfterTwoSnoozes => PatternKind::Gentle,
    }
}

/// What to play now and when to come back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VibeStep {
    pub segments: Vec<u32>,
    pub next_delay_ms: u64,
}

/// Walks a pattern table one step per tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VibrationDirector {
    kind: PatternKind,
    index: usize,
    running: bool,
}

impl VibrationDirector {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn index(&self) -> usize {
        self.index
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Resets to the first step of `kind` and returns it.
    pub fn start(&mut self, kind: PatternKind) -> Option<VibeStep> {
        self.kind = kind;
        self.index = 0;
        self.running = true;
        self.current()
    }

    /// Advances one step. `None` once the table is exhausted.
    pub fn tick(&mut self) -> Option<VibeStep> {
        if !self.running {
            return None;
        }
        self.index += 1;
        let step = self.current();
        if step.is_none() {
            self.running = false;
        }
        step
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.index = 0;
    }

    // ── Internal ────────────────────────────────────────────────────

    fn current(&self) -> Option<VibeStep> {
        let step = self.kind.steps().get(self.index)?;
        let segment = SEGMENTS.get(step.segment_index)?;
        let len = step.segment_length.min(segment.len());
        Some(VibeStep {
            segments: segment[..len].to_vec(),
            next_delay_ms: u64::from(step.next_delay_secs) * 1000,
        })
    }
}
