//! Button-sequence challenge that has to be entered to stop an alarm.

use rand::Rng;

use crate::events::Button;

pub const STOP_CODE_LENGTH: usize = 5;
/// The challenge is abandoned after this long without a key.
pub const STOP_CODE_TIMEOUT_MS: u64 = 10_000;

const KEYS: [Button; 3] = [Button::Up, Button::Select, Button::Down];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCodeProgress {
    Advanced,
    Completed,
    /// Wrong key; entry starts over.
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopCode {
    sequence: Vec<Button>,
    entered: usize,
}

impl StopCode {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let sequence = (0..STOP_CODE_LENGTH)
            .map(|_| KEYS[rng.gen_range(0..KEYS.len())])
            .collect();
        Self::from_sequence(sequence)
    }

    pub fn from_sequence(sequence: Vec<Button>) -> Self {
        Self { sequence, entered: 0 }
    }

    pub fn sequence(&self) -> &[Button] {
        &self.sequence
    }

    pub fn entered(&self) -> usize {
        self.entered
    }

    pub fn press(&mut self, button: Button) -> StopCodeProgress {
        if self.sequence.get(self.entered) == Some(&button) {
            self.entered += 1;
            if self.entered >= self.sequence.len() {
                StopCodeProgress::Completed
            } else {
                StopCodeProgress::Advanced
            }
        } else {
            self.entered = 0;
            StopCodeProgress::Reset
        }
    }
}
