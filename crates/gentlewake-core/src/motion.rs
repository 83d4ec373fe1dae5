//! Accelerometer classifiers.
//!
//! Three independent filters share one sample stream. Which of them runs is
//! decided by the machine from the current phase:
//!
//! - easy-light: wrist turned toward the face, pulses the backlight
//! - stirring: sustained movement while a smart alarm is monitoring
//! - arm swing: deliberate swings that cancel a Get-Out-of-Bed alarm
//!
//! Samples taken while the motor was running are ignored by all three.

use crate::events::AccelSample;

/// Orientation band (milli-g, absolute x or y) that reads as "looking at the watch".
pub const EASY_LIGHT_BAND: std::ops::RangeInclusive<i32> = 700..=1100;
pub const EASY_LIGHT_COOLDOWN_MS: u64 = 3000;

/// Subtracted from the movement counter after every batch.
pub const MOVEMENT_DECAY: u32 = 300;

/// Filtered x/y must pass beyond this magnitude on the other side to count a swing.
pub const SWING_THRESHOLD: i32 = 600;
pub const SWINGS_REQUIRED: u32 = 5;
pub const SWING_MAX_GAP_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Neutral,
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AxisTracker {
    filtered: i32,
    side: Side,
}

impl Default for AxisTracker {
    fn default() -> Self {
        Self {
            filtered: 0,
            side: Side::Neutral,
        }
    }
}

impl AxisTracker {
    /// Feeds one raw value; true when the filtered value crossed to the opposite side.
    fn feed(&mut self, raw: i16) -> bool {
        self.filtered = (self.filtered + i32::from(raw)) / 2;
        let side = if self.filtered > SWING_THRESHOLD {
            Side::Positive
        } else if self.filtered < -SWING_THRESHOLD {
            Side::Negative
        } else {
            return false;
        };
        let reversed = matches!(
            (self.side, side),
            (Side::Positive, Side::Negative) | (Side::Negative, Side::Positive)
        );
        self.side = side;
        reversed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MotionClassifier {
    last_light_ms: Option<u64>,
    movement: u32,
    previous: Option<AccelSample>,
    x: AxisTracker,
    y: AxisTracker,
    swings: u32,
    last_swing_ms: Option<u64>,
}

impl MotionClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn movement(&self) -> u32 {
        self.movement
    }

    pub fn swings(&self) -> u32 {
        self.swings
    }

    /// Clears all filter state, e.g. after the subscription was released.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// True if the backlight should pulse for this batch.
    pub fn easy_light(&mut self, samples: &[AccelSample]) -> bool {
        for sample in samples.iter().filter(|s| !s.did_vibrate) {
            let facing = EASY_LIGHT_BAND.contains(&i32::from(sample.x).abs())
                || EASY_LIGHT_BAND.contains(&i32::from(sample.y).abs());
            if !facing {
                continue;
            }
            let cooled = self
                .last_light_ms
                .map_or(true, |last| sample.timestamp_ms.saturating_sub(last) >= EASY_LIGHT_COOLDOWN_MS);
            if cooled {
                self.last_light_ms = Some(sample.timestamp_ms);
                return true;
            }
        }
        false
    }

    /// Accumulates movement from one batch. True once it exceeds `threshold`.
    pub fn stirring(&mut self, samples: &[AccelSample], threshold: u32) -> bool {
        let mut delta: u32 = 0;
        for sample in samples.iter().filter(|s| !s.did_vibrate) {
            if let Some(prev) = self.previous {
                let d = (i32::from(sample.x) - i32::from(prev.x)).unsigned_abs()
                    + (i32::from(sample.y) - i32::from(prev.y)).unsigned_abs()
                    + (i32::from(sample.z) - i32::from(prev.z)).unsigned_abs();
                delta = delta.saturating_add(d);
            }
            self.previous = Some(*sample);
        }
        self.movement = self
            .movement
            .saturating_add(delta)
            .saturating_sub(MOVEMENT_DECAY);
        self.movement > threshold
    }

    /// Counts arm swings. True once enough arrived without a long gap; the
    /// count restarts afterwards.
    pub fn arm_swing(&mut self, samples: &[AccelSample]) -> bool {
        for sample in samples.iter().filter(|s| !s.did_vibrate) {
            let now = sample.timestamp_ms;
            if let Some(last) = self.last_swing_ms {
                if now.saturating_sub(last) > SWING_MAX_GAP_MS {
                    self.swings = 0;
                    self.last_swing_ms = None;
                }
            }

            let swung_x = self.x.feed(sample.x);
            let swung_y = self.y.feed(sample.y);
            if !(swung_x || swung_y) {
                continue;
            }

            self.swings += 1;
            self.last_swing_ms = Some(now);
            if self.swings >= SWINGS_REQUIRED {
                self.swings = 0;
                self.last_swing_ms = None;
                return true;
            }
        }
        false
    }
}
