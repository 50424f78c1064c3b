use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const HISTORY_LEN: usize = 20;
/// Raw bass level (0–255) a beat must exceed.
pub const NOISE_FLOOR: f32 = 40.0;
/// A beat must exceed the local average by this factor.
pub const TRIGGER_RATIO: f32 = 1.4;
pub const DEBOUNCE: Duration = Duration::from_millis(200);
/// Divisor turning bass-over-average into the continuous pulse.
pub const PULSE_SCALE: f32 = 128.0;

/// Adaptive-threshold onset detector over the raw detection bass band.
#[derive(Debug, Default)]
pub struct BeatDetector {
    history: VecDeque<f32>,
    last_trigger: Option<Instant>,
    triggered: bool,
    pulse: f32,
}

impl BeatDetector {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_LEN + 1),
            last_trigger: None,
            triggered: false,
            pulse: 0.0,
        }
    }

    /// Advances one analysis tick with the unnormalized bass average.
    ///
    /// Returns exactly 1.0 on a (debounced) trigger, otherwise the
    /// continuous pulse `max(0, (bass - avg) / 128)`, which is not clamped.
    pub fn update(&mut self, bass: f32, now: Instant) -> f32 {
        self.history.push_back(bass);
        if self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }

        let average = self.local_average();
        let exceeds = bass > NOISE_FLOOR && bass > average * TRIGGER_RATIO;
        let rested = self
            .last_trigger
            .map_or(true, |last| now.saturating_duration_since(last) >= DEBOUNCE);

        self.triggered = exceeds && rested;
        if self.triggered {
            self.pulse = 1.0;
            self.last_trigger = Some(now);
            log::debug!("Beat: bass {:.1} over local average {:.1}", bass, average);
        } else {
            self.pulse = ((bass - average) / PULSE_SCALE).max(0.0);
        }

        self.pulse
    }

    /// Mean of the retained raw bass values (0 when empty).
    pub fn local_average(&self) -> f32 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().sum::<f32>() / self.history.len() as f32
    }

    pub fn pulse(&self) -> f32 {
        self.pulse
    }

    /// Whether the latest tick fired the impulsive branch.
    pub fn triggered(&self) -> bool {
        self.triggered
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
