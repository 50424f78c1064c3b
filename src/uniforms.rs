use serde::Serialize;

use crate::audio::bands::AudioTexture;
use crate::palette::Palette;

pub const SENSITIVITY_RANGE: (f32, f32) = (0.1, 3.0);
pub const BRIGHTNESS_RANGE: (f32, f32) = (0.1, 2.0);
pub const SPEED_RANGE: (f32, f32) = (0.0, 3.0);

/// Normalized energy below which visual time only drifts.
pub const ENERGY_NOISE_FLOOR: f32 = 0.02;
pub const IDLE_DRIFT: f32 = 0.1;
/// Per-second decay rate of the eased beat pulse.
pub const BEAT_DECAY_RATE: f32 = 3.0;

/// Live user controls. Setters clamp into their slider ranges.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct VisualParams {
    sensitivity: f32,
    brightness: f32,
    speed: f32,
}

impl Default for VisualParams {
    fn default() -> Self {
        Self {
            sensitivity: 1.5,
            brightness: 1.0,
            speed: 0.5,
        }
    }
}

fn clamp_into(value: f32, (lo, hi): (f32, f32)) -> f32 {
    if value.is_nan() {
        lo
    } else {
        value.clamp(lo, hi)
    }
}

impl VisualParams {
    pub fn new(sensitivity: f32, brightness: f32, speed: f32) -> Self {
        let mut params = Self::default();
        params.set_sensitivity(sensitivity);
        params.set_brightness(brightness);
        params.set_speed(speed);
        params
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_sensitivity(&mut self, value: f32) {
        self.sensitivity = clamp_into(value, SENSITIVITY_RANGE);
    }

    pub fn set_brightness(&mut self, value: f32) {
        self.brightness = clamp_into(value, BRIGHTNESS_RANGE);
    }

    pub fn set_speed(&mut self, value: f32) {
        self.speed = clamp_into(value, SPEED_RANGE);
    }
}

/// Everything the renderer reads for one frame. Built fresh each frame and
/// never mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameInput {
    pub time: f32,
    pub resolution: [f32; 2],
    pub audio_texture: AudioTexture,
    pub palette: Palette,
    pub sensitivity: f32,
    pub brightness: f32,
    pub beat_pulse: f32,
}

impl FrameInput {
    pub fn palette_count(&self) -> usize {
        self.palette.len()
    }
}

/// Eases detector pulses across frames: jumps up instantly, decays
/// exponentially with wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct BeatEnvelope {
    value: f32,
}

impl BeatEnvelope {
    pub fn update(&mut self, pulse: f32, dt: f32) -> f32 {
        if pulse > self.value {
            self.value = pulse;
        } else {
            self.value *= (-BEAT_DECAY_RATE * dt.max(0.0)).exp();
        }
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

/// Per-frame audio summary handed to the builder.
#[derive(Clone, Copy, Debug, Default)]
pub struct AudioFrame {
    /// Normalized local bass average from the beat detector.
    pub energy: f32,
    /// Raw detector output for this tick.
    pub pulse: f32,
}

/// Accumulates visual time and the beat envelope, and assembles
/// [`FrameInput`] records.
#[derive(Debug, Default)]
pub struct FrameBuilder {
    visual_time: f32,
    envelope: BeatEnvelope,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visual_time(&self) -> f32 {
        self.visual_time
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advances the visual clock: audible energy speeds it up, silence
    /// leaves a slow drift proportional to `speed`.
    pub fn advance_time(&mut self, dt: f32, speed: f32, energy: f32) -> f32 {
        let dt = dt.max(0.0);
        if energy > ENERGY_NOISE_FLOOR {
            self.visual_time += dt * speed * (0.5 + energy * 0.5);
        } else {
            self.visual_time += dt * speed * IDLE_DRIFT;
        }
        self.visual_time
    }

    pub fn build(
        &mut self,
        dt: f32,
        audio: AudioFrame,
        texture: &AudioTexture,
        palette: &Palette,
        params: &VisualParams,
        resolution: [f32; 2],
    ) -> FrameInput {
        let time = self.advance_time(dt, params.speed(), audio.energy);
        let beat = self.envelope.update(audio.pulse, dt).clamp(0.0, 1.0);

        FrameInput {
            time,
            resolution,
            audio_texture: *texture,
            palette: palette.clone(),
            sensitivity: params.sensitivity(),
            brightness: params.brightness(),
            beat_pulse: beat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_clamp_to_slider_ranges() {
        let mut params = VisualParams::new(10.0, 0.0, -1.0);
        assert_eq!(params.sensitivity(), 3.0);
        assert_eq!(params.brightness(), 0.1);
        assert_eq!(params.speed(), 0.0);

        params.set_speed(f32::NAN);
        assert_eq!(params.speed(), 0.0);
        params.set_brightness(1.25);
        assert_eq!(params.brightness(), 1.25);
    }

    #[test]
    fn visual_time_drifts_in_silence() {
        let mut builder = FrameBuilder::new();
        builder.advance_time(1.0, 2.0, 0.0);
        assert!((builder.visual_time() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn visual_time_scales_with_energy() {
        let mut builder = FrameBuilder::new();
        builder.advance_time(1.0, 1.0, 1.0);
        assert!((builder.visual_time() - 1.0).abs() < 1e-6);

        let mut half = FrameBuilder::new();
        half.advance_time(1.0, 1.0, 0.5);
        assert!((half.visual_time() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn zero_speed_freezes_time() {
        let mut builder = FrameBuilder::new();
        for _ in 0..10 {
            builder.advance_time(0.016, 0.0, 0.8);
        }
        assert_eq!(builder.visual_time(), 0.0);
    }

    #[test]
    fn envelope_is_frame_rate_independent() {
        let mut coarse = BeatEnvelope::default();
        coarse.update(1.0, 0.0);
        coarse.update(0.0, 0.5);

        let mut fine = BeatEnvelope::default();
        fine.update(1.0, 0.0);
        for _ in 0..50 {
            fine.update(0.0, 0.01);
        }

        assert!((coarse.value() - fine.value()).abs() < 1e-4);
        assert!((coarse.value() - (-1.5f32).exp()).abs() < 1e-4);
    }

    #[test]
    fn build_clamps_beat_and_copies_params() {
        let mut builder = FrameBuilder::new();
        let params = VisualParams::new(2.0, 0.5, 1.0);
        let frame = builder.build(
            0.016,
            AudioFrame { energy: 0.0, pulse: 1.8 },
            &AudioTexture::default(),
            &Palette::default(),
            &params,
            [640.0, 480.0],
        );
        assert_eq!(frame.beat_pulse, 1.0);
        assert_eq!(frame.sensitivity, 2.0);
        assert_eq!(frame.brightness, 0.5);
        assert_eq!(frame.palette_count(), 2);
        assert_eq!(frame.resolution, [640.0, 480.0]);
    }
}
