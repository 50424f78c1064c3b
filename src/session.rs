//! One visualizer session: a single audio source feeding the analysis chain
//! and the per-frame renderer input.
//!
//! Sources are never reset in place. A restart always runs
//! `Idle -> Initializing -> Active -> Closing -> Idle`, and only visual
//! params and the palette survive it.

use serde::Serialize;
use std::time::Instant;

use crate::audio::analyzer::{AnalyzerSettings, SpectralAnalyzer, SpectrumSnapshot};
use crate::audio::bands::{AudioTexture, BandEnergies, DetectionBands};
use crate::audio::beat::BeatDetector;
use crate::audio::source::{AudioSource, SourceKind, SourceOptions};
use crate::error::{PaletteError, SourceError};
use crate::palette::{Palette, Rgb};
use crate::uniforms::{AudioFrame, FrameBuilder, FrameInput, VisualParams};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Initializing,
    Active,
    Closing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Stopped,
    Playing,
    Paused,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub source: SourceOptions,
    pub analyzer: AnalyzerSettings,
    pub resolution: [f32; 2],
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            source: SourceOptions::default(),
            analyzer: AnalyzerSettings::default(),
            resolution: [1280.0, 720.0],
        }
    }
}

/// The single pulse the particle overlay consumes each frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct OverlayCue {
    pub visible: bool,
    pub opacity: f32,
    pub color: Rgb,
}

/// Per-frame feature summary, written out by `--dump-features`.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct FrameFeatures {
    pub time: f32,
    pub bands: BandEnergies,
    pub beat: f32,
    pub triggered: bool,
    pub beat_pulse: f32,
    pub energy: f32,
    pub overlay: OverlayCue,
}

/// Owns the source and the analysis chain created with it.
struct ActiveChain {
    source: AudioSource,
    analyzer: SpectralAnalyzer,
}

pub struct Session {
    config: SessionConfig,
    state: SessionState,
    play_state: PlayState,
    chain: Option<ActiveChain>,
    detector: BeatDetector,
    texture: AudioTexture,
    builder: FrameBuilder,
    palette: Palette,
    pending_palette: Option<Palette>,
    params: VisualParams,
    particles: bool,
    features: Option<FrameFeatures>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            play_state: PlayState::Stopped,
            chain: None,
            detector: BeatDetector::new(),
            texture: AudioTexture::default(),
            builder: FrameBuilder::new(),
            palette: Palette::default(),
            pending_palette: None,
            params: VisualParams::default(),
            particles: true,
            features: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn play_state(&self) -> PlayState {
        self.play_state
    }

    pub fn params(&self) -> &VisualParams {
        &self.params
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn source(&self) -> Option<&AudioSource> {
        self.chain.as_ref().map(|c| &c.source)
    }

    /// Features of the most recently built frame.
    pub fn features(&self) -> Option<&FrameFeatures> {
        self.features.as_ref()
    }

    fn transition(&mut self, next: SessionState) {
        log::debug!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Stops any active source, then acquires a new one. On failure the
    /// session is left idle.
    pub fn start_session(&mut self, kind: &SourceKind) -> Result<(), SourceError> {
        self.stop_session();
        self.transition(SessionState::Initializing);

        match AudioSource::start(kind, &self.config.source) {
            Ok(source) => {
                self.activate(source);
                Ok(())
            }
            Err(e) => {
                log::warn!("Session start failed: {}", e);
                self.transition(SessionState::Idle);
                Err(e)
            }
        }
    }

    /// Starts from an already acquired source.
    pub fn start_with_source(&mut self, source: AudioSource) {
        self.stop_session();
        self.transition(SessionState::Initializing);
        self.activate(source);
    }

    fn activate(&mut self, source: AudioSource) {
        let analyzer = SpectralAnalyzer::new(self.config.analyzer);
        log::info!(
            "Session started: {} source @ {} Hz, {} bins",
            source.kind_name(),
            source.sample_rate(),
            analyzer.bin_count()
        );

        self.detector.reset();
        self.texture = AudioTexture::default();
        self.builder.reset();
        self.features = None;
        if let Some(palette) = self.pending_palette.take() {
            self.palette = palette;
        }

        self.chain = Some(ActiveChain { source, analyzer });
        self.play_state = PlayState::Playing;
        self.transition(SessionState::Active);
    }

    /// Releases the source and its analysis chain. A no-op when idle; never
    /// fails.
    pub fn stop_session(&mut self) {
        let Some(mut chain) = self.chain.take() else {
            return;
        };
        self.transition(SessionState::Closing);
        chain.source.stop();
        drop(chain);
        self.detector.reset();
        self.play_state = PlayState::Stopped;
        self.transition(SessionState::Idle);
        log::info!("Session stopped");
    }

    pub fn set_playing(&mut self, playing: bool) {
        let Some(chain) = self.chain.as_ref() else {
            return;
        };
        chain.source.set_playing(playing);
        self.play_state = if playing {
            PlayState::Playing
        } else {
            PlayState::Paused
        };
    }

    /// Validates and stores a palette. While a source is active the new
    /// palette takes effect on the next start.
    pub fn set_palette<S: AsRef<str>>(&mut self, colors: &[S]) -> Result<(), PaletteError> {
        let palette = Palette::from_hex(colors)?;
        self.replace_palette(palette);
        Ok(())
    }

    pub fn replace_palette(&mut self, palette: Palette) {
        if self.state == SessionState::Active {
            log::info!("Palette change applies on the next session start");
            self.pending_palette = Some(palette);
        } else {
            self.pending_palette = None;
            self.palette = palette;
        }
    }

    pub fn set_sensitivity(&mut self, value: f32) {
        self.params.set_sensitivity(value);
    }

    pub fn set_brightness(&mut self, value: f32) {
        self.params.set_brightness(value);
    }

    pub fn set_speed(&mut self, value: f32) {
        self.params.set_speed(value);
    }

    pub fn toggle_particles(&mut self, visible: bool) {
        self.particles = visible;
    }

    pub fn overlay_cue(&self, bands: &BandEnergies) -> OverlayCue {
        OverlayCue {
            visible: self.particles,
            opacity: 0.3 + bands.bass * 0.5,
            color: self.palette.first(),
        }
    }

    /// One display tick: steps a frame-clocked source by `dt`, analyzes it
    /// and builds the frame.
    pub fn frame(&mut self, dt: f32, now: Instant) -> FrameInput {
        let snapshot = match self.chain.as_mut() {
            Some(chain) => {
                chain.source.advance(dt);
                chain.analyzer.snapshot(Some(&chain.source)).clone()
            }
            None => SpectrumSnapshot::empty(),
        };
        self.advance(&snapshot, dt, now)
    }

    /// Runs band aggregation, beat detection and frame assembly over one
    /// spectrum.
    pub fn advance(&mut self, snapshot: &SpectrumSnapshot, dt: f32, now: Instant) -> FrameInput {
        let detection = DetectionBands::from_spectrum(snapshot);
        // No data: beat state is left alone until a source delivers again.
        let has_data = !snapshot.is_empty();
        let pulse = if has_data {
            self.detector.update(detection.bass, now)
        } else {
            0.0
        };
        self.texture.update(snapshot);

        let energy = self.detector.local_average() / 255.0;
        let frame = self.builder.build(
            dt,
            AudioFrame { energy, pulse },
            &self.texture,
            &self.palette,
            &self.params,
            self.config.resolution,
        );

        let bands = detection.normalized();
        log::trace!(
            "bass {:.3} mid {:.3} treble {:.3} pulse {:.3}",
            bands.bass,
            bands.mid,
            bands.treble,
            pulse
        );
        self.features = Some(FrameFeatures {
            time: frame.time,
            bands,
            beat: pulse,
            triggered: has_data && self.detector.triggered(),
            beat_pulse: frame.beat_pulse,
            energy,
            overlay: self.overlay_cue(&bands),
        });

        frame
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_session();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::AudioData;
    use crate::render::kaleidoscope::{shade_linear, symmetry, RenderBands};
    use glam::Vec2;
    use std::path::PathBuf;
    use std::time::Duration;

    fn file_source(samples: Vec<f32>) -> AudioSource {
        AudioSource::from_decoded(
            AudioData {
                samples,
                sample_rate: 44100,
            },
            false,
        )
    }

    fn silent_source() -> AudioSource {
        file_source(vec![0.0; 44100])
    }

    fn tick(start: Instant, n: u64) -> Instant {
        start + Duration::from_millis(16 * n)
    }

    /// Strong energy in the lowest bins only.
    fn bass_spectrum() -> SpectrumSnapshot {
        let mut bins = vec![0u8; 1024];
        for b in bins.iter_mut().take(48).skip(1) {
            *b = 200;
        }
        SpectrumSnapshot::from_bins(bins)
    }

    #[test]
    fn lifecycle_runs_through_the_state_machine() {
        let mut session = Session::new(SessionConfig::default());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.play_state(), PlayState::Stopped);

        session.start_with_source(silent_source());
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.play_state(), PlayState::Playing);

        session.set_playing(false);
        assert_eq!(session.play_state(), PlayState::Paused);

        session.stop_session();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.play_state(), PlayState::Stopped);
        assert!(session.source().is_none());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut session = Session::new(SessionConfig::default());
        session.stop_session();
        session.start_with_source(silent_source());
        session.stop_session();
        session.stop_session();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn failed_start_falls_back_to_idle() {
        let mut session = Session::new(SessionConfig::default());
        session.start_with_source(silent_source());

        let result = session.start_session(&SourceKind::File(PathBuf::from("/nope/gone.wav")));
        assert!(matches!(result, Err(SourceError::DecodeError(_))));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.source().is_none());
    }

    #[test]
    fn restart_resets_beat_state_but_keeps_user_settings() {
        let mut session = Session::new(SessionConfig::default());
        session.set_sensitivity(2.5);
        session.set_palette(&["#ff0000", "#00ff00", "#0000ff"]).unwrap();

        session.start_with_source(silent_source());
        let start = Instant::now();
        for n in 0..5 {
            session.advance(&bass_spectrum(), 0.016, tick(start, n));
        }
        assert!(session.detector.history_len() > 0);

        session.start_with_source(silent_source());
        assert_eq!(session.detector.history_len(), 0);
        assert_eq!(session.builder.visual_time(), 0.0);
        assert_eq!(session.params().sensitivity(), 2.5);
        assert_eq!(session.palette().len(), 3);
    }

    #[test]
    fn latest_palette_choice_survives_a_deferred_one() {
        let mut session = Session::new(SessionConfig::default());
        session.start_with_source(silent_source());
        session.set_palette(&["#ff0000"]).unwrap();
        session.stop_session();

        session.set_palette(&["#ff0000", "#00ff00", "#0000ff"]).unwrap();
        assert_eq!(session.palette().len(), 3);

        session.start_with_source(silent_source());
        assert_eq!(session.palette().len(), 3);
    }

    #[test]
    fn palette_changes_wait_for_the_next_start() {
        let mut session = Session::new(SessionConfig::default());
        session.start_with_source(silent_source());
        session.set_palette(&["#ffffff"]).unwrap();
        assert_eq!(session.palette(), &Palette::default());

        session.stop_session();
        session.start_with_source(silent_source());
        assert_eq!(session.palette().len(), 1);

        assert_eq!(session.set_palette::<&str>(&[]), Err(PaletteError::Empty));
        assert_eq!(session.palette().len(), 1);
    }

    #[test]
    fn bass_hit_after_silence_fires_a_full_beat() {
        let mut session = Session::new(SessionConfig::default());
        session.start_with_source(silent_source());
        let start = Instant::now();

        let mut baseline = None;
        for n in 0..20 {
            baseline = Some(session.advance(&SpectrumSnapshot::silent(1024), 0.016, tick(start, n)));
        }
        let baseline = baseline.unwrap();
        assert_eq!(baseline.beat_pulse, 0.0);

        let hit = session.advance(&bass_spectrum(), 0.016, tick(start, 20));
        assert_eq!(hit.beat_pulse, 1.0);
        assert!(session.features().unwrap().triggered);

        let quiet = symmetry(RenderBands::from_input(&baseline).bass);
        let loud = symmetry(RenderBands::from_input(&hit).bass);
        assert!(loud > quiet, "symmetry {} should exceed {}", loud, quiet);
    }

    #[test]
    fn brightness_flows_into_the_frame_and_scales_output() {
        let mut session = Session::new(SessionConfig::default());
        session.start_with_source(silent_source());
        let start = Instant::now();

        let frame = session.advance(&bass_spectrum(), 0.016, start);
        let mut dim = frame.clone();
        dim.brightness = 0.1;
        let mut bright = frame.clone();
        bright.brightness = 2.0;

        let p = Vec2::new(0.52, 0.47);
        let lum = |c: glam::Vec3| c.x + c.y + c.z;
        assert!(lum(shade_linear(p, &dim)) < lum(shade_linear(p, &bright)));

        session.set_brightness(5.0);
        let clamped = session.advance(&bass_spectrum(), 0.016, tick(start, 1));
        assert_eq!(clamped.brightness, 2.0);
    }

    #[test]
    fn silent_input_never_beats() {
        let mut session = Session::new(SessionConfig::default());
        session.start_with_source(silent_source());
        let start = Instant::now();
        for n in 0..120 {
            let frame = session.frame(1.0 / 60.0, tick(start, n));
            assert_eq!(frame.beat_pulse, 0.0);
            assert!(frame.time.is_finite());
        }
        let features = session.features().unwrap();
        assert_eq!(features.energy, 0.0);
        assert!(!features.triggered);
    }

    #[test]
    fn idle_frames_keep_the_last_texture() {
        let mut session = Session::new(SessionConfig::default());
        session.start_with_source(silent_source());
        session.advance(&bass_spectrum(), 0.016, Instant::now());
        let texels = *session.texture.texels();

        session.stop_session();
        let frame = session.frame(0.016, Instant::now());
        assert_eq!(frame.audio_texture.texels(), &texels);
    }

    #[test]
    fn idle_frames_leave_beat_state_empty() {
        let mut session = Session::new(SessionConfig::default());
        session.start_with_source(silent_source());
        let start = Instant::now();
        for n in 0..3 {
            session.advance(&bass_spectrum(), 0.016, tick(start, n));
        }
        session.stop_session();
        assert_eq!(session.detector.history_len(), 0);

        for n in 3..10 {
            let frame = session.frame(0.016, tick(start, n));
            assert_eq!(frame.beat_pulse, 0.0);
        }
        assert_eq!(session.detector.history_len(), 0);
        let features = session.features().unwrap();
        assert!(!features.triggered);
        assert_eq!(features.energy, 0.0);
    }

    #[test]
    fn overlay_cue_follows_bass_and_toggle() {
        let mut session = Session::new(SessionConfig::default());
        let cue = session.overlay_cue(&BandEnergies {
            bass: 1.0,
            mid: 0.0,
            treble: 0.0,
        });
        assert!(cue.visible);
        assert!((cue.opacity - 0.8).abs() < 1e-6);
        assert_eq!(cue.color, Palette::default().first());

        session.toggle_particles(false);
        assert!(!session.overlay_cue(&BandEnergies::default()).visible);
    }

    #[test]
    fn features_serialize_as_json() {
        let mut session = Session::new(SessionConfig::default());
        session.start_with_source(silent_source());
        session.frame(0.016, Instant::now());
        let json = serde_json::to_string(session.features().unwrap()).unwrap();
        assert!(json.contains("\"beat_pulse\""));
        assert!(json.contains("\"overlay\""));
    }
}
