use std::path::PathBuf;

use super::capture::MicCapture;
use super::decode::{decode_audio, AudioData};
use super::playback::FilePlayback;
use crate::error::SourceError;

/// What to start a session from.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceKind {
    Microphone,
    File(PathBuf),
}

/// Knobs that shape how a source acquires its resources.
#[derive(Clone, Debug)]
pub struct SourceOptions {
    /// Input device name; the host default when `None` or not found.
    pub device: Option<String>,
    /// Play file sources audibly (device clock) instead of on the frame clock.
    pub monitor: bool,
    /// Number of recent samples kept for analysis.
    pub window: usize,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            device: None,
            monitor: false,
            window: 2048,
        }
    }
}

/// The single live audio input of a session.
pub enum AudioSource {
    Microphone(MicCapture),
    File(FilePlayback),
}

impl AudioSource {
    /// Acquires the device or decodes the file. Returns once samples can be
    /// delivered; nothing stays allocated when it fails.
    pub fn start(kind: &SourceKind, options: &SourceOptions) -> Result<Self, SourceError> {
        match kind {
            SourceKind::Microphone => {
                let capture = MicCapture::open(options.device.as_deref(), options.window)?;
                Ok(AudioSource::Microphone(capture))
            }
            SourceKind::File(path) => {
                let data = decode_audio(path)?;
                log::info!("Looping {} ({:.1}s)", path.display(), data.duration());
                let source = Self::from_decoded(data, options.monitor);
                if let AudioSource::File(ref file) = source {
                    log::debug!(
                        "File clock: {}",
                        if file.is_device_clocked() { "output device" } else { "frame loop" }
                    );
                }
                Ok(source)
            }
        }
    }

    /// Wraps already decoded audio as a looping file source.
    pub fn from_decoded(data: AudioData, monitor: bool) -> Self {
        let playback = if monitor {
            FilePlayback::monitored(data)
        } else {
            FilePlayback::manual(data)
        };
        AudioSource::File(playback)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            AudioSource::Microphone(_) => "microphone",
            AudioSource::File(_) => "file",
        }
    }

    pub fn sample_rate(&self) -> u32 {
        match self {
            AudioSource::Microphone(mic) => mic.sample_rate(),
            AudioSource::File(file) => file.sample_rate(),
        }
    }

    /// True once the stream failed mid-session; analysis then sees silence.
    pub fn is_faulted(&self) -> bool {
        match self {
            AudioSource::Microphone(mic) => mic.is_faulted(),
            AudioSource::File(_) => false,
        }
    }

    pub fn copy_latest(&self, out: &mut [f32]) {
        match self {
            AudioSource::Microphone(mic) => mic.copy_latest(out),
            AudioSource::File(file) => file.copy_latest(out),
        }
    }

    /// Pauses or resumes file playback. Capture keeps running for a microphone.
    pub fn set_playing(&self, playing: bool) {
        if let AudioSource::File(file) = self {
            file.set_playing(playing);
        }
    }

    /// Steps a frame-clocked file source forward.
    pub fn advance(&self, dt: f32) {
        if let AudioSource::File(file) = self {
            file.advance(dt);
        }
    }

    /// Releases every acquired resource. Safe to call repeatedly; release
    /// problems are logged, never returned.
    pub fn stop(&mut self) {
        match self {
            AudioSource::Microphone(mic) => mic.close(),
            AudioSource::File(file) => file.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::tests::write_wav;

    #[test]
    fn file_source_starts_from_wav_and_stops_twice() {
        let tone: Vec<f32> = (0..4410)
            .map(|i| (i as f32 * 0.05).sin() * 0.5)
            .collect();
        let path = write_wav("source", &tone, 44100, 1);

        let mut source = AudioSource::start(&SourceKind::File(path.clone()), &SourceOptions::default()).unwrap();
        assert_eq!(source.kind_name(), "file");
        assert_eq!(source.sample_rate(), 44100);
        assert!(!source.is_faulted());

        source.advance(0.05);
        let mut window = vec![0.0; 1024];
        source.copy_latest(&mut window);
        assert!(window.iter().any(|s| s.abs() > 0.1));

        source.stop();
        source.stop();

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn unreadable_file_fails_with_decode_error() {
        let kind = SourceKind::File(PathBuf::from("/nope/missing.mp3"));
        let result = AudioSource::start(&kind, &SourceOptions::default());
        assert!(matches!(result, Err(SourceError::DecodeError(_))));
    }
}
