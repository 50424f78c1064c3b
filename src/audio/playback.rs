//! Looping playback of a decoded file.
//!
//! The playback position is either driven by an output device callback
//! (audible monitoring) or advanced manually by the frame loop, which keeps
//! offline rendering deterministic.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::{Arc, Mutex};

use super::decode::AudioData;

#[derive(Debug, Default)]
struct Cursor {
    /// Read position inside the file, wrapped to its length.
    position: f64,
    /// Total samples consumed since start, never wrapped.
    elapsed: f64,
    playing: bool,
}

impl Cursor {
    fn step(&mut self, by: f64, len: usize) {
        self.position = (self.position + by) % len as f64;
        self.elapsed += by;
    }
}

pub struct FilePlayback {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    cursor: Arc<Mutex<Cursor>>,
    output: Option<Stream>,
}

impl FilePlayback {
    /// Playback advanced only through [`FilePlayback::advance`].
    pub fn manual(data: AudioData) -> Self {
        Self {
            samples: Arc::new(data.samples),
            sample_rate: data.sample_rate,
            cursor: Arc::new(Mutex::new(Cursor {
                playing: true,
                ..Default::default()
            })),
            output: None,
        }
    }

    /// Audible playback on the default output device. Falls back to the
    /// manual clock when no usable output exists.
    pub fn monitored(data: AudioData) -> Self {
        let mut playback = Self::manual(data);
        match open_output(&playback.samples, playback.sample_rate, &playback.cursor) {
            Ok(stream) => playback.output = Some(stream),
            Err(e) => log::warn!("No audible playback ({}), using the frame clock", e),
        }
        playback
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_device_clocked(&self) -> bool {
        self.output.is_some()
    }

    pub fn set_playing(&self, playing: bool) {
        if let Ok(mut cursor) = self.cursor.lock() {
            cursor.playing = playing;
        }
        if let Some(ref stream) = self.output {
            let result = if playing {
                stream.play().map_err(|e| e.to_string())
            } else {
                stream.pause().map_err(|e| e.to_string())
            };
            if let Err(e) = result {
                log::warn!("Failed to change output stream state: {}", e);
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.cursor.lock().map(|c| c.playing).unwrap_or(false)
    }

    /// Moves the manual clock forward by `dt` seconds. No-op while paused or
    /// when an output device owns the clock.
    pub fn advance(&self, dt: f32) {
        if self.output.is_some() {
            return;
        }
        if let Ok(mut cursor) = self.cursor.lock() {
            if cursor.playing {
                cursor.step(dt.max(0.0) as f64 * self.sample_rate as f64, self.samples.len());
            }
        }
    }

    /// Seconds of audio consumed since start, including loops.
    pub fn elapsed(&self) -> f32 {
        let elapsed = self.cursor.lock().map(|c| c.elapsed).unwrap_or(0.0);
        (elapsed / self.sample_rate.max(1) as f64) as f32
    }

    /// Copies the `out.len()` samples that end at the playback position,
    /// wrapping around the file end. Samples from before playback started
    /// are zero.
    pub fn copy_latest(&self, out: &mut [f32]) {
        let (position, elapsed) = match self.cursor.lock() {
            Ok(c) => (c.position, c.elapsed),
            Err(_) => (0.0, 0.0),
        };
        let len = self.samples.len() as i64;
        let end = position.floor() as i64;
        let consumed = elapsed.floor() as i64;
        let n = out.len() as i64;

        for (k, slot) in out.iter_mut().enumerate() {
            let back = n - k as i64; // 1 = newest
            *slot = if back > consumed {
                0.0
            } else {
                self.samples[(end - back).rem_euclid(len) as usize]
            };
        }
    }

    pub fn close(&mut self) {
        if let Some(stream) = self.output.take() {
            if let Err(e) = stream.pause() {
                log::warn!("Failed to pause output stream during teardown: {}", e);
            }
            drop(stream);
        }
    }
}

impl Drop for FilePlayback {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_output(
    samples: &Arc<Vec<f32>>,
    file_rate: u32,
    cursor: &Arc<Mutex<Cursor>>,
) -> Result<Stream, String> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| "no output device".to_string())?;
    let supported = device.default_output_config().map_err(|e| e.to_string())?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();

    let stream = match sample_format {
        SampleFormat::F32 => build_output::<f32>(&device, &config, samples, file_rate, cursor),
        SampleFormat::I16 => build_output::<i16>(&device, &config, samples, file_rate, cursor),
        SampleFormat::U16 => build_output::<u16>(&device, &config, samples, file_rate, cursor),
        other => return Err(format!("unsupported output format {:?}", other)),
    }
    .map_err(|e| e.to_string())?;

    stream.play().map_err(|e| e.to_string())?;

    log::info!(
        "Monitoring on {} @ {}Hz",
        device.name().unwrap_or_else(|_| "Unknown".to_string()),
        config.sample_rate.0
    );

    Ok(stream)
}

fn build_output<T>(
    device: &Device,
    config: &StreamConfig,
    samples: &Arc<Vec<f32>>,
    file_rate: u32,
    cursor: &Arc<Mutex<Cursor>>,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = (config.channels as usize).max(1);
    // File samples consumed per output frame.
    let step = file_rate as f64 / config.sample_rate.0.max(1) as f64;
    let samples = Arc::clone(samples);
    let cursor = Arc::clone(cursor);

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let Ok(mut cursor) = cursor.lock() else {
                data.iter_mut().for_each(|s| *s = T::EQUILIBRIUM);
                return;
            };
            for frame in data.chunks_mut(channels) {
                let value = if cursor.playing {
                    let v = samples[cursor.position as usize % samples.len()];
                    cursor.step(step, samples.len());
                    v
                } else {
                    0.0
                };
                for out in frame.iter_mut() {
                    *out = T::from_sample(value);
                }
            }
        },
        |err| log::warn!("Output stream error: {}", err),
        None,
    )
}
