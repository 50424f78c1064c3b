//! Microphone capture.
//!
//! Opens an input device with cpal, downmixes every callback block to mono
//! and keeps the most recent samples in a fixed-size ring the analyzer reads
//! from.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::SourceError;

/// Fixed-capacity ring of the latest mono samples.
pub struct SampleRing {
    buf: Vec<f32>,
    write: usize,
    filled: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0.0; capacity.max(1)],
            write: 0,
            filled: 0,
        }
    }

    pub fn push(&mut self, sample: f32) {
        self.buf[self.write] = sample;
        self.write = (self.write + 1) % self.buf.len();
        self.filled = (self.filled + 1).min(self.buf.len());
    }

    /// Copies the newest `out.len()` samples, oldest first. Slots older than
    /// anything captured so far are zero.
    pub fn copy_latest(&self, out: &mut [f32]) {
        let cap = self.buf.len();
        let n = out.len();
        for (k, slot) in out.iter_mut().enumerate() {
            let age = n - k; // 1 = newest
            if age > self.filled {
                *slot = 0.0;
            } else {
                *slot = self.buf[(self.write + cap - age) % cap];
            }
        }
    }

    pub fn clear(&mut self) {
        self.buf.iter_mut().for_each(|x| *x = 0.0);
        self.write = 0;
        self.filled = 0;
    }
}

pub fn list_input_devices() -> Vec<String> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    if let Ok(inputs) = host.input_devices() {
        for device in inputs {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
    }
    names
}

/// A live input stream feeding a [`SampleRing`].
pub struct MicCapture {
    ring: Arc<Mutex<SampleRing>>,
    faulted: Arc<AtomicBool>,
    stream: Option<Stream>,
    sample_rate: u32,
}

impl MicCapture {
    pub fn open(device_name: Option<&str>, ring_size: usize) -> Result<Self, SourceError> {
        let device = select_device(device_name)?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let supported = device
            .default_input_config()
            .map_err(|e| SourceError::DeviceUnavailable(format!("{}: {}", name, e)))?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();

        let ring = Arc::new(Mutex::new(SampleRing::new(ring_size)));
        let faulted = Arc::new(AtomicBool::new(false));

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, &ring, &faulted),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, &ring, &faulted),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, &ring, &faulted),
            SampleFormat::I32 => build_stream::<i32>(&device, &config, &ring, &faulted),
            other => {
                return Err(SourceError::DeviceUnavailable(format!(
                    "{}: unsupported sample format {:?}",
                    name, other
                )))
            }
        }
        .map_err(|e| SourceError::DeviceUnavailable(format!("{}: {}", name, e)))?;

        stream
            .play()
            .map_err(|e| SourceError::DeviceUnavailable(format!("{}: {}", name, e)))?;

        log::info!(
            "Microphone: {} @ {}Hz, {} channel(s)",
            name,
            config.sample_rate.0,
            config.channels
        );

        Ok(Self {
            ring,
            faulted,
            stream: Some(stream),
            sample_rate: config.sample_rate.0,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Relaxed)
    }

    pub fn copy_latest(&self, out: &mut [f32]) {
        match self.ring.lock() {
            Ok(ring) => ring.copy_latest(out),
            Err(_) => out.iter_mut().for_each(|x| *x = 0.0),
        }
    }

    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("Failed to pause input stream during teardown: {}", e);
            }
            drop(stream);
        }
        if let Ok(mut ring) = self.ring.lock() {
            ring.clear();
        }
    }
}

#[cfg(test)]
impl MicCapture {
    /// Capture with no device behind it; samples and stream errors are fed
    /// in by hand.
    pub(crate) fn detached(ring_size: usize, sample_rate: u32) -> Self {
        Self {
            ring: Arc::new(Mutex::new(SampleRing::new(ring_size))),
            faulted: Arc::new(AtomicBool::new(false)),
            stream: None,
            sample_rate,
        }
    }

    pub(crate) fn feed(&self, samples: &[f32]) {
        if let Ok(mut ring) = self.ring.lock() {
            samples.iter().for_each(|&s| ring.push(s));
        }
    }

    /// Same effect as the stream's error callback.
    pub(crate) fn fail(&self) {
        self.faulted.store(true, Ordering::Relaxed);
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.close();
    }
}

fn select_device(device_name: Option<&str>) -> Result<Device, SourceError> {
    let host = cpal::default_host();

    if let Some(wanted) = device_name {
        if let Ok(mut inputs) = host.input_devices() {
            if let Some(device) = inputs.find(|d| d.name().map(|n| n == wanted).unwrap_or(false)) {
                return Ok(device);
            }
        }
        log::warn!("Input device '{}' not found, using the default", wanted);
    }

    host.default_input_device()
        .ok_or_else(|| SourceError::DeviceUnavailable("no input device found".to_string()))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    ring: &Arc<Mutex<SampleRing>>,
    faulted: &Arc<AtomicBool>,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = (config.channels as usize).max(1);
    let ring = Arc::clone(ring);
    let fault_flag = Arc::clone(faulted);

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            if let Ok(mut ring) = ring.lock() {
                for frame in data.chunks(channels) {
                    let sum: f32 = frame.iter().map(|s| (*s).to_sample::<f32>()).sum();
                    ring.push(sum / frame.len() as f32);
                }
            }
        },
        move |err| {
            log::warn!("Input stream error: {}", err);
            fault_flag.store(true, Ordering::Relaxed);
        },
        None,
    )
}
