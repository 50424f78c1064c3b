use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::source::AudioSource;

pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const DEFAULT_SMOOTHING: f32 = 0.8;
pub const DEFAULT_MIN_DECIBELS: f32 = -100.0;
pub const DEFAULT_MAX_DECIBELS: f32 = -30.0;

/// One byte-quantized magnitude per frequency bin.
///
/// Empty means "no data" (no active source).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectrumSnapshot {
    bins: Vec<u8>,
}

impl SpectrumSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn silent(len: usize) -> Self {
        Self { bins: vec![0; len] }
    }

    pub fn from_bins(bins: Vec<u8>) -> Self {
        Self { bins }
    }

    pub fn bins(&self) -> &[u8] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AnalyzerSettings {
    pub fft_size: usize,
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            smoothing: DEFAULT_SMOOTHING,
            min_decibels: DEFAULT_MIN_DECIBELS,
            max_decibels: DEFAULT_MAX_DECIBELS,
        }
    }
}

/// Windowed FFT over the newest samples, smoothed across calls and
/// quantized to bytes on a decibel scale.
pub struct SpectralAnalyzer {
    settings: AnalyzerSettings,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    samples: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    snapshot: SpectrumSnapshot,
}

impl SpectralAnalyzer {
    pub fn new(settings: AnalyzerSettings) -> Self {
        let fft_size = settings.fft_size.max(2);
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let bins = fft_size / 2;

        Self {
            settings: AnalyzerSettings { fft_size, ..settings },
            fft,
            window: blackman_window(fft_size),
            samples: vec![0.0; fft_size],
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; bins],
            snapshot: SpectrumSnapshot::silent(bins),
        }
    }

    pub fn bin_count(&self) -> usize {
        self.settings.fft_size / 2
    }

    /// Analyzes whatever the source currently holds. Never waits for new
    /// samples: a source that has not moved yields the same window again.
    pub fn snapshot(&mut self, source: Option<&AudioSource>) -> &SpectrumSnapshot {
        match source {
            None => {
                self.snapshot = SpectrumSnapshot::empty();
            }
            Some(source) if source.is_faulted() => {
                self.silence();
            }
            Some(source) => {
                let mut samples = std::mem::take(&mut self.samples);
                source.copy_latest(&mut samples);
                self.analyze(&samples);
                self.samples = samples;
            }
        }
        &self.snapshot
    }

    /// Runs one transform over `samples` (the newest `fft_size` of them;
    /// zero-filled at the front when shorter).
    pub fn analyze(&mut self, samples: &[f32]) -> &SpectrumSnapshot {
        let n = self.settings.fft_size;
        let offset = n.saturating_sub(samples.len());
        let tail = &samples[samples.len().saturating_sub(n)..];

        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let s = if i < offset { 0.0 } else { tail[i - offset] };
            *slot = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let tau = self.settings.smoothing.clamp(0.0, 1.0);
        let scale = 1.0 / n as f32;
        let range = self.settings.max_decibels - self.settings.min_decibels;
        let bins = self.bin_count();

        if self.snapshot.len() != bins {
            self.snapshot = SpectrumSnapshot::silent(bins);
        }

        for k in 0..bins {
            let magnitude = self.scratch[k].norm() * scale;
            let mut value = tau * self.smoothed[k] + (1.0 - tau) * magnitude;
            if !value.is_finite() {
                value = 0.0;
            }
            self.smoothed[k] = value;
            self.snapshot.bins[k] = quantize(value, self.settings.min_decibels, range);
        }

        &self.snapshot
    }

    /// Forgets smoothing history and reports an all-zero spectrum.
    pub fn silence(&mut self) -> &SpectrumSnapshot {
        self.smoothed.iter_mut().for_each(|v| *v = 0.0);
        self.snapshot = SpectrumSnapshot::silent(self.bin_count());
        &self.snapshot
    }
}

fn quantize(magnitude: f32, min_decibels: f32, range: f32) -> u8 {
    if magnitude <= 0.0 || range <= 0.0 {
        return 0;
    }
    let db = 20.0 * magnitude.log10();
    let scaled = (255.0 / range * (db - min_decibels)).floor();
    scaled.clamp(0.0, 255.0) as u8
}

fn blackman_window(size: usize) -> Vec<f32> {
    let (a0, a1, a2) = (0.42f32, 0.5f32, 0.08f32);
    (0..size)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
            a0 - a1 * x.cos() + a2 * (2.0 * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::MicCapture;

    fn tone(bin: usize, amplitude: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| {
                amplitude * (2.0 * std::f32::consts::PI * bin as f32 * i as f32 / n as f32).sin()
            })
            .collect()
    }

    #[test]
    fn default_size_yields_1024_bins() {
        let mut analyzer = SpectralAnalyzer::new(AnalyzerSettings::default());
        assert_eq!(analyzer.bin_count(), 1024);
        assert_eq!(analyzer.analyze(&[]).len(), 1024);
    }

    #[test]
    fn no_source_yields_empty_snapshot() {
        let mut analyzer = SpectralAnalyzer::new(AnalyzerSettings::default());
        assert!(analyzer.snapshot(None).is_empty());
    }

    #[test]
    fn silence_quantizes_to_zero() {
        let mut analyzer = SpectralAnalyzer::new(AnalyzerSettings::default());
        let snapshot = analyzer.analyze(&vec![0.0; 2048]);
        assert!(snapshot.bins().iter().all(|&b| b == 0));
    }

    #[test]
    fn tone_peaks_at_its_bin() {
        let mut analyzer = SpectralAnalyzer::new(AnalyzerSettings {
            smoothing: 0.0,
            ..Default::default()
        });
        let snapshot = analyzer.analyze(&tone(40, 0.5, 2048)).clone();
        let bins = snapshot.bins();
        let peak = bins
            .iter()
            .enumerate()
            .max_by_key(|(_, &v)| v)
            .map(|(i, _)| i)
            .unwrap();
        assert!((39..=41).contains(&peak));
        assert_eq!(bins[40], 255);
        assert_eq!(bins[400], 0);
    }

    #[test]
    fn smoothing_carries_energy_into_the_next_transform() {
        let settings = AnalyzerSettings {
            max_decibels: 0.0,
            ..Default::default()
        };
        let mut analyzer = SpectralAnalyzer::new(settings);
        let loud = analyzer.analyze(&tone(40, 0.5, 2048)).bins()[40];
        let after = analyzer.analyze(&vec![0.0; 2048]).bins()[40];
        assert!(after > 0, "smoothing should keep some energy");
        assert!(after < loud || loud == 255);

        analyzer.silence();
        assert_eq!(analyzer.analyze(&vec![0.0; 2048]).bins()[40], 0);
    }

    #[test]
    fn faulted_source_reads_as_silence_and_drops_smoothing() {
        let mic = MicCapture::detached(2048, 44100);
        mic.feed(&tone(40, 0.5, 2048));
        let source = AudioSource::Microphone(mic);

        let mut analyzer = SpectralAnalyzer::new(AnalyzerSettings::default());
        assert!(analyzer.snapshot(Some(&source)).bins()[40] > 200);

        if let AudioSource::Microphone(ref mic) = source {
            mic.fail();
        }
        assert!(source.is_faulted());
        let faulted = analyzer.snapshot(Some(&source));
        assert_eq!(faulted.len(), 1024);
        assert!(faulted.bins().iter().all(|&b| b == 0));

        // Without the reset the loud bin would still read well above zero.
        let healthy = analyzer.analyze(&vec![0.0; 2048]);
        assert!(healthy.bins().iter().all(|&b| b == 0));
    }

    #[test]
    fn short_input_is_zero_padded_at_the_front() {
        let mut analyzer = SpectralAnalyzer::new(AnalyzerSettings::default());
        let snapshot = analyzer.analyze(&[0.0; 16]);
        assert_eq!(snapshot.len(), 1024);
    }
}
