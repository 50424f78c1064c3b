//! Two deliberately separate reductions of a spectrum.
//!
//! [`DetectionBands`] averages coarse bin ranges and feeds the beat detector.
//! [`AudioTexture`] downsamples the useful part of the spectrum to 256 texels
//! that the renderer samples at three fixed points. They are tuned
//! independently and must stay separate.

use serde::Serialize;

use super::analyzer::SpectrumSnapshot;

pub const BASS_BINS: (usize, usize) = (1, 8);
pub const MID_BINS: (usize, usize) = (8, 100);
pub const TREBLE_BINS: (usize, usize) = (100, 300);

pub const TEXTURE_SIZE: usize = 256;
/// Share of the spectrum mapped into the texture; the top quarter is dropped.
pub const USEFUL_FRACTION: f32 = 0.75;

/// Normalized band energies in [0, 1].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct BandEnergies {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

/// Raw (0–255) averages over the detection bin ranges. Bin 0 is never read.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DetectionBands {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

impl DetectionBands {
    pub fn from_spectrum(spectrum: &SpectrumSnapshot) -> Self {
        let bins = spectrum.bins();
        Self {
            bass: average(bins, BASS_BINS),
            mid: average(bins, MID_BINS),
            treble: average(bins, TREBLE_BINS),
        }
    }

    pub fn normalized(&self) -> BandEnergies {
        BandEnergies {
            bass: self.bass / 255.0,
            mid: self.mid / 255.0,
            treble: self.treble / 255.0,
        }
    }
}

fn average(bins: &[u8], (start, end): (usize, usize)) -> f32 {
    let end = end.min(bins.len());
    if start >= end {
        return 0.0;
    }
    let sum: u32 = bins[start..end].iter().map(|&b| b as u32).sum();
    sum as f32 / (end - start) as f32
}

/// Source bin read for texel `index` of a spectrum with `len` bins.
pub fn texture_source_index(index: usize, len: usize) -> usize {
    let useful = (len as f32 * USEFUL_FRACTION).floor() as usize;
    let source = index * useful / TEXTURE_SIZE;
    if source == 0 {
        1
    } else {
        source
    }
}

/// 256-texel downsample of the spectrum consumed by the renderer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AudioTexture {
    texels: [u8; TEXTURE_SIZE],
}

impl Default for AudioTexture {
    fn default() -> Self {
        Self {
            texels: [0; TEXTURE_SIZE],
        }
    }
}

impl AudioTexture {
    pub fn from_texels(texels: [u8; TEXTURE_SIZE]) -> Self {
        Self { texels }
    }

    pub fn texels(&self) -> &[u8; TEXTURE_SIZE] {
        &self.texels
    }

    /// Refreshes every texel from `spectrum`. An empty spectrum leaves the
    /// previous contents in place.
    pub fn update(&mut self, spectrum: &SpectrumSnapshot) {
        let bins = spectrum.bins();
        if bins.is_empty() {
            return;
        }
        for (i, texel) in self.texels.iter_mut().enumerate() {
            let source = texture_source_index(i, bins.len());
            *texel = bins.get(source).copied().unwrap_or(0);
        }
    }

    /// Texels as floats in [0, 1], the layout the GPU backend uploads.
    pub fn normalized(&self) -> [f32; TEXTURE_SIZE] {
        let mut out = [0.0; TEXTURE_SIZE];
        for (o, &t) in out.iter_mut().zip(self.texels.iter()) {
            *o = t as f32 / 255.0;
        }
        out
    }

    /// Linearly filtered lookup at normalized position `x`, clamped at the
    /// edges. Texel centres sit at `(i + 0.5) / 256`.
    pub fn sample(&self, x: f32) -> f32 {
        let u = x * TEXTURE_SIZE as f32 - 0.5;
        let base = u.floor();
        let f = u - base;
        let last = TEXTURE_SIZE as i32 - 1;
        let i0 = (base as i32).clamp(0, last) as usize;
        let i1 = (base as i32 + 1).clamp(0, last) as usize;
        let a = self.texels[i0] as f32 / 255.0;
        let b = self.texels[i1] as f32 / 255.0;
        a + (b - a) * f
    }
}
