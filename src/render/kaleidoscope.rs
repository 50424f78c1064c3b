//! The kaleidoscope shader as a pure CPU function.
//!
//! `kaleidoscope.wgsl` carries the same algorithm for the GPU backend; keep
//! the two in step.

use glam::{Vec2, Vec3};
use std::f32::consts::PI;

use crate::uniforms::FrameInput;

pub const LAYERS: usize = 3;
pub const BASS_POSITION: f32 = 0.05;
pub const MID_POSITION: f32 = 0.4;
pub const TREBLE_POSITION: f32 = 0.7;

/// Band levels the renderer derives from the audio texture, already scaled
/// by sensitivity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderBands {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub beat_kick: f32,
}

impl RenderBands {
    pub fn from_input(input: &FrameInput) -> Self {
        let s = input.sensitivity;
        Self {
            bass: input.audio_texture.sample(BASS_POSITION) * s,
            mid: input.audio_texture.sample(MID_POSITION) * s,
            treble: input.audio_texture.sample(TREBLE_POSITION) * s,
            beat_kick: input.beat_pulse * s,
        }
    }
}

/// Even fold count, growing with bass.
pub fn symmetry(bass: f32) -> f32 {
    6.0 + (bass * 2.5).floor() * 2.0
}

/// `x - y * floor(x / y)`: the result takes the sign of `y`.
fn floor_mod(x: f32, y: f32) -> f32 {
    x - y * (x / y).floor()
}

fn fract(x: f32) -> f32 {
    x - x.floor()
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn rotate(v: Vec2, angle: f32) -> Vec2 {
    let (s, c) = angle.sin_cos();
    Vec2::new(v.x * c - v.y * s, v.x * s + v.y * c)
}

/// Reflects the polar angle of `uv` into the wedge `[0, PI / symmetry]`.
pub fn fold(uv: Vec2, symmetry: f32) -> Vec2 {
    let r = uv.length();
    let mut a = uv.y.atan2(uv.x);
    a = floor_mod(a, 2.0 * PI / symmetry);
    a = (a - PI / symmetry).abs();
    Vec2::new(a.cos(), a.sin()) * r
}

/// Centered, aspect-corrected coordinates for a `[0,1]²` pixel position.
pub fn centered_uv(pixel_uv: Vec2, resolution: [f32; 2]) -> Vec2 {
    let mut uv = (pixel_uv - Vec2::splat(0.5)) * 2.0;
    let [w, h] = resolution;
    if w > 0.0 && h > 0.0 {
        if w > h {
            uv.x *= w / h;
        } else {
            uv.y *= h / w;
        }
    }
    uv
}

fn sparkle_hash(uv0: Vec2) -> f32 {
    fract((uv0.dot(Vec2::new(12.9898, 78.233))).sin() * 43758.5453)
}

/// Linear colour before brightness and gamma.
fn accumulate(uv0: Vec2, bands: &RenderBands, input: &FrameInput) -> Vec3 {
    let time = input.time;
    let RenderBands {
        bass,
        mid,
        treble,
        beat_kick,
    } = *bands;

    let mut uv = uv0 * (1.0 - beat_kick * 0.1);
    let mut color = Vec3::ZERO;
    let folds = symmetry(bass);

    for layer in 0..LAYERS {
        let i = layer as f32;

        uv = fold(uv, folds);
        uv = rotate(uv, time * 0.1 + mid * 0.2 + i);

        let warp = Vec2::new(uv.y, uv.x) * (4.0 + beat_kick * 3.0) + Vec2::splat(time);
        uv += Vec2::new(warp.x.sin(), warp.y.sin()) * (bass * 0.1);

        let freq = 4.0 + i * 2.0 + mid * 8.0;
        let wave = (uv.x * freq + time).sin() * (uv.y * freq + time).sin();
        let glow_sharpness = 0.005 + 0.015 * (1.0 - treble * 0.5);
        let d = (glow_sharpness / wave.abs().max(1e-4)).powf(1.5).clamp(0.0, 3.0);

        let phase = uv0.length() + i * 0.4 + time * 0.2 + beat_kick;
        let mut layer_color = input.palette.sample(phase).to_vec3();

        let sparkle = sparkle_hash(uv0);
        let threshold = 0.98 - treble * 0.3;
        if sparkle >= threshold {
            layer_color += Vec3::splat(treble * 2.0);
        }

        color += layer_color * d * (0.3 + mid * 0.5);
    }

    color *= 1.0 - smoothstep(0.5, 1.8, uv0.length());
    color += input.palette.first().to_vec3() * (beat_kick * 0.08);
    color
}

/// Colour after master brightness, before gamma. Exposed for tests and
/// diagnostics.
pub fn shade_linear(pixel_uv: Vec2, input: &FrameInput) -> Vec3 {
    let uv0 = centered_uv(pixel_uv, input.resolution);
    let bands = RenderBands::from_input(input);
    accumulate(uv0, &bands, input) * input.brightness
}

/// Display colour in [0, 1] for one pixel. Pure: depends only on its
/// arguments.
pub fn shade(pixel_uv: Vec2, input: &FrameInput) -> Vec3 {
    let linear = shade_linear(pixel_uv, input).max(Vec3::ZERO);
    linear.powf(1.0 / 2.2).clamp(Vec3::ZERO, Vec3::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::bands::{AudioTexture, TEXTURE_SIZE};
    use crate::palette::Palette;

    fn frame(texels: [u8; TEXTURE_SIZE], beat: f32, brightness: f32) -> FrameInput {
        FrameInput {
            time: 1.3,
            resolution: [800.0, 600.0],
            audio_texture: AudioTexture::from_texels(texels),
            palette: Palette::default(),
            sensitivity: 1.5,
            brightness,
            beat_pulse: beat,
        }
    }

    fn luminance(c: Vec3) -> f32 {
        0.2126 * c.x + 0.7152 * c.y + 0.0722 * c.z
    }

    #[test]
    fn symmetry_is_even_and_grows_with_bass() {
        assert_eq!(symmetry(0.0), 6.0);
        assert_eq!(symmetry(0.39), 6.0);
        assert_eq!(symmetry(0.4), 8.0);
        assert_eq!(symmetry(1.5), 12.0);
        for b in [0.0, 0.3, 0.9, 1.7, 3.0] {
            assert_eq!(symmetry(b) % 2.0, 0.0);
        }
    }

    #[test]
    fn fold_lands_in_the_wedge_and_keeps_radius() {
        let wedge = PI / 6.0;
        for k in 0..64 {
            let angle = k as f32 * 0.37 - 10.0;
            let p = Vec2::new(angle.cos(), angle.sin()) * 0.7;
            let folded = fold(p, 6.0);
            let a = folded.y.atan2(folded.x);
            assert!(a >= -1e-5 && a <= wedge + 1e-5, "angle {} folded to {}", angle, a);
            assert!((folded.length() - 0.7).abs() < 1e-5);
        }
    }

    #[test]
    fn floor_mod_matches_shader_semantics() {
        assert!((floor_mod(-1.0, 3.0) - 2.0).abs() < 1e-6);
        assert!((floor_mod(4.0, 3.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn centered_uv_corrects_aspect() {
        let uv = centered_uv(Vec2::new(1.0, 1.0), [200.0, 100.0]);
        assert_eq!(uv, Vec2::new(2.0, 1.0));
        let uv = centered_uv(Vec2::new(0.0, 0.5), [100.0, 200.0]);
        assert_eq!(uv, Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn render_bands_read_fixed_texture_positions() {
        let texels = [255u8; TEXTURE_SIZE];
        let bands = RenderBands::from_input(&frame(texels, 0.5, 1.0));
        assert!((bands.bass - 1.5).abs() < 1e-5);
        assert!((bands.mid - 1.5).abs() < 1e-5);
        assert!((bands.treble - 1.5).abs() < 1e-5);
        assert!((bands.beat_kick - 0.75).abs() < 1e-6);
    }

    #[test]
    fn shading_is_pure() {
        let input = frame([90; TEXTURE_SIZE], 0.4, 1.0);
        let p = Vec2::new(0.31, 0.62);
        assert_eq!(shade(p, &input), shade(p, &input.clone()));
    }

    #[test]
    fn silent_input_stays_finite_and_in_range() {
        let input = frame([0; TEXTURE_SIZE], 0.0, 1.0);
        for y in 0..16 {
            for x in 0..16 {
                let p = Vec2::new((x as f32 + 0.5) / 16.0, (y as f32 + 0.5) / 16.0);
                let c = shade(p, &input);
                assert!(c.is_finite());
                assert!(c.min_element() >= 0.0 && c.max_element() <= 1.0);
            }
        }
    }

    #[test]
    fn far_corners_fall_into_the_vignette() {
        // |uv0| > 1.8 and no beat: fully dark.
        let mut input = frame([120; TEXTURE_SIZE], 0.0, 2.0);
        input.resolution = [1920.0, 600.0];
        let corner = shade(Vec2::new(0.0, 0.0), &input);
        assert_eq!(corner, Vec3::ZERO);
    }

    #[test]
    fn brightness_scales_linear_output_monotonically() {
        let texels = [140u8; TEXTURE_SIZE];
        let p = Vec2::new(0.55, 0.52);
        let dim = shade_linear(p, &frame(texels, 0.3, 0.1));
        let mid = shade_linear(p, &frame(texels, 0.3, 1.0));
        let bright = shade_linear(p, &frame(texels, 0.3, 2.0));

        assert!(luminance(dim) > 0.0);
        assert!(luminance(dim) < luminance(mid));
        assert!(luminance(mid) < luminance(bright));
        assert!((luminance(bright) / luminance(dim) - 20.0).abs() < 1e-2);

        let shown = shade(p, &frame(texels, 0.3, 2.0));
        assert!(shown.max_element() <= 1.0);
    }
}
