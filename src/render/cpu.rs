use glam::Vec2;
use rayon::prelude::*;

use super::kaleidoscope::shade;
use crate::uniforms::FrameInput;

/// Rasterizes one frame to tightly packed RGBA8, rows top to bottom.
pub fn render_frame(input: &FrameInput, width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let mut pixels = vec![0u8; w * h * 4];
    if w == 0 || h == 0 {
        return pixels;
    }

    pixels
        .par_chunks_mut(w * 4)
        .enumerate()
        .for_each(|(row, line)| {
            // Row 0 is the top of the image, where uv.y approaches 1.
            let v = 1.0 - (row as f32 + 0.5) / h as f32;
            for (col, px) in line.chunks_exact_mut(4).enumerate() {
                let u = (col as f32 + 0.5) / w as f32;
                let color = shade(Vec2::new(u, v), input);
                px[0] = to_byte(color.x);
                px[1] = to_byte(color.y);
                px[2] = to_byte(color.z);
                px[3] = 255;
            }
        });

    pixels
}

fn to_byte(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}
