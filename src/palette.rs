//! User palettes: an ordered, cyclic gradient of one to five colours.

use glam::Vec3;
use serde::Serialize;

use crate::error::PaletteError;

pub const MAX_COLORS: usize = 5;

/// Linear-light RGB colour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb`, `rrggbb`, `#rgb` or `rgb` as sRGB and converts it
    /// to linear light.
    pub fn from_hex(hex: &str) -> Result<Self, PaletteError> {
        let invalid = || PaletteError::InvalidColor(hex.to_string());
        let digits = hex.trim().trim_start_matches('#');
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
        let (r, g, b) = match digits.len() {
            6 => (channel(&digits[0..2])?, channel(&digits[2..4])?, channel(&digits[4..6])?),
            3 => {
                let expand = |s: &str| channel(&s.repeat(2));
                (expand(&digits[0..1])?, expand(&digits[1..2])?, expand(&digits[2..3])?)
            }
            _ => return Err(invalid()),
        };

        Ok(Self::new(srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b)))
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.r, self.g, self.b)
    }

    pub fn lerp(self, other: Rgb, t: f32) -> Rgb {
        Rgb::new(
            self.r + (other.r - self.r) * t,
            self.g + (other.g - self.g) * t,
            self.b + (other.b - self.b) * t,
        )
    }
}

fn srgb_to_linear(byte: u8) -> f32 {
    let c = byte as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Ordered colour list; insertion order is the gradient's traversal order.
#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    colors: Vec<Rgb>,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: vec![Rgb::new(0.0, 1.0, 1.0), Rgb::new(1.0, 0.0, 1.0)],
        }
    }
}

impl Palette {
    pub fn new(colors: Vec<Rgb>) -> Result<Self, PaletteError> {
        match colors.len() {
            0 => Err(PaletteError::Empty),
            n if n > MAX_COLORS => Err(PaletteError::TooMany(n)),
            _ => Ok(Self { colors }),
        }
    }

    pub fn from_hex<S: AsRef<str>>(hex: &[S]) -> Result<Self, PaletteError> {
        if hex.len() > MAX_COLORS {
            return Err(PaletteError::TooMany(hex.len()));
        }
        let colors = hex
            .iter()
            .map(|h| Rgb::from_hex(h.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(colors)
    }

    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn first(&self) -> Rgb {
        self.colors[0]
    }

    /// Closed-loop gradient lookup.
    ///
    /// `t` wraps into [0, 1); `t = k / len` lands exactly on colour `k`, and
    /// the last segment blends back into the first colour.
    pub fn sample(&self, t: f32) -> Rgb {
        let count = self.colors.len();
        if count <= 1 {
            return self.colors[0];
        }

        let x = t - t.floor();
        let segment = x * count as f32;
        let index = segment.floor() as usize;
        let f = segment - segment.floor();

        if index >= count - 1 {
            self.colors[count - 1].lerp(self.colors[0], f)
        } else {
            self.colors[index].lerp(self.colors[index + 1], f)
        }
    }
}

/// Built-in palettes, drawn from the 30-swatch picker grid.
pub const PRESETS: &[(&str, &[&str])] = &[
    ("opal", &["#00ffff", "#ff00ff"]),
    ("ember", &["#ff0000", "#ff8000", "#ffbf00"]),
    ("lagoon", &["#00ffbf", "#00bfff", "#0040ff"]),
    ("aurora", &["#40ff00", "#00ff80", "#00ffff", "#8000ff", "#ff00bf"]),
    ("ultraviolet", &["#4000ff", "#bf00ff", "#ff0080"]),
    ("spectrum", &["#ff0000", "#ffff00", "#00ff00", "#00ffff", "#0000ff"]),
    ("mono", &["#ffffff"]),
    ("graphite", &["#e0e0e0", "#808080", "#404040"]),
];

pub fn preset(name: &str) -> Option<Result<Palette, PaletteError>> {
    PRESETS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, colors)| Palette::from_hex(colors))
}
