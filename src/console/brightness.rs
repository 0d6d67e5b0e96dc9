//! Brightness to visual intensity
//!
//! The mapping is linear (`brightness / 100`, no gamma). The same factor
//! drives the opacity, the glow radius and the glow alpha of an indicator.

/// Blur radius of the glow at full intensity, in pixels
pub const GLOW_BLUR_PX: f64 = 20.0;

const METER_FILLED: char = '█';
const METER_EMPTY: char = '░';

/// Raw linear intensity. Not clamped.
pub fn intensity(brightness: i64) -> f64 {
    brightness as f64 / 100.0
}

/// Glow drawn around an indicator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glow {
    pub blur_px: f64,
    pub alpha: f64,
}

impl Glow {
    /// Indicator glyph for terminals, picked by glow strength.
    pub fn symbol(&self) -> char {
        match self.alpha {
            a if a <= 0.0 => '○',
            a if a < 0.34 => '◔',
            a if a < 0.67 => '◑',
            a if a < 1.0 => '◕',
            _ => '●',
        }
    }
}

/// Display-ready intensity of one channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intensity {
    /// Opacity in 0.0..=1.0
    pub opacity: f64,
    pub glow: Glow,
}

impl Intensity {
    /// Out-of-range brightness is clamped here, never upstream.
    pub fn from_brightness(brightness: i64) -> Self {
        let level = intensity(brightness).clamp(0.0, 1.0);
        Self {
            opacity: level,
            glow: Glow {
                blur_px: GLOW_BLUR_PX * level,
                alpha: level,
            },
        }
    }

    /// Text meter `width` cells wide, filled in proportion to opacity.
    pub fn meter(&self, width: usize) -> String {
        let filled = ((self.opacity * width as f64).round() as usize).min(width);
        let mut bar = String::with_capacity(width * METER_FILLED.len_utf8());
        bar.extend(std::iter::repeat(METER_FILLED).take(filled));
        bar.extend(std::iter::repeat(METER_EMPTY).take(width - filled));
        bar
    }
}
