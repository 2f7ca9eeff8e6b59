//! Frame colors
//!
//! Colors are pure functions of their input so the same function name gets
//! the same color in every render, across runs and machines.

use std::fmt;

/// 8-bit RGB color, displayed as `rgb(r,g,b)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({},{},{})", self.0, self.1, self.2)
    }
}

/// Root frame and unchanged diff frames
pub const NEUTRAL_GRAY: Rgb = Rgb(200, 200, 200);

/// Below this absolute share change a diff frame is drawn gray
const DELTA_EPSILON: f64 = 0.001;

/// Share change at which diff colors reach full intensity
const DELTA_SATURATION: f64 = 0.3;

/// djb2 string hash
#[must_use]
pub fn name_hash(name: &str) -> u32 {
    name.bytes().fold(5381u32, |hash, byte| {
        hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(u32::from(byte))
    })
}

/// Warm (red → yellow) color for a frame name
///
/// Hue 0-59°, saturation 160-214, value 200-255 out of 255, with a small
/// fixed blue component.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn warm_color(name: &str) -> Rgb {
    let hash = name_hash(name);
    let hue = f64::from(hash % 60) / 60.0;
    let saturation = f64::from(160 + (hash >> 8) % 55) / 255.0;
    let value = f64::from(200 + (hash >> 16) % 56) / 255.0;

    let chroma = value * saturation;
    let x = chroma * hue;
    let m = value - chroma;

    Rgb(((chroma + m) * 255.0) as u8, ((x + m) * 255.0) as u8, (m * 55.0 + 30.0) as u8)
}

/// Red (more share after) or blue (less share after) by the change in a
/// frame's share of total samples
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn delta_color(before_rate: f64, after_rate: f64) -> Rgb {
    let delta = after_rate - before_rate;
    if delta.abs() < DELTA_EPSILON {
        return NEUTRAL_GRAY;
    }

    let intensity = (delta.abs() / DELTA_SATURATION).min(1.0);
    let scale = |amount: f64| (amount * intensity) as u8;
    if delta > 0.0 {
        Rgb(200 + scale(55.0), 200 - scale(140.0), 200 - scale(140.0))
    } else {
        Rgb(200 - scale(140.0), 200 - scale(80.0), 200 + scale(55.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_djb2_known_values() {
        assert_eq!(name_hash(""), 5381);
        assert_eq!(name_hash("a"), 5381 * 33 + 97);
    }

    #[test]
    fn test_warm_color_is_stable_and_warm() {
        for name in ["main", "compute_hot", "std::rt::lang_start", "[kernel]", ""] {
            let color = warm_color(name);
            assert_eq!(color, warm_color(name));
            // red channel carries the value; blue stays low
            assert!(color.0 >= 199, "{name}: {color}");
            assert!(color.0 >= color.1, "{name}: {color}");
            assert!(color.2 < 100, "{name}: {color}");
        }
    }

    #[test]
    fn test_delta_color_thresholds() {
        assert_eq!(delta_color(0.25, 0.2505), NEUTRAL_GRAY);
        assert_eq!(delta_color(0.1, 0.4), Rgb(255, 60, 60));
        assert_eq!(delta_color(0.4, 0.1), Rgb(60, 120, 255));

        let mild = delta_color(0.10, 0.13);
        assert!(mild.0 > 200 && mild.0 < 255);
    }

    #[test]
    fn test_rgb_display() {
        assert_eq!(Rgb(1, 22, 255).to_string(), "rgb(1,22,255)");
    }
}
