//! Duty-cycle quantization shared by driver holds and lights.
//!
//! The board modulates a driver with an integer on-time/off-time pair (in
//! milliseconds). A requested power ratio is mapped to the pair whose
//! ratio is closest to it within a bounded period.

/// Longest on+off period considered when quantizing a power ratio.
pub const DEFAULT_MAX_PERIOD_MS: u8 = 20;

/// Full-scale value of an 8-bit intensity.
pub const FULL_INTENSITY: u8 = 255;

/// Convert a power ratio to an `(on_ms, off_ms)` patter pair.
///
/// Power `0.0` maps to `(0, 0)`. Otherwise every pair with
/// `1 <= on` and `on + off <= max_period` is scanned (`on` ascending, then
/// `off` ascending) and the first pair with the smallest error wins.
/// Values outside `0.0..=1.0` are clamped.
#[must_use]
pub fn power_to_on_off(power: f32, max_period: u8) -> (u8, u8) {
    let power = power.clamp(0.0, 1.0);
    if power <= 0.0 {
        return (0, 0);
    }

    let mut best = (0, 0);
    let mut best_error = f32::MAX;
    for on in 1..=max_period {
        for off in 0..=(max_period - on) {
            let ratio = f32::from(on) / f32::from(on + off);
            let error = (power - ratio).abs();
            if error < best_error {
                best_error = error;
                best = (on, off);
            }
        }
    }
    best
}

/// Map an 8-bit intensity to a power ratio.
#[must_use]
pub fn intensity_to_power(value: u8) -> f32 {
    f32::from(value) / f32::from(FULL_INTENSITY)
}

/// Apply polarity inversion to an 8-bit intensity.
#[must_use]
pub const fn invert_intensity(value: u8, inverted: bool) -> u8 {
    if inverted { FULL_INTENSITY - value } else { value }
}
