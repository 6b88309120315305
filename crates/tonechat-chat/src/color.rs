//! Anger-driven text color.

use tonechat_core::types::Rgba;

/// Interpolation fraction for an anger score: the score clamped into
/// [0, 1]. NaN counts as calm.
pub fn color_fraction(anger: f64) -> f64 {
    if anger.is_nan() {
        0.0
    } else {
        anger.clamp(0.0, 1.0)
    }
}

/// Blend `neutral` towards `alert` channel by channel.
///
/// Fraction 0 yields `neutral` and fraction 1 yields `alert` exactly.
pub fn interpolate(neutral: Rgba, alert: Rgba, fraction: f64) -> Rgba {
    let f = color_fraction(fraction);
    if f >= 1.0 {
        return alert;
    }
    let channel = |n: f64, a: f64| n + f * (a - n);
    Rgba {
        r: channel(neutral.r, alert.r),
        g: channel(neutral.g, alert.g),
        b: channel(neutral.b, alert.b),
        a: channel(neutral.a, alert.a),
    }
}

// =============================================================================
// Tests
// =============================================================================
