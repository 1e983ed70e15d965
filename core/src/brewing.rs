//! Espresso arithmetic: target yield and grind dial-in.

use anyhow::{Result, bail};

/// Beverage weight for a dose and brew ratio. `None` unless both are non-zero.
#[must_use]
pub fn target_yield(dose_in: f64, ratio: f64) -> Option<f64> {
    if dose_in == 0.0 || ratio == 0.0 || !dose_in.is_finite() || !ratio.is_finite() {
        return None;
    }
    Some(dose_in * ratio)
}

/// A test shot: grinder setting and the resulting shot time in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestShot {
    pub grind: f64,
    pub seconds: f64,
}

/// Interpolate the grind setting that should hit `target_seconds`.
///
/// Fits `time = m * grind + c` through two test shots and solves for the
/// grind. Extrapolates linearly when the target lies outside both shots.
pub fn dial_in(target_seconds: f64, first: TestShot, second: TestShot) -> Result<f64> {
    let inputs = [
        target_seconds,
        first.grind,
        first.seconds,
        second.grind,
        second.seconds,
    ];
    if inputs.iter().any(|v| *v == 0.0 || !v.is_finite()) {
        bail!("Target time and both test shots must be non-zero numbers");
    }
    if first.grind == second.grind {
        bail!("Test shots need two different grind settings");
    }

    let slope = (second.seconds - first.seconds) / (second.grind - first.grind);
    if slope == 0.0 {
        bail!("Both test shots ran the same time; grind has no measurable effect");
    }
    let intercept = first.seconds - slope * first.grind;
    Ok((target_seconds - intercept) / slope)
}
