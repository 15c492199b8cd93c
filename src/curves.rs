//! Pan and volume curve tables.
//!
//! Pure total functions. Callers are expected to clamp inputs into domain
//! before calling; these functions do not re-validate their own inputs on
//! the hot path.

use serde::{Deserialize, Serialize};

/// Volume control curve, selected per cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeCurve {
    Linear,
    ExpX2,
    ExpX3,
    ExpX4,
    ExpX5,
    Exp60Db,
}

impl Default for VolumeCurve {
    fn default() -> Self {
        VolumeCurve::ExpX4
    }
}

impl VolumeCurve {
    /// Map `x` in `[0, 1]` to a linear gain in `[0, 1]`.
    #[inline]
    pub fn gain(self, x: f32) -> f32 {
        let x = x.clamp(0.0, 1.0);
        match self {
            VolumeCurve::Linear => x,
            VolumeCurve::ExpX2 => x * x,
            VolumeCurve::ExpX3 => x * x * x,
            VolumeCurve::ExpX4 => {
                let x2 = x * x;
                x2 * x2
            }
            VolumeCurve::ExpX5 => {
                let x2 = x * x;
                x2 * x2 * x
            }
            VolumeCurve::Exp60Db => {
                if x == 0.0 {
                    0.0
                } else {
                    (x * 6.908).exp() / 1000.0
                }
            }
        }
    }
}

/// Pan control curve, selected per cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PanCurve {
    FullLinear,
    LrCutLinear,
    SquareLaw,
    SineLaw,
}

impl Default for PanCurve {
    fn default() -> Self {
        PanCurve::SineLaw
    }
}

impl PanCurve {
    /// Map `x` in `[-1, 1]` to `(left_gain, right_gain)`.
    #[inline]
    pub fn gains(self, x: f32) -> (f32, f32) {
        let x = x.clamp(-1.0, 1.0);
        match self {
            PanCurve::FullLinear => {
                let r = (1.0 + x) / 2.0;
                (1.0 - r, r)
            }
            PanCurve::LrCutLinear => ((1.0 - x).clamp(0.0, 1.0), (1.0 + x).clamp(0.0, 1.0)),
            PanCurve::SquareLaw => {
                let r = (1.0 + x) / 2.0;
                ((1.0 - r).sqrt(), r.sqrt())
            }
            PanCurve::SineLaw => {
                let r = (1.0 + x) / 2.0;
                let half_pi = std::f32::consts::FRAC_PI_2;
                ((half_pi * (1.0 - r)).sin(), (half_pi * r).sin())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_curve_endpoints() {
        for curve in [
            VolumeCurve::Linear,
            VolumeCurve::ExpX2,
            VolumeCurve::ExpX3,
            VolumeCurve::ExpX4,
            VolumeCurve::ExpX5,
            VolumeCurve::Exp60Db,
        ] {
            assert!((curve.gain(0.0) - 0.0).abs() < 1e-6, "{:?} at 0", curve);
        }
        assert!((VolumeCurve::Linear.gain(1.0) - 1.0).abs() < 1e-6);
        assert!((VolumeCurve::ExpX4.gain(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_volume_curve_monotonic() {
        let curve = VolumeCurve::ExpX4;
        let mut prev = curve.gain(0.0);
        for i in 1..=10 {
            let g = curve.gain(i as f32 / 10.0);
            assert!(g >= prev);
            prev = g;
        }
    }

    #[test]
    fn test_pan_full_linear_center() {
        let (l, r) = PanCurve::FullLinear.gains(0.0);
        assert!((l - 0.5).abs() < 1e-6);
        assert!((r - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_pan_sine_law_center() {
        let (l, r) = PanCurve::SineLaw.gains(0.0);
        let expected = std::f32::consts::FRAC_PI_4.sin();
        assert!((l - expected).abs() < 1e-6);
        assert!((r - expected).abs() < 1e-6);
    }

    #[test]
    fn test_pan_lr_cut_linear_flat_region() {
        // At hard left, right should be fully cut; left unity.
        let (l, r) = PanCurve::LrCutLinear.gains(-1.0);
        assert!((l - 1.0).abs() < 1e-6);
        assert!(r.abs() < 1e-6);
    }

    #[test]
    fn test_pan_square_law_power_sum() {
        let (l, r) = PanCurve::SquareLaw.gains(0.3);
        assert!((l * l + r * r - 1.0).abs() < 1e-5);
    }
}
