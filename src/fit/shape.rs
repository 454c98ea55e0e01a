/// Peak line shapes
///
/// Shapes are height-normalized: the value at the peak centre is 1, so a
/// peak's `y` is its apex intensity.

use serde::{Deserialize, Serialize};

const FOUR_LN2: f64 = 4.0 * std::f64::consts::LN_2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Shape {
    Gaussian { fwhm: f64 },
    /// `(1 - mu) * gaussian + mu * lorentzian`
    PseudoVoigt { fwhm: f64, mu: f64 },
}

impl Shape {
    pub fn fwhm(&self) -> f64 {
        match *self {
            Shape::Gaussian { fwhm } | Shape::PseudoVoigt { fwhm, .. } => fwhm,
        }
    }

    /// Lorentzian fraction (0 for a pure Gaussian)
    pub fn mu(&self) -> f64 {
        match *self {
            Shape::Gaussian { .. } => 0.0,
            Shape::PseudoVoigt { mu, .. } => mu,
        }
    }

    pub fn with_fwhm(self, fwhm: f64) -> Self {
        match self {
            Shape::Gaussian { .. } => Shape::Gaussian { fwhm },
            Shape::PseudoVoigt { mu, .. } => Shape::PseudoVoigt { fwhm, mu },
        }
    }

    pub fn with_mu(self, mu: f64) -> Self {
        match self {
            Shape::Gaussian { .. } => self,
            Shape::PseudoVoigt { fwhm, .. } => Shape::PseudoVoigt { fwhm, mu },
        }
    }

    pub fn is_pseudo_voigt(&self) -> bool {
        matches!(self, Shape::PseudoVoigt { .. })
    }

    /// Shape value at distance `dx` from the centre
    pub fn value(&self, dx: f64) -> f64 {
        match *self {
            Shape::Gaussian { fwhm } => gaussian(dx, fwhm),
            Shape::PseudoVoigt { fwhm, mu } => {
                (1.0 - mu) * gaussian(dx, fwhm) + mu * lorentzian(dx, fwhm)
            }
        }
    }
}

impl Default for Shape {
    fn default() -> Self {
        Shape::Gaussian { fwhm: 0.0 }
    }
}

pub fn gaussian(dx: f64, fwhm: f64) -> f64 {
    if fwhm <= 0.0 {
        return if dx == 0.0 { 1.0 } else { 0.0 };
    }
    let r = dx / fwhm;
    (-FOUR_LN2 * r * r).exp()
}

pub fn lorentzian(dx: f64, fwhm: f64) -> f64 {
    if fwhm <= 0.0 {
        return if dx == 0.0 { 1.0 } else { 0.0 };
    }
    let r = dx / fwhm;
    1.0 / (1.0 + 4.0 * r * r)
}

/// A single line: apex position, apex height and shape
pub trait Line {
    fn center(&self) -> f64;
    fn height(&self) -> f64;
    fn shape(&self) -> Shape;
}

/// Sum of all lines evaluated on `x` (baseline 0).
pub fn synthesize<L: Line>(lines: &[L], x: &[f64]) -> Vec<f64> {
    let mut y = vec![0.0; x.len()];
    for line in lines {
        let (center, height, shape) = (line.center(), line.height(), line.shape());
        // beyond 50 widths every shape used here is below 1e-4 of its height
        let reach = 50.0 * shape.fwhm().max(f64::EPSILON);
        for (yi, &xi) in y.iter_mut().zip(x) {
            let dx = xi - center;
            if dx.abs() <= reach {
                *yi += height * shape.value(dx);
            }
        }
    }
    y
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Simple(f64, f64, Shape);

    impl Line for Simple {
        fn center(&self) -> f64 {
            self.0
        }
        fn height(&self) -> f64 {
            self.1
        }
        fn shape(&self) -> Shape {
            self.2
        }
    }

    #[test]
    fn test_half_height_at_half_width() {
        for shape in [
            Shape::Gaussian { fwhm: 0.002 },
            Shape::PseudoVoigt { fwhm: 0.002, mu: 0.4 },
            Shape::PseudoVoigt { fwhm: 0.002, mu: 1.0 },
        ] {
            assert_relative_eq!(shape.value(0.0), 1.0);
            assert_relative_eq!(shape.value(0.001), 0.5, epsilon = 1e-12);
            assert_relative_eq!(shape.value(-0.001), 0.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_lorentzian_has_heavier_tails() {
        let g = Shape::Gaussian { fwhm: 1.0 };
        let pv = Shape::PseudoVoigt { fwhm: 1.0, mu: 0.5 };
        assert!(pv.value(3.0) > g.value(3.0));
    }

    #[test]
    fn test_shape_serializes_with_kind_tag() {
        let json = serde_json::to_value(Shape::PseudoVoigt { fwhm: 0.5, mu: 0.0 }).unwrap();
        assert_eq!(json["kind"], "pseudoVoigt");
        assert_eq!(json["fwhm"], 0.5);
        let back: Shape = serde_json::from_value(json).unwrap();
        assert_eq!(back.fwhm(), 0.5);
        assert!(back.is_pseudo_voigt());
    }

    #[test]
    fn test_synthesize_sums_lines() {
        let x = vec![0.0, 1.0, 2.0];
        let lines = [
            Simple(0.0, 2.0, Shape::Gaussian { fwhm: 0.1 }),
            Simple(2.0, 3.0, Shape::Gaussian { fwhm: 0.1 }),
        ];
        let y = synthesize(&lines, &x);
        assert_relative_eq!(y[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(y[1], 0.0, epsilon = 1e-9);
        assert_relative_eq!(y[2], 3.0, epsilon = 1e-9);
    }
}
