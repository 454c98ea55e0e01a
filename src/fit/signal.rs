/// Doublet signal model
///
/// A `DoubletSignal` is what the optimizer moves around: a centre, an
/// amplitude, a coupling and a line shape, each bounded. Once fitted it is
/// turned into plain values (`FittedSignal`, `FittedPeak`) for output.

use serde::{Deserialize, Serialize};

use super::shape::{Line, Shape};
use super::windows::FitWindows;
use crate::config::FitConfig;

/// Box constraint for one parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
    /// Finite-difference step in parameter units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradient_difference: Option<f64>,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            gradient_difference: None,
        }
    }

    pub const fn with_gradient_difference(mut self, step: f64) -> Self {
        self.gradient_difference = Some(step);
        self
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    pub x: Bounds,
    pub y: Bounds,
    pub fwhm: Bounds,
    pub coupling: Bounds,
    pub mu: Bounds,
}

/// One component of a multiplet template. Only the sign of `x` matters
/// for placement; `y` is the relative intensity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternPeak {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoubletSignal {
    pub x: f64,
    pub y: f64,
    pub coupling: f64,
    pub pattern: [PatternPeak; 2],
    pub shape: Shape,
    pub parameters: ParameterBounds,
}

/// A fitted signal, pattern removed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedSignal {
    pub x: f64,
    pub y: f64,
    pub coupling: f64,
    pub shape: Shape,
    pub parameters: ParameterBounds,
}

/// One expanded line of a fitted doublet; carries the signal's fields
/// apart from the pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPeak {
    pub x: f64,
    pub y: f64,
    pub coupling: f64,
    pub shape: Shape,
    pub parameters: ParameterBounds,
}

impl Line for FittedPeak {
    fn center(&self) -> f64 {
        self.x
    }
    fn height(&self) -> f64 {
        self.y
    }
    fn shape(&self) -> Shape {
        self.shape
    }
}

fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

impl DoubletSignal {
    /// Number of free parameters: x, y, fwhm, coupling, plus mu for pseudo-Voigt
    pub fn parameter_count(&self) -> usize {
        if self.shape.is_pseudo_voigt() {
            5
        } else {
            4
        }
    }

    pub fn values(&self) -> Vec<f64> {
        let mut v = vec![self.x, self.y, self.shape.fwhm(), self.coupling];
        if self.shape.is_pseudo_voigt() {
            v.push(self.shape.mu());
        }
        v
    }

    pub fn bounds(&self) -> Vec<Bounds> {
        let p = &self.parameters;
        let mut b = vec![p.x, p.y, p.fwhm, p.coupling];
        if self.shape.is_pseudo_voigt() {
            b.push(p.mu);
        }
        b
    }

    /// Copy with parameter values taken from `values` (same order as `values()`)
    pub fn with_values(&self, values: &[f64]) -> Self {
        let mut next = self.clone();
        next.x = values[0];
        next.y = values[1];
        next.shape = next.shape.with_fwhm(values[2]);
        next.coupling = values[3];
        if let Some(&mu) = values.get(4) {
            next.shape = next.shape.with_mu(mu);
        }
        next
    }

    /// Switch to a pseudo-Voigt shape keeping the current width
    pub fn into_pseudo_voigt(self, mu: f64) -> Self {
        let fwhm = self.shape.fwhm();
        let mu = self.parameters.mu.clamp(mu);
        Self {
            shape: Shape::PseudoVoigt { fwhm, mu },
            ..self
        }
    }

    /// Expand the doublet: each pattern line sits half a coupling from the
    /// centre, on the side given by the sign of its pattern offset.
    pub fn expand(&self) -> [FittedPeak; 2] {
        let half = self.coupling / 2.0;
        self.pattern.map(|p| FittedPeak {
            x: self.x + sign(p.x) * half,
            y: self.y * p.y,
            coupling: self.coupling,
            shape: self.shape,
            parameters: self.parameters,
        })
    }

    pub fn to_fitted(&self) -> FittedSignal {
        FittedSignal {
            x: self.x,
            y: self.y,
            coupling: self.coupling,
            shape: self.shape,
            parameters: self.parameters,
        }
    }
}

/// Expanded lines of every signal, in signal order
pub fn expand_all(signals: &[DoubletSignal]) -> Vec<FittedPeak> {
    signals.iter().flat_map(|s| s.expand()).collect()
}

/// Initial guesses for the two doublets; signal 1 is bounded by the
/// downfield window, signal 2 by the upfield one.
pub fn build_signals(config: &FitConfig, windows: &FitWindows, frequency: f64) -> [DoubletSignal; 2] {
    let js = config.coupling_hz / frequency;
    let width = config.width_hz / frequency;
    let pattern = [
        PatternPeak { x: -js / 2.0, y: 1.0 },
        PatternPeak { x: js / 2.0, y: 1.0 },
    ];
    let make = |index: usize, x_bounds: Bounds| {
        let guess = &config.signals[index];
        let parameters = ParameterBounds {
            x: x_bounds,
            y: Bounds::new(0.0, 1.0).with_gradient_difference(0.001),
            fwhm: Bounds::new(width / 2.0, width * 1.2),
            coupling: Bounds::new(js * guess.coupling_min_factor, js * guess.coupling_max_factor),
            mu: Bounds::new(0.0, 1.0),
        };
        DoubletSignal {
            x: parameters.x.clamp(guess.x),
            y: parameters.y.clamp(guess.y),
            coupling: parameters.coupling.clamp(js),
            pattern,
            shape: Shape::Gaussian {
                fwhm: parameters.fwhm.clamp(width),
            },
            parameters,
        }
    };
    [make(0, windows.x1), make(1, windows.x2)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn signal(x: f64, y: f64, coupling: f64) -> DoubletSignal {
        DoubletSignal {
            x,
            y,
            coupling,
            pattern: [PatternPeak { x: -1.0, y: 1.0 }, PatternPeak { x: 1.0, y: 1.0 }],
            shape: Shape::Gaussian { fwhm: 0.001 },
            parameters: ParameterBounds {
                x: Bounds::new(0.0, 10.0),
                y: Bounds::new(0.0, 1.0),
                fwhm: Bounds::new(0.0005, 0.002),
                coupling: Bounds::new(0.0, 3.0),
                mu: Bounds::new(0.0, 1.0),
            },
        }
    }

    #[test]
    fn test_expand_uses_sign_and_half_coupling() {
        let peaks = signal(6.29, 0.8, 2.0).expand();
        assert_relative_eq!(peaks[0].x, 5.29, epsilon = 1e-12);
        assert_relative_eq!(peaks[1].x, 7.29, epsilon = 1e-12);
        assert_relative_eq!(peaks[0].y, 0.8);
        assert_relative_eq!(peaks[1].y, 0.8);
        assert_eq!(peaks[0].coupling, 2.0);
        assert_eq!(peaks[1].parameters, signal(6.29, 0.8, 2.0).parameters);
    }

    #[test]
    fn test_zero_pattern_offset_sits_on_centre() {
        let mut s = signal(6.29, 1.0, 0.004);
        s.pattern[0] = PatternPeak { x: 0.0, y: 0.5 };
        let peaks = s.expand();
        assert_relative_eq!(peaks[0].x, 6.29);
        assert_relative_eq!(peaks[0].y, 0.5);
    }

    #[test]
    fn test_values_roundtrip_through_with_values() {
        let s = signal(6.29, 0.8, 0.004).into_pseudo_voigt(0.0);
        assert_eq!(s.parameter_count(), 5);
        let v = vec![6.3, 0.7, 0.0012, 0.0041, 0.25];
        let moved = s.with_values(&v);
        assert_eq!(moved.values(), v);
        assert_eq!(moved.shape, Shape::PseudoVoigt { fwhm: 0.0012, mu: 0.25 });
        // the original is untouched
        assert_relative_eq!(s.x, 6.29);
    }

    #[test]
    fn test_build_signals_from_config() {
        let config = FitConfig::default();
        let windows = FitWindows {
            x1: Bounds::new(6.29, 6.30).with_gradient_difference(0.0001),
            x2: Bounds::new(6.28, 6.29).with_gradient_difference(0.0001),
        };
        let [s1, s2] = build_signals(&config, &windows, 600.0);
        let js = 2.34 / 600.0;
        assert_relative_eq!(s1.coupling, js);
        assert_relative_eq!(s1.parameters.coupling.min, js * 0.9);
        assert_relative_eq!(s2.parameters.coupling.min, js * 0.8);
        assert_relative_eq!(s1.parameters.fwhm.max, 0.97 / 600.0 * 1.2);
        assert_relative_eq!(s1.x, 6.29);
        // guess 6.283 lies inside the second window
        assert_relative_eq!(s2.x, 6.283);
        assert_eq!(s2.parameters.x, windows.x2);
        assert_relative_eq!(s1.pattern[1].x, js / 2.0);
    }

    #[test]
    fn test_fitted_signal_has_no_pattern() {
        let json = serde_json::to_value(signal(6.29, 1.0, 0.004).to_fitted()).unwrap();
        assert!(json.get("pattern").is_none());
        assert_eq!(json["shape"]["kind"], "gaussian");
        assert!(json["parameters"]["x"].get("gradientDifference").is_none());
    }
}
