/// Region-of-interest utilities and the background gate

use crate::data::spectrum::{XyData, Zone};

/// Points whose x falls inside any of the zones (bounds inclusive)
pub fn xy_extract(xy: &XyData, zones: &[Zone]) -> XyData {
    let (x, y): (Vec<f64>, Vec<f64>) = xy
        .points()
        .filter(|&(x, _)| zones.iter().any(|z| z.contains(x)))
        .unzip();
    XyData::new(x, y)
}

/// Median of the finite values; `None` when there are none.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMax {
    pub min: f64,
    pub max: f64,
}

impl MinMax {
    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}

pub fn min_max(values: &[f64]) -> Option<MinMax> {
    values.iter().copied().fold(None, |acc, v| match acc {
        None => Some(MinMax { min: v, max: v }),
        Some(m) => Some(MinMax {
            min: m.min.min(v),
            max: m.max.max(v),
        }),
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    Proceed { median_all: f64, median_roi: f64 },
    Reject { median_all: f64, median_roi: f64 },
    /// No points in the gate window
    EmptyRoi,
}

/// Reject when `median_all * factor > median_roi`; equality proceeds.
pub fn gate_decision(median_all: f64, median_roi: f64, factor: f64) -> GateDecision {
    if median_all * factor > median_roi {
        GateDecision::Reject {
            median_all,
            median_roi,
        }
    } else {
        GateDecision::Proceed {
            median_all,
            median_roi,
        }
    }
}

/// Median test between the whole spectrum and the gate window
pub fn gate(xy: &XyData, window: Zone, factor: f64) -> GateDecision {
    let roi = xy_extract(xy, &[window]);
    match (median(&xy.y), median(&roi.y)) {
        (Some(all), Some(in_roi)) => gate_decision(all, in_roi, factor),
        _ => GateDecision::EmptyRoi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_inclusive_bounds() {
        let xy = XyData::new(vec![6.1, 6.2, 6.3, 6.4, 6.5], vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let roi = xy_extract(&xy, &[Zone::new(6.2, 6.4)]);
        assert_eq!(roi.x, vec![6.2, 6.3, 6.4]);
        assert_eq!(roi.y, vec![2.0, 3.0, 4.0]);

        let two = xy_extract(&xy, &[Zone::new(6.05, 6.15), Zone::new(6.45, 6.55)]);
        assert_eq!(two.y, vec![1.0, 5.0]);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[f64::NAN, 5.0]), Some(5.0));
    }

    #[test]
    fn test_min_max() {
        assert_eq!(min_max(&[]), None);
        let m = min_max(&[2.0, -1.0, 7.0]).unwrap();
        assert_eq!((m.min, m.max, m.range()), (-1.0, 7.0, 8.0));
    }

    #[test]
    fn test_gate_boundaries() {
        assert!(matches!(gate_decision(1.0, 2.9, 3.0), GateDecision::Reject { .. }));
        assert!(matches!(gate_decision(1.0, 4.0, 3.0), GateDecision::Proceed { .. }));
        // equality is not strictly greater
        assert!(matches!(gate_decision(1.0, 3.0, 3.0), GateDecision::Proceed { .. }));
        // negative medians are compared, never divided
        assert!(matches!(gate_decision(-1.0, -2.0, 3.0), GateDecision::Proceed { .. }));
        assert!(matches!(gate_decision(0.0, 0.0, 3.0), GateDecision::Proceed { .. }));
    }

    #[test]
    fn test_gate_on_data() {
        let x: Vec<f64> = (0..100).map(|i| 6.0 + i as f64 * 0.01).collect();
        let y: Vec<f64> = x.iter().map(|&v| if (6.2..=6.4).contains(&v) { 10.0 } else { 1.0 }).collect();
        let xy = XyData::new(x, y);
        assert!(matches!(gate(&xy, Zone::new(6.2, 6.4), 3.0), GateDecision::Proceed { .. }));
        assert_eq!(gate(&xy, Zone::new(9.0, 9.5), 3.0), GateDecision::EmptyRoi);
    }
}
