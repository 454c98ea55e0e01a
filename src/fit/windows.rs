/// Peak window derivation
///
/// The tallest picked peak splits the ROI: the first doublet centre is
/// searched between it and its downfield neighbour, the second between
/// its upfield neighbour and it.

use super::ranges::Range;
use super::signal::Bounds;

/// Finite-difference step attached to both centre windows (ppm)
pub const WINDOW_GRADIENT_DIFFERENCE: f64 = 0.0001;

/// Location of the tallest peak as indices into ranges, signals and peaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakSearchResult {
    Found { range: usize, signal: usize, peak: usize },
    NotFound,
}

/// Tallest peak over all ranges; ties keep the first one in scan order.
pub fn find_biggest_peak(ranges: &[Range]) -> PeakSearchResult {
    let mut result = PeakSearchResult::NotFound;
    let mut max = f64::NEG_INFINITY;
    for (ri, range) in ranges.iter().enumerate() {
        for (si, signal) in range.signals.iter().enumerate() {
            for (pi, peak) in signal.peaks.iter().enumerate() {
                if peak.y > max {
                    max = peak.y;
                    result = PeakSearchResult::Found {
                        range: ri,
                        signal: si,
                        peak: pi,
                    };
                }
            }
        }
    }
    result
}

/// Bounds for the two doublet centres
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitWindows {
    /// Window for signal 1, at and above the tallest peak
    pub x1: Bounds,
    /// Window for signal 2, at and below the tallest peak
    pub x2: Bounds,
}

/// `None` when nothing was picked.
pub fn derive_windows(ranges: &[Range], frequency: f64) -> Option<FitWindows> {
    let last = ranges.last()?;

    let (x1, x2) = match find_biggest_peak(ranges) {
        PeakSearchResult::Found {
            range,
            signal,
            peak,
        } => {
            let peaks = &ranges[range].signals[signal].peaks;
            let biggest = &peaks[peak];
            let reach = biggest.width / frequency * 2.0;
            let upper = match peaks.get(peak + 1) {
                Some(next) => next.x,
                None => biggest.x + reach,
            };
            let lower = match peak.checked_sub(1) {
                Some(prev) => peaks[prev].x,
                None => biggest.x - reach,
            };
            ((biggest.x, upper), (lower, biggest.x))
        }
        PeakSearchResult::NotFound => {
            let mid = last.zone().midpoint();
            ((mid, last.to), (last.from, mid))
        }
    };

    Some(FitWindows {
        x1: Bounds::new(x1.0, x1.1).with_gradient_difference(WINDOW_GRADIENT_DIFFERENCE),
        x2: Bounds::new(x2.0, x2.1).with_gradient_difference(WINDOW_GRADIENT_DIFFERENCE),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::ranges::{RangePeak, RangeSignal};
    use approx::assert_relative_eq;

    fn range(from: f64, to: f64, peaks: &[(f64, f64)]) -> Range {
        Range {
            from,
            to,
            integration: 0.0,
            signals: vec![RangeSignal {
                delta: (from + to) / 2.0,
                multiplicity: "m".into(),
                peaks: peaks
                    .iter()
                    .map(|&(x, y)| RangePeak { x, y, width: 1.2 })
                    .collect(),
            }],
        }
    }

    #[test]
    fn test_windows_around_last_peak_of_signal() {
        let ranges = vec![range(6.27, 6.31, &[(6.28, 1.0), (6.30, 5.0)])];
        assert_eq!(
            find_biggest_peak(&ranges),
            PeakSearchResult::Found {
                range: 0,
                signal: 0,
                peak: 1
            }
        );
        let w = derive_windows(&ranges, 600.0).unwrap();
        assert_relative_eq!(w.x1.min, 6.30);
        assert_relative_eq!(w.x1.max, 6.30 + 1.2 / 600.0 * 2.0);
        assert_relative_eq!(w.x2.min, 6.28);
        assert_relative_eq!(w.x2.max, 6.30);
        assert_eq!(w.x1.gradient_difference, Some(0.0001));
        assert_eq!(w.x2.gradient_difference, Some(0.0001));
    }

    #[test]
    fn test_windows_around_middle_and_first_peak() {
        let ranges = vec![range(6.27, 6.31, &[(6.28, 1.0), (6.29, 5.0), (6.30, 2.0)])];
        let w = derive_windows(&ranges, 600.0).unwrap();
        assert_relative_eq!(w.x1.min, 6.29);
        assert_relative_eq!(w.x1.max, 6.30);
        assert_relative_eq!(w.x2.min, 6.28);

        let ranges = vec![range(6.27, 6.31, &[(6.28, 9.0), (6.29, 5.0)])];
        let w = derive_windows(&ranges, 600.0).unwrap();
        assert_relative_eq!(w.x2.min, 6.28 - 1.2 / 600.0 * 2.0);
        assert_relative_eq!(w.x2.max, 6.28);
        assert_relative_eq!(w.x1.max, 6.29);
    }

    #[test]
    fn test_tie_keeps_first_in_scan_order() {
        let ranges = vec![
            range(6.27, 6.28, &[(6.275, 3.0)]),
            range(6.29, 6.30, &[(6.295, 3.0)]),
        ];
        assert_eq!(
            find_biggest_peak(&ranges),
            PeakSearchResult::Found {
                range: 0,
                signal: 0,
                peak: 0
            }
        );
    }

    #[test]
    fn test_no_ranges_and_no_peaks() {
        assert_eq!(derive_windows(&[], 600.0), None);

        let ranges = vec![range(6.27, 6.28, &[]), range(6.29, 6.31, &[])];
        assert_eq!(find_biggest_peak(&ranges), PeakSearchResult::NotFound);
        let w = derive_windows(&ranges, 600.0).unwrap();
        assert_relative_eq!(w.x1.min, 6.30);
        assert_relative_eq!(w.x1.max, 6.31);
        assert_relative_eq!(w.x2.min, 6.29);
        assert_relative_eq!(w.x2.max, 6.30);
    }
}
