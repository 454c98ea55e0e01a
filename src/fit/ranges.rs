/// Automatic range picking
///
/// Local maxima are picked on the ROI, refined, measured for width and
/// clustered into ranges. Each range carries a single signal holding all
/// of its peaks in ascending ppm order.

use serde::{Deserialize, Serialize};

use crate::data::spectrum::{XyData, Zone};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickingOptions {
    /// Fraction of the maximum intensity a peak must exceed
    pub threshold_fraction: f64,
    /// Minimum index distance between accepted peaks
    pub min_distance: usize,
    /// Peaks closer than this (Hz) end up in the same range
    pub frequency_cluster_hz: f64,
}

impl Default for PickingOptions {
    fn default() -> Self {
        Self {
            threshold_fraction: 0.05,
            min_distance: 2,
            frequency_cluster_hz: 6.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangePeak {
    pub x: f64,
    pub y: f64,
    /// Full width at half maximum in Hz
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSignal {
    /// Intensity-weighted centre in ppm
    pub delta: f64,
    pub multiplicity: String,
    pub peaks: Vec<RangePeak>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub from: f64,
    pub to: f64,
    pub integration: f64,
    pub signals: Vec<RangeSignal>,
}

impl Range {
    pub fn peak_count(&self) -> usize {
        self.signals.iter().map(|s| s.peaks.len()).sum()
    }

    pub fn zone(&self) -> Zone {
        Zone::new(self.from, self.to)
    }
}

/// Detects ranges on an ascending (x, y) region.
pub trait RangePicker {
    fn pick(&self, xy: &XyData, frequency: f64) -> Vec<Range>;
}

#[derive(Debug, Clone, Default)]
pub struct AutoRangePicker {
    pub options: PickingOptions,
}

impl AutoRangePicker {
    pub fn new(options: PickingOptions) -> Self {
        Self { options }
    }
}

impl RangePicker for AutoRangePicker {
    fn pick(&self, xy: &XyData, frequency: f64) -> Vec<Range> {
        if frequency <= 0.0 {
            return vec![];
        }
        let opts = &self.options;
        let mut peaks: Vec<RangePeak> = pick_maxima(&xy.y, opts.threshold_fraction, opts.min_distance)
            .into_iter()
            .map(|i| refine_peak(xy, i, frequency))
            .collect();
        peaks.sort_by(|a, b| a.x.total_cmp(&b.x));

        let max_gap = self.options.frequency_cluster_hz / frequency;
        cluster(peaks, max_gap)
            .into_iter()
            .map(|group| build_range(xy, group, frequency))
            .collect()
    }
}

/// Indices of local maxima above `threshold_fraction * max(y)`, strongest
/// first, at least `min_distance + 1` points apart.
fn pick_maxima(y: &[f64], threshold_fraction: f64, min_distance: usize) -> Vec<usize> {
    let n = y.len();
    if n < 3 {
        return vec![];
    }
    let max_val = y.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max_val <= 0.0 {
        return vec![];
    }
    let threshold = max_val * threshold_fraction;

    let mut candidates: Vec<(usize, f64)> = (1..n - 1)
        .filter(|&i| y[i] > threshold && y[i] > 0.0 && y[i] >= y[i - 1] && y[i] >= y[i + 1])
        .map(|i| (i, y[i]))
        .collect();
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut selected: Vec<usize> = Vec::new();
    for (idx, _) in candidates {
        if !selected.iter().any(|&s| s.abs_diff(idx) <= min_distance) {
            selected.push(idx);
        }
    }
    selected
}

/// Parabolic apex refinement plus half-height width
fn refine_peak(xy: &XyData, i: usize, frequency: f64) -> RangePeak {
    let (x, y) = (&xy.x, &xy.y);
    let (left, centre, right) = (y[i - 1], y[i], y[i + 1]);
    let denom = left - 2.0 * centre + right;
    let (apex_x, apex_y) = if denom < 0.0 {
        let offset = (0.5 * (left - right) / denom).clamp(-0.5, 0.5);
        let step = if offset >= 0.0 { x[i + 1] - x[i] } else { x[i] - x[i - 1] };
        (x[i] + offset * step, centre - 0.25 * (left - right) * offset)
    } else {
        (x[i], centre)
    };

    let half = apex_y / 2.0;
    let mut l = i;
    while l > 0 && y[l] > half {
        l -= 1;
    }
    let left_x = if y[l] > half {
        x[l]
    } else {
        interpolate_crossing(x[l], y[l], x[l + 1], y[l + 1], half)
    };
    let mut r = i;
    while r + 1 < y.len() && y[r] > half {
        r += 1;
    }
    let right_x = if y[r] > half {
        x[r]
    } else {
        interpolate_crossing(x[r - 1], y[r - 1], x[r], y[r], half)
    };

    RangePeak {
        x: apex_x,
        y: apex_y,
        width: (right_x - left_x).abs() * frequency,
    }
}

fn interpolate_crossing(x0: f64, y0: f64, x1: f64, y1: f64, level: f64) -> f64 {
    let dy = y1 - y0;
    if dy.abs() < f64::EPSILON {
        return (x0 + x1) / 2.0;
    }
    x0 + (level - y0) / dy * (x1 - x0)
}

/// Greedy grouping of ascending peaks with consecutive gaps `<= max_gap`
fn cluster(peaks: Vec<RangePeak>, max_gap: f64) -> Vec<Vec<RangePeak>> {
    let mut groups: Vec<Vec<RangePeak>> = Vec::new();
    for peak in peaks {
        match groups.last_mut() {
            Some(group) if group.last().is_some_and(|last| peak.x - last.x <= max_gap) => {
                group.push(peak);
            }
            _ => groups.push(vec![peak]),
        }
    }
    groups
}

fn multiplet_label(n: usize) -> &'static str {
    match n {
        1 => "s",
        2 => "d",
        3 => "t",
        4 => "q",
        5 => "quint",
        6 => "sext",
        7 => "sept",
        _ => "m",
    }
}

fn build_range(xy: &XyData, peaks: Vec<RangePeak>, frequency: f64) -> Range {
    let first = &peaks[0];
    let last = &peaks[peaks.len() - 1];
    let x_min = xy.x.first().copied().unwrap_or(first.x);
    let x_max = xy.x.last().copied().unwrap_or(last.x);
    let from = (first.x - first.width / frequency).max(x_min);
    let to = (last.x + last.width / frequency).min(x_max);

    let total: f64 = peaks.iter().map(|p| p.y.abs()).sum();
    let delta = if total > 0.0 {
        peaks.iter().map(|p| p.x * p.y.abs()).sum::<f64>() / total
    } else {
        peaks.iter().map(|p| p.x).sum::<f64>() / peaks.len() as f64
    };

    Range {
        from,
        to,
        integration: integrate(xy, from, to),
        signals: vec![RangeSignal {
            delta,
            multiplicity: multiplet_label(peaks.len()).to_string(),
            peaks,
        }],
    }
}

/// Trapezoidal integral over `[from, to]`
fn integrate(xy: &XyData, from: f64, to: f64) -> f64 {
    xy.x
        .windows(2)
        .zip(xy.y.windows(2))
        .filter(|(x, _)| x[0] >= from && x[1] <= to)
        .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
        .sum()
}
