/// Fit result assembly and output
///
/// Fitted doublets are expanded into lines, brought back to the original
/// intensity scale, resynthesized on the ROI grid and written as a
/// one-record JSON array per spectrum.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::shape::synthesize;
use super::signal::{DoubletSignal, FittedPeak, FittedSignal};
use crate::data::spectrum::{XyData, Zone};
use crate::error::Result;

/// Fit on the original intensity scale
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledFit {
    pub peaks: Vec<FittedPeak>,
    pub signals: Vec<FittedSignal>,
    pub fit: Vec<f64>,
    pub residual: Vec<f64>,
}

pub fn rescale_peaks(peaks: &[FittedPeak], factor: f64) -> Vec<FittedPeak> {
    peaks
        .iter()
        .map(|p| FittedPeak {
            y: p.y * factor,
            ..p.clone()
        })
        .collect()
}

pub fn rescale_signals(signals: &[FittedSignal], factor: f64) -> Vec<FittedSignal> {
    signals
        .iter()
        .map(|s| FittedSignal {
            y: s.y * factor,
            ..s.clone()
        })
        .collect()
}

/// Expand, rescale by `scale` and compute fit and residual on the
/// experimental x grid.
pub fn assemble(signals: &[DoubletSignal], experimental: &XyData, scale: f64) -> AssembledFit {
    let expanded: Vec<FittedPeak> = signals.iter().flat_map(|s| s.expand()).collect();
    let fitted: Vec<FittedSignal> = signals.iter().map(DoubletSignal::to_fitted).collect();

    let peaks = rescale_peaks(&expanded, scale);
    let signals = rescale_signals(&fitted, scale);
    let fit = synthesize(&peaks, &experimental.x);
    let residual = experimental
        .y
        .iter()
        .zip(&fit)
        .map(|(y, f)| y - f)
        .collect();

    AssembledFit {
        peaks,
        signals,
        fit,
        residual,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoiFit {
    pub roi: Zone,
    pub fit: Vec<f64>,
    pub residual: Vec<f64>,
    /// Kept for readers of older files; always empty
    pub peaks: Vec<FittedPeak>,
    pub optimized_peaks: Vec<FittedPeak>,
    pub signals: Vec<FittedSignal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitRecord {
    pub name: String,
    /// Always the string "null"
    pub expno: String,
    pub fit: Vec<RoiFit>,
    pub xy_data: XyData,
    pub frequency: f64,
}

impl FitRecord {
    pub fn new(name: &str, roi: Zone, experimental: XyData, frequency: f64, assembled: AssembledFit) -> Self {
        Self {
            name: name.to_string(),
            expno: "null".to_string(),
            fit: vec![RoiFit {
                roi,
                fit: assembled.fit,
                residual: assembled.residual,
                peaks: Vec::new(),
                optimized_peaks: assembled.peaks,
                signals: assembled.signals,
            }],
            xy_data: experimental,
            frequency,
        }
    }
}

pub fn output_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}_FIT.json", name))
}

/// Write `[record]` to `<dir>/<name>_FIT.json`.
pub fn write_record(dir: &Path, record: &FitRecord) -> Result<PathBuf> {
    let path = output_path(dir, &record.name);
    let json = serde_json::to_string(std::slice::from_ref(record))?;
    fs::write(&path, json)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::shape::Shape;
    use crate::fit::signal::{Bounds, ParameterBounds, PatternPeak};
    use approx::assert_relative_eq;

    fn signal(x: f64, y: f64, coupling: f64) -> DoubletSignal {
        DoubletSignal {
            x,
            y,
            coupling,
            pattern: [PatternPeak { x: -1.0, y: 1.0 }, PatternPeak { x: 1.0, y: 1.0 }],
            shape: Shape::PseudoVoigt { fwhm: 0.0015, mu: 0.1 },
            parameters: ParameterBounds {
                x: Bounds::new(6.28, 6.30).with_gradient_difference(0.0001),
                y: Bounds::new(0.0, 1.0).with_gradient_difference(0.001),
                fwhm: Bounds::new(0.0008, 0.002),
                coupling: Bounds::new(0.003, 0.005),
                mu: Bounds::new(0.0, 1.0),
            },
        }
    }

    fn roi_data() -> XyData {
        let x: Vec<f64> = (0..=450).map(|i| 6.27 + i as f64 * 0.0001).collect();
        let y = vec![0.0; x.len()];
        XyData::new(x, y)
    }

    #[test]
    fn test_scale_multiplies_every_y_and_keeps_x() {
        let signals = [signal(6.29, 0.6, 0.0039), signal(6.2861, 0.3, 0.0039)];
        let base = assemble(&signals, &roi_data(), 1.0);
        let scaled = assemble(&signals, &roi_data(), 250.0);

        assert_eq!(base.peaks.len(), 4);
        for (a, b) in base.peaks.iter().zip(&scaled.peaks) {
            assert_relative_eq!(b.y, a.y * 250.0, max_relative = 1e-12);
            assert_eq!(a.x, b.x);
        }
        for (a, b) in base.signals.iter().zip(&scaled.signals) {
            assert_relative_eq!(b.y, a.y * 250.0, max_relative = 1e-12);
            assert_eq!(a.x, b.x);
        }
        assert_relative_eq!(scaled.peaks[0].y, 0.6 * 250.0, max_relative = 1e-12);
    }

    #[test]
    fn test_residual_is_data_minus_fit() {
        let signals = [signal(6.29, 0.6, 0.0039)];
        let mut data = roi_data();
        let model = assemble(&signals, &data, 10.0);
        data.y = model.fit.iter().map(|v| v + 0.5).collect();

        let again = assemble(&signals, &data, 10.0);
        assert!(again.residual.iter().all(|r| (r - 0.5).abs() < 1e-12));
        let apex = again.fit.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert_relative_eq!(apex, 6.0, epsilon = 0.1);
    }

    #[test]
    fn test_written_json_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let data = roi_data();
        let assembled = assemble(&[signal(6.29, 0.6, 0.0039)], &data, 2.0);
        let record = FitRecord::new("urine_10", Zone::new(6.27, 6.315), data, 600.13, assembled);

        let path = write_record(tmp.path(), &record).unwrap();
        assert_eq!(path, tmp.path().join("urine_10_FIT.json"));

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let records = json.as_array().unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r["name"], "urine_10");
        assert_eq!(r["expno"], "null");
        assert_eq!(r["frequency"], 600.13);
        assert_eq!(r["xyData"]["x"].as_array().unwrap().len(), 451);

        let fit = r["fit"].as_array().unwrap();
        assert_eq!(fit.len(), 1);
        assert_eq!(fit[0]["roi"]["from"], 6.27);
        assert_eq!(fit[0]["peaks"].as_array().unwrap().len(), 0);
        assert_eq!(fit[0]["optimizedPeaks"].as_array().unwrap().len(), 2);
        assert_eq!(fit[0]["optimizedPeaks"][0]["parameters"]["x"]["min"], 6.28);
        assert!(fit[0]["optimizedPeaks"][0].get("pattern").is_none());
        assert!(fit[0]["signals"][0].get("pattern").is_none());
        assert_eq!(fit[0]["signals"][0]["shape"]["kind"], "pseudoVoigt");
        assert_eq!(fit[0]["residual"].as_array().unwrap().len(), 451);

        let back: Vec<FitRecord> = serde_json::from_value(json).unwrap();
        assert_eq!(back[0].name, record.name);
        assert_eq!(back[0].fit[0].optimized_peaks.len(), 2);
    }
}
