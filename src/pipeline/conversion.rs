/// Conversion of experiment groups into spectra
///
/// Processed Bruker spectra are read directly. Experiments that only carry
/// a raw FID go through the processing chain first, unless the filter asks
/// to ignore them.

use crate::data::bruker::{processed_path, read_bruker_fid, read_bruker_processed};
use crate::data::experiments::{Experiment, ExperimentFilter};
use crate::data::spectrum::Spectrum;
use crate::error::{FitError, Result};
use crate::log::reproducibility::ReproLog;
use crate::pipeline::processing::{process_fid, ProcessingOptions};

/// Turns a group of experiments into spectra with ascending x.
pub trait SpectrumLoader {
    fn load_group(&self, group: &[Experiment], log: &mut ReproLog) -> Result<Vec<Spectrum>>;
}

#[derive(Debug, Clone, Default)]
pub struct BrukerLoader {
    pub filter: ExperimentFilter,
    pub processing: ProcessingOptions,
}

impl BrukerLoader {
    pub fn new(filter: ExperimentFilter, processing: ProcessingOptions) -> Self {
        Self { filter, processing }
    }

    pub fn load_experiment(&self, exp: &Experiment, log: &mut ReproLog) -> Result<Spectrum> {
        let name = exp.name();
        let procno = self.filter.processing_number;

        let data = if processed_path(&exp.dir, procno).is_some() {
            let data = read_bruker_processed(&exp.dir, procno)?;
            log.add_entry(
                &name,
                "Load",
                &format!("Processed spectrum pdata/{}/1r ({} points)", procno, data.real.len()),
            );
            data
        } else if !self.filter.ignore_fid {
            let mut data = read_bruker_fid(&exp.dir)?;
            log.add_entry(
                &name,
                "Load",
                &format!("Raw FID ({} complex points), processing", data.real.len()),
            );
            process_fid(&mut data, &self.processing, log);
            data
        } else {
            return Err(FitError::bruker(
                &exp.dir,
                format!("no pdata/{}/1r and FID processing is disabled", procno),
            ));
        };

        Ok(Spectrum {
            name,
            expno: exp.expno,
            frequency: data.axis.observe_freq_mhz,
            nucleus: data.axis.nucleus.clone(),
            source_path: exp.dir.clone(),
            data: data.to_xy(),
        })
    }
}

impl SpectrumLoader for BrukerLoader {
    fn load_group(&self, group: &[Experiment], log: &mut ReproLog) -> Result<Vec<Spectrum>> {
        let mut spectra = Vec::with_capacity(group.len());
        for exp in group {
            match self.load_experiment(exp, log) {
                Ok(spectrum) => {
                    log::info!(
                        "Loaded {} ({} points, {} at {:.3} MHz)",
                        spectrum.name,
                        spectrum.data.len(),
                        spectrum.nucleus,
                        spectrum.frequency
                    );
                    spectra.push(spectrum);
                }
                Err(e) => log::warn!("Skipping {}: {}", exp.dir.display(), e),
            }
        }
        Ok(spectra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::bruker::fixtures;
    use crate::data::experiments::{file_list, group_by_experiments};
    use std::path::Path;

    fn experiments(root: &Path, filter: &ExperimentFilter) -> Vec<Experiment> {
        group_by_experiments(&file_list(root).unwrap(), filter)
    }

    #[test]
    fn test_processed_spectrum_is_ascending() {
        let tmp = tempfile::tempdir().unwrap();
        let exp = tmp.path().join("urine").join("10");
        fixtures::write_acqus(&exp, 600.0, 6000.0, 16);
        // acquisition order: 8.0, 7.0, 6.0, 5.0 ppm
        fixtures::write_processed(&exp, &[40, 30, 20, 10], 600.0, 2400.0, 8.0);

        let mut log = ReproLog::new();
        let loader = BrukerLoader::default();
        let spectra = loader
            .load_group(&experiments(tmp.path(), &loader.filter), &mut log)
            .unwrap();
        assert_eq!(spectra.len(), 1);
        let s = &spectra[0];
        assert_eq!(s.name, "urine_10");
        assert_eq!(s.expno, 10);
        assert_eq!(s.frequency, 600.0);
        assert!(s.data.x.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(s.data.x.last().copied(), Some(8.0));
        assert_eq!(s.data.y, vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(log.entries_for("urine_10").count(), 1);
    }

    #[test]
    fn test_fid_only_experiment_is_processed() {
        let tmp = tempfile::tempdir().unwrap();
        let exp = tmp.path().join("urine").join("20");
        fixtures::write_acqus(&exp, 600.0, 6000.0, 64);
        let mut interleaved = Vec::new();
        for k in 0..32 {
            interleaved.push((1000.0 * (-(k as f64) / 8.0).exp()) as i32);
            interleaved.push(0);
        }
        fixtures::write_fid(&exp, &interleaved);

        let mut log = ReproLog::new();
        let loader = BrukerLoader::default();
        let spectra = loader
            .load_group(&experiments(tmp.path(), &loader.filter), &mut log)
            .unwrap();
        assert_eq!(spectra.len(), 1);
        assert!(spectra[0].data.len() >= 32);
        assert!(spectra[0].data.x.windows(2).all(|w| w[0] < w[1]));
        assert!(log.len() > 1);
    }

    #[test]
    fn test_fid_processing_steps_share_the_spectrum_name() {
        let tmp = tempfile::tempdir().unwrap();
        let exp = tmp.path().join("urine").join("20");
        fixtures::write_acqus(&exp, 600.0, 6000.0, 64);
        let interleaved: Vec<i32> = (0..32)
            .flat_map(|k| [(1000.0 * (-(k as f64) / 8.0).exp()) as i32, 0])
            .collect();
        fixtures::write_fid(&exp, &interleaved);

        let mut log = ReproLog::new();
        let loader = BrukerLoader::default();
        loader
            .load_group(&experiments(tmp.path(), &loader.filter), &mut log)
            .unwrap();
        assert_eq!(log.spectra(), vec!["urine_20"]);
        assert_eq!(log.entries_for("urine_20").count(), log.len());
        assert!(log.entries_for("urine_20").any(|e| e.operation == "Fourier Transform"));
    }

    #[test]
    fn test_unreadable_experiment_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let good = tmp.path().join("urine").join("10");
        fixtures::write_acqus(&good, 600.0, 6000.0, 16);
        fixtures::write_processed(&good, &[1, 2, 3, 4], 600.0, 600.0, 8.0);
        let bad = tmp.path().join("urine").join("30");
        fixtures::write_acqus(&bad, 600.0, 6000.0, 16);
        fixtures::write_processed(&bad, &[1, 2], 600.0, 600.0, 8.0);
        // truncate the binary so it is empty
        std::fs::write(bad.join("pdata").join("1").join("1r"), b"").unwrap();

        let mut log = ReproLog::new();
        let loader = BrukerLoader::default();
        let spectra = loader
            .load_group(&experiments(tmp.path(), &loader.filter), &mut log)
            .unwrap();
        assert_eq!(spectra.len(), 1);
        assert_eq!(spectra[0].expno, 10);
    }
}
