/// Experiment discovery
///
/// Walks an input tree, recognises Bruker experiment directories
/// (`<sample>/<expno>/acqus`) and groups them per sample for batch
/// conversion.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Which experiments are eligible for conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentFilter {
    /// Drop experiments with an indirect dimension (acqu2s)
    pub ignore_2d: bool,
    /// Drop experiments without processed data instead of transforming the FID
    pub ignore_fid: bool,
    /// Processing number under `pdata/`
    pub processing_number: u32,
}

impl Default for ExperimentFilter {
    fn default() -> Self {
        Self {
            ignore_2d: true,
            ignore_fid: false,
            processing_number: 1,
        }
    }
}

/// Every regular file below a root directory, sorted by path
#[derive(Debug, Clone, Default)]
pub struct FileList {
    pub root: PathBuf,
    pub files: Vec<PathBuf>,
}

impl FileList {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// List all files below `path`.
pub fn file_list(path: &Path) -> Result<FileList> {
    let mut files = Vec::new();
    collect_files(path, &mut files)?;
    files.sort();
    Ok(FileList {
        root: path.to_path_buf(),
        files,
    })
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

/// One Bruker experiment (an `<expno>` directory holding `acqus`)
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    pub sample: String,
    pub sample_dir: PathBuf,
    pub expno: u32,
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

impl Experiment {
    /// Spectrum name used for output files: `<sample>_<expno>`
    pub fn name(&self) -> String {
        format!("{}_{}", self.sample, self.expno)
    }

    fn has_file(&self, relative: &Path) -> bool {
        let wanted = self.dir.join(relative);
        self.files.iter().any(|f| *f == wanted)
    }

    pub fn is_2d(&self) -> bool {
        self.has_file(Path::new("acqu2s")) || self.has_file(Path::new("acqu2"))
    }

    pub fn has_processed(&self, procno: u32) -> bool {
        self.has_file(&Path::new("pdata").join(procno.to_string()).join("1r"))
    }

    pub fn has_fid(&self) -> bool {
        self.has_file(Path::new("fid"))
    }
}

/// Group a file list into experiments, applying the eligibility filter.
///
/// Experiments come back ordered by directory path.
pub fn group_by_experiments(list: &FileList, filter: &ExperimentFilter) -> Vec<Experiment> {
    let mut by_dir: BTreeMap<PathBuf, Experiment> = BTreeMap::new();

    for file in &list.files {
        let is_param_file = file
            .file_name()
            .map(|n| n == "acqus" || n == "acqu")
            .unwrap_or(false);
        if !is_param_file {
            continue;
        }
        let Some(dir) = file.parent() else { continue };
        let Some(expno) = dir
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        let sample_dir = dir.parent().unwrap_or(&list.root).to_path_buf();
        let sample = sample_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "sample".to_string());

        by_dir.entry(dir.to_path_buf()).or_insert_with(|| Experiment {
            sample,
            sample_dir,
            expno,
            dir: dir.to_path_buf(),
            files: Vec::new(),
        });
    }

    for file in &list.files {
        let owner = file
            .ancestors()
            .skip(1)
            .find(|a| by_dir.contains_key(*a))
            .map(Path::to_path_buf);
        if let Some(dir) = owner {
            if let Some(exp) = by_dir.get_mut(&dir) {
                exp.files.push(file.clone());
            }
        }
    }

    by_dir
        .into_values()
        .filter(|exp| {
            if filter.ignore_2d && exp.is_2d() {
                log::debug!("Skipping 2D experiment {}", exp.dir.display());
                return false;
            }
            let processed = exp.has_processed(filter.processing_number);
            if !processed && (filter.ignore_fid || !exp.has_fid()) {
                log::debug!("Skipping experiment without usable data {}", exp.dir.display());
                return false;
            }
            true
        })
        .collect()
}

/// Keep every `step`-th experiment number (`expno % step == 0`).
pub fn select_every(experiments: Vec<Experiment>, step: u32) -> Vec<Experiment> {
    let step = step.max(1);
    experiments
        .into_iter()
        .filter(|exp| exp.expno % step == 0)
        .collect()
}

/// Group experiments per sample; groups ordered by sample path, members by expno.
pub fn group_experiments(experiments: Vec<Experiment>) -> Vec<Vec<Experiment>> {
    let mut groups: BTreeMap<PathBuf, Vec<Experiment>> = BTreeMap::new();
    for exp in experiments {
        groups.entry(exp.sample_dir.clone()).or_default().push(exp);
    }
    groups
        .into_values()
        .map(|mut group| {
            group.sort_by_key(|e| e.expno);
            group
        })
        .collect()
}
