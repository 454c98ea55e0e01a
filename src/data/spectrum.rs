use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Nucleus type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Nucleus {
    H1,
    C13,
    N15,
    F19,
    P31,
    Other(String),
}

impl std::fmt::Display for Nucleus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Nucleus::H1 => write!(f, "1H"),
            Nucleus::C13 => write!(f, "13C"),
            Nucleus::N15 => write!(f, "15N"),
            Nucleus::F19 => write!(f, "19F"),
            Nucleus::P31 => write!(f, "31P"),
            Nucleus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Parse a Bruker nucleus string (`NUC1`) into a Nucleus
pub fn parse_nucleus(nuc: &str) -> Nucleus {
    match nuc.trim().to_uppercase().as_str() {
        "1H" | "H1" => Nucleus::H1,
        "13C" | "C13" => Nucleus::C13,
        "15N" | "N15" => Nucleus::N15,
        "19F" | "F19" => Nucleus::F19,
        "31P" | "P31" => Nucleus::P31,
        "" | "OFF" => Nucleus::Other("Unknown".into()),
        other => Nucleus::Other(other.to_string()),
    }
}

/// Chemical-shift interval, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub from: f64,
    pub to: f64,
}

impl Zone {
    pub const fn new(from: f64, to: f64) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, x: f64) -> bool {
        let lo = self.from.min(self.to);
        let hi = self.from.max(self.to);
        x >= lo && x <= hi
    }

    pub fn midpoint(&self) -> f64 {
        (self.from + self.to) / 2.0
    }
}

/// Axis parameters for the direct dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisParams {
    pub nucleus: Nucleus,
    pub num_points: usize,
    pub spectral_width_hz: f64,
    pub observe_freq_mhz: f64,
    pub reference_ppm: f64,
}

impl Default for AxisParams {
    fn default() -> Self {
        Self {
            nucleus: Nucleus::H1,
            num_points: 0,
            spectral_width_hz: 0.0,
            observe_freq_mhz: 400.0,
            reference_ppm: 0.0,
        }
    }
}

impl AxisParams {
    /// Convert a point index to ppm
    pub fn index_to_ppm(&self, index: usize) -> f64 {
        if self.num_points == 0 || self.observe_freq_mhz == 0.0 {
            return 0.0;
        }
        let sw_ppm = self.spectral_width_hz / self.observe_freq_mhz;
        let frac = index as f64 / self.num_points as f64;
        // reference_ppm is the ppm of index 0; the axis runs downfield to upfield.
        self.reference_ppm - frac * sw_ppm
    }

    /// Generate a ppm scale array
    pub fn ppm_scale(&self) -> Vec<f64> {
        (0..self.num_points).map(|i| self.index_to_ppm(i)).collect()
    }
}

/// Paired x/y arrays (chemical shift, intensity)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XyData {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl XyData {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Self {
        Self { x, y }
    }

    pub fn len(&self) -> usize {
        self.x.len().min(self.y.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reverse both channels together when x is descending, so x always ascends.
    pub fn into_ascending(mut self) -> Self {
        if self.x.len() > 1 && self.x[0] > self.x[1] {
            self.x.reverse();
            self.y.reverse();
        }
        self
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }
}

/// Spectrum container used while reading and processing vendor data
#[derive(Debug, Clone)]
pub struct SpectrumData {
    pub source_path: PathBuf,
    /// Spectrum name, `<sample>_<expno>` for Bruker experiments
    pub name: String,
    pub axis: AxisParams,
    /// Real channel (FID or spectrum)
    pub real: Vec<f64>,
    /// Imaginary channel, empty when not available
    pub imag: Vec<f64>,
    /// Digital filter group delay in points (raw FIDs only)
    pub group_delay: f64,
    pub is_frequency_domain: bool,
}

impl Default for SpectrumData {
    fn default() -> Self {
        Self {
            source_path: PathBuf::new(),
            name: String::new(),
            axis: AxisParams::default(),
            real: Vec::new(),
            imag: Vec::new(),
            group_delay: 0.0,
            is_frequency_domain: false,
        }
    }
}

impl SpectrumData {
    /// Pair the real channel with its ppm scale, ascending in x
    pub fn to_xy(&self) -> XyData {
        let mut axis = self.axis.clone();
        axis.num_points = self.real.len();
        XyData::new(axis.ppm_scale(), self.real.clone()).into_ascending()
    }
}

/// A converted 1D spectrum ready for fitting
#[derive(Debug, Clone)]
pub struct Spectrum {
    pub name: String,
    pub expno: u32,
    /// Spectrometer frequency in MHz
    pub frequency: f64,
    pub nucleus: Nucleus,
    pub source_path: PathBuf,
    pub data: XyData,
}
