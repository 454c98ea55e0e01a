/// Bruker TopSpin / XWIN-NMR data readers
///
/// Parameter files (`acqus`, `procs`) use a JCAMP-DX–like format with
/// `##$PARAM= value` lines. Processed spectra are read from
/// `pdata/<procno>/1r`; raw FIDs from `fid`. Binary words are decoded
/// with `byteorder` according to the BYTORDA / BYTORDP flags.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::spectrum::*;
use crate::error::{FitError, Result};

// ────────────────────────────────────────────────────────────────
//  Parameter parsing
// ────────────────────────────────────────────────────────────────

/// Parsed Bruker acquisition parameters (from acqus)
#[derive(Debug, Default)]
pub struct BrukerParams {
    /// Spectral width in Hz
    pub sw_h: f64,
    /// Observe frequency in MHz (SFO1)
    pub sfo1: f64,
    /// Base frequency in MHz (BF1)
    pub bf1: f64,
    /// Offset frequency in Hz (O1)
    pub o1: f64,
    /// Total data points (TD), real + imaginary
    pub td: usize,
    /// Data type: 0 = int32, 2 = float64
    pub dtypa: i32,
    /// Byte order: 0 = little-endian, 1 = big-endian
    pub bytorda: i32,
    /// Nucleus name (e.g. "1H")
    pub nuc1: String,
    /// Digital filter group delay, 0 when not stored
    pub grpdly: f64,
    pub decim: i32,
    pub dspfvs: i32,
}

/// Parse a Bruker `acqus` / `procs` parameter file into a key/value map.
pub fn parse_acqus(content: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut current_key = String::new();
    let mut current_val = String::new();
    let mut in_multiline = false;

    for line in content.lines() {
        if line.starts_with("##$") {
            if !current_key.is_empty() {
                params.insert(current_key.clone(), current_val.trim().to_string());
            }
            if let Some(eq_pos) = line.find('=') {
                current_key = line[3..eq_pos].trim().to_string();
                current_val = line[eq_pos + 1..].trim().to_string();
                in_multiline = current_val.starts_with('(');
            } else {
                current_key.clear();
                current_val.clear();
                in_multiline = false;
            }
        } else if line.starts_with("##") {
            if !current_key.is_empty() {
                params.insert(current_key.clone(), current_val.trim().to_string());
                current_key.clear();
                current_val.clear();
                in_multiline = false;
            }
        } else if in_multiline || !current_key.is_empty() {
            current_val.push(' ');
            current_val.push_str(line.trim());
            if line.contains(')') {
                in_multiline = false;
            }
        }
    }
    if !current_key.is_empty() {
        params.insert(current_key, current_val.trim().to_string());
    }

    params
}

fn get_f64(params: &HashMap<String, String>, key: &str) -> f64 {
    params
        .get(key)
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn get_i32(params: &HashMap<String, String>, key: &str) -> i32 {
    params
        .get(key)
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(0)
}

fn get_str(params: &HashMap<String, String>, key: &str) -> String {
    params
        .get(key)
        .map(|v| v.trim_matches(|c| c == '<' || c == '>').to_string())
        .unwrap_or_default()
}

/// Extract typed parameters from a parsed acqus map
pub fn extract_params(acq: &HashMap<String, String>) -> BrukerParams {
    BrukerParams {
        sw_h: get_f64(acq, "SW_h"),
        sfo1: get_f64(acq, "SFO1"),
        bf1: get_f64(acq, "BF1"),
        o1: get_f64(acq, "O1"),
        td: get_i32(acq, "TD").max(0) as usize,
        dtypa: get_i32(acq, "DTYPA"),
        bytorda: get_i32(acq, "BYTORDA"),
        nuc1: get_str(acq, "NUC1"),
        grpdly: get_f64(acq, "GRPDLY"),
        decim: get_i32(acq, "DECIM"),
        dspfvs: get_i32(acq, "DSPFVS"),
    }
}

/// Compute the Bruker digital filter group delay from DECIM and DSPFVS.
///
/// Only used when GRPDLY is not set in acqus.
pub fn compute_grpdly(decim: i32, dspfvs: i32) -> f64 {
    if decim <= 1 {
        return 0.0;
    }

    match dspfvs {
        10 => match decim {
            2 => 44.75, 3 => 33.5, 4 => 66.625, 6 => 59.0833,
            8 => 68.5625, 12 => 60.375, 16 => 69.5313, 24 => 61.0208,
            32 => 70.0156, 48 => 61.3438, 64 => 70.2578, 96 => 61.5052,
            128 => 70.3789, 192 => 61.5859, 256 => 70.4395, 384 => 61.6263,
            512 => 70.4697, 768 => 61.6465, 1024 => 70.4849, 1536 => 61.6566,
            2048 => 70.4924, _ => 0.0,
        },
        11 => match decim {
            2 => 46.0, 3 => 36.5, 4 => 48.0, 6 => 50.1667,
            8 => 53.25, 12 => 69.5, 16 => 72.25, 24 => 70.1667,
            32 => 72.75, 48 => 70.5, 64 => 73.0, 96 => 70.6667,
            128 => 72.5, 192 => 71.3333, 256 => 72.25, 384 => 71.6667,
            512 => 72.125, 768 => 71.8333, 1024 => 72.0625, 1536 => 71.9167,
            2048 => 72.0313, _ => 0.0,
        },
        12 => match decim {
            2 => 46.311, 3 => 36.530, 4 => 47.870, 6 => 50.229,
            8 => 53.289, 12 => 69.551, 16 => 71.600, 24 => 70.184,
            32 => 72.138, 48 => 70.528, 64 => 72.348, 96 => 70.700,
            128 => 72.524, _ => 0.0,
        },
        _ => 0.0,
    }
}

impl BrukerParams {
    /// Group delay in points: GRPDLY when present, else the DECIM/DSPFVS table.
    pub fn group_delay(&self) -> f64 {
        if self.grpdly > 0.0 {
            self.grpdly
        } else {
            compute_grpdly(self.decim, self.dspfvs)
        }
    }
}

/// Read acqus parameters from a Bruker experiment directory.
pub fn read_bruker_params(dir: &Path) -> Result<BrukerParams> {
    let acqus_path = if dir.join("acqus").exists() {
        dir.join("acqus")
    } else if dir.join("acqu").exists() {
        dir.join("acqu")
    } else {
        return Err(FitError::bruker(dir, "no acqus or acqu file found"));
    };

    let acq_map = parse_acqus(&fs::read_to_string(&acqus_path)?);
    Ok(extract_params(&acq_map))
}

/// Path of the processed real spectrum for a processing number, if present.
pub fn processed_path(dir: &Path, procno: u32) -> Option<std::path::PathBuf> {
    let pdata = dir.join("pdata").join(procno.to_string());
    if pdata.join("1r").exists() {
        Some(pdata)
    } else {
        None
    }
}

/// `<sample>_<expno>` from an experiment directory, or the bare directory name
fn spectrum_name_of(dir: &Path) -> String {
    let file_name = |p: &Path| p.file_name().map(|s| s.to_string_lossy().to_string());
    match (dir.parent().and_then(file_name), file_name(dir)) {
        (Some(sample), Some(expno)) => format!("{}_{}", sample, expno),
        (None, Some(expno)) => expno,
        _ => "Bruker".to_string(),
    }
}

// ────────────────────────────────────────────────────────────────
//  Processed data (pdata/<procno>/1r)
// ────────────────────────────────────────────────────────────────

/// Read the processed real spectrum of an experiment.
pub fn read_bruker_processed(dir: &Path, procno: u32) -> Result<SpectrumData> {
    let params = read_bruker_params(dir)?;

    let pdata_dir = processed_path(dir, procno).ok_or_else(|| {
        FitError::bruker(dir, format!("no processed data (pdata/{}/1r)", procno))
    })?;

    let procs_path = pdata_dir.join("procs");
    let proc_params = if procs_path.exists() {
        parse_acqus(&fs::read_to_string(&procs_path)?)
    } else {
        HashMap::new()
    };

    let si = get_i32(&proc_params, "SI").max(0) as usize;
    let nc_proc = get_i32(&proc_params, "NC_proc");
    let sw_p = get_f64(&proc_params, "SW_p");
    let sf = get_f64(&proc_params, "SF");
    let offset = get_f64(&proc_params, "OFFSET");
    let bytordp = get_i32(&proc_params, "BYTORDP");
    let dtypp = get_i32(&proc_params, "DTYPP");

    let raw = fs::read(pdata_dir.join("1r"))?;
    let word = if dtypp == 0 { 4 } else { 8 };
    let npoints = if si > 0 { si } else { raw.len() / word };
    let scale = (2.0f64).powi(nc_proc);

    let real = if dtypp == 0 {
        read_int32_data(&raw, npoints, bytordp, scale)
    } else {
        read_float64_data(&raw, npoints, bytordp, scale)
    };
    if real.is_empty() {
        return Err(FitError::bruker(dir, "processed spectrum is empty"));
    }

    let sw_hz = if sw_p > 0.0 { sw_p } else { params.sw_h };
    let obs_mhz = if sf > 0.0 {
        sf
    } else if params.sfo1 > 0.0 {
        params.sfo1
    } else {
        params.bf1
    };
    if obs_mhz <= 0.0 {
        return Err(FitError::bruker(dir, "spectrometer frequency (SF) missing"));
    }
    let ref_ppm = if offset != 0.0 {
        offset
    } else if params.bf1 > 0.0 {
        params.o1 / params.bf1 + sw_hz / (2.0 * params.bf1)
    } else {
        0.0
    };

    Ok(SpectrumData {
        source_path: dir.to_path_buf(),
        name: spectrum_name_of(dir),
        axis: AxisParams {
            nucleus: parse_nucleus(&params.nuc1),
            num_points: real.len(),
            spectral_width_hz: sw_hz,
            observe_freq_mhz: obs_mhz,
            reference_ppm: ref_ppm,
        },
        real,
        imag: Vec::new(),
        group_delay: 0.0,
        is_frequency_domain: true,
    })
}

// ────────────────────────────────────────────────────────────────
//  Raw FID
// ────────────────────────────────────────────────────────────────

/// Read a raw 1D Bruker FID, de-interleaving real and imaginary points.
pub fn read_bruker_fid(dir: &Path) -> Result<SpectrumData> {
    let params = read_bruker_params(dir)?;

    let fid_path = dir.join("fid");
    if !fid_path.exists() {
        return Err(FitError::bruker(dir, "no fid file found"));
    }

    let raw = fs::read(&fid_path)?;
    let word = if params.dtypa == 0 { 4 } else { 8 };
    let npoints = if params.td > 0 { params.td } else { raw.len() / word };

    let all_vals = if params.dtypa == 0 {
        read_int32_data(&raw, npoints, params.bytorda, 1.0)
    } else {
        read_float64_data(&raw, npoints, params.bytorda, 1.0)
    };

    let mut real = Vec::with_capacity(all_vals.len() / 2);
    let mut imag = Vec::with_capacity(all_vals.len() / 2);
    for pair in all_vals.chunks_exact(2) {
        real.push(pair[0]);
        imag.push(pair[1]);
    }
    if real.is_empty() {
        return Err(FitError::bruker(dir, "fid contains no complex points"));
    }

    let obs_mhz = if params.sfo1 > 0.0 { params.sfo1 } else { params.bf1 };
    if obs_mhz <= 0.0 {
        return Err(FitError::bruker(dir, "spectrometer frequency (SFO1) missing"));
    }
    let ref_ppm = if params.bf1 > 0.0 {
        params.o1 / params.bf1 + params.sw_h / (2.0 * params.bf1)
    } else {
        0.0
    };

    Ok(SpectrumData {
        source_path: dir.to_path_buf(),
        name: spectrum_name_of(dir),
        axis: AxisParams {
            nucleus: parse_nucleus(&params.nuc1),
            num_points: real.len(),
            spectral_width_hz: params.sw_h,
            observe_freq_mhz: obs_mhz,
            reference_ppm: ref_ppm,
        },
        real,
        imag,
        group_delay: params.group_delay(),
        is_frequency_domain: false,
    })
}

/// Read binary data as 32-bit integers, scaled
fn read_int32_data(raw: &[u8], npoints: usize, byte_order: i32, scale: f64) -> Vec<f64> {
    let count = npoints.min(raw.len() / 4);
    let mut words = vec![0i32; count];
    if byte_order == 0 {
        LittleEndian::read_i32_into(&raw[..count * 4], &mut words);
    } else {
        BigEndian::read_i32_into(&raw[..count * 4], &mut words);
    }
    words.into_iter().map(|v| v as f64 * scale).collect()
}

/// Read binary data as 64-bit floats, scaled
fn read_float64_data(raw: &[u8], npoints: usize, byte_order: i32, scale: f64) -> Vec<f64> {
    let count = npoints.min(raw.len() / 8);
    let mut words = vec![0f64; count];
    if byte_order == 0 {
        LittleEndian::read_f64_into(&raw[..count * 8], &mut words);
    } else {
        BigEndian::read_f64_into(&raw[..count * 8], &mut words);
    }
    words.into_iter().map(|v| v * scale).collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_acqus_basic() {
        let content = r#"##TITLE= Parameter file
##JCAMP-DX= 5.00
##$SW_h= 8012.820
##$TD= 65536
##$SFO1= 600.13
##$BF1= 600.13
##$O1= 2820.61
##$DTYPA= 0
##$BYTORDA= 0
##$NUC1= <1H>
##$GRPDLY= 76.0
##$DECIM= 2
##$DSPFVS= 12
##END=
"#;
        let params = parse_acqus(content);
        assert_eq!(params.get("SW_h").unwrap(), "8012.820");
        assert_eq!(params.get("TD").unwrap(), "65536");
        assert_eq!(params.get("NUC1").unwrap(), "<1H>");

        let typed = extract_params(&params);
        assert!((typed.sfo1 - 600.13).abs() < 1e-9);
        assert_eq!(typed.td, 65536);
        assert_eq!(typed.nuc1, "1H");
        assert!((typed.group_delay() - 76.0).abs() < 1e-9);
    }

    #[test]
    fn test_multiline_values_are_joined() {
        let content = "##$P= (0..3)\n1 2\n3 4\n##$NS= 16\n";
        let params = parse_acqus(content);
        assert_eq!(params.get("P").unwrap(), "(0..3) 1 2 3 4");
        assert_eq!(params.get("NS").unwrap(), "16");
    }

    #[test]
    fn test_compute_grpdly() {
        assert!((compute_grpdly(2, 12) - 46.311).abs() < 0.001);
        assert!((compute_grpdly(4, 12) - 47.870).abs() < 0.001);
        assert!((compute_grpdly(1, 10) - 0.0).abs() < 0.001);

        let params = BrukerParams { decim: 2, dspfvs: 12, ..Default::default() };
        assert!((params.group_delay() - 46.311).abs() < 0.001);
    }

    #[test]
    fn test_read_processed_spectrum() {
        let tmp = tempfile::tempdir().unwrap();
        let exp = tmp.path().join("sample").join("10");
        fixtures::write_acqus(&exp, 600.0, 6000.0, 16);
        fixtures::write_processed(&exp, &[4, 3, 2, 1], 600.0, 600.0, 8.0);

        let data = read_bruker_processed(&exp, 1).unwrap();
        assert_eq!(data.real, vec![4.0, 3.0, 2.0, 1.0]);
        assert_eq!(data.name, "sample_10");
        assert!((data.axis.observe_freq_mhz - 600.0).abs() < 1e-12);
        assert!((data.axis.index_to_ppm(0) - 8.0).abs() < 1e-12);
        assert!(data.is_frequency_domain);

        let xy = data.to_xy();
        assert!(xy.x[0] < xy.x[1]);
        assert_eq!(xy.y[0], 1.0);
    }

    #[test]
    fn test_missing_processed_data_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let exp = tmp.path().join("s").join("20");
        fixtures::write_acqus(&exp, 600.0, 6000.0, 16);
        assert!(read_bruker_processed(&exp, 1).is_err());
        assert!(processed_path(&exp, 1).is_none());
    }

    #[test]
    fn test_read_fid_deinterleaves() {
        let tmp = tempfile::tempdir().unwrap();
        let exp = tmp.path().join("s").join("30");
        fixtures::write_acqus(&exp, 600.0, 6000.0, 6);
        fixtures::write_fid(&exp, &[1, -1, 2, -2, 3, -3]);

        let fid = read_bruker_fid(&exp).unwrap();
        assert_eq!(fid.real, vec![1.0, 2.0, 3.0]);
        assert_eq!(fid.imag, vec![-1.0, -2.0, -3.0]);
        assert!(!fid.is_frequency_domain);
    }

    #[test]
    fn test_big_endian_words() {
        let raw = [0u8, 0, 0, 5, 0, 0, 0, 7];
        assert_eq!(read_int32_data(&raw, 2, 1, 2.0), vec![10.0, 14.0]);
        assert_eq!(read_int32_data(&raw, 10, 1, 1.0).len(), 2);
    }
}
