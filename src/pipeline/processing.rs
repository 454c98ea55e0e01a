/// FID processing for experiments without a processed spectrum
///
/// Each operation works on SpectrumData in-place and records itself
/// in the reproducibility log. The chain is: digital filter removal,
/// exponential apodization, zero filling, complex FT, automatic phasing.

use std::f64::consts::PI;

use num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::data::spectrum::*;
use crate::log::reproducibility::ReproLog;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingOptions {
    /// Exponential line broadening in Hz (0 disables apodization)
    pub line_broadening_hz: f64,
    /// Zero fill to twice the next power of two
    pub zero_fill: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            line_broadening_hz: 0.3,
            zero_fill: true,
        }
    }
}

fn label(spectrum: &SpectrumData) -> String {
    if spectrum.name.is_empty() {
        spectrum.source_path.display().to_string()
    } else {
        spectrum.name.clone()
    }
}

/// Run the full FID → spectrum chain.
pub fn process_fid(spectrum: &mut SpectrumData, options: &ProcessingOptions, log: &mut ReproLog) {
    if spectrum.is_frequency_domain {
        return;
    }
    remove_group_delay(spectrum, log);
    apply_exponential(spectrum, options.line_broadening_hz, log);
    if options.zero_fill {
        let target = next_power_of_two(spectrum.real.len()) * 2;
        zero_fill(spectrum, target, log);
    }
    fourier_transform(spectrum, log);
    auto_phase(spectrum, log);
}

// =========================================================================
//  Digital filter
// =========================================================================

/// Rotate the leading group-delay points of a digitally filtered FID to its end
pub fn remove_group_delay(spectrum: &mut SpectrumData, log: &mut ReproLog) {
    let shift = spectrum.group_delay.round() as usize;
    let n = spectrum.real.len();
    if shift == 0 || shift >= n {
        return;
    }
    spectrum.real.rotate_left(shift);
    if spectrum.imag.len() == n {
        spectrum.imag.rotate_left(shift);
    }
    spectrum.group_delay -= shift as f64;

    log.add_entry(
        &label(spectrum),
        "Digital Filter",
        &format!("Shifted FID by {} points (group delay)", shift),
    );
}

// =========================================================================
//  Apodization
// =========================================================================

/// Exponential multiplication with line broadening in Hz
pub fn apply_exponential(spectrum: &mut SpectrumData, lb_hz: f64, log: &mut ReproLog) {
    let n = spectrum.real.len();
    if n == 0 || lb_hz <= 0.0 {
        return;
    }

    let sw = spectrum.axis.spectral_width_hz;
    let dwell = if sw > 0.0 { 1.0 / sw } else { 1.0 / n as f64 };

    for i in 0..n {
        let t = i as f64 * dwell;
        let factor = (-PI * lb_hz * t).exp();
        spectrum.real[i] *= factor;
        if i < spectrum.imag.len() {
            spectrum.imag[i] *= factor;
        }
    }

    log.add_entry(
        &label(spectrum),
        "Apodization",
        &format!("EM (LB={:.2} Hz) on {} points", lb_hz, n),
    );
}

// =========================================================================
//  Zero Filling
// =========================================================================

/// Zero-fill the FID to the target size (no-op when already larger)
pub fn zero_fill(spectrum: &mut SpectrumData, target_size: usize, log: &mut ReproLog) {
    let current = spectrum.real.len();
    if target_size <= current {
        return;
    }

    spectrum.real.resize(target_size, 0.0);
    if !spectrum.imag.is_empty() {
        spectrum.imag.resize(target_size, 0.0);
    }
    spectrum.axis.num_points = target_size;

    log.add_entry(
        &label(spectrum),
        "Zero Fill",
        &format!("Zero-filled from {} to {} points", current, target_size),
    );
}

/// Next power of two >= n
pub fn next_power_of_two(n: usize) -> usize {
    let mut p = 1;
    while p < n {
        p <<= 1;
    }
    p
}

// =========================================================================
//  Fourier Transform
// =========================================================================

/// Complex FFT of the FID; index 0 of the result is the highest frequency.
pub fn fourier_transform(spectrum: &mut SpectrumData, log: &mut ReproLog) {
    if spectrum.is_frequency_domain {
        log::warn!("Data is already in frequency domain, skipping FT");
        return;
    }

    let n = spectrum.real.len();
    if n == 0 {
        return;
    }

    let fft_size = next_power_of_two(n);
    spectrum.real.resize(fft_size, 0.0);
    spectrum.imag.resize(fft_size, 0.0);

    let mut buffer: Vec<Complex<f64>> = spectrum
        .real
        .iter()
        .zip(spectrum.imag.iter())
        .map(|(&r, &i)| Complex::new(r, i))
        .collect();

    // First-point correction against the DC offset ridge
    buffer[0] *= 0.5;

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);
    fft.process(&mut buffer);

    // FFT shift, then reverse so index 0 is downfield
    let half = fft_size / 2;
    let mut shifted: Vec<Complex<f64>> = (0..fft_size)
        .map(|i| buffer[(i + half) % fft_size])
        .collect();
    shifted.reverse();

    spectrum.real = shifted.iter().map(|c| c.re).collect();
    spectrum.imag = shifted.iter().map(|c| c.im).collect();
    spectrum.is_frequency_domain = true;
    spectrum.axis.num_points = fft_size;

    log.add_entry(
        &label(spectrum),
        "Fourier Transform",
        &format!("Complex FFT ({} → {} points, with FFT shift)", n, fft_size),
    );
}

// =========================================================================
//  Phase Correction
// =========================================================================

/// Apply zero-order and first-order phase correction (degrees)
pub fn phase_correct(
    spectrum: &mut SpectrumData,
    ph0_degrees: f64,
    ph1_degrees: f64,
    log: &mut ReproLog,
) {
    let n = spectrum.real.len();
    if n == 0 {
        return;
    }

    let ph0 = ph0_degrees * PI / 180.0;
    let ph1 = ph1_degrees * PI / 180.0;

    for i in 0..n {
        let frac = i as f64 / n as f64;
        let phase = ph0 + ph1 * frac;
        let (sin_p, cos_p) = phase.sin_cos();
        let re = spectrum.real[i];
        let im = spectrum.imag.get(i).copied().unwrap_or(0.0);
        spectrum.real[i] = re * cos_p - im * sin_p;
        if i < spectrum.imag.len() {
            spectrum.imag[i] = re * sin_p + im * cos_p;
        }
    }

    log.add_entry(
        &label(spectrum),
        "Phase Correction",
        &format!("PH0={:.2}°, PH1={:.2}°", ph0_degrees, ph1_degrees),
    );
}

/// Automatic phase correction: coarse then fine grid search on PH0, then PH1.
pub fn auto_phase(spectrum: &mut SpectrumData, log: &mut ReproLog) -> (f64, f64) {
    if spectrum.real.is_empty() {
        return (0.0, 0.0);
    }

    let best_ph0 = refine_search(|ph0| evaluate_phase(spectrum, ph0, 0.0));
    let best_ph1 = refine_search(|ph1| evaluate_phase(spectrum, best_ph0, ph1));

    phase_correct(spectrum, best_ph0, best_ph1, log);
    (best_ph0, best_ph1)
}

/// 5° steps over ±180°, then 0.5° steps around the best coarse angle.
fn refine_search(score: impl Fn(f64) -> f64) -> f64 {
    let mut best = 0.0f64;
    let mut best_score = f64::NEG_INFINITY;

    let mut angle = -180.0;
    while angle <= 180.0 {
        let s = score(angle);
        if s > best_score {
            best_score = s;
            best = angle;
        }
        angle += 5.0;
    }

    let coarse = best;
    best_score = f64::NEG_INFINITY;
    let mut angle = coarse - 5.0;
    while angle <= coarse + 5.0 {
        let s = score(angle);
        if s > best_score {
            best_score = s;
            best = angle;
        }
        angle += 0.5;
    }
    best
}

/// Phase quality: positive real area, with negative area penalised twice
fn evaluate_phase(spectrum: &SpectrumData, ph0_deg: f64, ph1_deg: f64) -> f64 {
    let n = spectrum.real.len();
    let ph0 = ph0_deg * PI / 180.0;
    let ph1 = ph1_deg * PI / 180.0;

    let mut score = 0.0;
    for i in 0..n {
        let frac = i as f64 / n as f64;
        let phase = ph0 + ph1 * frac;
        let re = spectrum.real[i];
        let im = spectrum.imag.get(i).copied().unwrap_or(0.0);
        let corrected_re = re * phase.cos() - im * phase.sin();
        if corrected_re > 0.0 {
            score += corrected_re;
        } else {
            score += corrected_re * 2.0;
        }
    }
    score
}
