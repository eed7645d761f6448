use crate::driver::Report;
use crate::spectrum::RadialSpectrum;
use anyhow::{Context, Result};
use std::path::Path;

/// One line of `(k.0 E_k)` pairs, shell 0 first.
pub fn format_spectrum(spectrum: &RadialSpectrum) -> String {
    spectrum
        .shells()
        .map(|(k, e)| format!("({}.0 {})", k, format_g(e)))
        .collect()
}

/// `v` with six significant digits, in the shorter of fixed or scientific
/// notation, the way C's `%g` prints it.
pub fn format_g(v: f64) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    if !v.is_finite() {
        return v.to_string().to_lowercase();
    }
    let sci = format!("{:.5e}", v);
    let (mantissa, exp) = match sci.split_once('e').map(|(m, e)| (m, e.parse::<i32>())) {
        Some((m, Ok(e))) => (m, e),
        _ => return sci,
    };
    if exp < -4 || exp >= 6 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_zeros(mantissa), sign, exp.abs())
    } else {
        trim_zeros(&format!("{:.*}", (5 - exp) as usize, v)).to_string()
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

pub fn print_report(report: &Report) {
    println!("Power spectrum:");
    println!("{}", format_spectrum(&report.spectrum));
    println!("Time per loop={}", report.time_per_loop);
}

pub fn save_spectrum<P: AsRef<Path>>(spectrum: &RadialSpectrum, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).context("Unable to create output directory")?;
        }
    }
    npy::to_file(path, spectrum.energy().to_vec())
        .context(format!("Could not save spectrum to {}", path.display()))?;
    Ok(())
}
