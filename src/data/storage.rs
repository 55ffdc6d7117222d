//! Plain-text matrix output and scan file numbering.
//!
//! Data files are unlabeled whitespace-delimited matrices, one row per line
//! and every value in `%.18e` notation (`1.250000000000000000e+00`), so they
//! load directly with `numpy.loadtxt` and similar tools. Run parameters go to
//! a JSON sidecar with the same stem.

use crate::error::DaqError;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Format one value as `%.18e` with a signed, at least two-digit exponent.
pub fn format_sci(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let raw = format!("{:.18e}", value);
    match raw.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => raw,
    }
}

/// Write `rows` as a whitespace-delimited matrix, creating parent directories.
pub fn write_matrix(path: &Path, rows: &[Vec<f64>]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {:?}", parent))?;
    }
    if path.exists() {
        warn!("Overwriting existing data file '{}'", path.display());
    }

    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);
    for row in rows {
        let line = row
            .iter()
            .map(|v| format_sci(*v))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(writer, "{}", line).with_context(|| format!("Failed to write {:?}", path))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush {:?}", path))?;
    info!("Wrote {} rows to '{}'", rows.len(), path.display());
    Ok(())
}

/// Read a matrix written by [`write_matrix`] (or any whitespace-delimited table).
pub fn read_matrix(path: &Path) -> Result<Vec<Vec<f64>>> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split_whitespace()
                .map(|field| {
                    field
                        .parse::<f64>()
                        .with_context(|| format!("Bad number '{}' in {:?}", field, path))
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect()
}

/// `dir/<prefix>_NN.txt` with the number zero-padded to two digits.
pub fn numbered_path(dir: &Path, prefix: &str, number: u32) -> PathBuf {
    dir.join(format!("{}_{:02}.txt", prefix, number))
}

/// Path of scan number `number` in `dir`.
pub fn scan_file_path(dir: &Path, number: u32) -> PathBuf {
    numbered_path(dir, "data", number)
}

/// One past the highest `<prefix>_NN.txt` in `dir`; 1 when there is none.
pub fn next_file_number(dir: &Path, prefix: &str) -> Result<u32> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(1);
    };
    let head = format!("{}_", prefix);
    let highest = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            name.strip_prefix(&head)?
                .strip_suffix(".txt")?
                .parse::<u32>()
                .ok()
        })
        .max();
    match highest {
        None => Ok(1),
        Some(highest) => highest.checked_add(1).ok_or_else(|| {
            DaqError::Processing(format!(
                "{:?} already holds {}, no free file number left",
                dir,
                numbered_path(Path::new(""), prefix, highest).display()
            ))
            .into()
        }),
    }
}

/// Next free scan number in `dir`.
pub fn next_scan_number(dir: &Path) -> Result<u32> {
    next_file_number(dir, "data")
}

/// Write `metadata` as pretty JSON next to `data_path` (same stem, `.json`).
pub fn write_metadata<T: Serialize>(data_path: &Path, metadata: &T) -> Result<PathBuf> {
    let path = data_path.with_extension("json");
    let json =
        serde_json::to_string_pretty(metadata).context("Failed to serialize run metadata")?;
    fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sci_matches_printf() {
        assert_eq!(format_sci(1.25), "1.250000000000000000e+00");
        assert_eq!(format_sci(-0.002), "-2.000000000000000042e-03");
        assert_eq!(format_sci(12345.0), "1.234500000000000000e+04");
        assert_eq!(format_sci(0.0), "0.000000000000000000e+00");
        assert_eq!(format_sci(0.0009765625), "9.765625000000000000e-04");
        assert_eq!(format_sci(2f64.powi(400)).split_once('e').unwrap().1, "+120");
        assert_eq!(format_sci(f64::NAN), "nan");
    }

    #[test]
    fn test_matrix_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data_01.txt");
        let rows = vec![vec![0.0, 0.5, 0.01], vec![1.0, f64::NAN, 0.02]];
        write_matrix(&path, &rows).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let first = text.lines().next().unwrap();
        assert_eq!(first.split(' ').count(), 3);

        let back = read_matrix(&path).unwrap();
        assert_eq!(back[0], rows[0]);
        assert_eq!(back[1][0], 1.0);
        assert!(back[1][1].is_nan());
    }

    #[test]
    fn test_scan_numbering() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(next_scan_number(dir.path()).unwrap(), 1);
        assert_eq!(
            scan_file_path(dir.path(), 7),
            dir.path().join("data_07.txt")
        );

        fs::write(scan_file_path(dir.path(), 3), "").unwrap();
        fs::write(scan_file_path(dir.path(), 12), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        assert_eq!(next_scan_number(dir.path()).unwrap(), 13);
        assert_eq!(next_file_number(dir.path(), "thermo").unwrap(), 1);
    }

    #[test]
    fn test_numbering_stops_at_largest_number() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data_4294967295.txt"), "").unwrap();
        let err = next_scan_number(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DaqError>(),
            Some(DaqError::Processing(_))
        ));
        assert!(err.to_string().contains("data_4294967295.txt"));
        // Other prefixes are unaffected
        assert_eq!(next_file_number(dir.path(), "thermo").unwrap(), 1);
    }

    #[test]
    fn test_metadata_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data_02.txt");
        let path = write_metadata(&data, &serde_json::json!({"loops": 2})).unwrap();
        assert_eq!(path, dir.path().join("data_02.json"));
        assert!(fs::read_to_string(path).unwrap().contains("\"loops\": 2"));
    }
}
