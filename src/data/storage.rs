//! CSV export of raw buffers and demodulated history.
//!
//! Files without an explicit name are created under `storage.output_dir` as
//! `<prefix>_<YYYYmmdd_HHMMSS>.csv`.
use crate::config::StorageSettings;
use crate::data::store::HistoryPoint;
use crate::error::{AppResult, LockinError};
use crate::state::RawFrame;
use crate::validation::is_valid_path;
use std::path::{Path, PathBuf};
use tracing::info;

/// Timestamped file name for an export.
pub fn default_file_name(prefix: &str) -> String {
    format!(
        "{}_{}.csv",
        prefix,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    )
}

/// Resolve the destination of an export and create its directory.
///
/// Relative names are placed under `output_dir`; absolute names are used as given.
pub fn resolve_path(
    settings: &StorageSettings,
    file: Option<&str>,
    prefix: &str,
) -> AppResult<PathBuf> {
    let path = match file {
        Some(name) => {
            is_valid_path(name).map_err(|e| LockinError::Storage(format!("{e}: '{name}'")))?;
            let name = Path::new(name);
            if name.is_absolute() {
                name.to_path_buf()
            } else {
                settings.output_dir.join(name)
            }
        }
        None => settings.output_dir.join(default_file_name(prefix)),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                LockinError::Storage(format!("Failed to create '{}': {e}", parent.display()))
            })?;
        }
    }
    Ok(path)
}

/// Writes raw frames and history rows as CSV.
#[cfg(feature = "storage_csv")]
pub struct CsvWriter<W: std::io::Write> {
    writer: csv::Writer<W>,
}

#[cfg(feature = "storage_csv")]
impl CsvWriter<std::fs::File> {
    /// Create (truncate) the file at `path`.
    pub fn create(path: &Path) -> AppResult<Self> {
        let file = std::fs::File::create(path).map_err(|e| {
            LockinError::Storage(format!("Failed to create CSV file '{}': {e}", path.display()))
        })?;
        Ok(Self::from_writer(file))
    }
}

#[cfg(feature = "storage_csv")]
impl<W: std::io::Write> CsvWriter<W> {
    /// Wrap any writer.
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
        }
    }

    /// Write `time, ch1[, ch2]` for every sample of `frame`.
    ///
    /// Time is the sample offset within the buffer in seconds.
    pub fn write_raw(&mut self, frame: &RawFrame, channels: usize) -> AppResult<usize> {
        let channels = channels.clamp(1, 2).min(frame.channels.len());
        let mut header = vec!["time".to_string()];
        header.extend((1..=channels).map(|ch| format!("ch{ch}")));
        self.record(&header)?;

        for i in 0..frame.len() {
            let mut row = vec![(i as f64 * frame.sample_interval).to_string()];
            row.extend(frame.channels[..channels].iter().map(|c| c[i].to_string()));
            self.record(&row)?;
        }
        self.flush()?;
        Ok(frame.len())
    }

    /// Write `t, dt, x1, y1[, x2, y2]` for every history row.
    pub fn write_history(&mut self, rows: &[HistoryPoint], channels: usize) -> AppResult<usize> {
        let channels = channels.clamp(1, 2);
        let mut header = vec!["t".to_string(), "dt".to_string()];
        for ch in 1..=channels {
            header.push(format!("x{ch}"));
            header.push(format!("y{ch}"));
        }
        self.record(&header)?;

        for p in rows {
            let mut row = vec![p.t.to_string(), p.dt.to_string()];
            for ch in 0..channels {
                row.push(p.x[ch].to_string());
                row.push(p.y[ch].to_string());
            }
            self.record(&row)?;
        }
        self.flush()?;
        Ok(rows.len())
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> AppResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| LockinError::Storage(e.to_string()))
    }

    fn record(&mut self, fields: &[String]) -> AppResult<()> {
        self.writer
            .write_record(fields)
            .map_err(|e| LockinError::Storage(e.to_string()))
    }

    fn flush(&mut self) -> AppResult<()> {
        self.writer
            .flush()
            .map_err(|e| LockinError::Storage(e.to_string()))
    }
}

/// Save `frame` to `path`. Returns the number of samples written.
pub fn save_raw(path: &Path, frame: &RawFrame, channels: usize) -> AppResult<usize> {
    #[cfg(feature = "storage_csv")]
    {
        let written = CsvWriter::create(path)?.write_raw(frame, channels)?;
        info!(path = %path.display(), samples = written, "Raw buffer saved");
        Ok(written)
    }
    #[cfg(not(feature = "storage_csv"))]
    {
        let _ = (path, frame, channels);
        Err(LockinError::Storage(
            "CSV export requires the storage_csv feature".to_string(),
        ))
    }
}

/// Save history `rows` to `path`. Returns the number of rows written.
pub fn save_history(path: &Path, rows: &[HistoryPoint], channels: usize) -> AppResult<usize> {
    #[cfg(feature = "storage_csv")]
    {
        let written = CsvWriter::create(path)?.write_history(rows, channels)?;
        info!(path = %path.display(), rows = written, "History saved");
        Ok(written)
    }
    #[cfg(not(feature = "storage_csv"))]
    {
        let _ = (path, rows, channels);
        Err(LockinError::Storage(
            "CSV export requires the storage_csv feature".to_string(),
        ))
    }
}

#[cfg(all(test, feature = "storage_csv"))]
mod tests {
    use super::*;

    fn frame() -> RawFrame {
        RawFrame {
            t: 1.5,
            sample_interval: 0.5,
            channels: vec![vec![1.0, 2.0, 3.0], vec![-1.0, -2.0, -3.0]],
        }
    }

    #[test]
    fn test_raw_csv_layout() {
        let mut writer = CsvWriter::from_writer(Vec::new());
        assert_eq!(writer.write_raw(&frame(), 2).unwrap(), 3);
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "time,ch1,ch2");
        assert_eq!(lines[1], "0,1,-1");
        assert_eq!(lines[3], "1,3,-3");
    }

    #[test]
    fn test_history_csv_single_channel() {
        let rows = [HistoryPoint {
            t: 0.25,
            dt: 0.01,
            x: [0.5, 9.0],
            y: [-0.5, 9.0],
        }];
        let mut writer = CsvWriter::from_writer(Vec::new());
        writer.write_history(&rows, 1).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(text, "t,dt,x1,y1\n0.25,0.01,0.5,-0.5\n");
    }

    #[test]
    fn test_resolve_path_under_output_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings = StorageSettings {
            output_dir: temp_dir.path().join("exports"),
        };

        let named = resolve_path(&settings, Some("run1.csv"), "raw").unwrap();
        assert_eq!(named, settings.output_dir.join("run1.csv"));
        assert!(settings.output_dir.is_dir());

        let generated = resolve_path(&settings, None, "txy").unwrap();
        let name = generated.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("txy_") && name.ends_with(".csv"), "{name}");
    }

    #[test]
    fn test_save_raw_to_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("raw.csv");
        save_raw(&path, &frame(), 1).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("time,ch1\n"));
        assert_eq!(text.lines().count(), 4);
    }
}
