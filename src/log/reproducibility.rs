/// Reproducibility logging system
///
/// Every step applied to a spectrum during a batch run is recorded with:
/// - Timestamp
/// - Spectrum it applies to
/// - Operation name and the parameter values used
/// - Sequential order
///
/// The log can be exported as human-readable text or JSON.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// A single log entry representing one operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Sequential operation number (1-based)
    pub sequence: usize,
    pub timestamp: DateTime<Local>,
    /// Spectrum name or source path the operation applied to
    pub spectrum: String,
    pub operation: String,
    pub description: String,
}

impl LogEntry {
    /// Format as human-readable text line
    pub fn to_text(&self) -> String {
        format!(
            "{:>4}  {}  {:<14} {}",
            self.sequence,
            self.timestamp.format("%H:%M:%S"),
            self.operation,
            self.description
        )
    }
}

/// The reproducibility log: all operations of one batch run, in order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReproLog {
    pub session_id: String,
    pub session_start: DateTime<Local>,
    pub source: String,
    pub software_version: String,
    pub entries: Vec<LogEntry>,
}

impl ReproLog {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            session_start: Local::now(),
            source: String::new(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            entries: Vec::new(),
        }
    }

    /// Set the input directory for this session
    pub fn set_source(&mut self, source: &str) {
        self.source = source.to_string();
    }

    pub fn add_entry(&mut self, spectrum: &str, operation: &str, description: &str) {
        let seq = self.entries.len() + 1;
        self.entries.push(LogEntry {
            sequence: seq,
            timestamp: Local::now(),
            spectrum: spectrum.to_string(),
            operation: operation.to_string(),
            description: description.to_string(),
        });
        log::debug!("[{:03}] {} {}: {}", seq, spectrum, operation, description);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries recorded for one spectrum
    pub fn entries_for<'a>(&'a self, spectrum: &'a str) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.entries.iter().filter(move |e| e.spectrum == spectrum)
    }

    /// Spectrum names in the order they first appear
    pub fn spectra(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for e in &self.entries {
            if !names.contains(&e.spectrum.as_str()) {
                names.push(&e.spectrum);
            }
        }
        names
    }

    /// Plain-text report, one block per spectrum
    pub fn to_text(&self) -> String {
        let rule = "=".repeat(64);
        let mut out = format!(
            "{rule}\nnmr-roi-fit v{} session {}\nstarted {}  source {}\n{} operation(s) on {} spectra\n{rule}\n",
            self.software_version,
            self.session_id,
            self.session_start.format("%Y-%m-%d %H:%M:%S"),
            if self.source.is_empty() { "-" } else { self.source.as_str() },
            self.entries.len(),
            self.spectra().len(),
        );
        for name in self.spectra() {
            out.push_str(&format!("\n{}\n", name));
            for entry in self.entries_for(name) {
                out.push_str("  ");
                out.push_str(&entry.to_text());
                out.push('\n');
            }
        }
        out
    }

    /// Write as text when the path ends in `.txt`, JSON otherwise
    pub fn save(&self, path: &Path) -> io::Result<()> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("txt") => std::fs::write(path, self.to_text()),
            _ => self.save_json(path),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Save log as JSON file
    pub fn save_json(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(io::Error::other)?;
        std::fs::write(path, json)
    }
}

impl Default for ReproLog {
    fn default() -> Self {
        Self::new()
    }
}
