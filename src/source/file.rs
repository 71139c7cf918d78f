//! File-based panel source.
//!
//! Reads a saved status document (for example the output of
//! `curl http://host:2812/_status?format=xml`) and re-reads it whenever the
//! file changes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;

use super::PanelSource;
use crate::data::{aggregate, AggregateOptions, InstanceIdentity};
use crate::poll::{CycleOutcome, CycleReport, InstanceReport};

/// A panel source that reads one instance's status document from disk.
///
/// The file stem is used as the instance id. The source tracks the file's
/// modification time and only returns new data when the file has been
/// updated.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    description: String,
    options: AggregateOptions,
    last_error: Option<String>,
    last_modified: Option<SystemTime>,
}

impl FileSource {
    /// Create a new file source for the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let description = format!("file: {}", path.display());
        Self {
            path,
            description,
            options: AggregateOptions::default(),
            last_error: None,
            last_modified: None,
        }
    }

    /// Use these options when aggregating the document.
    pub fn with_options(mut self, options: AggregateOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the path being monitored.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn instance_id(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "local".to_string())
    }

    /// Get the file's modification time.
    fn get_modified_time(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).ok()?.modified().ok()
    }

    /// Read and aggregate the file.
    fn read_file(&mut self) -> Option<CycleOutcome> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                self.last_error = Some(format!("Read error: {}", e));
                return None;
            }
        };

        let identity =
            InstanceIdentity::new(&self.instance_id(), &self.path.display().to_string())
                .with_show_stats(true)
                .with_fetched_at(Utc::now());
        match aggregate(&content, &identity, &self.options) {
            Ok(summary) => {
                self.last_error = None;
                Some(Ok(CycleReport::new(0, vec![InstanceReport::Ready(summary)])))
            }
            Err(e) => {
                self.last_error = Some(format!("Parse error: {}", e));
                None
            }
        }
    }
}

impl PanelSource for FileSource {
    fn poll(&mut self) -> Option<CycleOutcome> {
        let current_modified = self.get_modified_time();

        // Check if file has been modified since last read
        let file_changed = match (&self.last_modified, &current_modified) {
            (None, _) => true,        // First poll, always read
            (Some(_), None) => false, // File disappeared, don't update
            (Some(last), Some(current)) => current > last,
        };

        if file_changed {
            if let Some(outcome) = self.read_file() {
                self.last_modified = current_modified;
                return Some(outcome);
            }
        }

        None
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn refresh(&mut self) {
        self.last_modified = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_xml() -> &'static str {
        r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<monit>
  <server><version>5.27.2</version><uptime>60</uptime></server>
  <service type="3"><name>nginx</name><status>0</status><monitor>1</monitor></service>
  <service type="0"><name>rootfs</name><status>0</status><monitor>0</monitor></service>
</monit>"#
    }

    #[test]
    fn test_file_source_new() {
        let source = FileSource::new("/tmp/status.xml");
        assert_eq!(source.path(), Path::new("/tmp/status.xml"));
        assert_eq!(source.description(), "file: /tmp/status.xml");
        assert!(source.error().is_none());
    }

    #[test]
    fn test_file_source_poll_reads_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", sample_xml()).unwrap();

        let mut source = FileSource::new(file.path());

        // First poll should return data
        let report = source.poll().unwrap().unwrap();
        let summary = report.summaries().next().unwrap();
        assert_eq!(summary.totals.total, 2);
        assert_eq!(summary.totals.unmonitored, 1);
        assert_eq!(summary.server.uptime_relative, "1 minute");

        // Second poll without file change should return None
        assert!(source.poll().is_none());

        // A refresh forces a re-read
        source.refresh();
        assert!(source.poll().is_some());
    }

    #[test]
    fn test_file_source_missing_file() {
        let mut source = FileSource::new("/nonexistent/path/status.xml");

        assert!(source.poll().is_none());
        assert!(source.error().unwrap().contains("Read error"));
    }

    #[test]
    fn test_file_source_not_a_status_document() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "<html><body>Unauthorized</body></html>").unwrap();

        let mut source = FileSource::new(file.path());

        assert!(source.poll().is_none());
        assert!(source.error().unwrap().contains("Parse error"));
    }
}
