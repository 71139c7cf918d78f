//! Inputs of the panel.
//!
//! [`document`] parses the XML status documents served by a Monit daemon.
//! The [`PanelSource`] trait abstracts where finished cycles come from: the
//! background poll loop ([`ChannelSource`]) or a status file on disk
//! ([`FileSource`]).

mod channel;
pub mod document;
mod file;

pub use channel::ChannelSource;
pub use document::{
    parse_document, RawBlock, RawCheck, RawLoad, RawPlatform, RawPort, RawProcessCpu,
    RawProcessMemory, RawProgram, RawServer, RawService, RawServiceEntry, RawStatusDocument,
    RawSystem, RawSystemCpu, RawTimestamps, RawUsage, ServiceDetail, ServiceKind,
};
pub use file::FileSource;

use std::fmt::Debug;

use crate::poll::CycleOutcome;

/// Trait for receiving cycle outcomes from various sources.
///
/// # Example
///
/// ```
/// use monit_doctor::{FileSource, PanelSource};
///
/// let mut source = FileSource::new("status.xml");
/// if let Some(Ok(report)) = source.poll() {
///     println!("Got {} instances", report.instances.len());
/// }
/// ```
pub trait PanelSource: Send + Debug {
    /// Poll for the latest outcome.
    ///
    /// Returns `Some(outcome)` if a new cycle finished since the last poll,
    /// `None` otherwise. This method should be non-blocking.
    fn poll(&mut self) -> Option<CycleOutcome>;

    /// Returns a human-readable description of the source.
    ///
    /// Used for display in the TUI status bar.
    fn description(&self) -> &str;

    /// Returns the error message if the last poll could not read the source.
    fn error(&self) -> Option<&str>;

    /// Ask for a new cycle as soon as possible.
    fn refresh(&mut self) {}
}
