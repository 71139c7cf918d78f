//! # monit-doctor
//!
//! A terminal status panel and library for watching one or more Monit
//! daemons.
//!
//! Each daemon serves an XML status document. This crate fetches those
//! documents concurrently, normalizes every service into a display record
//! with a health status, and shows the result in an interactive terminal UI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Application                          │
//! │  ┌─────────┐    ┌──────────┐    ┌─────────┐    ┌─────────┐ │
//! │  │  app    │───▶│   data   │───▶│   ui    │───▶│ Terminal│ │
//! │  │ (state) │    │(records) │    │(render) │    │         │ │
//! │  └────┬────┘    └──────────┘    └─────────┘    └─────────┘ │
//! │       │                                                     │
//! │       ▼                                                     │
//! │  ┌─────────┐    ┌──────────┐                                │
//! │  │ source  │◀───│   poll   │◀── HTTP (reqwest)              │
//! │  │ (input) │    │ (cycles) │                                │
//! │  └─────────┘    └──────────┘                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`config`]**: Settings from a TOML file and `MONIT_DOCTOR__*` variables
//! - **[`poll`]**: Concurrent, staggered fetch cycles over instance groups
//! - **[`source`]**: Status document parsing and the [`PanelSource`] trait
//! - **[`data`]**: Service normalization, instance aggregation, change history
//! - **[`app`]**: Application state, selection and visibility
//! - **[`ui`]**: Terminal rendering using ratatui
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Poll the instances listed in monit-doctor.toml
//! monit-doctor
//!
//! # Show a saved status document
//! monit-doctor --file status.xml
//!
//! # Run one cycle and print it as JSON
//! monit-doctor --once
//! ```
//!
//! ### As a library with file source
//!
//! ```
//! use monit_doctor::{App, FileSource, VisibilityPolicy};
//!
//! let source = Box::new(FileSource::new("status.xml"));
//! let app = App::new(source, VisibilityPolicy::default());
//! ```
//!
//! ### As a library with channel source
//!
//! ```
//! use monit_doctor::{App, ChannelSource, VisibilityPolicy};
//!
//! // The sender half is handed to the poll loop
//! let (tx, source) = ChannelSource::create("2 instances");
//!
//! let app = App::new(Box::new(source), VisibilityPolicy::default());
//! ```
//!
//! ### Aggregating a document directly
//!
//! ```
//! use monit_doctor::data::{aggregate, AggregateOptions, InstanceIdentity};
//!
//! let xml = r#"<monit><service type="3"><name>nginx</name>
//!     <status>0</status><monitor>1</monitor></service></monit>"#;
//! let identity = InstanceIdentity::new("web", "http://web:2812");
//! let summary = aggregate(xml, &identity, &AggregateOptions::default()).unwrap();
//! assert_eq!(summary.totals.healthy, 1);
//! ```

pub mod app;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod poll;
pub mod source;
pub mod ui;

// Re-export main types for convenience
pub use app::App;
pub use config::{InstanceConfig, Settings, VisibilityPolicy};
pub use data::{HealthTotals, InstanceSummary, ServiceStatus, ServiceViewRecord};
pub use error::{Error, FetchError};
pub use poll::{CycleOutcome, CycleReport, HttpFetcher, InstanceReport, Poller, StatusFetcher};
pub use source::{ChannelSource, FileSource, PanelSource};
