//! Data models and processing for status documents.
//!
//! This module turns parsed status documents into typed, health-annotated
//! records suitable for display.
//!
//! ## Submodules
//!
//! - [`duration`]: Parsing and formatting of interval strings (e.g., "5m", "200ms")
//! - [`format`]: Field coercion and display formatting (bytes, latency, relative time)
//! - [`history`]: Status change tracking across cycles
//! - [`instance`]: Instance aggregation ([`InstanceSummary`], [`HealthTotals`])
//! - [`service`]: Service normalization ([`ServiceViewRecord`], [`ServiceStatus`])
//!
//! ## Data Flow
//!
//! ```text
//! RawStatusDocument (parsed XML)
//!        │
//!        ▼
//! InstanceSummary::from_document()
//!        │
//!        ├──▶ normalize_service() per entry ──▶ ServiceViewRecord
//!        │
//!        └──▶ HealthTotals + global status
//! ```

pub mod duration;
pub mod format;
pub mod history;
pub mod instance;
pub mod service;

pub use history::StatusHistory;
pub use instance::{
    aggregate, AggregateOptions, HealthTotals, InstanceIdentity, InstanceSummary, PlatformInfo,
    ServerInfo,
};
pub use service::{
    normalize_service, CheckResult, CheckStatus, DiskCheck, PortCheck, ProgramOutput,
    ServiceChecks, ServiceContext, ServiceExtra, ServiceStatus, ServiceViewRecord,
    SystemMetrics, UnmonitoredDetails,
};
