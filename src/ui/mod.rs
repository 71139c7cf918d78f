//! Terminal UI rendering using ratatui.
//!
//! ## Submodules
//!
//! - [`panel`]: The selected instance: metadata, service table, details pane
//! - [`common`]: Shared components (header, instance tabs, status bar, help overlay)
//! - [`theme`]: Light/dark theme support with terminal auto-detection
//!
//! ## Rendering Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ Header (common::render_header)       │
//! ├──────────────────────────────────────┤
//! │ Instances (common::render_tabs)      │
//! ├──────────────────────────────────────┤
//! │                                      │
//! │ Instance panel (panel::render)       │
//! │                                      │
//! ├──────────────────────────────────────┤
//! │ Status Bar (common::render_status)   │
//! └──────────────────────────────────────┘
//!         ↑
//!    Overlay rendered on top:
//!    - common::render_help
//! ```

pub mod common;
pub mod panel;
pub mod theme;

pub use theme::Theme;
