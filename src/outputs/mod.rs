//! Where resolved schedules go.
//!
//! # Submodules
//!
//! - [`slack`]: renders the Slack message and posts it to the pipeline's webhook
//! - [`json`]: writes an optional per-pipeline JSON report
//!
//! # Output Structure
//!
//! ```text
//! Slack channel (per pipeline)      ← slack::render_message + slack::post
//!
//! json_output_dir/
//! └── 2025-10-01/
//!     └── standard.json             ← json::write_report
//! ```

pub mod json;
pub mod slack;
