//! locscope - lines of code and change activity across many repositories
//!
//! A library for measuring repositories at a historical date with:
//! - Project discovery by marker file
//! - Historical checkout with guaranteed restore of the working tree
//! - `git log --numstat` parsing with author exclusion
//! - Line counting through `cloc`
//! - JSON, CSV and HTML reports

pub mod analyzer;
pub mod checkout;
pub mod cloc;
pub mod config;
pub mod discovery;
pub mod error;
pub mod git;
pub mod process;
pub mod report;

pub use analyzer::{AnalysisOptions, AnalysisResults, Analyzer, LineCounter, ProjectResult};
pub use checkout::{measure_at_date, CheckoutOptions, CheckoutSession, MeasurementState};
pub use config::Config;
pub use discovery::{discover_projects, DiscoveryFilters, ProjectInfo};
pub use error::{CheckoutError, ResolveError, RestoreError, SnapshotError, ToolError};
