//! Transfer engine
//!
//! Everything between the API client and the template directory: entity
//! kinds and their dependency order, category flag resolution, the extract
//! and load pipelines, and run reporting.

pub mod collections;
pub mod entity;
pub mod extract;
pub mod filter;
pub mod flags;
pub mod load;
pub mod report;

pub use extract::Extractor;
pub use flags::{RawFlags, ResolvedFlags};
pub use load::Loader;
pub use report::{RunLog, RunReport, StageOutcome};
