//! 流水线引擎

pub mod context;
pub mod pipeline;
pub mod task;

pub use self::pipeline::{BuildOptions, BuildSummary, ScrapeEngine};
