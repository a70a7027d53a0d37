pub mod app;
pub mod config;
pub mod metrics_textfile;
pub mod observability;
pub mod photos;
pub mod pipeline;
pub mod render;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use pipeline::{Envelope, Pipeline, RunSummary};
