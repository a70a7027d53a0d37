pub mod seed;
pub mod store_sink;

pub use seed::{load_reference_data, ReferencePaths, SeedError, SeedReport, TableSeedCount};
pub use store_sink::{FailedRecord, LoadFailure, LoadReport, StoreSink};
