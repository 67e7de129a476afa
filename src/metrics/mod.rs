//! Perf instrumentation comparing direct ledger reads with the GraphQL façade.

pub mod perf;
pub mod scheduler;
pub mod seed;
pub mod snapshot;

pub use perf::{aggregate, summarize, NewPerfSample, PerfSample, PerfSampleStore, PerfSummary, SampleFilter, SourceSummary};
pub use scheduler::SnapshotScheduler;
pub use seed::{PerfOperation, PerfSeeder};
pub use snapshot::{SnapshotError, SnapshotResult, Snapshotter};
