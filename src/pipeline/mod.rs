// crmsync/src/pipeline/mod.rs
//! Read and write phases shared by every operation: paginated search
//! collection, chunked batch submission, and progress reporting.
pub(crate) mod collector;
pub(crate) mod progress;
pub(crate) mod record;
pub(crate) mod writer;

pub use collector::{Filter, PaginatedCollector, SearchRequest, SortDirection, search_path};
pub use progress::{LogReporter, Phase, ProgressEvent, ProgressReporter};
pub use record::{ObjectId, Record};
pub use writer::{BatchInput, BatchWriter};
