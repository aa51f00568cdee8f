mod engine;
mod errors;
mod progress;

pub use engine::{HttpTransferEngine, TransferEngine};
#[cfg(test)]
pub(crate) use engine::chunk_source;
pub use errors::TransferError;
pub use progress::{ProgressFn, ProgressStream, ProgressTracker};
