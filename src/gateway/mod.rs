mod http;
mod service;
mod store;
mod types;

pub use http::HttpStorageGateway;
pub use service::{Caller, GatewayService, LocalGateway};
pub use store::{MemoryObjectStore, ObjectStore};
pub use types::{
    DeleteRequest,
    DenialReason,
    GatewayDecision,
    GatewayError,
    ObjectKey,
    StorageGateway,
    UploadRequest,
    WriteCredential,
};

#[cfg(test)]
pub(crate) use http::denial_from_status;
