pub mod config;
pub mod errors;
pub mod gateway;
pub mod policy;
pub mod session;
pub mod transfer;

pub use config::{AcceptPolicy, ClientConfig, Config, GatewayConfig};
pub use errors::{Result, UploadError};
pub use gateway::{
    Caller,
    DenialReason,
    GatewayDecision,
    GatewayError,
    GatewayService,
    HttpStorageGateway,
    LocalGateway,
    MemoryObjectStore,
    ObjectKey,
    ObjectStore,
    StorageGateway,
    UploadRequest,
    WriteCredential,
};
pub use policy::{
    AbuseControl,
    AbuseDecision,
    BotDetector,
    FixedWindowLimiter,
    HeuristicBotDetector,
    PermissiveBotDetector,
    RequestFingerprint,
};
pub use session::{
    FileCandidate,
    PreviewHandle,
    Rejection,
    SessionEvent,
    SourceHandle,
    TaskId,
    TaskSnapshot,
    UploadPhase,
    UploadSession,
};
pub use transfer::{HttpTransferEngine, TransferEngine, TransferError};
