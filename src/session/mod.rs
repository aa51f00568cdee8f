mod preview;
mod session;
mod types;

pub use preview::{PreviewHandle, PreviewRevoker};
pub use session::UploadSession;
pub use types::{
    FileCandidate,
    Rejection,
    SessionEvent,
    SourceHandle,
    TaskId,
    TaskSnapshot,
    UploadPhase,
    UploadTask,
};
