// Audit module
// Flagged entry persistence, owned by the server side

mod jsonl;
mod record;
mod recorder;
mod worker;

pub use jsonl::JsonlAuditRecorder;
pub use record::{FlagId, FlaggedEntryRecord};
pub use recorder::{AuditRecorder, MemoryAuditRecorder};
pub use worker::{AuditHandle, AuditRequest, AuditWorker, MAX_WRITE_ATTEMPTS, RETRY_BASE_DELAY};
