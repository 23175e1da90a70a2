//! `MemoryStore`: durable storage for memories, their audit history, and the
//! dedup/versioning invariants in front of them.

mod store;
mod types;

pub use store::{JobScheduler, MemoryStore, NullScheduler};
pub use types::{
    BATCH_CONFIRM_THRESHOLD, BATCH_FORGET_MAX_LIMIT, ForgetMode, ForgetOutcome, ForgetPreview,
    ForgetSelector, HistoryEvent, IngestEnvelope, IngestResult, Memory, MemoryHistoryRow,
    MemoryPatch, MemoryType, PatchResult, UpdateResult,
};
