//! User feedback collection
//!
//! Corrections are appended to a shared dataset in the object store;
//! when that store is unreachable they are staged in a local outbox.

mod outbox;
mod store;

pub use outbox::{FeedbackOutbox, FlushReport, StagedFeedback};
pub use store::{
    encode_line, parse_line, AppendOutcome, FeedbackStore, DEFAULT_CONFLICT_RETRIES,
    FEEDBACK_HEADER,
};
