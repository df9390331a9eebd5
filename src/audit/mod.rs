//! Audit trail - what every loop attempt produced and how it was judged

pub mod entry;
pub mod logger;

pub use entry::{LogEntry, LogKind};
pub use logger::{IterationLog, Logger, QuestionAnswer};
