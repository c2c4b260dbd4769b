use thiserror::Error;

use crate::cpu::Mode;

/// Host-level failures of the harness.
///
/// Architectural outcomes (fatal halts, soft-failed ecalls) are not errors;
/// they are reported through [`crate::TrapOutcome`].
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("trap raised while a {0:?}-level handler is still running")]
    NestedTrap(Mode),

    #[error("harness has halted; no further traps can be taken")]
    Halted,

    #[error("no trap handler installed for {0:?} mode")]
    NoHandler(Mode),

    #[error("{0:?} mode cannot own a trap handler")]
    InvalidHandlerLevel(Mode),

    #[error("result log full ({capacity} words)")]
    LogFull { capacity: usize },

    #[error("test table length {0} is not a multiple of 24 bytes")]
    TruncatedTable(usize),

    #[error("no test registered for label {label:#x} (case {index})")]
    UnknownLabel { index: usize, label: u64 },

    #[error("test table ended without a terminate case")]
    TableExhausted,

    #[error("line {line}: {message}")]
    Script { line: usize, message: String },

    #[error("snapshot version mismatch: expected {expected}, found {found}")]
    SnapshotVersion { expected: String, found: String },

    #[error("snapshot result log holds {words} words, capacity is {capacity}")]
    SnapshotLogOverflow { words: usize, capacity: usize },

    #[error("snapshot result log digest mismatch")]
    SnapshotDigest,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),
}
