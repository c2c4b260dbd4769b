//! Vectored dispatch tables.
//!
//! Anything the harness does not expect maps to [`Behavior::Fatal`], so an
//! unanticipated trap halts the run instead of being silently resumed.

use serde::{Deserialize, Serialize};

use super::cause::{TrapClass, cause_code, classify};

/// Handler behavior selected for a trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Behavior {
    /// Halt the run; the raw cause is the failure payload.
    Fatal,
    /// Resume at the instruction after the trapping one.
    PlainResume,
    /// Resume at the saved return address, skipping the faulting code.
    ResumeAfterAdjust,
    /// Interpret the ecall arguments (halt or change privilege).
    Ecall,
}

/// How the handler's tvec routes interrupts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorMode {
    /// Every trap enters at the base; interrupts always resume.
    Direct,
    /// Interrupts enter through the interrupt table.
    Vectored,
}

impl VectorMode {
    pub fn from_tvec(tvec: u64) -> Self {
        if tvec & 0b11 == 1 {
            VectorMode::Vectored
        } else {
            VectorMode::Direct
        }
    }

    pub fn tvec_bits(self) -> u64 {
        match self {
            VectorMode::Direct => 0,
            VectorMode::Vectored => 1,
        }
    }
}

pub const EXCEPTION_TABLE: [Behavior; 16] = [
    Behavior::Fatal,             // 0: instruction address misaligned
    Behavior::ResumeAfterAdjust, // 1: instruction access fault
    Behavior::PlainResume,       // 2: illegal instruction
    Behavior::Fatal,             // 3: breakpoint
    Behavior::Fatal,             // 4: load address misaligned
    Behavior::PlainResume,       // 5: load access fault
    Behavior::Fatal,             // 6: store address misaligned
    Behavior::PlainResume,       // 7: store access fault
    Behavior::Ecall,             // 8: ecall from U-mode
    Behavior::Ecall,             // 9: ecall from S-mode
    Behavior::Fatal,             // 10: reserved
    Behavior::Ecall,             // 11: ecall from M-mode
    Behavior::ResumeAfterAdjust, // 12: instruction page fault
    Behavior::PlainResume,       // 13: load page fault
    Behavior::Fatal,             // 14: reserved
    Behavior::PlainResume,       // 15: store page fault
];

/// Slot 0 is the jump into the unvectored entry, so code 0 behaves as in
/// direct mode.
pub const INTERRUPT_TABLE: [Behavior; 12] = [
    Behavior::PlainResume, // 0: unvectored entry
    Behavior::PlainResume, // 1: supervisor software
    Behavior::Fatal,       // 2: reserved
    Behavior::PlainResume, // 3: machine software
    Behavior::Fatal,       // 4: reserved
    Behavior::PlainResume, // 5: supervisor timer
    Behavior::Fatal,       // 6: reserved
    Behavior::PlainResume, // 7: machine timer
    Behavior::Fatal,       // 8: reserved
    Behavior::PlainResume, // 9: supervisor external
    Behavior::Fatal,       // 10: reserved
    Behavior::PlainResume, // 11: machine external
];

/// Select the behavior for `cause` under the given vector mode.
pub fn dispatch(cause: u64, mode: VectorMode) -> Behavior {
    let table: &[Behavior] = match (classify(cause), mode) {
        (TrapClass::Interrupt, VectorMode::Direct) => return Behavior::PlainResume,
        (TrapClass::Interrupt, VectorMode::Vectored) => &INTERRUPT_TABLE,
        (TrapClass::Exception, _) => &EXCEPTION_TABLE,
    };
    usize::try_from(cause_code(cause))
        .ok()
        .and_then(|code| table.get(code).copied())
        .unwrap_or(Behavior::Fatal)
}
