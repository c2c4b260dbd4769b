use serde::{Deserialize, Serialize};

use crate::result_log::{ByteOrder, DEFAULT_CAPACITY_WORDS};

/// Base of the result region in the test programs' memory map.
pub const DEFAULT_LOG_BASE: u64 = 0x8000_2000;

/// Reset PC of the test programs.
pub const DEFAULT_ENTRY_PC: u64 = 0x8000_0000;

/// How far past the trapping instruction a resume lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumeStep {
    /// Always 4 bytes, even after a compressed instruction.
    Fixed,
    /// 2 or 4 bytes from the low bits of the trapping instruction, when the
    /// event carries it; 4 otherwise.
    DecodeLength,
}

impl ResumeStep {
    pub fn length(self, instruction: Option<u32>) -> u64 {
        match (self, instruction) {
            (ResumeStep::DecodeLength, Some(insn)) if insn & 0b11 != 0b11 => 2,
            _ => 4,
        }
    }
}

/// Configuration for a [`crate::Harness`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub resume_step: ResumeStep,
    /// Append the raw cause of every trap to the result log.
    pub record_causes: bool,
    /// Result log capacity in words.
    pub log_capacity: usize,
    pub virtual_log_base: u64,
    pub physical_log_base: u64,
    pub byte_order: ByteOrder,
    pub entry_pc: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            resume_step: ResumeStep::Fixed,
            record_causes: false,
            log_capacity: DEFAULT_CAPACITY_WORDS,
            virtual_log_base: DEFAULT_LOG_BASE,
            physical_log_base: DEFAULT_LOG_BASE,
            byte_order: ByteOrder::Little,
            entry_pc: DEFAULT_ENTRY_PC,
        }
    }
}
