use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::HarnessConfig;
use crate::cpu::Mode;
use crate::harness::HandlerState;
use crate::trap::context::TrapContext;

/// Version identifier for snapshot compatibility checks.
pub const SNAPSHOT_VERSION: &str = "1.0";

/// Full harness snapshot including the hart, handler contexts and result log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessSnapshot {
    pub version: String,
    pub config: HarnessConfig,
    pub cpu: CpuSnapshot,
    /// Machine then Supervisor.
    pub contexts: [Option<TrapContext>; 2],
    pub state: HandlerState,
    pub default_handler: u64,
    pub log: LogSnapshot,
}

/// Serializable CPU state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub pc: u64,
    pub mode: Mode,
    pub regs: [u64; 32],
    pub csrs: HashMap<u16, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSnapshot {
    pub virtual_base: u64,
    pub physical_base: u64,
    pub capacity: usize,
    /// SHA-256 of the words, little-endian, hex encoded.
    pub hash: String,
    pub words: Vec<u64>,
}
