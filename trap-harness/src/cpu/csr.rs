use std::collections::HashMap;
use std::ops::{Index, IndexMut};

pub use super::types::Mode;

/// Compact CSR storage for the registers the trap path touches.
pub struct CsrFile {
    storage: [u64; 4096],
}

impl CsrFile {
    pub const fn new() -> Self {
        Self { storage: [0; 4096] }
    }

    pub fn export(&self) -> HashMap<u16, u64> {
        let mut map = HashMap::new();
        for (idx, &val) in self.storage.iter().enumerate() {
            if val != 0 {
                map.insert(idx as u16, val);
            }
        }
        map
    }

    pub fn import(&mut self, map: &HashMap<u16, u64>) {
        self.storage = [0u64; 4096];
        for (&addr, &val) in map.iter() {
            let idx = addr as usize;
            if idx < self.storage.len() {
                self.storage[idx] = val;
            }
        }
    }

    /// Previous-privilege field the given handler level returns into.
    ///
    /// Machine reads MPP (mstatus[12:11]); Supervisor reads SPP (mstatus[8]).
    pub fn previous_privilege(&self, level: Mode) -> Mode {
        let mstatus = self.storage[CSR_MSTATUS as usize];
        match level {
            Mode::Machine => Mode::from_mpp(mstatus >> MSTATUS_MPP_SHIFT),
            _ => {
                if mstatus & MSTATUS_SPP != 0 {
                    Mode::Supervisor
                } else {
                    Mode::User
                }
            }
        }
    }

    /// Rewrite only the previous-privilege field of `level`.
    ///
    /// Returns `false` when the field cannot encode `target` (SPP has no
    /// Machine encoding); mstatus is left untouched in that case.
    pub fn set_previous_privilege(&mut self, level: Mode, target: Mode) -> bool {
        let mut mstatus = self.storage[CSR_MSTATUS as usize];
        match level {
            Mode::Machine => {
                mstatus = (mstatus & !MSTATUS_MPP) | (target.to_mpp() << MSTATUS_MPP_SHIFT);
            }
            _ => match target {
                Mode::Supervisor => mstatus |= MSTATUS_SPP,
                Mode::User => mstatus &= !MSTATUS_SPP,
                Mode::Machine => return false,
            },
        }
        self.storage[CSR_MSTATUS as usize] = mstatus;
        true
    }
}

impl Default for CsrFile {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for CsrFile {
    type Output = u64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.storage[index]
    }
}

impl IndexMut<usize> for CsrFile {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.storage[index]
    }
}

/// CSR addresses of the per-level trap registers.
#[derive(Debug, Clone, Copy)]
pub struct TrapCsrs {
    pub tvec: u16,
    pub epc: u16,
    pub cause: u16,
    pub tval: u16,
}

impl TrapCsrs {
    pub fn for_level(level: Mode) -> Self {
        match level {
            Mode::Machine => Self {
                tvec: CSR_MTVEC,
                epc: CSR_MEPC,
                cause: CSR_MCAUSE,
                tval: CSR_MTVAL,
            },
            _ => Self {
                tvec: CSR_STVEC,
                epc: CSR_SEPC,
                cause: CSR_SCAUSE,
                tval: CSR_STVAL,
            },
        }
    }
}

// mstatus fields
pub const MSTATUS_SPP: u64 = 1 << 8;
pub const MSTATUS_MPP_SHIFT: u64 = 11;
pub const MSTATUS_MPP: u64 = 0b11 << MSTATUS_MPP_SHIFT;
pub const MSTATUS_MPRV: u64 = 1 << 17;
pub const MSTATUS_SUM: u64 = 1 << 18;
pub const MSTATUS_MXR: u64 = 1 << 19;

/// satp.MODE values.
pub const SATP_MODE_SHIFT: u64 = 60;
pub const SATP_ASID_SHIFT: u64 = 44;
pub const SATP_MODE_SV39: u64 = 8;
pub const SATP_MODE_SV48: u64 = 9;

// Common CSR addresses used by the privileged architecture.
pub const CSR_SATP: u16 = 0x180;

pub const CSR_MSTATUS: u16 = 0x300;
pub const CSR_MEDELEG: u16 = 0x302;
pub const CSR_MIDELEG: u16 = 0x303;
pub const CSR_MTVEC: u16 = 0x305;

pub const CSR_MEPC: u16 = 0x341;
pub const CSR_MCAUSE: u16 = 0x342;
pub const CSR_MTVAL: u16 = 0x343;

pub const CSR_PMPCFG0: u16 = 0x3A0;
pub const CSR_PMPADDR0: u16 = 0x3B0;

// Supervisor CSRs
pub const CSR_STVEC: u16 = 0x105;
pub const CSR_SEPC: u16 = 0x141;
pub const CSR_SCAUSE: u16 = 0x142;
pub const CSR_STVAL: u16 = 0x143;
