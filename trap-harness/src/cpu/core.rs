use std::collections::HashMap;

use super::csr::{CSR_MEDELEG, CSR_MIDELEG, CSR_MSTATUS, CsrFile, TrapCsrs};
use super::types::{CAUSE_INTERRUPT_BIT, Mode, Register, TrapEvent};

/// Architectural state of the single hart the harness models.
pub struct Cpu {
    pub regs: [u64; 32],
    pub pc: u64,
    /// CSR storage (12-bit CSR address space).
    pub(crate) csrs: CsrFile,
    /// Current privilege mode (Machine/Supervisor/User).
    pub mode: Mode,
}

impl Cpu {
    /// Create a new hart in Machine mode at `pc`.
    pub fn new(pc: u64) -> Self {
        let mut csrs = CsrFile::new();
        // mstatus starts with MPP/SPP pointing at User, like a fresh reset.
        csrs[CSR_MSTATUS as usize] = 0;

        Self {
            regs: [0; 32],
            pc,
            csrs,
            mode: Mode::Machine,
        }
    }

    /// Export the current CSR image into a compact map suitable for
    /// serialization in snapshots.
    pub fn export_csrs(&self) -> HashMap<u16, u64> {
        self.csrs.export()
    }

    /// Restore CSRs from a previously exported map.
    pub fn import_csrs(&mut self, map: &HashMap<u16, u64>) {
        self.csrs.import(map);
    }

    pub fn read_reg(&self, reg: Register) -> u64 {
        if reg == Register::X0 {
            0
        } else {
            self.regs[reg.to_usize()]
        }
    }

    pub fn write_reg(&mut self, reg: Register, val: u64) {
        if reg != Register::X0 {
            self.regs[reg.to_usize()] = val;
        }
    }

    pub fn read_csr(&self, addr: u16) -> u64 {
        self.csrs[addr as usize]
    }

    pub fn write_csr(&mut self, addr: u16, val: u64) {
        self.csrs[addr as usize] = val;
    }

    /// Privilege level whose handler receives `event`, per medeleg/mideleg.
    pub fn trap_target(&self, event: &TrapEvent) -> Mode {
        let is_interrupt = event.cause & CAUSE_INTERRUPT_BIT != 0;
        let code = event.cause & !CAUSE_INTERRUPT_BIT;
        // Delegation to a lower privilege is only meaningful when not in Machine mode
        if event.origin == Mode::Machine || code >= 64 {
            return Mode::Machine;
        }
        let deleg = if is_interrupt {
            self.csrs[CSR_MIDELEG as usize]
        } else {
            self.csrs[CSR_MEDELEG as usize]
        };
        if deleg & (1u64 << code) != 0 {
            Mode::Supervisor
        } else {
            Mode::Machine
        }
    }

    /// Architectural trap entry: latch epc/cause/tval, record the previous
    /// privilege and switch to the handling level.
    ///
    /// Returns the level that now owns the trap.
    pub fn enter_trap(&mut self, event: &TrapEvent) -> Mode {
        let level = self.trap_target(event);
        let regs = TrapCsrs::for_level(level);

        self.csrs[regs.epc as usize] = event.pc;
        self.csrs[regs.cause as usize] = event.cause;
        self.csrs[regs.tval as usize] = event.faulting_address.unwrap_or(0);

        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "Trap to {:?}: mstatus_before={:x}",
                level,
                self.csrs[CSR_MSTATUS as usize]
            );
        }
        // SPP can only hold S or U; a trap delegated to S always comes from below.
        self.csrs.set_previous_privilege(level, event.origin);
        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "Trap to {:?}: mstatus_after={:x}",
                level,
                self.csrs[CSR_MSTATUS as usize]
            );
        }

        self.mode = level;
        self.pc = self.csrs[regs.tvec as usize] & !0b11;
        level
    }

    /// mret/sret: return into the previous privilege at xepc.
    ///
    /// The previous-privilege field is left as written so callers can
    /// observe what the handler requested.
    pub fn trap_return(&mut self, level: Mode) -> (u64, Mode) {
        let regs = TrapCsrs::for_level(level);
        let target = self.csrs.previous_privilege(level);
        self.mode = target;
        self.pc = self.csrs[regs.epc as usize];
        (self.pc, target)
    }
}
