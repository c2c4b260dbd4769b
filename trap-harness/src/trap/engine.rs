//! Trap return path: return-address computation, optional relocation into a
//! new page, scratch restore and xret.

use crate::cpu::Mode;
use crate::cpu::csr::TrapCsrs;
use crate::cpu::types::{REG_A1, REG_A2, REG_RA, REG_T0};
use crate::harness::{HandlerState, Harness, TrapOutcome};
use crate::result_log::CursorView;
use crate::trap::context::SavedRegisters;
use crate::trap::geometry::PageClass;

/// Request to resume in another page of the given size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    /// New page base; 0 means no relocation.
    pub target_vpn: u64,
    pub page_type: u64,
}

impl Harness {
    /// Resume after the trapping instruction, optionally relocated.
    pub(crate) fn resume(&mut self, level: Mode, relocation: Option<Relocation>) -> TrapOutcome {
        self.state = HandlerState::Resuming(level);
        let epc = self.cpu.read_csr(TrapCsrs::for_level(level).epc);
        let instruction = self.context_mut(level).instruction;
        let mut return_address = epc.wrapping_add(self.config.resume_step.length(instruction));

        if let Some(relocation) = relocation.filter(|r| r.target_vpn != 0) {
            return_address = self.relocate(level, relocation, return_address);
        }
        self.finish(level, return_address)
    }

    /// Move every tracked address into the target page. All new values are
    /// computed before any is stored.
    fn relocate(&mut self, level: Mode, relocation: Relocation, return_address: u64) -> u64 {
        let vpn = relocation.target_vpn;
        let relocated = match PageClass::from_code(relocation.page_type) {
            Some(class) => {
                let saved = self.context_mut(level).saved;
                let ra = class.relocate(saved.ra, vpn);
                let t0 = class.relocate(saved.t0, vpn);
                let cursor = class.relocate(self.log.cursor(CursorView::Virtual), vpn);
                let ret = class.relocate(return_address, vpn);

                self.context_mut(level).saved = SavedRegisters { ra, t0 };
                self.log.rebase_virtual(cursor);
                log::debug!(
                    "Relocated into {:?} page {:#x}: ret={:#x} ra={:#x} t0={:#x} log={:#x}",
                    class,
                    vpn,
                    ret,
                    ra,
                    t0,
                    cursor
                );
                ret
            }
            None => {
                log::warn!(
                    "Unknown page type {}; resuming without relocation",
                    relocation.page_type
                );
                return_address
            }
        };

        self.context_mut(level).pending = None;
        self.cpu.write_reg(REG_A1, 0);
        self.cpu.write_reg(REG_A2, 0);
        relocated
    }

    /// Store the return address, restore scratch registers and xret.
    pub(crate) fn finish(&mut self, level: Mode, return_address: u64) -> TrapOutcome {
        self.state = HandlerState::Resuming(level);
        self.cpu.write_csr(TrapCsrs::for_level(level).epc, return_address);

        let ctx = self.context_mut(level);
        ctx.resume_address = return_address;
        let saved = ctx.saved;
        self.cpu.write_reg(REG_RA, saved.ra);
        self.cpu.write_reg(REG_T0, saved.t0);

        let (pc, mode) = self.cpu.trap_return(level);
        self.state = HandlerState::Idle;
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("{:?} handler returned to {:?} at {:#x}", level, mode, pc);
        }
        TrapOutcome::Resumed { pc, mode }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::HarnessConfig;
    use crate::cpu::csr::CSR_MEPC;
    use crate::cpu::types::{REG_A1, REG_A2, REG_RA, REG_T0};
    use crate::cpu::Mode;
    use crate::harness::{Harness, TrapOutcome};
    use crate::result_log::CursorView;
    use crate::trap::context::EcallOp;
    use crate::trap::vector::VectorMode;

    const LOG_BASE: u64 = 0x8000_2000;

    fn make_harness(pc: u64) -> Harness {
        let config = HarnessConfig {
            entry_pc: pc,
            ..HarnessConfig::default()
        };
        let mut harness = Harness::new(config);
        harness
            .install_handler(Mode::Machine, 0x8000_0100, VectorMode::Vectored)
            .unwrap();
        harness
    }

    #[test]
    fn test_kilo_relocation_moves_all_addresses() {
        let mut harness = make_harness(0x0000_0012_3456_0ABC);
        harness.cpu.write_reg(REG_RA, 0x0000_0012_3456_0100);
        harness.cpu.write_reg(REG_T0, 0x0000_0012_3456_0200);
        harness.log.append(0x1).unwrap();

        let vpn = 0x0000_00AA_BBCC_0000;
        let outcome = harness
            .ecall(EcallOp::GotoSupervisor.code(), vpn, 0)
            .unwrap();
        assert_eq!(
            outcome,
            TrapOutcome::Resumed {
                pc: 0x0000_00AA_BBCC_0AC0,
                mode: Mode::Supervisor
            }
        );
        assert_eq!(harness.cpu.read_reg(REG_RA), 0x0000_00AA_BBCC_0100);
        assert_eq!(harness.cpu.read_reg(REG_T0), 0x0000_00AA_BBCC_0200);
        assert_eq!(harness.log.cursor(CursorView::Virtual), 0x0000_00AA_BBCC_0008);
        assert_eq!(harness.log.cursor(CursorView::Physical), LOG_BASE + 8);
        assert_eq!(harness.cpu.read_reg(REG_A1), 0);
        assert_eq!(harness.cpu.read_reg(REG_A2), 0);
        assert_eq!(harness.context(Mode::Machine).unwrap().pending, None);
    }

    #[test]
    fn test_relocation_for_each_page_class() {
        let addr = 0x0000_0012_3456_0ABC;
        let vpn = 0x0000_0080_0000_0000;
        for (page_type, bits) in [(0u64, 12u32), (1, 21), (2, 30), (3, 39)] {
            let mut harness = make_harness(addr);
            harness.cpu.write_reg(REG_RA, addr);
            harness.ecall(EcallOp::GotoUser.code(), vpn, page_type).unwrap();

            let mask = (1u64 << bits) - 1;
            assert_eq!(harness.cpu.read_reg(REG_RA), (addr & mask) | vpn);
            assert_eq!(harness.cpu.pc, ((addr + 4) & mask) | vpn);
            assert_eq!(harness.cpu.read_csr(CSR_MEPC), harness.cpu.pc);
            assert_eq!(harness.cpu.mode, Mode::User);
        }
    }

    #[test]
    fn test_zero_vpn_leaves_addresses_alone() {
        let mut harness = make_harness(0x8000_0400);
        harness.cpu.write_reg(REG_RA, 0x8000_0500);
        harness.cpu.write_reg(REG_T0, 0x8000_0600);
        harness.log.append(7).unwrap();
        let cursor = harness.log.cursor(CursorView::Virtual);

        harness.ecall(EcallOp::GotoUser.code(), 0, 1).unwrap();
        assert_eq!(harness.cpu.read_reg(REG_RA), 0x8000_0500);
        assert_eq!(harness.cpu.read_reg(REG_T0), 0x8000_0600);
        assert_eq!(harness.log.cursor(CursorView::Virtual), cursor);
        assert_eq!(harness.cpu.pc, 0x8000_0404);
        // Arguments were not consumed.
        assert_eq!(harness.cpu.read_reg(REG_A2), 1);
    }

    #[test]
    fn test_unknown_page_type_skips_relocation() {
        let mut harness = make_harness(0x8000_0400);
        harness.cpu.write_reg(REG_RA, 0x8000_0500);
        let cursor = harness.log.cursor(CursorView::Virtual);

        harness
            .ecall(EcallOp::GotoSupervisor.code(), 0x4000_0000, 9)
            .unwrap();
        assert_eq!(harness.cpu.read_reg(REG_RA), 0x8000_0500);
        assert_eq!(harness.log.cursor(CursorView::Virtual), cursor);
        assert_eq!(harness.cpu.pc, 0x8000_0404);
        assert_eq!(harness.cpu.mode, Mode::Supervisor);
        assert_eq!(harness.cpu.read_reg(REG_A1), 0);
    }

    #[test]
    fn test_decode_length_step() {
        use crate::config::ResumeStep;
        use crate::cpu::TrapEvent;

        let config = HarnessConfig {
            resume_step: ResumeStep::DecodeLength,
            ..HarnessConfig::default()
        };
        let mut harness = Harness::new(config);
        harness
            .install_handler(Mode::Machine, 0x8000_0100, VectorMode::Direct)
            .unwrap();
        // c.lw faulting on a load page fault
        let event = TrapEvent::exception(13, Mode::Machine, 0x8000_0010).with_instruction(0x4188);
        let outcome = harness.raise(event).unwrap();
        assert_eq!(
            outcome,
            TrapOutcome::Resumed {
                pc: 0x8000_0012,
                mode: Mode::Machine
            }
        );
    }
}
