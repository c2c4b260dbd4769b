use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::HarnessConfig;
use crate::cpu::csr::{CSR_MEDELEG, CSR_MIDELEG, CSR_MTVEC, TrapCsrs};
use crate::cpu::types::{REG_A0, REG_A1, REG_A2, REG_RA, REG_T0};
use crate::cpu::{Cpu, Mode, TrapEvent};
use crate::error::HarnessError;
use crate::result_log::ResultLog;
use crate::snapshot::{CpuSnapshot, HarnessSnapshot, LogSnapshot, SNAPSHOT_VERSION};
use crate::trap::cause::CauseName;
use crate::trap::context::{EcallArgs, EcallOp, SavedRegisters, TrapContext};
use crate::trap::vector::{self, VectorMode};

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltReason {
    /// Halt requested through the ecall ABI (op 0) or a terminate case.
    Pass,
    /// Halt-with-failure requested through the ecall ABI (op 1).
    Fail(u64),
    /// Unexpected trap; the payload is the raw cause.
    Fatal(u64),
}

impl HaltReason {
    /// Value handed to the surrounding framework at halt.
    pub fn payload(self) -> u64 {
        match self {
            HaltReason::Pass => 0,
            HaltReason::Fail(code) | HaltReason::Fatal(code) => code,
        }
    }
}

/// Trap handler state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlerState {
    /// Running the interrupted program.
    Idle,
    /// A handler at this level owns the trap.
    Dispatched(Mode),
    /// The handler at this level is returning.
    Resuming(Mode),
    Halted(HaltReason),
}

/// Result of handling one trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    Resumed { pc: u64, mode: Mode },
    Halted(HaltReason),
}

/// High-level wrapper that owns the hart, its trap handlers and the result
/// log, and takes traps one at a time.
///
/// ```ignore
/// let mut harness = Harness::new(HarnessConfig::default());
/// harness.install_handler(Mode::Machine, 0x8000_0100, VectorMode::Vectored)?;
/// harness.ecall(EcallOp::GotoUser.code(), 0, 0)?;
/// ```
pub struct Harness {
    /// Architectural state of the hart.
    pub cpu: Cpu,
    /// Result region shared by the program and its handlers.
    pub log: ResultLog,

    pub(crate) config: HarnessConfig,
    /// Handler contexts, Machine then Supervisor.
    pub(crate) contexts: [Option<TrapContext>; 2],
    pub(crate) state: HandlerState,
    /// mtvec found when the Machine handler was installed.
    pub(crate) default_handler: u64,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        let log = ResultLog::new(
            config.virtual_log_base,
            config.physical_log_base,
            config.log_capacity,
        );
        Self {
            cpu: Cpu::new(config.entry_pc),
            log,
            config,
            contexts: [None, None],
            state: HandlerState::Idle,
            default_handler: 0,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        matches!(self.state, HandlerState::Halted(_))
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        match self.state {
            HandlerState::Halted(reason) => Some(reason),
            _ => None,
        }
    }

    /// Halt payload, 0 while running.
    pub fn halt_code(&self) -> u64 {
        self.halt_reason().map_or(0, HaltReason::payload)
    }

    /// Handler context of `level`, if that level installed a handler.
    pub fn context(&self, level: Mode) -> Option<&TrapContext> {
        let slot = context_slot(level).ok()?;
        self.contexts[slot].as_ref()
    }

    pub(crate) fn context_mut(&mut self, level: Mode) -> &mut TrapContext {
        let slot = if level == Mode::Machine { 0 } else { 1 };
        self.contexts[slot].get_or_insert_with(TrapContext::new)
    }

    /// Point `level`'s tvec at `base` and create its trap context.
    ///
    /// Installing the Machine handler remembers the previous mtvec so
    /// [`Harness::terminate`] can restore it.
    pub fn install_handler(
        &mut self,
        level: Mode,
        base: u64,
        vector: VectorMode,
    ) -> Result<(), HarnessError> {
        let slot = context_slot(level)?;
        let tvec = (base & !0b11) | vector.tvec_bits();
        if level == Mode::Machine {
            self.default_handler = self.cpu.read_csr(CSR_MTVEC);
        }
        self.cpu.write_csr(TrapCsrs::for_level(level).tvec, tvec);
        self.contexts[slot] = Some(TrapContext::new());

        // Handler inputs start out neutral.
        self.cpu.write_reg(REG_A0, 0);
        self.cpu.write_reg(REG_A1, 0);
        self.cpu.write_reg(REG_A2, 0);

        log::debug!("Installed {:?} handler at {:#x} ({:?})", level, base, vector);
        Ok(())
    }

    /// Set the exception and interrupt delegation masks.
    pub fn set_delegation(&mut self, medeleg: u64, mideleg: u64) {
        self.cpu.write_csr(CSR_MEDELEG, medeleg);
        self.cpu.write_csr(CSR_MIDELEG, mideleg);
    }

    /// Take one trap: classify, dispatch, run the selected behavior.
    pub fn raise(&mut self, event: TrapEvent) -> Result<TrapOutcome, HarnessError> {
        match self.state {
            HandlerState::Idle => {}
            HandlerState::Halted(_) => return Err(HarnessError::Halted),
            HandlerState::Dispatched(level) | HandlerState::Resuming(level) => {
                return Err(HarnessError::NestedTrap(level));
            }
        }

        let level = self.cpu.trap_target(&event);
        if self.context(level).is_none() {
            return Err(HarnessError::NoHandler(level));
        }
        if self.config.record_causes {
            // Written through the handler's physical pointer.
            self.log.append(event.cause)?;
        }

        self.cpu.enter_trap(&event);
        self.state = HandlerState::Dispatched(level);

        let saved = SavedRegisters {
            ra: self.cpu.read_reg(REG_RA),
            t0: self.cpu.read_reg(REG_T0),
        };
        let args = EcallArgs {
            op: self.cpu.read_reg(REG_A0),
            target_vpn: self.cpu.read_reg(REG_A1),
            page_type: self.cpu.read_reg(REG_A2),
        };
        let ctx = self.context_mut(level);
        ctx.saved = saved;
        ctx.pending = Some(args);
        ctx.instruction = event.instruction;
        ctx.traps_taken += 1;

        let tvec = self.cpu.read_csr(TrapCsrs::for_level(level).tvec);
        let behavior = vector::dispatch(event.cause, VectorMode::from_tvec(tvec));
        log::debug!(
            "{} at {:#x} from {:?}, {:?} handler: {:?}",
            CauseName(event.cause),
            event.pc,
            event.origin,
            level,
            behavior
        );

        Ok(self.run_behavior(level, behavior, &event))
    }

    /// Issue the ecall ABI from the current mode and pc.
    pub fn ecall(&mut self, op: u64, target_vpn: u64, page_type: u64) -> Result<TrapOutcome, HarnessError> {
        self.cpu.write_reg(REG_A0, op);
        self.cpu.write_reg(REG_A1, target_vpn);
        self.cpu.write_reg(REG_A2, page_type);
        let event = TrapEvent::ecall(self.cpu.mode, self.cpu.pc);
        self.raise(event)
    }

    /// End the run: return to Machine mode, restore the default handler, halt.
    pub fn terminate(&mut self) -> Result<TrapOutcome, HarnessError> {
        let outcome = self.ecall(EcallOp::GotoMachine.code(), 0, 0)?;
        if let TrapOutcome::Halted(_) = outcome {
            return Ok(outcome);
        }
        self.cpu.write_csr(CSR_MTVEC, self.default_handler);
        self.state = HandlerState::Halted(HaltReason::Pass);
        log::info!("Run terminated in {:?} mode", self.cpu.mode);
        Ok(TrapOutcome::Halted(HaltReason::Pass))
    }

    /// Capture the complete harness state.
    pub fn snapshot(&self) -> HarnessSnapshot {
        let cpu = CpuSnapshot {
            pc: self.cpu.pc,
            mode: self.cpu.mode,
            regs: self.cpu.regs,
            csrs: self.cpu.export_csrs(),
        };

        let log = LogSnapshot {
            virtual_base: self.log.virtual_base(),
            physical_base: self.log.physical_base(),
            capacity: self.log.capacity(),
            hash: log_digest(self.log.words()),
            words: self.log.words().to_vec(),
        };

        HarnessSnapshot {
            version: SNAPSHOT_VERSION.to_string(),
            config: self.config.clone(),
            cpu,
            contexts: self.contexts,
            state: self.state,
            default_handler: self.default_handler,
            log,
        }
    }

    /// Construct a harness from a snapshot, checking version, log digest and
    /// log size.
    pub fn from_snapshot(snapshot: HarnessSnapshot) -> Result<Self, HarnessError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(HarnessError::SnapshotVersion {
                expected: SNAPSHOT_VERSION.to_string(),
                found: snapshot.version,
            });
        }
        if log_digest(&snapshot.log.words) != snapshot.log.hash {
            return Err(HarnessError::SnapshotDigest);
        }
        if snapshot.log.words.len() > snapshot.log.capacity {
            return Err(HarnessError::SnapshotLogOverflow {
                words: snapshot.log.words.len(),
                capacity: snapshot.log.capacity,
            });
        }

        let mut harness = Harness::new(snapshot.config);
        harness.cpu.pc = snapshot.cpu.pc;
        harness.cpu.mode = snapshot.cpu.mode;
        harness.cpu.regs = snapshot.cpu.regs;
        harness.cpu.import_csrs(&snapshot.cpu.csrs);
        harness.contexts = snapshot.contexts;
        harness.state = snapshot.state;
        harness.default_handler = snapshot.default_handler;
        harness.log = ResultLog::from_parts(
            snapshot.log.words,
            snapshot.log.capacity,
            snapshot.log.virtual_base,
            snapshot.log.physical_base,
        );
        Ok(harness)
    }

    /// Save a snapshot to disk using bincode.
    pub fn save_snapshot_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), HarnessError> {
        let snap = self.snapshot();
        let mut file = File::create(path)?;
        bincode::serialize_into(&mut file, &snap)?;
        file.flush()?;
        Ok(())
    }

    /// Load a snapshot from disk and construct a new harness.
    pub fn load_snapshot_from_path<P: AsRef<Path>>(path: P) -> Result<Self, HarnessError> {
        let file = File::open(path)?;
        let snapshot: HarnessSnapshot = bincode::deserialize_from(file)?;
        Harness::from_snapshot(snapshot)
    }
}

fn context_slot(level: Mode) -> Result<usize, HarnessError> {
    match level {
        Mode::Machine => Ok(0),
        Mode::Supervisor => Ok(1),
        Mode::User => Err(HarnessError::InvalidHandlerLevel(level)),
    }
}

fn log_digest(words: &[u64]) -> String {
    let mut hasher = Sha256::new();
    for word in words {
        hasher.update(word.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::csr::{CSR_MCAUSE, CSR_MEPC, CSR_MSTATUS, CSR_SCAUSE, CSR_SEPC, MSTATUS_MPP};
    use crate::result_log::CursorView;

    const HANDLER: u64 = 0x8000_0100;

    fn make_harness() -> Harness {
        let mut harness = Harness::new(HarnessConfig::default());
        harness
            .install_handler(Mode::Machine, HANDLER, VectorMode::Vectored)
            .unwrap();
        harness
    }

    #[test]
    fn test_install_handler_sets_tvec_and_default() {
        let mut harness = Harness::new(HarnessConfig::default());
        harness.cpu.write_csr(CSR_MTVEC, 0x8000_0004);
        harness
            .install_handler(Mode::Machine, HANDLER, VectorMode::Vectored)
            .unwrap();
        assert_eq!(harness.cpu.read_csr(CSR_MTVEC), HANDLER | 1);
        assert_eq!(harness.default_handler, 0x8000_0004);
        assert!(harness.context(Mode::Machine).is_some());
        assert!(harness.context(Mode::Supervisor).is_none());
    }

    #[test]
    fn test_user_cannot_install_handler() {
        let mut harness = Harness::new(HarnessConfig::default());
        assert!(matches!(
            harness.install_handler(Mode::User, HANDLER, VectorMode::Direct),
            Err(HarnessError::InvalidHandlerLevel(Mode::User))
        ));
    }

    #[test]
    fn test_raise_without_handler() {
        let mut harness = Harness::new(HarnessConfig::default());
        let event = TrapEvent::exception(13, Mode::Machine, 0x8000_0000);
        assert!(matches!(
            harness.raise(event),
            Err(HarnessError::NoHandler(Mode::Machine))
        ));
        assert_eq!(harness.state(), HandlerState::Idle);
    }

    #[test]
    fn test_interrupt_resumes_without_log_write() {
        let mut harness = make_harness();
        let event = TrapEvent::interrupt(5, Mode::Machine, 0x8000_0010);
        assert_eq!(event.cause, 0x8000_0000_0000_0005);

        let outcome = harness.raise(event).unwrap();
        assert_eq!(
            outcome,
            TrapOutcome::Resumed {
                pc: 0x8000_0014,
                mode: Mode::Machine
            }
        );
        assert_eq!(harness.state(), HandlerState::Idle);
        assert!(harness.log.is_empty());
    }

    #[test]
    fn test_ecall_from_supervisor_to_user() {
        let mut harness = make_harness();
        harness.cpu.mode = Mode::Supervisor;
        harness.cpu.pc = 0x8000_0200;
        harness.cpu.write_csr(CSR_MSTATUS, 0xA | (1 << 18));

        let outcome = harness.ecall(EcallOp::GotoUser.code(), 0, 0).unwrap();
        assert_eq!(
            outcome,
            TrapOutcome::Resumed {
                pc: 0x8000_0204,
                mode: Mode::User
            }
        );
        assert_eq!(harness.cpu.read_csr(CSR_MCAUSE), 9);
        assert_eq!(harness.cpu.read_csr(CSR_MEPC), 0x8000_0204);
        let mstatus = harness.cpu.read_csr(CSR_MSTATUS);
        assert_eq!(mstatus & MSTATUS_MPP, 0);
        assert_eq!(mstatus & !MSTATUS_MPP, 0xA | (1 << 18));
    }

    #[test]
    fn test_ecall_mode_changes_touch_only_mpp() {
        for (op, target) in [
            (EcallOp::GotoMachine, Mode::Machine),
            (EcallOp::GotoSupervisor, Mode::Supervisor),
            (EcallOp::GotoUser, Mode::User),
        ] {
            let mut harness = make_harness();
            harness.cpu.write_csr(CSR_MSTATUS, 0x0000_000A_0000_0088);
            let outcome = harness.ecall(op.code(), 0, 0).unwrap();
            assert_eq!(
                outcome,
                TrapOutcome::Resumed {
                    pc: harness.config.entry_pc + 4,
                    mode: target
                }
            );
            let mstatus = harness.cpu.read_csr(CSR_MSTATUS);
            assert_eq!(Mode::from_mpp(mstatus >> 11), target);
            assert_eq!(mstatus & !MSTATUS_MPP, 0x0000_000A_0000_0088);
        }
    }

    #[test]
    fn test_reserved_exception_halts_with_cause() {
        let mut harness = make_harness();
        let outcome = harness
            .raise(TrapEvent::exception(10, Mode::Machine, 0x8000_0000))
            .unwrap();
        assert_eq!(outcome, TrapOutcome::Halted(HaltReason::Fatal(10)));
        assert_eq!(harness.state(), HandlerState::Halted(HaltReason::Fatal(10)));
        assert_eq!(harness.halt_code(), 10);

        assert!(matches!(
            harness.raise(TrapEvent::exception(13, Mode::Machine, 0)),
            Err(HarnessError::Halted)
        ));
    }

    #[test]
    fn test_undefined_codes_halt_with_raw_cause() {
        for code in [0u64, 3, 4, 6, 10, 14, 16, 0x3F] {
            let mut harness = make_harness();
            let outcome = harness
                .raise(TrapEvent::exception(code, Mode::Machine, 0x8000_0000))
                .unwrap();
            assert_eq!(outcome, TrapOutcome::Halted(HaltReason::Fatal(code)));
        }
        let mut harness = make_harness();
        let cause = (1 << 63) | 2;
        let outcome = harness
            .raise(TrapEvent::interrupt(2, Mode::Machine, 0))
            .unwrap();
        assert_eq!(outcome, TrapOutcome::Halted(HaltReason::Fatal(cause)));
    }

    #[test]
    fn test_halt_ops() {
        let mut harness = make_harness();
        assert_eq!(
            harness.ecall(EcallOp::HaltPass.code(), 0, 0).unwrap(),
            TrapOutcome::Halted(HaltReason::Pass)
        );

        let mut harness = make_harness();
        assert_eq!(
            harness.ecall(EcallOp::HaltFail.code(), 0x42, 0).unwrap(),
            TrapOutcome::Halted(HaltReason::Fail(0x42))
        );
        assert_eq!(harness.halt_code(), 0x42);
    }

    #[test]
    fn test_unknown_ecall_op_is_ignored() {
        let mut harness = make_harness();
        harness.cpu.write_csr(CSR_MSTATUS, 0b01 << 11);
        let outcome = harness.ecall(7, 0x4000_0000, 0).unwrap();
        assert_eq!(
            outcome,
            TrapOutcome::Resumed {
                pc: harness.config.entry_pc + 4,
                mode: Mode::Machine
            }
        );
        // MPP was rewritten by trap entry (origin Machine) and left alone afterwards.
        assert_eq!(harness.cpu.read_csr(CSR_MSTATUS), 0b11 << 11);
        assert_eq!(harness.log.cursor(CursorView::Virtual), harness.config.virtual_log_base);
        assert_eq!(harness.state(), HandlerState::Idle);
    }

    #[test]
    fn test_record_causes() {
        let config = HarnessConfig {
            record_causes: true,
            ..HarnessConfig::default()
        };
        let mut harness = Harness::new(config);
        harness
            .install_handler(Mode::Machine, HANDLER, VectorMode::Direct)
            .unwrap();
        harness
            .raise(TrapEvent::exception(13, Mode::Machine, 0x8000_0000))
            .unwrap();
        harness.ecall(EcallOp::GotoSupervisor.code(), 0, 0).unwrap();
        harness.ecall(EcallOp::GotoUser.code(), 0, 0).unwrap();
        assert_eq!(harness.log.words(), &[0xd, 0xb, 0x9]);
        assert_eq!(harness.cpu.mode, Mode::User);
    }

    #[test]
    fn test_delegated_ecall_uses_supervisor_context() {
        let mut harness = make_harness();
        harness
            .install_handler(Mode::Supervisor, 0x8000_0300, VectorMode::Direct)
            .unwrap();
        harness.set_delegation(1 << 8, 0);
        harness.cpu.mode = Mode::User;
        harness.cpu.pc = 0x1000;

        let outcome = harness.ecall(EcallOp::GotoSupervisor.code(), 0, 0).unwrap();
        assert_eq!(
            outcome,
            TrapOutcome::Resumed {
                pc: 0x1004,
                mode: Mode::Supervisor
            }
        );
        assert_eq!(harness.cpu.read_csr(CSR_SEPC), 0x1004);
        assert_eq!(harness.context(Mode::Supervisor).unwrap().traps_taken, 1);
        assert_eq!(harness.context(Mode::Machine).unwrap().traps_taken, 0);
    }

    #[test]
    fn test_terminate_restores_default_handler() {
        let mut harness = Harness::new(HarnessConfig::default());
        harness.cpu.write_csr(CSR_MTVEC, 0x8000_0004);
        harness
            .install_handler(Mode::Machine, HANDLER, VectorMode::Vectored)
            .unwrap();
        harness.cpu.mode = Mode::User;

        let outcome = harness.terminate().unwrap();
        assert_eq!(outcome, TrapOutcome::Halted(HaltReason::Pass));
        assert_eq!(harness.cpu.mode, Mode::Machine);
        assert_eq!(harness.cpu.read_csr(CSR_MTVEC), 0x8000_0004);
        assert!(harness.is_halted());
    }

    #[test]
    fn test_snapshot_roundtrip_preserves_state() {
        let mut harness = make_harness();
        harness.cpu.write_reg(REG_T0, 0xdead_beef_dead_beef);
        harness.log.append(0x111).unwrap();
        harness.ecall(EcallOp::GotoSupervisor.code(), 0, 0).unwrap();

        let snap = harness.snapshot();
        let bytes = bincode::serialize(&snap).unwrap();
        let snap2: HarnessSnapshot = bincode::deserialize(&bytes).unwrap();
        let restored = Harness::from_snapshot(snap2).unwrap();

        assert_eq!(restored.cpu.pc, harness.cpu.pc);
        assert_eq!(restored.cpu.mode, Mode::Supervisor);
        assert_eq!(restored.cpu.read_reg(REG_T0), 0xdead_beef_dead_beef);
        assert_eq!(restored.cpu.read_csr(CSR_MTVEC), HANDLER | 1);
        assert_eq!(restored.log, harness.log);
        assert_eq!(restored.context(Mode::Machine), harness.context(Mode::Machine));
        assert_eq!(restored.state(), HandlerState::Idle);
    }

    #[test]
    fn test_snapshot_digest_mismatch() {
        let mut harness = make_harness();
        harness.log.append(1).unwrap();
        let mut snap = harness.snapshot();
        snap.log.words[0] = 2;
        assert!(matches!(
            Harness::from_snapshot(snap),
            Err(HarnessError::SnapshotDigest)
        ));
    }

    #[test]
    fn test_snapshot_log_over_capacity() {
        let mut harness = make_harness();
        harness.log.append(1).unwrap();
        harness.log.append(2).unwrap();
        let mut snap = harness.snapshot();
        snap.log.capacity = 1;
        assert!(matches!(
            Harness::from_snapshot(snap),
            Err(HarnessError::SnapshotLogOverflow {
                words: 2,
                capacity: 1
            })
        ));
    }

    #[test]
    fn test_delegated_interrupt_goes_to_supervisor() {
        let mut harness = make_harness();
        harness
            .install_handler(Mode::Supervisor, 0x8000_0300, VectorMode::Direct)
            .unwrap();
        harness.set_delegation(0, 1 << 5);
        harness.cpu.mode = Mode::User;
        harness.cpu.pc = 0x2000;

        let outcome = harness
            .raise(TrapEvent::interrupt(5, Mode::User, 0x2000))
            .unwrap();
        assert_eq!(
            outcome,
            TrapOutcome::Resumed {
                pc: 0x2004,
                mode: Mode::User
            }
        );
        assert_eq!(harness.cpu.read_csr(CSR_SCAUSE), (1 << 63) | 5);
        assert_eq!(harness.cpu.read_csr(CSR_SEPC), 0x2004);
        assert_eq!(harness.cpu.read_csr(CSR_MCAUSE), 0);
        assert_eq!(harness.cpu.read_csr(CSR_MEPC), 0);
        assert_eq!(harness.context(Mode::Supervisor).unwrap().traps_taken, 1);
        assert_eq!(harness.context(Mode::Machine).unwrap().traps_taken, 0);
    }

    #[test]
    fn test_machine_interrupt_ignores_mideleg() {
        let mut harness = make_harness();
        harness
            .install_handler(Mode::Supervisor, 0x8000_0300, VectorMode::Direct)
            .unwrap();
        harness.set_delegation(0, 1 << 5);
        harness.cpu.pc = 0x8000_0040;

        let outcome = harness
            .raise(TrapEvent::interrupt(5, Mode::Machine, 0x8000_0040))
            .unwrap();
        assert_eq!(
            outcome,
            TrapOutcome::Resumed {
                pc: 0x8000_0044,
                mode: Mode::Machine
            }
        );
        assert_eq!(harness.cpu.read_csr(CSR_MCAUSE), (1 << 63) | 5);
        assert_eq!(harness.cpu.read_csr(CSR_SCAUSE), 0);
        assert_eq!(harness.context(Mode::Supervisor).unwrap().traps_taken, 0);
    }
}
