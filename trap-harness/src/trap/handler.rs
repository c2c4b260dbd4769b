//! Behavior execution for a dispatched trap.

use crate::cpu::{Mode, TrapEvent};
use crate::harness::{HaltReason, HandlerState, Harness, TrapOutcome};
use crate::trap::cause::CauseName;
use crate::trap::context::EcallOp;
use crate::trap::engine::Relocation;
use crate::trap::vector::Behavior;

impl Harness {
    pub(crate) fn run_behavior(&mut self, level: Mode, behavior: Behavior, event: &TrapEvent) -> TrapOutcome {
        match behavior {
            Behavior::Fatal => {
                log::info!(
                    "Unexpected {} at {:#x}; halting",
                    CauseName(event.cause),
                    event.pc
                );
                self.halt(HaltReason::Fatal(event.cause))
            }
            Behavior::PlainResume => self.resume(level, None),
            Behavior::ResumeAfterAdjust => {
                let ra = self.context_mut(level).saved.ra;
                self.finish(level, ra)
            }
            Behavior::Ecall => self.handle_ecall(level),
        }
    }

    fn handle_ecall(&mut self, level: Mode) -> TrapOutcome {
        let Some(args) = self.context_mut(level).pending else {
            return self.resume(level, None);
        };

        let target = match EcallOp::from_code(args.op) {
            Some(EcallOp::HaltPass) => return self.halt(HaltReason::Pass),
            Some(EcallOp::HaltFail) => return self.halt(HaltReason::Fail(args.target_vpn)),
            Some(EcallOp::GotoMachine) => Mode::Machine,
            Some(EcallOp::GotoSupervisor) => Mode::Supervisor,
            Some(EcallOp::GotoUser) => Mode::User,
            None => {
                log::warn!("Ignoring unsupported ecall op {:#x}", args.op);
                return self.resume(level, None);
            }
        };

        if !self.cpu.csrs.set_previous_privilege(level, target) {
            log::warn!(
                "{:?} handler cannot return to {:?}; previous privilege unchanged",
                level,
                target
            );
        }
        self.resume(
            level,
            Some(Relocation {
                target_vpn: args.target_vpn,
                page_type: args.page_type,
            }),
        )
    }

    fn halt(&mut self, reason: HaltReason) -> TrapOutcome {
        self.state = HandlerState::Halted(reason);
        log::debug!("Halted: {:?}", reason);
        TrapOutcome::Halted(reason)
    }
}
