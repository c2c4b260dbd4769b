use serde::{Deserialize, Serialize};

/// Scratch registers saved on trap entry and restored on return.
///
/// One slot per level: a trap taken while the handler runs would overwrite it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRegisters {
    /// x1 / ra
    pub ra: u64,
    /// x5 / t0
    pub t0: u64,
}

/// Ecall arguments captured from a0..a2 at trap entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcallArgs {
    pub op: u64,
    /// Page base to resume in, 0 for "stay on the trapping page".
    pub target_vpn: u64,
    pub page_type: u64,
}

/// Ecall operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcallOp {
    HaltPass,
    HaltFail,
    GotoMachine,
    GotoSupervisor,
    GotoUser,
}

impl EcallOp {
    pub fn from_code(op: u64) -> Option<Self> {
        Some(match op {
            0 => EcallOp::HaltPass,
            1 => EcallOp::HaltFail,
            2 => EcallOp::GotoMachine,
            3 => EcallOp::GotoSupervisor,
            4 => EcallOp::GotoUser,
            _ => return None,
        })
    }

    pub fn code(self) -> u64 {
        match self {
            EcallOp::HaltPass => 0,
            EcallOp::HaltFail => 1,
            EcallOp::GotoMachine => 2,
            EcallOp::GotoSupervisor => 3,
            EcallOp::GotoUser => 4,
        }
    }
}

/// Per-level handler state, created when the level installs its handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapContext {
    pub saved: SavedRegisters,
    /// Address the last resume returned to.
    pub resume_address: u64,
    /// Arguments for the ecall in flight; `None` once consumed.
    pub pending: Option<EcallArgs>,
    /// Trapping instruction bits, if the event carried them.
    pub instruction: Option<u32>,
    /// Traps taken by this level.
    pub traps_taken: u64,
}

impl TrapContext {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecall_op_codes() {
        for code in 0..5 {
            assert_eq!(EcallOp::from_code(code).map(EcallOp::code), Some(code));
        }
        assert_eq!(EcallOp::from_code(5), None);
        assert_eq!(EcallOp::from_code(u64::MAX), None);
    }

    #[test]
    fn test_new_context_is_neutral() {
        let ctx = TrapContext::new();
        assert_eq!(ctx.pending, None);
        assert_eq!(ctx.saved, SavedRegisters::default());
        assert_eq!(ctx.traps_taken, 0);
    }
}
