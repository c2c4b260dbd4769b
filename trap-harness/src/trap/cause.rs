//! Cause classification.
//!
//! The interrupt/exception split decides how much inspection a trap gets:
//! interrupts resume, exceptions go through the behavior table.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cpu::types::CAUSE_INTERRUPT_BIT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrapClass {
    Interrupt,
    Exception,
}

/// Classify a raw cause value by its most significant bit.
#[inline]
pub const fn classify(cause: u64) -> TrapClass {
    if cause & CAUSE_INTERRUPT_BIT != 0 {
        TrapClass::Interrupt
    } else {
        TrapClass::Exception
    }
}

/// Cause code with the interrupt flag stripped.
#[inline]
pub const fn cause_code(cause: u64) -> u64 {
    cause & !CAUSE_INTERRUPT_BIT
}

/// Synchronous exception codes defined by the privileged architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum Exception {
    InstructionAddressMisaligned = 0x0,
    InstructionAccessFault = 0x1,
    IllegalInstruction = 0x2,
    Breakpoint = 0x3,
    LoadAddressMisaligned = 0x4,
    LoadAccessFault = 0x5,
    StoreAddressMisaligned = 0x6,
    StoreAccessFault = 0x7,
    EnvironmentCallFromU = 0x8,
    EnvironmentCallFromS = 0x9,
    EnvironmentCallFromM = 0xB,
    InstructionPageFault = 0xC,
    LoadPageFault = 0xD,
    StorePageFault = 0xF,
}

impl Exception {
    pub fn from_code(code: u64) -> Option<Self> {
        Some(match code {
            0x0 => Exception::InstructionAddressMisaligned,
            0x1 => Exception::InstructionAccessFault,
            0x2 => Exception::IllegalInstruction,
            0x3 => Exception::Breakpoint,
            0x4 => Exception::LoadAddressMisaligned,
            0x5 => Exception::LoadAccessFault,
            0x6 => Exception::StoreAddressMisaligned,
            0x7 => Exception::StoreAccessFault,
            0x8 => Exception::EnvironmentCallFromU,
            0x9 => Exception::EnvironmentCallFromS,
            0xB => Exception::EnvironmentCallFromM,
            0xC => Exception::InstructionPageFault,
            0xD => Exception::LoadPageFault,
            0xF => Exception::StorePageFault,
            _ => return None,
        })
    }
}

/// Interrupt codes defined by the privileged architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum Interrupt {
    SupervisorSoftware = 1,
    MachineSoftware = 3,
    SupervisorTimer = 5,
    MachineTimer = 7,
    SupervisorExternal = 9,
    MachineExternal = 11,
}

impl Interrupt {
    pub fn from_code(code: u64) -> Option<Self> {
        Some(match code {
            1 => Interrupt::SupervisorSoftware,
            3 => Interrupt::MachineSoftware,
            5 => Interrupt::SupervisorTimer,
            7 => Interrupt::MachineTimer,
            9 => Interrupt::SupervisorExternal,
            11 => Interrupt::MachineExternal,
            _ => return None,
        })
    }
}

/// Human-readable cause, for log lines.
pub struct CauseName(pub u64);

impl fmt::Display for CauseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = cause_code(self.0);
        match classify(self.0) {
            TrapClass::Interrupt => match Interrupt::from_code(code) {
                Some(irq) => write!(f, "{:?}Interrupt", irq),
                None => write!(f, "ReservedInterrupt({})", code),
            },
            TrapClass::Exception => match Exception::from_code(code) {
                Some(exc) => write!(f, "{:?}", exc),
                None => write!(f, "ReservedException({})", code),
            },
        }
    }
}
