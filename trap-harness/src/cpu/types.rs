use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    User,
    Supervisor,
    Machine,
}

impl Mode {
    /// Encode privilege mode into the MPP field encoding.
    pub fn to_mpp(self) -> u64 {
        match self {
            Mode::User => 0b00,
            Mode::Supervisor => 0b01,
            Mode::Machine => 0b11,
        }
    }

    /// Decode MPP field into a privilege mode.
    pub fn from_mpp(bits: u64) -> Mode {
        match bits & 0b11 {
            0b00 => Mode::User,
            0b01 => Mode::Supervisor,
            // 0b10 is reserved; treat as Machine for WARL coercion.
            _ => Mode::Machine,
        }
    }

    /// Parse the single-letter mode name used in trap scripts.
    pub fn from_letter(c: &str) -> Option<Mode> {
        match c {
            "u" | "U" => Some(Mode::User),
            "s" | "S" => Some(Mode::Supervisor),
            "m" | "M" => Some(Mode::Machine),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    X0,
    X1,
    X2,
    X3,
    X4,
    X5,
    X6,
    X7,
    X8,
    X9,
    X10,
    X11,
    X12,
    X13,
    X14,
    X15,
    X16,
    X17,
    X18,
    X19,
    X20,
    X21,
    X22,
    X23,
    X24,
    X25,
    X26,
    X27,
    X28,
    X29,
    X30,
    X31,
}

impl Register {
    pub fn from_u32(v: u32) -> Self {
        match v & 0x1F {
            0 => Register::X0,
            1 => Register::X1,
            2 => Register::X2,
            3 => Register::X3,
            4 => Register::X4,
            5 => Register::X5,
            6 => Register::X6,
            7 => Register::X7,
            8 => Register::X8,
            9 => Register::X9,
            10 => Register::X10,
            11 => Register::X11,
            12 => Register::X12,
            13 => Register::X13,
            14 => Register::X14,
            15 => Register::X15,
            16 => Register::X16,
            17 => Register::X17,
            18 => Register::X18,
            19 => Register::X19,
            20 => Register::X20,
            21 => Register::X21,
            22 => Register::X22,
            23 => Register::X23,
            24 => Register::X24,
            25 => Register::X25,
            26 => Register::X26,
            27 => Register::X27,
            28 => Register::X28,
            29 => Register::X29,
            30 => Register::X30,
            _ => Register::X31,
        }
    }

    pub fn to_usize(self) -> usize {
        self as usize
    }
}

/// Return address, saved across every trap.
pub const REG_RA: Register = Register::X1;
/// Scratch register the handler borrows, saved across every trap.
pub const REG_T0: Register = Register::X5;
/// Ecall operation code.
pub const REG_A0: Register = Register::X10;
/// Ecall target VPN, also the failure payload for halt-fail.
pub const REG_A1: Register = Register::X11;
/// Ecall page type code.
pub const REG_A2: Register = Register::X12;

/// Interrupt flag in a raw cause value.
pub const CAUSE_INTERRUPT_BIT: u64 = 1 << 63;

/// A synchronous trap raised while executing at `origin`.
///
/// Consumed exactly once by [`crate::Harness::raise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapEvent {
    /// Raw cause value; bit 63 marks an interrupt.
    pub cause: u64,
    /// Faulting address reported through xtval, if any.
    pub faulting_address: Option<u64>,
    /// Privilege level the trap was taken from.
    pub origin: Mode,
    /// Address of the trapping instruction.
    pub pc: u64,
    /// Raw bits of the trapping instruction, when the raiser knows them.
    pub instruction: Option<u32>,
}

impl TrapEvent {
    pub fn exception(code: u64, origin: Mode, pc: u64) -> Self {
        Self {
            cause: code & !CAUSE_INTERRUPT_BIT,
            faulting_address: None,
            origin,
            pc,
            instruction: None,
        }
    }

    pub fn interrupt(code: u64, origin: Mode, pc: u64) -> Self {
        Self {
            cause: code | CAUSE_INTERRUPT_BIT,
            faulting_address: None,
            origin,
            pc,
            instruction: None,
        }
    }

    /// Environment call from `origin`, using the cause code the
    /// privileged architecture assigns to that mode.
    pub fn ecall(origin: Mode, pc: u64) -> Self {
        let code = match origin {
            Mode::User => 8,
            Mode::Supervisor => 9,
            Mode::Machine => 11,
        };
        let mut event = Self::exception(code, origin, pc);
        event.instruction = Some(ECALL_INSN);
        event
    }

    pub fn with_address(mut self, addr: u64) -> Self {
        self.faulting_address = Some(addr);
        self
    }

    pub fn with_instruction(mut self, insn: u32) -> Self {
        self.instruction = Some(insn);
        self
    }
}

/// Encoding of `ecall`.
pub const ECALL_INSN: u32 = 0x0000_0073;
