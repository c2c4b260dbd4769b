//! Trap dispatch model for a RISC-V privileged-architecture test harness.
//!
//! A [`Harness`] owns one hart, the Machine and Supervisor trap handlers and
//! the result log. Traps are taken one at a time through [`Harness::raise`];
//! the ecall ABI (`a0` op, `a1` target page, `a2` page type) is the only way
//! a test program changes privilege.

pub mod config;
pub mod cpu;
pub mod error;
pub mod harness;
pub mod result_log;
pub mod script;
pub mod snapshot;
pub mod testcase;
pub mod trap;

pub use config::{HarnessConfig, ResumeStep};
pub use cpu::{Cpu, Mode, Register, TrapEvent};
pub use error::HarnessError;
pub use harness::{HaltReason, HandlerState, Harness, TrapOutcome};
pub use result_log::{ByteOrder, CursorView, ResultLog};
pub use trap::{Behavior, EcallOp, PageClass, VectorMode};
