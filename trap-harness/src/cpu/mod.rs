pub mod core;
pub mod csr;
pub mod types;

pub use core::Cpu;
pub use types::{Mode, Register, TrapEvent};
