//! Trap classification, dispatch and return.

pub mod cause;
pub mod context;
pub mod engine;
pub mod geometry;
pub mod handler;
pub mod vector;

pub use cause::{CauseName, TrapClass};
pub use context::{EcallArgs, EcallOp, TrapContext};
pub use geometry::PageClass;
pub use vector::{Behavior, VectorMode};
