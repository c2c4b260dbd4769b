//! Table-driven test cases.
//!
//! A test table is a sequence of 24-byte records `(address, value, label)`.
//! The label names the routine that runs the case; only its megapage offset
//! is significant, so the same table works wherever the program is mapped.

use std::collections::HashMap;
use std::fmt;

use crate::cpu::csr::{
    CSR_MSTATUS, CSR_PMPADDR0, CSR_PMPCFG0, CSR_SATP, MSTATUS_MPP, MSTATUS_MPP_SHIFT, MSTATUS_MPRV,
    MSTATUS_MXR, MSTATUS_SUM, SATP_ASID_SHIFT, SATP_MODE_SHIFT, SATP_MODE_SV39, SATP_MODE_SV48,
};
use crate::cpu::Mode;
use crate::error::HarnessError;
use crate::harness::{HaltReason, Harness};
use crate::result_log::ByteOrder;
use crate::trap::context::EcallOp;

/// Size of one encoded test case.
pub const RECORD_SIZE: usize = 24;

/// Bits of a label that survive relocation of the program.
pub const LABEL_MASK: u64 = 0x1F_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestCase {
    /// Address operand (target address, return VPN, page table PPN).
    pub address: u64,
    /// Value operand (data, page type, ASID).
    pub value: u64,
    pub tag: u64,
}

impl TestCase {
    pub fn label(&self) -> u64 {
        self.tag & LABEL_MASK
    }

    /// Entry address of the case's routine in the megapage holding `pc`.
    pub fn entry_in(&self, pc: u64) -> u64 {
        (pc & !LABEL_MASK) | self.label()
    }
}

/// Decode a raw test table.
pub fn decode_table(bytes: &[u8], order: ByteOrder) -> Result<Vec<TestCase>, HarnessError> {
    if bytes.len() % RECORD_SIZE != 0 {
        return Err(HarnessError::TruncatedTable(bytes.len()));
    }

    let word = |chunk: &[u8]| -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        match order {
            ByteOrder::Little => u64::from_le_bytes(buf),
            ByteOrder::Big => u64::from_be_bytes(buf),
        }
    };

    Ok(bytes
        .chunks_exact(RECORD_SIZE)
        .map(|rec| TestCase {
            address: word(&rec[0..8]),
            value: word(&rec[8..16]),
            tag: word(&rec[16..24]),
        })
        .collect())
}

/// Routine a test case jumps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestKind {
    Write64,
    Write32,
    Write16,
    Write08,
    Read64,
    Read32,
    Read16,
    Read08,
    Executable,
    Terminate,
    GotoBaremetal,
    GotoSv39,
    GotoSv48,
    WriteMxrSum,
    ReadWriteMprv,
    GotoMMode,
    GotoSMode,
    GotoUMode,
    /// pmpcfg0 or pmpcfg2.
    WritePmpcfg(u8),
    /// pmpaddr0..=15.
    WritePmpaddr(u8),
}

impl TestKind {
    /// Every routine, in table-layout order.
    pub fn all() -> Vec<TestKind> {
        let mut kinds = vec![
            TestKind::Write64,
            TestKind::Write32,
            TestKind::Write16,
            TestKind::Write08,
            TestKind::Read64,
            TestKind::Read32,
            TestKind::Read16,
            TestKind::Read08,
            TestKind::Executable,
            TestKind::Terminate,
            TestKind::GotoBaremetal,
            TestKind::GotoSv39,
            TestKind::GotoSv48,
            TestKind::WriteMxrSum,
            TestKind::ReadWriteMprv,
            TestKind::GotoMMode,
            TestKind::GotoSMode,
            TestKind::GotoUMode,
            TestKind::WritePmpcfg(0),
            TestKind::WritePmpcfg(2),
        ];
        kinds.extend((0..16).map(TestKind::WritePmpaddr));
        kinds
    }

    pub fn from_name(name: &str) -> Option<TestKind> {
        TestKind::all().into_iter().find(|k| k.to_string() == name)
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestKind::Write64 => "write64_test",
            TestKind::Write32 => "write32_test",
            TestKind::Write16 => "write16_test",
            TestKind::Write08 => "write08_test",
            TestKind::Read64 => "read64_test",
            TestKind::Read32 => "read32_test",
            TestKind::Read16 => "read16_test",
            TestKind::Read08 => "read08_test",
            TestKind::Executable => "executable_test",
            TestKind::Terminate => "terminate_test",
            TestKind::GotoBaremetal => "goto_baremetal",
            TestKind::GotoSv39 => "goto_sv39",
            TestKind::GotoSv48 => "goto_sv48",
            TestKind::WriteMxrSum => "write_mxr_sum",
            TestKind::ReadWriteMprv => "read_write_mprv",
            TestKind::GotoMMode => "goto_m_mode",
            TestKind::GotoSMode => "goto_s_mode",
            TestKind::GotoUMode => "goto_u_mode",
            TestKind::WritePmpcfg(n) => return write!(f, "write_pmpcfg_{}", n),
            TestKind::WritePmpaddr(n) => return write!(f, "write_pmpaddr_{}", n),
        };
        f.write_str(name)
    }
}

/// Masked label to routine.
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    kinds: HashMap<u64, TestKind>,
}

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routines laid out 4 bytes apart from offset 0, in [`TestKind::all`] order.
    pub fn indexed() -> Self {
        let mut map = Self::new();
        for (i, kind) in TestKind::all().into_iter().enumerate() {
            map.insert(i as u64 * 4, kind);
        }
        map
    }

    pub fn insert(&mut self, label: u64, kind: TestKind) {
        self.kinds.insert(label & LABEL_MASK, kind);
    }

    pub fn get(&self, label: u64) -> Option<TestKind> {
        self.kinds.get(&(label & LABEL_MASK)).copied()
    }

    /// Label registered for `kind`, if any.
    pub fn label_of(&self, kind: TestKind) -> Option<u64> {
        self.kinds
            .iter()
            .find(|&(_, &k)| k == kind)
            .map(|(&label, _)| label)
    }
}

/// Runs the cases that need memory or instruction execution.
///
/// A probe may raise traps through [`Harness::raise`] and append results to
/// [`Harness::log`].
pub trait TestProbe {
    fn run(&mut self, case: &TestCase, kind: TestKind, harness: &mut Harness) -> Result<(), HarnessError>;
}

/// Walks a decoded test table against a harness.
pub struct TestDriver {
    labels: LabelMap,
}

impl TestDriver {
    pub fn new(labels: LabelMap) -> Self {
        Self { labels }
    }

    /// Run cases in order until the harness halts.
    ///
    /// Running off the end of the table is an error; a well-formed table ends
    /// with a terminate case.
    pub fn run(
        &self,
        cases: &[TestCase],
        harness: &mut Harness,
        probe: &mut dyn TestProbe,
    ) -> Result<HaltReason, HarnessError> {
        for (index, case) in cases.iter().enumerate() {
            if let Some(reason) = harness.halt_reason() {
                return Ok(reason);
            }

            let kind = self.labels.get(case.tag).ok_or(HarnessError::UnknownLabel {
                index,
                label: case.label(),
            })?;
            log::debug!(
                "Case {}: {} address={:#x} value={:#x}",
                index,
                kind,
                case.address,
                case.value
            );

            self.run_case(case, kind, harness, probe)?;
        }

        harness.halt_reason().ok_or(HarnessError::TableExhausted)
    }

    fn run_case(
        &self,
        case: &TestCase,
        kind: TestKind,
        harness: &mut Harness,
        probe: &mut dyn TestProbe,
    ) -> Result<(), HarnessError> {
        match kind {
            TestKind::GotoMMode => {
                harness.ecall(EcallOp::GotoMachine.code(), case.address, case.value)?;
            }
            TestKind::GotoSMode => {
                harness.ecall(EcallOp::GotoSupervisor.code(), case.address, case.value)?;
            }
            TestKind::GotoUMode => {
                harness.ecall(EcallOp::GotoUser.code(), case.address, case.value)?;
            }
            TestKind::Terminate => {
                harness.terminate()?;
            }
            TestKind::GotoBaremetal => harness.cpu.write_csr(CSR_SATP, 0),
            TestKind::GotoSv39 => harness.cpu.write_csr(CSR_SATP, satp(SATP_MODE_SV39, case)),
            TestKind::GotoSv48 => harness.cpu.write_csr(CSR_SATP, satp(SATP_MODE_SV48, case)),
            TestKind::WriteMxrSum => {
                let bits = (case.value << 18) & (MSTATUS_MXR | MSTATUS_SUM);
                let mstatus = harness.cpu.read_csr(CSR_MSTATUS);
                harness
                    .cpu
                    .write_csr(CSR_MSTATUS, (mstatus & !(MSTATUS_MXR | MSTATUS_SUM)) | bits);
            }
            TestKind::ReadWriteMprv => {
                let mstatus = harness.cpu.read_csr(CSR_MSTATUS);
                harness.log.append((mstatus & MSTATUS_MPRV) >> 17)?;
                // MPP = Supervisor so MPRV accesses use S-mode translation.
                let mstatus = (mstatus & !(MSTATUS_MPRV | MSTATUS_MPP))
                    | ((case.value & 1) << 17)
                    | (Mode::Supervisor.to_mpp() << MSTATUS_MPP_SHIFT);
                harness.cpu.write_csr(CSR_MSTATUS, mstatus);
            }
            TestKind::WritePmpcfg(n) => {
                let csr = CSR_PMPCFG0 + u16::from(n);
                harness.cpu.write_csr(csr, case.value);
                let readback = harness.cpu.read_csr(csr);
                harness.log.append(readback)?;
            }
            TestKind::WritePmpaddr(n) => {
                let csr = CSR_PMPADDR0 + u16::from(n);
                harness.cpu.write_csr(csr, case.value);
                let readback = harness.cpu.read_csr(csr);
                harness.log.append(readback)?;
            }
            _ => probe.run(case, kind, harness)?,
        }
        Ok(())
    }
}

fn satp(mode: u64, case: &TestCase) -> u64 {
    (mode << SATP_MODE_SHIFT) | (case.value << SATP_ASID_SHIFT) | case.address
}
