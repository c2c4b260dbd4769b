use serde::{Deserialize, Serialize};

/// Page size classes a trap return can relocate into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageClass {
    Kilo,
    Mega,
    Giga,
    Tera,
}

/// Offset widths indexed by page type code (0=4KB, 1=2MB, 2=1GB, 3=512GB).
const PAGE_TYPE_TABLE: [(PageClass, u32); 4] = [
    (PageClass::Kilo, 12),
    (PageClass::Mega, 21),
    (PageClass::Giga, 30),
    (PageClass::Tera, 39),
];

impl PageClass {
    /// Resolve a caller-supplied page type code.
    pub fn from_code(code: u64) -> Option<Self> {
        PAGE_TYPE_TABLE.get(code as usize).map(|&(class, _)| class)
    }

    pub fn code(self) -> u64 {
        self as u64
    }

    pub fn offset_bits(self) -> u32 {
        PAGE_TYPE_TABLE[self as usize].1
    }

    #[inline]
    pub fn offset_mask(self) -> u64 {
        (1u64 << self.offset_bits()) - 1
    }

    /// Keep the in-page offset of `addr`, substitute the page base `vpn`.
    #[inline]
    pub fn relocate(self, addr: u64, vpn: u64) -> u64 {
        (addr & self.offset_mask()) | vpn
    }
}
