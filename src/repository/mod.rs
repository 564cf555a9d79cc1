//! Typed access to engine data over a [`SessionHandle`](crate::SessionHandle).
//!
//! Each repository shapes engine commands and decodes their replies. The hex
//! and disassembly repositories also act as cache [`Source`](crate::cache::Source)s.

mod bininfo;
mod disasm;
mod hex;
mod model;

pub use bininfo::BinInfoRepository;
pub use disasm::{parse_address, DisasmRepository};
pub use hex::HexRepository;
pub use model::{
    EntryPoint, FunctionInfo, Instruction, Section, Xref, XrefRecord, XrefWithDisasm, XrefsData,
};
