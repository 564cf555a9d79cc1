//! Record types decoded from the engine's structured output.
//!
//! Field names follow the engine's JSON. Missing fields fall back to their
//! defaults so that records from older engine builds still decode.

use serde::{Deserialize, Serialize};

use crate::cache::ChunkItem;

/// One decoded instruction (`pdj`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Instruction {
    /// Address of the first byte.
    #[serde(rename = "offset")]
    pub addr: u64,
    /// Encoded length in bytes. Zero for undecodable data.
    #[serde(default)]
    pub size: u64,
    /// Plain mnemonic and operands.
    #[serde(default)]
    pub opcode: String,
    /// Display text, possibly with symbol names substituted.
    #[serde(default)]
    pub disasm: String,
    /// Encoded bytes as hex.
    #[serde(default)]
    pub bytes: String,
    /// Instruction class (`call`, `jmp`, `mov`, ...).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Branch target, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jump: Option<u64>,
}

impl ChunkItem for Instruction {
    const FIXED_WIDTH: Option<u64> = None;

    fn address(&self, _chunk_start: u64, _index: usize) -> u64 {
        self.addr
    }

    fn width(&self) -> u64 {
        // The engine reports zero for invalid data; it still occupies a row.
        self.size.max(1)
    }
}

/// A section header (`iSj`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub name: String,
    /// Size in the file.
    #[serde(default)]
    pub size: u64,
    /// Size once mapped.
    #[serde(default)]
    pub vsize: u64,
    /// Permission string such as `-r-x`.
    #[serde(default)]
    pub perm: String,
    #[serde(default)]
    pub paddr: u64,
    #[serde(default)]
    pub vaddr: u64,
}

impl Section {
    /// Whether the section is mapped executable.
    pub fn is_executable(&self) -> bool {
        self.perm.contains('x')
    }

    /// First address past the section, using the larger of file and mapped size.
    pub fn end(&self) -> u64 {
        self.vaddr.saturating_add(self.vsize.max(self.size))
    }
}

/// A program entry point (`iej`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntryPoint {
    #[serde(default)]
    pub vaddr: u64,
    #[serde(default)]
    pub paddr: u64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// A raw cross-reference as the engine reports it (`axfj` / `axtj`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct XrefRecord {
    #[serde(default)]
    pub from: u64,
    /// Absent for incoming references; the target is the queried address.
    #[serde(default)]
    pub to: Option<u64>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub opcode: String,
    /// Function containing `from` (incoming references only).
    #[serde(default)]
    pub fcn_name: Option<String>,
    /// Name of the referenced location.
    #[serde(default)]
    pub refname: Option<String>,
}

/// Function metadata (`afij`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FunctionInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub size: u64,
}

/// A cross-reference resolved against both ends.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Xref {
    pub from: u64,
    pub to: u64,
    pub kind: String,
    /// Instruction text at the referencing site as reported by the engine.
    pub opcode: String,
    /// Function name at the far end, when known.
    pub function: Option<String>,
    /// Name of the referenced location, when known.
    pub refname: Option<String>,
}

/// A cross-reference together with the decoded instruction at its far end.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XrefWithDisasm {
    pub xref: Xref,
    /// Decoded instruction at the far end, if it decodes.
    pub instruction: Option<Instruction>,
}

/// All references touching one address.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XrefsData {
    /// References made by the instruction at the address.
    pub outgoing: Vec<XrefWithDisasm>,
    /// References made to the address from elsewhere.
    pub incoming: Vec<XrefWithDisasm>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;

    #[test]
    fn test_instruction_decodes_engine_fields() {
        let json = r#"[{"offset":4096,"esil":"","refptr":0,"fcn_addr":4096,
            "size":5,"opcode":"call 0x2000","disasm":"call sym.main",
            "bytes":"e8fb0f0000","family":"cpu","type":"call","jump":8192}]"#;
        let ops: Vec<Instruction> = JsonCodec::decode(json).unwrap();

        assert_eq!(ops.len(), 1);
        let op = &ops[0];
        assert_eq!(op.addr, 0x1000);
        assert_eq!(op.size, 5);
        assert_eq!(op.kind, "call");
        assert_eq!(op.jump, Some(0x2000));
        assert_eq!(op.disasm, "call sym.main");
    }

    #[test]
    fn test_invalid_instruction_has_unit_width() {
        let op: Instruction = JsonCodec::decode(r#"{"offset":16,"type":"invalid"}"#).unwrap();
        assert_eq!(op.size, 0);
        assert_eq!(op.width(), 1);
        assert_eq!(op.address(0, 3), 16);
    }

    #[test]
    fn test_section_end_uses_larger_size() {
        let section: Section = JsonCodec::decode(
            r#"{"name":".bss","size":0,"vsize":256,"perm":"-rw-","paddr":0,"vaddr":8192}"#,
        )
        .unwrap();
        assert_eq!(section.end(), 8192 + 256);
        assert!(!section.is_executable());
    }

    #[test]
    fn test_incoming_xref_without_target() {
        let rec: XrefRecord = JsonCodec::decode(
            r#"{"from":4200,"type":"CALL","opcode":"call main","fcn_name":"entry0","refname":"main"}"#,
        )
        .unwrap();
        assert_eq!(rec.to, None);
        assert_eq!(rec.fcn_name.as_deref(), Some("entry0"));
    }
}
