//! Disassembly, cross-references and cursor movement.

use tracing::{debug, warn};

use super::hex::escape_quoted;
use super::model::{FunctionInfo, Instruction, Xref, XrefRecord, XrefWithDisasm, XrefsData};
use crate::cache::{BoxFuture, Source};
use crate::error::{EngineError, Result};
use crate::session::SessionHandle;

/// Flag holding the engine's seek while [`DisasmRepository::step_back`] runs.
const SAVED_SEEK_FLAG: &str = "enginepipe.saved_seek";

/// Decodes instructions and resolves references through the engine.
#[derive(Debug, Clone)]
pub struct DisasmRepository {
    session: SessionHandle,
}

impl DisasmRepository {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    /// Decode up to `count` instructions starting at `addr`.
    pub async fn read_instructions(&self, addr: u64, count: usize) -> Result<Vec<Instruction>> {
        let reply = self
            .session
            .execute_structured(&format!("pd {count} @ {addr:#x}"))
            .await?;
        reply.decode()
    }

    /// The single instruction at `addr`, if it decodes.
    pub async fn instruction_at(&self, addr: u64) -> Result<Option<Instruction>> {
        Ok(self.read_instructions(addr, 1).await?.into_iter().next())
    }

    /// Assemble `asm` and write it at `addr`.
    pub async fn write_asm(&self, addr: u64, asm: &str) -> Result<String> {
        let asm = asm.trim();
        if asm.is_empty() {
            return Err(EngineError::InvalidCommand("no instruction to assemble".into()));
        }
        debug!(addr, asm, "Assembling");
        self.session
            .execute_text(&format!("wa {} @ {addr:#x}", escape_quoted(asm)))
            .await
    }

    /// Name of the function containing `addr`, if the engine knows one.
    pub async fn function_name(&self, addr: u64) -> Result<Option<String>> {
        let reply = self
            .session
            .execute_structured(&format!("afi @ {addr:#x}"))
            .await?;
        let functions: Vec<FunctionInfo> = reply.decode()?;
        Ok(functions
            .into_iter()
            .next()
            .map(|f| f.name)
            .filter(|name| !name.is_empty()))
    }

    /// References made by and to the instruction at `addr`.
    ///
    /// Each reference is resolved against the instruction at its far end;
    /// outgoing ones also get the name of the function they land in. A
    /// reference whose far end cannot be resolved is still returned.
    pub async fn xrefs(&self, addr: u64) -> Result<XrefsData> {
        let outgoing: Vec<XrefRecord> = self
            .session
            .execute_structured(&format!("axf @ {addr:#x}"))
            .await?
            .decode()?;
        let incoming: Vec<XrefRecord> = self
            .session
            .execute_structured(&format!("axt @ {addr:#x}"))
            .await?
            .decode()?;

        let mut data = XrefsData::default();
        for record in outgoing {
            let to = record.to.unwrap_or_default();
            let function = tolerate(self.function_name(to).await, to)?.flatten();
            let instruction = tolerate(self.instruction_at(to).await, to)?.flatten();
            data.outgoing.push(XrefWithDisasm {
                xref: Xref {
                    from: record.from,
                    to,
                    kind: record.kind,
                    opcode: record.opcode,
                    function,
                    refname: record.refname.filter(|name| !name.is_empty()),
                },
                instruction,
            });
        }
        for record in incoming {
            let from = record.from;
            let instruction = tolerate(self.instruction_at(from).await, from)?.flatten();
            data.incoming.push(XrefWithDisasm {
                xref: Xref {
                    from,
                    to: addr,
                    kind: record.kind,
                    opcode: record.opcode,
                    function: record.fcn_name.filter(|name| !name.is_empty()),
                    refname: record.refname.filter(|name| !name.is_empty()),
                },
                instruction,
            });
        }
        Ok(data)
    }

    /// Move the engine's cursor to `addr`.
    pub async fn seek(&self, addr: u64) -> Result<()> {
        self.session.execute_text(&format!("s {addr:#x}")).await?;
        Ok(())
    }

    /// Address of the instruction `count` instructions before `addr`.
    ///
    /// Runs as one command line so no other command can observe the moved
    /// cursor. The engine's seek is parked in a flag and restored before the
    /// line ends.
    pub async fn step_back(&self, addr: u64, count: usize) -> Result<u64> {
        let flag = SAVED_SEEK_FLAG;
        let reply = self
            .session
            .execute_text(&format!(
                "f {flag};s {addr:#x};so -{count};?v .;s {flag};f-{flag}"
            ))
            .await?;
        parse_address(&reply).ok_or_else(|| {
            EngineError::Protocol(format!("expected an address, got {reply:?}"))
        })
    }
}

impl Source<Instruction> for DisasmRepository {
    fn fetch(&self, addr: u64, count: usize) -> BoxFuture<'_, Result<Vec<Instruction>>> {
        Box::pin(self.read_instructions(addr, count))
    }

    fn rewind(&self, addr: u64, count: usize) -> BoxFuture<'_, Result<u64>> {
        Box::pin(self.step_back(addr, count))
    }
}

/// Parse an address printed by the engine: `0x`-prefixed hex or decimal.
///
/// Only the last non-empty line is considered.
pub fn parse_address(text: &str) -> Option<u64> {
    let line = text.lines().rev().map(str::trim).find(|l| !l.is_empty())?;
    match line
        .strip_prefix("0x")
        .or_else(|| line.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => line.parse().ok(),
    }
}

/// Degrade a failed lookup to `None` unless the session itself is gone.
fn tolerate<T>(result: Result<T>, addr: u64) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_terminal() => Err(e),
        Err(e) => {
            warn!(addr, error = %e, "Reference lookup failed");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fake_session;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x100"), Some(0x100));
        assert_eq!(parse_address("4096\n"), Some(4096));
        assert_eq!(parse_address("junk\n0x20\n"), Some(0x20));
        assert_eq!(parse_address(""), None);
        assert_eq!(parse_address("nope"), None);
    }

    #[tokio::test]
    async fn test_read_instructions() {
        let session = fake_session(|line| {
            assert_eq!(line, "pdj 2 @ 0x400");
            Some(
                r#"[{"offset":1024,"size":1,"opcode":"nop","type":"nop"},
                    {"offset":1025,"size":2,"opcode":"jmp 0x400","type":"jmp","jump":1024}]"#
                    .replace('\n', ""),
            )
        });
        let disasm = DisasmRepository::new(session.handle());

        let ops = disasm.read_instructions(0x400, 2).await.unwrap();

        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1].addr, 0x401);
        assert_eq!(ops[1].jump, Some(0x400));
    }

    #[tokio::test]
    async fn test_step_back_is_one_command() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let session = fake_session(move |line| {
            log.lock().unwrap().push(line.to_string());
            Some("0xf0".to_string())
        });
        let disasm = DisasmRepository::new(session.handle());

        assert_eq!(disasm.step_back(0x100, 20).await.unwrap(), 0xf0);
        assert_eq!(disasm.rewind(0x100, 20).await.unwrap(), 0xf0);
        assert_eq!(
            seen.lock().unwrap()[0],
            "f enginepipe.saved_seek;s 0x100;so -20;?v .;s enginepipe.saved_seek;f-enginepipe.saved_seek"
        );
    }

    /// Engine with a seek and flags where every instruction is 4 bytes.
    /// Runs `;`-separated lines and prints what `?v .` sees.
    fn seeking_engine() -> crate::session::Session {
        let mut seek = 0u64;
        let mut flags = std::collections::HashMap::new();
        fake_session(move |line| {
            let mut out = Vec::new();
            for cmd in line.split(';') {
                match cmd.split_whitespace().collect::<Vec<_>>().as_slice() {
                    ["f", name] => {
                        flags.insert(name.to_string(), seek);
                    }
                    ["s", target] => {
                        seek = flags
                            .get(*target)
                            .copied()
                            .or_else(|| parse_address(target))
                            .unwrap();
                    }
                    ["so", delta] => {
                        let steps: i64 = delta.parse().unwrap();
                        seek = seek.saturating_add_signed(steps * 4);
                    }
                    ["?v", "."] => out.push(format!("{seek:#x}")),
                    [unflag] if unflag.starts_with("f-") => {
                        flags.remove(&unflag[2..]);
                    }
                    _ => {}
                }
            }
            Some(out.join("\n"))
        })
    }

    #[tokio::test]
    async fn test_rewind_keeps_user_seek() {
        let session = seeking_engine();
        let handle = session.handle();
        let disasm = DisasmRepository::new(handle.clone());

        disasm.seek(0x500).await.unwrap();
        assert_eq!(disasm.rewind(0x1000, 20).await.unwrap(), 0x1000 - 80);

        assert_eq!(handle.execute_text("?v .").await.unwrap(), "0x500");
    }

    #[tokio::test]
    async fn test_step_back_rejects_garbage() {
        let session = fake_session(|_| Some("Cannot seek".to_string()));
        let disasm = DisasmRepository::new(session.handle());

        let err = disasm.step_back(0x100, 1).await.unwrap_err();
        assert!(matches!(err, EngineError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_function_name() {
        let session = fake_session(|line| {
            Some(match line {
                "afij @ 0x10" => r#"[{"name":"main","offset":16,"size":32}]"#.to_string(),
                _ => "[]".to_string(),
            })
        });
        let disasm = DisasmRepository::new(session.handle());

        assert_eq!(disasm.function_name(0x10).await.unwrap().as_deref(), Some("main"));
        assert_eq!(disasm.function_name(0x99).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_xrefs_are_enriched() {
        let session = fake_session(|line| {
            Some(match line {
                "axfj @ 0x100" => r#"[{"from":256,"to":8192,"type":"CALL","opcode":"call 0x2000"}]"#,
                "axtj @ 0x100" => {
                    r#"[{"from":64,"type":"JMP","opcode":"jmp 0x100","fcn_name":"entry0","refname":""}]"#
                }
                "afij @ 0x2000" => r#"[{"name":"sym.helper","offset":8192,"size":4}]"#,
                "pdj 1 @ 0x2000" => r#"[{"offset":8192,"size":1,"opcode":"ret","type":"ret"}]"#,
                // Undecodable: the reference is kept without an instruction.
                "pdj 1 @ 0x40" => "not json",
                _ => "",
            }
            .to_string())
        });
        let disasm = DisasmRepository::new(session.handle());

        let data = disasm.xrefs(0x100).await.unwrap();

        assert_eq!(data.outgoing.len(), 1);
        let out = &data.outgoing[0];
        assert_eq!(out.xref.to, 0x2000);
        assert_eq!(out.xref.function.as_deref(), Some("sym.helper"));
        assert_eq!(out.instruction.as_ref().map(|op| op.opcode.as_str()), Some("ret"));

        assert_eq!(data.incoming.len(), 1);
        let inc = &data.incoming[0];
        assert_eq!(inc.xref.from, 0x40);
        assert_eq!(inc.xref.to, 0x100);
        assert_eq!(inc.xref.function.as_deref(), Some("entry0"));
        assert_eq!(inc.xref.refname, None);
        assert!(inc.instruction.is_none());
    }

    #[tokio::test]
    async fn test_xrefs_fail_when_session_dies() {
        let session = fake_session(|line| match line {
            "axfj @ 0x100" => Some(r#"[{"from":256,"to":8192,"type":"CALL","opcode":"call"}]"#.to_string()),
            "axtj @ 0x100" => Some("[]".to_string()),
            _ => None,
        });
        let disasm = DisasmRepository::new(session.handle());

        let err = disasm.xrefs(0x100).await.unwrap_err();
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn test_write_asm_and_seek() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let session = fake_session(move |line| {
            log.lock().unwrap().push(line.to_string());
            Some(String::new())
        });
        let disasm = DisasmRepository::new(session.handle());

        disasm.write_asm(0x10, " nop ").await.unwrap();
        disasm.seek(0x20).await.unwrap();
        assert!(disasm.write_asm(0x10, "  ").await.is_err());

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["wa nop @ 0x10".to_string(), "s 0x20".to_string()]
        );
    }
}
