//! A browsing session over one open file.
//!
//! Ties the repositories to a byte cache and an instruction cache whose ranges
//! come from the file's sections, and keeps both caches consistent with
//! writes.

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::{AddressRange, CacheConfig, Prefetcher, WindowedCache};
use crate::error::Result;
use crate::repository::{
    BinInfoRepository, DisasmRepository, EntryPoint, HexRepository, Instruction, Section, XrefsData,
};
use crate::session::SessionHandle;

/// Bytes per hex-view chunk.
pub const BYTE_CHUNK_SIZE: usize = 256;

/// Instructions per disassembly-view chunk.
pub const INSTRUCTION_CHUNK_SIZE: usize = 50;

pub struct Browser {
    session: SessionHandle,
    hex: HexRepository,
    disasm: DisasmRepository,
    sections: Vec<Section>,
    entry_points: Vec<EntryPoint>,
    bytes: WindowedCache<u8>,
    instructions: WindowedCache<Instruction>,
    modified: watch::Sender<u64>,
}

impl Browser {
    /// Query the file layout and build both caches.
    ///
    /// `file_len` is the fallback range for files without sections. Metadata
    /// the engine cannot provide degrades to the fallback ranges; a dead
    /// session fails.
    pub async fn open(session: SessionHandle, file_len: Option<u64>) -> Result<Self> {
        let info = BinInfoRepository::new(session.clone());
        let sections = degrade(info.sections().await, "sections")?;
        let entry_points = degrade(info.entry_points().await, "entry points")?;

        let byte_range = AddressRange::from_sections(&sections, false, file_len);
        let code_range = AddressRange::from_sections(&sections, true, file_len);
        info!(
            sections = sections.len(),
            bytes = %byte_range,
            code = %code_range,
            "Browser opened"
        );

        let hex = HexRepository::new(session.clone());
        let disasm = DisasmRepository::new(session.clone());
        let bytes = WindowedCache::new(
            byte_range,
            hex.clone(),
            CacheConfig::with_chunk_size(BYTE_CHUNK_SIZE),
        );
        let instructions = WindowedCache::new(
            code_range,
            disasm.clone(),
            CacheConfig::with_chunk_size(INSTRUCTION_CHUNK_SIZE),
        );
        let (modified, _) = watch::channel(0);

        Ok(Self {
            session,
            hex,
            disasm,
            sections,
            entry_points,
            bytes,
            instructions,
            modified,
        })
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn entry_points(&self) -> &[EntryPoint] {
        &self.entry_points
    }

    /// Cache of raw bytes over every section.
    pub fn bytes(&self) -> &WindowedCache<u8> {
        &self.bytes
    }

    /// Cache of decoded instructions over the executable sections.
    pub fn instructions(&self) -> &WindowedCache<Instruction> {
        &self.instructions
    }

    pub fn hex(&self) -> &HexRepository {
        &self.hex
    }

    pub fn disasm(&self) -> &DisasmRepository {
        &self.disasm
    }

    /// Where to put the cursor first: the first entry point, or 0.
    pub fn initial_cursor(&self) -> u64 {
        self.entry_points.first().map_or(0, |entry| entry.vaddr)
    }

    /// Prefetcher over the byte cache.
    pub fn byte_prefetcher(&self, radius: usize) -> Prefetcher<u8> {
        Prefetcher::with_radius(self.bytes.clone(), radius)
    }

    /// Prefetcher over the instruction cache.
    pub fn instruction_prefetcher(&self, radius: usize) -> Prefetcher<Instruction> {
        Prefetcher::with_radius(self.instructions.clone(), radius)
    }

    pub async fn xrefs(&self, addr: u64) -> Result<XrefsData> {
        self.disasm.xrefs(addr).await
    }

    /// Write hex bytes at `addr` and invalidate both caches.
    pub async fn write_hex(&self, addr: u64, hex: &str) -> Result<String> {
        let reply = self.hex.write_hex(addr, hex).await?;
        self.data_modified(addr);
        Ok(reply)
    }

    /// Write a string at `addr` and invalidate both caches.
    pub async fn write_string(&self, addr: u64, text: &str) -> Result<String> {
        let reply = self.hex.write_string(addr, text).await?;
        self.data_modified(addr);
        Ok(reply)
    }

    /// Assemble at `addr` and invalidate both caches.
    pub async fn write_asm(&self, addr: u64, asm: &str) -> Result<String> {
        let reply = self.disasm.write_asm(addr, asm).await?;
        self.data_modified(addr);
        Ok(reply)
    }

    /// Watch the number of writes applied so far.
    pub fn subscribe_modified(&self) -> watch::Receiver<u64> {
        self.modified.subscribe()
    }

    fn data_modified(&self, addr: u64) {
        self.bytes.cancel_preloads();
        self.instructions.cancel_preloads();
        self.bytes.clear();
        self.instructions.clear();
        self.modified.send_modify(|count| *count += 1);
        debug!(addr, "Data modified, caches invalidated");
    }
}

impl std::fmt::Debug for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Browser")
            .field("bytes", &self.bytes.range())
            .field("instructions", &self.instructions.range())
            .field("sections", &self.sections.len())
            .finish()
    }
}

/// Fall back to an empty list unless the session itself failed.
fn degrade<T>(result: Result<Vec<T>>, what: &str) -> Result<Vec<T>> {
    match result {
        Ok(items) => Ok(items),
        Err(e) if e.is_terminal() => Err(e),
        Err(e) => {
            warn!(error = %e, "Could not read {what}");
            Ok(Vec::new())
        }
    }
}
