//! Chunks and immutable chunk-set snapshots.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// An item a [`WindowedCache`](super::WindowedCache) can hold.
///
/// Items either all have the same width (raw bytes) and are addressed by
/// position, or carry their own address and width (decoded instructions).
pub trait ChunkItem: Clone + Send + Sync + 'static {
    /// Width of every item, or `None` when widths vary.
    const FIXED_WIDTH: Option<u64>;

    /// Address of the item at `index` in a chunk starting at `chunk_start`.
    fn address(&self, chunk_start: u64, index: usize) -> u64;

    /// Number of address units the item occupies. At least 1.
    fn width(&self) -> u64;
}

impl ChunkItem for u8 {
    const FIXED_WIDTH: Option<u64> = Some(1);

    #[inline]
    fn address(&self, chunk_start: u64, index: usize) -> u64 {
        chunk_start + index as u64
    }

    #[inline]
    fn width(&self) -> u64 {
        1
    }
}

/// Contiguous run of items covering `[start, end)`, tagged with the cache
/// version that produced it. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<T> {
    start: u64,
    end: u64,
    version: u64,
    items: Vec<T>,
}

impl<T: ChunkItem> Chunk<T> {
    /// Build a chunk from items already clipped to a window.
    ///
    /// Returns `None` for an empty item list.
    pub(crate) fn from_items(start: u64, items: Vec<T>) -> Option<Self> {
        let last = items.len().checked_sub(1)?;
        let first_addr = items[0].address(start, 0);
        let end = items[last].address(start, last) + items[last].width();
        Some(Self {
            start: first_addr,
            end,
            version: 0,
            items,
        })
    }

    /// Stretch the covered span to `end` without adding items.
    pub(crate) fn extended_to(mut self, end: u64) -> Self {
        self.end = self.end.max(end);
        self
    }

    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Cache version at which this chunk was inserted.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Address of the item at `index`.
    pub fn item_address(&self, index: usize) -> u64 {
        self.items[index].address(self.start, index)
    }

    /// Index of the first item ending after `addr`.
    pub fn index_from(&self, addr: u64) -> usize {
        match T::FIXED_WIDTH {
            Some(width) => {
                let offset = addr.saturating_sub(self.start) / width;
                (offset as usize).min(self.items.len())
            }
            None => self.items.partition_point(|item| {
                let start = item.address(self.start, 0);
                start + item.width() <= addr
            }),
        }
    }
}

/// Immutable view of a cache's chunks at one version.
///
/// Readers hold an `Arc<Snapshot>`; writers build a new one and swap it in, so
/// a reader sees either the complete old set or the complete new set.
#[derive(Debug)]
pub struct Snapshot<T> {
    pub(crate) version: u64,
    pub(crate) generation: u64,
    pub(crate) chunks: BTreeMap<u64, Arc<Chunk<T>>>,
}

impl<T: ChunkItem> Snapshot<T> {
    pub(crate) fn empty(version: u64, generation: u64) -> Self {
        Self {
            version,
            generation,
            chunks: BTreeMap::new(),
        }
    }

    /// Cache version this snapshot represents.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of resident chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Resident chunks in address order.
    pub fn chunks(&self) -> impl Iterator<Item = &Arc<Chunk<T>>> {
        self.chunks.values()
    }

    /// Chunk covering `addr`, if loaded.
    pub fn chunk_containing(&self, addr: u64) -> Option<&Arc<Chunk<T>>> {
        self.chunks
            .range(..=addr)
            .next_back()
            .map(|(_, chunk)| chunk)
            .filter(|chunk| chunk.contains(addr))
    }

    pub fn is_loaded(&self, addr: u64) -> bool {
        self.chunk_containing(addr).is_some()
    }

    /// Uncovered span around an unloaded `addr`: from the end of the chunk
    /// before it to the start of the chunk after it.
    pub(crate) fn gap_around(&self, addr: u64) -> (Option<u64>, Option<u64>) {
        let below = self
            .chunks
            .range(..=addr)
            .next_back()
            .map(|(_, chunk)| chunk.end());
        let above = self
            .chunks
            .range((Bound::Excluded(addr), Bound::Unbounded))
            .next()
            .map(|(start, _)| *start);
        (below, above)
    }

    /// Start of the first chunk.
    pub fn first_start(&self) -> Option<u64> {
        self.chunks.keys().next().copied()
    }

    /// End of the last chunk.
    pub fn last_end(&self) -> Option<u64> {
        self.chunks.values().next_back().map(|chunk| chunk.end())
    }

    /// Bounds of the gap-free run of chunks containing `addr`.
    pub fn run_bounds(&self, addr: u64) -> Option<(u64, u64)> {
        let chunk = self.chunk_containing(addr)?;
        let mut start = chunk.start();
        let mut end = chunk.end();
        while let Some(prev) = self.chunks.range(..start).next_back().map(|(_, c)| c) {
            if prev.end() != start {
                break;
            }
            start = prev.start();
        }
        while let Some(next) = self.chunks.get(&end) {
            end = next.end();
        }
        Some((start, end))
    }

    /// Up to `count` items starting at `addr`, crossing into adjacent chunks
    /// while they are contiguous. Empty if `addr` is not loaded.
    pub fn read(&self, addr: u64, count: usize) -> Vec<T> {
        let mut out = Vec::with_capacity(count.min(4096));
        let Some(mut chunk) = self.chunk_containing(addr) else {
            return out;
        };
        let mut index = chunk.index_from(addr);

        while out.len() < count {
            let take = (count - out.len()).min(chunk.len() - index);
            out.extend_from_slice(&chunk.items()[index..index + take]);
            if out.len() == count {
                break;
            }
            match self.chunks.get(&chunk.end()) {
                Some(next) => {
                    chunk = next;
                    index = 0;
                }
                None => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Instruction;

    fn bytes_chunk(start: u64, len: usize) -> Arc<Chunk<u8>> {
        let items = (0..len).map(|i| (start as usize + i) as u8).collect();
        Arc::new(Chunk::from_items(start, items).unwrap())
    }

    fn op(addr: u64, size: u64) -> Instruction {
        Instruction {
            addr,
            size,
            ..Instruction::default()
        }
    }

    fn snapshot(chunks: Vec<Arc<Chunk<u8>>>) -> Snapshot<u8> {
        let mut snap = Snapshot::empty(1, 0);
        for chunk in chunks {
            snap.chunks.insert(chunk.start(), chunk);
        }
        snap
    }

    #[test]
    fn test_fixed_chunk_bounds() {
        let chunk = bytes_chunk(0x100, 16);
        assert_eq!(chunk.start(), 0x100);
        assert_eq!(chunk.end(), 0x110);
        assert_eq!(chunk.index_from(0x108), 8);
        assert_eq!(chunk.item_address(3), 0x103);
    }

    #[test]
    fn test_variable_chunk_bounds() {
        let chunk = Chunk::from_items(0x10, vec![op(0x10, 2), op(0x12, 5), op(0x17, 1)]).unwrap();
        assert_eq!(chunk.start(), 0x10);
        assert_eq!(chunk.end(), 0x18);
        // Inside the second instruction.
        assert_eq!(chunk.index_from(0x14), 1);
        assert_eq!(chunk.index_from(0x17), 2);
    }

    #[test]
    fn test_empty_items_make_no_chunk() {
        assert!(Chunk::<u8>::from_items(0, Vec::new()).is_none());
    }

    #[test]
    fn test_read_crosses_contiguous_chunks() {
        let snap = snapshot(vec![bytes_chunk(0, 16), bytes_chunk(16, 16)]);
        let items = snap.read(12, 8);
        assert_eq!(items, vec![12, 13, 14, 15, 16, 17, 18, 19]);
    }

    #[test]
    fn test_read_stops_at_gap() {
        let snap = snapshot(vec![bytes_chunk(0, 16), bytes_chunk(32, 16)]);
        assert_eq!(snap.read(12, 8).len(), 4);
        assert!(snap.read(20, 8).is_empty());
    }

    #[test]
    fn test_gap_and_run_bounds() {
        let snap = snapshot(vec![bytes_chunk(0, 16), bytes_chunk(16, 16), bytes_chunk(64, 16)]);
        assert_eq!(snap.gap_around(40), (Some(32), Some(64)));
        assert_eq!(snap.run_bounds(20), Some((0, 32)));
        assert_eq!(snap.run_bounds(70), Some((64, 80)));
        assert_eq!(snap.first_start(), Some(0));
        assert_eq!(snap.last_end(), Some(80));
    }
}
