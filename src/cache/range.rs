//! Virtual address ranges.

use std::fmt;

use crate::error::{EngineError, Result};
use crate::repository::Section;

/// Range used when nothing better is known (1 MB from zero).
pub const FALLBACK_RANGE_LEN: u64 = 1024 * 1024;

/// Half-open address range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
    start: u64,
    end: u64,
}

impl AddressRange {
    /// Create a range.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidRange`] if `end < start`.
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if end < start {
            return Err(EngineError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Range covering the address space described by `sections`.
    ///
    /// Spans the lowest `vaddr` to the highest section end. With
    /// `executable_only`, executable sections are preferred when there are
    /// any. Without usable sections the range is `[0, file_len)`, and without a
    /// file length `[0, 1 MB)`.
    pub fn from_sections(sections: &[Section], executable_only: bool, file_len: Option<u64>) -> Self {
        let executable: Vec<&Section> = if executable_only {
            sections.iter().filter(|s| s.is_executable()).collect()
        } else {
            Vec::new()
        };
        let candidates: Vec<&Section> = if executable.is_empty() {
            sections.iter().collect()
        } else {
            executable
        };

        let start = candidates.iter().map(|s| s.vaddr).min();
        let end = candidates.iter().map(|s| s.end()).max();
        if let (Some(start), Some(end)) = (start, end) {
            if end > start {
                return Self { start, end };
            }
        }

        match file_len {
            Some(len) if len > 0 => Self { start: 0, end: len },
            _ => Self {
                start: 0,
                end: FALLBACK_RANGE_LEN,
            },
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `addr` lies inside the range.
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Nearest address inside the range. Returns `start` for an empty range.
    pub fn clamp(&self, addr: u64) -> u64 {
        if self.is_empty() {
            return self.start;
        }
        addr.clamp(self.start, self.end - 1)
    }

    /// Fail with [`EngineError::OutOfRange`] unless `addr` is inside.
    pub fn check(&self, addr: u64) -> Result<()> {
        if self.contains(addr) {
            Ok(())
        } else {
            Err(EngineError::OutOfRange {
                addr,
                start: self.start,
                end: self.end,
            })
        }
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.start, self.end)
    }
}
