//! Windowed caching of address-keyed data.
//!
//! - [`WindowedCache`]: chunked cache loading windows on demand from a [`Source`]
//! - [`Prefetcher`]: keeps the neighbourhood of a moving cursor resident
//! - [`AddressRange`]: the bounds a cache may load within

mod chunk;
mod prefetch;
mod range;
mod source;
mod window;

pub use chunk::{Chunk, ChunkItem, Snapshot};
pub use prefetch::{Prefetcher, DEFAULT_PREFETCH_RADIUS};
pub use range::{AddressRange, FALLBACK_RANGE_LEN};
pub use source::{source_fn, BoxFuture, FnSource, Source};
pub use window::{
    CacheConfig, LoadOutcome, PreloadReport, WindowedCache, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CHUNKS,
    DEFAULT_MAX_IN_FLIGHT, DEFAULT_REWIND_ITEMS,
};
