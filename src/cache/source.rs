//! Where a cache gets its items from.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;

/// Boxed future type for fetches.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Fetches items for a [`WindowedCache`](super::WindowedCache).
///
/// Implemented by the repositories; tests and adapters can use
/// [`source_fn`].
pub trait Source<T>: Send + Sync + 'static {
    /// Fetch up to `count` items starting at `addr`.
    ///
    /// Returning fewer items is allowed. Returning none means there is nothing
    /// at `addr`.
    fn fetch(&self, addr: u64, count: usize) -> BoxFuture<'_, Result<Vec<T>>>;

    /// Address from which decoding forward yields roughly `count` items
    /// before `addr`.
    ///
    /// Only consulted for variable-width items. The default assumes one
    /// address unit per item.
    fn rewind(&self, addr: u64, count: usize) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move { Ok(addr.saturating_sub(count as u64)) })
    }
}

/// A [`Source`] backed by a closure.
pub struct FnSource<F> {
    f: F,
}

/// Wrap an async closure `(addr, count) -> Result<Vec<T>>` as a [`Source`].
///
/// # Example
///
/// ```
/// use enginepipe::cache::source_fn;
///
/// let zeros = source_fn(|_addr, count| async move { Ok(vec![0u8; count]) });
/// # let _ = zeros;
/// ```
pub fn source_fn<T, F, Fut>(f: F) -> FnSource<F>
where
    F: Fn(u64, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
{
    FnSource { f }
}

impl<T, F, Fut> Source<T> for FnSource<F>
where
    F: Fn(u64, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
{
    fn fetch(&self, addr: u64, count: usize) -> BoxFuture<'_, Result<Vec<T>>> {
        Box::pin((self.f)(addr, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_source_fetches() {
        let source = source_fn(|addr, count| async move {
            Ok((0..count).map(|i| (addr as usize + i) as u8).collect::<Vec<u8>>())
        });

        let items: Vec<u8> = source.fetch(0x10, 4).await.unwrap();
        assert_eq!(items, vec![0x10, 0x11, 0x12, 0x13]);
    }

    #[tokio::test]
    async fn test_default_rewind_saturates() {
        let source = source_fn(|_addr, _count| async move { Ok(Vec::<u8>::new()) });

        assert_eq!(Source::<u8>::rewind(&source, 100, 20).await.unwrap(), 80);
        assert_eq!(Source::<u8>::rewind(&source, 5, 20).await.unwrap(), 0);
    }
}
