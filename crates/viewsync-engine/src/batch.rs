//! Batch planning for large metadata listings.
//!
//! A source can expose tens of thousands of tables; detail fetches and
//! store writes are bounded by splitting the ref list into fixed-size
//! chunks processed one at a time.

/// Batch size used when the configured value is zero
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Split `items` into `ceil(len / batch_size)` chunks, all of size
/// `batch_size` except possibly the last. A zero batch size falls back
/// to [`DEFAULT_BATCH_SIZE`].
pub fn chunk<T>(items: &[T], batch_size: usize) -> Vec<&[T]> {
    let size = if batch_size == 0 {
        DEFAULT_BATCH_SIZE
    } else {
        batch_size
    };
    items.chunks(size).collect()
}
