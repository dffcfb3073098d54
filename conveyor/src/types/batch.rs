//! Batch buffer accumulated by the fetch stage and consumed by the process stage.

/// Ordered group of items collected from one or more consecutive fetch calls, together
/// with the acknowledgement cookies those calls contributed.
///
/// A batch grows page by page inside the fetch stage until it is sealed, either because
/// appending the next page would exceed the configured size limit or because the source
/// reached end of stream. Item order and cookie order are both fetch order and are
/// preserved end to end.
#[derive(Debug)]
pub struct Batch<I, C> {
    items: Vec<I>,
    cookies: Vec<C>,
}

impl<I, C> Batch<I, C> {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            cookies: Vec::new(),
        }
    }

    /// Returns the number of items currently buffered.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the batch holds no items.
    ///
    /// Cookies are deliberately not counted. A batch that carries cookies but no items
    /// is considered empty, so end of stream never flushes a buffer that has nothing
    /// for the destination to write.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of cookies currently buffered.
    pub fn cookie_count(&self) -> usize {
        self.cookies.len()
    }

    /// Returns `true` if appending `incoming` more items would push the batch past
    /// `max_size`.
    ///
    /// An exact fit is not an overflow, a page that fills the batch to precisely
    /// `max_size` items still belongs to the current batch.
    pub fn would_overflow(&self, incoming: usize, max_size: usize) -> bool {
        self.items.len() + incoming > max_size
    }

    /// Appends one fetched page, its items followed by its cookie.
    ///
    /// A page with zero items still contributes its cookie, every fetch call produces
    /// exactly one cookie regardless of how many items came with it.
    pub fn push_page(&mut self, items: Vec<I>, cookie: C) {
        self.items.extend(items);
        self.cookies.push(cookie);
    }

    /// Consumes the batch, returning its items and cookies.
    pub fn into_parts(self) -> (Vec<I>, Vec<C>) {
        (self.items, self.cookies)
    }
}

impl<I, C> Default for Batch<I, C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_page_preserves_item_and_cookie_order() {
        let mut batch = Batch::new();
        batch.push_page(vec!["a", "b"], 1);
        batch.push_page(vec!["c"], 2);

        let (items, cookies) = batch.into_parts();
        assert_eq!(items, vec!["a", "b", "c"]);
        assert_eq!(cookies, vec![1, 2]);
    }

    #[test]
    fn test_exact_fit_is_not_an_overflow() {
        let mut batch = Batch::new();
        batch.push_page(vec!["a", "b", "c"], 1);

        assert!(!batch.would_overflow(2, 5));
        assert!(batch.would_overflow(3, 5));
    }

    #[test]
    fn test_overflow_against_empty_batch() {
        let batch: Batch<&str, u64> = Batch::new();

        // A page larger than the limit overflows even an empty batch.
        assert!(batch.would_overflow(6, 5));
        assert!(!batch.would_overflow(5, 5));
    }

    #[test]
    fn test_cookie_only_batch_counts_as_empty() {
        let mut batch: Batch<&str, u64> = Batch::new();
        batch.push_page(vec![], 1);

        assert!(batch.is_empty());
        assert_eq!(batch.cookie_count(), 1);
    }
}
