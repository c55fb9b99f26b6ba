//! Resumable position of a line stream

/// Offset and remaining count of one stream, owned by its engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Cursor {
    offset: u64,
    /// `None` streams until the server runs out
    remaining: Option<u64>,
    max_batch_size: usize,
}

impl Cursor {
    pub fn new(offset: u64, count: i64, max_batch_size: usize) -> Self {
        Self {
            offset,
            remaining: u64::try_from(count).ok().filter(|&c| c > 0),
            max_batch_size: max_batch_size.max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Records to ask for in the next batch
    pub fn next_batch_size(&self) -> usize {
        match self.remaining {
            Some(remaining) => usize::try_from(remaining)
                .map_or(self.max_batch_size, |r| r.min(self.max_batch_size)),
            None => self.max_batch_size,
        }
    }

    pub fn advance(&mut self, delivered: u64) {
        self.offset += delivered;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(delivered);
        }
    }

    pub fn is_done(&self) -> bool {
        self.remaining == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_batches() {
        let mut cursor = Cursor::new(0, 2500, 1000);
        let mut sizes = Vec::new();
        while !cursor.is_done() {
            let size = cursor.next_batch_size();
            sizes.push(size);
            cursor.advance(size as u64);
        }
        assert_eq!(sizes, vec![1000, 1000, 500]);
        assert_eq!(cursor.offset(), 2500);
    }

    #[test]
    fn test_unbounded_never_done() {
        for count in [0, -1, i64::MIN] {
            let mut cursor = Cursor::new(40, count, 1000);
            cursor.advance(1000);
            assert_eq!(cursor.next_batch_size(), 1000);
            assert!(!cursor.is_done());
            assert_eq!(cursor.offset(), 1040);
        }
    }

    #[test]
    fn test_partial_advance() {
        let mut cursor = Cursor::new(100, 10, 1000);
        assert_eq!(cursor.next_batch_size(), 10);
        cursor.advance(7);
        assert_eq!(cursor.offset(), 107);
        assert_eq!(cursor.next_batch_size(), 3);
        assert!(!cursor.is_done());
        cursor.advance(3);
        assert!(cursor.is_done());
    }
}
