/// A contiguous half-open interval of indices `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Range {
    pub begin: usize,
    pub end: usize,
}

impl Range {
    /// Creates a new `Range`.
    ///
    /// # Arguments
    /// * `begin` - The first index of the interval.
    /// * `end` - One past the last index of the interval.
    pub fn new(begin: usize, end: usize) -> Self {
        debug_assert!(begin <= end, "range begin past its end");
        Self { begin, end }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Returns the `idx`-th of `n` nearly equal contiguous subranges.
    ///
    /// Properties:
    /// - Segments are contiguous, disjoint and cover `[begin, end)`.
    /// - Sizes differ by at most 1, the remainder goes to the first segments.
    ///
    /// # Panics
    /// If `n` is zero or `idx >= n`.
    pub fn segment(&self, idx: usize, n: usize) -> Range {
        assert!(n > 0, "can't split a range into zero segments");
        assert!(idx < n, "segment index out of range");

        let total = self.len();
        let base = total / n;
        let rem = total % n;

        let begin = self.begin + idx * base + idx.min(rem);
        let extra = if idx < rem { 1 } else { 0 };
        Range::new(begin, begin + base + extra)
    }

    /// Whether `idx` falls inside this range.
    #[inline]
    pub fn has(&self, idx: usize) -> bool {
        self.begin <= idx && idx < self.end
    }
}
