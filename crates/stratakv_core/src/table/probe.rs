//! Triangular probe sequence over groups.

/// Yields the first control index of each group a lookup visits.
///
/// Group `k` of the sequence is `home + k(k+1)/2` (mod group count). With a
/// power-of-two group count this visits every group exactly once, so an
/// exhausted sequence means the whole table was scanned.
#[derive(Clone, Debug)]
pub(crate) struct ProbeSeq {
    /// Current group index.
    group: usize,
    /// Distance to the next group.
    stride: usize,
    /// `group_count - 1`.
    group_mask: usize,
    /// Lanes per group.
    lanes: usize,
    /// Groups left to yield.
    remaining: usize,
}

impl ProbeSeq {
    /// Starts a sequence at `h1`'s home group.
    #[inline]
    pub(crate) fn new(h1: usize, group_mask: usize, lanes: usize) -> Self {
        Self {
            group: h1 & group_mask,
            stride: 0,
            group_mask,
            lanes,
            remaining: group_mask + 1,
        }
    }
}

impl Iterator for ProbeSeq {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let base = self.group * self.lanes;
        self.stride += 1;
        self.group = (self.group + self.stride) & self.group_mask;
        Some(base)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
