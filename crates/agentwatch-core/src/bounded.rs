//! FIFO-bounded buffers

use std::collections::VecDeque;

/// Push while keeping at most `max_size` entries, evicting the oldest first
pub trait BoundedPush<T> {
    /// Push `value`; returns the evicted entry, if any
    fn push_bounded(&mut self, value: T, max_size: usize) -> Option<T>;
}

impl<T> BoundedPush<T> for VecDeque<T> {
    #[inline]
    fn push_bounded(&mut self, value: T, max_size: usize) -> Option<T> {
        let evicted = if max_size > 0 && self.len() >= max_size {
            self.pop_front()
        } else {
            None
        };
        self.push_back(value);
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_evicts_oldest() {
        let mut buf = VecDeque::new();
        for i in 0..5 {
            buf.push_bounded(i, 3);
        }
        assert_eq!(buf, VecDeque::from(vec![2, 3, 4]));
    }

    proptest! {
        #[test]
        fn prop_keeps_newest_window(n in 0usize..400, cap in 1usize..64) {
            let mut buf = VecDeque::new();
            for i in 0..n {
                buf.push_bounded(i, cap);
            }
            prop_assert_eq!(buf.len(), n.min(cap));
            if n > cap {
                // first retained is the (n - cap + 1)-th inserted
                prop_assert_eq!(buf.front().copied(), Some(n - cap));
            }
            prop_assert_eq!(buf.back().copied(), n.checked_sub(1));
        }
    }
}
