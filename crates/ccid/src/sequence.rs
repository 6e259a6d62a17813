//! Per-session CCID sequence numbering

/// 8-bit `bSeq` counter, advanced once per frame sent
///
/// Owned by the session that owns the device; wraps silently at 256 and is never
/// reset while the session lives.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SequenceCounter {
    next: u8,
}

impl SequenceCounter {
    /// Counter starting at zero
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Counter starting at `start`
    pub const fn starting_at(start: u8) -> Self {
        Self { next: start }
    }

    /// Return the sequence number for the next frame and advance
    pub const fn next_sequence(&mut self) -> u8 {
        let sequence = self.next;
        self.next = self.next.wrapping_add(1);
        sequence
    }

    /// The value the next frame will carry
    pub const fn peek(&self) -> u8 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increments() {
        let mut counter = SequenceCounter::new();
        assert_eq!(counter.next_sequence(), 0);
        assert_eq!(counter.next_sequence(), 1);
        assert_eq!(counter.peek(), 2);
    }

    #[test]
    fn test_wraps_and_never_repeats_back_to_back() {
        let mut counter = SequenceCounter::starting_at(254);
        let values: Vec<u8> = (0..4).map(|_| counter.next_sequence()).collect();
        assert_eq!(values, vec![254, 255, 0, 1]);

        let mut counter = SequenceCounter::new();
        let mut previous = counter.next_sequence();
        for _ in 0..600 {
            let current = counter.next_sequence();
            assert_ne!(current, previous);
            previous = current;
        }
    }
}
