//! 16-bit sequence number ordering

/// Half of the sequence space. Gaps this large or larger are never forward.
pub const HALF_RANGE: u16 = 0x8000;

/// Whether `next` is newer than `last` under wraparound
pub fn is_forward(last: u16, next: u16) -> bool {
    let gap = next.wrapping_sub(last);
    gap != 0 && gap < HALF_RANGE
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_simple_ordering() {
        assert!(is_forward(5, 6));
        assert!(!is_forward(6, 6));
        assert!(!is_forward(6, 5));
    }

    #[test]
    fn test_wraparound() {
        assert!(is_forward(65534, 65535));
        assert!(is_forward(65535, 0));
        assert!(is_forward(65534, 2));
        assert!(!is_forward(2, 65534));
    }

    #[test]
    fn test_half_range_boundary() {
        assert!(is_forward(0, 0x7FFF));
        assert!(!is_forward(0, 0x8000));
        assert!(!is_forward(2, 40000));
    }

    proptest! {
        #[test]
        fn prop_exactly_one_direction_is_forward(a: u16, b: u16) {
            prop_assume!(a != b && a.wrapping_sub(b) != HALF_RANGE);
            prop_assert!(is_forward(a, b) != is_forward(b, a));
        }
    }
}
