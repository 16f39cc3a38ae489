//! # Numeric Utilities
//!
//! Alignment, prime search and load-factor arithmetic shared by the
//! allocators and the hash map.

/// Maximum load factor of the hash map, as a percentage.
///
/// The table is rebuilt once `size / capacity >= 0.65`.
pub const MAX_LOAD_FACTOR_PERCENT: u64 = 65;

/// Rounds `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two.
#[inline]
#[must_use]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// Returns `true` if `value` is a prime number.
#[must_use]
pub const fn is_prime(value: u32) -> bool {
    if value < 2 {
        return false;
    }
    if value < 4 {
        return true;
    }
    if value % 2 == 0 || value % 3 == 0 {
        return false;
    }
    // 6k +- 1 trial division; u64 so `i * i` cannot overflow near u32::MAX.
    let n = value as u64;
    let mut i = 5u64;
    while i * i <= n {
        if n % i == 0 || n % (i + 2) == 0 {
            return false;
        }
        i += 6;
    }
    true
}

/// Returns the smallest prime `>= value`, or `None` if it does not fit in `u32`.
#[must_use]
pub fn next_prime(value: u32) -> Option<u32> {
    let mut candidate = value.max(2);
    loop {
        if is_prime(candidate) {
            return Some(candidate);
        }
        candidate = candidate.checked_add(1)?;
    }
}

/// Returns `true` once `size / capacity` reaches the maximum load factor.
///
/// An empty table (`capacity == 0`) is always over the limit.
#[inline]
#[must_use]
pub const fn exceeds_load_factor(size: u32, capacity: u32) -> bool {
    if capacity == 0 {
        return true;
    }
    (size as u64) * 100 >= (capacity as u64) * MAX_LOAD_FACTOR_PERCENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(257, 256), 512);
    }

    #[test]
    fn test_is_prime() {
        let primes: Vec<u32> = (0..50).filter(|&n| is_prime(n)).collect();
        assert_eq!(
            primes,
            vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47]
        );
        assert!(is_prime(4_294_967_291));
        assert!(!is_prime(4_294_967_295));
    }

    #[test]
    fn test_next_prime() {
        assert_eq!(next_prime(0), Some(2));
        assert_eq!(next_prime(7), Some(7));
        assert_eq!(next_prime(9), Some(11));
        assert_eq!(next_prime(24), Some(29));
        assert_eq!(next_prime(u32::MAX), None);
    }

    #[test]
    fn test_load_factor_threshold() {
        assert!(exceeds_load_factor(0, 0));
        assert!(!exceeds_load_factor(4, 7)); // 0.57
        assert!(exceeds_load_factor(5, 7)); // 0.71
        assert!(!exceeds_load_factor(64, 100));
        assert!(exceeds_load_factor(65, 100));
    }
}
