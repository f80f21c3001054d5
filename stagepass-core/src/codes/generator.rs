use rand::rngs::OsRng;
use rand::Rng;

use super::CodeError;

const CODE_RANGE: std::ops::RangeInclusive<u32> = 10_000..=99_999;

/// Draws an unguessable 5-digit code from the OS entropy source,
/// retrying past the weak patterns a human could guess.
///
/// Uniqueness against already-issued codes is the caller's job.
pub fn generate_code(attempts: usize) -> Result<String, CodeError> {
    for _ in 0..attempts {
        let code = OsRng.gen_range(CODE_RANGE).to_string();

        if !is_weak_pattern(&code) {
            return Ok(code);
        }
    }

    // The weak patterns are 20 codes out of 90000, so landing here means
    // the entropy source is broken. Still an error, not a panic.
    Err(CodeError::GenerationExhausted(attempts))
}

/// True for all-identical digits, or digit runs stepping up or down by
/// exactly one (11111, 12345, 54321).
pub fn is_weak_pattern(code: &str) -> bool {
    let digits: Vec<i8> = code.bytes().map(|b| (b - b'0') as i8).collect();

    let all_same = digits.windows(2).all(|w| w[1] == w[0]);
    let ascending = digits.windows(2).all(|w| w[1] - w[0] == 1);
    let descending = digits.windows(2).all(|w| w[0] - w[1] == 1);

    all_same || ascending || descending
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_patterns_are_exactly_the_known_ones() {
        let weak: Vec<_> = CODE_RANGE
            .map(|n| n.to_string())
            .filter(|c| is_weak_pattern(c))
            .collect();

        // 9 repdigits, 5 ascending runs (12345..56789), 6 descending
        // runs (98765..43210)
        assert_eq!(weak.len(), 20);
        assert!(weak.contains(&"11111".to_string()));
        assert!(weak.contains(&"12345".to_string()));
        assert!(weak.contains(&"56789".to_string()));
        assert!(weak.contains(&"98765".to_string()));
        assert!(weak.contains(&"43210".to_string()));
    }

    #[test]
    fn near_misses_are_not_weak() {
        assert!(!is_weak_pattern("11112"));
        assert!(!is_weak_pattern("12346"));
        assert!(!is_weak_pattern("13579"));
        assert!(!is_weak_pattern("54322"));
    }

    #[test]
    fn generated_codes_are_well_formed() {
        for _ in 0..100 {
            let code = generate_code(10).expect("generates within bound");

            assert_eq!(code.len(), 5);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
            assert!(!is_weak_pattern(&code));
        }
    }

    #[test]
    fn zero_attempts_exhausts() {
        assert!(matches!(
            generate_code(0),
            Err(CodeError::GenerationExhausted(0))
        ));
    }
}
