//! Request numbers: `REQ-<YYYYMMDD>-<4 digits>`.
//!
//! Uniqueness is not guaranteed here; the caller regenerates while storage
//! reports a collision.

use chrono::NaiveDate;
use rand::Rng;

pub const REQUEST_NUMBER_PREFIX: &str = "REQ";

pub fn generate_request_number<R: Rng + ?Sized>(date: NaiveDate, rng: &mut R) -> String {
    let suffix: u16 = rng.gen_range(0..10_000);
    format!("{REQUEST_NUMBER_PREFIX}-{}-{suffix:04}", date.format("%Y%m%d"))
}

pub fn is_valid_request_number(s: &str) -> bool {
    let mut parts = s.split('-');
    let (Some(prefix), Some(date), Some(suffix), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    prefix == REQUEST_NUMBER_PREFIX
        && date.len() == 8
        && NaiveDate::parse_from_str(date, "%Y%m%d").is_ok()
        && suffix.len() == 4
        && suffix.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[test]
    fn format_matches_pattern() {
        let mut rng = StdRng::seed_from_u64(7);
        let number = generate_request_number(date(), &mut rng);
        assert!(number.starts_with("REQ-20250314-"));
        assert_eq!(number.len(), "REQ-20250314-0000".len());
        assert!(is_valid_request_number(&number));
    }

    #[test]
    fn validator_rejects_malformed_numbers() {
        assert!(!is_valid_request_number("REQ-20250314-12"));
        assert!(!is_valid_request_number("ORD-20250314-1234"));
        assert!(!is_valid_request_number("REQ-20251340-1234"));
        assert!(!is_valid_request_number("REQ-20250314-1234-9"));
    }

    /// Generate-until-unused mirrors what the service does against storage.
    fn next_unused(taken: &HashSet<String>, rng: &mut StdRng, attempts: usize) -> Option<String> {
        (0..attempts)
            .map(|_| generate_request_number(date(), rng))
            .find(|candidate| !taken.contains(candidate))
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 64,
                ..ProptestConfig::default()
            })]

            /// Property: generation with retry never yields an already stored number.
            #[test]
            fn retry_never_collides(seed in any::<u64>(), count in 1usize..300) {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut taken = HashSet::new();
                for _ in 0..count {
                    let number = next_unused(&taken, &mut rng, 1_000).unwrap();
                    prop_assert!(is_valid_request_number(&number));
                    prop_assert!(taken.insert(number));
                }
                prop_assert_eq!(taken.len(), count);
            }
        }
    }
}
