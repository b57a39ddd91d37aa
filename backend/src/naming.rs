//! Short display names for new matches.

use chrono::{DateTime, Datelike, TimeZone, Utc};

const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const LENGTH: usize = 7;
/// 62^7, the number of distinct names.
const SPACE: u64 = 3_521_614_606_208;
/// Coprime with `SPACE`, so neighbouring offsets land far apart.
const MULTIPLIER: u64 = 7;

/// Milliseconds elapsed since the start of `now`'s UTC year.
pub fn year_offset(now: DateTime<Utc>) -> u64 {
    let start = Utc
        .with_ymd_and_hms(now.year(), 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(now);
    (now - start).num_milliseconds().max(0) as u64
}

pub fn encode_offset(offset: u64) -> String {
    let mut permuted = (offset % SPACE) * MULTIPLIER % SPACE;
    let mut chars = [0u8; LENGTH];
    for slot in chars.iter_mut().rev() {
        *slot = ALPHABET[(permuted % 62) as usize];
        permuted /= 62;
    }
    chars.iter().map(|&c| c as char).collect()
}

pub fn generate(now: DateTime<Utc>) -> String {
    encode_offset(year_offset(now))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn start_of_year_is_all_first_letter() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(year_offset(start), 0);
        assert_eq!(generate(start), "AAAAAAA");
    }

    #[test]
    fn small_offsets_are_spread_out() {
        assert_eq!(encode_offset(1), "AAAAAAH");
        assert_eq!(encode_offset(9), "AAAAABB");
    }

    #[test]
    fn names_have_fixed_shape() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        let name = generate(now);
        assert_eq!(name.len(), LENGTH);
        assert!(name.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn distinct_milliseconds_give_distinct_names() {
        let names: HashSet<String> = (0..10_000u64).map(|ms| encode_offset(ms * 997)).collect();
        assert_eq!(names.len(), 10_000);
    }
}
