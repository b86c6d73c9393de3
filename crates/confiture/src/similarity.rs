//! Ratcliff/Obershelp-style similarity ratio (spec §4.9, §10): used by the
//! Baseline Detector to fuzzy-match a live schema against a declared
//! snapshot when the exact fingerprint doesn't match.
//!
//! No string-similarity crate appears anywhere in the example pack, so this
//! is a direct, from-scratch longest-common-substring recursion, matching
//! the algorithm `difflib.SequenceMatcher.ratio()` implements in
//! `original_source/core/baseline_detector.py`.

/// Ratio in `[0.0, 1.0]`: `2 * M / T`, where `M` is the total length of
/// matching blocks found by recursively taking the longest common
/// substring and recursing left/right of it, and `T` is the combined
/// length of both strings.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matches = matching_blocks_length(&a, &b);
    (2.0 * matches as f64) / total as f64
}

fn matching_blocks_length(a: &[char], b: &[char]) -> usize {
    let (len, a_start, b_start) = longest_common_substring(a, b);
    if len == 0 {
        return 0;
    }
    let mut total = len;
    total += matching_blocks_length(&a[..a_start], &b[..b_start]);
    total += matching_blocks_length(&a[a_start + len..], &b[b_start + len..]);
    total
}

/// Returns `(length, a_start, b_start)` of the longest common substring,
/// preferring the match closest to the start of `a` on ties (matches
/// `difflib`'s tie-breaking behavior).
fn longest_common_substring(a: &[char], b: &[char]) -> (usize, usize, usize) {
    if a.is_empty() || b.is_empty() {
        return (0, 0, 0);
    }

    // DP table of match-run lengths ending at (i, j).
    let mut prev = vec![0usize; b.len() + 1];
    let mut best = (0usize, 0usize, 0usize);

    for i in 0..a.len() {
        let mut curr = vec![0usize; b.len() + 1];
        for j in 0..b.len() {
            if a[i] == b[j] {
                let run = prev[j] + 1;
                curr[j + 1] = run;
                if run > best.0 {
                    best = (run, i + 1 - run, j + 1 - run);
                }
            }
        }
        prev = curr;
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_have_ratio_one() {
        assert_eq!(ratio("hello world", "hello world"), 1.0);
    }

    #[test]
    fn disjoint_strings_have_ratio_zero() {
        assert_eq!(ratio("abc", "xyz"), 0.0);
    }

    #[test]
    fn empty_strings_have_ratio_one() {
        assert_eq!(ratio("", ""), 1.0);
    }

    #[test]
    fn partial_overlap_is_between_zero_and_one() {
        let r = ratio("create table users (id int)", "create table users (id bigint)");
        assert!(r > 0.8 && r < 1.0, "ratio was {r}");
    }

    #[test]
    fn is_symmetric() {
        let a = "the quick brown fox";
        let b = "the slow brown ox";
        assert_eq!(ratio(a, b), ratio(b, a));
    }

    #[test]
    fn small_edit_keeps_ratio_above_threshold() {
        let a = "create table orders (id bigint primary key, total numeric not null);";
        let b = "create table orders (id bigint primary key, total numeric);";
        assert!(ratio(a, b) >= 0.85);
    }
}
