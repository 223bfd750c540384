//! Character-level string similarity.
//!
//! `ratio` is the Ratcliff/Obershelp matching ratio `2*M / (|a| + |b|)`, where `M`
//! is the number of characters in the matching blocks found by repeatedly taking
//! the longest common substring and recursing on both sides of it. It is the one
//! exact-similarity measure shared by the duplicate verifier, the fuzzy resolver
//! and the mutation applier.

use ahash::AHashMap;

/// Similarity ratio in `[0.0, 1.0]`. Two empty strings are identical (1.0).
pub fn ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio_chars(&a, &b)
}

/// `ratio` over pre-split character slices.
pub fn ratio_chars(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matches = matching_characters(a, b);
    2.0 * matches as f64 / total as f64
}

/// Upper bound on `ratio` given only the two lengths.
///
/// Lets callers skip the full comparison for candidates that cannot reach a threshold.
pub fn ratio_upper_bound(len_a: usize, len_b: usize) -> f64 {
    let total = len_a + len_b;
    if total == 0 {
        return 1.0;
    }
    2.0 * len_a.min(len_b) as f64 / total as f64
}

/// Total size of the matching blocks between `a` and `b`.
fn matching_characters(a: &[char], b: &[char]) -> usize {
    // Positions of every character in b
    let mut b2j: AHashMap<char, Vec<usize>> = AHashMap::new();
    for (j, c) in b.iter().enumerate() {
        b2j.entry(*c).or_default().push(j);
    }

    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }

    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]` as `(i, j, size)`.
///
/// Ties resolve to the earliest block in `a`, then in `b`.
fn longest_match(
    a: &[char],
    b2j: &AHashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);

    // j2len[j] = length of the match ending at a[i-1], b[j]
    let mut j2len: AHashMap<usize, usize> = AHashMap::new();

    for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut new_j2len: AHashMap<usize, usize> = AHashMap::new();
        if let Some(positions) = b2j.get(c) {
            for &j in positions {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = if j > 0 {
                    j2len.get(&(j - 1)).copied().unwrap_or(0) + 1
                } else {
                    1
                };
                new_j2len.insert(j, k);
                if k > best_size {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_size = k;
                }
            }
        }
        j2len = new_j2len;
    }

    (best_i, best_j, best_size)
}

/// Levenshtein edit distance over characters (insert, delete, substitute all cost 1).
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    // Keep the shorter string in the inner loop
    let (long, short) = if a.len() >= b.len() { (&a, &b) } else { (&b, &a) };
    if short.is_empty() {
        return long.len();
    }

    let mut prev: Vec<usize> = (0..=short.len()).collect();
    let mut curr: Vec<usize> = vec![0; short.len() + 1];

    for (i, lc) in long.iter().enumerate() {
        curr[0] = i + 1;
        for (j, sc) in short.iter().enumerate() {
            let cost = usize::from(lc != sc);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[short.len()]
}
