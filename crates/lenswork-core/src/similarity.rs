//! Fuzzy name matching via the Dice bigram coefficient.
//!
//! Chosen over edit distance because it tolerates token reorderings
//! common in company names while staying O(n + m).

use std::collections::HashMap;

/// Similarity of two names in [0, 1].
///
/// Input is lowercased and whitespace-collapsed before comparison.
/// Strings shorter than two characters fall back to exact equality.
pub fn dice_coefficient(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let a_bigrams = bigrams(&a);
    let b_bigrams = bigrams(&b);
    if a_bigrams.is_empty() || b_bigrams.is_empty() {
        // at least one single-character name, and they differ
        return 0.0;
    }

    let mut counts: HashMap<(char, char), usize> = HashMap::new();
    for bigram in &a_bigrams {
        *counts.entry(*bigram).or_insert(0) += 1;
    }

    let mut matches = 0usize;
    for bigram in &b_bigrams {
        if let Some(count) = counts.get_mut(bigram) {
            if *count > 0 {
                *count -= 1;
                matches += 1;
            }
        }
    }

    (2.0 * matches as f64) / (a_bigrams.len() + b_bigrams.len()) as f64
}

fn normalize(input: &str) -> String {
    input
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn bigrams(input: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = input.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}
