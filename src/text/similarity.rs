/// Character-level similarity between two keywords.
///
/// Implementations must be symmetric, deterministic and return a value in
/// `[0, 1]`.
pub trait SimilarityScorer: Send + Sync {
    fn similarity(&self, left: &str, right: &str) -> f64;
}

/// Normalized Levenshtein ratio: `1 - distance / max(len)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenshteinScorer;

impl SimilarityScorer for LevenshteinScorer {
    fn similarity(&self, left: &str, right: &str) -> f64 {
        let left = left.chars().collect::<Vec<char>>();
        let right = right.chars().collect::<Vec<char>>();
        let longest = left.len().max(right.len());
        if longest == 0 {
            return 1.0;
        }

        let distance = levenshtein(&left, &right);
        1.0 - distance as f64 / longest as f64
    }
}

fn levenshtein(left: &[char], right: &[char]) -> usize {
    if left.is_empty() {
        return right.len();
    }
    if right.is_empty() {
        return left.len();
    }

    let mut previous = (0..=right.len()).collect::<Vec<usize>>();
    let mut current = vec![0usize; right.len() + 1];

    for (i, left_char) in left.iter().enumerate() {
        current[0] = i + 1;
        for (j, right_char) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(left_char != right_char);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[right.len()]
}
