use std::collections::{BTreeMap, HashMap};

const MAX_ORDER: usize = 4;
const TINY: f64 = 1e-15;
const SMALL: f64 = 1e-9;
const ROUGE_BETA: f64 = 1.2;

/// Corpus-level text generation metrics over parallel reference/hypothesis lists.
pub trait Scorer {
    fn score(&self, references: &[String], hypotheses: &[String]) -> BTreeMap<String, f64>;
}

/// BLEU-1..4 and ROUGE-L, computed the way the COCO caption toolkit does.
#[derive(Debug, Default, Clone, Copy)]
pub struct CaptionScorer;

impl Scorer for CaptionScorer {
    fn score(&self, references: &[String], hypotheses: &[String]) -> BTreeMap<String, f64> {
        let mut scores = BTreeMap::new();
        for (order, value) in bleu(references, hypotheses).into_iter().enumerate() {
            scores.insert(format!("BLEU_{}", order + 1), value);
        }
        scores.insert("ROUGE_L".to_string(), rouge_l(references, hypotheses));
        scores
    }
}

fn ngram_counts(tokens: &[&str], order: usize) -> HashMap<Vec<String>, usize> {
    let mut counts = HashMap::new();
    if tokens.len() >= order {
        for window in tokens.windows(order) {
            let key = window.iter().map(|token| token.to_string()).collect();
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    counts
}

/// Corpus BLEU for orders 1..=4 with the brevity penalty over total lengths.
pub fn bleu(references: &[String], hypotheses: &[String]) -> [f64; MAX_ORDER] {
    let mut correct = [0usize; MAX_ORDER];
    let mut guessed = [0usize; MAX_ORDER];
    let mut test_len = 0usize;
    let mut ref_len = 0usize;

    for (reference, hypothesis) in references.iter().zip(hypotheses) {
        let ref_tokens: Vec<&str> = reference.split_whitespace().collect();
        let hyp_tokens: Vec<&str> = hypothesis.split_whitespace().collect();
        test_len += hyp_tokens.len();
        ref_len += ref_tokens.len();

        for order in 1..=MAX_ORDER {
            let ref_counts = ngram_counts(&ref_tokens, order);
            let hyp_counts = ngram_counts(&hyp_tokens, order);
            guessed[order - 1] += hyp_tokens.len().saturating_sub(order - 1);
            correct[order - 1] += hyp_counts
                .iter()
                .map(|(gram, &count)| count.min(ref_counts.get(gram).copied().unwrap_or(0)))
                .sum::<usize>();
        }
    }

    let ratio = (test_len as f64 + TINY) / (ref_len as f64 + SMALL);
    let brevity = if ratio < 1.0 { (1.0 - 1.0 / ratio).exp() } else { 1.0 };

    let mut scores = [0.0; MAX_ORDER];
    let mut product = 1.0;
    for order in 0..MAX_ORDER {
        product *= (correct[order] as f64 + TINY) / (guessed[order] as f64 + SMALL);
        scores[order] = product.powf(1.0 / (order + 1) as f64) * brevity;
    }
    scores
}

fn lcs(a: &[&str], b: &[&str]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for token in a {
        let mut diagonal = 0;
        for (j, other) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if token == other {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

/// Mean LCS-based F-measure over the pairs.
pub fn rouge_l(references: &[String], hypotheses: &[String]) -> f64 {
    let pairs = references.len().min(hypotheses.len());
    if pairs == 0 {
        return 0.0;
    }

    let total: f64 = references
        .iter()
        .zip(hypotheses)
        .map(|(reference, hypothesis)| {
            let ref_tokens: Vec<&str> = reference.split_whitespace().collect();
            let hyp_tokens: Vec<&str> = hypothesis.split_whitespace().collect();
            if ref_tokens.is_empty() || hyp_tokens.is_empty() {
                return 0.0;
            }
            let common = lcs(&ref_tokens, &hyp_tokens) as f64;
            let precision = common / hyp_tokens.len() as f64;
            let recall = common / ref_tokens.len() as f64;
            if precision == 0.0 || recall == 0.0 {
                return 0.0;
            }
            let beta2 = ROUGE_BETA * ROUGE_BETA;
            ((1.0 + beta2) * precision * recall) / (recall + beta2 * precision)
        })
        .sum();

    total / pairs as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identical_corpus_scores_one() {
        let refs = texts(&["the heart is normal in size .", "no pleural effusion is seen ."]);
        let scores = CaptionScorer.score(&refs, &refs);

        assert_eq!(
            scores.keys().cloned().collect::<Vec<_>>(),
            vec!["BLEU_1", "BLEU_2", "BLEU_3", "BLEU_4", "ROUGE_L"]
        );
        assert!(scores.values().all(|v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn short_hypotheses_are_penalized() {
        let refs = texts(&["the lungs are clear bilaterally ."]);
        let hyps = texts(&["the lungs"]);

        let [b1, ..] = bleu(&refs, &hyps);
        // Both unigrams match; only the brevity penalty applies.
        assert!((b1 - (1.0f64 - 6.0 / 2.0).exp()).abs() < 1e-6);
    }

    #[test]
    fn rouge_uses_longest_common_subsequence() {
        let refs = texts(&["a b c d"]);
        let hyps = texts(&["a c d e"]);
        // lcs = 3, p = r = 0.75
        assert!((rouge_l(&refs, &hyps) - 0.75).abs() < 1e-9);
        assert_eq!(rouge_l(&texts(&["a"]), &texts(&[""])), 0.0);
    }
}
