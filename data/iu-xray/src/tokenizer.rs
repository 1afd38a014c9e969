use std::collections::HashMap;

use crate::types::Annotation;

/// Id shared by padding, begin-of-report and end-of-report.
pub const PAD_ID: usize = 0;
pub const UNK_TOKEN: &str = "<unk>";

/// Word-level vocabulary built from the training reports.
#[derive(Debug, Clone)]
pub struct ReportTokenizer {
    token2idx: HashMap<String, usize>,
    idx2token: Vec<String>,
}

impl ReportTokenizer {
    /// Builds the vocabulary from the cleaned training split, keeping tokens seen
    /// at least `threshold` times.
    pub fn from_annotation(annotation: &Annotation, threshold: usize) -> Self {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for entry in &annotation.train {
            for token in clean_report(&entry.report).split_whitespace() {
                *counts.entry(token.to_string()).or_insert(0) += 1;
            }
        }

        let mut vocab: Vec<String> = counts
            .into_iter()
            .filter(|(_, count)| *count >= threshold)
            .map(|(token, _)| token)
            .collect();
        vocab.push(UNK_TOKEN.to_string());
        vocab.sort();
        vocab.dedup();

        let tokenizer = Self::from_vocab(vocab);
        tracing::info!("tokenizer vocabulary: {} ids", tokenizer.vocab_size());
        tokenizer
    }

    fn from_vocab(idx2token: Vec<String>) -> Self {
        let token2idx = idx2token
            .iter()
            .enumerate()
            .map(|(idx, token)| (token.clone(), idx + 1))
            .collect();

        Self {
            token2idx,
            idx2token,
        }
    }

    /// Number of output classes, including the reserved id 0.
    pub fn vocab_size(&self) -> usize {
        self.token2idx.len() + 1
    }

    pub fn token_id(&self, token: &str) -> usize {
        self.token2idx
            .get(token)
            .or_else(|| self.token2idx.get(UNK_TOKEN))
            .copied()
            .unwrap_or(PAD_ID)
    }

    /// Encodes a raw report as `[0, ids.., 0]`.
    pub fn encode(&self, report: &str) -> Vec<usize> {
        let cleaned = clean_report(report);
        let mut ids = Vec::with_capacity(cleaned.len() / 4 + 2);
        ids.push(PAD_ID);
        ids.extend(cleaned.split_whitespace().map(|token| self.token_id(token)));
        ids.push(PAD_ID);
        ids
    }

    /// Decodes ids up to, not including, the first 0.
    pub fn decode(&self, ids: &[usize]) -> String {
        ids.iter()
            .take_while(|&&idx| idx != PAD_ID)
            .map(|&idx| {
                self.idx2token
                    .get(idx - 1)
                    .map(String::as_str)
                    .unwrap_or(UNK_TOKEN)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Normalizes an IU X-ray report into `sentence . sentence . ... .` form.
pub fn clean_report(report: &str) -> String {
    let mut text = report.to_string();
    for _ in 0..3 {
        text = text.replace("..", ".");
    }
    text = text.replace("1. ", "");
    for n in 2..=5 {
        text = text.replace(&format!(". {n}. "), ". ");
    }
    for n in 2..=5 {
        text = text.replace(&format!(" {n}. "), ". ");
    }
    let text = text.trim().to_lowercase();

    let sentences: Vec<String> = text
        .split(". ")
        .map(clean_sentence)
        .filter(|sentence| !sentence.is_empty())
        .collect();

    if sentences.is_empty() {
        return String::new();
    }
    format!("{} .", sentences.join(" . "))
}

fn clean_sentence(sentence: &str) -> String {
    let sentence: String = sentence
        .chars()
        .filter(|c| !matches!(c, '"' | '/' | '\\' | '\''))
        .collect();

    sentence
        .trim()
        .to_lowercase()
        .chars()
        .filter(|&c| !is_punctuation(c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_punctuation(c: char) -> bool {
    matches!(
        c,
        '.' | ',' | '?' | '*' | '!' | '%' | '^' | '&' | '_' | '+' | '(' | ')' | ']' | '{' | '}'
    ) || (':'..='[').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnnotationEntry;

    fn entry(report: &str) -> AnnotationEntry {
        AnnotationEntry {
            id: "case".to_string(),
            report: report.to_string(),
            image_path: vec!["case/0.png".to_string()],
            split: None,
        }
    }

    fn annotation(reports: &[&str]) -> Annotation {
        Annotation {
            train: reports.iter().map(|r| entry(r)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn cleaning_strips_enumerations_and_punctuation() {
        let cleaned = clean_report("1. The heart is normal.. 2. No effusion, (none).");
        assert_eq!(cleaned, "the heart is normal . no effusion none .");
    }

    #[test]
    fn rare_tokens_fall_back_to_unk() {
        let tokenizer = annotation(&["lungs clear.", "lungs clear.", "lungs clear rare."]);
        let tokenizer = ReportTokenizer::from_annotation(&tokenizer, 3);

        // "." "clear" "lungs" "<unk>" plus the reserved 0
        assert_eq!(tokenizer.vocab_size(), 5);
        let ids = tokenizer.encode("lungs rare");
        assert_eq!(ids.first(), Some(&PAD_ID));
        assert_eq!(ids.last(), Some(&PAD_ID));
        assert_eq!(ids[2], tokenizer.token_id(UNK_TOKEN));
    }

    #[test]
    fn decode_stops_at_first_zero() {
        let tokenizer = ReportTokenizer::from_annotation(&annotation(&["no acute disease."]), 1);
        let mut ids = tokenizer.encode("no acute disease.");
        ids.extend([tokenizer.token_id("acute"), PAD_ID]);

        assert_eq!(tokenizer.decode(&ids[1..]), "no acute disease .");
        assert_eq!(tokenizer.decode(&[PAD_ID, tokenizer.token_id("no")]), "");
    }
}
