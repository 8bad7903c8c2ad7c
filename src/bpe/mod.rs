//! Byte-pair-encoder tokenizer core (spec section 4.5): a 16-bit symbol
//! vocabulary, greedy frequency-driven merges, and delimiter-wrapped
//! encode/decode, ported from `original_source/src/ml/byte_pair_encoding.hpp`.

pub mod persistence;
pub mod streaming;

use crate::errors::{HappyMlError, HappyMlResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;

const HARD_CEILING: u16 = 0x7FFE;

/// One learned rule: a two-symbol `pair` collapses to a single `replacement`
/// code. Stored in descending-replacement order (most-recently-learned
/// first), matching the wire format's "reverse learning order" contract.
#[derive(Debug, Clone)]
struct Merge {
    pair: Vec<u16>,
    replacement: u16,
}

pub struct TrainOptions {
    pub min_frequency: usize,
    pub num_merges: Option<usize>,
    pub early_stopping_patience: Option<u32>,
    pub early_stopping_improvement_minimum: f64,
    pub validation_seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        TrainOptions {
            min_frequency: 2,
            num_merges: None,
            early_stopping_patience: Some(15),
            early_stopping_improvement_minimum: 0.00001,
            validation_seed: 0,
        }
    }
}

pub struct BytePairEncoder {
    merges: Vec<Merge>,
    delimiter_code: u16,
    next_code: u16,
}

impl BytePairEncoder {
    pub fn new(delimiter_code: u16) -> Self {
        BytePairEncoder {
            merges: Vec::new(),
            delimiter_code,
            next_code: delimiter_code + 1,
        }
    }

    pub fn delimiter_code(&self) -> u16 {
        self.delimiter_code
    }

    pub fn merge_count(&self) -> usize {
        self.merges.len()
    }

    /// Surrounds `text` with one delimiter on each side, then applies every
    /// learned merge in reverse (most-recent-first) order.
    pub fn encode(&self, text: &[u8]) -> Vec<u16> {
        if text.is_empty() {
            return Vec::new();
        }
        let mut encoded: Vec<u16> = std::iter::once(self.delimiter_code)
            .chain(text.iter().map(|&b| b as u16))
            .chain(std::iter::once(self.delimiter_code))
            .collect();
        for merge in &self.merges {
            replace_all(&mut encoded, &merge.pair, merge.replacement);
        }
        encoded
    }

    /// Undoes every learned merge in forward (learned-first) order, then
    /// strips the surrounding delimiters. Fails if the resulting bytes
    /// contain a symbol outside the original byte range.
    pub fn decode(&self, encoded: &[u16]) -> HappyMlResult<Vec<u8>> {
        if encoded.is_empty() {
            return Ok(Vec::new());
        }
        let mut decoded = encoded.to_vec();
        for merge in self.merges.iter().rev() {
            replace_one_with_pair(&mut decoded, merge.replacement, &merge.pair);
        }
        if decoded.len() < 2 {
            return Err(HappyMlError::CorruptStream("decoded stream shorter than the delimiter wrapper".into()));
        }
        let body = &decoded[1..decoded.len() - 1];
        body.iter()
            .map(|&code| {
                u8::try_from(code).map_err(|_| HappyMlError::CorruptStream(format!("symbol {code} is not a raw byte")))
            })
            .collect()
    }

    /// Builds the initial pair-frequency vocabulary from whitespace/
    /// punctuation-split tokens, re-encoding each token through the current
    /// model first so repeated calls to `train` only grow the vocabulary.
    pub(crate) fn build_vocab(&self, lines: &[String]) -> HashMap<Vec<u16>, usize> {
        let mut vocab: HashMap<Vec<u16>, usize> = HashMap::new();
        for line in lines {
            for token in string_to_tokens(line) {
                let encoded = self.encode(token.as_bytes());
                for window in encoded.windows(2) {
                    *vocab.entry(window.to_vec()).or_insert(0) += 1;
                }
            }
        }
        vocab
    }

    /// Greedily merges the most frequent adjacent pair until the merge cap,
    /// the code-space ceiling, or early stopping by compression ratio ends
    /// the loop (spec section 4.5's three-step training loop).
    pub fn train(&mut self, lines: &[String], options: &TrainOptions) {
        let (train_lines, validation_lines) = if options.early_stopping_patience.is_some() {
            split_validation(lines, options.validation_seed)
        } else {
            (lines.to_vec(), Vec::new())
        };
        let validation_lines = if validation_lines.is_empty() { train_lines.clone() } else { validation_lines };

        let mut vocab = self.build_vocab(&train_lines);
        let mut best_score = f64::INFINITY;
        let mut no_improvement = 0u32;
        let mut merge_count = 0usize;

        loop {
            if vocab.is_empty() {
                break;
            }
            if let Some(cap) = options.num_merges {
                if merge_count >= cap {
                    break;
                }
            }

            let Some((pair, _count)) = most_frequent_pair(&vocab, options.min_frequency) else {
                break;
            };

            if self.next_code >= HARD_CEILING {
                break;
            }
            let new_code = self.next_code;
            self.next_code += 1;

            update_vocab_for_merge(&mut vocab, &pair, new_code);
            self.merges.push(Merge { pair: pair.clone(), replacement: new_code });
            merge_count += 1;

            if let Some(patience) = options.early_stopping_patience {
                let score = compression_ratio(&validation_lines, self);
                if score < best_score - options.early_stopping_improvement_minimum {
                    best_score = score;
                    no_improvement = 0;
                } else {
                    no_improvement += 1;
                    if no_improvement > patience {
                        break;
                    }
                }
            }
        }

        self.merges.sort_by(|a, b| b.replacement.cmp(&a.replacement));
    }
}

fn replace_all(haystack: &mut Vec<u16>, pair: &[u16], replacement: u16) {
    if pair.len() != 2 || haystack.len() < 2 {
        return;
    }
    let mut out = Vec::with_capacity(haystack.len());
    let mut i = 0;
    while i < haystack.len() {
        if i + 1 < haystack.len() && haystack[i] == pair[0] && haystack[i + 1] == pair[1] {
            out.push(replacement);
            i += 2;
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    *haystack = out;
}

fn replace_one_with_pair(haystack: &mut Vec<u16>, code: u16, pair: &[u16]) {
    let mut out = Vec::with_capacity(haystack.len());
    for &symbol in haystack.iter() {
        if symbol == code {
            out.extend_from_slice(pair);
        } else {
            out.push(symbol);
        }
    }
    *haystack = out;
}

fn most_frequent_pair(vocab: &HashMap<Vec<u16>, usize>, min_frequency: usize) -> Option<(Vec<u16>, usize)> {
    vocab
        .iter()
        .filter(|(pair, &count)| pair.len() > 1 && count >= min_frequency)
        .max_by_key(|(_, &count)| count)
        .map(|(pair, &count)| (pair.clone(), count))
}

fn update_vocab_for_merge(vocab: &mut HashMap<Vec<u16>, usize>, pair: &[u16], new_code: u16) {
    let merged_count = vocab.get(pair).copied().unwrap_or(0);
    vocab.remove(pair);

    let mut next: HashMap<Vec<u16>, usize> = HashMap::new();
    for (entry, count) in vocab.drain() {
        if contains_pair(&entry, pair) {
            let mut replaced = entry;
            replace_all(&mut replaced, pair, new_code);
            *next.entry(replaced).or_insert(0) += count;
        } else {
            *next.entry(entry).or_insert(0) += count;
        }
    }
    *next.entry(vec![new_code]).or_insert(0) += merged_count;
    next.retain(|_, count| *count > 0);
    *vocab = next;
}

fn contains_pair(haystack: &[u16], pair: &[u16]) -> bool {
    if pair.len() != 2 || haystack.len() < 2 {
        return false;
    }
    haystack.windows(2).any(|w| w == pair)
}

fn compression_ratio(lines: &[String], model: &BytePairEncoder) -> f64 {
    let mut original = 0.0f64;
    let mut encoded = 0.0f64;
    for line in lines {
        original += line.len() as f64;
        encoded += model.encode(line.as_bytes()).len() as f64;
    }
    if original < 1.0 {
        0.0
    } else {
        encoded / original
    }
}

fn split_validation(lines: &[String], seed: u64) -> (Vec<String>, Vec<String>) {
    let mut shuffled = lines.to_vec();
    shuffled.shuffle(&mut StdRng::seed_from_u64(seed));
    let split_at = shuffled.len() * 9 / 10;
    let validation = shuffled.split_off(split_at);
    (shuffled, validation)
}

/// Whitespace/punctuation-split tokenizer shared with `bpe::streaming`'s
/// reader-driven classifier, grounded in
/// `original_source/src/util/data_util.hpp::append_character`.
pub(crate) fn string_to_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut token = String::new();
    let mut last_char: char = '\0';
    for c in text.chars() {
        streaming::append_character(c, &mut last_char, &mut token, &mut tokens);
    }
    if !token.is_empty() {
        tokens.push(token);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_restores_original_bytes() {
        let mut model = BytePairEncoder::new(256);
        model.train(
            &["the quick brown fox".to_string(), "the slow brown dog".to_string()],
            &TrainOptions { early_stopping_patience: None, min_frequency: 1, ..Default::default() },
        );
        let encoded = model.encode(b"the brown fox");
        let decoded = model.decode(&encoded).unwrap();
        assert_eq!(decoded, b"the brown fox");
    }

    #[test]
    fn reencoding_an_encoded_string_is_idempotent() {
        let mut model = BytePairEncoder::new(256);
        model.train(
            &["aaaa bbbb aaaa bbbb".to_string()],
            &TrainOptions { early_stopping_patience: None, min_frequency: 1, ..Default::default() },
        );
        let once = model.encode(b"aaaa bbbb");
        let decoded = model.decode(&once).unwrap();
        let twice = model.encode(&decoded);
        assert_eq!(once, twice);
    }

    #[test]
    fn retraining_never_shrinks_the_merge_list() {
        let mut model = BytePairEncoder::new(256);
        let opts = TrainOptions { early_stopping_patience: None, min_frequency: 1, ..Default::default() };
        model.train(&["aaaa bbbb".to_string()], &opts);
        let first_len = model.merge_count();
        model.train(&["aaaa bbbb cccc dddd".to_string()], &opts);
        assert!(model.merge_count() >= first_len);
    }

    #[test]
    fn merges_are_sorted_by_replacement_code_descending() {
        let mut model = BytePairEncoder::new(256);
        model.train(
            &["abababab cdcdcdcd".to_string()],
            &TrainOptions { early_stopping_patience: None, min_frequency: 1, ..Default::default() },
        );
        let codes: Vec<u16> = model.merges.iter().map(|m| m.replacement).collect();
        let mut sorted = codes.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(codes, sorted);
    }
}
