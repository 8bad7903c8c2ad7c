//! Streaming vocabulary construction from a `Read` stream: the same
//! whitespace/punctuation/alnum classifier as `bpe::string_to_tokens`, but
//! operating on fixed-size buffers so a large corpus is never fully
//! materialized into memory, grounded in
//! `original_source/src/util/data_util.hpp::append_character` and
//! `load_file_to_tokens`.

use super::BytePairEncoder;
use std::collections::HashMap;
use std::io::Read;

const BUFFER_SIZE: usize = 32 * 1024;
const NON_PRINTABLE_SENTINEL: char = '\u{FE}';

/// Classifies one character, appending to `token` or flushing completed
/// tokens into `tokens`. Whitespace runs collapse to a single token;
/// punctuation (printable, non-alnum, not a decimal point inside a number)
/// becomes its own one-character token; everything else accumulates,
/// non-printable bytes mapped to the `0xFE` sentinel.
pub(crate) fn append_character(c: char, last_char: &mut char, token: &mut String, tokens: &mut Vec<String>) {
    if c == '\r' {
        return;
    }

    if c.is_whitespace() {
        if c != *last_char {
            if !token.is_empty() {
                tokens.push(std::mem::take(token));
            }
            token.push(c);
        }
    } else if c.is_ascii_graphic() && !c.is_alphanumeric() && !(c == '.' && last_char.is_ascii_digit()) {
        if !token.is_empty() {
            tokens.push(std::mem::take(token));
        }
        tokens.push(c.to_string());
    } else if !c.is_ascii_graphic() && !c.is_whitespace() {
        token.push(NON_PRINTABLE_SENTINEL);
    } else {
        token.push(c);
    }
    *last_char = c;
}

fn tokens_from_bytes(bytes: &[u8], last_char: &mut char, token: &mut String, tokens: &mut Vec<String>) {
    for &byte in bytes {
        append_character(byte as char, last_char, token, tokens);
    }
}

/// Reads `reader` in fixed-size buffers, classifying bytes into tokens
/// without ever holding the whole corpus, and folds them directly into a
/// pair-frequency vocabulary the way `BytePairEncoder::build_vocab` would.
pub fn build_vocab_streaming(
    model: &BytePairEncoder,
    reader: &mut dyn Read,
) -> std::io::Result<HashMap<Vec<u16>, usize>> {
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut token = String::new();
    let mut last_char = '\0';
    let mut tokens: Vec<String> = Vec::new();
    let mut vocab: HashMap<Vec<u16>, usize> = HashMap::new();

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        tokens_from_bytes(&buffer[..read], &mut last_char, &mut token, &mut tokens);
        drain_tokens_into_vocab(model, &mut tokens, &mut vocab);
    }
    if !token.is_empty() {
        tokens.push(token);
    }
    drain_tokens_into_vocab(model, &mut tokens, &mut vocab);

    Ok(vocab)
}

fn drain_tokens_into_vocab(model: &BytePairEncoder, tokens: &mut Vec<String>, vocab: &mut HashMap<Vec<u16>, usize>) {
    for token in tokens.drain(..) {
        let encoded = model.encode(token.as_bytes());
        for window in encoded.windows(2) {
            *vocab.entry(window.to_vec()).or_insert(0) += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn streaming_tokenizer_splits_on_whitespace_and_punctuation() {
        let mut token = String::new();
        let mut last_char = '\0';
        let mut tokens = Vec::new();
        for c in "foo, bar.".chars() {
            append_character(c, &mut last_char, &mut token, &mut tokens);
        }
        if !token.is_empty() {
            tokens.push(token);
        }
        // a whitespace run opens a token but does not flush before the
        // next non-space run, so the space rides along with "bar".
        assert_eq!(tokens, vec!["foo", ",", " bar", "."]);
    }

    #[test]
    fn streaming_vocab_matches_non_streaming_pair_counts_on_small_input() {
        let model = BytePairEncoder::new(256);
        let text = "aa bb aa bb";
        let mut cursor = Cursor::new(text.as_bytes());
        let streamed = build_vocab_streaming(&model, &mut cursor).unwrap();
        let direct = model.build_vocab(&[text.to_string()]);
        assert_eq!(streamed, direct);
    }
}
