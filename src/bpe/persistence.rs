//! Binary `.bpe` format (spec sections 4.5/6): `u16 delimiter_code` then
//! pairs of length-prefixed UTF-16 strings (`u16 len; u16 chars[len]`) in
//! learned order until EOF, ported from
//! `original_source/src/ml/byte_pair_encoding.hpp::save`/`load`.

use super::{BytePairEncoder, Merge};
use crate::errors::{HappyMlError, HappyMlResult};
use std::io::{ErrorKind, Read, Write};

pub fn save(model: &BytePairEncoder, writer: &mut dyn Write) -> HappyMlResult<()> {
    write_u16(writer, model.delimiter_code)?;
    for merge in &model.merges {
        write_symbol_string(writer, &merge.pair)?;
        write_symbol_string(writer, &[merge.replacement])?;
    }
    Ok(())
}

/// Reads until EOF, reconstructing the ordered merge list. `next_code` is
/// set to one past the largest code seen across every pair and replacement.
pub fn load(reader: &mut dyn Read) -> HappyMlResult<BytePairEncoder> {
    let delimiter_code = read_u16(reader)?.ok_or_else(|| HappyMlError::CorruptStream("empty .bpe stream".into()))?;
    let mut merges = Vec::new();
    let mut max_code = delimiter_code;

    loop {
        let Some(pair) = read_symbol_string(reader)? else {
            break;
        };
        let Some(replacement_string) = read_symbol_string(reader)? else {
            return Err(HappyMlError::CorruptStream("truncated merge pair in .bpe stream".into()));
        };
        let replacement = *replacement_string
            .first()
            .ok_or_else(|| HappyMlError::CorruptStream("empty replacement symbol in .bpe stream".into()))?;

        max_code = max_code.max(pair.iter().copied().max().unwrap_or(0)).max(replacement);
        merges.push(Merge { pair, replacement });
    }

    Ok(BytePairEncoder {
        merges,
        delimiter_code,
        next_code: max_code + 1,
    })
}

fn write_symbol_string(writer: &mut dyn Write, symbols: &[u16]) -> HappyMlResult<()> {
    let len = u16::try_from(symbols.len()).map_err(|_| HappyMlError::CorruptStream("symbol string too long for u16 length prefix".into()))?;
    write_u16(writer, len)?;
    for &symbol in symbols {
        write_u16(writer, symbol)?;
    }
    Ok(())
}

fn write_u16(writer: &mut dyn Write, value: u16) -> HappyMlResult<()> {
    writer.write_all(&value.to_be_bytes()).map_err(|e| HappyMlError::io("<bpe stream>", e))
}

fn read_u16(reader: &mut dyn Read) -> HappyMlResult<Option<u16>> {
    let mut buf = [0u8; 2];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(Some(u16::from_be_bytes(buf))),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(HappyMlError::io("<bpe stream>", e)),
    }
}

fn read_symbol_string(reader: &mut dyn Read) -> HappyMlResult<Option<Vec<u16>>> {
    let Some(len) = read_u16(reader)? else {
        return Ok(None);
    };
    let mut symbols = Vec::with_capacity(len as usize);
    for _ in 0..len {
        let symbol = read_u16(reader)?.ok_or_else(|| HappyMlError::CorruptStream("truncated symbol string in .bpe stream".into()))?;
        symbols.push(symbol);
    }
    Ok(Some(symbols))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bpe::TrainOptions;

    #[test]
    fn model_round_trips_through_bytes() {
        let mut model = BytePairEncoder::new(256);
        model.train(
            &["aaaa bbbb aaaa bbbb".to_string()],
            &TrainOptions { early_stopping_patience: None, min_frequency: 1, ..Default::default() },
        );
        let mut buf = Vec::new();
        save(&model, &mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let loaded = load(&mut cursor).unwrap();

        assert_eq!(loaded.delimiter_code(), model.delimiter_code());
        assert_eq!(loaded.merge_count(), model.merge_count());
        let sample = b"aaaa bbbb";
        assert_eq!(loaded.encode(sample), model.encode(sample));
    }

    #[test]
    fn empty_stream_is_reported_as_corrupt() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        assert!(matches!(load(&mut cursor), Err(HappyMlError::CorruptStream(_))));
    }
}
