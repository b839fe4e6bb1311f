//! Facet-Term Decoder (C6).
//!
//! The engine stores numeric terms prefix-coded per [`engine::codec`]: first
//! byte encodes a shift in `[0x20, 0x5F]`. Only `shift == 0` (leaf) terms are
//! real values; `shift > 0` entries are intermediate range-query trie nodes
//! and must never surface as bucket keys.

use crate::engine::codec::{decode_leaf_f64, SHIFT_END, SHIFT_START};
use crate::value::Value;

/// Decode one raw facet term. Returns `None` when the term is an
/// intermediate (non-leaf) prefix-coded helper and must be dropped from the
/// response entirely (spec §4.6, §8 invariant).
pub fn decode_facet_term(bytes: &[u8]) -> Option<Value> {
    if let Some(&first) = bytes.first() {
        if (SHIFT_START..=SHIFT_END).contains(&first) {
            let shift = first - SHIFT_START;
            if shift != 0 {
                return None;
            }
            if bytes.len() != 9 {
                return None;
            }
            let sortable = i64::from_be_bytes(bytes[1..9].try_into().ok()?);
            let f = decode_leaf_f64(sortable);
            return Some(numeric_value(f));
        }
    }
    decode_text_term(bytes)
}

fn numeric_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        Value::Int(f as i64)
    } else {
        Value::Float(f)
    }
}

fn decode_text_term(bytes: &[u8]) -> Option<Value> {
    let text = std::str::from_utf8(bytes).ok()?;
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Int(i));
    }
    if let Ok(f) = text.parse::<f64>() {
        return Some(Value::Float(f));
    }
    if text == "true" || text == "false" {
        return Some(Value::Bool(text == "true"));
    }
    Some(Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::codec::encode_prefix_term;

    #[test]
    fn leaf_prefix_term_decodes_to_numeric_value() {
        let encoded = encode_prefix_term(129.99, 0);
        let decoded = decode_facet_term(&encoded).unwrap();
        match decoded {
            Value::Float(f) => assert!((f - 129.99).abs() < 1e-9),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn integral_leaf_decodes_to_int_value() {
        let encoded = encode_prefix_term(4.0, 0);
        assert_eq!(decode_facet_term(&encoded), Some(Value::Int(4)));
    }

    #[test]
    fn non_leaf_shift_is_dropped() {
        let encoded = encode_prefix_term(129.99, 8);
        assert_eq!(decode_facet_term(&encoded), None);
    }

    #[test]
    fn plain_text_term_falls_back_to_string() {
        assert_eq!(decode_facet_term(b"electronics"), Some(Value::String("electronics".to_string())));
    }

    #[test]
    fn plain_text_numeric_parses_as_int() {
        assert_eq!(decode_facet_term(b"42"), Some(Value::Int(42)));
    }

    #[test]
    fn plain_text_bool_parses() {
        assert_eq!(decode_facet_term(b"true"), Some(Value::Bool(true)));
    }
}
