//! Order-preserving key encoding.
//!
//! Encoded tuples compare with plain byte comparison in the same order as
//! [`Value::total_cmp`] field by field. Row keys, index keys and sort keys
//! all go through this module.
//!
//! Layout per value: a tag byte ranked by type, then a payload whose byte
//! order matches value order. All numerics share one tag and encode as a
//! 16-byte (integer part, fraction) pair so that integers and doubles
//! collate together. Byte strings are 0x00-escaped and terminated so that
//! prefixes sort first.

use crate::error::ValueError;
use crate::value::Value;
use chrono::DateTime;

const TAG_NULL: u8 = 0x05;
const TAG_FALSE: u8 = 0x10;
const TAG_TRUE: u8 = 0x11;
const TAG_NUMERIC: u8 = 0x20;
const TAG_TEXT: u8 = 0x30;
const TAG_BLOB: u8 = 0x40;
const TAG_TIMESTAMP: u8 = 0x50;

// 0x00 inside a byte string is escaped as (0x00, 0xFF); the terminator
// (0x00, 0x01) then sorts below any continuation.
const ESCAPE: u8 = 0x00;
const ESCAPED_00: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// Append the key encoding of `v` to `buf`.
pub fn encode_value(buf: &mut Vec<u8>, v: &Value) {
    match v {
        Value::Null => buf.push(TAG_NULL),
        Value::Boolean(false) => buf.push(TAG_FALSE),
        Value::Boolean(true) => buf.push(TAG_TRUE),
        Value::Integer(i) => encode_numeric_int(buf, *i as i64),
        Value::BigInt(i) => encode_numeric_int(buf, *i),
        Value::Double(d) => encode_numeric_double(buf, *d),
        Value::Text(s) => {
            buf.push(TAG_TEXT);
            encode_bytes(buf, s.as_bytes());
        }
        Value::Blob(b) => {
            buf.push(TAG_BLOB);
            encode_bytes(buf, b);
        }
        Value::Timestamp(t) => {
            buf.push(TAG_TIMESTAMP);
            buf.extend_from_slice(&flip_i64(t.timestamp_micros()).to_be_bytes());
        }
    }
}

/// Encode a tuple of values as one comparable key.
pub fn encode(values: &[Value]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 10);
    for v in values {
        encode_value(&mut buf, v);
    }
    buf
}

fn encode_numeric_int(buf: &mut Vec<u8>, i: i64) {
    buf.push(TAG_NUMERIC);
    buf.extend_from_slice(&flip_i64(i).to_be_bytes());
    buf.extend_from_slice(&enc_f64(0.0).to_be_bytes());
}

fn encode_numeric_double(buf: &mut Vec<u8>, d: f64) {
    buf.push(TAG_NUMERIC);
    if d.is_nan() {
        // NaN collates below every other numeric.
        buf.extend_from_slice(&[0u8; 16]);
        return;
    }
    let (int_part, frac) = if d >= i64::MAX as f64 {
        (i64::MAX, enc_f64(d))
    } else if d < i64::MIN as f64 {
        (i64::MIN, enc_f64(d))
    } else {
        let f = d.floor();
        (f as i64, enc_f64(d - f))
    };
    buf.extend_from_slice(&flip_i64(int_part).to_be_bytes());
    buf.extend_from_slice(&frac.to_be_bytes());
}

fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        buf.push(b);
        if b == ESCAPE {
            buf.push(ESCAPED_00);
        }
    }
    buf.push(ESCAPE);
    buf.push(TERMINATOR);
}

/// Sign-flip so the unsigned byte order matches the signed order.
fn flip_i64(i: i64) -> u64 {
    (i as u64) ^ (1 << 63)
}

fn unflip_i64(u: u64) -> i64 {
    (u ^ (1 << 63)) as i64
}

/// IEEE total-order byte mapping for doubles.
fn enc_f64(d: f64) -> u64 {
    let bits = d.to_bits();
    if d.is_sign_negative() {
        !bits
    } else {
        bits ^ (1 << 63)
    }
}

fn dec_f64(u: u64) -> f64 {
    if u & (1 << 63) != 0 {
        f64::from_bits(u ^ (1 << 63))
    } else {
        f64::from_bits(!u)
    }
}

/// Decode the values of an encoded tuple.
///
/// The numeric class is normalizing: an integer-valued field decodes as
/// BigInt and a fractional one as Double, regardless of the width that was
/// encoded. Callers that need the declared type re-cast against a schema.
pub fn decode(mut input: &[u8]) -> Result<Vec<Value>, ValueError> {
    let mut out = Vec::new();
    while !input.is_empty() {
        let (v, rest) = decode_one(input)?;
        out.push(v);
        input = rest;
    }
    Ok(out)
}

fn decode_one(input: &[u8]) -> Result<(Value, &[u8]), ValueError> {
    let (&tag, rest) = input
        .split_first()
        .ok_or_else(|| ValueError::corrupt("empty key"))?;
    match tag {
        TAG_NULL => Ok((Value::Null, rest)),
        TAG_FALSE => Ok((Value::Boolean(false), rest)),
        TAG_TRUE => Ok((Value::Boolean(true), rest)),
        TAG_NUMERIC => {
            if rest.len() < 16 {
                return Err(ValueError::corrupt("truncated numeric key"));
            }
            let int_part = unflip_i64(u64::from_be_bytes(rest[..8].try_into().unwrap()));
            let frac_bits = u64::from_be_bytes(rest[8..16].try_into().unwrap());
            let rest = &rest[16..];
            if frac_bits == 0 {
                // NaN marker.
                return Ok((Value::Double(f64::NAN), rest));
            }
            let frac = dec_f64(frac_bits);
            let v = if frac == 0.0 {
                Value::BigInt(int_part)
            } else if (0.0..1.0).contains(&frac) {
                Value::Double(int_part as f64 + frac)
            } else {
                // Out-of-range double, stored whole in the fraction field.
                Value::Double(frac)
            };
            Ok((v, rest))
        }
        TAG_TEXT => {
            let (bytes, rest) = decode_bytes(rest)?;
            let s = String::from_utf8(bytes).map_err(|_| ValueError::corrupt("invalid utf-8 in key"))?;
            Ok((Value::Text(s), rest))
        }
        TAG_BLOB => {
            let (bytes, rest) = decode_bytes(rest)?;
            Ok((Value::Blob(bytes), rest))
        }
        TAG_TIMESTAMP => {
            if rest.len() < 8 {
                return Err(ValueError::corrupt("truncated timestamp key"));
            }
            let micros = unflip_i64(u64::from_be_bytes(rest[..8].try_into().unwrap()));
            let t = DateTime::from_timestamp_micros(micros)
                .ok_or_else(|| ValueError::corrupt("timestamp out of range"))?;
            Ok((Value::Timestamp(t), &rest[8..]))
        }
        other => Err(ValueError::corrupt(format!("unknown key tag {other:#04x}"))),
    }
}

fn decode_bytes(input: &[u8]) -> Result<(Vec<u8>, &[u8]), ValueError> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        if b != ESCAPE {
            out.push(b);
            i += 1;
            continue;
        }
        match input.get(i + 1) {
            Some(&ESCAPED_00) => {
                out.push(0x00);
                i += 2;
            }
            Some(&TERMINATOR) => return Ok((out, &input[i + 2..])),
            _ => return Err(ValueError::corrupt("bad byte-string escape in key")),
        }
    }
    Err(ValueError::corrupt("unterminated byte string in key"))
}
