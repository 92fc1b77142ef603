//! Self-describing row encoding.
//!
//! Persisted records, catalog rows and spill files all use this format:
//! a column count followed by `(name, tagged value)` pairs. Unlike the
//! key encoding it is not order preserving; it optimizes for compact
//! round-tripping instead.

use crate::error::ValueError;
use crate::row::Row;
use crate::value::Value;
use chrono::DateTime;

const TAG_NULL: u8 = 0;
const TAG_FALSE: u8 = 1;
const TAG_TRUE: u8 = 2;
const TAG_INTEGER: u8 = 3;
const TAG_BIGINT: u8 = 4;
const TAG_DOUBLE: u8 = 5;
const TAG_TEXT: u8 = 6;
const TAG_BLOB: u8 = 7;
const TAG_TIMESTAMP: u8 = 8;

pub fn encode_row(row: &Row, buf: &mut Vec<u8>) {
    write_uvarint(buf, row.len() as u64);
    for (name, value) in row.iter() {
        write_uvarint(buf, name.len() as u64);
        buf.extend_from_slice(name.as_bytes());
        encode_value(value, buf);
    }
}

pub fn decode_row(bytes: &[u8]) -> Result<Row, ValueError> {
    let mut r = Reader::new(bytes);
    let count = r.uvarint()?;
    let mut row = Row::new();
    for _ in 0..count {
        let name_len = r.uvarint()? as usize;
        let name = std::str::from_utf8(r.take(name_len)?)
            .map_err(|_| ValueError::corrupt("invalid utf-8 in column name"))?
            .to_owned();
        let value = decode_value_inner(&mut r)?;
        row.push(name, value);
    }
    if !r.is_empty() {
        return Err(ValueError::corrupt("trailing bytes after row"));
    }
    Ok(row)
}

pub fn encode_value(v: &Value, buf: &mut Vec<u8>) {
    match v {
        Value::Null => buf.push(TAG_NULL),
        Value::Boolean(false) => buf.push(TAG_FALSE),
        Value::Boolean(true) => buf.push(TAG_TRUE),
        Value::Integer(i) => {
            buf.push(TAG_INTEGER);
            buf.extend_from_slice(&i.to_be_bytes());
        }
        Value::BigInt(i) => {
            buf.push(TAG_BIGINT);
            buf.extend_from_slice(&i.to_be_bytes());
        }
        Value::Double(d) => {
            buf.push(TAG_DOUBLE);
            buf.extend_from_slice(&d.to_bits().to_be_bytes());
        }
        Value::Text(s) => {
            buf.push(TAG_TEXT);
            write_uvarint(buf, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Blob(b) => {
            buf.push(TAG_BLOB);
            write_uvarint(buf, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Timestamp(t) => {
            buf.push(TAG_TIMESTAMP);
            buf.extend_from_slice(&t.timestamp_micros().to_be_bytes());
        }
    }
}

pub fn decode_value(bytes: &[u8]) -> Result<Value, ValueError> {
    let mut r = Reader::new(bytes);
    let v = decode_value_inner(&mut r)?;
    if !r.is_empty() {
        return Err(ValueError::corrupt("trailing bytes after value"));
    }
    Ok(v)
}

fn decode_value_inner(r: &mut Reader<'_>) -> Result<Value, ValueError> {
    let tag = r.byte()?;
    let v = match tag {
        TAG_NULL => Value::Null,
        TAG_FALSE => Value::Boolean(false),
        TAG_TRUE => Value::Boolean(true),
        TAG_INTEGER => Value::Integer(i32::from_be_bytes(r.array()?)),
        TAG_BIGINT => Value::BigInt(i64::from_be_bytes(r.array()?)),
        TAG_DOUBLE => Value::Double(f64::from_bits(u64::from_be_bytes(r.array()?))),
        TAG_TEXT => {
            let len = r.uvarint()? as usize;
            let s = std::str::from_utf8(r.take(len)?)
                .map_err(|_| ValueError::corrupt("invalid utf-8 in text value"))?;
            Value::Text(s.to_owned())
        }
        TAG_BLOB => {
            let len = r.uvarint()? as usize;
            Value::Blob(r.take(len)?.to_vec())
        }
        TAG_TIMESTAMP => {
            let micros = i64::from_be_bytes(r.array()?);
            let t = DateTime::from_timestamp_micros(micros)
                .ok_or_else(|| ValueError::corrupt("timestamp out of range"))?;
            Value::Timestamp(t)
        }
        other => return Err(ValueError::corrupt(format!("unknown value tag {other}"))),
    };
    Ok(v)
}

fn write_uvarint(buf: &mut Vec<u8>, mut v: u64) {
    loop {
        let b = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            buf.push(b);
            return;
        }
        buf.push(b | 0x80);
    }
}

struct Reader<'a> {
    input: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Reader { input }
    }

    fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    fn byte(&mut self) -> Result<u8, ValueError> {
        let (&b, rest) = self
            .input
            .split_first()
            .ok_or_else(|| ValueError::corrupt("unexpected end of input"))?;
        self.input = rest;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ValueError> {
        if self.input.len() < n {
            return Err(ValueError::corrupt("unexpected end of input"));
        }
        let (head, rest) = self.input.split_at(n);
        self.input = rest;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ValueError> {
        Ok(self.take(N)?.try_into().unwrap())
    }

    fn uvarint(&mut self) -> Result<u64, ValueError> {
        let mut v: u64 = 0;
        let mut shift = 0u32;
        loop {
            let b = self.byte()?;
            if shift >= 63 && b > 1 {
                return Err(ValueError::corrupt("varint overflow"));
            }
            v |= u64::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(v);
            }
            shift += 7;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_row_roundtrip() {
        let row: Row = [
            ("id", Value::BigInt(7)),
            ("name", Value::Text("strata".into())),
            ("score", Value::Double(0.5)),
            ("raw", Value::Blob(vec![1, 2, 3])),
            ("active", Value::Boolean(true)),
            ("missing", Value::Null),
            ("at", Value::timestamp(Utc::now())),
        ]
        .into_iter()
        .collect();

        let mut buf = Vec::new();
        encode_row(&row, &mut buf);
        let decoded = decode_row(&buf).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn test_integer_width_survives() {
        let row: Row = [("a", Value::Integer(1)), ("b", Value::BigInt(1))]
            .into_iter()
            .collect();
        let mut buf = Vec::new();
        encode_row(&row, &mut buf);
        let decoded = decode_row(&buf).unwrap();
        assert!(matches!(decoded.get("a").unwrap(), Value::Integer(1)));
        assert!(matches!(decoded.get("b").unwrap(), Value::BigInt(1)));
    }

    #[test]
    fn test_corrupt_inputs() {
        assert!(decode_row(&[]).is_err());
        assert!(decode_value(&[TAG_TEXT, 5, b'a']).is_err());
        assert!(decode_value(&[42]).is_err());
        let mut buf = Vec::new();
        encode_value(&Value::Integer(1), &mut buf);
        buf.push(0);
        assert!(decode_value(&buf).is_err());
    }
}
