//! # Binary record codec.
//!
//! [`PersistedRecord`] is the persistable projection of a [`TaskSpec`](crate::TaskSpec).
//! One record is stored per file in the queue directory.
//!
//! ## Layout
//! ```text
//! ┌────────┬─────────┬───────────┬─────┬───────┬────────────┬────────────────────┐
//! │ "TXQ1" │ ver: u8 │ type_name │ tag │ flags │ seq: u64be │ bundle             │
//! └────────┴─────────┴───────────┴─────┴───────┴────────────┴────────────────────┘
//! string  = len: u32be · utf-8 bytes
//! flags   = bit0 remove_on_success · bit1 remove_on_exception
//! seq     = submission stamp assigned by the store; restore order
//! bundle  = count: u32be · { key: string · kind: u8 · payload }*
//! payload = bool u8 | i32be | i64be | f32 bits | f64 bits | string | bytes | u32be count · string*
//! ```
//!
//! ## Rules
//! - `decode(encode(r)) == r` for every record, floats compared by bit pattern.
//! - Decoding arbitrary bytes never panics; lengths are checked before allocation.
//! - Trailing bytes after a complete record are rejected.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::RecordError;
use crate::policies::RemovalPolicy;
use crate::tasks::{Bundle, Value};

const MAGIC: &[u8; 4] = b"TXQ1";
const VERSION: u8 = 1;

const KIND_BOOL: u8 = 0x01;
const KIND_I32: u8 = 0x02;
const KIND_I64: u8 = 0x03;
const KIND_F32: u8 = 0x04;
const KIND_F64: u8 = 0x05;
const KIND_STR: u8 = 0x06;
const KIND_BYTES: u8 = 0x07;
const KIND_STR_LIST: u8 = 0x08;

/// Persistable fields of a queued task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistedRecord {
    /// Registry name used to rebuild the task body.
    pub type_name: String,
    /// Queue tag; also the file name.
    pub tag: String,
    /// Parameters handed to the body.
    pub params: Bundle,
    /// Completion policy.
    pub removal: RemovalPolicy,
    /// Position in submission order across runs; `0` until written by a store.
    pub seq: u64,
}

impl PersistedRecord {
    /// Encodes the record into its binary form.
    ///
    /// Individual strings and blobs are limited to `u32::MAX` bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64 + self.type_name.len() + self.tag.len());
        buf.put_slice(MAGIC);
        buf.put_u8(VERSION);
        put_str(&mut buf, &self.type_name);
        put_str(&mut buf, &self.tag);
        buf.put_u8(self.removal.to_flags());
        buf.put_u64(self.seq);
        put_bundle(&mut buf, &self.params);
        buf.freeze()
    }

    /// Decodes a record, validating every length and kind.
    pub fn decode(mut buf: &[u8]) -> Result<Self, RecordError> {
        if buf.remaining() < MAGIC.len() + 1 {
            return Err(RecordError::Truncated { field: "header" });
        }
        if &buf[..MAGIC.len()] != MAGIC {
            return Err(RecordError::BadMagic);
        }
        buf.advance(MAGIC.len());
        let version = buf.get_u8();
        if version != VERSION {
            return Err(RecordError::UnsupportedVersion { version });
        }

        let type_name = get_str(&mut buf, "type_name")?;
        let tag = get_str(&mut buf, "tag")?;
        let flags = get_u8(&mut buf, "flags")?;
        need(&buf, 8, "seq")?;
        let seq = buf.get_u64();
        let params = get_bundle(&mut buf)?;

        if buf.has_remaining() {
            return Err(RecordError::TrailingBytes {
                count: buf.remaining(),
            });
        }

        Ok(Self {
            type_name,
            tag,
            params,
            removal: RemovalPolicy::from_flags(flags),
            seq,
        })
    }
}

fn put_len(buf: &mut BytesMut, len: usize) {
    buf.put_u32(len as u32);
}

fn put_str(buf: &mut BytesMut, s: &str) {
    put_len(buf, s.len());
    buf.put_slice(s.as_bytes());
}

fn put_bundle(buf: &mut BytesMut, bundle: &Bundle) {
    put_len(buf, bundle.len());
    for (key, value) in bundle.iter() {
        put_str(buf, key);
        match value {
            Value::Bool(v) => {
                buf.put_u8(KIND_BOOL);
                buf.put_u8(u8::from(*v));
            }
            Value::I32(v) => {
                buf.put_u8(KIND_I32);
                buf.put_i32(*v);
            }
            Value::I64(v) => {
                buf.put_u8(KIND_I64);
                buf.put_i64(*v);
            }
            Value::F32(v) => {
                buf.put_u8(KIND_F32);
                buf.put_u32(v.to_bits());
            }
            Value::F64(v) => {
                buf.put_u8(KIND_F64);
                buf.put_u64(v.to_bits());
            }
            Value::Str(v) => {
                buf.put_u8(KIND_STR);
                put_str(buf, v);
            }
            Value::Bytes(v) => {
                buf.put_u8(KIND_BYTES);
                put_len(buf, v.len());
                buf.put_slice(v);
            }
            Value::StrList(items) => {
                buf.put_u8(KIND_STR_LIST);
                put_len(buf, items.len());
                for item in items {
                    put_str(buf, item);
                }
            }
        }
    }
}

fn need(buf: &&[u8], n: usize, field: &'static str) -> Result<(), RecordError> {
    if buf.remaining() < n {
        Err(RecordError::Truncated { field })
    } else {
        Ok(())
    }
}

fn get_u8(buf: &mut &[u8], field: &'static str) -> Result<u8, RecordError> {
    need(buf, 1, field)?;
    Ok(buf.get_u8())
}

fn get_len(buf: &mut &[u8], field: &'static str) -> Result<usize, RecordError> {
    need(buf, 4, field)?;
    Ok(buf.get_u32() as usize)
}

fn get_blob(buf: &mut &[u8], field: &'static str) -> Result<Vec<u8>, RecordError> {
    let len = get_len(buf, field)?;
    need(buf, len, field)?;
    let out = buf[..len].to_vec();
    buf.advance(len);
    Ok(out)
}

fn get_str(buf: &mut &[u8], field: &'static str) -> Result<String, RecordError> {
    let raw = get_blob(buf, field)?;
    String::from_utf8(raw).map_err(|_| RecordError::InvalidUtf8 { field })
}

fn get_bundle(buf: &mut &[u8]) -> Result<Bundle, RecordError> {
    let count = get_len(buf, "bundle")?;
    // Smallest entry: empty key (4) + kind (1) + bool (1).
    if count > buf.remaining() / 6 {
        return Err(RecordError::Truncated { field: "bundle" });
    }

    let mut bundle = Bundle::new();
    for _ in 0..count {
        let key = get_str(buf, "bundle_key")?;
        let value = match get_u8(buf, "bundle_kind")? {
            KIND_BOOL => Value::Bool(get_u8(buf, "bool")? != 0),
            KIND_I32 => {
                need(buf, 4, "i32")?;
                Value::I32(buf.get_i32())
            }
            KIND_I64 => {
                need(buf, 8, "i64")?;
                Value::I64(buf.get_i64())
            }
            KIND_F32 => {
                need(buf, 4, "f32")?;
                Value::F32(f32::from_bits(buf.get_u32()))
            }
            KIND_F64 => {
                need(buf, 8, "f64")?;
                Value::F64(f64::from_bits(buf.get_u64()))
            }
            KIND_STR => Value::Str(get_str(buf, "str")?),
            KIND_BYTES => Value::Bytes(get_blob(buf, "bytes")?),
            KIND_STR_LIST => {
                let n = get_len(buf, "str_list")?;
                if n > buf.remaining() / 4 {
                    return Err(RecordError::Truncated { field: "str_list" });
                }
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(get_str(buf, "str_list_item")?);
                }
                Value::StrList(items)
            }
            kind => return Err(RecordError::UnknownValueKind { kind }),
        };
        bundle.insert(key, value);
    }
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> PersistedRecord {
        PersistedRecord {
            type_name: "Upload".into(),
            tag: "upload-1".into(),
            params: Bundle::new()
                .with("path", "/tmp/a")
                .with("retries", 3i32)
                .with("size", 1_i64 << 40)
                .with("ratio", f64::NAN)
                .with("scale", -0.0f32)
                .with("blob", vec![0u8, 255, 7])
                .with("flag", true)
                .with("hosts", vec!["a".to_string(), "b".to_string()]),
            removal: RemovalPolicy::new(false, true),
            seq: 1_700_000_000_000_000_042,
        }
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        let rec = sample();
        let decoded = PersistedRecord::decode(&rec.encode()).unwrap();
        assert_eq!(decoded, rec);
        assert!(decoded.params.get_f64("ratio").unwrap().is_nan());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        assert_eq!(sample().encode(), sample().encode());
    }

    #[test]
    fn test_rejects_bad_magic_and_version() {
        let mut raw = sample().encode().to_vec();
        raw[0] = b'X';
        assert_eq!(PersistedRecord::decode(&raw), Err(RecordError::BadMagic));

        let mut raw = sample().encode().to_vec();
        raw[4] = 9;
        assert_eq!(
            PersistedRecord::decode(&raw),
            Err(RecordError::UnsupportedVersion { version: 9 })
        );
    }

    #[test]
    fn test_rejects_every_truncation() {
        let raw = sample().encode();
        for cut in 0..raw.len() {
            assert!(
                PersistedRecord::decode(&raw[..cut]).is_err(),
                "prefix of {cut} bytes decoded"
            );
        }
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut raw = sample().encode().to_vec();
        raw.push(0);
        assert_eq!(
            PersistedRecord::decode(&raw),
            Err(RecordError::TrailingBytes { count: 1 })
        );
    }

    #[test]
    fn test_huge_length_prefix_does_not_allocate() {
        let mut raw = BytesMut::new();
        raw.put_slice(MAGIC);
        raw.put_u8(VERSION);
        raw.put_u32(u32::MAX);
        assert_eq!(
            PersistedRecord::decode(&raw),
            Err(RecordError::Truncated { field: "type_name" })
        );
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            type_name in ".{0,24}",
            tag in "[a-z0-9_-]{1,24}",
            on_success: bool,
            on_exception: bool,
            seq: u64,
            ints in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..6),
            floats in proptest::collection::btree_map("[A-Z]{1,8}", any::<u64>(), 0..6),
        ) {
            let mut params = Bundle::new();
            for (k, v) in ints {
                params.insert(k, v);
            }
            for (k, bits) in floats {
                params.insert(k, f64::from_bits(bits));
            }
            let rec = PersistedRecord {
                type_name,
                tag,
                params,
                removal: RemovalPolicy::new(on_success, on_exception),
                seq,
            };
            prop_assert_eq!(PersistedRecord::decode(&rec.encode()).unwrap(), rec);
        }

        #[test]
        fn prop_decode_never_panics(raw in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = PersistedRecord::decode(&raw);
        }
    }
}
