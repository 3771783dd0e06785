//! The `ValueCodec`/`SchemaLoader` seam.
//!
//! The container logic (`RawEncoder`/`RawDecoder`/`BlockEncoder`/`BlockDecoder`) depends only on
//! the [`ValueCodec`] trait object — never on anything in this module concretely. What follows
//! is a minimal, real implementation for the Avro primitive scalar types, enough to exercise the
//! four streams end to end without pulling in a full schema-resolution engine, which is out of
//! scope (see the crate's top-level documentation).

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::{EncodeError, SchemaError};
use crate::tap::Tap;

/// A decoded/to-be-encoded value.
///
/// `Raw` is only ever produced by a decoder configured with `decode = false`: it carries the
/// exact framing bytes of one skipped record, unparsed, for forwarding or re-framing.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    String(String),
    Raw(Vec<u8>),
}

/// The per-type record writer/reader/skipper driven by a schema.
///
/// `read` and `skip` never themselves report truncation as an error: per the tap rollback
/// discipline, the caller always checks `tap.is_valid()` after calling either and discards the
/// result (restoring the tap's position) if it's false.
pub trait ValueCodec {
    fn write(&self, tap: &mut Tap, val: &Value) -> Result<(), EncodeError>;
    fn read(&self, tap: &mut Tap) -> Value;
    fn skip(&self, tap: &mut Tap);
}

struct NullCodec;

impl ValueCodec for NullCodec {
    fn write(&self, _tap: &mut Tap, val: &Value) -> Result<(), EncodeError> {
        match val {
            Value::Null => Ok(()),
            _ => Err(EncodeError("expected a null value".to_string())),
        }
    }

    fn read(&self, _tap: &mut Tap) -> Value {
        Value::Null
    }

    fn skip(&self, _tap: &mut Tap) {}
}

struct BooleanCodec;

impl ValueCodec for BooleanCodec {
    fn write(&self, tap: &mut Tap, val: &Value) -> Result<(), EncodeError> {
        match val {
            Value::Boolean(b) => {
                tap.write_byte(*b as u8);
                Ok(())
            }
            _ => Err(EncodeError("expected a boolean value".to_string())),
        }
    }

    fn read(&self, tap: &mut Tap) -> Value {
        Value::Boolean(tap.read_byte() != 0)
    }

    fn skip(&self, tap: &mut Tap) {
        tap.skip_fixed(1);
    }
}

struct IntCodec;

impl ValueCodec for IntCodec {
    fn write(&self, tap: &mut Tap, val: &Value) -> Result<(), EncodeError> {
        match val {
            Value::Int(n) => {
                tap.write_long(*n as i64);
                Ok(())
            }
            _ => Err(EncodeError("expected an int value".to_string())),
        }
    }

    fn read(&self, tap: &mut Tap) -> Value {
        Value::Int(tap.read_long() as i32)
    }

    fn skip(&self, tap: &mut Tap) {
        let _ = tap.read_long();
    }
}

struct LongCodec;

impl ValueCodec for LongCodec {
    fn write(&self, tap: &mut Tap, val: &Value) -> Result<(), EncodeError> {
        match val {
            Value::Long(n) => {
                tap.write_long(*n);
                Ok(())
            }
            _ => Err(EncodeError("expected a long value".to_string())),
        }
    }

    fn read(&self, tap: &mut Tap) -> Value {
        Value::Long(tap.read_long())
    }

    fn skip(&self, tap: &mut Tap) {
        let _ = tap.read_long();
    }
}

struct FloatCodec;

impl ValueCodec for FloatCodec {
    fn write(&self, tap: &mut Tap, val: &Value) -> Result<(), EncodeError> {
        match val {
            Value::Float(f) => {
                tap.write_fixed(&f.to_le_bytes());
                Ok(())
            }
            _ => Err(EncodeError("expected a float value".to_string())),
        }
    }

    fn read(&self, tap: &mut Tap) -> Value {
        let bytes = tap.read_fixed(4);
        let mut arr = [0u8; 4];
        let n = bytes.len().min(4);
        arr[..n].copy_from_slice(&bytes[..n]);
        Value::Float(f32::from_le_bytes(arr))
    }

    fn skip(&self, tap: &mut Tap) {
        tap.skip_fixed(4);
    }
}

struct DoubleCodec;

impl ValueCodec for DoubleCodec {
    fn write(&self, tap: &mut Tap, val: &Value) -> Result<(), EncodeError> {
        match val {
            Value::Double(d) => {
                tap.write_fixed(&d.to_le_bytes());
                Ok(())
            }
            _ => Err(EncodeError("expected a double value".to_string())),
        }
    }

    fn read(&self, tap: &mut Tap) -> Value {
        let bytes = tap.read_fixed(8);
        let mut arr = [0u8; 8];
        let n = bytes.len().min(8);
        arr[..n].copy_from_slice(&bytes[..n]);
        Value::Double(f64::from_le_bytes(arr))
    }

    fn skip(&self, tap: &mut Tap) {
        tap.skip_fixed(8);
    }
}

struct BytesCodec;

impl ValueCodec for BytesCodec {
    fn write(&self, tap: &mut Tap, val: &Value) -> Result<(), EncodeError> {
        match val {
            Value::Bytes(b) => {
                tap.write_bytes(b);
                Ok(())
            }
            _ => Err(EncodeError("expected a bytes value".to_string())),
        }
    }

    fn read(&self, tap: &mut Tap) -> Value {
        Value::Bytes(tap.read_bytes())
    }

    fn skip(&self, tap: &mut Tap) {
        tap.skip_bytes();
    }
}

struct StringCodec;

impl ValueCodec for StringCodec {
    fn write(&self, tap: &mut Tap, val: &Value) -> Result<(), EncodeError> {
        match val {
            Value::String(s) => {
                tap.write_bytes(s.as_bytes());
                Ok(())
            }
            _ => Err(EncodeError("expected a string value".to_string())),
        }
    }

    fn read(&self, tap: &mut Tap) -> Value {
        let bytes = tap.read_bytes();
        Value::String(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn skip(&self, tap: &mut Tap) {
        tap.skip_bytes();
    }
}

/// Parses a bare Avro primitive type name, optionally JSON-quoted (`"long"` or `long`), into a
/// [`ValueCodec`]. Anything beyond a primitive type name (records, unions, arrays, maps) is out
/// of scope for this minimal loader — a real deployment plugs in its own `SchemaLoader`.
pub fn load_schema(text: &str) -> Result<Box<dyn ValueCodec>, SchemaError> {
    let trimmed = text.trim();
    let name = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    match name {
        "null" => Ok(Box::new(NullCodec)),
        "boolean" => Ok(Box::new(BooleanCodec)),
        "int" => Ok(Box::new(IntCodec)),
        "long" => Ok(Box::new(LongCodec)),
        "float" => Ok(Box::new(FloatCodec)),
        "double" => Ok(Box::new(DoubleCodec)),
        "bytes" => Ok(Box::new(BytesCodec)),
        "string" => Ok(Box::new(StringCodec)),
        other => Err(SchemaError(alloc::format!("unsupported or malformed schema: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_round_trips() {
        let codec = load_schema("long").unwrap();
        let mut tap = Tap::with_capacity(16);
        codec.write(&mut tap, &Value::Long(42)).unwrap();
        assert!(tap.is_valid());
        assert_eq!(tap.bytes()[..tap.pos()], [0x54]);
        tap.restore(0);
        assert_eq!(codec.read(&mut tap), Value::Long(42));
    }

    #[test]
    fn quoted_schema_text_is_accepted() {
        assert!(load_schema("\"string\"").is_ok());
    }

    #[test]
    fn unknown_schema_is_rejected() {
        assert!(load_schema("record").is_err());
    }

    #[test]
    fn write_rejects_mismatched_value() {
        let codec = load_schema("long").unwrap();
        let mut tap = Tap::with_capacity(16);
        let err = codec.write(&mut tap, &Value::String("x".into())).unwrap_err();
        assert!(err.0.contains("long"));
    }
}
