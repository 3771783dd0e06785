use alloc::string::String;
use core::fmt;

/// A `ValueCodec` rejected a value. Carries whatever message the codec produced; processing of
/// that one value stops but the encoder remains usable for subsequent values.
#[derive(Debug, Clone)]
pub struct EncodeError(pub String);

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EncodeError {}

/// A schema descriptor failed to parse.
#[derive(Debug, Clone)]
pub struct SchemaError(pub String);

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SchemaError {}

/// A compression or decompression callback reported a failure.
#[derive(Debug, Clone)]
pub struct CompressError(pub String);

impl fmt::Display for CompressError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CompressError {}

/// Fatal, stream-terminating failures. Each kind surfaces to the caller exactly once; no
/// retries are attempted. Per-value [`EncodeError`]s are reported separately by `write` and do
/// not appear here because they don't end the stream.
#[derive(Debug, Clone)]
pub enum StreamError {
    /// The header's magic bytes didn't match `Obj\x01`.
    BadMagic,
    /// The codec name in the header (or supplied to an encoder) isn't in the registry.
    UnknownCodec(String),
    /// The header's schema text failed to parse.
    SchemaParse(SchemaError),
    /// A block's sync marker didn't match the header's.
    BadSync,
    /// The compression codec's completion callback reported an error.
    Compress(CompressError),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StreamError::BadMagic => write!(f, "invalid magic bytes"),
            StreamError::UnknownCodec(name) => write!(f, "unknown codec: {}", name),
            StreamError::SchemaParse(e) => write!(f, "{}", e),
            StreamError::BadSync => write!(f, "invalid sync marker"),
            StreamError::Compress(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StreamError::SchemaParse(e) => Some(e),
            StreamError::Compress(e) => Some(e),
            _ => None,
        }
    }
}
