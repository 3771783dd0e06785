//! The compression codec registry: a named byte-to-byte transform invoked with a completion
//! callback that may fire synchronously (inside the call to `compress`/`decompress`) or later.
//!
//! Implementers must increment any "outstanding work" counter *before* invoking the codec, not
//! after it returns — a codec is free to call back before `compress`/`decompress` has returned.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::CompressError;

/// A one-shot completion callback for a (de)compression call.
pub type CompressDone = Box<dyn FnOnce(Result<Vec<u8>, CompressError>)>;

/// A named byte-to-byte transform. The same codec is used for both directions of the container
/// (compress on encode, decompress on decode).
pub trait CompressionCodec {
    fn compress(&self, input: Vec<u8>, done: CompressDone);
    fn decompress(&self, input: Vec<u8>, done: CompressDone);
}

/// The identity codec, registered as `"null"`.
#[derive(Default)]
pub struct NullCodec;

impl CompressionCodec for NullCodec {
    fn compress(&self, input: Vec<u8>, done: CompressDone) {
        done(Ok(input));
    }

    fn decompress(&self, input: Vec<u8>, done: CompressDone) {
        done(Ok(input));
    }
}

/// Raw deflate/inflate, registered as `"deflate"`.
#[cfg(feature = "deflate")]
#[derive(Default)]
pub struct DeflateCodec;

#[cfg(feature = "deflate")]
impl CompressionCodec for DeflateCodec {
    fn compress(&self, input: Vec<u8>, done: CompressDone) {
        use flate2::write::DeflateEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        let result = encoder
            .write_all(&input)
            .and_then(|_| encoder.finish())
            .map_err(|e| CompressError(alloc::format!("deflate compression failed: {}", e)));
        done(result);
    }

    fn decompress(&self, input: Vec<u8>, done: CompressDone) {
        use flate2::write::DeflateDecoder;
        use std::io::Write;

        let mut decoder = DeflateDecoder::new(Vec::new());
        let result = decoder
            .write_all(&input)
            .and_then(|_| decoder.finish())
            .map_err(|e| CompressError(alloc::format!("deflate decompression failed: {}", e)));
        done(result);
    }
}

/// A name -> codec mapping, shared read-only configuration for a stream's lifetime.
pub struct CodecRegistry {
    codecs: BTreeMap<String, Rc<dyn CompressionCodec>>,
}

impl CodecRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        CodecRegistry { codecs: BTreeMap::new() }
    }

    /// Registers (or replaces) a codec under `name`.
    pub fn register(&mut self, name: impl Into<String>, codec: Rc<dyn CompressionCodec>) {
        self.codecs.insert(name.into(), codec);
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn CompressionCodec>> {
        self.codecs.get(name).cloned()
    }
}

impl Default for CodecRegistry {
    /// `"null"` always present; `"deflate"` present when the `deflate` feature is enabled.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("null", Rc::new(NullCodec));
        #[cfg(feature = "deflate")]
        registry.register("deflate", Rc::new(DeflateCodec));
        registry
    }
}
