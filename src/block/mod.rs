//! The block-framed container stream: a header (magic, schema, codec, sync marker) followed by
//! a sequence of compressed, sync-delimited blocks. See [`encoder::BlockEncoder`] and
//! [`decoder::BlockDecoder`].

pub mod decoder;
pub mod encoder;
pub mod header;

pub use decoder::{BlockDecoder, BlockDecoderConfig, Record};
pub use encoder::{BlockEncoder, BlockEncoderConfig};
pub use header::{Block, Header};
