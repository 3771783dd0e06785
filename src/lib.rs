//! A streaming codec for an Avro-style object container file format.
//!
//! Four duplex record/byte streams cover the format's two framings:
//!
//! - [`raw::RawEncoder`] / [`raw::RawDecoder`] — a bare sequence of serialized records, no
//!   header, no block framing.
//! - [`block::BlockEncoder`] / [`block::BlockDecoder`] — the full container format: a header
//!   (magic, schema, codec, sync marker) followed by compressed, sync-delimited blocks.
//!
//! All four are built on three shared primitives: [`tap::Tap`] (a rollback-capable cursor over
//! an owned buffer), [`queue::OrderedQueue`] (a min-heap that restores submission order across
//! out-of-order asynchronous completions), and [`queue::BlockData`] (one indexed payload waiting
//! in that queue).
//!
//! Record serialization itself is pluggable: [`value::ValueCodec`] is the seam the four streams
//! depend on, and [`value::load_schema`] is a minimal, real implementation covering Avro's
//! primitive scalar types. A production deployment with full schema resolution (records, unions,
//! arrays, maps, schema evolution) plugs in its own loader; that resolution engine is out of
//! scope here.
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(not(feature = "alloc"))]
compile_error!("ocf_codec requires the `alloc` feature (enabled by default via `std`)");

pub mod block;
pub mod codec;
pub mod error;
pub mod queue;
pub mod raw;
pub mod tap;
pub mod value;

pub use block::{BlockDecoder, BlockDecoderConfig, BlockEncoder, BlockEncoderConfig, Record};
pub use codec::{CodecRegistry, CompressionCodec};
pub use error::{CompressError, EncodeError, SchemaError, StreamError};
pub use raw::{RawDecoder, RawEncoder};
pub use tap::Tap;
pub use value::{load_schema, Value, ValueCodec};
