//! Record -> OCF bytes: header emission, block batching, async compression pipeline, ordered
//! emission.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::block::header::{encode_block, encode_header, generate_sync_marker, SYNC_LEN};
use crate::codec::CodecRegistry;
use crate::error::{EncodeError, StreamError};
use crate::queue::{BlockData, OrderedQueue};
use crate::raw::DEFAULT_BATCH_SIZE;
use crate::tap::Tap;
use crate::value::{Value, ValueCodec};

pub struct BlockEncoderConfig {
    pub block_size: usize,
    pub codec: String,
    pub omit_header: bool,
    pub sync_marker: Option<[u8; SYNC_LEN]>,
}

impl Default for BlockEncoderConfig {
    fn default() -> Self {
        BlockEncoderConfig {
            block_size: DEFAULT_BATCH_SIZE,
            codec: "null".to_string(),
            omit_header: false,
            sync_marker: None,
        }
    }
}

struct Shared {
    queue: OrderedQueue<BlockData>,
    pending: u64,
    error: Option<StreamError>,
}

impl core::fmt::Debug for BlockEncoder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockEncoder").finish_non_exhaustive()
    }
}

pub struct BlockEncoder {
    value_codec: Box<dyn ValueCodec>,
    schema_text: String,
    codec_name: String,
    omit_header: bool,
    sync: [u8; SYNC_LEN],

    tap: Tap,
    block_count: u64,
    next_index: u64,
    header_emitted: bool,
    finished: bool,

    compressor: Rc<dyn crate::codec::CompressionCodec>,
    shared: Rc<RefCell<Shared>>,
}

impl BlockEncoder {
    pub fn new(schema_text: impl Into<String>, value_codec: Box<dyn ValueCodec>) -> Result<Self, StreamError> {
        Self::with_config(schema_text, value_codec, BlockEncoderConfig::default(), &CodecRegistry::default())
    }

    /// The codec named in `config.codec` is resolved against `codecs` immediately, so a bad
    /// codec name fails construction rather than the first `write`.
    pub fn with_config(
        schema_text: impl Into<String>,
        value_codec: Box<dyn ValueCodec>,
        config: BlockEncoderConfig,
        codecs: &CodecRegistry,
    ) -> Result<Self, StreamError> {
        let compressor = codecs
            .get(&config.codec)
            .ok_or_else(|| StreamError::UnknownCodec(config.codec.clone()))?;
        Ok(BlockEncoder {
            value_codec,
            schema_text: schema_text.into(),
            codec_name: config.codec,
            omit_header: config.omit_header,
            sync: config.sync_marker.unwrap_or_else(generate_sync_marker),
            tap: Tap::with_capacity(config.block_size),
            block_count: 0,
            next_index: 0,
            header_emitted: false,
            finished: false,
            compressor,
            shared: Rc::new(RefCell::new(Shared {
                queue: OrderedQueue::new(),
                pending: 0,
                error: None,
            })),
        })
    }

    /// Encodes one value. Returns the header bytes (empty after the first call, or always empty
    /// if `omit_header`) that are ready to emit immediately; compressed blocks are pulled
    /// separately via [`BlockEncoder::read`].
    pub fn write(&mut self, val: &Value) -> Result<Vec<u8>, EncodeError> {
        let pos0 = self.tap.pos();
        self.value_codec.write(&mut self.tap, val)?;
        if !self.tap.is_valid() {
            if pos0 > 0 {
                self.flush_chunk(pos0);
            }
            let need = self.tap.pos() - pos0;
            if need > self.tap.len() {
                self.tap = Tap::with_capacity(need * 2);
            } else {
                self.tap.reset();
            }
            self.value_codec.write(&mut self.tap, val)?;
            debug_assert!(self.tap.is_valid(), "value did not fit after buffer growth");
        }
        self.block_count += 1;

        // Only now that the value has actually been encoded do we commit to having emitted (or
        // skipped) the header: a failed `?` above must leave the next call free to try again.
        let mut out = Vec::new();
        if !self.header_emitted {
            self.header_emitted = true;
            if !self.omit_header {
                encode_header(&mut out, &self.schema_text, &self.codec_name, &self.sync);
            }
        }
        Ok(out)
    }

    /// Signals that no more values are coming, flushing whatever remains in the scratch buffer.
    pub fn finish(&mut self) {
        if self.block_count > 0 {
            let pos = self.tap.pos();
            self.flush_chunk(pos);
        }
        self.finished = true;
    }

    fn flush_chunk(&mut self, pos0: usize) {
        let bytes = self.tap.bytes()[..pos0].to_vec();
        let index = self.next_index;
        self.next_index += 1;
        let count = self.block_count;
        self.block_count = 0;

        // Increment before invoking the codec: the completion may fire synchronously, before
        // `compress` returns.
        self.shared.borrow_mut().pending += 1;
        let shared = Rc::clone(&self.shared);
        let compressor = Rc::clone(&self.compressor);
        compressor.compress(
            bytes,
            Box::new(move |result| {
                let mut shared = shared.borrow_mut();
                shared.pending -= 1;
                match result {
                    Ok(compressed) => shared.queue.push(BlockData { index, buf: compressed, count }),
                    Err(e) => {
                        shared.error.get_or_insert(StreamError::Compress(e));
                    }
                }
            }),
        );
    }

    /// Pulls the next ready chunk of block-framed bytes, in strict submission order, or `None`
    /// if nothing is ready yet. Call [`BlockEncoder::is_finished`] to distinguish a temporary
    /// stall from the true end of the stream.
    pub fn read(&mut self) -> Option<Vec<u8>> {
        let block = self.shared.borrow_mut().queue.pop()?;
        let mut out = Vec::new();
        encode_block(&mut out, block.count, &block.buf, &self.sync);
        Some(out)
    }

    /// True once `finish` has been called, every submitted block has finished compressing, and
    /// the emission queue has drained.
    pub fn is_finished(&self) -> bool {
        let shared = self.shared.borrow();
        self.finished && shared.pending == 0 && shared.queue.is_empty()
    }

    /// Surfaces (once) a fatal error recorded by an asynchronous compressor completion.
    pub fn take_error(&mut self) -> Option<StreamError> {
        self.shared.borrow_mut().error.take()
    }
}
