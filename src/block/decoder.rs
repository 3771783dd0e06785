//! OCF bytes -> records: header parsing, block framing, async decompression pipeline, ordered
//! emission back into record order.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::block::header::{try_decode_header, try_read_block, Header};
use crate::codec::CodecRegistry;
use crate::error::StreamError;
use crate::queue::{Indexed, OrderedQueue};
use crate::tap::Tap;
use crate::value::{Value, ValueCodec};

/// A decoded value record, tagged with a monotonically increasing record index for callers that
/// need to correlate output with input position (e.g. resuming a stream).
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub index: u64,
    pub value: Value,
}

struct DecodedChunk {
    index: u64,
    values: Vec<Value>,
}

impl Indexed for DecodedChunk {
    fn index(&self) -> u64 {
        self.index
    }
}

struct Shared {
    queue: OrderedQueue<DecodedChunk>,
    pending: u64,
    error: Option<StreamError>,
}

enum Phase {
    Header,
    Blocks { sync: [u8; 16] },
}

pub struct BlockDecoderConfig {
    /// `false` makes `read` return [`Value::Raw`] (the record's raw framing bytes within its
    /// block) instead of a parsed value, matching [`crate::raw::RawDecoder::with_decode`].
    pub decode: bool,
}

impl Default for BlockDecoderConfig {
    fn default() -> Self {
        BlockDecoderConfig { decode: true }
    }
}

/// Bytes -> record, driven by write/read backpressure, mirroring [`crate::raw::RawDecoder`]'s
/// contract with one addition: blocks decompress out of order but are only ever handed back to
/// `read` in the order they were written, via an [`OrderedQueue`].
pub struct BlockDecoder {
    value_codec: Rc<dyn ValueCodec>,
    codecs: CodecRegistry,
    decode: bool,
    phase: Phase,
    tap: Tap,
    finished: bool,
    need_push: bool,
    pending_write_done: Option<Box<dyn FnOnce()>>,

    next_block_index: u64,
    next_record_index: u64,
    decompressor: Option<Rc<dyn crate::codec::CompressionCodec>>,
    header_meta: Option<Header>,

    current: Option<DecodedChunk>,
    current_pos: usize,
    shared: Rc<RefCell<Shared>>,
}

impl BlockDecoder {
    pub fn new(value_codec: Box<dyn ValueCodec>) -> Self {
        Self::with_registry(value_codec, CodecRegistry::default())
    }

    pub fn with_registry(value_codec: Box<dyn ValueCodec>, codecs: CodecRegistry) -> Self {
        Self::with_config(value_codec, BlockDecoderConfig::default(), codecs)
    }

    pub fn with_config(value_codec: Box<dyn ValueCodec>, config: BlockDecoderConfig, codecs: CodecRegistry) -> Self {
        BlockDecoder {
            value_codec: Rc::from(value_codec),
            codecs,
            decode: config.decode,
            phase: Phase::Header,
            tap: Tap::from_bytes(Vec::new()),
            finished: false,
            need_push: false,
            pending_write_done: None,
            next_block_index: 0,
            next_record_index: 0,
            decompressor: None,
            header_meta: None,
            current: None,
            current_pos: 0,
            shared: Rc::new(RefCell::new(Shared {
                queue: OrderedQueue::new(),
                pending: 0,
                error: None,
            })),
        }
    }

    /// Feeds a chunk of bytes. `done` is stored, not invoked, until a subsequent `read` stalls
    /// and needs more input, exactly like [`crate::raw::RawDecoder::write`].
    pub fn write(&mut self, chunk: &[u8], done: Box<dyn FnOnce()>) {
        self.tap.compact_and_extend(chunk);
        self.pending_write_done = Some(done);
    }

    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn need_push(&self) -> bool {
        self.need_push
    }

    /// The container's schema and codec metadata, once the header has been parsed.
    pub fn header(&self) -> Option<&Header> {
        self.header_meta.as_ref()
    }

    /// Pulls the next decoded record, or `None` if one isn't available yet (call again after
    /// `write`) or the stream has ended. A fatal error from a bad magic/codec/sync or a failed
    /// decompression is returned once and the decoder produces no more records afterward.
    pub fn read(&mut self) -> Result<Option<Record>, StreamError> {
        loop {
            if let Some(err) = self.shared.borrow_mut().error.take() {
                self.finished = true;
                return Err(err);
            }

            if let Some(chunk) = &self.current {
                if self.current_pos < chunk.values.len() {
                    let value = chunk.values[self.current_pos].clone();
                    let index = self.next_record_index;
                    self.next_record_index += 1;
                    self.current_pos += 1;
                    return Ok(Some(Record { index, value }));
                }
                self.current = None;
            }

            if let Some(chunk) = self.shared.borrow_mut().queue.pop() {
                self.current = Some(chunk);
                self.current_pos = 0;
                continue;
            }

            match self.advance_input() {
                Ok(true) => continue,
                Ok(false) => return Ok(None),
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            }
        }
    }

    /// Tries to make progress directly from `self.tap`: parses the header if needed, then reads
    /// and dispatches as many whole blocks as are currently buffered. Returns `Ok(true)` if a
    /// decompressed chunk became available synchronously (via a synchronous codec), `Ok(false)`
    /// if input is exhausted and the caller must wait for more bytes (or the stream ended), or
    /// `Err` on a fatal framing error.
    fn advance_input(&mut self) -> Result<bool, StreamError> {
        if let Phase::Header = self.phase {
            let pos0 = self.tap.save();
            let header = match try_decode_header(&mut self.tap) {
                Some(h) => h,
                None => {
                    self.tap.restore(pos0);
                    return Ok(self.stall());
                }
            };
            if header.magic != crate::block::header::MAGIC {
                return Err(StreamError::BadMagic);
            }
            let codec_name = header.meta_str("avro.codec").unwrap_or_default();
            let compressor =
                self.codecs.get(&codec_name).ok_or(StreamError::UnknownCodec(codec_name))?;
            self.decompressor = Some(compressor);
            self.phase = Phase::Blocks { sync: header.sync };
            self.header_meta = Some(header);
        }

        let sync = match self.phase {
            Phase::Blocks { sync } => sync,
            Phase::Header => unreachable!(),
        };

        let mut dispatched_any = false;
        loop {
            let pos0 = self.tap.save();
            let block = match try_read_block(&mut self.tap) {
                Some(b) => b,
                None => {
                    self.tap.restore(pos0);
                    break;
                }
            };
            if block.sync != sync {
                return Err(StreamError::BadSync);
            }
            self.dispatch_block(block.count as u64, block.data);
            dispatched_any = true;
        }

        if dispatched_any {
            return Ok(true);
        }
        Ok(self.stall())
    }

    /// Backpressure is only released once every block dispatched from the current input has
    /// finished decompressing: a dispatched-but-not-yet-completed block still owes output, and
    /// releasing the write callback early would let the caller hand in more bytes while that
    /// work is outstanding.
    fn stall(&mut self) -> bool {
        if self.finished {
            return false;
        }
        self.need_push = true;
        if self.shared.borrow().pending == 0 {
            if let Some(done) = self.pending_write_done.take() {
                done();
            }
        }
        false
    }

    fn dispatch_block(&mut self, count: u64, data: Vec<u8>) {
        let index = self.next_block_index;
        self.next_block_index += 1;
        let value_codec = Rc::clone(&self.value_codec);
        let decode = self.decode;

        // Increment before invoking the codec: completion may fire synchronously, before
        // `decompress` returns.
        self.shared.borrow_mut().pending += 1;
        let shared = Rc::clone(&self.shared);
        let decompressor = Rc::clone(self.decompressor.as_ref().expect("codec resolved during header phase"));

        decompressor.decompress(
            data,
            Box::new(move |result| {
                let values = result.map(|bytes| {
                    let mut tap = Tap::from_bytes(bytes);
                    let mut values = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        let pos0 = tap.pos();
                        let value = if decode {
                            value_codec.read(&mut tap)
                        } else {
                            value_codec.skip(&mut tap);
                            Value::Raw(tap.bytes()[pos0..tap.pos().min(tap.bytes().len())].to_vec())
                        };
                        if !tap.is_valid() {
                            break;
                        }
                        values.push(value);
                    }
                    values
                });

                let mut shared = shared.borrow_mut();
                shared.pending -= 1;
                match values {
                    Ok(values) => shared.queue.push(DecodedChunk { index, values }),
                    Err(e) => {
                        shared.error.get_or_insert(StreamError::Compress(e));
                    }
                }
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::encoder::{BlockEncoder, BlockEncoderConfig};
    use crate::value::load_schema;

    fn drain(decoder: &mut BlockDecoder) -> Result<Vec<Value>, StreamError> {
        let mut out = Vec::new();
        while let Some(record) = decoder.read()? {
            out.push(record.value);
        }
        Ok(out)
    }

    #[test]
    fn round_trips_through_blocks() {
        let config = BlockEncoderConfig::default();
        let mut encoder =
            BlockEncoder::with_config("\"long\"", load_schema("long").unwrap(), config, &CodecRegistry::default())
                .unwrap();
        let mut bytes = Vec::new();
        for v in 0..10 {
            bytes.extend(encoder.write(&Value::Long(v)).unwrap());
        }
        encoder.finish();
        while let Some(block) = encoder.read() {
            bytes.extend(block);
        }

        let mut decoder = BlockDecoder::new(load_schema("long").unwrap());
        decoder.write(&bytes, Box::new(|| {}));
        decoder.finish();
        let values = drain(&mut decoder).unwrap();
        assert_eq!(values, (0..10).map(Value::Long).collect::<Vec<_>>());
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut decoder = BlockDecoder::new(load_schema("long").unwrap());
        decoder.write(b"xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx", Box::new(|| {}));
        decoder.finish();
        let err = decoder.read().unwrap_err();
        assert!(matches!(err, StreamError::BadMagic));
    }

    #[test]
    fn unknown_codec_in_header_is_fatal() {
        let mut out = Vec::new();
        crate::block::header::encode_header(&mut out, "\"long\"", "snappy", &[0u8; 16]);
        let mut decoder = BlockDecoder::new(load_schema("long").unwrap());
        decoder.write(&out, Box::new(|| {}));
        decoder.finish();
        let err = decoder.read().unwrap_err();
        assert!(matches!(err, StreamError::UnknownCodec(_)));
    }

    #[test]
    fn truncated_header_stalls_instead_of_failing() {
        let mut out = Vec::new();
        crate::block::header::encode_header(&mut out, "\"long\"", "null", &[0u8; 16]);
        let mut decoder = BlockDecoder::new(load_schema("long").unwrap());
        decoder.write(&out[..out.len() - 1], Box::new(|| {}));
        assert_eq!(decoder.read().unwrap(), None);
        assert!(decoder.need_push());
    }

    #[test]
    fn mismatched_sync_marker_is_fatal() {
        let config = BlockEncoderConfig::default();
        let mut encoder =
            BlockEncoder::with_config("\"int\"", load_schema("int").unwrap(), config, &CodecRegistry::default())
                .unwrap();
        let mut bytes = Vec::new();
        bytes.extend(encoder.write(&Value::Int(1)).unwrap());
        encoder.finish();
        while let Some(block) = encoder.read() {
            bytes.extend(block);
        }
        // Flip a byte inside the sync marker at the tail of the stream.
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let mut decoder = BlockDecoder::new(load_schema("int").unwrap());
        decoder.write(&bytes, Box::new(|| {}));
        decoder.finish();
        let err = drain(&mut decoder).unwrap_err();
        assert!(matches!(err, StreamError::BadSync));
    }

    #[test]
    fn decode_false_yields_raw_record_bytes() {
        let config = BlockEncoderConfig::default();
        let mut encoder =
            BlockEncoder::with_config("\"int\"", load_schema("int").unwrap(), config, &CodecRegistry::default())
                .unwrap();
        let mut bytes = Vec::new();
        bytes.extend(encoder.write(&Value::Int(7)).unwrap());
        encoder.finish();
        while let Some(block) = encoder.read() {
            bytes.extend(block);
        }

        let decoder_config = BlockDecoderConfig { decode: false };
        let mut decoder =
            BlockDecoder::with_config(load_schema("int").unwrap(), decoder_config, CodecRegistry::default());
        decoder.write(&bytes, Box::new(|| {}));
        decoder.finish();
        let record = decoder.read().unwrap().unwrap();
        match record.value {
            Value::Raw(raw) => assert_eq!(raw, [0x0e]),
            other => panic!("expected Value::Raw, got {:?}", other),
        }
    }

    /// A codec whose completion is released manually by the test, to simulate decompression
    /// finishing in a different order than it was submitted.
    #[derive(Default)]
    struct DeferredCodec {
        pending: RefCell<Vec<(Vec<u8>, crate::codec::CompressDone)>>,
    }

    impl crate::codec::CompressionCodec for DeferredCodec {
        fn compress(&self, _input: Vec<u8>, _done: crate::codec::CompressDone) {
            unreachable!("not exercised by this test")
        }

        fn decompress(&self, input: Vec<u8>, done: crate::codec::CompressDone) {
            self.pending.borrow_mut().push((input, done));
        }
    }

    impl DeferredCodec {
        fn fire(&self, submission_order: usize) {
            let (input, done) = self.pending.borrow_mut().remove(submission_order);
            done(Ok(input));
        }
    }

    #[test]
    fn out_of_order_decompression_preserves_submission_order() {
        let codec = Rc::new(DeferredCodec::default());
        let mut registry = CodecRegistry::empty();
        registry.register("deferred", Rc::clone(&codec) as Rc<dyn crate::codec::CompressionCodec>);

        let mut input = Vec::new();
        crate::block::header::encode_header(&mut input, "\"long\"", "deferred", &[0u8; 16]);
        let long_codec = load_schema("long").unwrap();
        let mut b0 = Tap::with_capacity(16);
        long_codec.write(&mut b0, &Value::Long(0)).unwrap();
        let mut b1 = Tap::with_capacity(16);
        long_codec.write(&mut b1, &Value::Long(1)).unwrap();
        crate::block::header::encode_block(&mut input, 1, &b0.bytes()[..b0.pos()], &[0u8; 16]);
        crate::block::header::encode_block(&mut input, 1, &b1.bytes()[..b1.pos()], &[0u8; 16]);

        let mut decoder = BlockDecoder::with_registry(load_schema("long").unwrap(), registry);
        decoder.write(&input, Box::new(|| {}));
        decoder.finish();
        assert_eq!(decoder.read().unwrap(), None, "both blocks dispatched but neither has completed yet");

        // B1 (submitted second) completes first.
        codec.fire(1);
        assert_eq!(decoder.read().unwrap(), None, "B0 hasn't completed; B1 must stall on the gap");

        codec.fire(0);
        let first = decoder.read().unwrap().unwrap();
        let second = decoder.read().unwrap().unwrap();
        assert_eq!(first.value, Value::Long(0));
        assert_eq!(second.value, Value::Long(1));
    }
}
