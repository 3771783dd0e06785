//! Wire encoding for the container `Header` and `Block` records, and the helpers from §4.7:
//! `try_read_block` and sync-marker generation.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::tap::{write_zigzag_long, Tap};

pub const MAGIC: [u8; 4] = *b"Obj\x01";
pub const SYNC_LEN: usize = 16;

pub struct Header {
    pub magic: [u8; 4],
    pub meta: BTreeMap<String, Vec<u8>>,
    pub sync: [u8; SYNC_LEN],
}

impl Header {
    pub fn meta_str(&self, key: &str) -> Option<String> {
        self.meta.get(key).map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

pub struct Block {
    pub count: i64,
    pub data: Vec<u8>,
    pub sync: [u8; SYNC_LEN],
}

fn write_map(out: &mut Vec<u8>, entries: &[(&str, &[u8])]) {
    if !entries.is_empty() {
        write_zigzag_long(out, entries.len() as i64);
        for (k, v) in entries {
            write_zigzag_long(out, k.len() as i64);
            out.extend_from_slice(k.as_bytes());
            write_zigzag_long(out, v.len() as i64);
            out.extend_from_slice(v);
        }
    }
    write_zigzag_long(out, 0);
}

/// Encodes `Header{magic, meta{avro.schema, avro.codec}, sync}`.
pub fn encode_header(out: &mut Vec<u8>, schema_text: &str, codec_name: &str, sync: &[u8; SYNC_LEN]) {
    out.extend_from_slice(&MAGIC);
    write_map(out, &[("avro.codec", codec_name.as_bytes()), ("avro.schema", schema_text.as_bytes())]);
    out.extend_from_slice(sync);
}

fn read_map(tap: &mut Tap) -> BTreeMap<String, Vec<u8>> {
    let mut map = BTreeMap::new();
    loop {
        let mut count = tap.read_long();
        if !tap.is_valid() {
            return map;
        }
        if count == 0 {
            break;
        }
        if count < 0 {
            // Avro's block encoding allows a negative count followed by a byte-size hint we
            // don't need.
            let _size = tap.read_long();
            count = -count;
        }
        for _ in 0..count {
            let key = tap.read_bytes();
            if !tap.is_valid() {
                return map;
            }
            let value = tap.read_bytes();
            if !tap.is_valid() {
                return map;
            }
            map.insert(String::from_utf8_lossy(&key).into_owned(), value);
        }
    }
    map
}

/// Attempts to decode a `Header` from `tap`. Restores `tap`'s position and returns `None` if the
/// bytes available so far aren't enough.
pub fn try_decode_header(tap: &mut Tap) -> Option<Header> {
    let pos0 = tap.save();
    let magic_bytes = tap.read_fixed(4);
    let meta = read_map(tap);
    let sync_bytes = tap.read_fixed(SYNC_LEN);
    if !tap.is_valid() {
        tap.restore(pos0);
        return None;
    }
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&magic_bytes);
    let mut sync = [0u8; SYNC_LEN];
    sync.copy_from_slice(&sync_bytes);
    Some(Header { magic, meta, sync })
}

/// Attempts to decode one `Block{count, data, sync}`. Restores `tap`'s position and returns
/// `None` if the bytes available so far aren't enough.
pub fn try_read_block(tap: &mut Tap) -> Option<Block> {
    let pos0 = tap.save();
    let count = tap.read_long();
    let data = tap.read_bytes();
    let sync_bytes = tap.read_fixed(SYNC_LEN);
    if !tap.is_valid() {
        tap.restore(pos0);
        return None;
    }
    let mut sync = [0u8; SYNC_LEN];
    sync.copy_from_slice(&sync_bytes);
    Some(Block { count, data, sync })
}

/// Encodes one block's wire framing: `varint(count) || varint(len) || data || sync`.
pub fn encode_block(out: &mut Vec<u8>, count: u64, data: &[u8], sync: &[u8; SYNC_LEN]) {
    write_zigzag_long(out, count as i64);
    write_zigzag_long(out, data.len() as i64);
    out.extend_from_slice(data);
    out.extend_from_slice(sync);
}

static SYNC_SEED: AtomicU64 = AtomicU64::new(0x2545_f491_4f6c_dd1d);

/// Generates a 16-byte sync marker from a deterministic per-instance LCG seed. Not
/// cryptographically random — just unique enough across instances of the process to catch
/// accidental file concatenation / resynchronization.
pub fn generate_sync_marker() -> [u8; SYNC_LEN] {
    let mut state = SYNC_SEED.fetch_add(1, Ordering::Relaxed) ^ 0x9e37_79b9_7f4a_7c15;
    let mut out = [0u8; SYNC_LEN];
    for byte in out.iter_mut() {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        *byte = (state >> 56) as u8;
    }
    out
}
