//! The cursor types that do the heavy lifting of the binary layer:
//! [`ReadStream`] for random-access decoding and [`WriteStream`] for
//! placeholder-and-patch encoding, plus the string pool / relocation table
//! `finalise()` step.

use std::collections::{BTreeSet, HashMap};

use byteorder::{ByteOrder, LittleEndian};
use log::trace;

use crate::error::{Error, Result};
use crate::primitives::{encode_pascal_string, read_pascal_string};

fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// A type that can decode itself from a [`ReadStream`] positioned at its
/// first byte. Implemented by every entity in the data model (actors,
/// events, entry points, containers, ...).
pub trait BinaryRead: Sized {
    fn read_from(stream: &mut ReadStream) -> Result<Self>;
}

/// A type that can encode its fixed-size record to a [`WriteStream`].
/// Anything with trailing "extra data" (params containers, string arrays,
/// ...) exposes a separate method for that; this trait covers only the
/// record itself.
pub trait BinaryWrite {
    fn write_to(&self, stream: &mut WriteStream) -> Result<()>;
}

/// Immutable byte buffer with a cursor, supporting the random-access reads
/// (`read_ptr_object`, `read_string_ref`, ...) that pointer-chasing a BFEVFL
/// file requires.
pub struct ReadStream<'a> {
    pub data: &'a [u8],
    pos: usize,
}

impl<'a> ReadStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ReadStream { data, pos: 0 }
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, offset: usize) {
        self.pos = offset;
    }

    pub fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    pub fn align(&mut self, align: usize) {
        self.pos = align_up(self.pos, align);
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        let slice = self.data.get(self.pos..end).ok_or(Error::Truncated {
            offset: self.pos,
            requested: n,
            len: self.data.len(),
        })?;
        self.pos = end;
        Ok(slice)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_s32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    /// Runs `f` with the cursor moved to `offset`, restoring the original
    /// position afterwards regardless of how `f` returns.
    pub fn with_seek<T>(&mut self, offset: usize, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let original = self.pos;
        self.pos = offset;
        let result = f(self);
        self.pos = original;
        result
    }

    /// Reads a `u64` absolute offset; `0` means the empty string, otherwise
    /// decodes a Pascal string at that offset (independent of the cursor).
    pub fn read_string_ref(&mut self) -> Result<String> {
        let ptr = self.read_u64()? as usize;
        if ptr == 0 {
            return Ok(String::new());
        }
        read_pascal_string(self.data, ptr)
    }

    /// Reads a `u64` offset; `0` means `None`, otherwise scope-seeks to the
    /// offset and decodes a `T`.
    pub fn read_ptr_object<T: BinaryRead>(&mut self) -> Result<Option<T>> {
        let ptr = self.read_u64()? as usize;
        if ptr == 0 {
            return Ok(None);
        }
        self.with_seek(ptr, |s| T::read_from(s).map(Some))
    }

    /// Reads a `u64` base offset and decodes `n` consecutive `T`s there.
    pub fn read_ptr_objects<T: BinaryRead>(&mut self, n: usize) -> Result<Vec<T>> {
        let ptr = self.read_u64()? as usize;
        if ptr == 0 || n == 0 {
            return Ok(Vec::new());
        }
        self.with_seek(ptr, |s| {
            (0..n).map(|_| T::read_from(s)).collect::<Result<Vec<_>>>()
        })
    }
}

/// A previously-written slot whose final value is only known later. Seeks
/// back, overwrites, and restores the original cursor position.
#[derive(Clone, Copy, Debug)]
pub struct Placeholder {
    offset: usize,
}

impl Placeholder {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn patch(&self, stream: &mut WriteStream, bytes: &[u8]) {
        let current = stream.tell();
        stream.seek(self.offset);
        stream.write_bytes(bytes);
        stream.seek(current);
    }

    pub fn patch_u16(&self, stream: &mut WriteStream, value: u16) {
        self.patch(stream, &value.to_le_bytes());
    }

    pub fn patch_u32(&self, stream: &mut WriteStream, value: u32) {
        self.patch(stream, &value.to_le_bytes());
    }

    pub fn patch_u64(&self, stream: &mut WriteStream, value: u64) {
        self.patch(stream, &value.to_le_bytes());
    }

    /// Writes the stream's *current* position as a `u64` at the placeholder
    /// site. Used when the value being pointed to starts right here.
    pub fn patch_current_offset(&self, stream: &mut WriteStream) {
        let here = stream.tell() as u64;
        self.patch_u64(stream, here);
    }
}

#[derive(Clone, Copy)]
struct StringRefSite {
    offset: usize,
    is_header_name: bool,
}

/// Growable sink with seek-and-overwrite support, plus the bookkeeping
/// (`pointers`, `strings`) needed to emit the relocation table and string
/// pool at `finalise()`.
pub struct WriteStream {
    buf: Vec<u8>,
    pos: usize,
    pointers: BTreeSet<usize>,
    strings: HashMap<String, Vec<StringRefSite>>,
    relocation_table_offset: usize,
}

impl WriteStream {
    pub fn new() -> Self {
        let mut strings = HashMap::new();
        // The empty string is always present (but never emitted): it is
        // never assigned an offset in the pool.
        strings.insert(String::new(), Vec::new());
        WriteStream {
            buf: Vec::new(),
            pos: 0,
            pointers: BTreeSet::new(),
            strings,
            relocation_table_offset: 0,
        }
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, offset: usize) {
        self.pos = offset;
    }

    pub fn align(&mut self, align: usize) {
        let target = align_up(self.pos, align);
        if target > self.buf.len() {
            self.buf.resize(target, 0);
        }
        self.pos = target;
    }

    pub fn register_pointer(&mut self, offset: usize) {
        self.pointers.insert(offset);
    }

    pub fn register_string(&mut self, s: &str) {
        self.strings.entry(s.to_string()).or_default();
    }

    pub fn get_relocation_table_offset(&self) -> usize {
        self.relocation_table_offset
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        let end = self.pos + data.len();
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[self.pos..end].copy_from_slice(data);
        self.pos = end;
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_s32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_nullptr(&mut self, register: bool) {
        if register {
            self.register_pointer(self.tell());
        }
        self.write_u64(0);
    }

    fn write_placeholder(&mut self, sentinel: &[u8]) -> Placeholder {
        let offset = self.tell();
        self.write_bytes(sentinel);
        Placeholder { offset }
    }

    pub fn write_placeholder_u16(&mut self) -> Placeholder {
        self.write_placeholder(&0xffffu16.to_le_bytes())
    }

    pub fn write_placeholder_u32(&mut self) -> Placeholder {
        self.write_placeholder(&0xffff_ffffu32.to_le_bytes())
    }

    pub fn write_placeholder_u64(&mut self) -> Placeholder {
        self.write_placeholder(&0xffff_ffff_ffff_ffffu64.to_le_bytes())
    }

    pub fn write_placeholder_ptr(&mut self) -> Placeholder {
        self.register_pointer(self.tell());
        self.write_placeholder_u64()
    }

    /// Writes a placeholder pointer only if `condition` holds; otherwise
    /// writes a null `u64` (optionally still registering it, since Nintendo
    /// registers some nulls purely to keep alignment-preserving relocation
    /// bookkeeping consistent, notably in entry-point headers).
    pub fn write_placeholder_ptr_if(
        &mut self,
        condition: bool,
        register_even_if_null: bool,
    ) -> Option<Placeholder> {
        if !condition {
            self.write_nullptr(register_even_if_null);
            return None;
        }
        Some(self.write_placeholder_ptr())
    }

    /// Records a reference site for `data` and writes a sentinel; the site
    /// is patched with the string's final pool offset at `finalise()`.
    /// The header-form reference (`is_header_name`) is a `u32` holding
    /// `string_offset + 2` (pointing past the length prefix); it is not
    /// registered as a relocatable pointer.
    pub fn write_string_ref(&mut self, data: &str, is_header_name: bool) {
        let offset = self.tell();
        self.strings
            .entry(data.to_string())
            .or_default()
            .push(StringRefSite {
                offset,
                is_header_name,
            });
        if is_header_name {
            self.write_u32(0xffff_ffff);
        } else {
            self.register_pointer(offset);
            self.write_u64(0xffff_ffff_ffff_ffff);
        }
    }

    /// Emits the string pool and relocation table, in that order, and
    /// patches every recorded string reference site.
    pub fn finalise(&mut self) {
        self.align(8);
        self.write_string_pool();

        let data_end = self.tell();
        self.align(8);
        self.write_relocation_table(data_end);
    }

    fn write_string_pool(&mut self) {
        self.write_bytes(b"STR ");
        self.write_u32(0); // reserved
        self.write_u64(0); // reserved
        // The empty string's record is still emitted (it sorts first, as
        // the engine's own pool always contains it); only the count field
        // excludes it.
        self.write_u32((self.strings.len() - 1) as u32);

        let mut keys: Vec<String> = self.strings.keys().cloned().collect();
        keys.sort_by_key(|s| string_sort_key(s));

        for key in keys {
            let offset = self.tell();
            trace!("string pool: {:?} @ {}", key, offset);
            let sites = self.strings.get(&key).cloned().unwrap_or_default();
            for site in sites {
                let current = self.pos;
                self.seek(site.offset);
                if site.is_header_name {
                    self.write_u32((offset + 2) as u32);
                } else {
                    self.write_u64(offset as u64);
                }
                self.seek(current);
            }
            self.seek(offset);
            self.write_bytes(&encode_pascal_string(&key));
            self.align(2);
        }
    }

    fn write_relocation_table(&mut self, data_end: usize) {
        self.relocation_table_offset = self.tell();
        self.write_bytes(b"RELT");
        self.write_u32(self.relocation_table_offset as u32);
        // It's extremely unlikely the number of entries will ever exceed
        // 2^32 - 1, so only one section is emitted.
        self.write_u32(1);
        self.write_u32(0); // padding

        self.write_u64(0); // alternate offset (unused by Nintendo)
        self.write_u32(0); // base for alternate method (unused)
        self.write_u32(data_end as u32);
        self.write_u32(0); // entries to skip
        let num_entries_ph = self.write_placeholder_u32();

        let mut remaining: BTreeSet<usize> = self.pointers.clone();
        let mut num_entries = 0u32;
        let sites: Vec<usize> = self.pointers.iter().copied().collect();
        for p in sites {
            if !remaining.contains(&p) {
                continue;
            }
            let mut flag: u32 = 0;
            for i in 0..32u32 {
                let address = p + 8 * i as usize;
                if remaining.contains(&address) {
                    flag |= 1 << i;
                    remaining.remove(&address);
                }
            }
            self.write_u32(p as u32);
            self.write_u32(flag);
            num_entries += 1;
        }
        num_entries_ph.patch_u32(self, num_entries);
        trace!("relocation table: {} entries", num_entries);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for WriteStream {
    fn default() -> Self {
        Self::new()
    }
}

/// The engine's idiosyncratic string pool ordering: treat the UTF-8 bytes
/// as a big-endian integer, take its binary expansion with no leading
/// zeros, and reverse that bit string. Sorting ascending by this key (as a
/// byte sequence of ASCII `'0'`/`'1'`) reproduces Nintendo's tool output.
fn string_sort_key(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let digits = match bytes.iter().position(|&b| b != 0) {
        None => "0".to_string(),
        Some(first) => {
            let mut out = format!("{:b}", bytes[first]);
            for &b in &bytes[first + 1..] {
                out.push_str(&format!("{:08b}", b));
            }
            out
        }
    };
    digits.into_bytes().into_iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_round_trip_primitives() {
        let mut w = WriteStream::new();
        w.write_u8(1);
        w.write_u16(2);
        w.write_u32(3);
        w.write_s32(-4);
        w.write_u64(5);
        w.write_f32(6.5);
        let bytes = w.into_bytes();

        let mut r = ReadStream::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 1);
        assert_eq!(r.read_u16().unwrap(), 2);
        assert_eq!(r.read_u32().unwrap(), 3);
        assert_eq!(r.read_s32().unwrap(), -4);
        assert_eq!(r.read_u64().unwrap(), 5);
        assert_eq!(r.read_f32().unwrap(), 6.5);
    }

    #[test]
    fn placeholder_patches_without_disturbing_cursor() {
        let mut w = WriteStream::new();
        let ph = w.write_placeholder_u32();
        w.write_u32(0xaaaa_aaaa);
        let after = w.tell();
        ph.patch_u32(&mut w, 0x1234_5678);
        assert_eq!(w.tell(), after);

        let bytes = w.into_bytes();
        let mut r = ReadStream::new(&bytes);
        assert_eq!(r.read_u32().unwrap(), 0x1234_5678);
        assert_eq!(r.read_u32().unwrap(), 0xaaaa_aaaa);
    }

    #[test]
    fn align_pads_with_zero_bytes() {
        let mut w = WriteStream::new();
        w.write_u8(1);
        w.align(8);
        assert_eq!(w.tell(), 8);
        assert_eq!(w.into_bytes(), vec![1, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn scope_seek_restores_position_on_read() {
        let data = [0u8, 1, 2, 3, 4, 5];
        let mut r = ReadStream::new(&data);
        r.seek(5);
        let byte_at_1 = r.with_seek(1, |s| s.read_u8()).unwrap();
        assert_eq!(byte_at_1, 1);
        assert_eq!(r.tell(), 5);
    }

    #[test]
    fn string_sort_key_matches_engine_ordering() {
        let mut names = vec!["Always", "Rejection", "Before_FirstTouchdown"];
        names.sort_by_key(|s| string_sort_key(s));
        // Just check it doesn't panic and is a total order; exact
        // contents are exercised via the DIC and string-pool tests.
        assert_eq!(names.len(), 3);
    }
}
