//! Low-level binary encoding shared by chunk writers and readers.
//!
//! Every index file starts with a fixed 12-byte header (flag word, strings
//! block size, documents block size), followed by the strings block, the
//! optional documents block and a body of fixed-size entries. All multi-byte
//! integers are little-endian. This module is the only place that encodes or
//! decodes those integers; higher layers deal in [`Flags`], widths and packed
//! records.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{Result, SorrelError};
use crate::index::flags::{Flags, Width};
use crate::registry::DocumentId;
use crate::analysis::Zone;

/// Size in bytes of the fixed file header.
pub const HEADER_SIZE: u32 = 12;

/// The decoded 12-byte file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub flags: Flags,
    pub strings_block_size: u32,
    pub documents_block_size: u32,
}

impl Header {
    /// Decode a header from the start of a file image.
    pub fn decode(buf: &[u8]) -> Result<Header> {
        if buf.len() < HEADER_SIZE as usize {
            return Err(SorrelError::corrupt(format!(
                "file too short for header: {} bytes",
                buf.len()
            )));
        }
        Ok(Header {
            flags: Flags::from_bits(LittleEndian::read_u32(&buf[0..4])),
            strings_block_size: LittleEndian::read_u32(&buf[4..8]),
            documents_block_size: LittleEndian::read_u32(&buf[8..12]),
        })
    }

    /// Encode the header into its 12-byte wire form.
    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        LittleEndian::write_u32(&mut buf[0..4], self.flags.bits());
        LittleEndian::write_u32(&mut buf[4..8], self.strings_block_size);
        LittleEndian::write_u32(&mut buf[8..12], self.documents_block_size);
        buf
    }

    /// Offset of the first body entry.
    pub fn preamble_size(&self) -> u32 {
        HEADER_SIZE + self.strings_block_size + self.documents_block_size
    }
}

/// Read a fixed-width little-endian unsigned integer from the start of `buf`.
pub fn read_uint(buf: &[u8], width: Width) -> Result<u32> {
    let n = width.bytes() as usize;
    if buf.len() < n {
        return Err(SorrelError::corrupt(format!(
            "truncated integer: need {} bytes, have {}",
            n,
            buf.len()
        )));
    }
    Ok(match width {
        Width::W1 => buf[0] as u32,
        Width::W2 => LittleEndian::read_u16(buf) as u32,
        Width::W4 => LittleEndian::read_u32(buf),
    })
}

/// Write a fixed-width little-endian unsigned integer.
pub fn write_uint<W: Write>(out: &mut W, value: u32, width: Width) -> Result<()> {
    debug_assert!(
        width == Width::W4 || value < (1u32 << (width.bytes() * 8)),
        "value {value} does not fit width {width:?}"
    );
    match width {
        Width::W1 => out.write_u8(value as u8)?,
        Width::W2 => out.write_u16::<LittleEndian>(value as u16)?,
        Width::W4 => out.write_u32::<LittleEndian>(value)?,
    }
    Ok(())
}

/// Write a variable-byte integer: 7 value bits per byte, low group first,
/// high bit set while more bytes follow. Returns the encoded length.
pub fn write_varbyte<W: Write>(out: &mut W, mut value: u32) -> Result<u32> {
    let mut written = 0;
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.write_u8(byte)?;
        written += 1;
        if value == 0 {
            return Ok(written);
        }
    }
}

/// Decode a variable-byte integer from the start of `buf`.
/// Returns the value and the number of bytes consumed.
pub fn read_varbyte(buf: &[u8]) -> Result<(u32, usize)> {
    let mut value: u32 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        value |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(SorrelError::corrupt("unterminated varbyte integer"))
}

/// Bit budget for zone tags inside packed 32-bit document values.
///
/// Chosen per index at build time and recorded in the manifest; readers must
/// use the writer's layout or every document id decodes wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneLayout {
    bits: u32,
}

impl ZoneLayout {
    /// Create a layout with the given zone bit width. Must be below 8.
    pub fn new(bits: u32) -> Result<ZoneLayout> {
        if bits == 0 || bits >= 8 {
            return Err(SorrelError::config(format!(
                "zone bit width must be in 1..8, got {bits}"
            )));
        }
        Ok(ZoneLayout { bits })
    }

    /// The zone bit width.
    pub fn bits(self) -> u32 {
        self.bits
    }

    /// Bit mask covering the zone field.
    pub fn mask(self) -> u32 {
        (1 << self.bits) - 1
    }

    /// Highest document id this layout can pack.
    pub fn max_document_id(self) -> u32 {
        (1u32 << (32 - self.bits)) - 1
    }

    /// Pack a document id and zone into one 32-bit value whose integer order
    /// equals (document, zone) order.
    pub fn pack(self, doc: DocumentId, zone: Zone) -> u32 {
        debug_assert!(doc.id() <= self.max_document_id());
        debug_assert!((zone.bits() as u32) <= self.mask());
        (doc.id() << self.bits) | (zone.bits() as u32 & self.mask())
    }

    /// Inverse of [`pack`](Self::pack).
    pub fn unpack(self, packed: u32) -> (DocumentId, Zone) {
        (
            DocumentId(packed >> self.bits),
            Zone((packed & self.mask()) as u8),
        )
    }
}

impl Default for ZoneLayout {
    fn default() -> Self {
        ZoneLayout { bits: 4 }
    }
}

/// One mapper record: term id in the high 32 bits, packed document-with-zone
/// in the low 32. Plain `u64` comparison orders by (term, document, zone).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PackedRecord(u64);

impl PackedRecord {
    pub fn new(term_id: u32, doc: DocumentId, zone: Zone, layout: ZoneLayout) -> PackedRecord {
        PackedRecord(((term_id as u64) << 32) | layout.pack(doc, zone) as u64)
    }

    pub fn term_id(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The packed document-with-zone value, as stored on disk.
    pub fn packed_doc(self) -> u32 {
        self.0 as u32
    }

    pub fn doc_id(self, layout: ZoneLayout) -> DocumentId {
        layout.unpack(self.packed_doc()).0
    }

    pub fn zone(self, layout: ZoneLayout) -> Zone {
        layout.unpack(self.packed_doc()).1
    }

    /// Replace the term id, keeping the document part.
    pub fn with_term_id(self, term_id: u32) -> PackedRecord {
        PackedRecord(((term_id as u64) << 32) | (self.0 & 0xFFFF_FFFF))
    }

    /// OR another record's zone bits into this one. Both records must refer
    /// to the same (term, document).
    pub fn merge_zones(self, other: PackedRecord, layout: ZoneLayout) -> PackedRecord {
        debug_assert!(self.same_posting(other, layout));
        PackedRecord(self.0 | (other.0 & layout.mask() as u64))
    }

    /// True if the two records name the same (term, document) pair.
    pub fn same_posting(self, other: PackedRecord, layout: ZoneLayout) -> bool {
        self.0 & !(layout.mask() as u64) == other.0 & !(layout.mask() as u64)
    }
}

/// Buffered index-file writer that tracks its position and patches the header
/// after the block sizes are known.
pub struct WriteBuffer {
    out: BufWriter<File>,
    position: u64,
}

impl WriteBuffer {
    /// Create (truncate) the file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<WriteBuffer> {
        let file = File::create(path)?;
        Ok(WriteBuffer {
            out: BufWriter::new(file),
            position: 0,
        })
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Emit zero bytes, typically the header placeholder.
    pub fn skip(&mut self, n: u32) -> Result<()> {
        const ZEROS: [u8; 16] = [0; 16];
        let mut left = n as usize;
        while left > 0 {
            let take = left.min(ZEROS.len());
            self.out.write_all(&ZEROS[..take])?;
            left -= take;
        }
        self.position += n as u64;
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    pub fn write_uint(&mut self, value: u32, width: Width) -> Result<()> {
        write_uint(&mut self.out, value, width)?;
        self.position += width.bytes() as u64;
        Ok(())
    }

    /// Returns the encoded length.
    pub fn write_varbyte(&mut self, value: u32) -> Result<u32> {
        let written = write_varbyte(&mut self.out, value)?;
        self.position += written as u64;
        Ok(written)
    }

    /// Flush and close a file with no header to patch (external blocks).
    pub fn finish_raw(mut self) -> Result<()> {
        self.out.flush()?;
        self.out.get_mut().sync_all()?;
        Ok(())
    }

    /// Flush, rewrite the header at offset zero and close out the file.
    pub fn finish(mut self, header: Header) -> Result<()> {
        self.out.flush()?;
        let file = self.out.get_mut();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.encode())?;
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let mut flags = Flags::default();
        flags.set_sorted(true);
        flags.set_has_doc_block(true);
        let header = Header {
            flags,
            strings_block_size: 1234,
            documents_block_size: 56,
        };
        let decoded = Header::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.preamble_size(), HEADER_SIZE + 1234 + 56);
    }

    #[test]
    fn test_header_too_short() {
        assert!(Header::decode(&[0u8; 11]).is_err());
    }

    #[test]
    fn test_uint_roundtrip() {
        for (value, width) in [
            (0, Width::W1),
            (254, Width::W1),
            (255, Width::W2),
            (65534, Width::W2),
            (65535, Width::W4),
            (u32::MAX, Width::W4),
        ] {
            let mut buf = Vec::new();
            write_uint(&mut buf, value, width).unwrap();
            assert_eq!(buf.len(), width.bytes() as usize);
            assert_eq!(read_uint(&buf, width).unwrap(), value);
        }
    }

    #[test]
    fn test_uint_little_endian() {
        let mut buf = Vec::new();
        write_uint(&mut buf, 0x0102_0304, Width::W4).unwrap();
        assert_eq!(buf, [0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_varbyte_roundtrip() {
        for value in [0u32, 1, 127, 128, 300, 16383, 16384, u32::MAX] {
            let mut buf = Vec::new();
            let written = write_varbyte(&mut buf, value).unwrap();
            assert_eq!(written as usize, buf.len());
            let (decoded, consumed) = read_varbyte(&buf).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(consumed, buf.len());
        }
    }

    #[test]
    fn test_varbyte_encoding_shape() {
        let mut buf = Vec::new();
        write_varbyte(&mut buf, 300).unwrap();
        // 300 = 0b10_0101100: low group first with continuation bit.
        assert_eq!(buf, [0xAC, 0x02]);
    }

    #[test]
    fn test_varbyte_unterminated() {
        assert!(read_varbyte(&[0x80, 0x80]).is_err());
    }

    #[test]
    fn test_zone_layout_bounds() {
        assert!(ZoneLayout::new(0).is_err());
        assert!(ZoneLayout::new(8).is_err());
        let layout = ZoneLayout::new(4).unwrap();
        assert_eq!(layout.bits(), 4);
        assert_eq!(layout.mask(), 0b1111);
        assert_eq!(layout.max_document_id(), (1 << 28) - 1);
        assert_eq!(ZoneLayout::default(), layout);
    }

    #[test]
    fn test_pack_unpack() {
        let layout = ZoneLayout::default();
        let packed = layout.pack(DocumentId(42), Zone::TITLE);
        assert_eq!(layout.unpack(packed), (DocumentId(42), Zone::TITLE));
        // Integer order equals (document, zone) order.
        assert!(layout.pack(DocumentId(42), Zone::AUTHOR) < layout.pack(DocumentId(43), Zone::BODY));
    }

    #[test]
    fn test_packed_record_ordering() {
        let layout = ZoneLayout::default();
        let a = PackedRecord::new(1, DocumentId(9), Zone::BODY, layout);
        let b = PackedRecord::new(2, DocumentId(0), Zone::BODY, layout);
        let c = PackedRecord::new(2, DocumentId(1), Zone::BODY, layout);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(b.term_id(), 2);
        assert_eq!(c.doc_id(layout), DocumentId(1));
    }

    #[test]
    fn test_packed_record_merge_zones() {
        let layout = ZoneLayout::default();
        let a = PackedRecord::new(7, DocumentId(3), Zone::BODY, layout);
        let b = PackedRecord::new(7, DocumentId(3), Zone::TITLE, layout);
        assert!(a.same_posting(b, layout));
        let merged = a.merge_zones(b, layout);
        assert_eq!(merged.zone(layout), Zone::BODY.merge(Zone::TITLE));
        assert_eq!(merged.doc_id(layout), DocumentId(3));

        let other = PackedRecord::new(7, DocumentId(4), Zone::BODY, layout);
        assert!(!a.same_posting(other, layout));
    }

    #[test]
    fn test_write_buffer_positions_and_patch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk.spimi");

        let mut out = WriteBuffer::create(&path).unwrap();
        out.skip(HEADER_SIZE).unwrap();
        assert_eq!(out.position(), HEADER_SIZE as u64);
        out.write_uint(5, Width::W1).unwrap();
        out.write_bytes(b"hello").unwrap();
        let strings_size = out.position() as u32 - HEADER_SIZE;
        out.write_uint(0xBEEF, Width::W2).unwrap();

        let mut flags = Flags::default();
        flags.set_sorted(true);
        out.finish(Header {
            flags,
            strings_block_size: strings_size,
            documents_block_size: 0,
        })
        .unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let header = Header::decode(&bytes).unwrap();
        assert!(header.flags.sorted());
        assert_eq!(header.strings_block_size, 6);
        assert_eq!(&bytes[12..13], &[5]);
        assert_eq!(&bytes[13..18], b"hello");
        assert_eq!(read_uint(&bytes[18..], Width::W2).unwrap(), 0xBEEF);
    }
}
