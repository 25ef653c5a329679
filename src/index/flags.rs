//! The 32-bit flag word governing index-file layout.
//!
//! Five field classes (string length, string pointer, document block size,
//! document id, document pointer) each occupy two bits selecting an on-disk
//! width of 4, 2 or 1 bytes. The remaining single-bit flags describe the file
//! body: sort order, deduplication, block placement and document-list coding.
//! Flags are fully decided before any body bytes are written, because entry
//! size depends on them; writers buffer and patch the header last.

/// On-disk width of an integer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    /// One byte.
    W1,
    /// Two bytes, little-endian.
    W2,
    /// Four bytes, little-endian.
    W4,
}

impl Width {
    /// Width in bytes.
    pub fn bytes(self) -> u32 {
        match self {
            Width::W1 => 1,
            Width::W2 => 2,
            Width::W4 => 4,
        }
    }

    /// The smallest width that losslessly represents `max`.
    ///
    /// Boundary values select the next wider tier: 255 needs two bytes,
    /// 65535 needs four.
    pub fn for_max(max: u32) -> Width {
        if max < u8::MAX as u32 {
            Width::W1
        } else if max < u16::MAX as u32 {
            Width::W2
        } else {
            Width::W4
        }
    }
}

// Two-bit width tiers, by base bit index.
const STRING_LENGTH: u32 = 0;
const STRING_POINTER: u32 = 2;
const DOC_BLOCK_SIZE: u32 = 4;
const DOC_ID: u32 = 6;
const DOC_POINTER: u32 = 8;

// Single-bit flags.
const SORTED: u32 = 10;
const UNIFIED: u32 = 11;
const SORTED_STRINGS: u32 = 12;
const HAS_DOC_BLOCK: u32 = 13;
const EXTERNAL_STRINGS: u32 = 14;
const EXTERNAL_DOCUMENTS: u32 = 15;
const INTERVAL_CODED: u32 = 16;
const VARBYTE_CODED: u32 = 17;

/// The flag word stored at offset 0 of every index file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags(u32);

impl Flags {
    /// Wrap a raw flag word read from disk.
    pub fn from_bits(bits: u32) -> Flags {
        Flags(bits)
    }

    /// The raw flag word.
    pub fn bits(self) -> u32 {
        self.0
    }

    fn get(self, idx: u32) -> bool {
        (self.0 >> idx) & 1 == 1
    }

    fn set(&mut self, idx: u32, value: bool) {
        self.0 = self.0 & !(1 << idx) | ((value as u32) << idx);
    }

    fn tier_width(self, base: u32) -> Width {
        if self.get(base) {
            if self.get(base + 1) { Width::W1 } else { Width::W2 }
        } else {
            Width::W4
        }
    }

    fn set_tier(&mut self, base: u32, width: Width) {
        let (compressed, tiny) = match width {
            Width::W4 => (false, false),
            Width::W2 => (true, false),
            Width::W1 => (true, true),
        };
        self.set(base, compressed);
        self.set(base + 1, tiny);
    }

    fn and_tier(&mut self, base: u32, other: Flags) {
        self.set(base, self.get(base) && other.get(base));
        self.set(base + 1, self.get(base + 1) && other.get(base + 1));
    }

    /// Width of string length prefixes.
    pub fn string_length_width(self) -> Width {
        self.tier_width(STRING_LENGTH)
    }

    pub fn set_string_length_width(&mut self, width: Width) {
        self.set_tier(STRING_LENGTH, width);
    }

    /// Width of string pointers in body entries.
    pub fn string_pointer_width(self) -> Width {
        self.tier_width(STRING_POINTER)
    }

    pub fn set_string_pointer_width(&mut self, width: Width) {
        self.set_tier(STRING_POINTER, width);
    }

    /// Width of document-list count prefixes.
    pub fn doc_block_size_width(self) -> Width {
        self.tier_width(DOC_BLOCK_SIZE)
    }

    pub fn set_doc_block_size_width(&mut self, width: Width) {
        self.set_tier(DOC_BLOCK_SIZE, width);
    }

    /// Width of document ids (stored packed with zone bits).
    pub fn doc_id_width(self) -> Width {
        self.tier_width(DOC_ID)
    }

    pub fn set_doc_id_width(&mut self, width: Width) {
        self.set_tier(DOC_ID, width);
    }

    /// Width of document-list pointers in body entries.
    pub fn doc_pointer_width(self) -> Width {
        self.tier_width(DOC_POINTER)
    }

    pub fn set_doc_pointer_width(&mut self, width: Width) {
        self.set_tier(DOC_POINTER, width);
    }

    /// Narrow each width tier to the wider of `self` and `other`.
    ///
    /// Used by the reducer: the output may only claim a compressed tier when
    /// every input does.
    pub fn intersect_tiers(&mut self, other: Flags) {
        self.and_tier(STRING_LENGTH, other);
        self.and_tier(DOC_ID, other);
    }

    /// Entries sorted by (term, document id).
    pub fn sorted(self) -> bool {
        self.get(SORTED)
    }

    pub fn set_sorted(&mut self, value: bool) {
        self.set(SORTED, value);
    }

    /// No duplicate (term, document) pairs.
    pub fn unified(self) -> bool {
        self.get(UNIFIED)
    }

    pub fn set_unified(&mut self, value: bool) {
        self.set(UNIFIED, value);
    }

    /// String block stored in lexical order.
    pub fn sorted_strings(self) -> bool {
        self.get(SORTED_STRINGS)
    }

    pub fn set_sorted_strings(&mut self, value: bool) {
        self.set(SORTED_STRINGS, value);
    }

    /// Entries reference document-id lists instead of inline ids.
    pub fn has_doc_block(self) -> bool {
        self.get(HAS_DOC_BLOCK)
    }

    pub fn set_has_doc_block(&mut self, value: bool) {
        self.set(HAS_DOC_BLOCK, value);
    }

    /// String block holds a path to an external strings file.
    pub fn external_strings(self) -> bool {
        self.get(EXTERNAL_STRINGS)
    }

    pub fn set_external_strings(&mut self, value: bool) {
        self.set(EXTERNAL_STRINGS, value);
    }

    /// Document block holds a path to an external documents file.
    pub fn external_documents(self) -> bool {
        self.get(EXTERNAL_DOCUMENTS)
    }

    pub fn set_external_documents(&mut self, value: bool) {
        self.set(EXTERNAL_DOCUMENTS, value);
    }

    /// Document-id lists store deltas from the previous id.
    pub fn interval_coded(self) -> bool {
        self.get(INTERVAL_CODED)
    }

    pub fn set_interval_coded(&mut self, value: bool) {
        self.set(INTERVAL_CODED, value);
    }

    /// Document-id lists use variable-byte integers (overrides fixed widths).
    pub fn varbyte_coded(self) -> bool {
        self.get(VARBYTE_CODED)
    }

    pub fn set_varbyte_coded(&mut self, value: bool) {
        self.set(VARBYTE_CODED, value);
    }

    /// Size in bytes of one body entry under these flags.
    pub fn entry_size(self) -> u32 {
        let doc_part = if self.has_doc_block() {
            self.doc_pointer_width()
        } else {
            self.doc_id_width()
        };
        self.string_pointer_width().bytes() + doc_part.bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_tier_boundaries() {
        assert_eq!(Width::for_max(0), Width::W1);
        assert_eq!(Width::for_max(254), Width::W1);
        assert_eq!(Width::for_max(255), Width::W2);
        assert_eq!(Width::for_max(65534), Width::W2);
        assert_eq!(Width::for_max(65535), Width::W4);
        assert_eq!(Width::for_max(u32::MAX), Width::W4);
    }

    #[test]
    fn test_tier_roundtrip() {
        let mut flags = Flags::default();
        assert_eq!(flags.string_pointer_width(), Width::W4);

        flags.set_string_pointer_width(Width::W2);
        assert_eq!(flags.string_pointer_width(), Width::W2);

        flags.set_doc_id_width(Width::W1);
        assert_eq!(flags.doc_id_width(), Width::W1);
        // Unrelated tiers untouched.
        assert_eq!(flags.string_pointer_width(), Width::W2);
        assert_eq!(flags.doc_pointer_width(), Width::W4);
    }

    #[test]
    fn test_bool_flags_independent() {
        let mut flags = Flags::default();
        flags.set_sorted(true);
        flags.set_unified(true);
        flags.set_has_doc_block(true);
        assert!(flags.sorted());
        assert!(flags.unified());
        assert!(flags.has_doc_block());
        assert!(!flags.sorted_strings());
        flags.set_sorted(false);
        assert!(!flags.sorted());
        assert!(flags.unified());
    }

    #[test]
    fn test_entry_size() {
        let mut flags = Flags::default();
        flags.set_string_pointer_width(Width::W2);
        flags.set_doc_id_width(Width::W1);
        assert_eq!(flags.entry_size(), 3);

        flags.set_has_doc_block(true);
        flags.set_doc_pointer_width(Width::W4);
        assert_eq!(flags.entry_size(), 6);
    }

    #[test]
    fn test_roundtrip_bits() {
        let mut flags = Flags::default();
        flags.set_sorted(true);
        flags.set_varbyte_coded(true);
        flags.set_doc_id_width(Width::W2);
        let restored = Flags::from_bits(flags.bits());
        assert_eq!(restored, flags);
    }

    #[test]
    fn test_intersect_tiers() {
        let mut a = Flags::default();
        a.set_string_length_width(Width::W1);
        a.set_doc_id_width(Width::W2);

        let mut b = Flags::default();
        b.set_string_length_width(Width::W2);
        b.set_doc_id_width(Width::W2);

        a.intersect_tiers(b);
        assert_eq!(a.string_length_width(), Width::W2);
        assert_eq!(a.doc_id_width(), Width::W2);
    }
}
