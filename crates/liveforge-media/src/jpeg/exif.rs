//! EXIF (TIFF) directories and the Apple maker note.
//!
//! Parsed entries are normalized to big-endian so the directories can be
//! re-serialized as a fresh `MM` TIFF regardless of the source byte order.
//! Only IFD0, the Exif IFD and the GPS IFD survive a round trip; the
//! thumbnail directory (IFD1) and the interoperability pointer are dropped.

use std::io;

/// Prefix of an APP1 Exif payload.
pub const EXIF_HEADER: &[u8] = b"Exif\0\0";

pub const TAG_EXIF_IFD: u16 = 0x8769;
pub const TAG_GPS_IFD: u16 = 0x8825;
pub const TAG_INTEROP_IFD: u16 = 0xA005;
pub const TAG_EXIF_VERSION: u16 = 0x9000;
pub const TAG_MAKER_NOTE: u16 = 0x927C;

pub const TYPE_ASCII: u16 = 2;
pub const TYPE_LONG: u16 = 4;
pub const TYPE_UNDEFINED: u16 = 7;

/// Maker-note tag holding the content identifier.
pub const APPLE_CONTENT_IDENTIFIER_TAG: u16 = 0x0011;

const APPLE_MAKER_PREFIX: &[u8] = b"Apple iOS\0";
const APPLE_MAKER_VERSION: [u8; 2] = [0, 1];
/// Prefix, version and byte order mark.
const APPLE_MAKER_HEADER_LEN: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn from_mark(mark: &[u8]) -> io::Result<Self> {
        match mark {
            b"II" => Ok(ByteOrder::Little),
            b"MM" => Ok(ByteOrder::Big),
            _ => Err(invalid("unknown TIFF byte order")),
        }
    }

    fn u16(self, b: &[u8]) -> u16 {
        match self {
            ByteOrder::Little => u16::from_le_bytes([b[0], b[1]]),
            ByteOrder::Big => u16::from_be_bytes([b[0], b[1]]),
        }
    }

    fn u32(self, b: &[u8]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            ByteOrder::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        }
    }
}

/// Byte width of one value of `field_type`, `None` for unknown types.
fn type_size(field_type: u16) -> Option<usize> {
    match field_type {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 | 11 => Some(4),
        5 | 10 | 12 => Some(8),
        _ => None,
    }
}

/// Width of the integers a value of `field_type` is made of; rationals are
/// two 4-byte halves.
fn swap_width(field_type: u16) -> usize {
    match field_type {
        3 | 8 => 2,
        4 | 9 | 11 | 5 | 10 => 4,
        12 => 8,
        _ => 1,
    }
}

/// One directory entry with its value stored big-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag: u16,
    pub field_type: u16,
    pub count: u32,
    pub value: Vec<u8>,
}

impl IfdEntry {
    pub fn undefined(tag: u16, value: Vec<u8>) -> Self {
        Self {
            tag,
            field_type: TYPE_UNDEFINED,
            count: value.len() as u32,
            value,
        }
    }

    fn long(tag: u16, value: u32) -> Self {
        Self {
            tag,
            field_type: TYPE_LONG,
            count: 1,
            value: value.to_be_bytes().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directory {
    Ifd0,
    Exif,
    Gps,
}

/// The directories carried over from a source image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExifData {
    pub ifd0: Vec<IfdEntry>,
    pub exif: Vec<IfdEntry>,
    pub gps: Vec<IfdEntry>,
}

impl ExifData {
    /// Parse an APP1 payload (with or without the `Exif\0\0` prefix).
    pub fn parse(payload: &[u8]) -> io::Result<Self> {
        let tiff = payload.strip_prefix(EXIF_HEADER).unwrap_or(payload);
        if tiff.len() < 8 {
            return Err(invalid("TIFF header truncated"));
        }
        let order = ByteOrder::from_mark(&tiff[0..2])?;
        if order.u16(&tiff[2..4]) != 42 {
            return Err(invalid("bad TIFF magic"));
        }

        let ifd0 = read_ifd(tiff, order, order.u32(&tiff[4..8]) as usize)?;
        let pointer = |entries: &[IfdEntry], tag: u16| {
            entries
                .iter()
                .find(|e| e.tag == tag && e.value.len() == 4)
                .map(|e| u32::from_be_bytes([e.value[0], e.value[1], e.value[2], e.value[3]]))
        };

        let exif = match pointer(&ifd0, TAG_EXIF_IFD) {
            Some(offset) => read_ifd(tiff, order, offset as usize)?,
            None => Vec::new(),
        };
        let gps = match pointer(&ifd0, TAG_GPS_IFD) {
            Some(offset) => read_ifd(tiff, order, offset as usize)?,
            None => Vec::new(),
        };

        let keep = |entries: Vec<IfdEntry>, dropped: &[u16]| -> Vec<IfdEntry> {
            entries
                .into_iter()
                .filter(|e| !dropped.contains(&e.tag))
                .collect()
        };

        let mut data = Self {
            ifd0: keep(ifd0, &[TAG_EXIF_IFD, TAG_GPS_IFD, TAG_INTEROP_IFD]),
            exif: keep(exif, &[TAG_INTEROP_IFD]),
            gps: keep(gps, &[]),
        };
        for dir in [&mut data.ifd0, &mut data.exif, &mut data.gps] {
            dir.sort_by_key(|e| e.tag);
        }
        Ok(data)
    }

    fn directory(&self, dir: Directory) -> &Vec<IfdEntry> {
        match dir {
            Directory::Ifd0 => &self.ifd0,
            Directory::Exif => &self.exif,
            Directory::Gps => &self.gps,
        }
    }

    fn directory_mut(&mut self, dir: Directory) -> &mut Vec<IfdEntry> {
        match dir {
            Directory::Ifd0 => &mut self.ifd0,
            Directory::Exif => &mut self.exif,
            Directory::Gps => &mut self.gps,
        }
    }

    pub fn get(&self, dir: Directory, tag: u16) -> Option<&IfdEntry> {
        self.directory(dir).iter().find(|e| e.tag == tag)
    }

    /// Insert or replace the entry with `entry.tag`, keeping tag order.
    pub fn set(&mut self, dir: Directory, entry: IfdEntry) {
        let entries = self.directory_mut(dir);
        match entries.binary_search_by_key(&entry.tag, |e| e.tag) {
            Ok(i) => entries[i] = entry,
            Err(i) => entries.insert(i, entry),
        }
    }

    /// Serialize as a big-endian TIFF: IFD0, then the Exif IFD, then GPS.
    pub fn to_tiff(&self) -> Vec<u8> {
        let mut ifd0 = self.ifd0.clone();
        let exif_offset = 8 + block_len(&ifd0, !self.exif.is_empty(), !self.gps.is_empty());
        let exif_len = if self.exif.is_empty() {
            0
        } else {
            block_len(&self.exif, false, false)
        };
        let gps_offset = exif_offset + exif_len;

        if !self.exif.is_empty() {
            ifd0.push(IfdEntry::long(TAG_EXIF_IFD, exif_offset as u32));
        }
        if !self.gps.is_empty() {
            ifd0.push(IfdEntry::long(TAG_GPS_IFD, gps_offset as u32));
        }
        ifd0.sort_by_key(|e| e.tag);

        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"MM");
        tiff.extend_from_slice(&42u16.to_be_bytes());
        tiff.extend_from_slice(&8u32.to_be_bytes());
        write_ifd(&mut tiff, &ifd0);
        if !self.exif.is_empty() {
            write_ifd(&mut tiff, &self.exif);
        }
        if !self.gps.is_empty() {
            write_ifd(&mut tiff, &self.gps);
        }
        tiff
    }

    /// `Exif\0\0` followed by [`Self::to_tiff`].
    pub fn to_app1_payload(&self) -> Vec<u8> {
        let mut payload = EXIF_HEADER.to_vec();
        payload.extend_from_slice(&self.to_tiff());
        payload
    }
}

fn read_ifd(tiff: &[u8], order: ByteOrder, offset: usize) -> io::Result<Vec<IfdEntry>> {
    let count_end = offset.checked_add(2).ok_or_else(|| invalid("IFD offset overflow"))?;
    if count_end > tiff.len() {
        return Err(invalid("IFD offset out of range"));
    }
    let count = order.u16(&tiff[offset..count_end]) as usize;
    if count_end + count * 12 > tiff.len() {
        return Err(invalid("IFD entries out of range"));
    }

    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let at = count_end + i * 12;
        let raw = &tiff[at..at + 12];
        let tag = order.u16(&raw[0..2]);
        let field_type = order.u16(&raw[2..4]);
        let count = order.u32(&raw[4..8]);

        let Some(size) = type_size(field_type) else {
            tracing::debug!("skipping EXIF tag {tag:#06x} with unknown type {field_type}");
            continue;
        };
        let total = (count as usize)
            .checked_mul(size)
            .ok_or_else(|| invalid("EXIF value too large"))?;
        let bytes = if total <= 4 {
            &raw[8..8 + total]
        } else {
            let start = order.u32(&raw[8..12]) as usize;
            let end = start
                .checked_add(total)
                .filter(|&end| end <= tiff.len())
                .ok_or_else(|| invalid("EXIF value out of range"))?;
            &tiff[start..end]
        };

        entries.push(IfdEntry {
            tag,
            field_type,
            count,
            value: to_big_endian(bytes, swap_width(field_type), order),
        });
    }
    Ok(entries)
}

fn to_big_endian(bytes: &[u8], width: usize, order: ByteOrder) -> Vec<u8> {
    if order == ByteOrder::Big || width == 1 {
        return bytes.to_vec();
    }
    bytes
        .chunks(width)
        .flat_map(|chunk| chunk.iter().rev().copied())
        .collect()
}

/// Size of a directory plus its out-of-line values.
fn block_len(entries: &[IfdEntry], exif_pointer: bool, gps_pointer: bool) -> usize {
    let pointers = exif_pointer as usize + gps_pointer as usize;
    let values: usize = entries
        .iter()
        .filter(|e| e.value.len() > 4)
        .map(|e| e.value.len() + e.value.len() % 2)
        .sum();
    2 + 12 * (entries.len() + pointers) + 4 + values
}

/// Append a directory whose first byte lands at `tiff.len()`.
fn write_ifd(tiff: &mut Vec<u8>, entries: &[IfdEntry]) {
    let start = tiff.len();
    let mut data_offset = start + 2 + 12 * entries.len() + 4;
    let mut data = Vec::new();

    tiff.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    for entry in entries {
        tiff.extend_from_slice(&entry.tag.to_be_bytes());
        tiff.extend_from_slice(&entry.field_type.to_be_bytes());
        tiff.extend_from_slice(&entry.count.to_be_bytes());
        if entry.value.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..entry.value.len()].copy_from_slice(&entry.value);
            tiff.extend_from_slice(&inline);
        } else {
            tiff.extend_from_slice(&(data_offset as u32).to_be_bytes());
            data.extend_from_slice(&entry.value);
            if entry.value.len() % 2 == 1 {
                data.push(0);
            }
            data_offset = start + 2 + 12 * entries.len() + 4 + data.len();
        }
    }
    // next IFD: none
    tiff.extend_from_slice(&0u32.to_be_bytes());
    tiff.extend_from_slice(&data);
}

/// Apple maker note with a single ASCII content identifier entry.
pub fn apple_maker_note(identifier: &str) -> Vec<u8> {
    let mut note = Vec::with_capacity(32 + identifier.len() + 1);
    note.extend_from_slice(APPLE_MAKER_PREFIX);
    note.extend_from_slice(&APPLE_MAKER_VERSION);
    note.extend_from_slice(b"MM");
    note.extend_from_slice(&1u16.to_be_bytes());
    note.extend_from_slice(&APPLE_CONTENT_IDENTIFIER_TAG.to_be_bytes());
    note.extend_from_slice(&TYPE_ASCII.to_be_bytes());
    note.extend_from_slice(&(identifier.len() as u32 + 1).to_be_bytes());
    // offsets are relative to the start of the maker note
    note.extend_from_slice(&32u32.to_be_bytes());
    note.extend_from_slice(&0u32.to_be_bytes());
    note.extend_from_slice(identifier.as_bytes());
    note.push(0);
    note
}

/// Content identifier stored in an Apple maker note, if any.
pub fn apple_content_identifier(note: &[u8]) -> Option<String> {
    if note.len() < APPLE_MAKER_HEADER_LEN + 2 || !note.starts_with(APPLE_MAKER_PREFIX) {
        return None;
    }
    let order = ByteOrder::from_mark(&note[12..14]).ok()?;
    let count = order.u16(&note[14..16]) as usize;
    for i in 0..count {
        let at = 16 + i * 12;
        let raw = note.get(at..at + 12)?;
        if order.u16(&raw[0..2]) != APPLE_CONTENT_IDENTIFIER_TAG
            || order.u16(&raw[2..4]) != TYPE_ASCII
        {
            continue;
        }
        let len = order.u32(&raw[4..8]) as usize;
        let bytes = if len <= 4 {
            raw.get(8..8 + len)?
        } else {
            let start = order.u32(&raw[8..12]) as usize;
            note.get(start..start.checked_add(len)?)?
        };
        let text = bytes.split(|&b| b == 0).next().unwrap_or_default();
        return String::from_utf8(text.to_vec()).ok();
    }
    None
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("malformed EXIF: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Little-endian TIFF: IFD0 {Make "Acme", ExifPointer}, Exif {ExposureTime 1/60, Interop}.
    fn little_endian_tiff() -> Vec<u8> {
        let mut t = Vec::new();
        t.extend_from_slice(b"II");
        t.extend_from_slice(&42u16.to_le_bytes());
        t.extend_from_slice(&8u32.to_le_bytes());
        // IFD0 at 8: 2 entries -> ends at 8+2+24+4 = 38
        t.extend_from_slice(&2u16.to_le_bytes());
        t.extend_from_slice(&0x010Fu16.to_le_bytes());
        t.extend_from_slice(&TYPE_ASCII.to_le_bytes());
        t.extend_from_slice(&5u32.to_le_bytes());
        t.extend_from_slice(&38u32.to_le_bytes());
        t.extend_from_slice(&TAG_EXIF_IFD.to_le_bytes());
        t.extend_from_slice(&TYPE_LONG.to_le_bytes());
        t.extend_from_slice(&1u32.to_le_bytes());
        t.extend_from_slice(&44u32.to_le_bytes());
        t.extend_from_slice(&0u32.to_le_bytes());
        // 38: "Acme\0" + pad
        t.extend_from_slice(b"Acme\0\0");
        // Exif IFD at 44: 2 entries -> ends at 44+2+24+4 = 74
        t.extend_from_slice(&2u16.to_le_bytes());
        t.extend_from_slice(&0x829Au16.to_le_bytes());
        t.extend_from_slice(&5u16.to_le_bytes());
        t.extend_from_slice(&1u32.to_le_bytes());
        t.extend_from_slice(&74u32.to_le_bytes());
        t.extend_from_slice(&TAG_INTEROP_IFD.to_le_bytes());
        t.extend_from_slice(&TYPE_LONG.to_le_bytes());
        t.extend_from_slice(&1u32.to_le_bytes());
        t.extend_from_slice(&0u32.to_le_bytes());
        t.extend_from_slice(&0u32.to_le_bytes());
        // 74: rational 1/60
        t.extend_from_slice(&1u32.to_le_bytes());
        t.extend_from_slice(&60u32.to_le_bytes());
        t
    }

    #[test]
    fn test_parse_little_endian() {
        let data = ExifData::parse(&little_endian_tiff()).unwrap();
        assert_eq!(data.ifd0.len(), 1);
        assert_eq!(data.get(Directory::Ifd0, 0x010F).unwrap().value, b"Acme\0");

        assert_eq!(data.exif.len(), 1, "interop pointer is dropped");
        let exposure = data.get(Directory::Exif, 0x829A).unwrap();
        assert_eq!(exposure.value, [0, 0, 0, 1, 0, 0, 0, 60]);
        assert!(data.gps.is_empty());
    }

    #[test]
    fn test_reserialize_is_big_endian_and_stable() {
        let data = ExifData::parse(&little_endian_tiff()).unwrap();
        let tiff = data.to_tiff();
        assert_eq!(&tiff[0..4], b"MM\0\x2A");

        let reparsed = ExifData::parse(&tiff).unwrap();
        assert_eq!(reparsed, data);
        assert_eq!(reparsed.to_tiff(), tiff);
    }

    #[test]
    fn test_set_replaces_and_orders() {
        let mut data = ExifData::default();
        data.set(Directory::Exif, IfdEntry::undefined(TAG_MAKER_NOTE, vec![1, 2, 3]));
        data.set(Directory::Exif, IfdEntry::undefined(TAG_EXIF_VERSION, b"0230".to_vec()));
        data.set(Directory::Exif, IfdEntry::undefined(TAG_EXIF_VERSION, b"0221".to_vec()));
        let tags: Vec<u16> = data.exif.iter().map(|e| e.tag).collect();
        assert_eq!(tags, vec![TAG_EXIF_VERSION, TAG_MAKER_NOTE]);
        assert_eq!(data.get(Directory::Exif, TAG_EXIF_VERSION).unwrap().value, b"0221");

        let reparsed = ExifData::parse(&data.to_app1_payload()).unwrap();
        assert_eq!(reparsed.exif, data.exif);
        assert!(reparsed.ifd0.is_empty());
    }

    #[test]
    fn test_gps_directory_survives() {
        let mut data = ExifData::default();
        data.set(Directory::Ifd0, IfdEntry::undefined(0x0131, b"tool".to_vec()));
        data.set(Directory::Gps, IfdEntry::undefined(0x001B, b"GPS-PROCESSING".to_vec()));
        let reparsed = ExifData::parse(&data.to_tiff()).unwrap();
        assert_eq!(reparsed, data);
    }

    #[test]
    fn test_rejects_bad_offsets() {
        let mut tiff = little_endian_tiff();
        // point the Exif IFD past the end
        tiff[30..34].copy_from_slice(&1000u32.to_le_bytes());
        assert!(ExifData::parse(&tiff).is_err());
        assert!(ExifData::parse(b"XX\0\0\0\0\0\0").is_err());
    }

    #[test]
    fn test_apple_maker_note_layout() {
        let id = "0B1C8E4A-5D2F-4C3B-9A8E-7F6D5C4B3A29";
        let note = apple_maker_note(id);
        assert!(note.starts_with(b"Apple iOS\0\0\x01MM"));
        assert_eq!(&note[14..16], &[0, 1]);
        assert_eq!(&note[16..18], &[0, 0x11]);
        assert_eq!(note.len(), 32 + id.len() + 1);
        assert_eq!(apple_content_identifier(&note).as_deref(), Some(id));
        assert_eq!(apple_content_identifier(b"Nikon\0"), None);
    }
}
