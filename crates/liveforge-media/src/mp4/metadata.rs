//! QuickTime metadata atom parsing.
//!
//! Two places carry `mdta` keyed metadata:
//!
//! - the movie-level `meta` atom (`hdlr` = `mdta`, `keys`, `ilst`), holding
//!   asset items such as the content identifier;
//! - the `mebx` sample entry of a timed metadata track, declaring the keys
//!   that the track's samples refer to by local id.

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use super::atoms::{
    find_child_box, list_children, read_box_header, read_bytes, read_fourcc,
    read_fullbox_header, read_u32,
};

/// One asset-level item from `moov/meta`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMetadataEntry {
    pub namespace: [u8; 4],
    pub key: String,
    /// Well-known data type from the `data` atom (1 = UTF-8).
    pub data_type: u32,
    pub value: Vec<u8>,
}

impl AssetMetadataEntry {
    /// The value as text, if it is a UTF-8 item.
    pub fn as_utf8(&self) -> Option<&str> {
        if self.data_type != 1 {
            return None;
        }
        std::str::from_utf8(&self.value).ok()
    }
}

/// A key declared by a `mebx` sample entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedMetadataKey {
    /// Id used inside samples to refer to this key.
    pub local_id: u32,
    pub namespace: [u8; 4],
    pub key: String,
    /// Well-known data type from `dtyp`, if declared that way.
    pub data_type: Option<u32>,
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// Parse a `meta` atom whose content starts at the reader's position.
///
/// Accepts both the QuickTime layout (no version/flags) and the ISO full-atom
/// layout. Returns an empty list when the handler is not `mdta`.
pub fn parse_meta<R: Read + Seek>(
    reader: &mut R,
    content_size: u64,
) -> io::Result<Vec<AssetMetadataEntry>> {
    let start = reader.stream_position()?;

    let mut probe = [0u8; 8];
    reader.read_exact(&mut probe)?;
    let (start, content_size) = if &probe[4..8] == b"hdlr" {
        (start, content_size)
    } else {
        (start + 4, content_size.saturating_sub(4))
    };

    reader.seek(SeekFrom::Start(start))?;
    if find_child_box(reader, content_size, b"hdlr")?.is_none() {
        return Ok(Vec::new());
    }
    let (_version, _flags) = read_fullbox_header(reader)?;
    let _pre_defined = read_u32(reader)?;
    if &read_fourcc(reader)? != b"mdta" {
        return Ok(Vec::new());
    }

    reader.seek(SeekFrom::Start(start))?;
    if find_child_box(reader, content_size, b"keys")?.is_none() {
        return Ok(Vec::new());
    }
    let keys = parse_keys(reader)?;

    reader.seek(SeekFrom::Start(start))?;
    let Some(ilst) = find_child_box(reader, content_size, b"ilst")? else {
        return Ok(Vec::new());
    };

    let mut entries = Vec::new();
    for (item, item_start) in list_children(reader, ilst.content_size())? {
        // Item atoms are typed by the 1-based index into `keys`.
        let index = u32::from_be_bytes(item.box_type) as usize;
        let Some((namespace, key)) = index.checked_sub(1).and_then(|i| keys.get(i)) else {
            continue;
        };
        reader.seek(SeekFrom::Start(item_start))?;
        let Some(data) = find_child_box(reader, item.content_size(), b"data")? else {
            continue;
        };
        let type_indicator = read_u32(reader)?;
        let _locale = read_u32(reader)?;
        let value = read_bytes(reader, data.content_size().saturating_sub(8) as usize)?;
        entries.push(AssetMetadataEntry {
            namespace: *namespace,
            key: key.clone(),
            data_type: type_indicator & 0x00FF_FFFF,
            value,
        });
    }

    Ok(entries)
}

/// Parse `keys` content (full atom: entry count, then sized key entries).
fn parse_keys<R: Read>(reader: &mut R) -> io::Result<Vec<([u8; 4], String)>> {
    let (_version, _flags) = read_fullbox_header(reader)?;
    let count = read_u32(reader)?;
    let mut keys = Vec::with_capacity(count.min(256) as usize);
    for _ in 0..count {
        let size = read_u32(reader)?;
        if size < 8 {
            return Err(invalid("keys entry smaller than its header"));
        }
        let namespace = read_fourcc(reader)?;
        let value = read_bytes(reader, size as usize - 8)?;
        keys.push((namespace, String::from_utf8_lossy(&value).into_owned()));
    }
    Ok(keys)
}

/// Extract the keys declared by the `mebx` entries of a raw `stsd` atom.
///
/// Returns an empty list when the description holds no `mebx` entry.
pub fn parse_mebx_keys(stsd: &[u8]) -> io::Result<Vec<TimedMetadataKey>> {
    let mut reader = Cursor::new(stsd);
    let Some(header) = read_box_header(&mut reader)? else {
        return Ok(Vec::new());
    };
    if !header.is(b"stsd") {
        return Err(invalid("expected stsd atom"));
    }
    let (_version, _flags) = read_fullbox_header(&mut reader)?;
    let _entry_count = read_u32(&mut reader)?;
    let remaining = header.content_size().saturating_sub(8);

    let mut keys = Vec::new();
    for (entry, entry_start) in list_children(&mut reader, remaining)? {
        if !entry.is(b"mebx") {
            continue;
        }
        // Sample entry preamble: 6 reserved bytes + data reference index.
        let children_start = entry_start + 8;
        let children_size = entry.content_size().saturating_sub(8);
        reader.seek(SeekFrom::Start(children_start))?;
        let Some(key_table) = find_child_box(&mut reader, children_size, b"keys")? else {
            continue;
        };
        for (local, local_start) in list_children(&mut reader, key_table.content_size())? {
            keys.push(parse_local_key(
                &mut reader,
                &local.box_type,
                local_start,
                local.content_size(),
            )?);
        }
    }
    Ok(keys)
}

fn parse_local_key(
    reader: &mut Cursor<&[u8]>,
    local_id: &[u8; 4],
    start: u64,
    size: u64,
) -> io::Result<TimedMetadataKey> {
    reader.seek(SeekFrom::Start(start))?;
    let keyd = find_child_box(reader, size, b"keyd")?
        .ok_or_else(|| invalid("local key without keyd"))?;
    let namespace = read_fourcc(reader)?;
    let key = read_bytes(reader, keyd.content_size().saturating_sub(4) as usize)?;

    reader.seek(SeekFrom::Start(start))?;
    let data_type = match find_child_box(reader, size, b"dtyp")? {
        Some(_) => {
            // Namespace 0 means a well-known type number follows.
            let ns = read_u32(reader)?;
            if ns == 0 {
                Some(read_u32(reader)?)
            } else {
                None
            }
        }
        None => None,
    };

    Ok(TimedMetadataKey {
        local_id: u32::from_be_bytes(*local_id),
        namespace,
        key: String::from_utf8_lossy(&key).into_owned(),
        data_type,
    })
}
