//! QuickTime / ISO BMFF atom header parsing and navigation.

use std::io::{self, Read, Seek, SeekFrom};

/// A parsed atom header.
#[derive(Debug, Clone)]
pub struct BoxHeader {
    /// 4-byte atom type (e.g. b"moov").
    pub box_type: [u8; 4],
    /// Total size of the atom including the header. 0 means "to end of file".
    pub size: u64,
    /// Size of the header itself (8, or 16 for 64-bit sizes).
    pub header_size: u64,
}

impl BoxHeader {
    /// Size of the atom content (size - header_size).
    pub fn content_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size)
    }

    pub fn is(&self, box_type: &[u8; 4]) -> bool {
        &self.box_type == box_type
    }
}

/// Read an atom header from the current position.
///
/// Returns `Ok(None)` at EOF.
pub fn read_box_header<R: Read>(reader: &mut R) -> io::Result<Option<BoxHeader>> {
    let buf: [u8; 8] = match read_array(reader) {
        Ok(buf) => buf,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    };
    let (size_field, type_field) = buf.split_at(4);
    let size32 = u32::from_be_bytes([size_field[0], size_field[1], size_field[2], size_field[3]]);
    let box_type = [type_field[0], type_field[1], type_field[2], type_field[3]];

    let (size, header_size) = match size32 {
        1 => (read_u64(reader)?, 16u64),
        // Open-ended atom; only legal as the last one in a file.
        0 => (0, 8),
        n => (n as u64, 8),
    };

    if size != 0 && size < header_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "atom '{}' declares size {size} smaller than its header",
                fourcc(&box_type)
            ),
        ));
    }

    Ok(Some(BoxHeader {
        box_type,
        size,
        header_size,
    }))
}

/// Skip past the current atom's remaining content.
pub fn skip_box<R: Read + Seek>(reader: &mut R, header: &BoxHeader) -> io::Result<()> {
    reader.seek(SeekFrom::Current(header.content_size() as i64))?;
    Ok(())
}

/// Search for a child atom with the given type within `parent_content_size` bytes.
///
/// If found, the reader is positioned at the start of the child's content.
pub fn find_child_box<R: Read + Seek>(
    reader: &mut R,
    parent_content_size: u64,
    target: &[u8; 4],
) -> io::Result<Option<BoxHeader>> {
    let start = reader.stream_position()?;
    let end = start + parent_content_size;

    while reader.stream_position()? < end {
        let Some(header) = read_box_header(reader)? else {
            return Ok(None);
        };
        if header.size == 0 {
            return Ok(None);
        }
        if header.is(target) {
            return Ok(Some(header));
        }
        skip_box(reader, &header)?;
    }

    Ok(None)
}

/// List the direct children of a container as `(header, content_start)` pairs.
///
/// The reader position is unspecified afterwards.
pub fn list_children<R: Read + Seek>(
    reader: &mut R,
    parent_content_size: u64,
) -> io::Result<Vec<(BoxHeader, u64)>> {
    let start = reader.stream_position()?;
    let end = start + parent_content_size;
    let mut children = Vec::new();

    let mut pos = start;
    while pos + 8 <= end {
        reader.seek(SeekFrom::Start(pos))?;
        let Some(header) = read_box_header(reader)? else {
            break;
        };
        if header.size == 0 {
            break;
        }
        let content_start = reader.stream_position()?;
        pos += header.size;
        children.push((header, content_start));
    }

    Ok(children)
}

/// Read a whole atom (header included) whose content starts at `content_start`.
pub fn read_box_bytes<R: Read + Seek>(
    reader: &mut R,
    header: &BoxHeader,
    content_start: u64,
) -> io::Result<Vec<u8>> {
    reader.seek(SeekFrom::Start(content_start - header.header_size))?;
    read_bytes(reader, header.size as usize)
}

fn read_array<R: Read, const N: usize>(reader: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

macro_rules! be_reader {
    ($($name:ident => $ty:ty),* $(,)?) => {
        $(
            pub fn $name<R: Read>(reader: &mut R) -> io::Result<$ty> {
                read_array(reader).map(<$ty>::from_be_bytes)
            }
        )*
    };
}

// Big-endian fixed-width fields, as every QuickTime atom stores them.
be_reader! {
    read_u16 => u16,
    read_u32 => u32,
    read_i32 => i32,
    read_u64 => u64,
}

pub fn read_fourcc<R: Read>(reader: &mut R) -> io::Result<[u8; 4]> {
    read_array(reader)
}

pub fn read_bytes<R: Read>(reader: &mut R, n: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Version byte and 24-bit flags of a full atom.
pub fn read_fullbox_header<R: Read>(reader: &mut R) -> io::Result<(u8, u32)> {
    let val = read_u32(reader)?;
    Ok(((val >> 24) as u8, val & 0x00FF_FFFF))
}

/// Printable form of a four-character code.
pub fn fourcc(code: &[u8; 4]) -> String {
    code.iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect()
}
