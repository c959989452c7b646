//! JPEG marker segment parsing.
//!
//! Only the header is split into segments. Everything from Start-Of-Scan to
//! the end of the file is kept as one opaque slice so it can be written back
//! byte for byte.

use std::io;

pub const SOI: u8 = 0xD8;
pub const EOI: u8 = 0xD9;
pub const SOS: u8 = 0xDA;
pub const APP0: u8 = 0xE0;
pub const APP1: u8 = 0xE1;

/// Largest payload a length-prefixed segment can carry.
pub const MAX_SEGMENT_PAYLOAD: usize = u16::MAX as usize - 2;

const JFIF_IDENTIFIER: &[u8] = b"JFIF\0";

/// One header segment; `payload` excludes the marker and length bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub marker: u8,
    pub payload: &'a [u8],
}

impl Segment<'_> {
    pub fn is_jfif(&self) -> bool {
        self.marker == APP0 && self.payload.starts_with(JFIF_IDENTIFIER)
    }

    pub fn is_exif(&self) -> bool {
        self.marker == APP1 && self.payload.starts_with(super::exif::EXIF_HEADER)
    }

    /// Markers without a length field (`TEM`, `RSTn`).
    pub fn is_standalone(marker: u8) -> bool {
        marker == 0x01 || (0xD0..=0xD7).contains(&marker)
    }
}

/// A JPEG split into header segments and the compressed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegLayout<'a> {
    pub segments: Vec<Segment<'a>>,
    /// From the `SOS` marker to the end of the input.
    pub scan: &'a [u8],
}

impl<'a> JpegLayout<'a> {
    pub fn parse(bytes: &'a [u8]) -> io::Result<Self> {
        if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != SOI {
            return Err(invalid("missing start-of-image marker"));
        }

        let mut segments = Vec::new();
        let mut pos = 2usize;
        loop {
            if pos >= bytes.len() || bytes[pos] != 0xFF {
                return Err(invalid("expected a marker"));
            }
            // Any number of 0xFF fill bytes may precede a marker.
            while pos + 1 < bytes.len() && bytes[pos + 1] == 0xFF {
                pos += 1;
            }
            if pos + 1 >= bytes.len() {
                return Err(invalid("truncated marker"));
            }
            let marker = bytes[pos + 1];

            match marker {
                SOS => {
                    return Ok(Self {
                        segments,
                        scan: &bytes[pos..],
                    });
                }
                EOI => return Err(invalid("end-of-image before start-of-scan")),
                m if Segment::is_standalone(m) => {
                    segments.push(Segment {
                        marker,
                        payload: &[],
                    });
                    pos += 2;
                }
                _ => {
                    if pos + 4 > bytes.len() {
                        return Err(invalid("truncated segment length"));
                    }
                    let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
                    if length < 2 || pos + 2 + length > bytes.len() {
                        return Err(invalid("segment overruns the file"));
                    }
                    segments.push(Segment {
                        marker,
                        payload: &bytes[pos + 4..pos + 2 + length],
                    });
                    pos += 2 + length;
                }
            }
        }
    }

    /// The first APP1 Exif segment's payload.
    pub fn exif_payload(&self) -> Option<&'a [u8]> {
        self.segments.iter().find(|s| s.is_exif()).map(|s| s.payload)
    }
}

/// Append a length-prefixed segment.
pub fn write_segment(out: &mut Vec<u8>, marker: u8, payload: &[u8]) -> io::Result<()> {
    if payload.len() > MAX_SEGMENT_PAYLOAD {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("segment payload of {} bytes does not fit", payload.len()),
        ));
    }
    out.extend_from_slice(&[0xFF, marker]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(())
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("malformed JPEG: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut bytes = vec![0xFF, SOI];
        write_segment(&mut bytes, APP0, b"JFIF\0\x01\x01").unwrap();
        write_segment(&mut bytes, 0xDB, &[0u8; 5]).unwrap();
        bytes.extend_from_slice(&[0xFF, SOS, 0x00, 0x02, 0xAB, 0xCD, 0xFF, EOI]);
        bytes
    }

    #[test]
    fn test_parse_segments() {
        let bytes = sample();
        let layout = JpegLayout::parse(&bytes).unwrap();
        assert_eq!(layout.segments.len(), 2);
        assert!(layout.segments[0].is_jfif());
        assert_eq!(layout.segments[1].marker, 0xDB);
        assert_eq!(layout.segments[1].payload.len(), 5);
        assert_eq!(layout.scan, &[0xFF, SOS, 0x00, 0x02, 0xAB, 0xCD, 0xFF, EOI]);
        assert!(layout.exif_payload().is_none());
    }

    #[test]
    fn test_fill_bytes_before_marker() {
        let mut bytes = vec![0xFF, SOI, 0xFF, 0xFF];
        bytes.extend_from_slice(&[0xFF, SOS, 0x00, 0x02]);
        let layout = JpegLayout::parse(&bytes).unwrap();
        assert!(layout.segments.is_empty());
        assert_eq!(layout.scan[1], SOS);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(JpegLayout::parse(b"not a jpeg").is_err());
        // EOI before any scan
        assert!(JpegLayout::parse(&[0xFF, SOI, 0xFF, EOI]).is_err());
        // length past end
        assert!(JpegLayout::parse(&[0xFF, SOI, 0xFF, 0xDB, 0x00, 0x40, 0x00]).is_err());
        // no SOS
        let mut bytes = vec![0xFF, SOI];
        write_segment(&mut bytes, APP0, b"JFIF\0").unwrap();
        assert!(JpegLayout::parse(&bytes).is_err());
    }

    #[test]
    fn test_oversized_segment() {
        let mut out = Vec::new();
        let payload = vec![0u8; MAX_SEGMENT_PAYLOAD + 1];
        assert!(write_segment(&mut out, APP1, &payload).is_err());
        assert!(out.is_empty());
        assert!(write_segment(&mut out, APP1, &payload[1..]).is_ok());
    }
}
