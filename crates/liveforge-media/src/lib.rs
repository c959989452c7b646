//! Liveforge-Media: JPEG metadata injection and QuickTime remuxing
//!
//! This crate writes the two halves of a live photo. Both are plain
//! byte-level rewrites: nothing is decoded or re-encoded.
//!
//! # Modules
//!
//! - `jpeg` - Marker segment parsing, EXIF rewriting, Apple maker note
//! - `mp4` - QuickTime/ISO-BMFF `moov` parsing (tracks, sample tables, metadata)
//! - `mov` - QuickTime writing: video track copy, metadata track, muxer
//!
//! # Architecture
//!
//! A live photo is a JPEG and a MOV that share a content identifier:
//!
//! 1. The JPEG gets an Apple maker note (entry 17 = identifier) and
//!    `ExifVersion` 0221; the scan data is copied verbatim
//! 2. The MOV gets the first video track of the source, sample for sample,
//!    plus `com.apple.quicktime.content.identifier` in `moov/meta`
//! 3. A `mebx` metadata track carries one
//!    `com.apple.quicktime.still-image-time` sample describing the video track

pub mod jpeg;
pub mod mov;
pub mod mp4;

pub use mov::{read_live_metadata, LiveMovieMetadata, MovieReader, MovieWriter};
pub use mp4::{parse_movie, EditListEntry, MovieInfo, TrackInfo};
