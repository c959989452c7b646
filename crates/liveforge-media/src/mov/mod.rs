//! QuickTime movie writing.
//!
//! Builds the movie side of a live photo: the source video track copied
//! sample by sample, an asset-level content identifier and a timed
//! still-image-time marker on a metadata track.

pub mod boxes;
pub mod metadata;
mod muxer;
pub mod reader;
pub mod writer;

pub use metadata::{MetadataItem, TimedMetadataGroup, CONTENT_IDENTIFIER_KEY, STILL_IMAGE_TIME_KEY};
pub use muxer::write_with_identifier;
pub use reader::{
    read_live_metadata, LiveMovieMetadata, MetadataTrackInfo, MovieReader, SampleBuffer,
    TimedMetadataSample, VideoTrackFormat,
};
pub use writer::MovieWriter;
