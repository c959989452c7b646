//! Remux a movie's video track into a live photo movie.
//!
//! A demux thread copies samples out of the source in decode order and
//! hands them to a single mux worker over a bounded channel, so a slow
//! disk on the writing side throttles reading. The worker appends the
//! pairing marker first, then every video sample unchanged, and finally
//! reports through a oneshot channel the caller blocks on.

use std::io;
use std::path::Path;
use std::thread;

use liveforge_common::{Error, FileAsset, MuxerConfig, Result};
use tokio::sync::{mpsc, oneshot};

use super::metadata::{pairing_marker, MetadataItem};
use super::reader::{MovieReader, SampleBuffer};
use super::writer::MovieWriter;

/// How the mux loop ended badly.
#[derive(Debug)]
enum MuxFailure {
    Read(io::Error),
    Write(io::Error),
}

impl From<MuxFailure> for Error {
    fn from(failure: MuxFailure) -> Self {
        match failure {
            MuxFailure::Read(e) => Error::Io { source: e },
            MuxFailure::Write(e) => Error::writer(e),
        }
    }
}

/// Write `destination` as a copy of `source`'s first video track tagged with
/// `destination`'s identifier.
///
/// Blocks the calling thread until the output is finalized. Audio and any
/// other tracks are dropped. A source without a video track fails with
/// [`Error::InvalidFile`] before the destination is created. On a writer
/// failure the partially written destination is left in place and must not
/// be used.
pub fn write_with_identifier(
    source: &Path,
    destination: &FileAsset,
    config: &MuxerConfig,
) -> Result<()> {
    let mut reader = MovieReader::open(source)?;
    let sample_count = reader.sample_count();

    let writer = MovieWriter::create(
        destination.path(),
        reader.format().clone(),
        vec![MetadataItem::content_identifier(destination.identifier())],
        vec![MetadataItem::StillImageTime(0)],
    )
    .map_err(|_| Error::invalid_file_path(destination.path()))?;

    tracing::info!(
        "Muxing {} -> {} ({sample_count} video samples)",
        source.display(),
        destination.path().display()
    );

    let capacity = config.channel_capacity.max(1);
    let (sample_tx, sample_rx) = mpsc::channel::<io::Result<SampleBuffer>>(capacity);
    let (done_tx, done_rx) = oneshot::channel::<std::result::Result<(), MuxFailure>>();

    let demux = thread::Builder::new()
        .name("liveforge-demux".into())
        .spawn(move || {
            loop {
                let item = match reader.next_sample() {
                    Ok(Some(sample)) => Ok(sample),
                    Ok(None) => break,
                    Err(e) => Err(e),
                };
                let failed = item.is_err();
                // Send fails once the worker has stopped listening.
                if sample_tx.blocking_send(item).is_err() || failed {
                    break;
                }
            }
        })?;

    let worker = thread::Builder::new()
        .name("liveforge-mux".into())
        .spawn(move || {
            let outcome = run_mux_loop(writer, sample_rx);
            // The caller may have gone away; nothing left to tell then.
            let _ = done_tx.send(outcome);
        })?;

    let outcome = done_rx
        .blocking_recv()
        .map_err(|_| Error::Internal("mux worker exited without reporting".into()))?;

    if worker.join().is_err() {
        return Err(Error::Internal("mux worker panicked".into()));
    }
    if demux.join().is_err() {
        return Err(Error::Internal("demux thread panicked".into()));
    }

    match outcome {
        Ok(()) => {
            tracing::info!("Muxed {}", destination.path().display());
            Ok(())
        }
        Err(failure) => {
            tracing::warn!("Muxing {} failed: {failure:?}", destination.path().display());
            Err(failure.into())
        }
    }
}

/// Append the pairing marker and then every received sample.
///
/// Any failure stops the loop; the writer is finalized either way and the
/// first failure wins.
fn run_mux_loop(
    mut writer: MovieWriter,
    mut samples: mpsc::Receiver<io::Result<SampleBuffer>>,
) -> std::result::Result<(), MuxFailure> {
    let mut failure = writer.append_metadata(&pairing_marker()).err().map(MuxFailure::Write);

    while failure.is_none() {
        let Some(item) = samples.blocking_recv() else {
            break;
        };
        failure = match item {
            Ok(sample) => writer.append_video(&sample).err().map(MuxFailure::Write),
            Err(e) => Some(MuxFailure::Read(e)),
        };
    }

    // Unblocks the demux thread if it is waiting on a full channel.
    drop(samples);
    writer.mark_video_finished();
    let finished = writer.finish().map_err(MuxFailure::Write);

    match failure {
        Some(failure) => Err(failure),
        None => finished,
    }
}
