//! Manifest writing off the async runtime.
//!
//! The manifest writer (and whatever compressor sits under it) is blocking,
//! so it lives on a blocking thread and the engine sends it records over a
//! bounded channel.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use opacify_manifest::{Compression, Header, ManifestWriter, MatchEntry};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug)]
enum Record {
    Entry(MatchEntry),
    Header(Header),
}

/// What a finished sink wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Written {
    pub entries: u64,
    pub covered: u64,
}

pub(crate) struct ManifestSink {
    path: PathBuf,
    sender: mpsc::Sender<Record>,
    task: JoinHandle<Result<Option<Written>>>,
}

impl ManifestSink {
    /// Start writing a manifest into `file`. `path` names it in errors.
    pub(crate) fn spawn(file: File, path: PathBuf, compression: Compression) -> Self {
        let (sender, mut receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let task_path = path.clone();
        let task = tokio::task::spawn_blocking(move || -> Result<Option<Written>> {
            let mut writer = ManifestWriter::new(BufWriter::new(file), compression).map_err(ErrorKind::manifest)?;
            while let Some(record) = receiver.blocking_recv() {
                match record {
                    Record::Entry(entry) => writer.write_entry(&entry).map_err(ErrorKind::manifest)?,
                    Record::Header(header) => {
                        let written = Written { entries: writer.entries(), covered: writer.covered() };
                        let file = writer.write_header(&header).map_err(ErrorKind::manifest)?;
                        file.get_ref().sync_all().or_raise(|| ErrorKind::Output(task_path.clone()))?;
                        return Ok(Some(written));
                    },
                }
            }
            // Abandoned: the sender went away without a header.
            Ok(None)
        });
        Self { path, sender, task }
    }

    pub(crate) async fn push(&self, entry: MatchEntry) -> Result<()> {
        self.sender.send(Record::Entry(entry)).await.or_raise(|| ErrorKind::Output(self.path.clone()))
    }

    /// Write the header and wait until the manifest is on disk.
    pub(crate) async fn finish(self, header: Header) -> Result<Written> {
        let Self { path, sender, task } = self;
        // A closed channel means the writer already stopped; its own error
        // is the one worth reporting.
        let sent = sender.send(Record::Header(header)).await.is_ok();
        drop(sender);
        let written = task.await.or_raise(|| ErrorKind::Output(path.clone()))??;
        match written {
            Some(written) if sent => Ok(written),
            _ => exn::bail!(ErrorKind::Output(path)),
        }
    }

    /// Stop without a header. Returns the writer's own error, if it hit one.
    pub(crate) async fn abandon(self) -> Result<()> {
        let Self { path, sender, task } = self;
        drop(sender);
        task.await.or_raise(|| ErrorKind::Output(path.clone()))?.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opacify_manifest::InputHash;

    #[tokio::test]
    async fn test_finish_writes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m");
        let sink = ManifestSink::spawn(File::create(&path).unwrap(), path.clone(), Compression::None);
        sink.push(MatchEntry::new("https://a.test/x", 2, 4)).await.unwrap();
        sink.push(MatchEntry::new("https://a.test/y", 9, 3)).await.unwrap();
        let header = Header::new(InputHash::of(b"abcdefg"), 7);
        let written = sink.finish(header).await.unwrap();

        assert_eq!(written, Written { entries: 2, covered: 7 });
        assert_eq!(opacify_manifest::read_header(&path).unwrap(), header);
    }

    #[tokio::test]
    async fn test_abandon_leaves_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m");
        let sink = ManifestSink::spawn(File::create(&path).unwrap(), path.clone(), Compression::None);
        sink.push(MatchEntry::new("https://a.test/x", 2, 4)).await.unwrap();
        sink.abandon().await.unwrap();
        assert!(opacify_manifest::read_header(&path).is_err());
    }

    #[tokio::test]
    async fn test_writer_error_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m");
        let sink = ManifestSink::spawn(File::create(&path).unwrap(), path.clone(), Compression::None);
        // Invalid entries are refused by the manifest writer, which stops.
        sink.push(MatchEntry::new("https://a.test/has space", 2, 4)).await.unwrap();
        let err = sink.abandon().await.unwrap_err();
        assert_eq!(*err, ErrorKind::Manifest);
    }
}
