use crate::CacheEntry;
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

pub(crate) async fn read_slice(entry: &CacheEntry, offset: u64, length: u64) -> Result<Vec<u8>> {
    let short = || ErrorKind::ShortRead { url: entry.url.clone(), offset, length, size: entry.size };
    let end = offset.checked_add(length).ok_or_raise(short)?;
    if end > entry.size {
        exn::bail!(short());
    }
    let capacity = usize::try_from(length).or_raise(short)?;
    let io = || ErrorKind::Io(entry.path.clone());

    let mut file = File::open(&entry.path).await.or_raise(io)?;
    file.seek(SeekFrom::Start(offset)).await.or_raise(io)?;
    let mut buffer = vec![0; capacity];
    match file.read_exact(&mut buffer).await {
        Ok(_) => Ok(buffer),
        // The mirror shrank underneath us; only possible if someone edited
        // the cache directory by hand.
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(e).or_raise(short),
        Err(e) => Err(e).or_raise(io),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn entry(dir: &tempfile::TempDir, body: &[u8]) -> CacheEntry {
        let path = dir.path().join("mirror.resource");
        std::fs::write(&path, body).unwrap();
        CacheEntry { url: "https://example.com/r".to_string(), path, size: body.len() as u64 }
    }

    #[rstest]
    #[case(0, 4, b"xxab")]
    #[case(2, 4, b"abcd")]
    #[case(6, 2, b"xx")]
    #[case(7, 1, b"x")]
    #[tokio::test]
    async fn test_read_slice(#[case] offset: u64, #[case] length: u64, #[case] expected: &[u8]) {
        let dir = tempfile::tempdir().unwrap();
        let entry = entry(&dir, b"xxabcdxx");
        assert_eq!(read_slice(&entry, offset, length).await.unwrap(), expected);
    }

    #[rstest]
    #[case(6, 3)]
    #[case(8, 1)]
    #[case(u64::MAX, 2)]
    #[tokio::test]
    async fn test_read_slice_short(#[case] offset: u64, #[case] length: u64) {
        let dir = tempfile::tempdir().unwrap();
        let entry = entry(&dir, b"xxabcdxx");
        let err = read_slice(&entry, offset, length).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ShortRead { size: 8, .. }));
    }
}
