use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use opacify_manifest::InputHash;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::{Path, PathBuf};

/// SHA-256 digest and length of a whole file, computed on a blocking thread.
pub async fn digest_file(path: impl Into<PathBuf>) -> Result<(InputHash, u64)> {
    let path = path.into();
    let task_path = path.clone();
    tokio::task::spawn_blocking(move || digest_file_blocking(&task_path))
        .await
        .or_raise(|| ErrorKind::Input(path))?
}

pub(crate) fn digest_file_blocking(path: &Path) -> Result<(InputHash, u64)> {
    let input = || ErrorKind::Input(path.to_path_buf());
    let mut file = File::open(path).or_raise(input)?;
    let mut hasher = Sha256::new();
    let length = std::io::copy(&mut file, &mut hasher).or_raise(input)?;
    Ok((hasher.into(), length))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_digest_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"abcd").unwrap();
        assert_eq!(digest_file(&path).await.unwrap(), (InputHash::of(b"abcd"), 4));
    }

    #[tokio::test]
    async fn test_digest_missing_file() {
        let err = digest_file("/definitely/not/here").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Input(_)));
    }
}
