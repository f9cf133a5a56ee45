use crate::error::{ErrorKind, Result};
use crate::{PARTIAL_PREFIX, PARTIAL_SUFFIX, ResourceCache};
use exn::ResultExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;

impl ResourceCache {
    /// Stream the body of `url` into a temporary file next to `target`, then
    /// atomically rename it into place. Returns the body size.
    pub(crate) async fn fetch(&self, url: &str, target: &Path) -> Result<u64> {
        let unavailable = |status: Option<u16>| ErrorKind::FetchFailed { url: url.to_string(), status };

        let mut response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url, error = %e, "Resource request failed");
                return Err(e).or_raise(|| unavailable(None));
            },
        };
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url, status = status.as_u16(), "Resource responded with non-success status");
            exn::bail!(unavailable(Some(status.as_u16())));
        }

        let partial = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(&self.root)
            .or_raise(|| ErrorKind::Io(self.root.clone()))?;
        let handle = partial.as_file().try_clone().or_raise(|| ErrorKind::Io(partial.path().to_path_buf()))?;
        let mut file = tokio::fs::File::from_std(handle);

        let mut size: u64 = 0;
        loop {
            // The client timeout also bounds the body; a stall mid-stream ends
            // up here as an error, and the partial file is dropped (deleted).
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(url, received = size, error = %e, "Resource body interrupted");
                    return Err(e).or_raise(|| unavailable(Some(status.as_u16())));
                },
            };
            file.write_all(&chunk).await.or_raise(|| ErrorKind::Io(partial.path().to_path_buf()))?;
            size += chunk.len() as u64;
        }
        file.flush().await.or_raise(|| ErrorKind::Io(partial.path().to_path_buf()))?;
        file.sync_all().await.or_raise(|| ErrorKind::Io(partial.path().to_path_buf()))?;
        drop(file);

        // Rename is atomic within one filesystem, and the temporary file lives
        // in the cache directory itself.
        if let Err(e) = partial.persist(target) {
            if e.error.kind() == std::io::ErrorKind::NotFound {
                // Purged mid-download: nothing was published, so it is a failed fetch.
                tracing::warn!(url, "Partial download removed before it was published");
                return Err(e).or_raise(|| unavailable(Some(status.as_u16())));
            }
            return Err(e).or_raise(|| ErrorKind::Io(target.to_path_buf()));
        }
        Ok(size)
    }
}
