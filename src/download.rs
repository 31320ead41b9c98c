use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8Path;

use crate::error::CatalogError;
use crate::fs_util::{persist, temp_file_beside};
use crate::wiki::WikiClient;

/// Enforces a minimum gap between successive outbound requests.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn pace(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                thread::sleep(self.interval - elapsed);
            }
        }
        self.last = Some(Instant::now());
    }

    /// Paces, runs `request`, then restarts the interval from its completion so a
    /// slow request still leaves a full gap before the next one.
    pub fn run<T>(&mut self, request: impl FnOnce() -> T) -> T {
        self.pace();
        let output = request();
        self.last = Some(Instant::now());
        output
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    AlreadyPresent,
    Downloaded { bytes: u64 },
}

pub fn is_present(destination: &Utf8Path) -> bool {
    destination.as_std_path().exists()
}

pub struct AssetDownloader<'a, W: WikiClient + ?Sized> {
    client: &'a W,
}

impl<'a, W: WikiClient + ?Sized> AssetDownloader<'a, W> {
    pub fn new(client: &'a W) -> Self {
        Self { client }
    }

    /// Downloads `url` to `destination` unless it already exists.
    ///
    /// The body lands in a temporary file next to the destination and is only
    /// renamed into place once fully written; on failure the temporary file is
    /// removed when dropped.
    pub fn fetch(
        &self,
        url: &str,
        destination: &Utf8Path,
    ) -> Result<DownloadOutcome, CatalogError> {
        if is_present(destination) {
            tracing::info!(path = %destination, "image already exists, skipping download");
            return Ok(DownloadOutcome::AlreadyPresent);
        }

        let mut temp = temp_file_beside(destination)?;
        let bytes = self.client.download(url, temp.as_file_mut())?;
        if bytes == 0 {
            return Err(CatalogError::WikiHttp(format!(
                "empty response body from {url}"
            )));
        }
        temp.as_file_mut()
            .sync_all()
            .map_err(|err| CatalogError::Filesystem(format!("sync {destination}: {err}")))?;
        persist(temp, destination)?;

        tracing::info!(path = %destination, url, bytes, "downloaded image");
        Ok(DownloadOutcome::Downloaded { bytes })
    }
}
