//! Local `.osu` files: validation against the beatmap hash and repair from a mirror.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Provides a `.osu` file whose content matches a beatmap hash.
pub trait AssetProvider: Send + Sync {
    /// Make sure `path` holds the file of `beatmap_id` hashing to `md5`.
    ///
    /// Resolves to whether the file is valid once the call returns.
    fn ensure_valid(
        &self,
        path: PathBuf,
        beatmap_id: i32,
        md5: String,
    ) -> BoxFuture<'static, bool>;
}

/// Failures while checking or repairing a beatmap file.
#[derive(Debug, Error)]
pub enum AssetError {
    /// The HTTP client could not be configured.
    #[error("failed to build HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The local file exists but could not be read.
    #[error("failed to read `{path}`")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The repaired file could not be written or moved into place.
    #[error("failed to write `{path}`")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The mirror could not be reached or the body was cut short.
    #[error("failed to download beatmap {beatmap_id}")]
    Download {
        beatmap_id: i32,
        #[source]
        source: reqwest::Error,
    },
    /// The mirror answered with a non-success status.
    #[error("mirror answered {status} for beatmap {beatmap_id}")]
    Status {
        beatmap_id: i32,
        status: reqwest::StatusCode,
    },
    /// The download exceeded the configured timeout.
    #[error("download of beatmap {beatmap_id} timed out")]
    Timeout { beatmap_id: i32 },
}

/// Hex md5 digest, the format used for beatmap hashes.
pub fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

type PendingCheck = Shared<BoxFuture<'static, bool>>;

/// Filesystem-backed provider downloading missing or outdated files from a mirror.
///
/// Concurrent checks of the same file share one validation, so a file is downloaded and
/// written at most once at a time.
#[derive(Clone)]
pub struct FsAssetProvider {
    client: Client,
    mirror_url: Arc<str>,
    timeout: Duration,
    in_flight: Arc<DashMap<(PathBuf, String), PendingCheck>>,
}

impl FsAssetProvider {
    /// Build a provider downloading from `mirror_url`, e.g. `https://old.ppy.sh/osu`.
    pub fn new(mirror_url: &str, timeout: Duration) -> Result<Self, AssetError> {
        let client = Client::builder()
            .build()
            .map_err(|source| AssetError::ClientBuilder { source })?;

        Ok(Self {
            client,
            mirror_url: Arc::from(mirror_url.trim_end_matches('/')),
            timeout,
            in_flight: Arc::new(DashMap::new()),
        })
    }

    /// Validate `path`, joining a check of the same file and hash already in flight.
    async fn check(&self, path: PathBuf, beatmap_id: i32, md5: String) -> bool {
        let key = (path.clone(), md5.clone());
        let pending = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let provider = self.clone();
                let pending = async move {
                    match provider.ensure(path, beatmap_id, &md5).await {
                        Ok(valid) => valid,
                        Err(err) => {
                            warn!(beatmap_id, error = %err, "could not validate beatmap file");
                            false
                        }
                    }
                }
                .boxed()
                .shared();
                entry.insert(pending.clone());
                pending
            }
        };

        let valid = pending.clone().await;
        self.in_flight
            .remove_if(&key, |_, registered| registered.ptr_eq(&pending));
        valid
    }

    async fn ensure(
        &self,
        path: PathBuf,
        beatmap_id: i32,
        md5: &str,
    ) -> Result<bool, AssetError> {
        match tokio::fs::read(&path).await {
            Ok(bytes) if md5_hex(&bytes) == md5 => return Ok(true),
            Ok(_) => debug!(beatmap_id, path = %path.display(), "local file is outdated"),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(beatmap_id, path = %path.display(), "local file is missing")
            }
            Err(source) => return Err(AssetError::Read { path, source }),
        }

        let bytes = self.download(beatmap_id).await?;
        if md5_hex(&bytes) != md5 {
            debug!(beatmap_id, "mirror file does not match the expected hash");
            return Ok(false);
        }

        write_atomic(&path, &bytes).await?;
        info!(beatmap_id, path = %path.display(), "repaired beatmap file");
        Ok(true)
    }

    async fn download(&self, beatmap_id: i32) -> Result<Vec<u8>, AssetError> {
        let url = format!("{}/{}", self.mirror_url, beatmap_id);
        let request = async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|source| AssetError::Download { beatmap_id, source })?;

            if !response.status().is_success() {
                return Err(AssetError::Status {
                    beatmap_id,
                    status: response.status(),
                });
            }

            response
                .bytes()
                .await
                .map(|body| body.to_vec())
                .map_err(|source| AssetError::Download { beatmap_id, source })
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| AssetError::Timeout { beatmap_id })?
    }
}

/// Write `bytes` next to `path` and rename over it, so readers see the old file or the new one.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AssetError> {
    let write_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| AssetError::Write { path, source }
    };

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(write_error(parent))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!("{file_name}.{:08x}.part", rand::random::<u32>()));

    let written = match tokio::fs::write(&temp, bytes).await {
        Ok(()) => tokio::fs::rename(&temp, path).await,
        Err(err) => Err(err),
    };
    if let Err(source) = written {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(write_error(path)(source));
    }
    Ok(())
}

impl AssetProvider for FsAssetProvider {
    fn ensure_valid(
        &self,
        path: PathBuf,
        beatmap_id: i32,
        md5: String,
    ) -> BoxFuture<'static, bool> {
        let provider = self.clone();
        Box::pin(async move { provider.check(path, beatmap_id, md5).await })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    const CONTENT: &[u8] = b"osu file format v14\n";

    /// Minimal HTTP mirror answering every request with `body`.
    struct Mirror {
        url: String,
        requests: Arc<AtomicUsize>,
    }

    impl Mirror {
        async fn serve(body: &'static [u8], delay: Duration) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let requests = Arc::new(AtomicUsize::new(0));

            let counter = requests.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((mut socket, _)) = listener.accept().await else {
                        return;
                    };
                    let counter = counter.clone();
                    tokio::spawn(async move {
                        let mut request = Vec::new();
                        let mut buf = [0u8; 1024];
                        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => request.extend_from_slice(&buf[..n]),
                            }
                        }
                        counter.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(delay).await;

                        let head = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        );
                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(body).await;
                        let _ = socket.shutdown().await;
                    });
                }
            });

            Self { url, requests }
        }

        fn provider(&self) -> FsAssetProvider {
            FsAssetProvider::new(&self.url, Duration::from_secs(5)).unwrap()
        }

        fn requests(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".part"))
            .collect()
    }

    fn provider() -> FsAssetProvider {
        // Nothing listens on the discard port, so any download attempt fails fast.
        FsAssetProvider::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn md5_is_lowercase_hex() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[tokio::test]
    async fn matching_file_is_valid_without_download() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("75.osu");
        std::fs::write(&path, CONTENT).unwrap();

        assert!(provider().ensure_valid(path, 75, md5_hex(CONTENT)).await);
    }

    #[tokio::test]
    async fn mismatched_file_without_mirror_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("75.osu");
        std::fs::write(&path, b"something else").unwrap();

        assert!(!provider().ensure_valid(path.clone(), 75, md5_hex(CONTENT)).await);
        assert_eq!(std::fs::read(&path).unwrap(), b"something else");
    }

    #[tokio::test]
    async fn missing_file_without_mirror_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("75.osu");

        assert!(!provider().ensure_valid(path.clone(), 75, md5_hex(CONTENT)).await);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn outdated_file_is_repaired_from_mirror() {
        let mirror = Mirror::serve(CONTENT, Duration::ZERO).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maps").join("75.osu");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"stale revision").unwrap();

        assert!(mirror.provider().ensure_valid(path.clone(), 75, md5_hex(CONTENT)).await);
        assert_eq!(std::fs::read(&path).unwrap(), CONTENT);
        assert_eq!(mirror.requests(), 1);
        assert!(leftovers(path.parent().unwrap()).is_empty());
    }

    #[tokio::test]
    async fn mirror_body_with_wrong_hash_keeps_existing_file() {
        let mirror = Mirror::serve(b"another revision", Duration::ZERO).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("75.osu");
        std::fs::write(&path, b"stale revision").unwrap();

        assert!(!mirror.provider().ensure_valid(path.clone(), 75, md5_hex(CONTENT)).await);
        assert_eq!(std::fs::read(&path).unwrap(), b"stale revision");
        assert!(leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn concurrent_checks_download_once() {
        let mirror = Mirror::serve(CONTENT, Duration::from_millis(100)).await;
        let provider = mirror.provider();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("75.osu");

        let checks = (0..8).map(|_| provider.ensure_valid(path.clone(), 75, md5_hex(CONTENT)));
        let results = futures::future::join_all(checks).await;

        assert!(results.into_iter().all(|valid| valid));
        assert_eq!(mirror.requests(), 1);
        assert_eq!(std::fs::read(&path).unwrap(), CONTENT);
        assert!(provider.in_flight.is_empty());
        assert!(leftovers(dir.path()).is_empty());
    }
}
