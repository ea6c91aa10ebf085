//! The host facade: one connected target with its runner and lazy
//! services (sudo, filesystem, OS release, service manager, package
//! manager).

use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use farhost_transport::Transport;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use crate::Error;
use crate::exec::runner::Runner;
use crate::fs::flags::OpenFlags;
use crate::fs::posix::PosixFs;
use crate::fs::windows::WinFs;
use crate::fs::RemoteFs;
use crate::os::OsRelease;
use crate::pkg::{NullPackageManager, PackageManager, PackageManagers};
use crate::service::{NullServiceManager, ServiceManager, ServiceManagers};
use crate::sudo::SudoProviders;

struct Inner {
    transport: Arc<dyn Transport>,
    runner: Runner,
    sudo_runner: OnceCell<Runner>,
    fs: OnceLock<Arc<dyn RemoteFs>>,
    os_release: OnceCell<OsRelease>,
    service_manager: OnceCell<Arc<dyn ServiceManager>>,
    package_manager: OnceCell<Arc<dyn PackageManager>>,
}

/// A connected host. Cheap to clone; all services are probed once and
/// cached. Probe failures cache a null implementation that surfaces the
/// failure on use, so accessors never block callers with an error they
/// cannot act on yet.
#[derive(Clone)]
pub struct Host {
    inner: Arc<Inner>,
}

impl Host {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let runner = Runner::new(transport.clone());
        Self {
            inner: Arc::new(Inner {
                transport,
                runner,
                sudo_runner: OnceCell::new(),
                fs: OnceLock::new(),
                os_release: OnceCell::new(),
                service_manager: OnceCell::new(),
                package_manager: OnceCell::new(),
            }),
        }
    }

    pub fn runner(&self) -> &Runner {
        &self.inner.runner
    }

    pub fn is_windows(&self) -> bool {
        self.inner.transport.is_windows()
    }

    pub fn describe(&self) -> String {
        self.inner.transport.describe()
    }

    /// A runner wrapping every command in the host's privilege-escalation
    /// method. Probed on first use; when no method works, the returned
    /// runner fails each dispatch with the probe error.
    pub async fn sudo_runner(&self) -> Runner {
        self.inner
            .sudo_runner
            .get_or_init(|| async {
                match SudoProviders::default().resolve(&self.inner.runner).await {
                    Ok(decorator) => self.inner.runner.with_decorator(decorator),
                    Err(err) => {
                        log::debug!("[{}] sudo probe failed: {err}", self.describe());
                        Runner::poisoned(self.inner.transport.clone(), Arc::new(err))
                    }
                }
            })
            .await
            .clone()
    }

    /// The filesystem matching the remote OS family.
    pub fn fs(&self) -> Arc<dyn RemoteFs> {
        self.inner
            .fs
            .get_or_init(|| {
                if self.is_windows() {
                    Arc::new(WinFs::new(self.inner.runner.clone()))
                } else {
                    Arc::new(PosixFs::new(self.inner.runner.clone()))
                }
            })
            .clone()
    }

    pub async fn os_release(&self) -> crate::Result<OsRelease> {
        self.inner
            .os_release
            .get_or_try_init(|| async { OsRelease::detect(&self.inner.runner).await })
            .await
            .cloned()
    }

    /// The detected service manager; a null implementation failing with
    /// [`Error::NoInitSystem`] when detection found none.
    pub async fn service_manager(&self) -> Arc<dyn ServiceManager> {
        self.inner
            .service_manager
            .get_or_init(|| async {
                match ServiceManagers::detect(&self.inner.runner).await {
                    Ok(manager) => {
                        log::debug!(
                            "[{}] selected service manager {}",
                            self.describe(),
                            manager.name()
                        );
                        manager
                    }
                    Err(err) => {
                        log::debug!("[{}] service manager probe failed: {err}", self.describe());
                        Arc::new(NullServiceManager)
                    }
                }
            })
            .await
            .clone()
    }

    /// The detected package manager; a null implementation failing with
    /// [`Error::NoPackageManager`] when detection found none.
    pub async fn package_manager(&self) -> Arc<dyn PackageManager> {
        self.inner
            .package_manager
            .get_or_init(|| async {
                match PackageManagers::detect(&self.inner.runner).await {
                    Ok(manager) => {
                        log::debug!(
                            "[{}] selected package manager {}",
                            self.describe(),
                            manager.name()
                        );
                        manager
                    }
                    Err(err) => {
                        log::debug!("[{}] package manager probe failed: {err}", self.describe());
                        Arc::new(NullPackageManager)
                    }
                }
            })
            .await
            .clone()
    }

    /// Uploads a local file, then verifies the remote SHA-256 against the
    /// digest computed while streaming. A mismatch is fatal; there is no
    /// retry at this level.
    pub async fn upload(
        &self,
        local: impl AsRef<Path>,
        remote: &str,
        perm: u32,
    ) -> crate::Result<u64> {
        let local = local.as_ref();
        let file = std::fs::File::open(local)
            .map_err(|e| Error::op("upload", local.display().to_string(), e.into()))?;
        let reader = DigestReader::new(file);
        let digest = reader.digest_handle();

        let fs = self.fs();
        let mut remote_file = fs
            .open_file(
                remote,
                OpenFlags::WRITE_ONLY | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                perm,
            )
            .await?;
        let written = remote_file.copy_from(Box::new(reader)).await?;
        remote_file.close().await?;

        let expected = {
            let hasher = digest.lock().expect("digest mutex poisoned").clone();
            hex(&hasher.finalize())
        };
        let actual = fs.sha256(remote).await?;
        if expected != actual {
            return Err(Error::ChecksumMismatch {
                path: remote.to_string(),
                expected,
                actual,
            });
        }
        log::debug!(
            "[{}] uploaded {} to {remote} ({written} bytes)",
            self.describe(),
            local.display()
        );
        Ok(written)
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("transport", &self.describe())
            .finish()
    }
}

/// Hashes everything read through it; the digest handle survives the
/// reader moving into the transfer machinery.
struct DigestReader<R: Read> {
    inner: R,
    hasher: Arc<Mutex<Sha256>>,
}

impl<R: Read> DigestReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Arc::new(Mutex::new(Sha256::new())),
        }
    }

    fn digest_handle(&self) -> Arc<Mutex<Sha256>> {
        self.hasher.clone()
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.hasher
                .lock()
                .map_err(|_| std::io::Error::other("digest mutex poisoned"))?
                .update(&buf[..n]);
        }
        Ok(n)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
