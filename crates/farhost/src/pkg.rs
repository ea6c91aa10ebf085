//! Package-manager providers, mirroring the service-manager family: a
//! capability trait, shell-emitting implementations, and first-match
//! detection.

use std::sync::Arc;

use async_trait::async_trait;
use farhost_shell::{cmd_quote, quote};

use crate::Error;
use crate::exec::options::ExecOpts;
use crate::exec::runner::Runner;

#[async_trait]
pub trait PackageManager: Send + Sync {
    fn name(&self) -> &'static str;

    async fn install(&self, runner: &Runner, packages: &[&str]) -> crate::Result<()>;

    async fn remove(&self, runner: &Runner, packages: &[&str]) -> crate::Result<()>;

    /// Refreshes the package index where the manager has one.
    async fn update_index(&self, runner: &Runner) -> crate::Result<()>;
}

fn opts() -> ExecOpts {
    ExecOpts::builder().build()
}

fn quoted_list(packages: &[&str]) -> String {
    packages
        .iter()
        .map(|p| quote(p).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn cmd_quoted_list(packages: &[&str]) -> String {
    packages
        .iter()
        .map(|p| cmd_quote(p).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

struct Apk;

#[async_trait]
impl PackageManager for Apk {
    fn name(&self) -> &'static str {
        "apk"
    }

    async fn install(&self, runner: &Runner, packages: &[&str]) -> crate::Result<()> {
        runner
            .exec(&format!("apk add -- {}", quoted_list(packages)), opts())
            .await
    }

    async fn remove(&self, runner: &Runner, packages: &[&str]) -> crate::Result<()> {
        runner
            .exec(&format!("apk del -- {}", quoted_list(packages)), opts())
            .await
    }

    async fn update_index(&self, runner: &Runner) -> crate::Result<()> {
        runner.exec("apk update", opts()).await
    }
}

struct Apt;

#[async_trait]
impl PackageManager for Apt {
    fn name(&self) -> &'static str {
        "apt"
    }

    async fn install(&self, runner: &Runner, packages: &[&str]) -> crate::Result<()> {
        runner
            .exec(
                &format!(
                    "DEBIAN_FRONTEND=noninteractive apt-get install -y -- {}",
                    quoted_list(packages)
                ),
                opts(),
            )
            .await
    }

    async fn remove(&self, runner: &Runner, packages: &[&str]) -> crate::Result<()> {
        runner
            .exec(
                &format!(
                    "DEBIAN_FRONTEND=noninteractive apt-get remove -y -- {}",
                    quoted_list(packages)
                ),
                opts(),
            )
            .await
    }

    async fn update_index(&self, runner: &Runner) -> crate::Result<()> {
        runner.exec("apt-get update", opts()).await
    }
}

struct Dnf;

#[async_trait]
impl PackageManager for Dnf {
    fn name(&self) -> &'static str {
        "dnf"
    }

    async fn install(&self, runner: &Runner, packages: &[&str]) -> crate::Result<()> {
        runner
            .exec(&format!("dnf install -y -- {}", quoted_list(packages)), opts())
            .await
    }

    async fn remove(&self, runner: &Runner, packages: &[&str]) -> crate::Result<()> {
        runner
            .exec(&format!("dnf remove -y -- {}", quoted_list(packages)), opts())
            .await
    }

    async fn update_index(&self, runner: &Runner) -> crate::Result<()> {
        runner.exec("dnf makecache", opts()).await
    }
}

struct Pacman;

#[async_trait]
impl PackageManager for Pacman {
    fn name(&self) -> &'static str {
        "pacman"
    }

    async fn install(&self, runner: &Runner, packages: &[&str]) -> crate::Result<()> {
        runner
            .exec(
                &format!(
                    "pacman -S --noconfirm --needed -- {}",
                    quoted_list(packages)
                ),
                opts(),
            )
            .await
    }

    async fn remove(&self, runner: &Runner, packages: &[&str]) -> crate::Result<()> {
        runner
            .exec(
                &format!("pacman -R --noconfirm -- {}", quoted_list(packages)),
                opts(),
            )
            .await
    }

    async fn update_index(&self, runner: &Runner) -> crate::Result<()> {
        runner.exec("pacman -Sy", opts()).await
    }
}

struct Choco;

#[async_trait]
impl PackageManager for Choco {
    fn name(&self) -> &'static str {
        "choco"
    }

    async fn install(&self, runner: &Runner, packages: &[&str]) -> crate::Result<()> {
        runner
            .exec(
                &format!("choco install -y {}", cmd_quoted_list(packages)),
                ExecOpts::builder().allow_win_stderr().build(),
            )
            .await
    }

    async fn remove(&self, runner: &Runner, packages: &[&str]) -> crate::Result<()> {
        runner
            .exec(
                &format!("choco uninstall -y {}", cmd_quoted_list(packages)),
                ExecOpts::builder().allow_win_stderr().build(),
            )
            .await
    }

    async fn update_index(&self, _runner: &Runner) -> crate::Result<()> {
        // Chocolatey queries its source on demand; nothing to refresh.
        Ok(())
    }
}

/// Returns an error for every operation; the null implementation handed
/// out when detection failed.
pub(crate) struct NullPackageManager;

#[async_trait]
impl PackageManager for NullPackageManager {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn install(&self, _runner: &Runner, _packages: &[&str]) -> crate::Result<()> {
        Err(Error::NoPackageManager)
    }

    async fn remove(&self, _runner: &Runner, _packages: &[&str]) -> crate::Result<()> {
        Err(Error::NoPackageManager)
    }

    async fn update_index(&self, _runner: &Runner) -> crate::Result<()> {
        Err(Error::NoPackageManager)
    }
}

/// First-match detection over the known package managers.
pub struct PackageManagers;

impl PackageManagers {
    pub async fn detect(runner: &Runner) -> crate::Result<Arc<dyn PackageManager>> {
        if runner.is_windows() {
            if runner
                .exec("choco --version", ExecOpts::builder().allow_win_stderr().build())
                .await
                .is_ok()
            {
                return Ok(Arc::new(Choco));
            }
            return Err(Error::NoPackageManager);
        }
        if runner.exec("command -v apk", opts()).await.is_ok() {
            return Ok(Arc::new(Apk));
        }
        if runner.exec("command -v apt-get", opts()).await.is_ok() {
            return Ok(Arc::new(Apt));
        }
        if runner.exec("command -v dnf", opts()).await.is_ok() {
            return Ok(Arc::new(Dnf));
        }
        if runner.exec("command -v pacman", opts()).await.is_ok() {
            return Ok(Arc::new(Pacman));
        }
        Err(Error::NoPackageManager)
    }
}
