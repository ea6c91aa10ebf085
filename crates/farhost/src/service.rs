//! Service-manager providers: thin families of shell-emitting
//! implementations behind a common capability trait, selected by a
//! first-match registry over a probe runner.

use std::sync::Arc;

use async_trait::async_trait;
use farhost_shell::{cmd_quote, quote};

use crate::Error;
use crate::exec::options::ExecOpts;
use crate::exec::runner::Runner;

#[async_trait]
pub trait ServiceManager: Send + Sync {
    fn name(&self) -> &'static str;

    async fn start_service(&self, runner: &Runner, service: &str) -> crate::Result<()>;

    async fn stop_service(&self, runner: &Runner, service: &str) -> crate::Result<()>;

    async fn restart_service(&self, runner: &Runner, service: &str) -> crate::Result<()>;

    async fn enable_service(&self, runner: &Runner, service: &str) -> crate::Result<()>;

    async fn disable_service(&self, runner: &Runner, service: &str) -> crate::Result<()>;

    async fn service_is_running(&self, runner: &Runner, service: &str) -> bool;

    /// Reloads manager state where the manager has such a concept; a
    /// no-op elsewhere.
    async fn daemon_reload(&self, runner: &Runner) -> crate::Result<()>;
}

fn opts() -> ExecOpts {
    ExecOpts::builder().build()
}

struct Systemd;

#[async_trait]
impl ServiceManager for Systemd {
    fn name(&self) -> &'static str {
        "systemd"
    }

    async fn start_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(&format!("systemctl start {}", quote(service)), opts())
            .await
    }

    async fn stop_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(&format!("systemctl stop {}", quote(service)), opts())
            .await
    }

    async fn restart_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(&format!("systemctl restart {}", quote(service)), opts())
            .await
    }

    async fn enable_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(&format!("systemctl enable {}", quote(service)), opts())
            .await
    }

    async fn disable_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(&format!("systemctl disable {}", quote(service)), opts())
            .await
    }

    async fn service_is_running(&self, runner: &Runner, service: &str) -> bool {
        runner
            .exec(
                &format!("systemctl is-active --quiet {}", quote(service)),
                opts(),
            )
            .await
            .is_ok()
    }

    async fn daemon_reload(&self, runner: &Runner) -> crate::Result<()> {
        runner.exec("systemctl daemon-reload", opts()).await
    }
}

struct OpenRc;

#[async_trait]
impl ServiceManager for OpenRc {
    fn name(&self) -> &'static str {
        "openrc"
    }

    async fn start_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(&format!("rc-service {} start", quote(service)), opts())
            .await
    }

    async fn stop_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(&format!("rc-service {} stop", quote(service)), opts())
            .await
    }

    async fn restart_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(&format!("rc-service {} restart", quote(service)), opts())
            .await
    }

    async fn enable_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(&format!("rc-update add {} default", quote(service)), opts())
            .await
    }

    async fn disable_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(&format!("rc-update del {} default", quote(service)), opts())
            .await
    }

    async fn service_is_running(&self, runner: &Runner, service: &str) -> bool {
        runner
            .exec(
                &format!("rc-service {} status >/dev/null 2>&1", quote(service)),
                opts(),
            )
            .await
            .is_ok()
    }

    async fn daemon_reload(&self, _runner: &Runner) -> crate::Result<()> {
        Ok(())
    }
}

struct SysVinit;

#[async_trait]
impl ServiceManager for SysVinit {
    fn name(&self) -> &'static str {
        "sysvinit"
    }

    async fn start_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(&format!("service {} start", quote(service)), opts())
            .await
    }

    async fn stop_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(&format!("service {} stop", quote(service)), opts())
            .await
    }

    async fn restart_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(&format!("service {} restart", quote(service)), opts())
            .await
    }

    async fn enable_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(
                &format!("update-rc.d {} defaults || chkconfig {} on", quote(service), quote(service)),
                opts(),
            )
            .await
    }

    async fn disable_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(
                &format!("update-rc.d {} remove || chkconfig {} off", quote(service), quote(service)),
                opts(),
            )
            .await
    }

    async fn service_is_running(&self, runner: &Runner, service: &str) -> bool {
        runner
            .exec(
                &format!("service {} status >/dev/null 2>&1", quote(service)),
                opts(),
            )
            .await
            .is_ok()
    }

    async fn daemon_reload(&self, _runner: &Runner) -> crate::Result<()> {
        Ok(())
    }
}

/// The Windows service control manager, driven through `sc.exe`.
struct WindowsScm;

#[async_trait]
impl ServiceManager for WindowsScm {
    fn name(&self) -> &'static str {
        "windows-scm"
    }

    async fn start_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(&format!("sc.exe start {}", cmd_quote(service)), opts())
            .await
    }

    async fn stop_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(&format!("sc.exe stop {}", cmd_quote(service)), opts())
            .await
    }

    async fn restart_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        self.stop_service(runner, service).await.ok();
        self.start_service(runner, service).await
    }

    async fn enable_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(
                &format!("sc.exe config {} start= auto", cmd_quote(service)),
                opts(),
            )
            .await
    }

    async fn disable_service(&self, runner: &Runner, service: &str) -> crate::Result<()> {
        runner
            .exec(
                &format!("sc.exe config {} start= disabled", cmd_quote(service)),
                opts(),
            )
            .await
    }

    async fn service_is_running(&self, runner: &Runner, service: &str) -> bool {
        runner
            .exec(
                &format!("sc.exe query {} | findstr RUNNING", cmd_quote(service)),
                ExecOpts::builder().allow_win_stderr().build(),
            )
            .await
            .is_ok()
    }

    async fn daemon_reload(&self, _runner: &Runner) -> crate::Result<()> {
        Ok(())
    }
}

/// Returns an error for every operation, carrying the probe failure.
/// Handed out so service accessors can return a manager unconditionally.
pub(crate) struct NullServiceManager;

#[async_trait]
impl ServiceManager for NullServiceManager {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn start_service(&self, _runner: &Runner, _service: &str) -> crate::Result<()> {
        Err(Error::NoInitSystem)
    }

    async fn stop_service(&self, _runner: &Runner, _service: &str) -> crate::Result<()> {
        Err(Error::NoInitSystem)
    }

    async fn restart_service(&self, _runner: &Runner, _service: &str) -> crate::Result<()> {
        Err(Error::NoInitSystem)
    }

    async fn enable_service(&self, _runner: &Runner, _service: &str) -> crate::Result<()> {
        Err(Error::NoInitSystem)
    }

    async fn disable_service(&self, _runner: &Runner, _service: &str) -> crate::Result<()> {
        Err(Error::NoInitSystem)
    }

    async fn service_is_running(&self, _runner: &Runner, _service: &str) -> bool {
        false
    }

    async fn daemon_reload(&self, _runner: &Runner) -> crate::Result<()> {
        Err(Error::NoInitSystem)
    }
}

/// First-match detection over the known service managers.
pub struct ServiceManagers;

impl ServiceManagers {
    pub async fn detect(runner: &Runner) -> crate::Result<Arc<dyn ServiceManager>> {
        if runner.is_windows() {
            return Ok(Arc::new(WindowsScm));
        }
        if runner
            .exec("command -v systemctl && test -d /run/systemd/system", opts())
            .await
            .is_ok()
        {
            return Ok(Arc::new(Systemd));
        }
        if runner.exec("command -v rc-service", opts()).await.is_ok() {
            return Ok(Arc::new(OpenRc));
        }
        if runner
            .exec("test -d /etc/init.d && command -v service", opts())
            .await
            .is_ok()
        {
            return Ok(Arc::new(SysVinit));
        }
        Err(Error::NoInitSystem)
    }
}
