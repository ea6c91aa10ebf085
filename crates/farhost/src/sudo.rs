//! Privilege-escalation providers.
//!
//! An ordered registry of factories probes the host and returns the first
//! accepted command decorator: a no-op when the session is already
//! privileged, or a `sudo`/`doas` wrapper otherwise. Probing runs real
//! commands, so services cache the first acceptance.

use std::sync::Arc;

use async_trait::async_trait;

use crate::Error;
use crate::exec::decorate::{Decorator, NoopDecorator, SudoDecorator};
use crate::exec::options::ExecOpts;
use crate::exec::runner::Runner;

/// A factory that inspects a probe runner and either returns a decorator
/// or declines.
#[async_trait]
pub trait SudoProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn probe(&self, runner: &Runner) -> Option<Arc<dyn Decorator>>;
}

fn probe_opts() -> ExecOpts {
    ExecOpts::builder().build()
}

/// Accepts on non-Windows hosts already running as uid 0.
struct Uid0;

#[async_trait]
impl SudoProvider for Uid0 {
    fn name(&self) -> &'static str {
        "uid0-noop"
    }

    async fn probe(&self, runner: &Runner) -> Option<Arc<dyn Decorator>> {
        if runner.is_windows() {
            return None;
        }
        runner
            .exec("[ \"$(id -u)\" = 0 ]", probe_opts())
            .await
            .ok()
            .map(|_| Arc::new(NoopDecorator) as Arc<dyn Decorator>)
    }
}

/// Accepts on Windows when the session is already elevated: the current
/// user is the built-in Administrator, or is in the Administrators group
/// while UAC (`EnableLUA`) is disabled.
struct WindowsNoop;

#[async_trait]
impl SudoProvider for WindowsNoop {
    fn name(&self) -> &'static str {
        "windows-noop"
    }

    async fn probe(&self, runner: &Runner) -> Option<Arc<dyn Decorator>> {
        if !runner.is_windows() {
            return None;
        }
        let whoami = runner
            .exec_output("whoami.exe", probe_opts())
            .await
            .ok()?;
        if whoami.to_lowercase().ends_with("administrator") {
            return Some(Arc::new(NoopDecorator));
        }

        let in_admins = runner
            .exec_output(
                "[Security.Principal.WindowsIdentity]::GetCurrent().Groups.Value -contains 'S-1-5-32-544'",
                ExecOpts::builder().ps().build(),
            )
            .await
            .ok()?;
        if !in_admins.trim().eq_ignore_ascii_case("true") {
            return None;
        }
        let lua = runner
            .exec_output(
                "(Get-ItemProperty -Path 'HKLM:\\SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Policies\\System' -Name EnableLUA).EnableLUA",
                ExecOpts::builder().ps().build(),
            )
            .await
            .ok()?;
        if lua.trim() == "0" {
            Some(Arc::new(NoopDecorator))
        } else {
            None
        }
    }
}

/// Accepts when passwordless `sudo` works.
struct Sudo;

#[async_trait]
impl SudoProvider for Sudo {
    fn name(&self) -> &'static str {
        "sudo"
    }

    async fn probe(&self, runner: &Runner) -> Option<Arc<dyn Decorator>> {
        if runner.is_windows() {
            return None;
        }
        let decorator = SudoDecorator::sudo();
        runner
            .exec(&decorator.probe_command(), probe_opts())
            .await
            .ok()
            .map(|_| Arc::new(decorator) as Arc<dyn Decorator>)
    }
}

/// Accepts when passwordless `doas` works.
struct Doas;

#[async_trait]
impl SudoProvider for Doas {
    fn name(&self) -> &'static str {
        "doas"
    }

    async fn probe(&self, runner: &Runner) -> Option<Arc<dyn Decorator>> {
        if runner.is_windows() {
            return None;
        }
        let decorator = SudoDecorator::doas();
        runner
            .exec(&decorator.probe_command(), probe_opts())
            .await
            .ok()
            .map(|_| Arc::new(decorator) as Arc<dyn Decorator>)
    }
}

/// The ordered provider registry. First acceptance wins.
pub struct SudoProviders {
    providers: Vec<Arc<dyn SudoProvider>>,
}

impl Default for SudoProviders {
    fn default() -> Self {
        Self {
            providers: vec![
                Arc::new(Uid0),
                Arc::new(WindowsNoop),
                Arc::new(Sudo),
                Arc::new(Doas),
            ],
        }
    }
}

impl SudoProviders {
    pub fn new(providers: Vec<Arc<dyn SudoProvider>>) -> Self {
        Self { providers }
    }

    pub fn push(&mut self, provider: Arc<dyn SudoProvider>) {
        self.providers.push(provider);
    }

    /// Probes each provider in order; [`Error::NoSudo`] when none accept.
    pub async fn resolve(&self, runner: &Runner) -> crate::Result<Arc<dyn Decorator>> {
        for provider in &self.providers {
            if let Some(decorator) = provider.probe(runner).await {
                log::debug!(
                    "[{}] selected sudo provider {}",
                    runner.describe(),
                    provider.name()
                );
                return Ok(decorator);
            }
        }
        Err(Error::NoSudo)
    }
}
