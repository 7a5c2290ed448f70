//! Running commands inside a sandbox root
//!
//! [Sandbox] ties a [RootfsManager] to a [SandboxRunner], so the root can
//! be installed on first use. Use [SandboxRunner] directly for a root that's
//! known to be installed already.

mod backend;
mod git;
mod invocation;
mod runner;

pub use backend::{Backend, Bind, LaunchSpec, ProotBackend, StdioMode, SYSTEM_BINDS};
pub use git::{clone_invocation, repo_name, ENSURE_GIT};
pub use invocation::{Command, CommandInvocation, DEFAULT_WORKING_DIR};
pub use runner::{ExitStatus, Output, SandboxRunner, DEFAULT_SHELL};

use crate::{
    arch::Architecture,
    download::ClientBuilder,
    errors::{RuntimeError, SetupError},
    rootfs::{InstallOutcome, InstallRecord, InstallState, RootfsManager, SandboxRoot},
    sources::Sources,
    storage::ContentDigest,
};
use std::{
    env,
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

/// Root directory used when none is configured, relative to the current
/// directory
pub const DEFAULT_ROOT_DIR: &str = "rootfs";

/// When a [Sandbox] may install its root on its own
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InstallPolicy {
    /// install once, the first time a command needs the root
    Lazy,
    /// fail with [RuntimeError::SandboxNotInstalled] until
    /// [Sandbox::install()] has been called
    Required,
}

impl Default for InstallPolicy {
    fn default() -> Self {
        InstallPolicy::Lazy
    }
}

/// Setup for a [Sandbox], starting at [Sandbox::builder()] and ending with
/// [SandboxBuilder::build()]
#[derive(Debug)]
pub struct SandboxBuilder {
    root: PathBuf,
    arch: Option<Architecture>,
    sources: Sources,
    client: ClientBuilder,
    backend: Option<Arc<dyn Backend>>,
    shell: OsString,
    policy: InstallPolicy,
}

impl Default for SandboxBuilder {
    fn default() -> Self {
        SandboxBuilder {
            root: PathBuf::from(DEFAULT_ROOT_DIR),
            arch: None,
            sources: Sources::new(),
            client: ClientBuilder::new(),
            backend: None,
            shell: OsString::from(DEFAULT_SHELL),
            policy: InstallPolicy::default(),
        }
    }
}

impl SandboxBuilder {
    /// Directory that becomes the sandbox's `/`
    ///
    /// Relative paths are resolved against the current directory when the
    /// sandbox is built.
    pub fn root_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.root = dir.as_ref().to_path_buf();
        self
    }

    /// Use this architecture instead of detecting it
    pub fn arch(mut self, arch: Architecture) -> Self {
        self.arch = Some(arch);
        self
    }

    /// Replace all download sources at once
    pub fn sources(mut self, sources: Sources) -> Self {
        self.sources = sources;
        self
    }

    /// URL template for the engine executable
    pub fn engine_url(mut self, template: &str) -> Self {
        self.sources.engine_url = template.to_owned();
        self
    }

    /// URL template for the base filesystem archive
    pub fn rootfs_url(mut self, template: &str) -> Self {
        self.sources.rootfs_url = template.to_owned();
        self
    }

    /// Require the engine download to have this digest
    pub fn engine_digest(mut self, digest: ContentDigest) -> Self {
        self.sources.engine_digest = Some(digest);
        self
    }

    /// Require the archive download to have this digest
    pub fn rootfs_digest(mut self, digest: ContentDigest) -> Self {
        self.sources.rootfs_digest = Some(digest);
        self
    }

    /// Replace the download client settings
    pub fn client(mut self, client: ClientBuilder) -> Self {
        self.client = client;
        self
    }

    pub fn cache_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.client = self.client.cache_dir(dir.as_ref());
        self
    }

    pub fn ephemeral_cache(mut self) -> Self {
        self.client = self.client.ephemeral_cache();
        self
    }

    pub fn offline(mut self) -> Self {
        self.client = self.client.offline();
        self
    }

    pub fn retries(mut self, attempts: u32) -> Self {
        self.client = self.client.retries(attempts);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.client = self.client.retry_delay(delay);
        self
    }

    /// Launch processes with something other than the installed engine
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Shell interpreter for string commands and interactive sessions
    pub fn shell<S: AsRef<OsStr>>(mut self, shell: S) -> Self {
        self.shell = shell.as_ref().to_os_string();
        self
    }

    pub fn install_policy(mut self, policy: InstallPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Construct the [Sandbox]
    ///
    /// Nothing is downloaded or written yet. This fails if the architecture
    /// isn't supported or the download client can't be configured.
    pub fn build(self) -> Result<Sandbox, SetupError> {
        let arch = match self.arch {
            Some(arch) => arch,
            None => Architecture::detect()?,
        };
        let root_dir = if self.root.is_absolute() {
            self.root
        } else {
            env::current_dir()?.join(self.root)
        };
        let root = SandboxRoot::new(root_dir);
        let client = self.client.build()?;

        let mut runner = SandboxRunner::new(root.clone()).with_shell(&self.shell);
        if let Some(backend) = self.backend {
            runner = runner.with_backend(backend);
        }
        log::debug!(
            "sandbox at {:?} for {}, {:?} install",
            root.path(),
            arch,
            self.policy
        );

        Ok(Sandbox {
            manager: RootfsManager::new(root, arch, client, self.sources),
            runner,
            policy: self.policy,
        })
    }
}

/// A sandbox root together with the means to install and use it
#[derive(Debug)]
pub struct Sandbox {
    manager: RootfsManager,
    runner: SandboxRunner,
    policy: InstallPolicy,
}

impl Sandbox {
    /// A sandbox with all default settings, in `./rootfs`
    pub fn new() -> Result<Sandbox, SetupError> {
        Sandbox::builder().build()
    }

    /// Start configuring a sandbox
    pub fn builder() -> SandboxBuilder {
        Default::default()
    }

    pub fn root(&self) -> &SandboxRoot {
        self.manager.root()
    }

    pub fn arch(&self) -> Architecture {
        self.manager.arch()
    }

    pub fn policy(&self) -> InstallPolicy {
        self.policy
    }

    pub fn state(&self) -> InstallState {
        self.manager.state()
    }

    pub fn is_installed(&self) -> bool {
        self.manager.is_installed()
    }

    pub fn install_record(&self) -> Result<Option<InstallRecord>, SetupError> {
        self.manager.install_record()
    }

    /// The runner, for use once the root is installed
    pub fn runner(&self) -> &SandboxRunner {
        &self.runner
    }

    /// Download and set up the root, unless that's already been done
    pub fn install(&mut self) -> Result<InstallOutcome, SetupError> {
        self.manager.install()
    }

    /// Run a command and collect its output
    ///
    /// ```no_run
    /// # fn main() -> Result<(), freeroot::errors::RuntimeError> {
    /// let mut sandbox = freeroot::Sandbox::new()?;
    /// let output = sandbox.run("cat /etc/os-release")?;
    /// print!("{}", output.stdout_str());
    /// # Ok(())
    /// # }
    /// ```
    pub fn run<C: Into<CommandInvocation>>(&mut self, command: C) -> Result<Output, RuntimeError> {
        self.ensure_installed()?;
        self.runner.run(&command.into())
    }

    /// Run a command with our own stdio, returning whatever it exits with
    pub fn interact<C: Into<CommandInvocation>>(
        &mut self,
        command: C,
    ) -> Result<ExitStatus, RuntimeError> {
        self.ensure_installed()?;
        self.runner.interact(&command.into())
    }

    /// Clone a git repository into `/root` inside the sandbox
    pub fn clone_repo(
        &mut self,
        url: &str,
        target: Option<&str>,
        branch: Option<&str>,
    ) -> Result<Output, RuntimeError> {
        self.ensure_installed()?;
        self.runner.clone_repo(url, target, branch)
    }

    /// Hand the terminal to a shell inside the sandbox until it exits
    pub fn start_interactive_shell(&mut self) -> Result<ExitStatus, RuntimeError> {
        self.ensure_installed()?;
        self.runner.start_interactive_shell()
    }

    /// Remove the whole root directory
    pub fn cleanup(&mut self) -> Result<(), SetupError> {
        self.manager.cleanup()
    }

    fn ensure_installed(&mut self) -> Result<(), RuntimeError> {
        if self.manager.is_installed() {
            return Ok(());
        }
        match self.policy {
            InstallPolicy::Lazy => {
                log::info!("sandbox root is not installed yet, installing now");
                self.manager.install()?;
                Ok(())
            }
            InstallPolicy::Required => Err(RuntimeError::SandboxNotInstalled(
                self.manager.root().path().to_path_buf(),
            )),
        }
    }
}
