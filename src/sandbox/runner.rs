use crate::{
    errors::RuntimeError,
    rootfs::SandboxRoot,
    sandbox::{
        backend::{Backend, LaunchSpec, ProotBackend, StdioMode},
        invocation::{Command, CommandInvocation},
    },
};
use std::{
    borrow::Cow,
    ffi::{OsStr, OsString},
    fmt,
    os::unix::process::ExitStatusExt,
    process,
    sync::Arc,
};

/// Shell used for string commands and interactive sessions by default
pub const DEFAULT_SHELL: &str = "bash";

/// Status of an exited sandbox process
///
/// Much like [std::process::ExitStatus], except that a process killed by a
/// signal reports `128 + signal` the way a shell would.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ExitStatus {
    pub(crate) code: i32,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn code(&self) -> i32 {
        self.code
    }
}

impl From<process::ExitStatus> for ExitStatus {
    fn from(status: process::ExitStatus) -> Self {
        let code = match (status.code(), status.signal()) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => -1,
        };
        ExitStatus { code }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exit status {}", self.code)
    }
}

/// Output from a sandboxed command that exited successfully
///
/// Much like [std::process::Output]
#[derive(Clone, Eq, PartialEq)]
pub struct Output {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Output {
    /// Convert the stdout to utf8 if possible
    ///
    /// Equivalent to `String::from_utf8_lossy(output.stdout)`
    pub fn stdout_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Convert the stderr to utf8 if possible
    ///
    /// Equivalent to `String::from_utf8_lossy(output.stderr)`
    pub fn stderr_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Output")
            .field("status", &self.status)
            .field("stdout", &self.stdout_str())
            .field("stderr", &self.stderr_str())
            .finish()
    }
}

/// Runs commands inside an installed sandbox root
///
/// The runner never installs anything. Every method checks the installed
/// flag first and fails with [RuntimeError::SandboxNotInstalled] when it's
/// missing.
#[derive(Clone, Debug)]
pub struct SandboxRunner {
    root: SandboxRoot,
    backend: Arc<dyn Backend>,
    shell: OsString,
}

impl SandboxRunner {
    pub fn new(root: SandboxRoot) -> Self {
        SandboxRunner {
            root,
            backend: Arc::new(ProotBackend::new()),
            shell: OsString::from(DEFAULT_SHELL),
        }
    }

    /// Replace the engine used to launch processes
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = backend;
        self
    }

    /// Replace the shell interpreter
    pub fn with_shell<S: AsRef<OsStr>>(mut self, shell: S) -> Self {
        self.shell = shell.as_ref().to_os_string();
        self
    }

    pub fn root(&self) -> &SandboxRoot {
        &self.root
    }

    pub fn shell(&self) -> &OsStr {
        &self.shell
    }

    /// Engine setup for one invocation, without launching anything
    pub fn launch_spec(&self, invocation: &CommandInvocation) -> Result<LaunchSpec, RuntimeError> {
        if let Command::Argv(args) = invocation.command() {
            if args.is_empty() {
                return Err(RuntimeError::EmptyCommand);
            }
        }
        Ok(LaunchSpec::new(&self.root, invocation, &self.shell))
    }

    fn check_installed(&self) -> Result<(), RuntimeError> {
        if self.root.is_installed() {
            Ok(())
        } else {
            Err(RuntimeError::SandboxNotInstalled(self.root.path().to_path_buf()))
        }
    }

    /// Run a command to completion, collecting its output
    ///
    /// A non-zero exit becomes [RuntimeError::CommandFailed] with the
    /// collected stderr.
    pub fn run(&self, invocation: &CommandInvocation) -> Result<Output, RuntimeError> {
        self.check_installed()?;
        let spec = self.launch_spec(invocation)?;
        let child = self.backend.launch(&spec, StdioMode::Captured)?;
        let output = child.wait_with_output()?;
        let status = ExitStatus::from(output.status);
        log::debug!("{:?} finished with {}", spec.argv, status);
        if status.success() {
            Ok(Output {
                status,
                stdout: output.stdout,
                stderr: output.stderr,
            })
        } else {
            Err(RuntimeError::CommandFailed {
                exit_code: status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }

    /// Run a command connected to our own stdin, stdout and stderr
    ///
    /// Whatever the command exits with is returned as its status. A
    /// non-zero exit is only logged.
    pub fn interact(&self, invocation: &CommandInvocation) -> Result<ExitStatus, RuntimeError> {
        self.check_installed()?;
        let spec = self.launch_spec(invocation)?;
        let mut child = self.backend.launch(&spec, StdioMode::Inherited)?;
        let status = ExitStatus::from(child.wait()?);
        if !status.success() {
            log::warn!("interactive {:?} exited with {}", spec.argv, status);
        }
        Ok(status)
    }

    /// Start the shell interactively in the default working directory
    pub fn start_interactive_shell(&self) -> Result<ExitStatus, RuntimeError> {
        self.interact(&CommandInvocation::argv(&[&self.shell]))
    }
}
