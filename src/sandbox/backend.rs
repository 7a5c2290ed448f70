//! The seam between sandbox setup and the engine that enforces it

use crate::{
    errors::RuntimeError,
    rootfs::SandboxRoot,
    sandbox::invocation::CommandInvocation,
};
use std::{
    collections::BTreeMap,
    ffi::{OsStr, OsString},
    fmt,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
};

/// Host directories every sandbox sees at the same path
pub const SYSTEM_BINDS: [&str; 3] = ["/dev", "/sys", "/proc"];

/// Expose a host path inside the sandbox, at the same path or another one
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Bind {
    pub host: PathBuf,
    pub guest: Option<PathBuf>,
}

impl Bind {
    pub fn new<P: AsRef<Path>>(host: P) -> Self {
        Bind {
            host: host.as_ref().to_path_buf(),
            guest: None,
        }
    }

    pub fn to<P: AsRef<Path>, Q: AsRef<Path>>(host: P, guest: Q) -> Self {
        Bind {
            host: host.as_ref().to_path_buf(),
            guest: Some(guest.as_ref().to_path_buf()),
        }
    }

    /// `host` or `host:guest`
    pub fn to_arg(&self) -> OsString {
        let mut arg = self.host.as_os_str().to_os_string();
        if let Some(guest) = &self.guest {
            arg.push(":");
            arg.push(guest);
        }
        arg
    }
}

/// Everything a [Backend] needs to start one sandboxed process
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchSpec {
    pub root: PathBuf,
    pub binds: Vec<Bind>,
    /// present the process with uid and gid 0
    pub root_id: bool,
    pub working_dir: PathBuf,
    pub kill_on_exit: bool,
    pub argv: Vec<OsString>,
    /// merged over the inherited environment
    pub env: BTreeMap<OsString, OsString>,
}

impl LaunchSpec {
    /// Standard setup for running `invocation` in `root`
    ///
    /// The system directories and the root's own DNS configuration are
    /// always bound.
    pub fn new(root: &SandboxRoot, invocation: &CommandInvocation, shell: &OsStr) -> Self {
        let mut binds: Vec<Bind> = SYSTEM_BINDS.iter().map(Bind::new).collect();
        binds.push(Bind::to(root.resolv_conf(), "/etc/resolv.conf"));
        LaunchSpec {
            root: root.path().to_path_buf(),
            binds,
            root_id: true,
            working_dir: invocation.working_dir().to_path_buf(),
            kill_on_exit: true,
            argv: invocation.to_argv(shell),
            env: invocation.env_overlay().clone(),
        }
    }
}

/// Whether a launched process talks to pipes or to our own terminal
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StdioMode {
    /// stdin is closed, stdout and stderr are collected
    Captured,
    /// all three streams are shared with the caller
    Inherited,
}

impl StdioMode {
    fn apply(self, command: &mut Command) {
        match self {
            StdioMode::Captured => command
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped()),
            StdioMode::Inherited => command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit()),
        };
    }
}

/// Something that can start a process confined to a sandbox root
pub trait Backend: fmt::Debug + Send + Sync {
    fn launch(&self, spec: &LaunchSpec, stdio: StdioMode) -> Result<Child, RuntimeError>;
}

/// Runs processes under the `proot` engine installed inside the root
#[derive(Clone, Debug, Default)]
pub struct ProotBackend {
    engine: Option<PathBuf>,
}

impl ProotBackend {
    pub fn new() -> Self {
        Default::default()
    }

    /// Use an engine executable outside the root
    pub fn with_engine<P: AsRef<Path>>(path: P) -> Self {
        ProotBackend {
            engine: Some(path.as_ref().to_path_buf()),
        }
    }

    /// Engine executable used for a particular root
    pub fn engine_for(&self, root: &Path) -> PathBuf {
        match &self.engine {
            Some(path) => path.clone(),
            None => SandboxRoot::new(root).engine_path(),
        }
    }

    /// Engine command line, in the order the engine expects
    pub fn args(spec: &LaunchSpec) -> Vec<OsString> {
        let mut rootfs = OsString::from("--rootfs=");
        rootfs.push(&spec.root);
        let mut args = vec![rootfs];
        if spec.root_id {
            args.push("-0".into());
        }
        args.push("-w".into());
        args.push(spec.working_dir.as_os_str().to_os_string());
        for bind in &spec.binds {
            args.push("-b".into());
            args.push(bind.to_arg());
        }
        if spec.kill_on_exit {
            args.push("--kill-on-exit".into());
        }
        args.extend(spec.argv.iter().cloned());
        args
    }
}

impl Backend for ProotBackend {
    fn launch(&self, spec: &LaunchSpec, stdio: StdioMode) -> Result<Child, RuntimeError> {
        let engine = self.engine_for(&spec.root);
        let args = ProotBackend::args(spec);
        log::debug!("launching {:?} with args={:?}, env={:?}", engine, args, spec.env);

        let mut command = Command::new(&engine);
        command.args(&args).envs(&spec.env);
        stdio.apply(&mut command);
        command
            .spawn()
            .map_err(|source| RuntimeError::Launch { engine, source })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn spec(invocation: &CommandInvocation) -> LaunchSpec {
        LaunchSpec::new(
            &SandboxRoot::new("/home/user/rootfs"),
            invocation,
            OsStr::new("bash"),
        )
    }

    #[test]
    fn shell_command_args() {
        let args = ProotBackend::args(&spec(&CommandInvocation::shell("uname -a")));
        assert_eq!(
            args,
            vec![
                "--rootfs=/home/user/rootfs",
                "-0",
                "-w",
                "/root",
                "-b",
                "/dev",
                "-b",
                "/sys",
                "-b",
                "/proc",
                "-b",
                "/home/user/rootfs/etc/resolv.conf:/etc/resolv.conf",
                "--kill-on-exit",
                "bash",
                "-c",
                "uname -a",
            ]
        );
    }

    #[test]
    fn argv_command_args() {
        let invocation = CommandInvocation::argv(vec!["git", "clone", "x y"]).current_dir("/srv");
        let args = ProotBackend::args(&spec(&invocation));
        assert_eq!(&args[2..4], &["-w", "/srv"]);
        assert_eq!(&args[args.len() - 4..], &["--kill-on-exit", "git", "clone", "x y"]);
    }

    #[test]
    fn binds_always_present() {
        let invocation = CommandInvocation::shell("true").env("PATH", "/bin");
        let spec = spec(&invocation);
        for dir in &SYSTEM_BINDS {
            assert!(spec.binds.contains(&Bind::new(dir)));
        }
        assert!(spec.binds.contains(&Bind::to(
            "/home/user/rootfs/etc/resolv.conf",
            "/etc/resolv.conf"
        )));
        assert_eq!(spec.env.get(OsStr::new("PATH")).unwrap(), "/bin");
    }

    #[test]
    fn optional_flags() {
        let mut spec = spec(&CommandInvocation::shell("true"));
        spec.root_id = false;
        spec.kill_on_exit = false;
        spec.binds.clear();
        let args = ProotBackend::args(&spec);
        assert_eq!(
            args,
            vec!["--rootfs=/home/user/rootfs", "-w", "/root", "bash", "-c", "true"]
        );
    }

    #[test]
    fn engine_location() {
        let root = Path::new("/r");
        assert_eq!(
            ProotBackend::new().engine_for(root),
            Path::new("/r/usr/local/bin/proot")
        );
        assert_eq!(
            ProotBackend::with_engine("/opt/proot").engine_for(root),
            Path::new("/opt/proot")
        );
    }
}
