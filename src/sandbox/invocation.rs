use std::{
    collections::BTreeMap,
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

/// Working directory inside the sandbox unless one is given
pub const DEFAULT_WORKING_DIR: &str = "/root";

/// What to execute inside the sandbox
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// a string handed to `<shell> -c`
    Shell(OsString),
    /// an argument vector passed through unchanged
    Argv(Vec<OsString>),
}

/// One command to run in a sandbox, with its directory and environment
///
/// The environment overlay is merged on top of the caller's full
/// environment; nothing is removed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    command: Command,
    current_dir: PathBuf,
    env: BTreeMap<OsString, OsString>,
}

impl CommandInvocation {
    fn new(command: Command) -> Self {
        CommandInvocation {
            command,
            current_dir: PathBuf::from(DEFAULT_WORKING_DIR),
            env: BTreeMap::new(),
        }
    }

    /// Run a command line through the sandbox's shell
    pub fn shell<S: AsRef<OsStr>>(command: S) -> Self {
        CommandInvocation::new(Command::Shell(command.as_ref().to_os_string()))
    }

    /// Run an argument vector directly, with no shell quoting involved
    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        CommandInvocation::new(Command::Argv(
            args.into_iter().map(|s| s.as_ref().to_os_string()).collect(),
        ))
    }

    /// Override the directory the command starts in
    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.current_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Add or replace one environment variable
    pub fn env<K, V>(mut self, key: K, val: V) -> Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.env
            .insert(key.as_ref().to_os_string(), val.as_ref().to_os_string());
        self
    }

    /// Add or replace many environment variables
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        for (key, val) in vars {
            self = self.env(key, val);
        }
        self
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn working_dir(&self) -> &Path {
        &self.current_dir
    }

    pub fn env_overlay(&self) -> &BTreeMap<OsString, OsString> {
        &self.env
    }

    /// The argument vector seen inside the sandbox
    pub fn to_argv(&self, shell: &OsStr) -> Vec<OsString> {
        match &self.command {
            Command::Shell(line) => vec![shell.to_os_string(), OsString::from("-c"), line.clone()],
            Command::Argv(args) => args.clone(),
        }
    }
}

impl From<&str> for CommandInvocation {
    fn from(command: &str) -> Self {
        CommandInvocation::shell(command)
    }
}

impl From<String> for CommandInvocation {
    fn from(command: String) -> Self {
        CommandInvocation::shell(command)
    }
}

impl From<Vec<String>> for CommandInvocation {
    fn from(args: Vec<String>) -> Self {
        CommandInvocation::argv(args)
    }
}

impl From<&[&str]> for CommandInvocation {
    fn from(args: &[&str]) -> Self {
        CommandInvocation::argv(args)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shell_strings() {
        let inv = CommandInvocation::from("echo $HOME | wc -c");
        assert_eq!(inv.working_dir(), Path::new("/root"));
        assert_eq!(
            inv.to_argv(OsStr::new("bash")),
            vec!["bash", "-c", "echo $HOME | wc -c"]
        );
    }

    #[test]
    fn argv_is_untouched() {
        let inv = CommandInvocation::from(&["ls", "-la", "a b"][..]).current_dir("/tmp");
        assert_eq!(inv.working_dir(), Path::new("/tmp"));
        assert_eq!(inv.to_argv(OsStr::new("bash")), vec!["ls", "-la", "a b"]);
    }

    #[test]
    fn later_env_wins() {
        let inv = CommandInvocation::shell("env")
            .env("A", "1")
            .envs(vec![("B", "2"), ("A", "3")]);
        let overlay: Vec<_> = inv
            .env_overlay()
            .iter()
            .map(|(k, v)| (k.to_str().unwrap(), v.to_str().unwrap()))
            .collect();
        assert_eq!(overlay, vec![("A", "3"), ("B", "2")]);
    }
}
