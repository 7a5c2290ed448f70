use crate::{
    errors::RuntimeError,
    sandbox::{
        invocation::CommandInvocation,
        runner::{Output, SandboxRunner},
    },
};

/// Installs git inside the sandbox if it isn't there yet
pub const ENSURE_GIT: &str =
    "which git >/dev/null 2>&1 || (apt-get update && apt-get install -y git)";

/// Directory name git would choose for a clone of `url`
///
/// ```
/// use freeroot::sandbox::repo_name;
/// assert_eq!(repo_name("https://github.com/user/project.git").as_deref(), Some("project"));
/// assert_eq!(repo_name("git@github.com:user/project").as_deref(), Some("project"));
/// assert_eq!(repo_name("").as_deref(), None);
/// ```
pub fn repo_name(url: &str) -> Option<String> {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed
        .rsplit(|c: char| c == '/' || c == ':')
        .next()
        .unwrap_or(trimmed);
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        None
    } else {
        Some(name.to_owned())
    }
}

/// Argument vector for `git clone`, with the target defaulting to the
/// repository name
pub fn clone_invocation(url: &str, target: Option<&str>, branch: Option<&str>) -> CommandInvocation {
    let mut args = vec!["git".to_owned(), "clone".to_owned(), url.to_owned()];
    if let Some(branch) = branch {
        args.push("--branch".to_owned());
        args.push(branch.to_owned());
    }
    if let Some(target) = target.map(str::to_owned).or_else(|| repo_name(url)) {
        args.push(target);
    }
    CommandInvocation::argv(args)
}

impl SandboxRunner {
    /// Clone a git repository into `/root` inside the sandbox
    ///
    /// Git itself is installed with apt first if the base image lacks it.
    pub fn clone_repo(
        &self,
        url: &str,
        target: Option<&str>,
        branch: Option<&str>,
    ) -> Result<Output, RuntimeError> {
        log::info!("cloning {} into the sandbox", url);
        self.run(&CommandInvocation::shell(ENSURE_GIT))?;
        self.run(&clone_invocation(url, target, branch))
    }
}
