//! Rootless sandboxes built from a base filesystem image
//!
//! A [Sandbox] downloads a base filesystem archive and the `proot` engine
//! for this machine's architecture, unpacks them into a root directory, and
//! then runs commands inside that root as a pretend superuser. Nothing here
//! needs privileges beyond `ptrace`.
//!
//! ```no_run
//! # fn main() -> Result<(), freeroot::errors::RuntimeError> {
//! let mut sandbox = freeroot::Sandbox::builder().root_dir("/tmp/ubuntu").build()?;
//! sandbox.install()?;
//! println!("{}", sandbox.run("apt list --installed | wc -l")?.stdout_str());
//! # Ok(())
//! # }
//! ```

#[cfg(not(any(target_os = "linux", target_os = "android")))]
compile_error!("freeroot only works on linux or android");

#[macro_use] extern crate lazy_static;
#[macro_use] extern crate serde;

pub mod download;
pub mod errors;
pub mod rootfs;
pub mod sandbox;
pub mod sources;
pub mod storage;

mod arch;

pub use crate::{
    arch::Architecture,
    download::{Client, ClientBuilder},
    rootfs::{InstallOutcome, InstallRecord, InstallState, RootfsManager, SandboxRoot},
    sandbox::{CommandInvocation, InstallPolicy, Output, Sandbox, SandboxBuilder, SandboxRunner},
    sources::Sources,
    storage::ContentDigest,
};
