//! Installing, detecting and removing a sandbox root directory

pub mod tar;

use crate::{
    arch::Architecture,
    download::{copy_download, Client},
    errors::SetupError,
    sources::Sources,
    storage::ContentDigest,
};
use std::{
    fs, io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

/// Marker written last during install; its presence means "ready"
pub const INSTALLED_FLAG: &str = ".installed";

/// Where the engine executable lives, relative to the root
pub const ENGINE_PATH: &str = "usr/local/bin/proot";

/// DNS configuration bound over the sandbox's `/etc/resolv.conf`
pub const RESOLV_CONF: &str = "etc/resolv.conf";

const NAMESERVERS: &str = "nameserver 1.1.1.1\nnameserver 1.0.0.1\n";

/// Paths that make up one sandbox root
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SandboxRoot {
    path: PathBuf,
}

impl SandboxRoot {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        SandboxRoot {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn installed_flag(&self) -> PathBuf {
        self.path.join(INSTALLED_FLAG)
    }

    pub fn engine_path(&self) -> PathBuf {
        self.path.join(ENGINE_PATH)
    }

    pub fn resolv_conf(&self) -> PathBuf {
        self.path.join(RESOLV_CONF)
    }

    /// True if the installed flag is present, whatever its content
    pub fn is_installed(&self) -> bool {
        fs::symlink_metadata(self.installed_flag())
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Read back what was installed, if the flag exists and parses
    pub fn install_record(&self) -> Result<Option<InstallRecord>, SetupError> {
        match fs::read(self.installed_flag()) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
        }
    }
}

/// Lifecycle of a sandbox root as seen by its [RootfsManager]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InstallState {
    Uninstalled,
    Installing,
    Installed,
    Failed,
}

/// What a successful [RootfsManager::install()] actually did
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InstallOutcome {
    /// the root was built from scratch
    Installed,
    /// the flag was already present, nothing was touched
    AlreadyInstalled,
}

/// Content of the installed flag
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InstallRecord {
    pub arch: Architecture,
    pub engine: InstalledSource,
    pub rootfs: InstalledSource,
}

/// One download that went into an installed root
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InstalledSource {
    pub url: String,
    pub digest: ContentDigest,
}

/// Owns the install and teardown of one sandbox root
///
/// An install either finishes with a fully populated root and its flag, or
/// leaves nothing behind at the root path.
#[derive(Debug)]
pub struct RootfsManager {
    root: SandboxRoot,
    arch: Architecture,
    client: Client,
    sources: Sources,
    state: InstallState,
}

impl RootfsManager {
    pub fn new(root: SandboxRoot, arch: Architecture, client: Client, sources: Sources) -> Self {
        let state = if root.is_installed() {
            InstallState::Installed
        } else {
            InstallState::Uninstalled
        };
        RootfsManager {
            root,
            arch,
            client,
            sources,
            state,
        }
    }

    pub fn root(&self) -> &SandboxRoot {
        &self.root
    }

    pub fn arch(&self) -> Architecture {
        self.arch
    }

    pub fn is_installed(&self) -> bool {
        self.root.is_installed()
    }

    /// Current state, refreshed from the installed flag
    pub fn state(&self) -> InstallState {
        match self.state {
            InstallState::Failed | InstallState::Installing => self.state,
            _ if self.root.is_installed() => InstallState::Installed,
            _ => InstallState::Uninstalled,
        }
    }

    pub fn install_record(&self) -> Result<Option<InstallRecord>, SetupError> {
        self.root.install_record()
    }

    /// Build the root if its flag is absent
    ///
    /// Anything already at the root path without a flag is left over from an
    /// interrupted install, and is removed first. The base archive is then
    /// fetched and extracted, the engine is fetched and made executable, DNS
    /// is configured, and the flag is written last. If any step fails the
    /// partial root is removed before the error is returned.
    pub fn install(&mut self) -> Result<InstallOutcome, SetupError> {
        if self.root.is_installed() {
            log::debug!("{:?} is already installed", self.root.path());
            self.state = InstallState::Installed;
            return Ok(InstallOutcome::AlreadyInstalled);
        }

        log::info!("installing {} sandbox root at {:?}", self.arch, self.root.path());
        self.state = InstallState::Installing;
        match self.clear_stale_root().and_then(|()| self.populate()) {
            Ok(()) => {
                self.state = InstallState::Installed;
                log::info!("sandbox root at {:?} is ready", self.root.path());
                Ok(InstallOutcome::Installed)
            }
            Err(err) => {
                log::warn!("install of {:?} failed, {}", self.root.path(), err);
                if let Err(cleanup_err) = remove_tree(self.root.path()) {
                    log::warn!(
                        "couldn't remove partial root {:?}, {}",
                        self.root.path(),
                        cleanup_err
                    );
                }
                self.state = InstallState::Failed;
                Err(err)
            }
        }
    }

    /// Remove the root directory and its flag
    ///
    /// A root that doesn't exist is already clean.
    pub fn cleanup(&mut self) -> Result<(), SetupError> {
        log::info!("removing sandbox root at {:?}", self.root.path());
        remove_tree(self.root.path())?;
        self.state = InstallState::Uninstalled;
        Ok(())
    }

    fn clear_stale_root(&self) -> Result<(), SetupError> {
        let path = self.root.path();
        if fs::symlink_metadata(path).is_ok() {
            log::warn!("removing incomplete sandbox root at {:?}", path);
            remove_tree(path)?;
        }
        Ok(())
    }

    fn populate(&self) -> Result<(), SetupError> {
        let sources = self.sources.resolve(self.arch)?;
        fs::create_dir_all(self.root.path())?;

        let rootfs = self.client.download(&sources.rootfs)?;
        self::tar::extract(rootfs.path(), self.root.path())?;
        let rootfs_digest = rootfs.digest().clone();
        drop(rootfs);

        let engine = self.client.download(&sources.engine)?;
        let engine_path = self.root.engine_path();
        remove_if_present(&engine_path)?;
        copy_download(&engine, &engine_path)?;
        fs::set_permissions(&engine_path, fs::Permissions::from_mode(0o755))?;
        log::debug!("engine installed at {:?}", engine_path);

        self.write_dns_config()?;

        let record = InstallRecord {
            arch: self.arch,
            engine: InstalledSource {
                url: sources.engine.url.to_string(),
                digest: engine.digest().clone(),
            },
            rootfs: InstalledSource {
                url: sources.rootfs.url.to_string(),
                digest: rootfs_digest,
            },
        };
        let flag = self.root.installed_flag();
        let staged = flag.with_extension("tmp");
        fs::write(&staged, serde_json::to_vec_pretty(&record)?)?;
        fs::rename(&staged, &flag)?;
        Ok(())
    }

    fn write_dns_config(&self) -> Result<(), SetupError> {
        let path = self.root.resolv_conf();
        // Base images often ship this as a symlink into /run
        remove_if_present(&path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, NAMESERVERS)?;
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Recursively delete `path`, restoring owner permissions if they block it
pub(crate) fn remove_tree(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            log::debug!("restoring write permission under {:?}", path);
            restore_owner_access(path);
            match fs::remove_dir_all(path) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            }
        }
        other => other,
    }
}

fn restore_owner_access(path: &Path) {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => metadata,
        _ => return,
    };
    let mode = metadata.permissions().mode();
    if mode & 0o700 != 0o700 {
        if let Err(err) = fs::set_permissions(path, fs::Permissions::from_mode(mode | 0o700)) {
            log::warn!("can't make {:?} writable, {}", path, err);
        }
    }
    if let Ok(entries) = fs::read_dir(path) {
        for entry in entries.flatten() {
            restore_owner_access(&entry.path());
        }
    }
}
