//! Where the engine executable and base filesystem archive come from

use crate::{arch::Architecture, errors::SetupError, storage::ContentDigest};
use url::Url;

/// Engine builds published per kernel machine name
pub const DEFAULT_ENGINE_URL: &str =
    "https://raw.githubusercontent.com/foxytouxxx/freeroot/main/proot-{arch}";

/// Ubuntu base images, published per Debian architecture name
pub const DEFAULT_ROOTFS_URL: &str = "http://cdimage.ubuntu.com/ubuntu-base/releases/20.04/release/ubuntu-base-20.04.4-base-{arch_alt}.tar.gz";

/// URL templates for the two downloads an install needs
///
/// Templates may use `{arch}` (`x86_64`, `aarch64`) and `{arch_alt}`
/// (`amd64`, `arm64`) placeholders. Either download may be pinned to a
/// content digest, which is then verified after every fetch.
#[derive(Clone, Debug)]
pub struct Sources {
    pub engine_url: String,
    pub rootfs_url: String,
    pub engine_digest: Option<ContentDigest>,
    pub rootfs_digest: Option<ContentDigest>,
}

impl Default for Sources {
    fn default() -> Self {
        Sources::new()
    }
}

/// One download, with its URL filled in for a specific architecture
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Source {
    pub url: Url,
    pub digest: Option<ContentDigest>,
}

impl From<Url> for Source {
    fn from(url: Url) -> Self {
        Source { url, digest: None }
    }
}

/// Both downloads, resolved for one architecture
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedSources {
    pub engine: Source,
    pub rootfs: Source,
}

impl Sources {
    /// Return the built-in defaults
    pub fn new() -> Self {
        Sources {
            engine_url: DEFAULT_ENGINE_URL.to_owned(),
            rootfs_url: DEFAULT_ROOTFS_URL.to_owned(),
            engine_digest: None,
            rootfs_digest: None,
        }
    }

    /// Fill in the URL templates for a particular architecture
    pub fn resolve(&self, arch: Architecture) -> Result<ResolvedSources, SetupError> {
        Ok(ResolvedSources {
            engine: Source {
                url: expand(&self.engine_url, arch)?,
                digest: self.engine_digest.clone(),
            },
            rootfs: Source {
                url: expand(&self.rootfs_url, arch)?,
                digest: self.rootfs_digest.clone(),
            },
        })
    }
}

fn expand(template: &str, arch: Architecture) -> Result<Url, SetupError> {
    let expanded = template
        .replace("{arch_alt}", arch.alt_name())
        .replace("{arch}", arch.as_str());
    Url::parse(&expanded).map_err(|err| SetupError::InvalidUrl(expanded, err))
}
