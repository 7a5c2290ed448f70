//! Content-addressed cache for downloaded payloads

mod digest;
mod key;
mod writer;

pub use digest::ContentDigest;
pub use key::StorageKey;
pub use writer::StorageWriter;

use crate::errors::SetupError;
use std::{
    env, fs, io,
    io::Write,
    path::{Path, PathBuf},
};
use url::Url;

/// Determine a default per-user cache directory
///
/// Typically this returns `$HOME/.cache/freeroot`, but it may return
/// `$XDG_CACHE_HOME/freeroot` if the per-user cache directory has been set,
/// and the location can be customized directly via `$FREEROOT_CACHE`.
pub fn default_cache_dir() -> Result<PathBuf, SetupError> {
    match env::var("FREEROOT_CACHE") {
        Ok(s) => Ok(Path::new(&s).to_path_buf()),
        Err(_) => {
            let mut buf = match env::var("XDG_CACHE_HOME") {
                Ok(s) => Ok(Path::new(&s).to_path_buf()),
                Err(_) => match env::var("HOME") {
                    Ok(s) => Ok(Path::new(&s).join(".cache")),
                    Err(_) => Err(SetupError::NoDefaultCacheDir),
                },
            };
            if let Ok(buf) = &mut buf {
                buf.push("freeroot");
            }
            buf
        }
    }
}

fn create_parent_dirs(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            // Log instead of giving up right away, in case this was a race
            // with another process.
            log::warn!("error creating directory at {:?}, {:?}", parent, err);
        }
    }
}

#[derive(Clone, Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: PathBuf) -> Self {
        FileStorage { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check whether a stored file exists without opening it
    ///
    /// Returns true if and only if the storage exists as a non-empty regular
    /// file. Any errors will cause this to return false.
    pub fn exists(&self, key: &StorageKey) -> bool {
        match fs::metadata(key.to_path(&self.path)) {
            Err(_) => false,
            Ok(metadata) => metadata.is_file() && metadata.len() > 0,
        }
    }

    /// Find the blob last downloaded from `url`, if it's still present
    pub fn lookup(&self, url: &Url) -> Result<Option<(ContentDigest, PathBuf)>, SetupError> {
        let link_path = StorageKey::Link(url.clone()).to_path(&self.path);
        let link = match fs::read_to_string(&link_path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
            Ok(link) => link,
        };
        let digest = match ContentDigest::parse(link.trim()) {
            Ok(digest) => digest,
            Err(_) => {
                log::warn!("ignoring damaged cache link {:?}", link_path);
                return Ok(None);
            }
        };
        let key = StorageKey::Blob(digest.clone());
        if self.exists(&key) {
            Ok(Some((digest, key.to_path(&self.path))))
        } else {
            log::debug!("cache link for {} points to missing blob {}", url, digest);
            Ok(None)
        }
    }

    /// Begin writing to temporary storage next to the blobs
    pub fn begin_write(&self) -> Result<StorageWriter, SetupError> {
        let dir = key::temp_dir(&self.path);
        fs::create_dir_all(&dir)?;
        let temp_file = tempfile::Builder::new()
            .prefix(&format!("{}-", std::process::id()))
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        Ok(StorageWriter::new(temp_file))
    }

    /// Promote a finished download into a blob, and point `url` at it
    pub fn commit_write(
        &self,
        mut writer: StorageWriter,
        url: &Url,
    ) -> Result<(ContentDigest, PathBuf), SetupError> {
        let content_digest = writer.finalize()?;
        let blob_path = StorageKey::Blob(content_digest.clone()).to_path(&self.path);
        create_parent_dirs(&blob_path);
        writer.persist(&blob_path)?;

        let link_path = StorageKey::Link(url.clone()).to_path(&self.path);
        create_parent_dirs(&link_path);
        let mut link = self.begin_write()?;
        link.write_all(content_digest.as_str().as_bytes())?;
        link.persist(&link_path)?;

        log::debug!("storage commit, {} -> {:?}", url, blob_path);
        Ok((content_digest, blob_path))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn commit_then_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());
        let url = Url::parse("https://example.com/base.tar.gz").unwrap();
        assert!(storage.lookup(&url).unwrap().is_none());

        let mut writer = storage.begin_write().unwrap();
        writer.write_all(b"image bytes").unwrap();
        let (digest, path) = storage.commit_write(writer, &url).unwrap();
        assert_eq!(digest, ContentDigest::from_content(b"image bytes"));
        assert_eq!(fs::read(&path).unwrap(), b"image bytes");

        let (found, found_path) = storage.lookup(&url).unwrap().unwrap();
        assert_eq!(found, digest);
        assert_eq!(found_path, path);
        assert_eq!(fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
    }

    #[test]
    fn missing_blob_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());
        let url = Url::parse("https://example.com/proot").unwrap();
        let mut writer = storage.begin_write().unwrap();
        writer.write_all(b"engine").unwrap();
        let (_, path) = storage.commit_write(writer, &url).unwrap();
        fs::remove_file(path).unwrap();
        assert!(storage.lookup(&url).unwrap().is_none());
    }
}
