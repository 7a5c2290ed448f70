use crate::{errors::SetupError, storage::ContentDigest};
use sha2::{Digest, Sha256};
use std::{
    io,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

/// Temporary file that hashes everything written to it
///
/// The temp file is deleted when the writer drops, unless it has been
/// persisted or handed off with [StorageWriter::into_temp()] first.
#[derive(Debug)]
pub struct StorageWriter {
    temp_file: NamedTempFile,
    hasher: Option<Sha256>,
    len: u64,
    content_digest: Option<Result<ContentDigest, ()>>,
}

impl StorageWriter {
    pub fn new(temp_file: NamedTempFile) -> StorageWriter {
        StorageWriter {
            temp_file,
            hasher: Some(Sha256::new()),
            len: 0,
            content_digest: None,
        }
    }

    /// Number of bytes written so far
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_file.path()
    }

    /// Flush buffered I/O and return the final content digest
    pub fn finalize(&mut self) -> Result<ContentDigest, SetupError> {
        self.flush()?;
        if let Some(hasher) = self.hasher.take() {
            if self.content_digest.is_none() {
                self.content_digest = Some(
                    ContentDigest::from_parts("sha256", &hasher.finalize()).map_err(|_| ()),
                );
            }
        }
        match &self.content_digest {
            Some(Ok(digest)) => Ok(digest.clone()),
            _ => Err(SetupError::Storage(io::Error::new(
                io::ErrorKind::Other,
                "i/o errors occurred, the content digest is not valid",
            ))),
        }
    }

    /// Atomically move the finished file to its destination
    pub fn persist(mut self, dest_path: &Path) -> Result<PathBuf, SetupError> {
        self.finalize()?;
        self.temp_file
            .persist(dest_path)
            .map_err(|err| SetupError::Storage(err.error))?;
        Ok(dest_path.to_path_buf())
    }

    /// Keep the file as an anonymous temporary, removed when dropped
    pub fn into_temp(mut self) -> Result<NamedTempFile, SetupError> {
        self.finalize()?;
        Ok(self.temp_file)
    }
}

impl Write for StorageWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize, io::Error> {
        match self.temp_file.write(buf) {
            Err(e) => {
                self.content_digest = Some(Err(()));
                Err(e)
            }
            Ok(actual_size) => {
                if let Some(hasher) = &mut self.hasher {
                    hasher.update(&buf[..actual_size]);
                }
                self.len += actual_size as u64;
                Ok(actual_size)
            }
        }
    }

    fn flush(&mut self) -> Result<(), io::Error> {
        match self.temp_file.flush() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.content_digest = Some(Err(()));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    #[test]
    fn digest_matches_content() {
        let mut writer = StorageWriter::new(NamedTempFile::new().unwrap());
        writer.write_all(b"c").unwrap();
        writer.write_all(b"at").unwrap();
        assert_eq!(writer.len(), 3);
        assert_eq!(
            writer.finalize().unwrap(),
            ContentDigest::from_content(b"cat")
        );
    }

    #[test]
    fn dropped_writer_removes_temp() {
        let mut writer = StorageWriter::new(NamedTempFile::new().unwrap());
        writer.write_all(b"partial").unwrap();
        let path = writer.temp_path().to_path_buf();
        assert!(path.exists());
        drop(writer);
        assert!(!path.exists());
    }

    #[test]
    fn persist_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = StorageWriter::new(NamedTempFile::new_in(dir.path()).unwrap());
        writer.write_all(b"payload").unwrap();
        let temp_path = writer.temp_path().to_path_buf();
        let dest = dir.path().join("dest");
        writer.persist(&dest).unwrap();
        assert!(!temp_path.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
    }
}
