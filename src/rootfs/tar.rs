use crate::errors::ExtractionError;
use flate2::read::MultiGzDecoder;
use std::{
    fs,
    fs::File,
    io,
    io::{BufRead, BufReader, Read},
    os::unix::fs::PermissionsExt,
    path::{Component, Path, PathBuf},
};
use tar::{Archive, Entry, EntryType};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Unpack a tar archive file into `dest`, returning the number of entries
///
/// The archive may be plain or gzip-compressed, including gzip streams made
/// of several concatenated members.
pub fn extract(archive: &Path, dest: &Path) -> Result<usize, ExtractionError> {
    let file = File::open(archive).map_err(|source| ExtractionError::Open {
        path: archive.to_path_buf(),
        source,
    })?;
    log::info!("extracting {:?} to {:?}", archive, dest);
    extract_from(file, dest)
}

/// Unpack a tar stream into `dest`
///
/// File modes, symlinks and hard links are reproduced. Ownership is not;
/// everything belongs to the invoking user. Device nodes and FIFOs can't be
/// created without privileges, so each becomes an empty regular file with
/// the recorded mode.
pub fn extract_from<R: Read>(reader: R, dest: &Path) -> Result<usize, ExtractionError> {
    fs::create_dir_all(dest).map_err(|source| ExtractionError::Entry {
        path: dest.to_path_buf(),
        source,
    })?;

    let mut reader = BufReader::new(reader);
    let is_gzip = reader
        .fill_buf()
        .map_err(ExtractionError::Format)?
        .starts_with(&GZIP_MAGIC);
    let stream: Box<dyn Read> = if is_gzip {
        Box::new(MultiGzDecoder::new(reader))
    } else {
        Box::new(reader)
    };

    let mut archive = Archive::new(stream);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_overwrite(true);
    archive.set_unpack_xattrs(false);

    let mut count: usize = 0;
    let mut directories = Vec::new();
    for entry in archive.entries().map_err(ExtractionError::Format)? {
        let mut entry = entry.map_err(ExtractionError::Format)?;
        count += 1;
        let kind = entry.header().entry_type();
        match kind {
            // Applied last, so read-only directory modes can't block their
            // own contents
            EntryType::Directory => directories.push(entry),
            EntryType::Char | EntryType::Block | EntryType::Fifo => {
                write_substitute(&entry, dest)?
            }
            _ => unpack(&mut entry, dest)?,
        }
    }

    directories.sort_by(|a, b| b.path_bytes().cmp(&a.path_bytes()));
    for mut dir in directories {
        unpack(&mut dir, dest)?;
    }

    if count == 0 {
        return Err(ExtractionError::Empty);
    }
    check_end_of_archive(archive.into_inner())?;
    log::debug!("extracted {} entries into {:?}", count, dest);
    Ok(count)
}

/// Read whatever follows the last entry
///
/// A complete archive ends in zero blocks, at least one of which is still
/// unread here. Reading to the end also makes the gzip decoder verify its
/// checksum and length trailer.
fn check_end_of_archive<R: Read>(mut rest: R) -> Result<(), ExtractionError> {
    let mut buf = [0u8; 8192];
    let mut padding: u64 = 0;
    loop {
        let len = match rest.read(&mut buf) {
            Ok(0) => break,
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ExtractionError::Format(e)),
        };
        if buf[..len].iter().any(|b| *b != 0) {
            return Err(ExtractionError::Format(io::Error::new(
                io::ErrorKind::InvalidData,
                "unexpected data after the end-of-archive marker",
            )));
        }
        padding += len as u64;
    }
    if padding == 0 {
        Err(ExtractionError::Format(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "archive ends without an end-of-archive marker",
        )))
    } else {
        Ok(())
    }
}

fn unpack<R: Read>(entry: &mut Entry<'_, R>, dest: &Path) -> Result<(), ExtractionError> {
    let path = entry_path(entry);
    match entry.unpack_in(dest) {
        Ok(true) => Ok(()),
        Ok(false) => {
            log::warn!("skipping archive entry outside the root, {:?}", path);
            Ok(())
        }
        Err(err) => Err(classify(path, err)),
    }
}

fn write_substitute<R: Read>(entry: &Entry<'_, R>, dest: &Path) -> Result<(), ExtractionError> {
    let name = entry_path(entry);
    let path = match contained_path(dest, &name) {
        Some(path) => path,
        None => {
            log::warn!("skipping archive entry outside the root, {:?}", name);
            return Ok(());
        }
    };
    let mode = entry.header().mode().map_err(ExtractionError::Format)?;
    log::trace!(
        "substituting regular file for {:?} entry {:?}",
        entry.header().entry_type(),
        name
    );
    let result = (|| -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if fs::symlink_metadata(&path).is_ok() {
            fs::remove_file(&path)?;
        }
        File::create(&path)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(mode & 0o7777))
    })();
    result.map_err(|source| ExtractionError::Entry { path: name, source })
}

fn entry_path<R: Read>(entry: &Entry<'_, R>) -> PathBuf {
    entry
        .path()
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| PathBuf::from(String::from_utf8_lossy(&entry.path_bytes()).into_owned()))
}

/// Join an archive path onto `dest`, refusing anything that climbs out
fn contained_path(dest: &Path, name: &Path) -> Option<PathBuf> {
    let mut path = dest.to_path_buf();
    for component in name.components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir | Component::RootDir => (),
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    if path == dest {
        None
    } else {
        Some(path)
    }
}

/// Decoding problems mean a bad archive; anything else is local I/O
fn classify(path: PathBuf, err: io::Error) -> ExtractionError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => {
            ExtractionError::Format(err)
        }
        _ => ExtractionError::Entry { path, source: err },
    }
}
