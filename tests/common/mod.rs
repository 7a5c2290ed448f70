#![allow(dead_code)]

use flate2::{write::GzEncoder, Compression};
use freeroot::{Architecture, Sandbox, SandboxBuilder};
use std::{
    collections::BTreeMap,
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    time::Duration,
};
use tar::{Builder, EntryType, Header};
use tempfile::TempDir;
use url::Url;

/// Stands in for proot: drops the engine options and runs the rest
pub const FAKE_ENGINE: &str = r#"#!/bin/sh
if [ -n "$FAKE_ENGINE_LOG" ]; then
    for arg in "$@"; do printf '%s\n' "$arg"; done > "$FAKE_ENGINE_LOG"
fi
while [ $# -gt 0 ]; do
    case "$1" in
        --rootfs=*|-0|--kill-on-exit) shift ;;
        -w|-b) shift 2 ;;
        *) break ;;
    esac
done
exec "$@"
"#;

/// Scratch directory with local sources for the base image and engine
pub struct Fixture {
    pub dir: TempDir,
    pub archive: PathBuf,
    pub engine: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("sources/ubuntu-base.tar.gz");
        let engine = dir.path().join("sources/proot");
        fs::create_dir_all(dir.path().join("sources")).unwrap();
        fs::write(&archive, base_image()).unwrap();
        fs::write(&engine, FAKE_ENGINE).unwrap();
        Fixture {
            dir,
            archive,
            engine,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("rootfs")
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Sandbox settings pointing at this fixture, with no download cache
    pub fn builder(&self) -> SandboxBuilder {
        Sandbox::builder()
            .root_dir(self.root())
            .arch(Architecture::X86_64)
            .rootfs_url(file_url(&self.archive).as_str())
            .engine_url(file_url(&self.engine).as_str())
            .ephemeral_cache()
            .retries(2)
            .retry_delay(Duration::from_millis(0))
            .shell("sh")
    }

    pub fn sandbox(&self) -> Sandbox {
        self.builder().build().unwrap()
    }

    pub fn remove_sources(&self) {
        fs::remove_dir_all(self.dir.path().join("sources")).unwrap();
    }
}

pub fn file_url(path: &Path) -> Url {
    Url::from_file_path(path).unwrap()
}

/// A tiny Ubuntu-shaped tree
pub fn base_image() -> Vec<u8> {
    let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut add = |kind: EntryType, path: &str, mode: u32, data: &[u8]| {
        let mut header = Header::new_gnu();
        header.set_entry_type(kind);
        header.set_mode(mode);
        header.set_size(data.len() as u64);
        header.set_mtime(1_650_000_000);
        builder.append_data(&mut header, path, data).unwrap();
    };
    add(EntryType::Directory, "bin/", 0o755, b"");
    add(EntryType::Directory, "etc/", 0o755, b"");
    add(EntryType::Directory, "root/", 0o700, b"");
    add(EntryType::Directory, "tmp/", 0o1777, b"");
    add(EntryType::Directory, "usr/local/bin/", 0o755, b"");
    add(EntryType::Regular, "etc/os-release", 0o644, b"NAME=\"Ubuntu\"\nVERSION_ID=\"20.04\"\n");
    add(EntryType::Regular, "bin/hello", 0o755, b"#!/bin/sh\necho hello\n");
    add(EntryType::Regular, "etc/shadow", 0o640, b"root:*:19000:0:99999:7:::\n");

    let mut link = |path: &str, target: &str| {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_mode(0o777);
        header.set_size(0);
        builder.append_link(&mut header, path, target).unwrap();
    };
    link("etc/resolv.conf", "../run/systemd/resolve/stub-resolv.conf");
    link("usr/bin", "../bin");

    builder.into_inner().unwrap().finish().unwrap()
}

/// Everything about a tree except timestamps, keyed by relative path
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, String> {
    let mut map = BTreeMap::new();
    snapshot_into(root, root, &mut map);
    map
}

fn snapshot_into(root: &Path, dir: &Path, map: &mut BTreeMap<PathBuf, String>) {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    entries.sort();
    for path in entries {
        let metadata = fs::symlink_metadata(&path).unwrap();
        let mode = metadata.permissions().mode() & 0o7777;
        let relative = path.strip_prefix(root).unwrap().to_path_buf();
        let description = if metadata.file_type().is_symlink() {
            format!("link -> {:?}", fs::read_link(&path).unwrap())
        } else if metadata.is_dir() {
            snapshot_into(root, &path, map);
            format!("dir {:o}", mode)
        } else {
            format!("file {:o} {:?}", mode, fs::read(&path).unwrap())
        };
        map.insert(relative, description);
    }
}
