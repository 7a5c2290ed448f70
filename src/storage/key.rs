use crate::storage::ContentDigest;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use url::Url;

/// Longest encoded file name we'll use before falling back to a hash
const MAX_ENCODED_NAME: usize = 200;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum StorageKey {
    /// Downloaded content, named by its own digest
    Blob(ContentDigest),
    /// Small text file holding the digest last downloaded from a URL
    Link(Url),
}

impl StorageKey {
    pub fn to_path(&self, base_dir: &Path) -> PathBuf {
        match self {
            StorageKey::Blob(content_digest) => {
                let mut path = base_dir.to_path_buf();
                path.push("blobs");
                path.push(path_encode(content_digest.as_str()));
                path.set_extension("blob");
                path
            }
            StorageKey::Link(url) => {
                let mut path = base_dir.to_path_buf();
                path.push("links");
                let encoded = path_encode(url.as_str());
                if encoded.len() <= MAX_ENCODED_NAME {
                    path.push(encoded);
                } else {
                    path.push(format!("url-{:x}", Sha256::digest(url.as_str().as_bytes())));
                }
                path.set_extension("link");
                path
            }
        }
    }
}

/// Directory for in-progress writes, on the same filesystem as the blobs
pub fn temp_dir(base_dir: &Path) -> PathBuf {
    base_dir.join("tmp")
}

/// Encode any input string in a way which preserves uniqueness but only uses
/// lowercase alphanumeric characters and dashes.
fn path_encode(input: &str) -> String {
    let mut result = String::with_capacity(input.len() + 16);
    let mut changes = String::with_capacity(16);
    let mut in_replacement = false;
    for (idx, ch) in input.char_indices() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            in_replacement = false;
            result.push(ch)
        } else if ch.is_ascii_uppercase() {
            // Record case conversion
            in_replacement = false;
            result.push(ch.to_ascii_lowercase());
            push_base18_varint(&mut changes, idx << 1);
        } else {
            if idx > 0 && !in_replacement {
                result.push('-');
            }
            in_replacement = true;
            push_base18_varint(&mut changes, (idx << 1) | 1);
            push_base18_varint(&mut changes, ch as usize);
        }
    }
    if result.is_empty() {
        // Empty output isn't a usable file name; encode a NUL just past the end
        in_replacement = false;
        result.push('0');
        push_base18_varint(&mut changes, (input.len() << 1) | 1);
        push_base18_varint(&mut changes, 0);
    }
    if !changes.is_empty() {
        if !in_replacement {
            result.push('-');
        }
        result.push_str(&changes);
    }
    result
}

/// Variable length integer encoding using only lowercase alphanumeric chars
fn push_base18_varint(buf: &mut String, mut value: usize) {
    loop {
        let base18_digit = value % 18;
        value /= 18;
        let continue_flag = if value == 0 {
            false
        } else {
            value -= 1;
            true
        };
        let base36_digit = if continue_flag {
            18 + base18_digit
        } else {
            base18_digit
        };
        buf.push(if base36_digit < 10 {
            (b'0' + base36_digit as u8) as char
        } else {
            (b'a' + (base36_digit - 10) as u8) as char
        });
        if !continue_flag {
            break;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn base18(value: usize) -> String {
        let mut buffer = String::new();
        push_base18_varint(&mut buffer, value);
        buffer
    }

    #[test]
    fn encode_base18() {
        assert_eq!(base18(0), "0");
        assert_eq!(base18(17), "h");
        assert_eq!(base18(18), "i0");
        assert_eq!(base18(99), "r4");
        assert_eq!(base18(9999), "rwt0");
    }

    #[test]
    fn encode_paths() {
        assert_eq!(path_encode("blah"), "blah");
        assert_eq!(path_encode("blAh"), "blah-4");
        assert_eq!(path_encode("foo-bar"), "foo-bar-7r1");
        assert_eq!(path_encode("bl----ah"), "bl-ah-5r17r19r1br1");
        assert_eq!(path_encode(""), "0-10");
        assert_ne!(path_encode("a-b"), path_encode("a_b"));
    }

    #[test]
    fn storage_paths() {
        assert_eq!(
            StorageKey::Blob("sha256:00112233445566778899aabbccddeeff".parse().unwrap())
                .to_path(Path::new("root"))
                .to_str()
                .unwrap(),
            "root/blobs/sha256-00112233445566778899aabbccddeeff-dm2.blob"
        );
        assert_eq!(
            StorageKey::Link(Url::parse("https://example.com/proot-x86_64").unwrap())
                .to_path(Path::new("root"))
                .to_str()
                .unwrap(),
            "root/links/https-example-com-proot-x86-64-bm2dt1ft1v0s1l1t1x1r1n2n4.link"
        );
        assert_eq!(
            StorageKey::Link(Url::parse("file:///srv/images/base.tar.gz").unwrap())
                .to_path(Path::new("root"))
                .to_str()
                .unwrap(),
            "root/links/file-srv-images-base-tar-gz-9m2bt1dt1ft1n0t1j1t1t1s1j2s1.link"
        );
        assert_eq!(temp_dir(Path::new("root")).to_str().unwrap(), "root/tmp");
    }

    #[test]
    fn long_urls_are_hashed() {
        let url = Url::parse(&format!("https://example.com/{}", "x/".repeat(200))).unwrap();
        let path = StorageKey::Link(url).to_path(Path::new("root"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("url-"));
        assert!(name.ends_with(".link"));
        assert!(name.len() < MAX_ENCODED_NAME);
    }
}
