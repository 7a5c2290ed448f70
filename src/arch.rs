//! CPU architectures we have prebuilt engines and base images for

use crate::errors::SetupError;
use std::{ffi::CStr, fmt, str::FromStr};

/// A supported target architecture
///
/// Engine builds are published under the kernel's machine name, while base
/// images use the Debian-style name, so both spellings are kept here.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "aarch64")]
    Aarch64,
}

impl Architecture {
    /// Detect the running machine's architecture via `uname`
    pub fn detect() -> Result<Self, SetupError> {
        machine_name()?.parse()
    }

    /// Kernel machine name, as in `uname -m`
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::X86_64 => "x86_64",
            Architecture::Aarch64 => "aarch64",
        }
    }

    /// Alternate name used by Debian and Ubuntu packaging
    pub fn alt_name(&self) -> &'static str {
        match self {
            Architecture::X86_64 => "amd64",
            Architecture::Aarch64 => "arm64",
        }
    }
}

impl FromStr for Architecture {
    type Err = SetupError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86_64" => Ok(Architecture::X86_64),
            "aarch64" => Ok(Architecture::Aarch64),
            other => Err(SetupError::UnsupportedArchitecture(other.to_owned())),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn machine_name() -> Result<String, SetupError> {
    let mut uts = std::mem::MaybeUninit::<libc::utsname>::zeroed();
    if unsafe { libc::uname(uts.as_mut_ptr()) } != 0 {
        return Err(SetupError::Storage(std::io::Error::last_os_error()));
    }
    let uts = unsafe { uts.assume_init() };
    let machine = unsafe { CStr::from_ptr(uts.machine.as_ptr()) };
    Ok(machine.to_string_lossy().into_owned())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn supported_names() {
        let x86: Architecture = "x86_64".parse().unwrap();
        assert_eq!(x86, Architecture::X86_64);
        assert_eq!(x86.alt_name(), "amd64");
        let arm: Architecture = "aarch64".parse().unwrap();
        assert_eq!(arm, Architecture::Aarch64);
        assert_eq!(arm.alt_name(), "arm64");
    }

    #[test]
    fn unsupported_names() {
        for name in &["armv7l", "i686", "riscv64", "amd64", "arm64", "", "X86_64"] {
            match name.parse::<Architecture>() {
                Err(SetupError::UnsupportedArchitecture(found)) => assert_eq!(&found, name),
                other => panic!("{:?} parsed as {:?}", name, other),
            }
        }
    }

    #[test]
    fn detect_matches_build_target() {
        match Architecture::detect() {
            Ok(arch) => assert_eq!(arch.as_str(), std::env::consts::ARCH),
            Err(SetupError::UnsupportedArchitecture(_)) => (),
            Err(other) => panic!("uname failed: {}", other),
        }
    }
}
