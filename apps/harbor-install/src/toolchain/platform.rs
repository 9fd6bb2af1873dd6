//! Platform detection for the Harbor installer.
//!
//! Maps raw kernel-name and machine-architecture strings (as printed by
//! `uname -s` / `uname -m`, or as reported by the Rust standard library) to
//! a normalized [`PlatformInfo`]. Detection is a fixed table lookup with no
//! filesystem or network access.
//!
//! ## Supported Platforms
//!
//! | Kernel                                        | OS        |
//! |-----------------------------------------------|-----------|
//! | `Linux`                                       | `linux`   |
//! | `Darwin`, `macos`                             | `macos`   |
//! | `Windows_NT`, `windows`, `MINGW*`, `MSYS*`, `CYGWIN*` | `windows` |
//!
//! | Machine                          | Arch      |
//! |----------------------------------|-----------|
//! | `x86_64`, `amd64`, `x64`         | `x86_64`  |
//! | `aarch64`, `arm64`               | `aarch64` |
//! | `armv7l`, `armv7`, `armhf`, `arm`| `armv7`   |

use std::fmt;

use crate::errors::InstallerError;

/// Operating system family of a supported platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    Macos,
    Windows,
}

impl Os {
    /// Returns the identifier used in target triples and asset names.
    #[must_use = "returns the OS string without side effects"]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Macos => "macos",
            Self::Windows => "windows",
        }
    }
}

/// CPU architecture of a supported platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Aarch64,
    Armv7,
}

impl Arch {
    /// Returns the identifier used in target triples and asset names.
    #[must_use = "returns the architecture string without side effects"]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
            Self::Armv7 => "armv7",
        }
    }
}

/// Kernel names matched exactly (case-insensitive).
const KERNEL_TABLE: &[(&str, Os)] = &[
    ("linux", Os::Linux),
    ("darwin", Os::Macos),
    ("macos", Os::Macos),
    ("windows", Os::Windows),
    ("windows_nt", Os::Windows),
];

/// Kernel name prefixes reported by the POSIX layers on Windows
/// (e.g. `MINGW64_NT-10.0-19045`).
const KERNEL_PREFIX_TABLE: &[(&str, Os)] = &[
    ("mingw", Os::Windows),
    ("msys", Os::Windows),
    ("cygwin", Os::Windows),
];

/// Machine architecture names, including their aliases.
const MACHINE_TABLE: &[(&str, Arch)] = &[
    ("x86_64", Arch::X86_64),
    ("amd64", Arch::X86_64),
    ("x64", Arch::X86_64),
    ("aarch64", Arch::Aarch64),
    ("arm64", Arch::Aarch64),
    ("armv7l", Arch::Armv7),
    ("armv7", Arch::Armv7),
    ("armhf", Arch::Armv7),
    ("arm", Arch::Armv7),
];

/// Normalized description of the machine the installer runs on.
///
/// Derived once per run and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    pub os: Os,
    pub arch: Arch,
    /// `{arch}-{os}`, e.g. `x86_64-linux`.
    pub target_triple: String,
}

impl PlatformInfo {
    /// Resolves raw kernel and machine strings through the lookup tables.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::UnsupportedPlatform`] if either string is
    /// not recognized.
    pub fn from_raw(kernel: &str, machine: &str) -> Result<Self, InstallerError> {
        let unsupported = || InstallerError::unsupported_platform(kernel, machine);
        let os = lookup_os(kernel).ok_or_else(unsupported)?;
        let arch = lookup_arch(machine).ok_or_else(unsupported)?;

        Ok(Self {
            os,
            arch,
            target_triple: format!("{}-{}", arch.as_str(), os.as_str()),
        })
    }

    /// Detects the current platform from the values compiled into the
    /// standard library.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::UnsupportedPlatform`] when running on an
    /// OS or architecture outside the table.
    pub fn detect() -> Result<Self, InstallerError> {
        Self::from_raw(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Returns the executable file extension for this platform.
    ///
    /// Returns `.exe` on Windows, empty string elsewhere.
    #[must_use = "returns the extension string without side effects"]
    pub fn executable_extension(&self) -> &'static str {
        match self.os {
            Os::Windows => ".exe",
            Os::Linux | Os::Macos => "",
        }
    }

    /// Returns the archive extension used for packaged bundles.
    #[must_use = "returns the extension string without side effects"]
    pub fn archive_extension(&self) -> &'static str {
        match self.os {
            Os::Windows => "zip",
            Os::Linux | Os::Macos => "tar.gz",
        }
    }

    /// Returns whether this platform is Windows.
    #[must_use = "returns platform check result without side effects"]
    pub fn is_windows(&self) -> bool {
        matches!(self.os, Os::Windows)
    }

    /// Returns the canonical file name of the given binary on this platform.
    #[must_use]
    pub fn binary_file_name(&self, name: &str) -> String {
        format!("{name}{}", self.executable_extension())
    }
}

impl fmt::Display for PlatformInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.target_triple)
    }
}

fn lookup_os(kernel: &str) -> Option<Os> {
    let kernel = kernel.trim().to_ascii_lowercase();
    KERNEL_TABLE
        .iter()
        .find(|(name, _)| *name == kernel)
        .or_else(|| {
            KERNEL_PREFIX_TABLE
                .iter()
                .find(|(prefix, _)| kernel.starts_with(*prefix))
        })
        .map(|(_, os)| *os)
}

fn lookup_arch(machine: &str) -> Option<Arch> {
    let machine = machine.trim().to_ascii_lowercase();
    MACHINE_TABLE
        .iter()
        .find(|(name, _)| *name == machine)
        .map(|(_, arch)| *arch)
}
