//! Shell profile configuration for automatic PATH setup.
//!
//! Picks the user's shell profile and appends a guarded block that puts the
//! install directory on `PATH`. The decision itself lives in the pure
//! [`register_path`] function; [`configure_path`] only reads and appends.
//!
//! ## Profile Selection
//!
//! | Shell         | Candidates (first existing wins, else the first is created) |
//! |---------------|-------------------------------------------------------------|
//! | zsh           | `~/.zshrc`, `~/.zprofile`                                   |
//! | bash (macOS)  | `~/.bash_profile`, `~/.bashrc`, `~/.profile`                |
//! | bash          | `~/.bashrc`, `~/.bash_profile`, `~/.profile`                |
//! | fish          | `~/.config/fish/config.fish`                                |
//! | anything else | `~/.profile`                                                |
//!
//! ## Configuration Format
//!
//! For POSIX shells:
//! ```bash
//! # Harbor compiler
//! export PATH="/home/user/.harbor/bin:$PATH"
//! ```
//!
//! For fish:
//! ```fish
//! # Harbor compiler
//! fish_add_path /home/user/.harbor/bin
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::toolchain::platform::Os;
use crate::toolchain::request::{HostEnv, InstallRequest};

/// Marker comment introducing the PATH block.
const PATH_MARKER: &str = "# Harbor compiler";

/// Shell families with distinct profile files or syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    /// `sh`, `dash`, `ksh` or an unknown shell; configured through `~/.profile`.
    Posix,
}

impl Shell {
    /// Identifies a shell from a path such as `/bin/zsh`.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        match name {
            "bash" => Self::Bash,
            "zsh" => Self::Zsh,
            "fish" => Self::Fish,
            _ => Self::Posix,
        }
    }

    /// Profile files to consider, in order of preference.
    #[must_use]
    pub fn profile_candidates(self, home_dir: &Path, os: Os) -> Vec<PathBuf> {
        match self {
            Self::Zsh => vec![home_dir.join(".zshrc"), home_dir.join(".zprofile")],
            Self::Bash if os == Os::Macos => vec![
                home_dir.join(".bash_profile"),
                home_dir.join(".bashrc"),
                home_dir.join(".profile"),
            ],
            Self::Bash => vec![
                home_dir.join(".bashrc"),
                home_dir.join(".bash_profile"),
                home_dir.join(".profile"),
            ],
            Self::Fish => vec![home_dir.join(".config").join("fish").join("config.fish")],
            Self::Posix => vec![home_dir.join(".profile")],
        }
    }

    /// Generates the guarded PATH block for this shell.
    #[must_use]
    pub fn path_config(self, bin_path: &Path) -> String {
        format!("\n{PATH_MARKER}\n{}\n", self.path_statement(bin_path))
    }

    /// The statement that prepends `bin_path` to `PATH`.
    ///
    /// Properly escapes special characters in paths:
    /// - For POSIX shells: escapes `$`, backticks, `"`, and `\` within double quotes
    /// - For Fish: uses single quotes for paths containing special characters
    #[must_use]
    pub fn path_statement(self, bin_path: &Path) -> String {
        match self {
            Self::Bash | Self::Zsh | Self::Posix => {
                let escaped_path = bin_path
                    .display()
                    .to_string()
                    .replace('\\', "\\\\")
                    .replace('$', "\\$")
                    .replace('`', "\\`")
                    .replace('"', "\\\"");
                format!("export PATH=\"{escaped_path}:$PATH\"")
            }
            Self::Fish => {
                let path_str = bin_path.display().to_string();
                let needs_quotes = path_str.chars().any(|c| {
                    matches!(
                        c,
                        ' ' | '$' | '\\' | '\'' | '*' | '?' | '(' | ')' | '[' | ']' | '{' | '}'
                    )
                });
                let formatted_path = if needs_quotes {
                    format!("'{}'", path_str.replace('\'', "\\'"))
                } else {
                    path_str
                };
                format!("fish_add_path {formatted_path}")
            }
        }
    }

    /// Command that reloads `profile_path` in the current session.
    #[must_use]
    pub fn source_command(self, profile_path: &Path) -> String {
        match self {
            Self::Posix => format!(". {}", profile_path.display()),
            Self::Bash | Self::Zsh | Self::Fish => format!("source {}", profile_path.display()),
        }
    }
}

/// Returns `contents` with the PATH block for `install_dir` appended, or
/// `None` when `contents` already mentions the install directory, either
/// verbatim or as the escaped statement this function writes.
#[must_use]
pub fn register_path(contents: &str, install_dir: &Path, shell: Shell) -> Option<String> {
    let dir = install_dir.display().to_string();
    if contents.contains(&dir) || contents.contains(&shell.path_statement(install_dir)) {
        return None;
    }
    Some(format!("{contents}{}", shell.path_config(install_dir)))
}

/// Returns the first existing candidate, or the first candidate if none exist.
#[must_use]
pub fn select_profile(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|p| p.is_file())
        .or_else(|| candidates.first())
        .cloned()
}

/// What [`configure_path`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStatus {
    /// The block was appended to `profile`.
    Registered {
        profile: PathBuf,
        source_command: String,
    },
    /// `profile` already mentions the install directory.
    AlreadyConfigured { profile: PathBuf },
    /// The install directory is already on the current `PATH`.
    AlreadyOnPath,
    /// Suppressed by `--no-modify-path`.
    Skipped,
    /// No home directory, so no profile could be chosen.
    NoProfile,
    /// The profile could not be read or written.
    Failed { reason: String },
}

impl PathStatus {
    /// Returns a human-readable message describing the outcome.
    #[must_use]
    pub fn message(&self, bin_path: &Path) -> String {
        match self {
            Self::Registered {
                profile,
                source_command,
            } => format!(
                "Added {} to PATH in {}\nRun '{source_command}' or open a new terminal to use harbor.",
                bin_path.display(),
                profile.display()
            ),
            Self::AlreadyConfigured { profile } => {
                format!("PATH already configured in {}", profile.display())
            }
            Self::AlreadyOnPath => format!("{} is already on PATH", bin_path.display()),
            Self::Skipped => format!(
                "PATH not modified. To use harbor, add to your PATH:\n  {}",
                manual_path_instruction(bin_path)
            ),
            Self::NoProfile => format!(
                "Could not find a shell profile. To use harbor, add to your PATH:\n  {}",
                manual_path_instruction(bin_path)
            ),
            Self::Failed { reason } => format!(
                "Could not configure PATH automatically ({reason}). \
                 To use harbor, add to your PATH:\n  {}",
                manual_path_instruction(bin_path)
            ),
        }
    }
}

/// Returns the manual PATH configuration instruction.
#[must_use]
pub fn manual_path_instruction(bin_path: &Path) -> String {
    format!("export PATH=\"{}:$PATH\"", bin_path.display())
}

/// Registers the install directory in the user's shell profile.
///
/// Does nothing when PATH modification is disabled or the directory is
/// already on `PATH`. Otherwise appends the block to the selected profile,
/// creating it (and its parent directory) if needed, unless the profile
/// already mentions the directory.
///
/// # Errors
///
/// Returns an error if the profile cannot be read or written.
pub fn configure_path(request: &InstallRequest, host: &HostEnv, os: Os) -> Result<PathStatus> {
    if request.skip_path_modification {
        return Ok(PathStatus::Skipped);
    }
    if host.path_contains(&request.install_dir) {
        return Ok(PathStatus::AlreadyOnPath);
    }

    let shell = Shell::from_path(host.shell.as_deref().unwrap_or_default());
    let Some(home_dir) = &host.home else {
        return Ok(PathStatus::NoProfile);
    };
    let Some(profile) = select_profile(&shell.profile_candidates(home_dir, os)) else {
        return Ok(PathStatus::NoProfile);
    };

    let contents = if profile.is_file() {
        std::fs::read_to_string(&profile)
            .with_context(|| format!("Failed to read profile: {}", profile.display()))?
    } else {
        String::new()
    };

    let Some(updated) = register_path(&contents, &request.install_dir, shell) else {
        return Ok(PathStatus::AlreadyConfigured { profile });
    };

    append_to_file(&profile, &updated[contents.len()..])?;

    let source_command = shell.source_command(&profile);
    Ok(PathStatus::Registered {
        profile,
        source_command,
    })
}

/// Appends content to a file, creating it and its parent directory.
fn append_to_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open profile for writing: {}", path.display()))?;

    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write to profile: {}", path.display()))?;

    Ok(())
}
