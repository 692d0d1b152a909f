//! Target platforms a lift manifest can be assembled for.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// Environment variable that pins the current platform.
///
/// The science scie seals in the platform determined by the scie-jump so a
/// binary running under emulation still reports its real target.
pub const CURRENT_PLATFORM_ENV: &str = "__SCIENCE_CURRENT_PLATFORM__";

/// An operating system and machine pair supported by the native assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Platform {
    /// 64-bit ARM Linux.
    LinuxAarch64,
    /// 32-bit ARMv7 Linux.
    LinuxArmv7l,
    /// Little-endian 64-bit POWER Linux.
    LinuxPowerpc64le,
    /// IBM Z Linux.
    LinuxS390x,
    /// 64-bit x86 Linux.
    LinuxX86_64,
    /// Apple silicon macOS.
    MacosAarch64,
    /// Intel macOS.
    MacosX86_64,
    /// 64-bit ARM Windows.
    WindowsAarch64,
    /// 64-bit x86 Windows.
    WindowsX86_64,
}

impl Platform {
    /// Every supported platform in a stable order.
    pub const ALL: [Self; 9] = [
        Self::LinuxAarch64,
        Self::LinuxArmv7l,
        Self::LinuxPowerpc64le,
        Self::LinuxS390x,
        Self::LinuxX86_64,
        Self::MacosAarch64,
        Self::MacosX86_64,
        Self::WindowsAarch64,
        Self::WindowsX86_64,
    ];

    /// Returns the canonical string form, e.g. `linux-x86_64`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LinuxAarch64 => "linux-aarch64",
            Self::LinuxArmv7l => "linux-armv7l",
            Self::LinuxPowerpc64le => "linux-powerpc64",
            Self::LinuxS390x => "linux-s390x",
            Self::LinuxX86_64 => "linux-x86_64",
            Self::MacosAarch64 => "macos-aarch64",
            Self::MacosX86_64 => "macos-x86_64",
            Self::WindowsAarch64 => "windows-aarch64",
            Self::WindowsX86_64 => "windows-x86_64",
        }
    }

    /// Parses a platform name, accepting `current` for the host platform.
    ///
    /// # Errors
    ///
    /// Returns an [`InputError`] for unknown names or an unsupported host.
    pub fn parse(value: &str) -> Result<Self, InputError> {
        if value == "current" {
            return Self::current();
        }
        Self::ALL
            .into_iter()
            .find(|platform| platform.as_str() == value)
            .ok_or_else(|| InputError::new(format!("Unknown platform {value:?}.")))
    }

    /// Determines the platform of the running process.
    ///
    /// # Errors
    ///
    /// Returns an [`InputError`] when the OS / machine pair is unsupported or
    /// the pinning environment variable names an unknown platform.
    pub fn current() -> Result<Self, InputError> {
        if let Ok(pinned) = std::env::var(CURRENT_PLATFORM_ENV) {
            if !pinned.is_empty() && pinned != "current" {
                return Self::parse(&pinned);
            }
        }
        Self::from_os_arch(std::env::consts::OS, std::env::consts::ARCH)
    }

    fn from_os_arch(os: &str, arch: &str) -> Result<Self, InputError> {
        match (os, arch) {
            ("linux", "aarch64" | "arm64") => Ok(Self::LinuxAarch64),
            ("linux", "arm" | "armv7l" | "armv8l") => Ok(Self::LinuxArmv7l),
            ("linux", "powerpc64" | "ppc64le") => Ok(Self::LinuxPowerpc64le),
            ("linux", "s390x") => Ok(Self::LinuxS390x),
            ("linux", "x86_64" | "amd64") => Ok(Self::LinuxX86_64),
            ("macos", "aarch64" | "arm64") => Ok(Self::MacosAarch64),
            ("macos", "x86_64" | "amd64") => Ok(Self::MacosX86_64),
            ("windows", "aarch64" | "arm64") => Ok(Self::WindowsAarch64),
            ("windows", "x86_64" | "amd64") => Ok(Self::WindowsX86_64),
            _ => Err(InputError::new(format!(
                "The current operating system / machine pair is not supported!: {os} / {arch}"
            ))),
        }
    }

    /// Returns `true` for Windows targets.
    #[must_use]
    pub const fn is_windows(self) -> bool {
        matches!(self, Self::WindowsAarch64 | Self::WindowsX86_64)
    }

    /// Executable file extension for this platform.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        if self.is_windows() { ".exe" } else { "" }
    }

    /// Returns `name` with the platform's executable extension.
    #[must_use]
    pub fn binary_name(self, name: &str) -> String {
        format!("{name}{}", self.extension())
    }

    /// Returns `name` suffixed with the platform, e.g. `ptex-linux-x86_64`.
    #[must_use]
    pub fn qualified_binary_name(self, name: &str) -> String {
        format!("{name}-{}{}", self.as_str(), self.extension())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Platform {
    type Error = InputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Platform> for String {
    fn from(value: Platform) -> Self {
        value.as_str().to_owned()
    }
}
