//! Platform detection
//!
//! Provides OS and architecture information using standard Unix conventions:
//! - macOS → `"darwin"` (kernel name)
//! - Linux → `"linux"`
//! - Windows → `"windows"`
//!
//! Platform info is cached on first access.

use std::sync::LazyLock;

/// Current platform information (cached)
///
/// # Example
/// ```
/// use settle_core::platform::CURRENT_PLATFORM;
///
/// let label = format!("{}-{}", CURRENT_PLATFORM.os, CURRENT_PLATFORM.arch);
/// assert!(!label.is_empty());
/// ```
pub static CURRENT_PLATFORM: LazyLock<Platform> = LazyLock::new(Platform::detect);

/// Platform information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// OS: "darwin" (macOS), "linux", "windows", "unknown"
    pub os: &'static str,
    /// CPU architecture: "x86_64", "aarch64", etc.
    pub arch: &'static str,
}

impl Platform {
    pub fn detect() -> Self {
        Self {
            os: Self::detect_os(),
            arch: std::env::consts::ARCH,
        }
    }

    pub fn is_linux(&self) -> bool {
        self.os == "linux"
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    const fn detect_os() -> &'static str {
        #[cfg(target_os = "macos")]
        {
            "darwin"
        }

        #[cfg(target_os = "linux")]
        {
            "linux"
        }

        #[cfg(target_os = "windows")]
        {
            "windows"
        }

        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            "unknown"
        }
    }
}
