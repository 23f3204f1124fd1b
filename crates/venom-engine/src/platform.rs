//! Host platform naming in the Go toolchain's vocabulary.
//!
//! The tool's build procedure takes `OS=` and `ARCH=` in GOOS/GOARCH form,
//! so the Rust target names reported by `std::env::consts` are mapped here.

use serde::{Deserialize, Serialize};

/// An operating system / CPU architecture pair, Go spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform this process is running on.
    pub fn host() -> Self {
        Self::from_rust(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Linux on the host's CPU architecture. Local container engines run
    /// Linux guests even on macOS and Windows hosts, so this is what a
    /// binary for the containers must target.
    pub fn container_host() -> Self {
        Self::for_containers(std::env::consts::ARCH)
    }

    /// Linux on the given Rust `target_arch`.
    pub fn for_containers(rust_arch: &str) -> Self {
        Self::from_rust("linux", rust_arch)
    }

    /// Map Rust `target_os` / `target_arch` names to GOOS / GOARCH.
    pub fn from_rust(os: &str, arch: &str) -> Self {
        let os = match os {
            "macos" => "darwin",
            other => other,
        };
        let arch = match arch {
            "x86_64" => "amd64",
            "x86" => "386",
            "aarch64" => "arm64",
            "powerpc64" => "ppc64",
            "loongarch64" => "loong64",
            other => other,
        };
        Self::new(os, arch)
    }

    /// `<os>-<arch>`, the suffix used for per-platform build artifacts.
    pub fn suffix(&self) -> String {
        format!("{}-{}", self.os, self.arch)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rust_maps_common_targets() {
        assert_eq!(Platform::from_rust("linux", "x86_64"), Platform::new("linux", "amd64"));
        assert_eq!(Platform::from_rust("macos", "aarch64"), Platform::new("darwin", "arm64"));
        assert_eq!(Platform::from_rust("windows", "x86"), Platform::new("windows", "386"));
    }

    #[test]
    fn test_unknown_names_pass_through() {
        let p = Platform::from_rust("freebsd", "riscv64");
        assert_eq!(p.os, "freebsd");
        assert_eq!(p.arch, "riscv64");
    }

    #[test]
    fn test_suffix_and_display() {
        let p = Platform::new("linux", "arm64");
        assert_eq!(p.suffix(), "linux-arm64");
        assert_eq!(p.to_string(), "linux/arm64");
    }

    #[test]
    fn test_host_is_never_rust_spelling() {
        let p = Platform::host();
        assert_ne!(p.arch, "x86_64");
        assert_ne!(p.arch, "aarch64");
        assert_ne!(p.os, "macos");
    }

    #[test]
    fn test_container_platform_is_linux() {
        assert_eq!(Platform::for_containers("aarch64"), Platform::new("linux", "arm64"));
        assert_eq!(Platform::for_containers("x86_64"), Platform::new("linux", "amd64"));
        assert_eq!(Platform::container_host().os, "linux");
    }
}
