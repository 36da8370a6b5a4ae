use std::path::{Path, PathBuf};

/// Platform-specific operations abstracted behind a common interface.
/// Each OS provides its own `NativePlatform` implementation so call sites
/// remain free of `#[cfg]` blocks.
pub trait Platform {
    /// Ask the process identified by `pid` to terminate gracefully
    /// (`SIGTERM` on Unix, `taskkill` without `/F` on Windows).
    fn terminate_process(pid: u32) -> std::io::Result<()>;

    /// Set restrictive *directory* permissions (0o700 on Unix, no-op on Windows).
    fn restrict_dir_permissions(path: &Path);

    /// Set restrictive *file* permissions (0o600 on Unix, no-op on Windows).
    fn restrict_file_permissions(path: &Path);

    /// Binary filename for this platform (`"trackd"` / `"trackd.exe"`).
    fn binary_name() -> &'static str;

    /// Root data directory for trackd.
    /// Unix: `~/.trackd`, Windows: `%APPDATA%\trackd`.
    fn data_dir() -> PathBuf;
}

/// Environment variable that overrides the platform default data root.
pub const DATA_DIR_ENV: &str = "TRACKD_DATA_DIR";

/// Apply the `TRACKD_DATA_DIR` override to a platform default.
pub fn resolve_data_dir(default: PathBuf) -> PathBuf {
    match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => default,
    }
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::NativePlatform;
