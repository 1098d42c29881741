//! Version information for this app.

/// Crate version, set by the build from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commit hash, set by the build scripts via `EDGESTORE_COMMIT`.
pub const COMMIT_HASH: Option<&str> = option_env!("EDGESTORE_COMMIT");

/// Print version information to stdout.
pub fn print(description: &str) {
    println!("{description}");
    println!("OS/ARCH: {} {}", std::env::consts::OS, std::env::consts::ARCH);
    println!("Commit: {}", COMMIT_HASH.unwrap_or(""));
    println!("Version: {VERSION}");
}
