//! Build metadata embedded by the build script.

/// The git commit hash at build time (short form).
pub const GIT_HASH: &str = env!("SYNCMATE_GIT_HASH");

/// The build profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("SYNCMATE_BUILD_PROFILE");

/// The crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `User-Agent` value sent with every daemon request, e.g. `syncmate/0.1.0 (abc1234)`.
pub fn user_agent() -> String {
    format!("syncmate/{VERSION} ({GIT_HASH})")
}

/// Version string for `--version` style output, e.g. `0.1.0 (abc1234, debug)`.
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}
