//! API version helpers.
//!
//! Versions are dotted strings (`"2.1.0"`). Two peers are compatible when
//! their strings match exactly or, failing that, when their major
//! components match.

/// The API version spoken by this build.
pub const API_VERSION: &str = "1.0.0";

/// Returns the API version spoken by this build.
pub fn api_version() -> &'static str {
    API_VERSION
}

/// Returns the major component of a version string.
///
/// The major component is the substring before the first `.`; a string
/// with no `.` is its own major component.
pub fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

/// Returns true if two version strings are compatible.
pub fn is_compatible(local: &str, remote: &str) -> bool {
    local == remote || major(local) == major(remote)
}
