//! Artifact schema versioning and compatibility.

/// Current schema version of the model and evaluation artifacts.
///
/// Follows semver: MAJOR.MINOR.PATCH
/// - MAJOR: Breaking changes (field removals, type changes)
/// - MINOR: Additive changes (new optional fields)
/// - PATCH: Bug fixes, documentation
pub const ARTIFACT_SCHEMA_VERSION: &str = "1.0.0";

/// Check if an artifact version is compatible with current.
pub fn is_compatible(version: &str) -> bool {
    major(ARTIFACT_SCHEMA_VERSION) == major(version)
}

fn major(version: &str) -> Option<u32> {
    version.split('.').next().and_then(|s| s.parse::<u32>().ok())
}
