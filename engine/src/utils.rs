//! Utility functions

use serde::{Deserialize, Serialize};

/// Version information for the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Abbreviate a commit hash for log output
///
/// The input comes from user-supplied arguments, so the cut must land on
/// a character boundary.
pub fn short_commit(hash: &str) -> &str {
    match hash.char_indices().nth(8) {
        Some((idx, _)) => &hash[..idx],
        None => hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_commit() {
        assert_eq!(short_commit("abc123de4567"), "abc123de");
        assert_eq!(short_commit("abc"), "abc");
    }

    #[test]
    fn test_short_commit_multibyte_input() {
        assert_eq!(short_commit("αβγδεζηθικλ"), "αβγδεζηθ");
        assert_eq!(short_commit("αβγ"), "αβγ");
    }
}
