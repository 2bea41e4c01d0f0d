//! Static language table for build environments

use crate::errors::EngineError;

/// Build environment and default command for one supported language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageSpec {
    /// Language key
    pub key: &'static str,

    /// Container image the build runs in
    pub image: &'static str,

    /// Default build command when the project has no override
    pub build_command: &'static str,
}

const LANGUAGES: &[LanguageSpec] = &[
    LanguageSpec {
        key: "java",
        image: "openjdk:11-jdk-slim",
        build_command: "mvn clean package -DskipTests",
    },
    LanguageSpec {
        key: "python",
        image: "python:3.9-slim",
        build_command: "python -m pip install -r requirements.txt",
    },
    LanguageSpec {
        key: "node",
        image: "node:16-alpine",
        build_command: "npm install && npm run build",
    },
    LanguageSpec {
        key: "go",
        image: "golang:1.19-alpine",
        build_command: "go mod download && go build -o app main.go",
    },
];

/// Look up a language key, case-insensitively
///
/// An unknown key is a configuration error raised before any build
/// environment is started.
pub fn lookup(language: &str) -> Result<&'static LanguageSpec, EngineError> {
    let key = language.to_lowercase();
    LANGUAGES
        .iter()
        .find(|spec| spec.key == key)
        .ok_or_else(|| EngineError::ConfigError(format!("unsupported language: {}", language)))
}
