//! Error kinds for the extraction pipeline.
//!
//! Each stage has its own error type so the absorption rules stay visible in
//! the signatures:
//!
//! | Error | Raised by | Recovered where |
//! |-------|-----------|-----------------|
//! | [`FetchError`] | transport | orchestrator (source marked fetch-failed) |
//! | [`ParseError`] | parsers | orchestrator (source marked parse-failed) |
//! | [`MalformedRecord`] | [`crate::models::Meeting::new`] | parsers (row skipped and counted) |
//! | [`ConfigurationError`] | resolver / delivery setup | main (pipeline skipped) |
//!
//! Only [`ConfigurationError`] and [`RegistryError`] ever reach the process
//! boundary.

use thiserror::Error;

/// A source could not be retrieved.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} returned an empty body")]
    EmptyBody { url: String },

    #[error("source timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("rendered fetch of {url} needs a render endpoint")]
    RendererUnavailable { url: String },
}

/// A page was retrieved but its overall structure was not what the parser
/// for its CMS family expects. Individual bad rows never produce this.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected page structure: {0}")]
    Structure(String),

    #[error("page has not finished rendering")]
    NotRendered,
}

/// Meeting construction rejected its input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedRecord {
    #[error("meeting title is empty")]
    EmptyTitle,

    #[error("organization name is empty")]
    EmptyOrganization,

    #[error("source identifier is empty")]
    EmptySource,

    #[error("unresolvable date {0:?}")]
    UnresolvableDate(String),
}

/// A pipeline references something that does not exist. Fatal for that
/// pipeline only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("pipeline {pipeline} selects no groups")]
    NoGroups { pipeline: String },

    #[error("pipeline {pipeline} references unknown group {group}")]
    UnknownGroup { pipeline: String, group: String },

    #[error("pipeline {pipeline} has no destination reference")]
    MissingDestination { pipeline: String },

    #[error("pipeline {pipeline}: environment variable {env} is not set")]
    UnresolvedDestination { pipeline: String, env: String },
}

/// The registry or pipeline file could not be loaded.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("duplicate source id {0}")]
    DuplicateSource(String),

    #[error("duplicate pipeline name {0}")]
    DuplicatePipeline(String),

    #[error("source {0} has no groups")]
    NoGroups(String),

    #[error("source {id} has an invalid url {url:?}")]
    InvalidUrl { id: String, url: String },

    #[error("source {0} declares pagination with max_pages = 0")]
    InvalidPagination(String),
}

/// Delivery of a rendered message failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook answered with HTTP {0}")]
    Status(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_names_the_pipeline() {
        let e = ConfigurationError::UnknownGroup {
            pipeline: "utvidet".to_string(),
            group: "vest".to_string(),
        };
        assert_eq!(e.to_string(), "pipeline utvidet references unknown group vest");
    }

    #[test]
    fn test_fetch_error_display() {
        let e = FetchError::Status {
            url: "https://example.com".to_string(),
            status: 503,
        };
        assert!(e.to_string().contains("503"));
    }
}
