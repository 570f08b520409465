//! Connection configuration.
//!
//! A [`Config`] is a plain value naming the server URLs to connect to and the
//! database to work in. Nothing here is validated: an empty URL list is accepted
//! and left for the backend to reject when it tries to connect.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// URL used by [`Config::local`].
pub const LOCAL_URL: &str = "http://localhost:8080";

/// Connection settings for a database service.
///
/// # Example
///
/// ```ignore
/// use ravenlayer::config::Config;
///
/// let local = Config::local("ExampleDB");
/// assert_eq!(local.urls, vec!["http://localhost:8080".to_string()]);
///
/// let cluster = Config::new(
///     vec!["http://node-a:8080".into(), "http://node-b:8080".into()],
///     "Orders",
/// );
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Server URLs, in the order the backend should try them.
    pub urls: Vec<String>,
    /// Name of the database every session is opened against.
    pub database: String,
}

impl Config {
    /// Creates a configuration from an explicit list of node URLs.
    pub fn new(urls: Vec<String>, database: impl Into<String>) -> Self {
        Self {
            urls,
            database: database.into(),
        }
    }

    /// Creates a configuration for a single-node setup.
    pub fn single_node(url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            database: database.into(),
        }
    }

    /// Creates a configuration pointing at a server on the loopback interface.
    pub fn local(database: impl Into<String>) -> Self {
        Self::single_node(LOCAL_URL, database)
    }

    /// Parses a configuration from TOML text.
    ///
    /// The settings are read from a `[database]` table:
    ///
    /// ```toml
    /// [database]
    /// urls = ["http://localhost:8080"]
    /// database = "TestDB"
    /// ```
    ///
    /// Other tables in the document are ignored.
    pub fn from_toml_str(input: &str) -> DocumentStoreResult<Self> {
        #[derive(Deserialize)]
        struct ConfigFile {
            database: Config,
        }

        Ok(toml::from_str::<ConfigFile>(input)?.database)
    }

    /// Reads and parses a TOML configuration file. See [`Config::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> DocumentStoreResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            DocumentStoreError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;

        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_build_expected_url_lists() {
        assert_eq!(
            Config::local("Dev"),
            Config::new(vec!["http://localhost:8080".into()], "Dev")
        );
        assert_eq!(Config::single_node("http://db:8080", "Prod").urls, vec!["http://db:8080"]);
        assert!(Config::new(vec![], "Empty").urls.is_empty());
    }

    #[test]
    fn parses_database_table_and_ignores_the_rest() {
        let config = Config::from_toml_str(
            r#"
            [database]
            urls = ["http://a:8080", "http://b:8080"]
            database = "TestDB"

            [test]
            timeout = 30
            clean_after_tests = true
            "#,
        )
        .unwrap();

        assert_eq!(config.urls.len(), 2);
        assert_eq!(config.database, "TestDB");
    }

    #[test]
    fn missing_table_is_a_configuration_error() {
        let err = Config::from_toml_str("[server]\nport = 1").unwrap_err();
        assert!(matches!(err, DocumentStoreError::Configuration(_)));
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let err = Config::from_file("/nonexistent/ravenlayer.toml").unwrap_err();
        assert!(matches!(err, DocumentStoreError::Configuration(_)));
    }
}
