//! This module controls configuration parsing from the end user, providing a
//! convenience mechanism for the rest of the program.

use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use rustc_hash::FxHashMap;
use serde::Deserialize;

/// Errors produced by [`Config`] loading.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// Error reading the config file.
    #[error("Failed to read config file {path:?}: {source}")]
    ReadFile {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },
}

fn default_concurrent_requests_max() -> usize {
    100
}

/// Main configuration struct for this program.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// address -- IP plus port -- to bind the API to
    pub binding_addr: SocketAddr,
    /// number of concurrent HTTP connections to allow
    #[serde(default = "default_concurrent_requests_max")]
    pub concurrent_requests_max: usize,
    /// The method by which to express telemetry
    #[serde(default)]
    pub telemetry: Option<Telemetry>,
}

/// Defines the manner of the service's telemetry.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum Telemetry {
    /// In prometheus mode tally will emit its internal telemetry for
    /// scraping at a prometheus poll endpoint.
    Prometheus {
        /// Address and port for the prometheus exporter
        addr: SocketAddr,
        /// Additional labels to include in every metric
        #[serde(default)]
        global_labels: FxHashMap<String, String>,
    },
}

/// Load configuration from a file path.
///
/// # Errors
///
/// Returns an error if the file cannot be read or contains invalid YAML.
pub fn load_config_from_path(path: &Path) -> Result<Config, Error> {
    let contents = fs::read_to_string(path).map_err(|source| Error::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::str::FromStr;

    use super::*;

    #[test]
    fn config_deserializes_with_defaults() -> Result<(), Error> {
        let contents = r#"
binding_addr: "127.0.0.1:8080"
"#;
        let config: Config = serde_yaml::from_str(contents)?;
        assert_eq!(
            config,
            Config {
                binding_addr: SocketAddr::from_str("127.0.0.1:8080")
                    .expect("Not possible to parse into SocketAddr"),
                concurrent_requests_max: default_concurrent_requests_max(),
                telemetry: None,
            },
        );
        Ok(())
    }

    #[test]
    fn config_deserializes_telemetry() -> Result<(), Error> {
        let contents = r#"
binding_addr: "0.0.0.0:8080"
concurrent_requests_max: 32
telemetry:
  prometheus:
    addr: "0.0.0.0:9000"
    global_labels:
      service: "tally"
"#;
        let config: Config = serde_yaml::from_str(contents)?;
        assert_eq!(config.concurrent_requests_max, 32);
        let Some(Telemetry::Prometheus {
            addr,
            global_labels,
        }) = config.telemetry
        else {
            panic!("expected prometheus telemetry");
        };
        assert_eq!(addr, SocketAddr::from_str("0.0.0.0:9000").expect("addr"));
        assert_eq!(global_labels.get("service").map(String::as_str), Some("tally"));
        Ok(())
    }

    #[test]
    fn config_rejects_unknown_fields() {
        let contents = r#"
binding_addr: "127.0.0.1:8080"
window_seconds: 90
"#;
        let result: Result<Config, _> = serde_yaml::from_str(contents);
        assert!(result.is_err());
    }

    #[test]
    fn load_single_file_works() -> Result<(), Error> {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let config_path = temp_dir.path().join("tally.yaml");

        let mut file = fs::File::create(&config_path).expect("create config");
        file.write_all(b"binding_addr: \"127.0.0.1:8080\"\n")
            .expect("write config");

        let config = load_config_from_path(&config_path)?;
        assert_eq!(
            config.binding_addr,
            SocketAddr::from_str("127.0.0.1:8080").expect("addr")
        );
        Ok(())
    }

    #[test]
    fn load_missing_file_errors() {
        let result = load_config_from_path(Path::new("/definitely/not/here.yaml"));
        assert!(matches!(result, Err(Error::ReadFile { .. })));
    }
}
