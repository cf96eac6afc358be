use crate::{network, secret};
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use structopt::StructOpt;

#[derive(Debug, PartialEq, Eq, Clone, StructOpt, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[structopt(flatten)]
    #[serde(default)]
    pub secret: secret::Config,

    #[structopt(flatten)]
    #[serde(default)]
    pub network: network::Config,

    /// write the logs to this file instead of the standard output
    #[structopt(long = "log-file")]
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub const EXAMPLE: &'static str = include_str!("config.yaml");

    pub fn from_file<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Cannot open file: {}", path.display()))?;
        serde_yaml::from_reader(file)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_example() {
        let example = Config::EXAMPLE;

        let config: Config = serde_yaml::from_str(example).expect("Valid example");

        assert_eq!(config.network, network::Config::default());
        assert_eq!(config.secret.private_key, PathBuf::from("private_key.pem"));
        assert_eq!(
            config.secret.public_key,
            Some(PathBuf::from("public_key.pem"))
        );
    }

    #[test]
    fn from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "network:\n  listen_address: 127.0.0.1:4000\n").unwrap();

        let config = Config::from_file(&path).unwrap();

        assert_eq!(config.network.listen_address.port(), 4000);
        assert_eq!(config.secret, secret::Config::default());
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn log_file() {
        let config: Config = serde_yaml::from_str("log_file: /var/log/dynarmord.log").unwrap();

        assert_eq!(
            config.log_file,
            Some(PathBuf::from("/var/log/dynarmord.log"))
        );
    }

    #[test]
    fn missing_file() {
        assert!(Config::from_file("/this/file/does/not/exist.yaml").is_err());
    }
}
