use anyhow::{ensure, Context as _, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};
use structopt::StructOpt;

/// network configuration of the server
///
/// set the different values that controls how inbound connections
/// are accepted and how the handshakes are run
#[derive(StructOpt, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// this is the address the network will listen for incoming
    /// connections
    #[structopt(long = "listen-address", default_value = "0.0.0.0:2250")]
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,

    /// the number of pending connections the operating system will
    /// queue before refusing new ones
    #[structopt(long = "backlog", default_value = "10")]
    #[serde(default = "default_backlog")]
    pub backlog: u32,

    /// the maximal number of handshakes running at the same time
    ///
    /// new connections are closed right away while this limit is reached
    #[structopt(long = "max-concurrent-handshakes", default_value = "128")]
    #[serde(default = "default_max_concurrent_handshakes")]
    pub max_concurrent_handshakes: usize,

    /// the time to wait for any read or write of a handshake (in seconds)
    ///
    /// a peer that stays silent for longer than that is disconnected
    #[structopt(long = "idle-timeout", default_value = "30", parse(try_from_str = duration))]
    #[serde(default = "default_idle_timeout", with = "seconds")]
    pub idle_timeout: Duration,

    /// the established session queue size
    ///
    /// this is the number of established sessions that can be waiting to
    /// be picked up before the handshake workers start to wait
    #[structopt(long = "session-queue-size", default_value = "64")]
    #[serde(default = "default_session_queue_size")]
    pub session_queue_size: usize,
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 2250))
}

fn default_backlog() -> u32 {
    10
}

fn default_max_concurrent_handshakes() -> usize {
    128
}

fn default_idle_timeout() -> Duration {
    dynarmor_network::IDLE_TIMEOUT
}

fn default_session_queue_size() -> usize {
    64
}

fn duration(s: &str) -> Result<Duration> {
    let i = s
        .parse()
        .context("expecting to parse a duration in seconds")?;
    Ok(Duration::from_secs(i))
}

mod seconds {
    use serde::{Deserialize as _, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

impl Config {
    /// check the values are usable
    ///
    /// a zero limit, timeout or queue size would make the server close
    /// every inbound connection.
    pub fn check(&self) -> Result<()> {
        ensure!(
            self.max_concurrent_handshakes > 0,
            "max_concurrent_handshakes must be at least 1"
        );
        ensure!(
            self.idle_timeout > Duration::from_secs(0),
            "idle_timeout must be at least 1 second"
        );
        ensure!(
            self.session_queue_size > 0,
            "session_queue_size must be at least 1"
        );
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            backlog: default_backlog(),
            max_concurrent_handshakes: default_max_concurrent_handshakes(),
            idle_timeout: default_idle_timeout(),
            session_queue_size: default_session_queue_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_section_uses_the_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.listen_address.port(), 2250);
        assert_eq!(config.backlog, 10);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
    }

    #[test]
    fn idle_timeout_is_in_seconds() {
        let config: Config = serde_yaml::from_str("idle_timeout: 5").unwrap();

        assert_eq!(config.idle_timeout, Duration::from_secs(5));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_yaml::from_str::<Config>("heart_beat: 1").is_err());
    }

    #[test]
    fn defaults_are_usable() {
        assert!(Config::default().check().is_ok());
    }

    #[test]
    fn zero_max_concurrent_handshakes_is_rejected() {
        let config: Config = serde_yaml::from_str("max_concurrent_handshakes: 0").unwrap();

        assert!(config.check().is_err());
    }

    #[test]
    fn zero_idle_timeout_is_rejected() {
        let config: Config = serde_yaml::from_str("idle_timeout: 0").unwrap();

        assert!(config.check().is_err());
    }

    #[test]
    fn zero_session_queue_size_is_rejected() {
        let config: Config = serde_yaml::from_str("session_queue_size: 0").unwrap();

        assert!(config.check().is_err());
    }

    #[test]
    fn command_line_defaults_match() {
        let config = Config::from_iter_safe(&["dynarmord"]).unwrap();

        assert_eq!(config, Config::default());
    }
}
