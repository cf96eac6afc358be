use anyhow::{Context as _, Result};
use dynarmor_network::{net::Connection, Fingerprint, ServerIdentity};
use dynarmord::{secret, Config};
use rand::rngs::OsRng;
use rsa::RsaPublicKey;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Instant,
};
use structopt::StructOpt;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const DEFAULT_PORT: u16 = 2250;

#[derive(StructOpt, Debug)]
struct Args {
    /// set log levels
    ///
    /// useful for trying to debug some operations happening
    /// while executing some of the commands
    #[structopt(long = "log-level", default_value = "warn", global = true)]
    log_level: Level,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// print the default configuration to the standard output
    DefaultConfig,

    /// generate a new RSA key pair for the server
    GenerateKey {
        /// size of the RSA modulus, in bits
        #[structopt(long = "bits", default_value = "2048")]
        bits: usize,

        /// path of the file to store the private key in (PKCS#8 PEM)
        #[structopt(long = "private-key", default_value = "private_key.pem")]
        private_key: PathBuf,

        /// path of the file to store the public key in (SubjectPublicKeyInfo PEM)
        #[structopt(long = "public-key", default_value = "public_key.pem")]
        public_key: PathBuf,
    },

    /// connect to a server and establish a new session
    Connect {
        /// address of the server, `host` or `host:port`
        address: String,

        /// trust the server's key without asking
        #[structopt(long = "accept", conflicts_with = "expect")]
        accept: bool,

        /// only trust the server with this key fingerprint
        #[structopt(long = "expect")]
        expect: Option<Fingerprint>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::from_args();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {}", error);
    }

    let result = match args.cmd {
        Command::DefaultConfig => default_config()
            .await
            .context("Cannot generate default configuration"),
        Command::GenerateKey {
            bits,
            private_key,
            public_key,
        } => generate_key(bits, private_key, public_key)
            .await
            .context("Cannot generate new key"),
        Command::Connect {
            address,
            accept,
            expect,
        } => connect(address, accept, expect)
            .await
            .context("Cannot establish a session"),
    };

    if let Err(error) = result {
        eprintln!("{:#?}", error);
        std::process::exit(1);
    }
}

async fn default_config() -> Result<()> {
    println!("{}", Config::EXAMPLE);
    Ok(())
}

async fn generate_key(bits: usize, private_key: PathBuf, public_key: PathBuf) -> Result<()> {
    println!("Generating new key... this may take some times...");

    let instant = Instant::now();
    let identity = tokio::task::spawn_blocking(move || {
        ServerIdentity::generate(&mut OsRng, bits)
    })
    .await
    .context("Key generation task failed")??;
    let elapsed = instant.elapsed().as_millis();
    tracing::info!(elapsed = %elapsed, bits, "new key generated");

    secret::save(&identity, &private_key, &public_key)?;

    println!("New private key generated successfully");
    println!("Private key: {}", private_key.display());
    println!("Public key:  {}", public_key.display());
    println!("Fingerprint: {}", identity.fingerprint());

    Ok(())
}

async fn connect(address: String, accept: bool, expect: Option<Fingerprint>) -> Result<()> {
    let address = with_default_port(&address);

    let check_key = |_: &RsaPublicKey, fingerprint: &Fingerprint| {
        println!("Server key fingerprint: {}", fingerprint);

        if let Some(expected) = &expect {
            fingerprint == expected
        } else if accept {
            true
        } else {
            match dialoguer::Confirm::new()
                .with_prompt("Trust this key?")
                .default(false)
                .interact()
            {
                Ok(trusted) => trusted,
                Err(error) => {
                    tracing::error!(reason = %error, "Cannot ask for confirmation");
                    false
                }
            }
        }
    };

    let connection = Connection::connect(OsRng, address, check_key).await?;

    println!("Session established with {}", connection.remote_address());
    println!("{:?}", connection.session_key());

    Ok(())
}

/// append the default port to `address` if it has none
fn with_default_port(address: &str) -> String {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return SocketAddr::new(ip, DEFAULT_PORT).to_string();
    }

    match address.rsplit_once(':') {
        Some((host, port))
            if port.parse::<u16>().is_ok() && (!host.contains(':') || host.ends_with(']')) =>
        {
            address.to_owned()
        }
        _ => format!("{}:{}", address, DEFAULT_PORT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port() {
        assert_eq!(with_default_port("localhost"), "localhost:2250");
        assert_eq!(with_default_port("localhost:80"), "localhost:80");
        assert_eq!(with_default_port("127.0.0.1"), "127.0.0.1:2250");
        assert_eq!(with_default_port("127.0.0.1:80"), "127.0.0.1:80");
        assert_eq!(with_default_port("::1"), "[::1]:2250");
        assert_eq!(with_default_port("[::1]"), "[::1]:2250");
        assert_eq!(with_default_port("[::1]:80"), "[::1]:80");
    }
}
