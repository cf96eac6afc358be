use anyhow::{Context as _, Result};
use dynarmord::{logging::LogFile, network::Network, secret, Config};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use structopt::StructOpt;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(StructOpt, Debug)]
struct Args {
    /// set log levels
    ///
    /// useful for trying to debug some operations happening
    /// while executing some of the commands
    #[structopt(long = "log-level", default_value = "info", global = true)]
    log_level: Level,

    /// path of the configuration file of the server
    ///
    /// the server's key pair is loaded again from the files of the
    /// configuration on `SIGHUP`.
    #[structopt(long = "config")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    if let Err(error) = main_run().await {
        eprintln!("{:?}", error);
        std::process::exit(1);
    }
}

async fn main_run() -> Result<()> {
    let args = Args::from_args();

    let config = Config::from_file(&args.config).context("cannot load initial settings")?;

    // a builder for `FmtSubscriber`.
    let builder = FmtSubscriber::builder()
        // all spans/events with a level higher than `log_level`
        // will be written to stdout (or the log file).
        .with_max_level(args.log_level);

    let installed = if let Some(log_file) = &config.log_file {
        let log_file = LogFile::open(log_file)?;
        let subscriber = builder
            .with_ansi(false)
            .with_writer(move || log_file.clone())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.context("setting default subscriber failed")?;

    let identity = secret::load(&config.secret).context("Cannot load the server's key pair")?;
    let mut network = Network::new(Arc::new(identity), config.network)
        .await
        .context("Cannot load the network task")?;

    let mut hangup = Hangup::new().context("Cannot listen to SIGHUP")?;

    println!("ctrl-c to stop the server...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shuting down via CTRL-C instruction");
                break;
            }
            Some(()) = hangup.recv() => {
                reload(&network, &args.config);
            }
            session = network.next_session() => {
                if let Some(session) = session {
                    // nothing runs on top of the session yet
                    tracing::info!(peer = %session.remote_address(), "closing established session");
                } else {
                    break;
                }
            }
        }
    }

    network.stop().await;

    Ok(())
}

fn reload(network: &Network, config: &Path) {
    let identity = Config::from_file(config)
        .and_then(|config| secret::load(&config.secret))
        .context("Cannot reload the server's key pair");

    match identity {
        Ok(identity) => network.reload(Arc::new(identity)),
        Err(error) => {
            tracing::error!(reason = ?error, "keeping the current server's key pair");
        }
    }
}

#[cfg(unix)]
struct Hangup(tokio::signal::unix::Signal);

#[cfg(unix)]
impl Hangup {
    fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self(signal(SignalKind::hangup())?))
    }

    async fn recv(&mut self) -> Option<()> {
        self.0.recv().await
    }
}

#[cfg(not(unix))]
struct Hangup;

#[cfg(not(unix))]
impl Hangup {
    fn new() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> Option<()> {
        std::future::pending().await
    }
}
