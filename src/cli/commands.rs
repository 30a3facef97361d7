use crate::config::Config;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "nodechain", about = "Run a proof-of-work blockchain node")]
pub struct Opt {
    #[arg(help = "Peer protocol port; the control protocol listens on PORT + 1")]
    pub port: u16,
    #[arg(long = "host", help = "Interface to bind both listeners to")]
    pub host: Option<String>,
    #[arg(long = "config", help = "TOML file with node settings")]
    pub config: Option<PathBuf>,
}

impl Opt {
    /// Command-line values win over every other source
    pub fn apply(&self, config: &mut Config) {
        config.port = self.port;
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
    }
}
