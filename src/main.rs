// This is my main entry point for the node binary
use clap::Parser;
use log::{error, LevelFilter};
use nodechain::{Config, Node, Opt};
use std::process;

fn main() {
    // I initialize logging so I can see what's happening in my node
    // RUST_LOG still works on top of this, e.g. RUST_LOG=p2p=off hides the peer channel
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    // I parse the command line arguments using clap
    let opt = Opt::parse();

    // If something goes wrong, I log the error and exit with code 1
    if let Err(e) = run(&opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

// I layer the settings (defaults, file, environment, then CLI) and serve until the listeners stop
fn run(opt: &Opt) -> nodechain::Result<()> {
    let mut config = Config::load(opt.config.as_deref())?;
    opt.apply(&mut config);

    let node = Node::new(config)?;
    node.run()
}
