use clap::Parser;
use kvwire::config::{Args, Config};
use kvwire::{logging, server, Error};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::from(Args::parse());

    // Set once, before the first connection task exists.
    logging::init(config.log_level);

    server::run(config).await
}
