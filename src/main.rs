use std::env;

use anyhow::Context;
use log::info;
use tokio::signal;

use sparse_orchestra::{
    Config, Learner,
    config::{KwArgs, parse_kwargs},
};

/// The option naming a JSON file with the base configuration.
const CONF_KEY: &str = "conf";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let kwargs = parse_kwargs(env::args().skip(1))?;
    let (config, kwargs) = base_config(kwargs)?;

    let mut learner = Learner::with_config(config, kwargs)?;
    learner.add_epoch_callback(|epoch, train, val| {
        info!(epoch = epoch; "train: {train} | validate: {val}");
    });

    tokio::select! {
        ret = learner.run_scheduler() => {
            ret?;
            info!("wrapping up");
        }
        _ = signal::ctrl_c() => {
            info!("received SIGINT");
        }
    }

    learner.close().await;
    Ok(())
}

/// Reads the `conf=` file if given, the remaining options refine it.
fn base_config(kwargs: KwArgs) -> anyhow::Result<(Config, KwArgs)> {
    let (conf, rest): (KwArgs, KwArgs) = kwargs.into_iter().partition(|(key, _)| key == CONF_KEY);

    let config = match conf.last() {
        Some((_, path)) => Config::from_json_file(path)
            .with_context(|| format!("failed to read config file {path}"))?,
        None => Config::default(),
    };

    Ok((config, rest))
}
