use anyhow::{bail, Result};
use espic::config::Config;
use std::env;

fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("start") => {
            let path = args.get(2).map(String::as_str).unwrap_or("config.toml");
            let cfg = Config::from_file(path)?;
            espic::run(cfg)
        }
        Some("continue") => {
            let checkpoint = match args.get(2) {
                Some(p) => p,
                None => bail!("usage: espic continue <checkpoint> [prefix] [suffix]"),
            };
            espic::continue_run(checkpoint, args.get(3).cloned(), args.get(4).cloned())
        }
        _ => {
            bail!(
                "usage: espic start [config.toml] | espic continue <checkpoint> [prefix] [suffix]"
            );
        }
    }
}
