mod cli;

use anyhow::Context;
use clap::Parser;
use configs::AppConfig;
use dotenvy::dotenv;

use cli::{Cli, Commands, ServeArgs};

const VERSION: &str = concat!("UserAPI Version ", env!("CARGO_PKG_VERSION"));

fn load_config(args: &ServeArgs) -> anyhow::Result<AppConfig> {
    let mut cfg = match &args.config {
        Some(path) => configs::load_from_file(&path.to_string_lossy())
            .with_context(|| format!("reading config {}", path.display()))?,
        None => configs::load_default().context("reading default config")?,
    };
    args.apply(&mut cfg);
    cfg.normalize_and_validate()?;
    Ok(cfg)
}

fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let cfg = load_config(&args)?;
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(threads) = cfg.server.worker_threads {
        builder.worker_threads(threads);
    }
    let runtime = builder.enable_all().build()?;
    runtime.block_on(server::run(cfg, VERSION))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Version) => {
            println!("{VERSION}");
            Ok(())
        }
        Some(Commands::Serve(args)) => serve(args),
        None => serve(cli.serve),
    }
}
