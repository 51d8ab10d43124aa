use anyhow::{Context, Result};
use clap::Parser;
use evilsdr::bookmarks::JsonBookmarkStore;
use evilsdr::cli::{Cli, Commands, ConfigAction, log_filter};
use evilsdr::config::Config;
use evilsdr::control::{Command, ControlServer, ControlSurface, Event, send_command};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(cli.quiet, cli.verbose)),
    )
    .init();

    match cli.command {
        Commands::Serve { listen, no_connect } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(listen) = listen {
                config.set_listen(&listen);
            }
            if no_connect {
                config.server.autoconnect = false;
            }
            serve(config).await?;
        }
        Commands::Send {
            command,
            addr,
            wait,
        } => {
            let command = Command::parse(&command)?;
            let events = send_command(&addr, command, Duration::from_millis(wait)).await?;
            for event in events {
                println!("{}", event.to_json()?);
            }
        }
        Commands::Categories { addr } => {
            let events =
                send_command(&addr, Command::GetScanCategories, Duration::from_millis(500))
                    .await?;
            let categories = events.into_iter().find_map(|e| match e {
                Event::ScanCategories { categories } => Some(categories),
                _ => None,
            });
            match categories {
                Some(categories) if !categories.is_empty() => {
                    for name in categories {
                        println!("{}", name);
                    }
                }
                Some(_) => eprintln!("No bookmark categories"),
                None => anyhow::bail!("server at {} did not answer", addr),
            }
        }
        Commands::Config { action } => handle_config_command(action, cli.config.as_deref())?,
    }

    Ok(())
}

fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

async fn serve(config: Config) -> Result<()> {
    let bookmarks = Arc::new(JsonBookmarkStore::new(config.bookmarks.path.clone()));
    let autoconnect = config.server.autoconnect;
    let (host, port) = (config.server.host.clone(), config.server.port);
    let surface = ControlSurface::new(config, bookmarks);

    let server = ControlServer::bind(&host, port)
        .await
        .with_context(|| format!("cannot listen on {}:{}", host, port))?;

    if autoconnect {
        let connecting = surface.clone();
        tokio::task::spawn_blocking(move || connecting.autoconnect());
    }

    let result = tokio::select! {
        result = server.start(surface.clone()) => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, shutting down");
            server.stop().await;
            Ok(())
        }
    };

    tokio::task::spawn_blocking(move || surface.shutdown()).await?;
    result?;
    Ok(())
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => print!("{}", load_config(custom_path)?.to_toml()?),
        ConfigAction::Path => {
            let path = custom_path
                .map(Path::to_path_buf)
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
        ConfigAction::Dump => print!("{}", Config::default().to_toml()?),
    }
    Ok(())
}
