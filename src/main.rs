use anyhow::{Context, Result};
use clap::Parser;

use inwatch::{
    cli::{Cli, OutputFormat},
    tree, FileEvent, FileEventKind, Flavor, Watch, WatchEvent,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(err) = cli.validate() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    cli.setup_logging();

    let watch_path = cli.get_watch_path();
    let options = cli
        .watch_config()
        .context("Failed to load configuration")?
        .into_options()
        .context("Invalid configuration")?;

    if cli.dry_run {
        let root = tree::resolve_root(&watch_path)?;
        let config = options.notifier_config(&root);
        let (allow, reject) = options.filter.translated(Flavor::Extended);
        tracing::debug!("Translated filters: include={:?} exclude={:?}", allow, reject);
        println!("{}", config.command_line());
        return Ok(());
    }

    tracing::info!("Starting inwatch on: {}", watch_path.display());

    let mut watch = Watch::new(&watch_path, options);
    watch
        .ready()
        .await
        .with_context(|| format!("Failed to scan {}", watch_path.display()))?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = watch.recv() => match event {
                Some(WatchEvent::File(event)) => print_event(&event, cli.output)?,
                Some(WatchEvent::Error(err)) => tracing::error!("{}", err),
                None => break,
            },
        }
    }

    watch.stop().await.context("Failed to stop watch")?;
    Ok(())
}

fn print_event(event: &FileEvent, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(event)?),
        OutputFormat::Text => print_text_event(event),
        OutputFormat::Compact => print_compact_event(event),
    }
    Ok(())
}

fn print_text_event(event: &FileEvent) {
    let event_type = match event.kind {
        FileEventKind::Add => "ADD",
        FileEventKind::Change => "CHANGE",
        FileEventKind::Remove => "REMOVE",
    };
    println!("{} {}", event_type, event.path);
}

fn print_compact_event(event: &FileEvent) {
    let event_type = match event.kind {
        FileEventKind::Add => "A",
        FileEventKind::Change => "C",
        FileEventKind::Remove => "R",
    };
    println!("{} {}", event_type, event.path);
}
