//! cloudtrack - Track files in a cloud-synced directory.
//!
//! Usage:
//!   cloudtrack --base DIR list CONTAINER [--watch]
//!   cloudtrack --base DIR upload CONTAINER LOCAL REMOTE [--watch]
//!   cloudtrack --base DIR download CONTAINER REMOTE LOCAL [--watch]
//!   cloudtrack --base DIR delete CONTAINER REMOTE
//!   cloudtrack --base DIR move CONTAINER FROM TO

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use color_eyre::eyre::{bail, Context, Result};
use tokio::sync::mpsc::UnboundedReceiver;

use cloudtrack_core::{ChannelEvent, ChannelId, DownloadStatus, FileInfo, TrackerConfig};
use cloudtrack_ops::{Dispatcher, LocalProvider, MpscEmitter, Response};

/// Channel used by the CLI for watched operations.
const CLI_CHANNEL: &str = "cli";

#[derive(Parser)]
#[command(
    name = "cloudtrack",
    version,
    about = "Track uploads, downloads and listings in a cloud-synced directory",
    long_about = "cloudtrack treats every subdirectory of --base as a container and \
                  reports the progress of file operations inside it.\n\n\
                  Pass --watch to follow an operation until it finishes."
)]
struct Cli {
    /// Directory holding the containers
    #[arg(short, long, default_value = ".")]
    base: PathBuf,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print file lists as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the files of a container
    List {
        container: String,

        /// Keep listing on every change until interrupted
        #[arg(short, long)]
        watch: bool,
    },

    /// Copy a local file into a container
    Upload {
        container: String,
        local: PathBuf,
        remote: String,

        /// Follow the upload until it finishes
        #[arg(short, long)]
        watch: bool,
    },

    /// Copy a remote file out of a container
    Download {
        container: String,
        remote: String,
        local: PathBuf,

        /// Follow the download until it finishes
        #[arg(short, long)]
        watch: bool,
    },

    /// Delete a file from a container
    Delete { container: String, remote: String },

    /// Move a file inside a container
    Move {
        container: String,
        from: String,
        to: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => TrackerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TrackerConfig::load_or_default().context("Failed to load default config")?,
    };
    tracing::debug!(?config, base = %cli.base.display(), "configuration loaded");

    let provider = Arc::new(LocalProvider::new(&cli.base, config.poll_interval()));
    let emitter = Arc::new(MpscEmitter::new());
    let dispatcher = Dispatcher::new(provider, emitter.clone(), config);

    let channel = ChannelId::from(CLI_CHANNEL);

    match cli.command {
        Command::List { container, watch } => {
            if watch {
                let rx = emitter.listen(&channel);
                dispatcher
                    .gather(Some(&container), Some(channel.clone()))
                    .await
                    .context("List failed")?;
                follow(&dispatcher, &channel, rx, cli.json).await?;
            } else {
                let response = dispatcher
                    .gather(Some(&container), None)
                    .await
                    .context("List failed")?;
                if let Response::Files(files) = response {
                    print_files(&files, cli.json)?;
                }
            }
        }
        Command::Upload {
            container,
            local,
            remote,
            watch,
        } => {
            let rx = watch.then(|| emitter.listen(&channel));
            dispatcher
                .upload(Some(&container), &local, &remote, watch.then(|| channel.clone()))
                .await
                .context("Upload failed")?;
            match rx {
                Some(rx) => follow(&dispatcher, &channel, rx, cli.json).await?,
                None => eprintln!("Copied {} into {container}", local.display()),
            }
        }
        Command::Download {
            container,
            remote,
            local,
            watch,
        } => {
            // The CLI always waits for the local copy; --watch only controls
            // whether progress is printed.
            let rx = emitter.listen(&channel);
            dispatcher
                .download(Some(&container), &remote, &local, Some(channel.clone()))
                .await
                .context("Download failed")?;
            if watch {
                follow(&dispatcher, &channel, rx, cli.json).await?;
            } else {
                wait_quietly(&dispatcher, &channel, rx).await?;
                eprintln!("Downloaded {remote} to {}", local.display());
            }
        }
        Command::Delete { container, remote } => {
            dispatcher
                .delete(Some(&container), &remote)
                .await
                .context("Delete failed")?;
            eprintln!("Deleted {remote}");
        }
        Command::Move {
            container,
            from,
            to,
        } => {
            dispatcher
                .move_item(Some(&container), &from, &to)
                .await
                .context("Move failed")?;
            eprintln!("Moved {from} to {to}");
        }
    }

    Ok(())
}

fn init_tracing(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "cloudtrack=info",
        1 => "cloudtrack=debug",
        _ => "cloudtrack=trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

/// Print channel events until the channel closes or Ctrl-C cancels it.
async fn follow(
    dispatcher: &Dispatcher,
    channel: &ChannelId,
    mut rx: UnboundedReceiver<ChannelEvent>,
    json: bool,
) -> Result<()> {
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(ChannelEvent::Progress(percent)) => eprintln!("{percent:>6.1}%"),
                Some(ChannelEvent::FileList(files)) => print_files(&files, json)?,
                Some(ChannelEvent::End) => eprintln!("Done"),
                Some(ChannelEvent::Error { kind, message }) => {
                    bail!("{kind} ({}): {message}", kind.code());
                }
                None => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                dispatcher.cancel_channel(channel);
                eprintln!("Cancelled");
                return Ok(());
            }
        }
    }
}

/// Wait for the terminal event without printing progress.
async fn wait_quietly(
    dispatcher: &Dispatcher,
    channel: &ChannelId,
    mut rx: UnboundedReceiver<ChannelEvent>,
) -> Result<()> {
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(ChannelEvent::Error { kind, message }) => {
                    bail!("{kind} ({}): {message}", kind.code());
                }
                Some(_) => {}
                None => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                dispatcher.cancel_channel(channel);
                bail!("Interrupted");
            }
        }
    }
}

fn print_files(files: &[FileInfo], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(files)?);
        return Ok(());
    }

    let total: u64 = files.iter().filter_map(|f| f.size_in_bytes).sum();
    for file in files {
        println!(
            "{:>10}  {:<11}  {}",
            file.size_in_bytes.map(format_size).unwrap_or_else(|| "-".to_string()),
            status_label(file),
            file.relative_path
        );
    }
    println!("{} file(s), {}", files.len(), format_size(total));
    Ok(())
}

fn status_label(file: &FileInfo) -> &'static str {
    if file.has_unresolved_conflicts {
        return "conflict";
    }
    if file.is_uploading {
        return "uploading";
    }
    if file.is_downloading {
        return "downloading";
    }
    match file.download_status {
        DownloadStatus::Current => "current",
        DownloadStatus::Downloading => "stale",
        DownloadStatus::NotDownloaded => "remote-only",
    }
}

/// Format bytes as human-readable size.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
