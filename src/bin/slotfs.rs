//! slotfs command line
//!
//! Formats, inspects and mounts a slotfs backing store.

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use slotfs::{FsConfig, ReformatPolicy, SlotFs, SlotFsBuilder};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "slotfs")]
#[command(about = "Fixed-slot single-file filesystem")]
struct Args {
    /// TOML configuration file
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Backing store file [default: filesys.db]
    #[arg(short = 's', long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mount the filesystem (blocks until unmounted)
    Mount {
        /// Directory to mount on
        mountpoint: PathBuf,

        /// Fail instead of reformatting a store that does not validate
        #[arg(long)]
        no_reformat: bool,

        /// Allow other users to access the mount
        #[arg(long)]
        allow_other: bool,

        /// Unmount automatically when the process exits
        #[arg(long)]
        auto_unmount: bool,
    },

    /// Reformat the store, discarding all files
    Format,

    /// Show superblock and geometry
    Info {
        #[arg(long)]
        json: bool,
    },

    /// List files with their slots
    Ls {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
struct ListedFile {
    slot: u64,
    name: String,
    size: u64,
    perms: u32,
    mtime: u32,
}

fn load_config(args: &Args) -> anyhow::Result<FsConfig> {
    let mut config = match &args.config {
        Some(path) => FsConfig::from_file(path)?,
        None => FsConfig::default(),
    };
    if let Some(store) = &args.store {
        config.store_path = store.clone();
    }
    Ok(config)
}

/// Open an existing store for inspection without ever reformatting it
fn open_existing(config: &FsConfig) -> anyhow::Result<SlotFs> {
    if !config.store_path.exists() {
        bail!("store {} does not exist", config.store_path.display());
    }
    let fs = SlotFsBuilder::new()
        .config(config.clone())
        .reformat_policy(ReformatPolicy::Refuse)
        .build()
        .with_context(|| format!("opening {}", config.store_path.display()))?;
    Ok(fs)
}

fn format_mtime(secs: u32) -> String {
    DateTime::<Utc>::from_timestamp(secs as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn list(fs: &SlotFs, json: bool) -> anyhow::Result<()> {
    let mut files = Vec::new();
    for entry in fs.readdir("/")? {
        if let Some(handle) = entry.handle {
            let attr = fs.attr_of(handle)?;
            files.push(ListedFile {
                slot: handle.0,
                name: entry.name,
                size: attr.size,
                perms: attr.perms,
                mtime: attr.mtime,
            });
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&files)?);
        return Ok(());
    }

    for f in &files {
        println!(
            "{:>3}  {:>6o}  {:>8}  {}  {}",
            f.slot,
            f.perms & 0o7777,
            f.size,
            format_mtime(f.mtime),
            f.name
        );
    }
    Ok(())
}

#[cfg(feature = "fuse")]
fn run_mount(
    mut config: FsConfig,
    mountpoint: PathBuf,
    no_reformat: bool,
    allow_other: bool,
    auto_unmount: bool,
) -> anyhow::Result<()> {
    use slotfs::{MountOptions, SharedSlotFs};
    use std::sync::Arc;

    if no_reformat {
        config.reformat = ReformatPolicy::Refuse;
    }

    let fs = SlotFs::from_config(&config)?;
    let stats = fs.stats();
    info!(
        "Mounting at {:?}: {} files, {} bytes used",
        mountpoint, stats.file_count, stats.bytes_used
    );

    let shared = Arc::new(SharedSlotFs::new(fs));
    let options = MountOptions {
        allow_other,
        auto_unmount,
    };
    slotfs::mount(shared, &mountpoint, &options)?;

    info!("Unmounted");
    Ok(())
}

#[cfg(not(feature = "fuse"))]
fn run_mount(
    _config: FsConfig,
    _mountpoint: PathBuf,
    _no_reformat: bool,
    _allow_other: bool,
    _auto_unmount: bool,
) -> anyhow::Result<()> {
    bail!("slotfs was built without the `fuse` feature; rebuild with --features fuse to mount")
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    match args.command {
        Command::Mount {
            mountpoint,
            no_reformat,
            allow_other,
            auto_unmount,
        } => run_mount(config, mountpoint, no_reformat, allow_other, auto_unmount)?,

        Command::Format => {
            let geometry = config.geometry()?;
            let store = slotfs::FileStore::create(&config.store_path, geometry.total_size())?;
            SlotFs::format(store, geometry)?;
            info!("Formatted {:?}", config.store_path);
        }

        Command::Info { json } => {
            let fs = open_existing(&config)?;
            let stats = fs.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("store:           {}", config.store_path.display());
                println!("files:           {} / {}", stats.file_count, stats.max_files);
                println!("total size:      {}", stats.total_size);
                println!("data offset:     {}", stats.data_offset);
                println!("region capacity: {}", stats.region_capacity);
                println!("last alloc:      {}", stats.last_alloc);
                println!("bytes used:      {}", stats.bytes_used);
            }
        }

        Command::Ls { json } => {
            let fs = open_existing(&config)?;
            list(&fs, json)?;
        }
    }

    Ok(())
}
