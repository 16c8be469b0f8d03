use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use tracing_subscriber::EnvFilter;

use encfs_core::config::{ContentAlgorithm, NameAlgorithm, VolumeConfig};
use encfs_core::{EncfsError, LocalFsProvider, Volume};

/// Command-line interface for EncFS-encrypted volumes.
#[derive(Parser)]
#[command(name = "encfs-rs")]
#[command(author, version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Volume passphrase (insecure, prefer an interactive prompt)
    #[arg(long, env = "ENCFS_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new volume
    Create(CreateArgs),
    /// Show volume configuration
    Info(VolumeCommand<InfoArgs>),
    /// List directory contents
    Ls(VolumeCommand<LsArgs>),
    /// Read and print a file's contents
    Cat(VolumeCommand<CatArgs>),
    /// Copy a local file into the volume
    CpIn(VolumeCommand<CpInArgs>),
}

/// Wrapper for commands that operate on an already-created volume.
#[derive(Parser)]
struct VolumeCommand<T: clap::Args> {
    /// Path to the volume's root directory on disk
    volume: PathBuf,

    #[command(flatten)]
    args: T,
}

#[derive(Parser)]
struct CreateArgs {
    /// Path to the new volume's root directory on disk
    volume: PathBuf,

    /// Key size in bits (128, 192, or 256)
    #[arg(long, default_value_t = 192)]
    key_size: u32,

    /// Content block size in bytes
    #[arg(long, default_value_t = 1024)]
    block_size: u32,

    /// Content cipher mode
    #[arg(long, value_enum, default_value = "cbc")]
    content_algorithm: ContentAlgorithmArg,

    /// Filename cipher mode
    #[arg(long, value_enum, default_value = "block")]
    name_algorithm: NameAlgorithmArg,

    /// PBKDF2 iteration count
    #[arg(long, default_value_t = 200_000)]
    kdf_iterations: u32,
}

#[derive(Clone, clap::ValueEnum)]
enum ContentAlgorithmArg {
    Cfb,
    Cbc,
}

#[derive(Clone, clap::ValueEnum)]
enum NameAlgorithmArg {
    Stream,
    Block,
    Null,
}

#[derive(clap::Args)]
struct InfoArgs;

#[derive(clap::Args)]
struct LsArgs {
    /// Directory within the volume (default: root)
    #[arg(default_value = "/")]
    path: String,
}

#[derive(clap::Args)]
struct CatArgs {
    /// File path within the volume
    path: String,
}

#[derive(clap::Args)]
struct CpInArgs {
    /// Local file to copy in
    local_path: PathBuf,

    /// Destination path within the volume
    dest_path: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let wrong_password = e
                .chain()
                .any(|cause| matches!(cause.downcast_ref::<EncfsError>(), Some(EncfsError::InvalidPassword)));
            if wrong_password {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Create(args) => create(&args, cli.password.as_deref()),
        Commands::Info(cmd) => execute_volume_command(cmd, cli.password.as_deref(), info),
        Commands::Ls(cmd) => execute_volume_command(cmd, cli.password.as_deref(), ls),
        Commands::Cat(cmd) => execute_volume_command(cmd, cli.password.as_deref(), cat),
        Commands::CpIn(cmd) => execute_volume_command(cmd, cli.password.as_deref(), cp_in),
    }
}

fn execute_volume_command<T, F>(cmd: VolumeCommand<T>, password: Option<&str>, f: F) -> Result<()>
where
    T: clap::Args,
    F: FnOnce(&Volume<LocalFsProvider>, &T) -> Result<()>,
{
    let volume = open_volume(&cmd.volume, password)?;
    f(&volume, &cmd.args)
}

#[tracing::instrument(skip(args, password), fields(volume = %args.volume.display()))]
fn create(args: &CreateArgs, password: Option<&str>) -> Result<()> {
    let password = get_password(password, true)?;

    fs::create_dir_all(&args.volume)
        .with_context(|| format!("failed to create volume directory {}", args.volume.display()))?;
    let provider = LocalFsProvider::new(&args.volume);

    let content_algorithm = match args.content_algorithm {
        ContentAlgorithmArg::Cfb => ContentAlgorithm::Cfb,
        ContentAlgorithmArg::Cbc => ContentAlgorithm::Cbc,
    };
    let name_algorithm = match args.name_algorithm {
        NameAlgorithmArg::Stream => NameAlgorithm::Stream,
        NameAlgorithmArg::Block => NameAlgorithm::Block,
        NameAlgorithmArg::Null => NameAlgorithm::Null,
    };

    let config = VolumeConfig::new(
        "encfs-rs",
        content_algorithm,
        name_algorithm,
        args.key_size,
        args.block_size,
        true,
        true,
        true,
        false,
        8,
        0,
        args.kdf_iterations,
        Vec::new(),
        Vec::new(),
    )?;

    encfs_core::create(provider, config, &password).context("failed to create volume")?;
    println!("Created volume at {}", args.volume.display());
    Ok(())
}

#[tracing::instrument(skip(password), fields(volume = %volume_path.display()))]
fn open_volume(volume_path: &Path, password: Option<&str>) -> Result<Volume<LocalFsProvider>> {
    let password = get_password(password, false)?;
    let provider = LocalFsProvider::new(volume_path);
    encfs_core::open(provider, &password).context("failed to open volume")
}

fn get_password(password: Option<&str>, confirm: bool) -> Result<String> {
    if let Some(password) = password {
        return Ok(password.to_string());
    }
    let password = rpassword::prompt_password("Password: ")?;
    if confirm {
        let confirmation = rpassword::prompt_password("Confirm password: ")?;
        if password != confirmation {
            anyhow::bail!("passwords did not match");
        }
    }
    Ok(password)
}

fn info(volume: &Volume<LocalFsProvider>, _args: &InfoArgs) -> Result<()> {
    let config = volume.config();
    let mut table = Table::new();
    table.set_header(vec!["Property", "Value"]);
    table.add_row(vec!["Creator", config.creator.as_str()]);
    table.add_row(vec!["Content algorithm", &format!("{:?}", config.content_algorithm)]);
    table.add_row(vec!["Name algorithm", &format!("{:?}", config.name_algorithm)]);
    table.add_row(vec!["Key size (bits)", &config.key_size_bits.to_string()]);
    table.add_row(vec!["Block size", &config.block_size.to_string()]);
    table.add_row(vec!["Unique IV", &config.unique_iv.to_string()]);
    table.add_row(vec!["Chained name IV", &config.chained_name_iv.to_string()]);
    table.add_row(vec!["Allow holes", &config.allow_holes.to_string()]);
    table.add_row(vec!["Block MAC bytes", &config.block_mac_bytes.to_string()]);
    table.add_row(vec!["KDF iterations", &config.kdf_iterations.to_string()]);
    println!("{table}");
    Ok(())
}

fn ls(volume: &Volume<LocalFsProvider>, args: &LsArgs) -> Result<()> {
    let entries = volume.list(Path::new(&args.path)).context("failed to list directory")?;
    let mut table = Table::new();
    table.set_header(vec!["Type", "Size", "Name"]);
    for entry in entries {
        table.add_row(vec![
            if entry.is_directory { "dir" } else { "file" }.to_string(),
            entry.size.to_string(),
            entry.name,
        ]);
    }
    println!("{table}");
    Ok(())
}

fn cat(volume: &Volume<LocalFsProvider>, args: &CatArgs) -> Result<()> {
    let mut reader = volume.open_read(Path::new(&args.path)).context("failed to open file")?;
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    io::stdout().write_all(&buf)?;
    Ok(())
}

fn cp_in(volume: &Volume<LocalFsProvider>, args: &CpInArgs) -> Result<()> {
    let data = fs::read(&args.local_path)
        .with_context(|| format!("failed to read {}", args.local_path.display()))?;
    let mut writer = volume
        .open_write(Path::new(&args.dest_path), Some(data.len() as u64))
        .context("failed to open destination for writing")?;
    writer.write_all(&data)?;
    writer.finish().context("failed to commit file")?;
    println!("Copied {} -> {}", args.local_path.display(), args.dest_path);
    Ok(())
}

fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}
