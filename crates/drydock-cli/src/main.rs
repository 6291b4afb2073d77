mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_FAILURE, EXIT_MANIFEST_ERROR, EXIT_TOOL_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "drydock",
    version,
    about = "Pin Debian package sets into reproducible images and audit them"
)]
struct Cli {
    /// Workspace directory containing image.json.
    #[arg(short = 'C', long, default_value = ".", global = true)]
    directory: PathBuf,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve image.json into a pinned image-lock.json.
    Install {
        /// Re-check the lock's dependency closure locally and warn on gaps.
        #[arg(long, default_value_t = false)]
        verify_closure: bool,
    },
    /// Extract the locked packages into a root filesystem.
    GenerateRootfs {
        /// Target directory for the generated tree.
        #[arg(short, long)]
        directory: Option<PathBuf>,
        /// Delete and recreate the target if it already exists.
        #[arg(short = 'w', long, default_value_t = false)]
        overwrite: bool,
        /// Chroot into the finished tree and run the staged stage2 script.
        #[arg(long, default_value_t = false)]
        run_stage2: bool,
    },
    /// Stage the image's install scripts into a generated rootfs.
    GenerateScripts {
        /// Rootfs directory the scripts are staged into.
        #[arg(short, long)]
        directory: Option<PathBuf>,
        /// Run each staged script inside the rootfs via chroot.
        #[arg(short, long, default_value_t = false)]
        run: bool,
    },
    /// Fetch the changelog of every locked package.
    SyncChangelogs,
    /// Audit the locked packages against a security tracker database.
    Audit {
        /// Path to the security tracker SQLite database.
        #[arg(short, long)]
        database: PathBuf,
        /// Release suite the audit applies to.
        #[arg(short, long, default_value = "buster")]
        suite: String,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    Man {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("DRYDOCK_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    let json_output = cli.json;
    let result = match cli.command {
        Commands::Install { verify_closure } => {
            commands::install::run(&cli.directory, verify_closure, json_output)
        }
        Commands::GenerateRootfs {
            directory,
            overwrite,
            run_stage2,
        } => commands::rootfs::run(&cli.directory, directory, overwrite, run_stage2, json_output),
        Commands::GenerateScripts { directory, run } => {
            commands::scripts::run(&cli.directory, directory, run, json_output)
        }
        Commands::SyncChangelogs => commands::changelogs::run(&cli.directory, json_output),
        Commands::Audit { database, suite } => {
            commands::audit::run(&cli.directory, &database, &suite, json_output)
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::Man { dir } => commands::man::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("manifest error:") {
                EXIT_MANIFEST_ERROR
            } else if msg.contains("command `") {
                EXIT_TOOL_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
