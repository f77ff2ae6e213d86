use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use callgate::ScriptRunner;
use callgate_core::types::{AddressInput, TypeToken};
use callgate_core::{CallgateResult, Session, SessionConfig};
use callgate_utils::{info, init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingGuard};
use clap::{Parser, Subcommand};

/// Register native functions by address and signature, call them, and probe process memory.
#[derive(Parser, Debug)]
#[command(name = "callgate")]
#[command(version)]
#[command(about = "Register native functions by address and signature, call them, and probe process memory", long_about = None)]
struct Cli
{
    /// Ring buffer capacity of each operation log category
    #[arg(long, global = true)]
    max_log_entries: Option<usize>,
    /// Wait limit for callInMainContext, in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
    /// Default file for save() and load()
    #[arg(long, global = true)]
    registry: Option<PathBuf>,
    /// Diagnostic log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Diagnostic log format (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Execute a statement script, stopping at the first error
    Run
    {
        /// Path to the script
        script: PathBuf,
    },
    /// Read statements from standard input (default)
    Console,
    /// Print the functions saved in a registry file
    List
    {
        /// Registry file (defaults to --registry or CALLGATE_REGISTRY_PATH)
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List modules loaded in this process
    Modules,
    /// Print the base address of a loaded module (main executable if omitted)
    Module
    {
        /// Module name, file name, or full path
        name: Option<String>,
    },
    /// Read memory of this process
    Read
    {
        /// Address to read from, hexadecimal with or without 0x
        address: String,
        /// Number of elements to read
        #[arg(short, long, default_value_t = 16)]
        count: usize,
        /// Element type (int, double, pointer, char[N], ...); single bytes if omitted
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,
    },
}

fn main()
{
    let cli = Cli::parse();

    let _guard = match start_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    match run_command(cli) {
        Ok(0) => {}
        Ok(_) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn start_logging(cli: &Cli) -> Result<LoggingGuard, callgate_utils::LoggingError>
{
    match cli.log_level {
        Some(level) => init_logging_with_level(level, cli.log_format.unwrap_or_default()),
        None => init_logging(),
    }
}

fn session_config(cli: &Cli) -> SessionConfig
{
    let mut config = SessionConfig::from_env();
    if let Some(max) = cli.max_log_entries {
        config.debug.max_log_entries = max.max(1);
    }
    if let Some(ms) = cli.timeout_ms {
        config.call_timeout = Duration::from_millis(ms);
    }
    if let Some(path) = &cli.registry {
        config.registry_path = path.clone();
    }
    config
}

/// Run the selected command. Returns the number of failed statements.
fn run_command(cli: Cli) -> CallgateResult<usize>
{
    let mut session = Session::new(session_config(&cli));

    match cli.command.unwrap_or(Commands::Console) {
        Commands::Run { script } => {
            info!("Running script {}", script.display());
            let mut runner = ScriptRunner::new(session, io::stdout().lock());
            let executed = runner.run_file(&script)?;
            info!(executed, "Script finished");
            Ok(0)
        }
        Commands::Console => {
            let stdin = io::stdin();
            let prompt = stdin.is_terminal();
            let mut runner = ScriptRunner::new(session, io::stdout().lock());
            runner.run_interactive(stdin.lock(), prompt)
        }
        Commands::List { file } => {
            session.load(file.as_deref())?;
            print!("{}", session.listing());
            Ok(0)
        }
        Commands::Modules => {
            for module in session.loaded_modules() {
                println!("{}  {}", module.base, module.path.display());
            }
            Ok(0)
        }
        Commands::Module { name } => {
            let base = session.module_base_address(name.as_deref().unwrap_or_default())?;
            println!("{}", base);
            Ok(0)
        }
        Commands::Read {
            address,
            count,
            type_name,
        } => {
            let address = AddressInput::Text(address).resolve()?;
            let token = match type_name {
                Some(text) => text.parse::<TypeToken>()?,
                None => TypeToken::FixedBuffer(1),
            };
            let read = session.read_mem(address, count, token);
            match read.data {
                Some(_) => {
                    let values: Vec<String> = read.values().iter().map(ToString::to_string).collect();
                    println!("{} bytes @ {}: [{}]", read.bytes_read, address, values.join(", "));
                    Ok(0)
                }
                None => {
                    eprintln!("Could not read {} x {} @ {}", count, token, address);
                    Ok(1)
                }
            }
        }
    }
}
