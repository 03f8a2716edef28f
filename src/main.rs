mod repl;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use owo_colors::OwoColorize;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use monkey::bytecode::disasm::render_bytecode;
use monkey::frontend::token_dumper::TokenDumper;
use monkey::frontend::{self, Lexer};
use monkey::{Config, Error, Session};

use crate::repl::Repl;

#[derive(Parser)]
#[command(
    name = "monkey",
    version,
    about = "Bytecode compiler and virtual machine for the Monkey language"
)]
struct Cli {
    /// Program to run. Starts the REPL when omitted.
    file: Option<PathBuf>,

    /// Print the token stream and exit
    #[arg(long)]
    tokens: bool,

    /// Print the parsed AST and exit
    #[arg(long)]
    ast: bool,

    /// Print the disassembled bytecode before running
    #[arg(long = "bc", alias = "bytecode")]
    bytecode: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Value stack capacity
    #[arg(long)]
    stack_size: Option<usize>,

    /// Maximum call depth
    #[arg(long)]
    max_frames: Option<usize>,

    /// Abort after this many instructions
    #[arg(long)]
    max_steps: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let color = !cli.no_color;
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if color {
                eprintln!("{} {}", "error:".red().bold(), err);
            } else {
                eprintln!("error: {}", err);
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("monkey=debug"),
        _ => EnvFilter::new("monkey=trace"),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config, Error> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(stack_size) = cli.stack_size {
        config.vm.stack_size = stack_size;
    }
    if let Some(max_frames) = cli.max_frames {
        config.vm.max_frames = max_frames;
    }
    if cli.max_steps.is_some() {
        config.vm.max_steps = cli.max_steps;
    }

    Ok(config)
}

fn run(cli: Cli) -> Result<(), Error> {
    let config = load_config(&cli)?;
    let color = !cli.no_color;

    let Some(path) = &cli.file else {
        let session = Session::new(config.vm.clone());
        let mut repl = Repl::new(&config.repl, session, color, cli.bytecode)?;
        repl.run()?;
        return Ok(());
    };

    let source =
        std::fs::read_to_string(path).map_err(|e| Error::io(path.display().to_string(), e))?;

    if cli.tokens {
        let tokens = Lexer::new(&source).tokenize()?;
        let mut dumper = TokenDumper::new();
        if !color {
            dumper = dumper.no_color();
        }
        dumper.dump(&tokens);
        return Ok(());
    }

    let program = frontend::parse(&source)?;

    if cli.ast {
        println!("{:#?}", program);
        return Ok(());
    }

    let mut session = Session::new(config.vm);
    let bytecode = session.compile(&program)?;

    if cli.bytecode {
        print!("{}", render_bytecode(&bytecode));
    }

    session.run(bytecode)?;
    Ok(())
}
