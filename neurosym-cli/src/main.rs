//! # Neurosym CLI
//!
//! Interactive loop: a problem in plain language goes to the LLM, comes back
//! as a Prolog program, runs in SWI-Prolog, and the result is explained by
//! the LLM again.
//!
//! Usage:
//!   neurosym
//!   neurosym --model llama3.1:8b-instruct --engine-timeout 10
//!   neurosym --config neurosym.toml --stream -v
//!
//! Type `exit` or `quit` (or press Ctrl+C) to leave.

use clap::Parser;
use neurosym_agent::Agent;
use neurosym_core::{error, Config, LlmProvider, LogicEngine, OpenAIProvider, Result, SwiProlog};
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "neurosym")]
#[command(author, version, about = "Naive neuro-symbolic problem solver (LLM + SWI-Prolog)")]
struct Cli {
    /// TOML config file (default: ./neurosym.toml if present)
    #[arg(short, long, env = "NEUROSYM_CONFIG")]
    config: Option<PathBuf>,

    /// OpenAI-compatible endpoint, e.g. http://localhost:11434/v1
    #[arg(long, env = "NEUROSYM_BASE_URL")]
    base_url: Option<String>,

    /// Model used for both translations
    #[arg(short, long, env = "NEUROSYM_MODEL")]
    model: Option<String>,

    #[arg(long, env = "NEUROSYM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Directory for archived programs
    #[arg(short, long, env = "NEUROSYM_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// SWI-Prolog binary name or path
    #[arg(long, env = "NEUROSYM_SWIPL")]
    swipl: Option<String>,

    /// Entry goal run against each program
    #[arg(long)]
    goal: Option<String>,

    /// Seconds before a running program is killed
    #[arg(long)]
    engine_timeout: Option<u64>,

    /// Explain failed executions instead of reporting an error
    #[arg(long)]
    narrate_failures: bool,

    /// Stream the explanation as it is generated
    #[arg(long)]
    stream: bool,

    /// Don't append to the archive journal
    #[arg(long)]
    no_journal: bool,

    /// Debug logging on stderr, error details and the cycle trace on stdout
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Flags win over the config file
    fn apply(&self, config: &mut Config) {
        if let Some(base_url) = &self.base_url {
            config.llm.base_url = base_url.clone();
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(api_key) = &self.api_key {
            config.llm.api_key = Some(api_key.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.archive.dir = dir.clone();
        }
        if let Some(swipl) = &self.swipl {
            config.engine.program = swipl.clone();
        }
        if let Some(goal) = &self.goal {
            config.engine.goal = goal.clone();
        }
        if let Some(secs) = self.engine_timeout {
            config.engine.timeout_secs = secs;
        }
        if self.narrate_failures {
            config.narrate_failures = true;
        }
        if self.stream {
            config.stream = true;
        }
        if self.no_journal {
            config.archive.journal = false;
        }
    }

    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_banner(config: &Config) {
    println!("{}", "=".repeat(60));
    println!("Naive Neuro-Symbolic System");
    println!("User > LLM > Prolog > LLM > User");
    println!("{}", "=".repeat(60));
    println!("Model:    {}", config.llm.model);
    println!("Endpoint: {}", config.llm.base_url);
    println!("Programs: {}", config.archive.dir.display());
    println!();
}

/// SWI-Prolog must be installed and runnable
async fn start_engine(config: &Config) -> Result<SwiProlog> {
    let engine = SwiProlog::new(&config.engine)?;
    let version = engine.check().await?;
    println!("[OK] {}", version);
    Ok(engine)
}

/// The LLM server must answer; a missing model only warns since some
/// servers don't list every model they can serve
async fn start_provider(config: &Config) -> Result<OpenAIProvider> {
    let provider = OpenAIProvider::new(config.llm.provider_config())
        .map_err(|e| error::from_provider(e).with_operation("cli::start_provider"))?;

    let models = provider.list_models().await.map_err(|e| {
        error::from_provider(e)
            .with_operation("cli::start_provider")
            .with_context("base_url", config.llm.base_url.clone())
    })?;

    if models.iter().any(|m| m == &config.llm.model) {
        println!("[OK] LLM server reachable, model '{}' available", config.llm.model);
    } else {
        tracing::warn!(model = %config.llm.model, available = models.len(), "model not listed by server");
        println!(
            "[WARNING] Model '{}' not listed by the server (try: ollama pull {})",
            config.llm.model, config.llm.model
        );
    }
    Ok(provider)
}

fn fail(context: &str, err: neurosym_core::Error) -> ! {
    eprintln!("[ERROR] {}: {}", context, err.message());
    tracing::debug!("{}", err);
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => fail("Invalid configuration", e),
    };

    print_banner(&config);

    let engine = match start_engine(&config).await {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Please install SWI-Prolog 9.0+ and make sure 'swipl' is in your PATH.");
            fail("SWI-Prolog unavailable", e)
        }
    };

    let provider = match start_provider(&config).await {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("Make sure the LLM server (e.g. `ollama serve`) is running.");
            fail("LLM server unreachable", e)
        }
    };

    println!("System ready!\n");

    let mut agent = Agent::new(provider, engine, &config, cli.verbose);
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();

    tokio::select! {
        result = agent.run(stdin, &mut stdout) => {
            if let Err(e) = result {
                eprintln!("[ERROR] Terminal I/O failed: {}", e);
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\n\nInterrupted by user. Goodbye!");
            std::process::exit(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parse `args` as if no `NEUROSYM_*` variable were set
    fn parse(args: &[&str]) -> Cli {
        for (key, _) in std::env::vars_os() {
            if key.to_string_lossy().starts_with("NEUROSYM_") {
                std::env::remove_var(&key);
            }
        }
        Cli::try_parse_from(args.iter().copied()).unwrap()
    }

    #[test]
    fn test_no_arguments_needed() {
        let cli = parse(&["neurosym"]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = parse(&[
            "neurosym",
            "--model",
            "llama3.1:8b-instruct",
            "--output-dir",
            "/tmp/programs",
            "--engine-timeout",
            "5",
            "--narrate-failures",
            "--no-journal",
        ]);

        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.llm.model, "llama3.1:8b-instruct");
        assert_eq!(config.archive.dir, PathBuf::from("/tmp/programs"));
        assert_eq!(config.engine.timeout_secs, 5);
        assert!(config.narrate_failures);
        assert!(!config.archive.journal);
        assert!(!config.stream);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = parse(&["neurosym", "--engine-timeout", "0"]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert!(config.validate().is_err());
    }
}
