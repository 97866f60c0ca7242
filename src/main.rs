use clap::Parser;
use script_filter::{
    DirectoryResolver, FilterConfig, Message, Processor, ScriptLanguage, ScriptedFilter, Settings,
};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter stdin lines through a script; lines whose verdict is truthy go to stdout.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Script file (.expr or .rhai)
    #[arg(long, env = "SCRIPT_FILTER_SCRIPT")]
    script: Option<PathBuf>,
    /// Script language; inferred from the file extension when omitted
    #[arg(long, value_enum, env = "SCRIPT_FILTER_LANGUAGE")]
    language: Option<ScriptLanguage>,
    /// Variables as key=value pairs, comma or newline separated
    #[arg(long, env = "SCRIPT_FILTER_VARIABLES")]
    variables: Option<String>,
    /// Properties file with more variables (inline ones win)
    #[arg(long, env = "SCRIPT_FILTER_VARIABLES_LOCATION")]
    variables_location: Option<PathBuf>,
    /// Directories searched for grabbed modules (repeatable)
    #[arg(long = "module-path", env = "SCRIPT_FILTER_MODULE_PATH", value_delimiter = ',')]
    module_path: Vec<PathBuf>,
    /// Extra strings treated as false (repeatable)
    #[arg(long = "falsy", env = "SCRIPT_FILTER_FALSY", value_delimiter = ',')]
    falsy: Vec<String>,
    #[arg(long, env = "SCRIPT_FILTER_MAX_OPERATIONS")]
    max_operations: Option<u64>,
    #[arg(long, env = "SCRIPT_FILTER_MAX_CALL_DEPTH")]
    max_call_depth: Option<usize>,
    /// TOML settings file; command-line values override it
    #[arg(long, env = "SCRIPT_FILTER_CONFIG")]
    config: Option<PathBuf>,
    /// Parse each input line as JSON instead of taking it as a string
    #[arg(long)]
    json: bool,
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn settings(&self) -> Settings {
        Settings {
            script: self.script.clone(),
            language: self.language,
            variables: self.variables.clone(),
            variables_location: self.variables_location.clone(),
            module_path: self.module_path.clone(),
            falsy: self.falsy.clone(),
            max_operations: self.max_operations,
            max_call_depth: self.max_call_depth,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn build_filter(args: &Args) -> script_filter::Result<ScriptedFilter> {
    let mut settings = match args.config.as_deref() {
        Some(path) => Settings::from_toml_file(path)?,
        None => Settings::default(),
    };
    settings = settings.merge(args.settings());

    let config = FilterConfig::load(&settings)?;
    // Without a module path, modules sit next to the script.
    let roots = if settings.module_path.is_empty() {
        settings
            .script
            .as_deref()
            .and_then(|p| p.parent())
            .map(|dir| vec![dir.to_path_buf()])
            .unwrap_or_default()
    } else {
        settings.module_path.clone()
    };
    ScriptedFilter::initialize(config, &DirectoryResolver::new(roots))
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments.
    let args = Args::parse();
    init_tracing(args.verbose);

    let filter = match build_filter(&args) {
        Ok(f) => Arc::new(f),
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    let mut binding = Processor::bind(filter, 256);
    let input = binding.input;
    let json = args.json;

    // Feed stdin lines as messages; returns how many lines were rejected.
    let reader = tokio::spawn(async move {
        let mut rejected = 0u64;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "cannot read stdin");
                    break;
                }
            };
            let payload = if json {
                match serde_json::from_str::<Value>(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        rejected += 1;
                        tracing::error!(error = %e, line = %line, "invalid JSON line rejected");
                        continue;
                    }
                }
            } else {
                Value::String(line)
            };
            if input.send(Message::new(payload)).await.is_err() {
                break;
            }
        }
        rejected
    });

    // Failures are reported, never forwarded.
    let mut errors = binding.errors;
    let reporter = tokio::spawn(async move {
        while let Some(failed) = errors.recv().await {
            tracing::error!(error = %failed.error, payload = %failed.message.render_payload(), "message rejected");
        }
    });

    let mut stdout = tokio::io::stdout();
    while let Some(message) = binding.output.recv().await {
        let mut line = message.render_payload();
        line.push('\n');
        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            tracing::error!(error = %e, "cannot write stdout");
            return ExitCode::FAILURE;
        }
    }
    if let Err(e) = stdout.flush().await {
        tracing::error!(error = %e, "cannot flush stdout");
        return ExitCode::FAILURE;
    }

    let rejected = match reader.await {
        Ok(n) => n,
        Err(e) => {
            tracing::error!(error = %e, "stdin reader task failed");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = reporter.await {
        tracing::error!(error = %e, "error reporter task failed");
        return ExitCode::FAILURE;
    }
    match binding.handle.await {
        Ok(stats) if stats.failed > 0 || rejected > 0 => ExitCode::from(2),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "processor task failed");
            ExitCode::FAILURE
        }
    }
}
