use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing_subscriber::EnvFilter;

use journey_flow::{
    FlowContext, FlowNavigator, FlowRunner, FormSubmission, RunnerConfig, StepOutcome,
    interpolate,
    json_output::validate_path_to_json,
    lint::lint_builtin_rules,
    loader::load_flow_from_path,
};

#[derive(Parser, Debug)]
#[command(name = "journey-flow", about = "Validate and drive CMS page journeys")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and lint flow documents.
    Validate(ValidateArgs),
    /// Print the node that follows `--node` for a given context.
    Next(NextArgs),
    /// Render a template against a context.
    Interpolate(InterpolateArgs),
    /// Drive a flow instance, feeding one answer object per page.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Emit a JSON report instead of text (single file only).
    #[arg(long)]
    json: bool,
    #[arg(required = true)]
    targets: Vec<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct ContextArgs {
    /// Context as an inline JSON object.
    #[arg(long = "context", conflicts_with = "context_file")]
    context: Option<String>,
    /// Context read from a JSON file.
    #[arg(long = "context-file")]
    context_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct NextArgs {
    #[arg(long = "flow")]
    flow: PathBuf,
    #[arg(long = "node")]
    node: String,
    #[command(flatten)]
    context: ContextArgs,
}

#[derive(Args, Debug)]
struct InterpolateArgs {
    #[arg(long = "template")]
    template: String,
    #[command(flatten)]
    context: ContextArgs,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long = "flow")]
    flow: PathBuf,
    /// JSON array of form objects, consumed one per page.
    #[arg(long = "answers")]
    answers: Option<PathBuf>,
    /// Directory for persisted contexts (overrides the config file).
    #[arg(long = "storage")]
    storage: Option<PathBuf>,
    /// Runner configuration (JSON, or TOML with the `toml` feature).
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Base URL for relative API urls (overrides the config file).
    #[arg(long = "api-base-url")]
    api_base_url: Option<url::Url>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Validate(args) => handle_validate(args),
        Commands::Next(args) => handle_next(args),
        Commands::Interpolate(args) => handle_interpolate(args),
        Commands::Run(args) => handle_run(args),
    }
}

fn handle_validate(args: ValidateArgs) -> Result<()> {
    if args.json {
        if args.targets.len() != 1 {
            anyhow::bail!("--json mode expects exactly one target file");
        }
        let output = validate_path_to_json(&args.targets[0]);
        let ok = output.ok;
        write_stdout_line(&output.into_string())?;
        return if ok {
            Ok(())
        } else {
            Err(anyhow::anyhow!("validation failed"))
        };
    }

    let mut failures = 0usize;
    for target in &args.targets {
        validate_path(target, &mut failures)?;
    }
    if failures == 0 {
        println!("All flows valid");
        Ok(())
    } else {
        Err(anyhow::anyhow!("{failures} flow(s) failed validation"))
    }
}

fn validate_path(path: &Path, failures: &mut usize) -> Result<()> {
    if path.is_dir() {
        let entries = fs::read_dir(path)
            .with_context(|| format!("failed to read directory {}", path.display()))?;
        for entry in entries {
            let entry = entry.context("failed to read directory entry")?;
            let child = entry.path();
            if child.is_dir() || child.extension().is_some_and(|ext| ext == "json") {
                validate_path(&child, failures)?;
            }
        }
        return Ok(());
    }

    match load_flow_from_path(path) {
        Ok(flow) => {
            let lint_errors = lint_builtin_rules(&flow);
            if lint_errors.is_empty() {
                println!("OK  {} ({})", path.display(), flow.id);
            } else {
                *failures += 1;
                for err in lint_errors {
                    eprintln!("ERR {}: {err}", path.display());
                }
            }
        }
        Err(err) => {
            *failures += 1;
            eprintln!("ERR {}: {err}", path.display());
        }
    }
    Ok(())
}

fn handle_next(args: NextArgs) -> Result<()> {
    let flow = load_flow_from_path(&args.flow)?;
    let ctx = read_context(&args.context)?;
    let navigator = FlowNavigator::from_doc(flow);
    match navigator.next(&args.node, &ctx)? {
        Some(node) => println!("{}", node.id),
        None => println!("none"),
    }
    Ok(())
}

fn handle_interpolate(args: InterpolateArgs) -> Result<()> {
    let ctx = read_context(&args.context)?;
    println!("{}", interpolate(&args.template, &ctx));
    Ok(())
}

fn handle_run(args: RunArgs) -> Result<()> {
    let flow = load_flow_from_path(&args.flow)?;
    let mut config = match &args.config {
        Some(path) => RunnerConfig::from_path(path)?,
        None => RunnerConfig::default(),
    };
    if let Some(dir) = args.storage {
        config.storage_dir = Some(dir);
    }
    if let Some(base) = args.api_base_url {
        config.api_base_url = Some(base);
    }
    let answers = match &args.answers {
        Some(path) => read_answers(path)?,
        None => Vec::new(),
    };

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(async move {
        let mut runner = FlowRunner::builder(flow).config(config).build()?;
        let mut outcome = runner.start().await?;
        print_outcome(&outcome)?;
        let mut answers = answers.into_iter();
        while let StepOutcome::Render { .. } = outcome {
            let Some(answer) = answers.next() else {
                break;
            };
            let form = FormSubmission::from_object(answer)?;
            outcome = runner.submit(&form).await?;
            print_outcome(&outcome)?;
        }
        Ok::<(), anyhow::Error>(())
    })
}

fn print_outcome(outcome: &StepOutcome) -> Result<()> {
    let line = serde_json::to_string(outcome).context("failed to serialize step")?;
    write_stdout_line(&line)
}

fn read_answers(path: &Path) -> Result<Vec<Value>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read answers {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("answers {} is not valid JSON", path.display()))?;
    match value {
        Value::Array(items) => Ok(items),
        other => anyhow::bail!(
            "answers {} must be a JSON array, got {}",
            path.display(),
            kind_name(&other)
        ),
    }
}

fn read_context(args: &ContextArgs) -> Result<FlowContext> {
    let value: Value = match (&args.context, &args.context_file) {
        (Some(inline), _) => {
            serde_json::from_str(inline).context("--context is not valid JSON")?
        }
        (None, Some(path)) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read context {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("context {} is not valid JSON", path.display()))?
        }
        (None, None) => return Ok(FlowContext::new()),
    };
    Ok(FlowContext::try_from(value)?)
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn write_stdout_line(line: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{line}").context("failed to write to stdout")?;
    stdout.flush().context("failed to flush stdout")
}
