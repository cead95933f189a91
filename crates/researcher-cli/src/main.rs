//! Researcher - Multi-agent research runner
//!
//! - `researcher run <TASK>` drives the orchestrator to completion inside a
//!   workspace directory and prints the outcome
//! - `researcher tools` prints the tool descriptors a role offers the model

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use researcher_core::agent::{tool_registry, TraceRecorder, TraceSink};
use researcher_core::ai::{build_client, Message, ModelClient, ModelResponse};
use researcher_core::config::Provider;
use researcher_core::prompts::PromptLoader;
use researcher_core::search::{SearchProvider, TavilyClient};
use researcher_core::tools::{ToolDescriptor, ToolResult};
use researcher_core::{build_agent, AgentKind, AgentServices, Config, Workspace};

/// Researcher - Multi-agent research runner
#[derive(Parser)]
#[command(name = "researcher", version)]
#[command(about = "Run an orchestrator agent and its assistants on a research task", long_about = None)]
struct Cli {
    /// Config file (default: ~/.researcher/config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging for researcher crates
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write logs to a file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task with the orchestrator agent
    Run(RunArgs),

    /// Print the tool descriptors of an agent role as JSON
    Tools {
        /// Wire shape to print
        #[arg(long, value_enum, default_value_t = WireFormat::Anthropic)]
        format: WireFormat,

        /// orchestrator, searcher, analyzer, or writer
        #[arg(long, default_value = "orchestrator")]
        agent: String,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Task description
    task: String,

    /// Workspace directory all file and shell tools are confined to
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Orchestrator step budget
    #[arg(long)]
    max_steps: Option<usize>,

    /// anthropic or openai
    #[arg(long)]
    provider: Option<String>,

    /// Model id
    #[arg(short, long)]
    model: Option<String>,

    /// Directory of `<role>.txt` prompt overrides
    #[arg(long)]
    prompts_dir: Option<PathBuf>,

    /// Do not record agent_trace.jsonl / agent_trace.md
    #[arg(long)]
    no_trace: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum WireFormat {
    Anthropic,
    Openai,
}

fn init_logging(verbose: bool, log_file: Option<&PathBuf>) -> Result<()> {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if verbose {
        filter = filter
            .add_directive("researcher_core=debug".parse()?)
            .add_directive("researcher=debug".parse()?);
    }

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            builder
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

/// Stands in for a model when only descriptors are needed
struct DescriptorsOnly;

#[async_trait]
impl ModelClient for DescriptorsOnly {
    fn model(&self) -> &str {
        "none"
    }

    async fn generate(&self, _: &[Message], _: &[ToolDescriptor]) -> Result<ModelResponse> {
        anyhow::bail!("no model client configured")
    }
}

fn search_provider(config: &Config) -> Option<Arc<dyn SearchProvider>> {
    config
        .search
        .api_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .map(|key| Arc::new(TavilyClient::new(key)) as Arc<dyn SearchProvider>)
}

fn print_outcome(result: &ToolResult, workspace: &Workspace) {
    let status = if result.is_success() { "success" } else { "failed" };
    println!("Status: {}", status);
    if !result.content().is_empty() {
        println!("Summary: {}", result.content());
    }
    if let Some(error) = result.error() {
        if error != result.content() {
            println!("Error: {}", error);
        }
    }
    if let Some(steps) = result.metadata_value("steps_used") {
        println!("Steps used: {}", steps);
    }

    let files: Vec<&str> = result
        .metadata_value("output_files")
        .and_then(|v| v.as_array())
        .map(|files| files.iter().filter_map(|f| f.as_str()).collect())
        .unwrap_or_default();
    if !files.is_empty() {
        println!("Output files:");
        for file in files {
            println!("  - {}", workspace.display_path(file));
        }
    }
}

/// Apply command-line overrides on top of file and environment settings
fn apply_overrides(config: &mut Config, args: &RunArgs) -> Result<()> {
    if let Some(provider) = &args.provider {
        let provider: Provider = provider.parse()?;
        config.switch_provider(provider, |key| {
            std::env::var(key).ok().filter(|v| !v.is_empty())
        });
    }
    if let Some(model) = &args.model {
        config.model.model = Some(model.clone());
    }
    if let Some(dir) = &args.workspace {
        config.workspace = dir.clone();
    }
    if let Some(dir) = &args.prompts_dir {
        config.prompts_dir = Some(dir.clone());
    }
    if args.no_trace {
        config.trace = false;
    }
    Ok(())
}

async fn run(mut config: Config, args: RunArgs) -> Result<ExitCode> {
    apply_overrides(&mut config, &args)?;

    let workspace = Arc::new(
        Workspace::open(&config.workspace)
            .with_context(|| format!("failed to open workspace {}", config.workspace.display()))?,
    );
    let client = build_client(&config.model)?;
    tracing::info!(
        provider = %config.model.provider,
        model = client.model(),
        workspace = %workspace,
        "Starting research run"
    );

    let recorder = config
        .trace
        .then(|| Arc::new(TraceRecorder::new(workspace.root())));
    let prompts = PromptLoader::new(config.prompts_override_dir());
    let search = search_provider(&config);

    let services = AgentServices::new(client, Arc::clone(&workspace), config)
        .with_prompts(prompts)
        .with_search(search)
        .with_trace(recorder.clone().map(|r| r as Arc<dyn TraceSink>));

    let mut orchestrator = build_agent(AgentKind::Orchestrator, &services, args.max_steps, None)?;
    let result = orchestrator.run(&args.task).await;

    if let Some(recorder) = &recorder {
        recorder.finalize();
        tracing::info!(path = %recorder.markdown_path().display(), "Trace written");
    }

    print_outcome(&result, &workspace);
    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_tools(config: Config, format: WireFormat, agent: &str) -> Result<()> {
    let kind: AgentKind = agent.parse()?;
    let workspace = Arc::new(Workspace::new(&config.workspace, false)?);
    let search = search_provider(&config)
        .or_else(|| Some(Arc::new(TavilyClient::new("")) as Arc<dyn SearchProvider>));
    let services =
        AgentServices::new(Arc::new(DescriptorsOnly), workspace, config).with_search(search);

    let registry = tool_registry(kind, &services)?;
    let descriptors: Vec<serde_json::Value> = registry
        .descriptors()
        .iter()
        .map(|d| match format {
            WireFormat::Anthropic => d.to_anthropic(),
            WireFormat::Openai => d.to_openai(),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&descriptors)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_ref())?;

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => run(config, args).await,
        Commands::Tools { format, agent } => {
            print_tools(config, format, &agent)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
