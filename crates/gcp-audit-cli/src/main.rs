//! gcp-audit CLI
//!
//! Audit reports for Cloud Run services and gateway costs, plus a Gemini
//! chat and agent wired to the same cloud tools.

mod config;
mod telemetry;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser, Subcommand};
use gcp_audit_gemini::{Agent, AgentTool, GeminiClient, chat, checks};
use gcp_audit_report::{analyze_costs, audit_services};
use gcp_audit_tools::{GcpTools, SystemRunner};
use std::io::{self, Write};
use std::process;

use crate::config::{Config, ConfigArgs};

#[derive(Parser, Debug)]
#[command(name = "gcp-audit", version, about = "Audit Cloud Run services and gateway costs")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify every Cloud Run service by recent traffic
    Audit,
    /// Cost, cache and model usage report
    Costs,
    /// Interactive Gemini chat
    Chat,
    /// Check Google AI Studio, falling back to Vertex AI
    CheckGemini,
    /// Ask the tool-calling agent a trivial question
    CheckAgent,
    /// Ask the agent one question
    Ask {
        prompt: String,
    },
    /// Run one agent tool and print its JSON result
    Tool {
        name: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// List the agent tools
    Tools,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = telemetry::init_telemetry(cli.verbose) {
        eprintln!("warning: logging disabled: {e}");
    }

    match run(cli).await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn build_tools(config: &Config) -> GcpTools {
    let runner = SystemRunner::new(&config.gcloud_bin, &config.bq_bin);
    GcpTools::new(Box::new(runner), &config.project, &config.region).with_tables(config.table_refs())
}

const fn exit_code(ok: bool) -> i32 {
    if ok { 0 } else { 1 }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    if let Command::Tools = cli.command {
        for tool in AgentTool::ALL {
            println!("{:<30} {}", tool.name(), tool.description());
        }
        return Ok(0);
    }

    let config = Config::load(&cli.config).context("invalid configuration")?;
    let tools = build_tools(&config);
    let mut stdout = io::stdout().lock();

    match cli.command {
        Command::Audit => {
            writeln!(stdout, "\n🔍 Analyzing Cloud Run services in {}...", config.region)?;
            let audit = audit_services(&tools, &config.audit_settings())?;
            write!(stdout, "{audit}")?;
            Ok(0)
        }
        Command::Costs => {
            let analysis = analyze_costs(&tools, &config.cost_settings());
            write!(stdout, "{analysis}")?;
            Ok(0)
        }
        Command::Chat => {
            let client = GeminiClient::from_settings(&config.gemini, &tools)?;
            chat::run_chat(&client, &config.project, &config.region, io::stdin().lock(), &mut stdout)
                .await?;
            Ok(0)
        }
        Command::CheckGemini => {
            let mut ok = checks::check_ai_studio(&config.gemini, &mut stdout).await?;
            if !ok {
                writeln!(stdout, "\nTrying Vertex AI as alternative...")?;
                ok = checks::check_vertex(&config.gemini, &tools, &mut stdout).await?;
            }
            Ok(exit_code(ok))
        }
        Command::CheckAgent => {
            let ok = checks::check_agent(&config.gemini, tools, &mut stdout).await?;
            Ok(exit_code(ok))
        }
        Command::Ask { prompt } => {
            let client = GeminiClient::from_settings(&config.gemini, &tools)?;
            let answer = Agent::new(client, tools).think(&prompt).await?;
            writeln!(stdout, "{answer}")?;
            Ok(0)
        }
        Command::Tool { name, args } => {
            let Some(tool) = AgentTool::from_name(&name) else {
                bail!("unknown tool `{name}`, see `gcp-audit tools`");
            };
            let args: serde_json::Value =
                serde_json::from_str(&args).context("--args must be a JSON object")?;
            if !args.is_object() {
                bail!("--args must be a JSON object, got {args}");
            }

            let result = tool.invoke(&tools, &args).await?;
            writeln!(stdout, "{}", serde_json::to_string_pretty(&result)?)?;
            Ok(0)
        }
        Command::Tools => Ok(0),
    }
}
