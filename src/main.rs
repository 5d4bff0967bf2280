//! ragline CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use ragline::{
    commands::{
        answer_question, cmd_agent_add, cmd_agent_link, cmd_agent_list, cmd_init, cmd_kb_add,
        cmd_kb_list, cmd_reprocess, cmd_status, print_status, upload_and_ingest, AgentOptions,
        IngestOptions, InitOptions, ReprocessOptions,
    },
    config::Config,
    error::Result,
    learn::{spawn_worker, LearnQueue},
    AppContext,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ragline")]
#[command(version, about = "Multi-tenant RAG pipeline CLI", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize ragline configuration and database
    Init {
        /// Base directory (defaults to ~/.ragline)
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Manage knowledge bases
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },

    /// Manage agents
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },

    /// Ingest a local file into a knowledge base
    Ingest {
        /// Tenant identifier
        tenant: String,

        /// Knowledge base name or id
        kb: String,

        /// Path to the file
        file: PathBuf,

        /// Re-run extraction even when text is already cached
        #[arg(long)]
        force_extract: bool,
    },

    /// Ask an agent a question
    Ask {
        /// Tenant identifier
        tenant: String,

        /// Agent name or id
        agent: String,

        /// The question
        question: String,
    },

    /// Re-ingest a tenant's documents
    Reprocess {
        /// Tenant identifier
        tenant: String,

        /// Restrict to one knowledge base (name or id)
        #[arg(long)]
        kb: Option<String>,

        /// Re-run extraction instead of reusing cached text
        #[arg(long)]
        force_extract: bool,
    },

    /// Show a tenant's status
    Status {
        /// Tenant identifier
        tenant: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum KbAction {
    /// Create a knowledge base
    Add {
        tenant: String,
        name: String,

        /// Human-readable description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List a tenant's knowledge bases
    List { tenant: String },
}

#[derive(Subcommand)]
enum AgentAction {
    /// Create an agent
    Add {
        tenant: String,
        name: String,

        /// System prompt
        #[arg(long)]
        system_prompt: Option<String>,

        /// Completion model override
        #[arg(long)]
        model: Option<String>,

        /// Sampling temperature override
        #[arg(long)]
        temperature: Option<f32>,

        /// Completion budget override
        #[arg(long)]
        max_tokens: Option<i64>,

        /// Answers below this confidence are handed off to a human
        #[arg(long, default_value = "0.6")]
        confidence_threshold: f32,

        /// Disable the learning write-back for this agent
        #[arg(long)]
        no_learn: bool,

        /// Knowledge bases (names or ids) to link
        #[arg(long)]
        kb: Vec<String>,
    },

    /// List a tenant's agents
    List { tenant: String },

    /// Link an agent to a knowledge base
    Link {
        tenant: String,
        agent: String,
        kb: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Init and completions need no existing config/db/store
    match cli.command {
        Commands::Init { base_dir, force } => {
            return cmd_init(InitOptions { base_dir, force }).await;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "ragline", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let config = match cli.config.as_deref() {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    let ctx = Arc::new(AppContext::build(config).await?);

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Kb { action } => match action {
            KbAction::Add {
                tenant,
                name,
                description,
            } => {
                let kb = cmd_kb_add(&ctx, &tenant, &name, description).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&kb)?);
                } else {
                    println!("Created knowledge base '{}' ({})", kb.name, kb.id);
                }
            }
            KbAction::List { tenant } => {
                let kbs = cmd_kb_list(&ctx, &tenant).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&kbs)?);
                } else {
                    for kb in kbs {
                        println!(
                            "{}  {}  {}",
                            kb.id,
                            kb.name,
                            kb.description.unwrap_or_default()
                        );
                    }
                }
            }
        },

        Commands::Agent { action } => match action {
            AgentAction::Add {
                tenant,
                name,
                system_prompt,
                model,
                temperature,
                max_tokens,
                confidence_threshold,
                no_learn,
                kb,
            } => {
                let agent = cmd_agent_add(
                    &ctx,
                    &tenant,
                    &name,
                    AgentOptions {
                        system_prompt,
                        model,
                        temperature,
                        max_tokens,
                        confidence_threshold,
                        learn_enabled: !no_learn,
                        kbs: kb,
                    },
                )
                .await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&agent)?);
                } else {
                    println!("Created agent '{}' ({})", agent.name, agent.id);
                }
            }
            AgentAction::List { tenant } => {
                let agents = cmd_agent_list(&ctx, &tenant).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&agents)?);
                } else {
                    for agent in agents {
                        println!(
                            "{}  {}  threshold={}",
                            agent.id, agent.name, agent.confidence_threshold
                        );
                    }
                }
            }
            AgentAction::Link { tenant, agent, kb } => {
                cmd_agent_link(&ctx, &tenant, &agent, &kb).await?;
                println!("Linked");
            }
        },

        Commands::Ingest {
            tenant,
            kb,
            file,
            force_extract,
        } => {
            let doc = upload_and_ingest(
                &ctx,
                &tenant,
                &kb,
                &file,
                &IngestOptions { force_extract },
            )
            .await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                println!(
                    "Document '{}' ({}) -> {} ({} chunks)",
                    doc.title, doc.id, doc.status, doc.chunk_count
                );
                if let Some(message) = doc.error_message {
                    println!("  error: {}", message);
                }
            }
        }

        Commands::Ask {
            tenant,
            agent,
            question,
        } => {
            let (queue, rx) = LearnQueue::new(ctx.config.learn.queue_capacity);
            let worker = if ctx.config.learn.enabled {
                Some(spawn_worker(ctx.clone(), rx))
            } else {
                drop(rx);
                None
            };

            let outcome = answer_question(&ctx, Some(&queue), &tenant, &agent, &question).await?;

            // Let the worker drain any queued write-back before exiting
            drop(queue);
            if let Some(worker) = worker {
                let _ = worker.await;
            }

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.answer);
                println!(
                    "\nconfidence: {:.2}  handoff: {}",
                    outcome.confidence, outcome.should_handoff
                );
                for citation in &outcome.citations {
                    println!(
                        "  [{}#{}] {} ({:.0}%)",
                        citation.doc_id,
                        citation.chunk_index,
                        citation.doc_title,
                        citation.score * 100.0
                    );
                }
            }
        }

        Commands::Reprocess {
            tenant,
            kb,
            force_extract,
        } => {
            let stats = cmd_reprocess(
                &ctx,
                &tenant,
                ReprocessOptions { kb, force_extract },
            )
            .await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!(
                    "Reprocessed {} documents: {} completed, {} failed",
                    stats.total, stats.completed, stats.failed
                );
            }
        }

        Commands::Status { tenant } => {
            let report = cmd_status(&ctx, &tenant).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_status(&report);
            }
        }
    }

    Ok(())
}
