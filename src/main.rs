use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use trellis_rs::chat::build_chat_graph;
use trellis_rs::graph::{Graph, RunOutcome, SqliteCheckpointStore, WorkflowState};
use trellis_rs::llm::openai::OpenAiModel;
use trellis_rs::research::{build_research_graph, initial_state, prompts::PromptLibrary};
use trellis_rs::retrieval::DocIndex;
use trellis_rs::server::{serve, ServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8000)]
        port: u16,

        /// The model to use
        #[arg(short, long, default_value = "gpt-3.5-turbo")]
        model: String,

        /// Path to the checkpoint database
        #[arg(long, default_value = "checkpoints.db")]
        db: PathBuf,

        /// Directory of research documents to index
        #[arg(long, default_value = "data/docs")]
        docs: PathBuf,

        /// Path to the prompt table
        #[arg(long, default_value = "data/prompts.json")]
        prompts: PathBuf,
    },
    /// Run the human-in-the-loop chat workflow in the terminal
    Chat {
        /// The opening message
        #[arg(short, long)]
        message: String,

        /// Session identifier for checkpointing
        #[arg(short, long, default_value = "cli")]
        session: String,

        /// The model to use
        #[arg(long, default_value = "gpt-3.5-turbo")]
        model: String,

        /// Path to the checkpoint database
        #[arg(long, default_value = "checkpoints.db")]
        db: PathBuf,
    },
    /// Generate an equity research report
    Research {
        /// Company code, e.g. AAPL
        #[arg(short, long)]
        company: String,

        /// Sector code, e.g. IT
        #[arg(short, long)]
        sector: String,

        /// Report type, e.g. FirstCutReport
        #[arg(short, long)]
        report_type: String,

        /// Review passes: 1 runs the draft-critique-revise loop, 0 drafts once
        #[arg(long, default_value_t = 1)]
        iterations: u32,

        /// Session identifier for checkpointing
        #[arg(long, default_value = "cli")]
        session: String,

        /// The model to use
        #[arg(long, default_value = "gpt-3.5-turbo")]
        model: String,

        /// Path to the checkpoint database
        #[arg(long, default_value = "checkpoints.db")]
        db: PathBuf,

        /// Directory of research documents to index
        #[arg(long, default_value = "data/docs")]
        docs: PathBuf,

        /// Path to the prompt table
        #[arg(long, default_value = "data/prompts.json")]
        prompts: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Serve {
            port,
            model,
            db,
            docs,
            prompts,
        } => {
            serve(ServerConfig {
                port,
                model_name: model,
                db_path: db,
                docs_dir: docs,
                prompts_path: prompts,
            })
            .await?;
        }
        Commands::Chat {
            message,
            session,
            model,
            db,
        } => {
            let model = Arc::new(OpenAiModel::new(model)?);
            let checkpoints = Arc::new(SqliteCheckpointStore::open(db)?);
            let graph = build_chat_graph(model, checkpoints)?;

            let report = graph
                .run(WorkflowState::from_user_message(message.as_str()), &session)
                .await?;
            run_chat_loop(&graph, &session, report.outcome).await?;
        }
        Commands::Research {
            company,
            sector,
            report_type,
            iterations,
            session,
            model,
            db,
            docs,
            prompts,
        } => {
            let model = Arc::new(OpenAiModel::new(model)?);
            let checkpoints = Arc::new(SqliteCheckpointStore::open(db)?);
            let retriever = Arc::new(DocIndex::open(docs)?);
            let prompts = Arc::new(match PromptLibrary::from_file(&prompts) {
                Ok(prompts) => prompts,
                Err(e) => {
                    log::warn!("Failed to load prompts, using generic prompts only: {}", e);
                    PromptLibrary::empty()
                }
            });
            let graph = build_research_graph(model, retriever, prompts, checkpoints)?;

            let state = initial_state(&company, &sector, &report_type, iterations)?;
            let report = graph.run(state, &session).await?;
            match report.outcome {
                RunOutcome::Completed(state) => {
                    println!(
                        "{}",
                        state.final_report.as_deref().unwrap_or("No report generated")
                    );
                }
                RunOutcome::Suspended { .. } => {
                    anyhow::bail!("research graph suspended unexpectedly");
                }
            }
        }
    }

    Ok(())
}

/// Keep answering questions from stdin until the run completes.
async fn run_chat_loop(graph: &Graph, session: &str, mut outcome: RunOutcome) -> Result<()> {
    loop {
        match outcome {
            RunOutcome::Completed(state) => {
                println!("{}", state.last_assistant_text().unwrap_or("(no response)"));
                return Ok(());
            }
            RunOutcome::Suspended { question } => {
                print!("{}\n> ", question);
                io::stdout().flush()?;
                let mut answer = String::new();
                io::stdin().lock().read_line(&mut answer)?;
                let report = graph.resume(session, answer.trim()).await?;
                outcome = report.outcome;
            }
        }
    }
}
