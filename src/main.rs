//! lectern CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use lectern::{
    api::{serve_api, EnqueueResponse},
    commands::{
        cmd_enqueue, cmd_init, cmd_job, cmd_jobs, cmd_material_status, cmd_query, cmd_worker,
        load_history, print_course_stats, print_enqueued, print_init, print_job, print_jobs,
        print_material_status, print_query_response, print_queue_stats, print_requeued,
        print_worker_pass, InitOptions, QueryOptions,
    },
    config::Config,
    error::Result,
    logging::init_logging,
    meta::NewMaterial,
    services::Services,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::error;

#[derive(Parser)]
#[command(name = "lectern")]
#[command(version, about = "Course material ingestion queue and RAG question answering", long_about = None)]
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
    /// Initialize lectern configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Queue a material for ingestion
    Enqueue {
        /// Material ID
        material_id: String,

        /// URL of the uploaded file
        file_url: String,

        /// Display title (defaults to the material ID)
        #[arg(short, long)]
        title: Option<String>,

        /// Course the material belongs to
        #[arg(long)]
        course: String,
    },

    /// Show processing status of a material
    Status {
        material_id: String,
    },

    /// Show a queue job
    Job {
        job_id: String,
    },

    /// List queue jobs
    Jobs {
        /// Filter by status (pending, processing, completed, failed)
        #[arg(long)]
        status: Option<String>,

        /// Maximum number of jobs
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },

    /// Show job counts per status
    QueueStats,

    /// Requeue failed jobs that still have attempts left
    RetryFailed,

    /// Requeue one failed job
    Retry {
        job_id: String,

        /// Start over with zero attempts
        #[arg(long)]
        reset_attempts: bool,
    },

    /// Return jobs with expired leases to the queue
    Reclaim,

    /// Process queued jobs
    Worker {
        /// Drain the queue once and exit
        #[arg(long)]
        once: bool,
    },

    /// Ask a question about course materials
    Query {
        /// The question
        question: String,

        /// Restrict retrieval to one course
        #[arg(long)]
        course: Option<String>,

        /// JSON file with prior turns: [{"question": ..., "answer": ...}]
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Show material and chunk counts
    Stats {
        /// Restrict to one course
        #[arg(long)]
        course: Option<String>,
    },

    /// Start the HTTP API server
    Serve {
        /// Bind address (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not run the background worker in this process
        #[arg(long)]
        no_worker: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
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
    init_logging(cli.verbose, cli.json);

    // Handle completions command (doesn't need config/db)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "lectern", &mut std::io::stdout());
        return Ok(());
    }

    // Handle init command specially (doesn't need existing config)
    if let Commands::Init { force } = cli.command {
        let config = cmd_init(InitOptions::from_config_arg(cli.config, force)).await?;
        if cli.json {
            print_json(&config.paths)?;
        } else {
            print_init(&config);
        }
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let services = Services::build(&config).await?;
    let queue = &services.queue;
    let json = cli.json;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Enqueue {
            material_id,
            file_url,
            title,
            course,
        } => {
            let material = NewMaterial {
                title: title.unwrap_or_else(|| material_id.clone()),
                id: material_id,
                file_url,
                course_id: course,
            };
            let enqueued = cmd_enqueue(queue, material).await?;
            if json {
                print_json(&EnqueueResponse {
                    job_id: enqueued.job.id.clone(),
                    created: enqueued.created,
                    status: enqueued.job.status.clone(),
                })?;
            } else {
                print_enqueued(&enqueued);
            }
        }

        Commands::Status { material_id } => {
            let report = cmd_material_status(queue, &material_id).await?;
            if json {
                print_json(&report)?;
            } else {
                print_material_status(&report);
            }
        }

        Commands::Job { job_id } => {
            let job = cmd_job(queue, &job_id).await?;
            if json {
                print_json(&job)?;
            } else {
                print_job(&job);
            }
        }

        Commands::Jobs { status, limit } => {
            let jobs = cmd_jobs(queue, status.as_deref(), limit).await?;
            if json {
                print_json(&jobs)?;
            } else {
                print_jobs(&jobs);
            }
        }

        Commands::QueueStats => {
            let counts = queue.get_queue_stats().await?;
            if json {
                print_json(&counts)?;
            } else {
                print_queue_stats(&counts);
            }
        }

        Commands::RetryFailed => {
            let jobs = queue.retry_failed().await?;
            if json {
                print_json(&jobs)?;
            } else {
                print_requeued("Requeued", &jobs);
            }
        }

        Commands::Retry {
            job_id,
            reset_attempts,
        } => {
            let job = queue.retry_job(&job_id, reset_attempts).await?;
            if json {
                print_json(&job)?;
            } else {
                println!("✓ Job '{}' requeued", job.id);
                print_job(&job);
            }
        }

        Commands::Reclaim => {
            let jobs = queue.reclaim_expired_leases().await?;
            if json {
                print_json(&jobs)?;
            } else {
                print_requeued("Reclaimed", &jobs);
            }
        }

        Commands::Worker { once } => {
            if let Some(pass) = cmd_worker(queue.clone(), once).await? {
                if json {
                    print_json(&pass)?;
                } else {
                    print_worker_pass(&pass);
                }
            }
        }

        Commands::Query {
            question,
            course,
            history,
        } => {
            let history = match history {
                Some(path) => load_history(&path)?,
                None => Vec::new(),
            };
            let options = QueryOptions {
                course_id: course,
                history,
            };
            let response = cmd_query(&services.engine, &question, options).await?;
            if json {
                print_json(&response)?;
            } else {
                print_query_response(&response);
            }
        }

        Commands::Stats { course } => {
            let stats = services.engine.get_course_stats(course.as_deref()).await?;
            if json {
                print_json(&stats)?;
            } else {
                print_course_stats(&stats);
            }
        }

        Commands::Serve {
            host,
            port,
            no_worker,
        } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let run_worker = config.server.run_worker && !no_worker;
            serve_api(&services, &host, port, config.server.enable_cors, run_worker).await?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = match path {
        Some(p) if p.is_dir() => p.join("config.toml"),
        Some(p) => p.to_path_buf(),
        None => Config::default_config_path(),
    };

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'lectern init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
