use clap::{Parser, Subcommand};
use exam_console::api::client::MetricPaths;
use exam_console::api::models::{
    BulkEnrollRequest, CreateApplicantRequest, EvaluateExamRequest, SubmitResponseRequest,
    MAX_PARALLEL_PROCESSES,
};
use exam_console::config::{ConfigLoader, ConsoleConfig};
use exam_console::filter::{filter_applicants, filter_logs, LevelFilter};
use exam_console::output::{render, ConsoleOutput, Notice, OutputHandler};
use exam_console::{
    transfer, ApiClient, DataKind, Error, ExamApi, FakeBackend, FallbackGenerator, MetricsPoller,
    MetricsSource, TokenStore,
};
use futures::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::WatchStream;

#[derive(Parser)]
#[command(name = "exam-console")]
#[command(version = "0.1.0")]
#[command(about = "Administrative console for the parallel exam system", long_about = None)]
struct Cli {
    /// Configuration file (JSON/YAML/TOML)
    #[arg(short, long, global = true, env = "EXAM_CONSOLE_CONFIG")]
    config: Option<PathBuf>,

    /// Use an in-memory demo backend instead of the real one
    #[arg(long, global = true)]
    offline: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    Check {
        /// Path to the configuration file
        path: PathBuf,
    },
    /// Store the bearer token used for backend requests
    Login {
        #[arg(long, env = "EXAM_CONSOLE_LOGIN_TOKEN", hide_env_values = true)]
        token: String,
    },
    /// Forget the stored bearer token
    Logout,
    /// Check that the backend is reachable
    Health,
    /// Show backend configuration and limits
    System,
    /// Manage exams
    Exams {
        #[command(subcommand)]
        command: ExamCommand,
    },
    /// Manage applicants
    Applicants {
        #[command(subcommand)]
        command: ApplicantCommand,
    },
    /// Work with exam sessions
    Sessions {
        #[command(subcommand)]
        command: SessionCommand,
    },
    /// Run the parallel evaluation of an exam
    Evaluate {
        exam_id: String,

        /// Number of parallel evaluator processes
        #[arg(short, long, default_value_t = 4,
              value_parser = clap::value_parser!(u32).range(1..=(MAX_PARALLEL_PROCESSES as i64)))]
        processes: u32,
    },
    /// Show score statistics for an exam
    Stats { exam_id: String },
    /// Show recent activity logs
    Logs {
        /// Only entries whose message or source contains this text
        #[arg(short, long, default_value = "")]
        search: String,

        /// all, info, success, warning or error
        #[arg(short, long, default_value = "all")]
        level: LevelFilter,

        /// Write the matching entries to a .csv or .json file
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Live dashboard of evaluation progress
    Monitor {
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration_secs: Option<u64>,
    },
}

#[derive(Subcommand)]
enum ExamCommand {
    List {
        #[arg(long, default_value_t = 0)]
        skip: u32,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
    Show {
        id: String,
    },
    /// Create an exam from a JSON/YAML/TOML definition
    Create {
        file: PathBuf,
    },
    /// Make a draft exam available
    Activate {
        id: String,
    },
    /// List applicants enrolled in an exam
    Enrollments {
        exam_id: String,
    },
    Enroll {
        exam_id: String,
        #[arg(required = true, num_args = 1..)]
        applicant_ids: Vec<String>,
    },
    /// Start sessions for every enrolled applicant
    StartAll {
        exam_id: String,
    },
}

#[derive(Subcommand)]
enum ApplicantCommand {
    List,
    Show {
        #[arg(required_unless_present = "email")]
        id: Option<String>,
        #[arg(long, conflicts_with = "id")]
        email: Option<String>,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        registration_number: Option<String>,
    },
    /// Register applicants from a CSV file (name,email,registration_number)
    Import {
        file: PathBuf,
        /// Validate the file without creating anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Search by name, email or registration number
    Search {
        term: String,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    Submit {
        session_id: String,
        question_id: String,
        answer: String,
    },
    End {
        session_id: String,
    },
    Responses {
        session_id: String,
    },
}

struct Backend {
    api: Arc<dyn ExamApi>,
    metrics: Arc<dyn MetricsSource>,
}

fn token_store(config: &ConsoleConfig) -> TokenStore {
    TokenStore::new(
        config
            .auth
            .token_path
            .clone()
            .unwrap_or_else(TokenStore::default_path),
    )
}

async fn connect(config: &ConsoleConfig, offline: bool, require_auth: bool) -> exam_console::Result<Backend> {
    if offline {
        log::info!("Using the in-memory demo backend");
        let fake = Arc::new(FakeBackend::demo().await);
        return Ok(Backend {
            api: fake.clone(),
            metrics: fake,
        });
    }

    let token = match config.auth.token.clone() {
        Some(token) => Some(token),
        None => token_store(config).load()?,
    };
    if token.is_none() && require_auth && config.auth.required {
        return Err(Error::Unauthenticated);
    }

    let client = Arc::new(
        ApiClient::new(&config.api, token)?.with_metric_paths(MetricPaths::from(&config.poller)),
    );
    log::debug!("Using backend at {}", client.base_url());
    Ok(Backend {
        api: client.clone(),
        metrics: client,
    })
}

async fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    ConsoleOutput::default().write(serde_json::to_value(value)?).await?;
    Ok(())
}

async fn show<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T) -> String) -> anyhow::Result<()> {
    if json {
        print_json(value).await
    } else {
        print!("{}", text(value));
        Ok(())
    }
}

/// Prints a failure notice for a mutating action and hands back the value on success.
fn settle<T>(result: exam_console::Result<T>, failure: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            log::error!("{}: {}", failure, e);
            Notice::failure(failure, &e).emit();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "info"); }
    }
    let cli = Cli::parse();
    let logger = env_logger::Builder::from_default_env().build();
    let level = logger.filter();
    let multi = MultiProgress::new();

    let progress = matches!(cli.command, Commands::Monitor { .. }) && !cli.json;
    if progress {
        indicatif_log_bridge::LogWrapper::new(multi.clone(), logger).try_init()?;
    } else {
        log::set_boxed_logger(Box::new(logger))?;
    }
    log::set_max_level(level);

    if !run(cli, multi).await? {
        std::process::exit(1);
    }
    Ok(())
}

/// Runs one command. Returns `false` when a mutating action failed.
async fn run(cli: Cli, multi: MultiProgress) -> anyhow::Result<bool> {
    let json = cli.json;

    let config = if matches!(cli.command, Commands::Check { .. }) {
        ConsoleConfig::default()
    } else {
        ConfigLoader::resolve(cli.config.as_deref())?
    };
    log::debug!("Resolved configuration for {}", config.application_name);

    match cli.command {
        Commands::Check { path } => return Ok(check(&path)),
        Commands::Login { token } => {
            let store = token_store(&config);
            let Some(()) = settle(store.save(&token), "Could not store token") else {
                return Ok(false);
            };
            Notice::success("Signed in")
                .with_detail(format!("token stored at {}", store.path().display()))
                .emit();
        }
        Commands::Logout => {
            let store = token_store(&config);
            match settle(store.clear(), "Could not remove token") {
                Some(true) => Notice::success("Signed out").emit(),
                Some(false) => println!("No stored token at {}", store.path().display()),
                None => return Ok(false),
            }
        }
        Commands::Health => {
            let backend = connect(&config, cli.offline, false).await?;
            match backend.api.health().await {
                Ok(health) => {
                    if json {
                        print_json(&health).await?;
                    } else {
                        let status = health.status.as_deref().unwrap_or("ok");
                        Notice::success("Backend reachable").with_detail(status).emit();
                    }
                }
                Err(e) => {
                    Notice::failure("Backend unreachable", &e).emit();
                    log::error!("Health check failed: {}", e);
                    return Ok(false);
                }
            }
        }
        Commands::System => {
            let backend = connect(&config, cli.offline, false).await?;
            let info = backend.api.system_info().await?;
            show(json, &info, render::system_info).await?;
        }
        Commands::Exams { command } => {
            let backend = connect(&config, cli.offline, true).await?;
            return exams(&*backend.api, command, json).await;
        }
        Commands::Applicants { command } => {
            let backend = connect(&config, cli.offline, true).await?;
            return applicants(&*backend.api, command, json).await;
        }
        Commands::Sessions { command } => {
            let backend = connect(&config, cli.offline, true).await?;
            return sessions(&*backend.api, command, json).await;
        }
        Commands::Evaluate { exam_id, processes } => {
            let backend = connect(&config, cli.offline, true).await?;
            let request = EvaluateExamRequest::new(exam_id, processes);
            match backend.api.system_info().await {
                Ok(info) => {
                    if settle(request.check_limits(&info.limits), "Evaluation not started").is_none() {
                        return Ok(false);
                    }
                }
                Err(e) => log::warn!("Could not read backend limits: {}", e),
            }

            log::info!(
                "Evaluating exam {} with {} parallel processes",
                request.exam_id,
                request.parallel_processes
            );
            let Some(job) = settle(backend.api.evaluate_exam(request).await, "Evaluation failed") else {
                return Ok(false);
            };
            if json {
                print_json(&job).await?;
            } else {
                let elapsed = job
                    .execution_time_seconds
                    .map(|s| format!(" in {:.2}s", s))
                    .unwrap_or_default();
                Notice::success("Evaluation finished")
                    .with_detail(format!("job {} {}{}", job.job_id, job.status, elapsed))
                    .emit();
                if let Some(message) = &job.error_message {
                    println!("   {}", message);
                }
            }
        }
        Commands::Stats { exam_id } => {
            let backend = connect(&config, cli.offline, true).await?;
            let stats = backend.api.exam_stats(&exam_id).await?;
            show(json, &stats, render::stats).await?;
        }
        Commands::Logs { search, level, export } => {
            let backend = connect(&config, cli.offline, true).await?;
            let poller = MetricsPoller::new(backend.metrics, fallback(&config), &config.poller);
            poller.refetch(DataKind::ActivityLogs).await;

            let snapshot = poller.snapshot();
            let Some(slice) = snapshot.activity_logs else {
                return Ok(false);
            };
            if slice.is_fallback() {
                log::warn!("Activity logs are not available from the backend; showing simulated entries");
            }
            let matching = filter_logs(&slice.value, &search, level);

            if let Some(path) = export {
                let entries: Vec<_> = matching.into_iter().cloned().collect();
                let Some(count) = settle(transfer::export_logs(&path, &entries).await, "Export failed") else {
                    return Ok(false);
                };
                Notice::success("Logs exported")
                    .with_detail(format!("{} entries to {}", count, path.display()))
                    .emit();
            } else if json {
                print_json(&matching).await?;
            } else {
                print!("{}", render::logs(matching));
            }
        }
        Commands::Monitor { duration_secs } => {
            let backend = connect(&config, cli.offline, true).await?;
            monitor(&config, backend, json, duration_secs.map(Duration::from_secs), multi).await?;
        }
    }

    Ok(true)
}

fn check(path: &Path) -> bool {
    match ConfigLoader::load(path) {
        Ok(cfg) => {
            println!("✅ Config is valid:");
            println!("   Application: {}", cfg.application_name);
            println!("   Backend: {}", cfg.api.base_url);
            println!("   Timeout: {}s", cfg.api.timeout_secs);
            println!(
                "   Polling: metrics every {}ms, resources every {}ms",
                cfg.poller.metrics_interval_ms, cfg.poller.resources_interval_ms
            );
            true
        }
        Err(e) => {
            eprintln!("❌ Config error: {}", e);
            false
        }
    }
}

fn fallback(config: &ConsoleConfig) -> FallbackGenerator {
    FallbackGenerator::new(
        config.application_name.clone(),
        config.poller.worker_count,
        config.poller.total_applicants,
    )
}

async fn exams(api: &dyn ExamApi, command: ExamCommand, json: bool) -> anyhow::Result<bool> {
    match command {
        ExamCommand::List { skip, limit } => {
            let exams = api.list_exams(skip, limit).await?;
            show(json, &exams, |e| render::exams(e)).await?;
        }
        ExamCommand::Show { id } => {
            let exam = api.get_exam(&id).await?;
            show(json, &exam, render::exam_detail).await?;
        }
        ExamCommand::Create { file } => {
            let Some(request) = settle(transfer::read_exam_request(&file), "Invalid exam definition") else {
                return Ok(false);
            };
            let (questions, points) = request.totals();
            log::info!("Creating exam '{}' ({} questions, {} points)", request.title, questions, points);
            let Some(exam) = settle(api.create_exam(request).await, "Could not create exam") else {
                return Ok(false);
            };
            if json {
                print_json(&exam).await?;
            } else {
                Notice::success("Exam created")
                    .with_detail(format!("{} ({})", exam.title, exam.id))
                    .emit();
            }
        }
        ExamCommand::Activate { id } => {
            let Some(_) = settle(api.activate_exam(&id).await, "Could not activate exam") else {
                return Ok(false);
            };
            Notice::success("Exam activated").with_detail(id).emit();
        }
        ExamCommand::Enrollments { exam_id } => {
            let enrolled = api.enrolled_applicants(&exam_id).await?;
            show(json, &enrolled, |a| render::applicants(a)).await?;
        }
        ExamCommand::Enroll { exam_id, applicant_ids } => {
            let count = applicant_ids.len();
            let request = BulkEnrollRequest { applicant_ids };
            let Some(_) = settle(api.enroll_applicants(&exam_id, request).await, "Could not enroll applicants") else {
                return Ok(false);
            };
            Notice::success("Applicants enrolled")
                .with_detail(format!("{} applicant(s) in exam {}", count, exam_id))
                .emit();
        }
        ExamCommand::StartAll { exam_id } => {
            let Some(result) = settle(api.start_all_sessions(&exam_id).await, "Could not start sessions") else {
                return Ok(false);
            };
            if json {
                print_json(&result).await?;
            } else {
                Notice::success("Sessions started").with_detail(exam_id).emit();
            }
        }
    }
    Ok(true)
}

async fn applicants(api: &dyn ExamApi, command: ApplicantCommand, json: bool) -> anyhow::Result<bool> {
    match command {
        ApplicantCommand::List => {
            let all = api.list_applicants().await?;
            show(json, &all, |a| render::applicants(a)).await?;
        }
        ApplicantCommand::Show { id, email } => {
            let applicant = match (id, email) {
                (_, Some(email)) => api.get_applicant_by_email(&email).await?,
                (Some(id), None) => api.get_applicant(&id).await?,
                (None, None) => anyhow::bail!("an applicant id or --email is required"),
            };
            show(json, &applicant, |a| render::applicants([a])).await?;
        }
        ApplicantCommand::Create { name, email, registration_number } => {
            let request = CreateApplicantRequest {
                name,
                email,
                registration_number,
            };
            let Some(applicant) = settle(api.create_applicant(request).await, "Could not register applicant") else {
                return Ok(false);
            };
            if json {
                print_json(&applicant).await?;
            } else {
                Notice::success("Applicant registered")
                    .with_detail(format!("{} ({})", applicant.name, applicant.id))
                    .emit();
            }
        }
        ApplicantCommand::Import { file, dry_run } => {
            let import = transfer::import_applicants_csv(&file)?;
            for rejected in &import.rejected {
                Notice::failure(format!("Line {} skipped", rejected.line), &rejected.error).emit();
            }
            if dry_run {
                println!(
                    "{} valid row(s), {} rejected; nothing was created",
                    import.applicants.len(),
                    import.rejected.len()
                );
                return Ok(import.rejected.is_empty());
            }

            let (mut created, mut failed) = (0, import.rejected.len());
            for request in import.applicants {
                let failure = format!("Could not register {}", request.email);
                match settle(api.create_applicant(request).await, &failure) {
                    Some(_) => created += 1,
                    None => failed += 1,
                }
            }
            Notice::success("Import finished")
                .with_detail(format!("{} created, {} rejected", created, failed))
                .emit();
            return Ok(failed == 0);
        }
        ApplicantCommand::Search { term } => {
            let all = api.list_applicants().await?;
            let found = filter_applicants(&all, &term);
            if json {
                print_json(&found).await?;
            } else {
                print!("{}", render::applicants(found));
            }
        }
    }
    Ok(true)
}

async fn sessions(api: &dyn ExamApi, command: SessionCommand, json: bool) -> anyhow::Result<bool> {
    match command {
        SessionCommand::Submit { session_id, question_id, answer } => {
            let request = SubmitResponseRequest { question_id, answer };
            let Some(response) = settle(api.submit_response(&session_id, request).await, "Could not submit answer") else {
                return Ok(false);
            };
            if json {
                print_json(&response).await?;
            } else {
                Notice::success("Answer submitted").with_detail(response.id).emit();
            }
        }
        SessionCommand::End { session_id } => {
            let Some(_) = settle(api.end_session(&session_id).await, "Could not end session") else {
                return Ok(false);
            };
            Notice::success("Session ended").with_detail(session_id).emit();
        }
        SessionCommand::Responses { session_id } => {
            let responses = api.session_responses(&session_id).await?;
            show(json, &responses, |r| render::responses(r)).await?;
        }
    }
    Ok(true)
}

async fn monitor(
    config: &ConsoleConfig,
    backend: Backend,
    json: bool,
    duration: Option<Duration>,
    multi: MultiProgress,
) -> anyhow::Result<()> {
    let poller = MetricsPoller::new(backend.metrics, fallback(config), &config.poller);

    let pb = multi.add(ProgressBar::new(config.poller.total_applicants));
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("#>-"));
    if json {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let pb_clone = pb.clone();
    let handle = poller.start(move |snapshot| {
        if let Some(slice) = &snapshot.processing {
            let m = &slice.value;
            pb_clone.set_length(m.total_count);
            pb_clone.set_position(m.processed_count);
            pb_clone.set_message(format!(
                "Workers: {}/{} | Utilization: {:.1}% | {:.0}/min{}",
                m.active_worker_count,
                m.workers.len(),
                m.average_utilization,
                m.throughput_per_minute,
                if slice.is_fallback() { " | simulated" } else { "" }
            ));
        }
    });

    let mut updates = WatchStream::new(handle.subscribe());
    let mut seen = HashSet::new();
    let ctrl_c = tokio::signal::ctrl_c();
    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(ctrl_c, deadline);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                log::info!("Interrupted, stopping monitor");
                break;
            }
            _ = &mut deadline => break,
            next = updates.next() => {
                let Some(snapshot) = next else { break };
                let Some(logs) = snapshot.activity_logs.filter(|s| !s.is_fallback()) else {
                    continue;
                };
                // Entries arrive newest first.
                for entry in logs.value.iter().rev() {
                    if seen.insert(entry.id.clone()) && !json {
                        multi.println(render::log_line(entry))?;
                    }
                }
            }
        }
    }

    handle.stop();
    let snapshot = handle.snapshot();
    let stats = handle.stats();

    if json {
        print_json(&snapshot).await?;
        return Ok(());
    }

    pb.set_style(ProgressStyle::default_bar()
        .template("✅ [{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} {msg}")?
        .progress_chars("#>-"));
    pb.finish_with_message("Monitor stopped");

    println!("\n{}", render::dashboard(&snapshot));
    println!("✅ Monitor Summary:");
    println!("   Fetches: {} ({} live, {} simulated)", stats.fetches_total, stats.fetches_remote, stats.fetches_fallback);
    println!("   Live Rate: {:.1}%", stats.remote_rate);
    println!("   Stale Responses Discarded: {}", stats.stale_discarded);
    println!("   Ticks Skipped: {}", stats.ticks_skipped);
    println!("   Average Fetch: {}ms", stats.avg_fetch_time_ms);
    println!("   Total Time: {:.1}s", stats.elapsed_seconds);
    Ok(())
}
