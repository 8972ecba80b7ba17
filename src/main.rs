//! `repochat`: index a GitHub repository and ask questions about it.
//!
//! ```bash
//! repochat ingest https://github.com/owner/repo
//! repochat ask owner/repo "Where is the router configured?"
//! repochat chat owner/repo
//! repochat reset owner/repo
//! ```
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); answers go to stdout.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use repochat_core::bootstrap::{AppBuilder, DefaultRepoChat, resolve_config_path};
use repochat_core::{IngestError, Question};
use repochat_index::{IngestReport, RepoId};
use repochat_llm::Message;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};

#[derive(Parser)]
#[command(name = "repochat", version, about = "Chat with a GitHub repository")]
struct Cli {
    /// Configuration file (TOML). Falls back to `REPOCHAT_CONFIG`, then
    /// `config/default.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, chunk, embed and store a repository.
    Ingest {
        /// `owner/name` or `https://github.com/owner/name`.
        repo: String,
    },
    /// Ask a single question and stream the answer.
    Ask {
        repo: String,
        question: String,
        /// Print the retrieved context to stderr before answering.
        #[arg(long)]
        show_context: bool,
    },
    /// Interactive session keeping conversation history. `exit` or Ctrl-C
    /// at the prompt to quit.
    Chat { repo: String },
    /// Remove stored chunks of a repository, or of every repository.
    Reset {
        #[arg(required_unless_present = "all")]
        repo: Option<String>,
        /// Drop the whole chunk collection.
        #[arg(long, conflicts_with = "repo")]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();

    let builder = AppBuilder::from_path(resolve_config_path(cli.config.as_deref())).await?;
    tracing::debug!(path = %builder.config_path().display(), "config loaded");
    let app = builder.build()?;

    match cli.command {
        Command::Ingest { repo } => ingest(&app, &repo).await,
        Command::Ask {
            repo,
            question,
            show_context,
        } => {
            let repo = parse_repo(&repo)?;
            let question = Question::new(question, repo);
            if show_context {
                let window = app.context_for(&question).await;
                for chunk in &window.chunks {
                    eprintln!(
                        "[{:.3}] {}#{}",
                        chunk.score, chunk.file_path, chunk.sequence_index
                    );
                }
            }
            answer(&app, &question).await.map(|_| ())
        }
        Command::Chat { repo } => chat(&app, parse_repo(&repo)?).await,
        Command::Reset { repo, all } => reset(&app, repo.as_deref(), all).await,
    }
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_repo(input: &str) -> anyhow::Result<RepoId> {
    RepoId::parse(input).with_context(|| format!("invalid repository: {input}"))
}

async fn ingest(app: &DefaultRepoChat, repo: &str) -> anyhow::Result<()> {
    match app.ingest(repo).await {
        Ok(report) => {
            println!("{}", render_report(&report));
            Ok(())
        }
        Err(IngestError::Failed(failure)) => {
            let trail: Vec<String> = failure.job.trail.iter().map(ToString::to_string).collect();
            eprintln!("job trail: {}", trail.join(" -> "));
            Err(failure.into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn reset(app: &DefaultRepoChat, repo: Option<&str>, all: bool) -> anyhow::Result<()> {
    match repo {
        Some(repo) if !all => {
            let repo = app
                .reset(repo)
                .await
                .with_context(|| format!("failed to reset {repo}"))?;
            println!("Removed stored chunks of {repo}");
        }
        _ => {
            app.reset_all().await.context("failed to drop chunk collection")?;
            println!("Removed stored chunks of every repository");
        }
    }
    Ok(())
}

fn render_report(report: &IngestReport) -> String {
    let mut out = format!(
        "Ingested {} chunks from {} ({} files fetched, {} skipped, {} listed) in {} ms",
        report.rows_stored,
        report.job.repo_id,
        report.files_fetched,
        report.files_skipped,
        report.files_listed,
        report.duration_ms
    );
    if report.partial {
        out.push_str("\nwarning: the file tree was truncated, some files were not indexed");
    }
    out
}

/// Stream one answer to stdout. Returns the text delivered before the stream
/// ended or was interrupted.
async fn answer(app: &DefaultRepoChat, question: &Question) -> anyhow::Result<String> {
    let mut stream = app.ask(question).await;
    let mut stdout = tokio::io::stdout();
    let mut text = String::new();

    loop {
        tokio::select! {
            item = stream.next() => match item {
                Some(Ok(fragment)) => {
                    stdout.write_all(fragment.as_bytes()).await?;
                    stdout.flush().await?;
                    text.push_str(&fragment);
                }
                Some(Err(e)) => {
                    stdout.write_all(b"\n").await?;
                    return Err(anyhow::Error::new(e).context("answer interrupted"));
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("answer cancelled");
                break;
            }
        }
    }
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(text)
}

async fn chat(app: &DefaultRepoChat, repo: RepoId) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: Vec<Message> = Vec::new();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;
        // Once `ctrl_c` has been awaited the default SIGINT handler is gone,
        // so the prompt has to listen for it too.
        let Some(line) = next_input(&mut lines, tokio::signal::ctrl_c()).await? else {
            stdout.write_all(b"\n").await?;
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let question = Question::new(line, repo.clone()).with_history(history.clone());
        match answer(app, &question).await {
            Ok(reply) => {
                history.push(Message::user(line));
                history.push(Message::assistant(reply));
            }
            Err(e) => eprintln!("error: {e:#}"),
        }
    }
    Ok(())
}

/// Next prompt line, or `None` on end of input or when `interrupt` fires first.
async fn next_input<R, F>(lines: &mut Lines<R>, interrupt: F) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        line = lines.next_line() => line,
        _ = interrupt => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repochat_index::IngestionJob;

    #[test]
    fn parses_ingest() {
        let cli = Cli::try_parse_from(["repochat", "ingest", "octo/widgets"]).unwrap();
        assert!(matches!(cli.command, Command::Ingest { repo } if repo == "octo/widgets"));
        assert!(cli.config.is_none());
    }

    #[test]
    fn parses_ask_with_global_config() {
        let cli = Cli::try_parse_from([
            "repochat",
            "ask",
            "octo/widgets",
            "what is this?",
            "--show-context",
            "--config",
            "custom.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert!(matches!(
            cli.command,
            Command::Ask { question, show_context: true, .. } if question == "what is this?"
        ));
    }

    #[test]
    fn ask_requires_question() {
        assert!(Cli::try_parse_from(["repochat", "ask", "octo/widgets"]).is_err());
    }

    #[test]
    fn parses_reset_variants() {
        let cli = Cli::try_parse_from(["repochat", "reset", "octo/widgets"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Reset { repo: Some(r), all: false } if r == "octo/widgets"
        ));

        let cli = Cli::try_parse_from(["repochat", "reset", "--all"]).unwrap();
        assert!(matches!(cli.command, Command::Reset { repo: None, all: true }));

        assert!(Cli::try_parse_from(["repochat", "reset"]).is_err());
        assert!(Cli::try_parse_from(["repochat", "reset", "octo/widgets", "--all"]).is_err());
    }

    #[test]
    fn parse_repo_reports_input() {
        let err = parse_repo("nope").unwrap_err();
        assert!(err.to_string().contains("nope"));
        assert_eq!(parse_repo("github.com/a/b").unwrap().to_string(), "a/b");
    }

    #[tokio::test]
    async fn interrupt_ends_pending_prompt() {
        let (_writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();
        let input = next_input(&mut lines, async { Ok(()) }).await.unwrap();
        assert!(input.is_none());
    }

    #[tokio::test]
    async fn prompt_returns_typed_line() {
        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"what is this?\n").await.unwrap();
        let mut lines = BufReader::new(reader).lines();
        let input = next_input(&mut lines, std::future::pending()).await.unwrap();
        assert_eq!(input.as_deref(), Some("what is this?"));
    }

    fn report(partial: bool) -> IngestReport {
        IngestReport {
            job: IngestionJob::new(&RepoId::new("octo", "widgets").unwrap()),
            files_listed: 10,
            files_fetched: 4,
            files_skipped: 6,
            chunks_created: 12,
            rows_stored: 12,
            partial,
            duration_ms: 250,
        }
    }

    #[test]
    fn report_summarises_counts() {
        let text = render_report(&report(false));
        assert!(text.starts_with("Ingested 12 chunks from octo/widgets"));
        assert!(text.contains("4 files fetched"));
        assert!(!text.contains("truncated"));
    }

    #[test]
    fn partial_report_warns() {
        assert!(render_report(&report(true)).contains("truncated"));
    }
}
