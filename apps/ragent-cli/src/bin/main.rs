use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use ragent_agent::{Agent, ChatClient, PluginManager};
use ragent_core::config::{Config, Settings};
use ragent_core::Error;
use ragent_store::{ChunkStore, Committed, Retriever};

#[derive(Parser)]
#[command(
    name = "ragent",
    version,
    about = "Retrieval-augmented assistant over a local document corpus"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and add one document (.txt, .md, .pdf). A copy is kept
    /// in the source directory.
    Ingest {
        file: PathBuf,
        /// Source name to store the chunks under (defaults to the file name).
        #[arg(long)]
        source: Option<String>,
        /// Swap out the chunks of exactly this source once the new ones are embedded.
        #[arg(long)]
        replace: bool,
    },
    /// Remove every chunk whose source contains SOURCE, and their stored files.
    Remove { source: String },
    /// Rank stored chunks against a query.
    Query {
        text: String,
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Discard the corpus and re-index the source directory.
    Rebuild,
    /// Chunk counts per source.
    List,
    /// Run one conversational turn, or read one message per line from stdin
    /// until EOF when MESSAGE is omitted.
    Chat {
        #[arg(long, env = "RAGENT_SESSION", default_value = "default")]
        session: String,
        message: Option<String>,
        #[arg(long)]
        show_prompt: bool,
    },
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Distinct process exit codes per failure kind.
fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<Error>() {
            return match e {
                Error::UnsupportedFormat(_) => 2,
                Error::DocumentLoad { .. } => 3,
                Error::Embedding(_) => 4,
                Error::Persistence { .. } => 5,
                _ => 1,
            };
        }
    }
    1
}

fn warn_if_not_persisted<T>(committed: &Committed<T>) {
    if let Some(e) = &committed.persist_error {
        eprintln!("⚠️  Change applied in memory but not saved: {e}");
    }
}

fn open_store(settings: &Settings) -> anyhow::Result<Arc<ChunkStore>> {
    let base = std::env::current_dir()?;
    let embedder = ragent_embed::provider_from_settings(&settings.embedding)?;
    let store = ChunkStore::from_settings(settings, &base, embedder)?;
    debug!(
        corpus = %store.corpus_path().display(),
        sources = %store.source_dir().display(),
        "store opened"
    );
    Ok(Arc::new(store))
}

/// One agent turn per non-blank input line, all in `session`. Returns the
/// number of turns taken.
async fn chat_session<R, W>(
    agent: &Agent,
    session: &str,
    input: R,
    out: &mut W,
    show_prompt: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut turns = 0;
    loop {
        let line = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let reply = agent.handle_message(session, &line, cancel).await?;
        if show_prompt {
            writeln!(out, "{}\n---", reply.prompt)?;
        }
        if let Some(p) = &reply.plugin_result {
            debug!(plugin = %p.plugin, output = %p.output, "plugin output");
        }
        writeln!(out, "{}", reply.response)?;
        out.flush()?;
        turns += 1;
    }
    Ok(turns)
}

fn spinner(msg: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

async fn run(cli: Cli, settings: Settings, cancel: CancellationToken) -> anyhow::Result<()> {
    let store = open_store(&settings)?;
    match cli.command {
        Command::Ingest { file, source, replace } => {
            store.load(&cancel).await.context("loading corpus")?;
            let committed = if replace {
                store.replace_document(&file, source.as_deref(), &cancel).await?
            } else {
                store.add_document(&file, source.as_deref(), &cancel).await?
            };
            warn_if_not_persisted(&committed);
            println!("✅ Added {} chunks from {}", committed.value.len(), file.display());
        }
        Command::Remove { source } => {
            store.load(&cancel).await.context("loading corpus")?;
            let committed = store.remove_chunks_by_source(&source).await?;
            warn_if_not_persisted(&committed);
            println!("Removed {} chunks", committed.value);
        }
        Command::Query { text, k } => {
            let k = k.unwrap_or(settings.retrieval.top_k);
            let results = Retriever::new(store).retrieve_top_k(&text, k, &cancel).await?;
            if results.is_empty() {
                println!("No results");
            }
            for (i, hit) in results.iter().enumerate() {
                let meta = &hit.chunk.metadata;
                let page = meta.page.map(|p| format!(" p.{p}")).unwrap_or_default();
                println!("{}. [{:.4}] {}{page} ({})", i + 1, hit.score, meta.source, hit.chunk.id);
                println!("   {}", hit.chunk.text.replace('\n', " "));
            }
        }
        Command::Rebuild => {
            let pb = spinner(&format!("Indexing {}", store.source_dir().display()))?;
            let result = store.rebuild(&cancel).await;
            pb.finish_and_clear();
            let committed = result?;
            warn_if_not_persisted(&committed);
            println!("✅ Rebuilt corpus with {} chunks", committed.value);
        }
        Command::List => {
            let total = store.load(&cancel).await.context("loading corpus")?;
            for s in store.sources().await {
                if s.pages > 0 {
                    println!("{:<40} {:>6} chunks {:>4} pages", s.source, s.chunks, s.pages);
                } else {
                    println!("{:<40} {:>6} chunks", s.source, s.chunks);
                }
            }
            println!("📊 {total} chunks total");
        }
        Command::Chat { session, message, show_prompt } => {
            let llm = Arc::new(ChatClient::from_settings(&settings.llm)?);
            let plugins = PluginManager::with_defaults(&settings.plugins)?;
            let agent = Agent::new(Retriever::new(store), llm, plugins, &settings);
            let mut out = std::io::stdout();
            match message {
                Some(message) => {
                    let input = std::io::Cursor::new(message.replace('\n', " "));
                    let turns =
                        chat_session(&agent, &session, input, &mut out, show_prompt, &cancel)
                            .await?;
                    if turns == 0 {
                        anyhow::bail!("message must not be empty");
                    }
                }
                None => {
                    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
                    let turns =
                        chat_session(&agent, &session, stdin, &mut out, show_prompt, &cancel)
                            .await?;
                    debug!(session = %session, turns, "chat session ended");
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let settings = match Config::load().and_then(|c| c.settings()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            return ExitCode::from(1);
        }
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    match run(cli, settings, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragent_agent::{ChatMessage, CompletionProvider};
    use ragent_core::{Chunker, EmbeddingError};
    use ragent_embed::HashEmbedder;

    #[test]
    fn exit_codes_follow_error_kind() {
        let unreachable = Error::from(EmbeddingError::Unreachable("down".into()));
        assert_eq!(exit_code(&Error::UnsupportedFormat("x.doc".into()).into()), 2);
        assert_eq!(exit_code(&Error::document_load("a.pdf", "bad xref").into()), 3);
        assert_eq!(exit_code(&unreachable.into()), 4);
        assert_eq!(exit_code(&Error::persistence("/tmp/c.json", "denied").into()), 5);
        assert_eq!(exit_code(&Error::Cancelled.into()), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }

    #[test]
    fn context_does_not_hide_the_kind() {
        let err = anyhow::Error::from(Error::persistence("/tmp/c.json", "denied"))
            .context("loading corpus");
        assert_eq!(exit_code(&err), 5);
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["ragent", "query", "boiling water", "-k", "5"])
            .expect("query parses");
        assert!(matches!(cli.command, Command::Query { k: Some(5), .. }));
        let cli =
            Cli::try_parse_from(["ragent", "ingest", "a.md", "--replace"]).expect("ingest parses");
        assert!(matches!(cli.command, Command::Ingest { replace: true, source: None, .. }));
        let cli = Cli::try_parse_from(["ragent", "chat", "--session", "s1"]).expect("chat parses");
        assert!(matches!(cli.command, Command::Chat { message: None, .. }));
    }

    /// Answers with how many agent replies the prompt's history holds.
    struct HistoryCounter;

    #[async_trait]
    impl CompletionProvider for HistoryCounter {
        async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
            let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
            Ok(format!("{} earlier replies", prompt.matches("\n[agent] ").count()))
        }
    }

    #[tokio::test]
    async fn chat_lines_share_one_session() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let store = Arc::new(ChunkStore::new(
            tmp.path().join("corpus.json"),
            tmp.path().join("docs"),
            Chunker::default(),
            Arc::new(HashEmbedder::new(64)),
            Duration::from_secs(5),
        ));
        let agent = Agent::new(
            Retriever::new(store),
            Arc::new(HistoryCounter),
            PluginManager::new(),
            &Settings::default(),
        );
        let mut out = Vec::new();
        let input: &[u8] = b"hello\n\n  \nand again\nthird\n";

        let turns =
            chat_session(&agent, "s1", input, &mut out, false, &CancellationToken::new()).await?;
        assert_eq!(turns, 3);
        assert_eq!(
            String::from_utf8(out)?,
            "0 earlier replies\n1 earlier replies\n2 earlier replies\n"
        );
        assert_eq!(agent.memory().history("s1").await.len(), 6);
        Ok(())
    }
}
