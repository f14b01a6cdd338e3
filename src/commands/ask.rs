//! `ask` command: retrieve an answer and render it for the terminal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};

use crate::config::Config;
use crate::connectivity::ConnectivityProbe;
use crate::embedding::EmbedBackend;
use crate::history::{find_similar, ChatHistory, HistoryEntry, SimilarExchange};
use crate::index::LocalIndex;
use crate::models::{Connectivity, FallbackReason, Query, RemoteAnswer, Retrieval, ScoredChunk};
use crate::remote::RemoteSource;
use crate::retriever::{Retriever, RetrieverConfig};
use crate::Error;

/// How the retrieval path is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Probe connectivity first
    Auto,
    Online,
    Offline,
}

impl Mode {
    pub fn parse(value: &str) -> crate::Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "auto" => Ok(Mode::Auto),
            "online" => Ok(Mode::Online),
            "offline" => Ok(Mode::Offline),
            other => Err(Error::InvalidArgument(format!(
                "unknown mode '{}', expected auto|online|offline",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AskArgs {
    pub text: String,
    pub mode: Mode,
    pub top_k: Option<usize>,
    pub image: Option<PathBuf>,
    pub save_history: bool,
}

/// Load the index and wire up the retriever described by `config`.
///
/// A remote source that cannot be constructed (e.g. missing credentials)
/// is skipped with a warning so offline answers keep working.
pub fn build_retriever(config: &Config, top_k: Option<usize>) -> Result<Retriever> {
    let index = LocalIndex::load(&config.index_path).with_context(|| {
        format!(
            "failed to load local index {} (run `build-index` first)",
            config.index_path.display()
        )
    })?;
    let embedder = EmbedBackend::from_config(config)?;

    let mut retriever_config = RetrieverConfig::from_config(config);
    if let Some(k) = top_k {
        retriever_config.top_k = k;
    }

    let mut retriever = Retriever::new(
        Arc::new(index),
        embedder,
        ConnectivityProbe::from_config(config),
        retriever_config,
    )?;

    match RemoteSource::from_config(config) {
        Ok(Some(remote)) => retriever = retriever.with_remote(remote),
        Ok(None) => info!("no remote source configured, online queries use the local index"),
        Err(e) => warn!(error = %e, "remote source unavailable, online queries use the local index"),
    }

    match RemoteSource::weather_from_config(config) {
        Ok(Some(RemoteSource::Weather(client))) => retriever = retriever.with_weather(client),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "weather source unavailable"),
    }

    Ok(retriever)
}

pub fn mime_type_for(path: &Path) -> crate::Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "png" => Ok("image/png"),
        "webp" => Ok("image/webp"),
        _ => Err(Error::InvalidArgument(format!(
            "unsupported image type: {}",
            path.display()
        ))),
    }
}

pub async fn run(config: &Config, args: AskArgs) -> Result<String> {
    if args.text.trim().is_empty() {
        anyhow::bail!("question must not be empty");
    }

    let mut query = Query::new(args.text.trim());
    if let Some(path) = &args.image {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read image {}", path.display()))?;
        query = query.with_image(data, mime_type_for(path)?);
    }

    let retriever = build_retriever(config, args.top_k)?;
    let result = match args.mode {
        Mode::Auto => retriever.retrieve_auto(&query).await?,
        Mode::Online => retriever.retrieve(&query, Connectivity::Online).await?,
        Mode::Offline => retriever.retrieve(&query, Connectivity::Offline).await?,
    };

    let similar = match &result {
        Retrieval::Local { .. } => {
            let entries = past_exchanges(&config.history_path);
            find_similar(
                entries,
                &query.text,
                retriever.embedder(),
                config.history_matches,
                config.history_threshold,
            )
            .await
        }
        Retrieval::Remote(_) => Vec::new(),
    };

    let rendered = render(&result, &similar);

    if args.save_history {
        let history = ChatHistory::open(&config.history_path)?;
        history.save(
            &query.text,
            &rendered,
            Some(tool_label(&result)),
            Some(&history_context(&result, &similar)),
        )?;
    }

    Ok(rendered)
}

/// Stored exchanges; an unreadable history only costs the history matches.
fn past_exchanges(path: &Path) -> Vec<HistoryEntry> {
    if !path.exists() {
        return Vec::new();
    }
    match ChatHistory::open(path).and_then(|history| history.all(None)) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, path = %path.display(), "chat history unavailable");
            Vec::new()
        }
    }
}

fn tool_label(result: &Retrieval) -> &str {
    match result {
        Retrieval::Remote(answer) => answer.provider.split(':').next().unwrap_or("remote"),
        Retrieval::Local { .. } => "offline",
    }
}

fn history_context(result: &Retrieval, similar: &[SimilarExchange]) -> serde_json::Value {
    match result {
        Retrieval::Remote(answer) => json!({
            "provider": answer.provider,
            "sources": answer.sources.iter().map(|s| &s.link).collect::<Vec<_>>(),
        }),
        Retrieval::Local { chunks, fallback } => json!({
            "chunks": chunks.iter().map(|c| json!({ "id": c.chunk.id, "distance": c.distance })).collect::<Vec<_>>(),
            "fallback": fallback.as_ref().map(|f| f.to_string()),
            "history_matches": similar.iter().map(|m| json!({ "id": m.entry.id, "score": m.score })).collect::<Vec<_>>(),
        }),
    }
}

pub fn render(result: &Retrieval, similar: &[SimilarExchange]) -> String {
    match result {
        Retrieval::Remote(answer) => format_remote_answer(answer),
        Retrieval::Local { chunks, fallback } => {
            format_local_answer(chunks, similar, fallback.as_ref())
        }
    }
}

pub fn format_remote_answer(answer: &RemoteAnswer) -> String {
    let mut out = answer.text.trim_end().to_string();

    // The search provider already lists its sources in the text
    if !answer.sources.is_empty() && answer.provider != "search" {
        out.push_str("\n\nSources:\n");
        for source in &answer.sources {
            out.push_str(&format!("- {} ({})\n", source.title, source.link));
        }
    }

    out
}

/// Relevance wording for a similarity score.
fn band(similarity: f32) -> &'static str {
    if similarity >= 0.7 {
        "very similar"
    } else if similarity >= 0.5 {
        "related"
    } else {
        "somewhat related"
    }
}

pub fn format_local_answer(
    chunks: &[ScoredChunk],
    similar: &[SimilarExchange],
    fallback: Option<&FallbackReason>,
) -> String {
    if chunks.is_empty() && similar.is_empty() {
        return "I'm currently offline and couldn't find anything related in the local knowledge base \
                or your chat history. Please check your internet connection to get real-time answers."
            .to_string();
    }

    let mut out = String::from("**Offline Mode**\n\n");

    if let Some(best) = chunks.first() {
        let similarity = best.similarity();
        if similarity >= 0.5 {
            out.push_str(&format!(
                "I found {} information in the local knowledge base:\n\n",
                band(similarity)
            ));
        } else {
            out.push_str("I found somewhat related information in the local knowledge base. This might help:\n\n");
        }

        out.push_str(&best.chunk.text);
        out.push_str(&format!(
            "\n\n*Source: {} (distance {:.3})*\n",
            best.chunk.source, best.distance
        ));

        if chunks.len() > 1 {
            out.push_str(&format!(
                "\n*I also found {} other related passage(s):*",
                chunks.len() - 1
            ));
            for other in &chunks[1..] {
                out.push_str(&format!("\n- {} (distance {:.3})", other.chunk.source, other.distance));
            }
            out.push('\n');
        }
    }

    if let Some(best) = similar.first() {
        if !chunks.is_empty() {
            out.push_str("\n---\n\n");
        }
        out.push_str(&format!(
            "I found a {} question in your chat history:\n\n",
            band(best.score)
        ));
        out.push_str(&format!("**Previous Question:** {}\n\n", best.entry.user_query));
        out.push_str(&format!(
            "**Previous Answer:**\n{}\n",
            best.entry.assistant_response.trim_end()
        ));

        if similar.len() > 1 {
            out.push_str(&format!(
                "\n*I also found {} other related conversation(s) in your history.*\n",
                similar.len() - 1
            ));
        }
    }

    out.push_str("\n---\n");
    out.push_str("*Note: this answer comes from offline data. For the most current information, check your internet connection.*");

    if let Some(reason) = fallback {
        out.push_str(&format!("\n\n*Online lookup unavailable: {}.*", reason));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KnowledgeChunk, SourceLink};

    fn scored(source: &str, text: &str, distance: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: KnowledgeChunk {
                id: format!("{}#0", source),
                source: source.to_string(),
                text: text.to_string(),
                embedding: vec![0.0],
            },
            distance,
        }
    }

    #[test]
    fn mode_parse() {
        assert_eq!(Mode::parse("AUTO").unwrap(), Mode::Auto);
        assert_eq!(Mode::parse("offline").unwrap(), Mode::Offline);
        assert!(Mode::parse("sometimes").is_err());
    }

    #[test]
    fn mime_types_from_extension() {
        assert_eq!(mime_type_for(Path::new("leaf.JPG")).unwrap(), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("leaf.png")).unwrap(), "image/png");
        assert!(mime_type_for(Path::new("leaf.gif")).is_err());
    }

    #[test]
    fn local_answer_bands() {
        // similarity = 1 - d^2/2
        let very = format_local_answer(&[scored("a.txt", "A", 0.3)], &[], None);
        assert!(very.contains("very similar"));

        let related = format_local_answer(&[scored("a.txt", "A", 0.9)], &[], None);
        assert!(related.contains("I found related"));

        let somewhat = format_local_answer(&[scored("a.txt", "A", 1.2)], &[], None);
        assert!(somewhat.contains("somewhat related"));
    }

    #[test]
    fn local_answer_lists_other_passages_and_fallback() {
        let text = format_local_answer(
            &[
                scored("wheat.txt", "Spray propiconazole.", 0.2),
                scored("millet.txt", "Tricyclazole.", 0.8),
            ],
            &[],
            Some(&FallbackReason::Timeout),
        );

        assert!(text.starts_with("**Offline Mode**"));
        assert!(text.contains("Spray propiconazole."));
        assert!(text.contains("Source: wheat.txt"));
        assert!(text.contains("1 other related passage"));
        assert!(text.contains("millet.txt"));
        assert!(text.contains("remote source timed out"));
    }

    #[test]
    fn empty_local_answer() {
        assert!(format_local_answer(&[], &[], None).contains("couldn't find anything"));
    }

    fn exchange(id: i64, question: &str, answer: &str, score: f32) -> SimilarExchange {
        SimilarExchange {
            entry: HistoryEntry {
                id,
                user_query: question.to_string(),
                assistant_response: answer.to_string(),
                tool_used: Some("gemini".to_string()),
                context_data: None,
                timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            },
            score,
        }
    }

    #[test]
    fn history_only_answer() {
        let text = format_local_answer(
            &[],
            &[
                exchange(4, "wheat rust cure", "Spray propiconazole.", 0.92),
                exchange(2, "rust on wheat", "Grow HD 2967.", 0.4),
            ],
            None,
        );

        assert!(text.starts_with("**Offline Mode**"));
        assert!(text.contains("very similar question in your chat history"));
        assert!(text.contains("**Previous Question:** wheat rust cure"));
        assert!(text.contains("**Previous Answer:**\nSpray propiconazole."));
        assert!(text.contains("I also found 1 other related conversation(s) in your history."));
        assert!(!text.contains("couldn't find anything"));
    }

    #[test]
    fn knowledge_base_and_history_are_separated() {
        let text = format_local_answer(
            &[scored("wheat.txt", "Spray propiconazole.", 0.2)],
            &[exchange(1, "wheat rust", "Use resistant varieties.", 0.55)],
            Some(&FallbackReason::NoRemoteConfigured),
        );

        let kb = text.find("Source: wheat.txt").unwrap();
        let past = text.find("**Previous Question:** wheat rust").unwrap();
        assert!(kb < past);
        assert!(text[kb..past].contains("\n---\n"));
        assert!(text.contains("related question in your chat history"));
        assert!(text.ends_with("*Online lookup unavailable: no remote source configured.*"));
    }

    #[test]
    fn remote_answer_appends_sources() {
        let answer = RemoteAnswer {
            provider: "gemini:gemini-2.0-flash".into(),
            text: "Use resistant varieties.\n".into(),
            sources: vec![SourceLink {
                title: "ICAR".into(),
                link: "https://icar.example".into(),
                snippet: String::new(),
            }],
        };

        let text = format_remote_answer(&answer);
        assert!(text.starts_with("Use resistant varieties.\n\nSources:"));
        assert!(text.contains("- ICAR (https://icar.example)"));
        assert_eq!(tool_label(&Retrieval::Remote(answer)), "gemini");
    }

    #[test]
    fn search_answer_is_not_duplicated() {
        let answer = RemoteAnswer {
            provider: "search".into(),
            text: "Source Title: X".into(),
            sources: vec![SourceLink {
                title: "X".into(),
                link: "https://x".into(),
                snippet: "s".into(),
            }],
        };
        assert_eq!(format_remote_answer(&answer), "Source Title: X");
    }

    #[tokio::test]
    async fn run_answers_offline_and_saves_history() {
        let dir = tempfile::tempdir().unwrap();
        let kb = dir.path().join("kb");
        std::fs::create_dir_all(&kb).unwrap();
        std::fs::write(kb.join("blast.txt"), "Finger millet blast: spray tricyclazole.").unwrap();

        let mut config = Config::defaults();
        config.index_path = dir.path().join("index.json");
        config.history_path = dir.path().join("history.db");
        config.knowledge_base_dir = kb.clone();
        config.remote_provider = crate::config::RemoteProviderKind::None;
        config.probe_addr = None;
        config.probe_url = None;

        crate::commands::build_index::run(&config, None, None)
            .await
            .unwrap();

        let output = run(
            &config,
            AskArgs {
                text: "millet blast".into(),
                mode: Mode::Auto,
                top_k: None,
                image: None,
                save_history: true,
            },
        )
        .await
        .unwrap();

        assert!(output.contains("tricyclazole"));
        let history = ChatHistory::open(&config.history_path).unwrap();
        let entries = history.all(None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tool_used.as_deref(), Some("offline"));
    }

    #[tokio::test]
    async fn run_rejects_blank_question() {
        let config = Config::defaults();
        let args = AskArgs {
            text: "   ".into(),
            mode: Mode::Offline,
            top_k: None,
            image: None,
            save_history: false,
        };
        assert!(run(&config, args).await.is_err());
    }

    fn offline_config(dir: &Path) -> Config {
        let kb = dir.join("kb");
        std::fs::create_dir_all(&kb).unwrap();
        std::fs::write(kb.join("blast.txt"), "Finger millet blast: spray tricyclazole.").unwrap();

        let mut config = Config::defaults();
        config.index_path = dir.join("index.json");
        config.history_path = dir.join("history.db");
        config.knowledge_base_dir = kb;
        config.remote_provider = crate::config::RemoteProviderKind::None;
        config.probe_addr = None;
        config.probe_url = None;
        config
    }

    fn offline_args(text: &str) -> AskArgs {
        AskArgs {
            text: text.into(),
            mode: Mode::Offline,
            top_k: None,
            image: None,
            save_history: false,
        }
    }

    #[tokio::test]
    async fn offline_answer_recalls_past_exchange() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config(dir.path());
        crate::commands::build_index::run(&config, None, None)
            .await
            .unwrap();

        ChatHistory::open(&config.history_path)
            .unwrap()
            .save("when to sow ragi", "Sow ragi in June with the first rains.", Some("gemini"), None)
            .unwrap();

        let output = run(&config, offline_args("When to sow ragi?")).await.unwrap();

        assert!(output.contains("**Previous Question:** when to sow ragi"));
        assert!(output.contains("Sow ragi in June"));
    }

    #[tokio::test]
    async fn punctuation_only_question_finds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config(dir.path());
        crate::commands::build_index::run(&config, None, None)
            .await
            .unwrap();

        let output = run(&config, offline_args("?!...")).await.unwrap();
        assert!(output.contains("couldn't find anything"));
    }
}
