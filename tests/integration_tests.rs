//! Integration tests for the khet_sahayak library
//!
//! These tests verify the public API and module interactions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use khet_sahayak::{
    commands::{self, AskArgs, HistoryArgs, Mode},
    config::{Config, RemoteProviderKind, DEFAULT_TOP_K},
    error::Error,
    history::ChatHistory,
    index::{Chunker, IndexBuilder},
    prompts::Prompt,
    Connectivity, ConnectivityProbe, EmbedBackend, LocalIndex, Query, Retriever,
    RetrieverConfig,
};

// ============================================================================
// Helpers
// ============================================================================

fn write_knowledge_base(dir: &std::path::Path) -> PathBuf {
    let kb = dir.join("knowledge_base");
    std::fs::create_dir_all(kb.join("pests")).unwrap();
    std::fs::write(
        kb.join("wheat_rust.txt"),
        "Wheat rust shows orange pustules on leaves.\n\n\
         Spray propiconazole at first appearance and grow resistant varieties.",
    )
    .unwrap();
    std::fs::write(
        kb.join("finger_millet_blast.txt"),
        "Finger millet blast causes grey spindle lesions.\n\n\
         Treat seed with tricyclazole and avoid excess nitrogen.",
    )
    .unwrap();
    std::fs::write(
        kb.join("pests").join("aphids.md"),
        "Aphids suck sap from tender shoots. Neem oil spray controls them.",
    )
    .unwrap();
    kb
}

fn offline_config(dir: &std::path::Path) -> Config {
    let mut config = Config::defaults();
    config.knowledge_base_dir = write_knowledge_base(dir);
    config.index_path = dir.join("data").join("knowledge_index.json");
    config.history_path = dir.join("chat_history.db");
    config.remote_provider = RemoteProviderKind::None;
    config.probe_addr = None;
    config.probe_url = None;
    config
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_config_defaults_are_usable() {
    let config = Config::defaults();
    assert_eq!(config.top_k, DEFAULT_TOP_K);
    assert_eq!(config.embedding_dim, 384);
    assert!(config.probe_timeout <= Duration::from_secs(5));
}

#[test]
fn test_config_from_yaml() {
    let config = Config::from_yaml_str(
        "retriever:\n  top_k: 2\nremote:\n  provider: none\nconnectivity:\n  probe_url: \"\"\n",
    )
    .unwrap();
    assert_eq!(config.top_k, 2);
    assert_eq!(config.remote_provider, RemoteProviderKind::None);
    assert!(config.probe_url.is_none());
}

// ============================================================================
// Index Tests
// ============================================================================

#[tokio::test]
async fn test_build_save_load_search() {
    let dir = tempfile::tempdir().unwrap();
    let kb = write_knowledge_base(dir.path());
    let out = dir.path().join("index.json");

    let builder = IndexBuilder::new(Chunker::new(12, 2), EmbedBackend::hashing(128));
    let built = builder.build_dir(&kb, &out).await.unwrap();
    let loaded = LocalIndex::load(&out).unwrap();
    assert_eq!(built, loaded);

    let ids: Vec<&str> = loaded.chunks().iter().map(|c| c.id.as_str()).collect();
    assert!(ids.contains(&"finger_millet_blast.txt#0"));
    assert!(ids.contains(&"pests/aphids.md#0"));

    let retriever = Retriever::new(
        Arc::new(loaded),
        EmbedBackend::hashing(128),
        ConnectivityProbe::disabled(),
        RetrieverConfig::default(),
    )
    .unwrap();

    let result = retriever
        .retrieve(&Query::new("neem oil for aphids"), Connectivity::Offline)
        .await
        .unwrap();
    assert_eq!(result.chunks()[0].chunk.source, "pests/aphids.md");
}

#[tokio::test]
async fn test_retriever_rejects_foreign_index() {
    let dir = tempfile::tempdir().unwrap();
    let kb = write_knowledge_base(dir.path());

    let index = IndexBuilder::new(Chunker::new(12, 2), EmbedBackend::hashing(128))
        .build_from_documents(&IndexBuilder::collect_documents(&kb).unwrap())
        .await
        .unwrap();

    let result = Retriever::new(
        Arc::new(index),
        EmbedBackend::hashing(256),
        ConnectivityProbe::disabled(),
        RetrieverConfig::default(),
    );
    assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
}

// ============================================================================
// Command Tests
// ============================================================================

#[tokio::test]
async fn test_ask_offline_flow_with_history() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());

    let stats = commands::build_index_run(&config, None, None).await.unwrap();
    assert_eq!(stats.sources, 3);

    let answer = commands::ask_run(
        &config,
        AskArgs {
            text: "how to treat wheat rust".into(),
            mode: Mode::Online,
            top_k: Some(2),
            image: None,
            save_history: true,
        },
    )
    .await
    .unwrap();

    assert!(answer.starts_with("**Offline Mode**"));
    assert!(answer.contains("wheat_rust.txt"));
    assert!(answer.contains("no remote source configured"));

    let listing = commands::history_run(
        &config,
        HistoryArgs {
            limit: 5,
            search: Some("wheat".into()),
            ..Default::default()
        },
    )
    .unwrap();
    assert!(listing.contains("Q: how to treat wheat rust"));

    let history = ChatHistory::open(&config.history_path).unwrap();
    assert_eq!(history.count().unwrap(), 1);
}

fn offline_ask(text: &str, save_history: bool) -> AskArgs {
    AskArgs {
        text: text.into(),
        mode: Mode::Offline,
        top_k: None,
        image: None,
        save_history,
    }
}

#[tokio::test]
async fn test_offline_ask_recalls_similar_history() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    commands::build_index_run(&config, None, None).await.unwrap();

    let history = ChatHistory::open(&config.history_path).unwrap();
    history
        .save(
            "best time to sow finger millet",
            "Sow finger millet with the onset of the monsoon.",
            Some("gemini"),
            None,
        )
        .unwrap();
    history
        .save("mandi price of onions", "Rs 1800 per quintal.", Some("search"), None)
        .unwrap();
    drop(history);

    let answer = commands::ask_run(&config, offline_ask("Best time to sow finger millet?", true))
        .await
        .unwrap();

    assert!(answer.starts_with("**Offline Mode**"));
    assert!(answer.contains("**Previous Question:** best time to sow finger millet"));
    assert!(answer.contains("onset of the monsoon"));
    assert!(!answer.contains("onions"));

    let entries = ChatHistory::open(&config.history_path)
        .unwrap()
        .recent(1)
        .unwrap();
    let matches = &entries[0].context_data.as_ref().unwrap()["history_matches"];
    assert_eq!(matches.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_punctuation_only_question_finds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    commands::build_index_run(&config, None, None).await.unwrap();

    let answer = commands::ask_run(&config, offline_ask("?!...", false))
        .await
        .unwrap();
    assert!(answer.contains("couldn't find anything"));
}

#[tokio::test]
async fn test_ask_without_index_fails_clearly() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());

    let err = commands::ask_run(
        &config,
        AskArgs {
            text: "anything".into(),
            mode: Mode::Offline,
            top_k: None,
            image: None,
            save_history: false,
        },
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("build-index"));
}

#[tokio::test]
async fn test_probe_command_offline() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());

    let report = commands::probe_run(&config).await.unwrap();
    assert_eq!(report.connectivity, Connectivity::Offline);
    assert!(report.encoder_available);
}

// ============================================================================
// Prompt Tests
// ============================================================================

#[test]
fn test_advisor_prompt_has_placeholders() {
    let text = Prompt::Advisor.text();
    assert!(text.contains("{context}"));
    assert!(text.contains("{question}"));
}
