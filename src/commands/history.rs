//! `history` command: list, search, export or clear stored exchanges.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::history::{ChatHistory, HistoryEntry};

const PREVIEW_CHARS: usize = 160;

#[derive(Debug, Clone, Default)]
pub struct HistoryArgs {
    pub limit: usize,
    pub search: Option<String>,
    pub export_csv: Option<PathBuf>,
    pub clear: bool,
}

pub fn run(config: &Config, args: HistoryArgs) -> Result<String> {
    let history = ChatHistory::open(&config.history_path).with_context(|| {
        format!(
            "failed to open chat history {}",
            config.history_path.display()
        )
    })?;

    if args.clear {
        let removed = history.clear()?;
        return Ok(format!("Removed {} entries.", removed));
    }

    if let Some(path) = &args.export_csv {
        let rows = history.export_csv(path)?;
        return Ok(format!("Exported {} entries to {}", rows, path.display()));
    }

    let entries = match &args.search {
        Some(text) => history.search(text, args.limit)?,
        None => history.recent(args.limit)?,
    };

    if entries.is_empty() {
        return Ok("No chat history found.".to_string());
    }

    let total = history.count()?;
    let mut out = format!("Showing {} of {} entries\n", entries.len(), total);
    for entry in &entries {
        out.push('\n');
        out.push_str(&format_entry(entry));
    }
    Ok(out)
}

fn format_entry(entry: &HistoryEntry) -> String {
    format!(
        "[{}] #{} ({})\nQ: {}\nA: {}\n",
        entry.timestamp,
        entry.id,
        entry.tool_used.as_deref().unwrap_or("unknown"),
        entry.user_query,
        preview(&entry.assistant_response)
    )
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", cut)
}
