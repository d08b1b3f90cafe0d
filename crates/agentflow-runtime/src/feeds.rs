//! Directory-backed feed source
//!
//! Each feed is a sub-directory of JSON files under the root. A file holds
//! one item or an array of items. Items are served newest first by the
//! cursor the poller asks for; with a cursor, only items strictly newer are
//! returned.

use agentflow_agents::FeedSource;
use agentflow_common::{
    payload::{render, value_at},
    AgentflowError, Result,
};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone)]
pub struct DirectoryFeed {
    root: PathBuf,
}

impl DirectoryFeed {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn feed_dir(&self, source: &str) -> Result<PathBuf> {
        let valid = !source.is_empty()
            && source
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(AgentflowError::Feed(format!("invalid feed name `{source}`")));
        }
        Ok(self.root.join(source))
    }

}

fn cursor_of(item: &Value, cursor_path: &str) -> Option<String> {
    item.as_object()
        .and_then(|item| value_at(item, cursor_path).ok())
        .map(render)
}

async fn read_items(path: &Path) -> Result<Vec<Value>> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AgentflowError::Feed(format!("{}: {e}", path.display())))?;
    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| AgentflowError::Feed(format!("{}: {e}", path.display())))?;
    Ok(match value {
        Value::Array(items) => items,
        item => vec![item],
    })
}

#[async_trait]
impl FeedSource for DirectoryFeed {
    #[instrument(skip(self))]
    async fn fetch(
        &self,
        source: &str,
        cursor_path: &str,
        since: Option<&str>,
    ) -> Result<Vec<Value>> {
        let dir = self.feed_dir(source)?;
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| AgentflowError::Feed(format!("{}: {e}", dir.display())))?;

        let mut items = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AgentflowError::Feed(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            items.extend(read_items(&path).await?);
        }

        let mut cursored: Vec<(String, Value)> = Vec::with_capacity(items.len());
        for item in items {
            match cursor_of(&item, cursor_path) {
                Some(cursor) => cursored.push((cursor, item)),
                None => warn!(cursor_path, "Skipping feed item without cursor"),
            }
        }
        if let Some(since) = since {
            cursored.retain(|(cursor, _)| cursor.as_str() > since);
        }
        cursored.sort_by(|a, b| b.0.cmp(&a.0));

        debug!(items = cursored.len(), "Read feed directory");
        Ok(cursored.into_iter().map(|(_, item)| item).collect())
    }
}
