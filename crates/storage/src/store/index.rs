#![forbid(unsafe_code)]

use super::files::{collect_files, read_text, write_atomic};
use super::{ProjectStore, StoreError};
use dp_core::EntityKind;
use dp_core::canonical::to_canonical_json;
use dp_core::clock::now_rfc3339;
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};

const STORY_INDEX_FIELDS: [&str; 5] = ["id", "title", "epic", "risk", "status"];
const EPIC_INDEX_FIELDS: [&str; 2] = ["id", "title"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoryIndexSummary {
    pub path: PathBuf,
    pub stories: usize,
    pub epics: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocsIndexSummary {
    pub path: PathBuf,
    pub docs: usize,
    pub ideas: usize,
}

impl ProjectStore {
    /// Rebuilds `.project/index.json` from the story and epic records on disk.
    pub fn reindex_stories(&self) -> Result<StoryIndexSummary, StoreError> {
        let stories = self.index_entries(EntityKind::Story, &STORY_INDEX_FIELDS)?;
        let epics = self.index_entries(EntityKind::Epic, &EPIC_INDEX_FIELDS)?;
        let summary = StoryIndexSummary {
            path: self.story_index_path(),
            stories: stories.len(),
            epics: epics.len(),
        };
        let index = json!({
            "epics": epics,
            "stories": stories,
            "timestamp": now_rfc3339(),
        });
        self.write_index(&summary.path, &index)?;
        tracing::info!(stories = summary.stories, epics = summary.epics, "story index rebuilt");
        Ok(summary)
    }

    /// Rebuilds `.project/docs/index.json` from doc and idea front matter.
    pub fn reindex_docs(&self) -> Result<DocsIndexSummary, StoreError> {
        let docs = self.front_matter_entries(&self.docs_dir())?;
        let ideas = self.front_matter_entries(&self.ideas_dir())?;
        let summary = DocsIndexSummary {
            path: self.docs_index_path(),
            docs: docs.len(),
            ideas: ideas.len(),
        };
        let index = json!({
            "docs": docs.into_iter().chain(ideas).collect::<Vec<_>>(),
            "timestamp": now_rfc3339(),
        });
        self.write_index(&summary.path, &index)?;
        tracing::info!(docs = summary.docs, ideas = summary.ideas, "docs index rebuilt");
        Ok(summary)
    }

    fn write_index(&self, path: &Path, index: &Value) -> Result<(), StoreError> {
        let text =
            to_canonical_json(index).map_err(|err| StoreError::parse(self.relative(path), err))?;
        write_atomic(path, &text)
    }

    fn index_entries(&self, kind: EntityKind, fields: &[&str]) -> Result<Vec<Value>, StoreError> {
        let mut out = Vec::new();
        for path in collect_files(&self.kind_dir(kind), "json", &[])? {
            let raw = read_text(&path)?;
            let Ok(Value::Object(record)) = serde_json::from_str::<Value>(&raw) else {
                tracing::warn!(path = %self.relative(&path), "skipping unreadable record");
                continue;
            };
            let entry = fields
                .iter()
                .filter_map(|field| {
                    record
                        .get(*field)
                        .map(|value| (field.to_string(), value.clone()))
                })
                .collect::<Map<_, _>>();
            out.push(Value::Object(entry));
        }
        Ok(out)
    }

    fn front_matter_entries(&self, dir: &Path) -> Result<Vec<Value>, StoreError> {
        let mut out = Vec::new();
        for path in collect_files(dir, "md", &[])? {
            let raw = read_text(&path)?;
            let Some(data) = parse_front_matter(&raw) else {
                continue;
            };
            let (Some(id), Some(title)) = (present(&data, "id"), present(&data, "title")) else {
                tracing::warn!(path = %self.relative(&path), "front matter lacks id or title");
                continue;
            };
            out.push(json!({
                "id": id,
                "title": title,
                "tags": present(&data, "tags").cloned().unwrap_or_else(|| json!([])),
                "created": present(&data, "created").cloned().unwrap_or(Value::Null),
                "path": self.relative(&path),
            }));
        }
        Ok(out)
    }
}

fn present<'a>(data: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    data.get(field).filter(|value| match value {
        Value::Null => false,
        Value::String(text) => !text.is_empty(),
        _ => true,
    })
}

/// YAML mapping between a leading `---` line and the next `---` line.
fn parse_front_matter(raw: &str) -> Option<Map<String, Value>> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let mut lines = raw.lines();
    if lines.next()?.trim_end() != "---" {
        return None;
    }
    let mut yaml = String::new();
    for line in lines {
        if line.trim_end() == "---" {
            return match serde_yaml::from_str::<Value>(&yaml) {
                Ok(Value::Object(map)) => Some(map),
                Ok(_) => None,
                Err(err) => {
                    tracing::warn!(error = %err, "invalid front matter");
                    None
                }
            };
        }
        yaml.push_str(line);
        yaml.push('\n');
    }
    None
}
