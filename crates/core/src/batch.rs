#![forbid(unsafe_code)]

use crate::ids::{EntityKind, PromptOwner};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("line {line}: invalid JSON: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Shape(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BatchFormat {
    #[default]
    Yaml,
    Ndjson,
}

impl BatchFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Ndjson => "ndjson",
        }
    }
}

impl fmt::Display for BatchFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yaml" | "yml" | "json" => Ok(Self::Yaml),
            "ndjson" | "jsonl" => Ok(Self::Ndjson),
            other => Err(format!("unsupported format `{other}` (expected yaml or ndjson)")),
        }
    }
}

/// One entity as it appears in a batch or on disk: an open JSON object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|value| !is_blank(value))
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn has(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_string(), value.into());
    }

    /// Sets `field` only when it is missing, null or an empty string.
    pub fn set_if_absent(&mut self, field: &str, value: impl FnOnce() -> Value) -> bool {
        if self.has(field) {
            return false;
        }
        self.0.insert(field.to_string(), value());
        true
    }

    pub fn id(&self) -> Option<&str> {
        self.get_str("id")
    }

    pub fn key(&self) -> Option<&str> {
        self.get_str("key")
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

/// A freeform prompt body attached to exactly one story or task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptSpec {
    pub owner: PromptOwner,
    /// Owner id, or a local key until the batch is resolved.
    pub owner_ref: String,
    pub content: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    pub epics: Vec<Record>,
    pub stories: Vec<Record>,
    pub tasks: Vec<Record>,
    pub prompts: Vec<PromptSpec>,
}

impl Batch {
    pub fn records(&self, kind: EntityKind) -> &[Record] {
        match kind {
            EntityKind::Epic => &self.epics,
            EntityKind::Story => &self.stories,
            EntityKind::Task => &self.tasks,
            EntityKind::Plan => &[],
        }
    }

    pub fn records_mut(&mut self, kind: EntityKind) -> Option<&mut Vec<Record>> {
        match kind {
            EntityKind::Epic => Some(&mut self.epics),
            EntityKind::Story => Some(&mut self.stories),
            EntityKind::Task => Some(&mut self.tasks),
            EntityKind::Plan => None,
        }
    }

    pub fn record_count(&self) -> usize {
        self.epics.len() + self.stories.len() + self.tasks.len()
    }
}

/// A batch together with the envelope it was read from.
///
/// The envelope is what gets persisted as the plan: the document as received
/// (grouped into sections for NDJSON input), before any id is assigned.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedBatch {
    pub envelope: Value,
    pub batch: Batch,
}

pub fn parse_batch(raw: &str, format: BatchFormat) -> Result<ParsedBatch, BatchError> {
    let envelope = match format {
        BatchFormat::Yaml => parse_yaml_envelope(raw)?,
        BatchFormat::Ndjson => parse_ndjson_envelope(raw)?,
    };
    let batch = batch_from_envelope(&envelope)?;
    Ok(ParsedBatch { envelope, batch })
}

fn parse_yaml_envelope(raw: &str) -> Result<Value, BatchError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    let value: Value = serde_yaml::from_str(raw)?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(BatchError::Shape(
            "batch document must be a mapping with epics/stories/tasks/prompts".to_string(),
        )),
    }
}

const SECTIONS: [&str; 4] = ["epics", "stories", "tasks", "prompts"];

fn parse_ndjson_envelope(raw: &str) -> Result<Value, BatchError> {
    let mut sections: Map<String, Value> = SECTIONS
        .iter()
        .map(|name| (name.to_string(), Value::Array(Vec::new())))
        .collect();

    for (index, line) in raw.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let item: Value = serde_json::from_str(trimmed).map_err(|source| BatchError::Json {
            line: line_no,
            source,
        })?;
        let Some(tag) = item.get("type").and_then(Value::as_str) else {
            return Err(BatchError::Shape(format!(
                "line {line_no}: record must carry a string `type` field"
            )));
        };
        let section = match tag {
            "epic" => "epics",
            "story" => "stories",
            "task" => "tasks",
            "prompt" => "prompts",
            other => {
                tracing::warn!(line = line_no, kind = other, "skipping record of unknown type");
                continue;
            }
        };
        if let Some(Value::Array(items)) = sections.get_mut(section) {
            items.push(item);
        }
    }
    Ok(Value::Object(sections))
}

fn batch_from_envelope(envelope: &Value) -> Result<Batch, BatchError> {
    Ok(Batch {
        epics: records_section(envelope, EntityKind::Epic)?,
        stories: records_section(envelope, EntityKind::Story)?,
        tasks: records_section(envelope, EntityKind::Task)?,
        prompts: prompts_section(envelope)?,
    })
}

fn section_items<'a>(envelope: &'a Value, name: &str) -> Result<&'a [Value], BatchError> {
    match envelope.get(name) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(BatchError::Shape(format!("`{name}` must be a sequence"))),
    }
}

fn records_section(envelope: &Value, kind: EntityKind) -> Result<Vec<Record>, BatchError> {
    let name = kind.plural();
    section_items(envelope, name)?
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(fields) => {
                let mut fields = fields.clone();
                // The NDJSON tag only routes the line to its section.
                fields.remove("type");
                Ok(Record::new(fields))
            }
            _ => Err(BatchError::Shape(format!("{name}[{index}] must be a mapping"))),
        })
        .collect()
}

fn prompts_section(envelope: &Value) -> Result<Vec<PromptSpec>, BatchError> {
    let mut out = Vec::new();
    for (index, item) in section_items(envelope, "prompts")?.iter().enumerate() {
        let Value::Object(fields) = item else {
            return Err(BatchError::Shape(format!("prompts[{index}] must be a mapping")));
        };
        let story = non_empty_str(fields.get("storyId"));
        let task = non_empty_str(fields.get("taskId"));
        let (owner, owner_ref) = match (story, task) {
            (Some(id), None) => (PromptOwner::Story, id),
            (None, Some(id)) => (PromptOwner::Task, id),
            (Some(_), Some(_)) => {
                return Err(BatchError::Shape(format!(
                    "prompts[{index}] must name either storyId or taskId, not both"
                )));
            }
            (None, None) => {
                return Err(BatchError::Shape(format!(
                    "prompts[{index}] must name its owner via storyId or taskId"
                )));
            }
        };
        let content = fields
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        out.push(PromptSpec {
            owner,
            owner_ref: owner_ref.to_string(),
            content,
        });
    }
    Ok(out)
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn yaml_batch_groups_sections() {
        let raw = "\
epics:
  - key: e1
    title: Billing
stories:
  - title: Invoices
    epic: e1
prompts:
  - storyId: ST-0001
    content: hello
";
        let parsed = parse_batch(raw, BatchFormat::Yaml).expect("parse");
        assert_eq!(parsed.batch.epics.len(), 1);
        assert_eq!(parsed.batch.stories.len(), 1);
        assert!(parsed.batch.tasks.is_empty());
        assert_eq!(
            parsed.batch.prompts,
            vec![PromptSpec {
                owner: PromptOwner::Story,
                owner_ref: "ST-0001".to_string(),
                content: "hello".to_string(),
            }]
        );
        assert_eq!(parsed.batch.epics[0].key(), Some("e1"));
        assert_eq!(parsed.envelope["stories"][0]["epic"], json!("e1"));
    }

    #[test]
    fn ndjson_lines_are_grouped_by_type() {
        let raw = r#"{"type":"epic","key":"e1","title":"A"}

{"type":"story","title":"B","epic":"e1"}
{"type":"idea","title":"ignored"}
{"type":"task","title":"C"}
"#;
        let parsed = parse_batch(raw, BatchFormat::Ndjson).expect("parse");
        assert_eq!(parsed.batch.epics.len(), 1);
        assert_eq!(parsed.batch.stories.len(), 1);
        assert_eq!(parsed.batch.tasks.len(), 1);
        assert!(parsed.batch.stories[0].get("type").is_none());
        assert_eq!(parsed.envelope["tasks"][0]["type"], json!("task"));
        assert_eq!(parsed.envelope["prompts"], json!([]));
    }

    #[test]
    fn ndjson_reports_the_failing_line() {
        let raw = "{\"type\":\"epic\"}\n{oops\n";
        match parse_batch(raw, BatchFormat::Ndjson) {
            Err(BatchError::Json { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected json error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_shapes_are_rejected() {
        assert!(matches!(
            parse_batch("- a\n- b\n", BatchFormat::Yaml),
            Err(BatchError::Shape(_))
        ));
        assert!(matches!(
            parse_batch("stories: 3\n", BatchFormat::Yaml),
            Err(BatchError::Shape(_))
        ));
        assert!(matches!(
            parse_batch("prompts:\n  - content: orphan\n", BatchFormat::Yaml),
            Err(BatchError::Shape(_))
        ));
        assert!(matches!(
            parse_batch("epics: [\n", BatchFormat::Yaml),
            Err(BatchError::Yaml(_))
        ));
    }

    #[test]
    fn empty_document_is_an_empty_batch() {
        let parsed = parse_batch("", BatchFormat::Yaml).expect("parse");
        assert_eq!(parsed.batch, Batch::default());
    }

    #[test]
    fn set_if_absent_keeps_explicit_values() {
        let mut record = Record::new(Map::new());
        record.set("status", "active");
        record.set("created", "");
        assert!(!record.set_if_absent("status", || json!("draft")));
        assert!(record.set_if_absent("created", || json!("now")));
        assert_eq!(record.get_str("status"), Some("active"));
        assert_eq!(record.get_str("created"), Some("now"));
    }
}
