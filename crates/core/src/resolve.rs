#![forbid(unsafe_code)]

use crate::batch::{Batch, PromptSpec, Record};
use crate::ids::{EntityId, EntityKind, PromptOwner};
use crate::sequence::SequenceState;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_STATUS: &str = "draft";

/// A field on one record kind that points at a record of another kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferenceField {
    pub owner: EntityKind,
    pub field: &'static str,
    pub target: EntityKind,
}

pub const REFERENCE_FIELDS: &[ReferenceField] = &[
    ReferenceField {
        owner: EntityKind::Story,
        field: "epic",
        target: EntityKind::Epic,
    },
    ReferenceField {
        owner: EntityKind::Task,
        field: "story",
        target: EntityKind::Story,
    },
    ReferenceField {
        owner: EntityKind::Task,
        field: "epic",
        target: EntityKind::Epic,
    },
];

/// What to do with a reference that is neither an id nor a key declared in the batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnresolvedKeyPolicy {
    /// Leave the literal in place and report it.
    #[default]
    Keep,
    /// Refuse the batch before anything is written.
    Error,
}

impl UnresolvedKeyPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for UnresolvedKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnresolvedKeyPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown policy `{other}` (expected keep or error)")),
        }
    }
}

/// Batch-scoped `key -> id` lookup, one namespace per kind.
#[derive(Clone, Debug, Default)]
pub struct KeyMap {
    by_kind: HashMap<EntityKind, HashMap<String, String>>,
}

impl KeyMap {
    pub fn insert(&mut self, kind: EntityKind, key: &str, id: &str) -> Option<String> {
        self.by_kind
            .entry(kind)
            .or_default()
            .insert(key.to_string(), id.to_string())
    }

    pub fn get(&self, kind: EntityKind, key: &str) -> Option<&str> {
        self.by_kind
            .get(&kind)
            .and_then(|keys| keys.get(key))
            .map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyMapping {
    pub kind: EntityKind,
    pub key: String,
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnresolvedRef {
    /// Id of the referring record, or `prompts[<index>]` for prompt entries.
    pub owner: String,
    pub field: String,
    pub target: EntityKind,
    pub value: String,
}

impl fmt::Display for UnresolvedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} = {:?} matches no {} id or key in this batch",
            self.owner, self.field, self.value, self.target
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptSource {
    /// A `prompts` entry of the batch.
    Entry,
    /// A `prompt` field carried by a story or task.
    Inline,
}

impl PromptSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Inline => "inline",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptFile {
    pub owner: PromptOwner,
    pub owner_id: String,
    pub content: String,
    pub source: PromptSource,
}

impl PromptFile {
    pub fn file_name(&self) -> String {
        self.owner.file_name(&self.owner_id)
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedBatch {
    pub plan_id: EntityId,
    pub batch: Batch,
    pub keys: Vec<KeyMapping>,
    pub unresolved: Vec<UnresolvedRef>,
    pub prompts: Vec<PromptFile>,
}

impl ResolvedBatch {
    /// Resolved records in processing order, paired with their kind.
    pub fn records(&self) -> impl Iterator<Item = (EntityKind, &Record)> {
        EntityKind::RECORDS
            .into_iter()
            .flat_map(move |kind| self.batch.records(kind).iter().map(move |r| (kind, r)))
    }
}

/// Assigns ids, resolves local keys and stamps lifecycle metadata.
///
/// The resolver never fails: references it cannot resolve are reported in
/// [`ResolvedBatch::unresolved`] and left for the caller to judge.
pub struct BatchResolver<'a> {
    sequence: &'a mut SequenceState,
    now: String,
    keys: KeyMap,
}

impl<'a> BatchResolver<'a> {
    pub fn new(sequence: &'a mut SequenceState, now: impl Into<String>) -> Self {
        Self {
            sequence,
            now: now.into(),
            keys: KeyMap::default(),
        }
    }

    pub fn resolve(mut self, mut batch: Batch) -> ResolvedBatch {
        let plan_id = self.sequence.next(EntityKind::Plan);
        tracing::debug!(plan_id = %plan_id, "allocated plan id");

        let mut mappings = Vec::new();
        for kind in EntityKind::RECORDS {
            let Some(records) = batch.records_mut(kind) else {
                continue;
            };
            for record in records.iter_mut() {
                self.assign(kind, record, &plan_id);
                if let (Some(key), Some(id)) = (record.key(), record.id()) {
                    if let Some(previous) = self.keys.insert(kind, key, id) {
                        tracing::warn!(kind = %kind, key, previous = %previous, id, "duplicate key in batch; last one wins");
                    }
                    mappings.push(KeyMapping {
                        kind,
                        key: key.to_string(),
                        id: id.to_string(),
                    });
                }
            }
        }

        let mut unresolved = Vec::new();
        for reference in REFERENCE_FIELDS {
            let Some(records) = batch.records_mut(reference.owner) else {
                continue;
            };
            for record in records.iter_mut() {
                self.resolve_field(record, reference, &mut unresolved);
            }
        }

        let mut prompts = Vec::new();
        for (index, prompt) in std::mem::take(&mut batch.prompts).into_iter().enumerate() {
            let prompt = self.resolve_prompt(index, prompt, &mut unresolved);
            prompts.push(PromptFile {
                owner: prompt.owner,
                owner_id: prompt.owner_ref.clone(),
                content: prompt.content.clone(),
                source: PromptSource::Entry,
            });
            batch.prompts.push(prompt);
        }
        for kind in [EntityKind::Story, EntityKind::Task] {
            let Some(owner) = PromptOwner::for_kind(kind) else {
                continue;
            };
            for record in batch.records(kind) {
                let (Some(prompt), Some(id)) = (record.get("prompt"), record.id()) else {
                    continue;
                };
                prompts.push(PromptFile {
                    owner,
                    owner_id: id.to_string(),
                    content: render_inline_prompt(prompt),
                    source: PromptSource::Inline,
                });
            }
        }

        ResolvedBatch {
            plan_id,
            batch,
            keys: mappings,
            unresolved,
            prompts: dedupe_prompts(prompts),
        }
    }

    fn assign(&mut self, kind: EntityKind, record: &mut Record, plan_id: &EntityId) {
        match record.id() {
            None => {
                let id = self.sequence.next(kind);
                tracing::debug!(kind = %kind, id = %id, key = record.key(), "allocated id");
                record.set("id", id.into_string());
            }
            Some(declared) => {
                if let Ok(id) = EntityId::normalize(kind, declared)
                    && id.as_str() != declared
                {
                    tracing::debug!(kind = %kind, declared, id = %id, "normalized declared id");
                    record.set("id", id.into_string());
                }
            }
        }
        record.set("planId", plan_id.as_str());
        record.set_if_absent("status", || Value::from(DEFAULT_STATUS));
        record.set_if_absent("created", || Value::from(self.now.as_str()));
        record.set_if_absent("updated", || Value::from(self.now.as_str()));
        if kind == EntityKind::Story {
            record.set_if_absent("uuid", || Value::from(uuid::Uuid::new_v4().to_string()));
        }
    }

    fn lookup(&self, target: EntityKind, value: &str) -> Option<String> {
        if let Ok(id) = EntityId::normalize(target, value) {
            return Some(id.into_string());
        }
        self.keys.get(target, value).map(str::to_string)
    }

    fn resolve_field(
        &self,
        record: &mut Record,
        reference: &ReferenceField,
        unresolved: &mut Vec<UnresolvedRef>,
    ) {
        let Some(value) = record.get_str(reference.field).map(str::to_string) else {
            return;
        };
        match self.lookup(reference.target, &value) {
            Some(id) if id != value => record.set(reference.field, id),
            Some(_) => {}
            None => unresolved.push(UnresolvedRef {
                owner: record.id().unwrap_or("<unknown>").to_string(),
                field: reference.field.to_string(),
                target: reference.target,
                value,
            }),
        }
    }

    fn resolve_prompt(
        &self,
        index: usize,
        mut prompt: PromptSpec,
        unresolved: &mut Vec<UnresolvedRef>,
    ) -> PromptSpec {
        let target = prompt.owner.kind();
        match self.lookup(target, &prompt.owner_ref) {
            Some(id) => prompt.owner_ref = id,
            None => unresolved.push(UnresolvedRef {
                owner: format!("prompts[{index}]"),
                field: match prompt.owner {
                    PromptOwner::Story => "storyId".to_string(),
                    PromptOwner::Task => "taskId".to_string(),
                },
                target,
                value: prompt.owner_ref.clone(),
            }),
        }
        prompt
    }
}

/// One prompt file per owner; when two prompts target the same owner the later one wins.
fn dedupe_prompts(prompts: Vec<PromptFile>) -> Vec<PromptFile> {
    let mut out: Vec<PromptFile> = Vec::with_capacity(prompts.len());
    for prompt in prompts {
        let existing = out
            .iter_mut()
            .find(|kept| kept.owner == prompt.owner && kept.owner_id == prompt.owner_id);
        match existing {
            Some(kept) => {
                tracing::warn!(
                    file = %prompt.file_name(),
                    replaced = kept.source.as_str(),
                    by = prompt.source.as_str(),
                    "two prompts target the same file; keeping the later one"
                );
                *kept = prompt;
            }
            None => out.push(prompt),
        }
    }
    out
}

const PROMPT_SECTIONS: [(&str, &str); 4] = [
    ("role", "Role"),
    ("intent", "Intent"),
    ("constraints", "Constraints"),
    ("acceptance", "Acceptance"),
];

/// Markdown body for a `prompt` field carried inline by a story or task.
pub fn render_inline_prompt(prompt: &Value) -> String {
    let fields = match prompt {
        Value::String(text) => return text.clone(),
        Value::Object(fields) => fields,
        other => return other.to_string(),
    };
    let mut out = String::from("# Prompt\n\n");
    for (field, label) in PROMPT_SECTIONS {
        let text = match fields.get(field) {
            None | Some(Value::Null) => continue,
            Some(Value::String(text)) if text.is_empty() => continue,
            Some(Value::String(text)) => text.clone(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", "),
            Some(other) => other.to_string(),
        };
        out.push_str(&format!("**{label}:** {text}\n\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchFormat, parse_batch};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const NOW: &str = "2025-10-26T21:50:00Z";

    fn resolve(raw: &str, sequence: &mut SequenceState) -> ResolvedBatch {
        let parsed = parse_batch(raw, BatchFormat::Yaml).expect("parse batch");
        BatchResolver::new(sequence, NOW).resolve(parsed.batch)
    }

    #[test]
    fn story_epic_key_resolves_to_allocated_id() {
        let mut sequence = SequenceState::default();
        let resolved = resolve(
            "epics:\n  - key: myKey\n    title: E\nstories:\n  - title: S\n    epic: myKey\n",
            &mut sequence,
        );
        assert_eq!(resolved.plan_id.as_str(), "PLAN-0001");
        assert_eq!(resolved.batch.epics[0].id(), Some("EP-0001"));
        assert_eq!(resolved.batch.stories[0].get_str("epic"), Some("EP-0001"));
        assert_eq!(
            resolved.keys,
            vec![KeyMapping {
                kind: EntityKind::Epic,
                key: "myKey".to_string(),
                id: "EP-0001".to_string(),
            }]
        );
        assert!(resolved.unresolved.is_empty());
        assert_eq!(
            sequence,
            SequenceState {
                epics: 2,
                stories: 2,
                tasks: 1,
                plans: 2,
            }
        );
    }

    #[test]
    fn declared_ids_and_explicit_values_are_kept() {
        let mut sequence = SequenceState::default();
        let resolved = resolve(
            "stories:\n  - id: ST-0042\n    status: active\n    created: '2020-01-01T00:00:00Z'\n    uuid: fixed\n  - title: fresh\n",
            &mut sequence,
        );
        let kept = &resolved.batch.stories[0];
        assert_eq!(kept.id(), Some("ST-0042"));
        assert_eq!(kept.get_str("status"), Some("active"));
        assert_eq!(kept.get_str("created"), Some("2020-01-01T00:00:00Z"));
        assert_eq!(kept.get_str("updated"), Some(NOW));
        assert_eq!(kept.get_str("uuid"), Some("fixed"));
        assert_eq!(kept.get_str("planId"), Some("PLAN-0001"));

        let fresh = &resolved.batch.stories[1];
        assert_eq!(fresh.id(), Some("ST-0001"));
        assert_eq!(fresh.get_str("status"), Some(DEFAULT_STATUS));
        assert!(fresh.get_str("uuid").is_some_and(|uuid| uuid.len() == 36));
        assert_eq!(sequence.stories, 2);
    }

    #[test]
    fn unresolved_keys_are_left_verbatim_and_reported() {
        let mut sequence = SequenceState::default();
        let resolved = resolve(
            "stories:\n  - title: S\n    epic: ghost\ntasks:\n  - title: T\n    epic: EP-0009\n",
            &mut sequence,
        );
        assert_eq!(resolved.batch.stories[0].get_str("epic"), Some("ghost"));
        assert_eq!(resolved.batch.tasks[0].get_str("epic"), Some("EP-0009"));
        assert_eq!(
            resolved.unresolved,
            vec![UnresolvedRef {
                owner: "ST-0001".to_string(),
                field: "epic".to_string(),
                target: EntityKind::Epic,
                value: "ghost".to_string(),
            }]
        );
    }

    #[test]
    fn tasks_resolve_story_keys_and_prompts_follow_owners() {
        let mut sequence = SequenceState {
            epics: 1,
            stories: 5,
            tasks: 9,
            plans: 3,
        };
        let raw = "\
stories:
  - key: s1
    title: S
tasks:
  - key: t1
    story: s1
    prompt:
      role: dev
      intent: build it
prompts:
  - storyId: s1
    content: story prompt
";
        let resolved = resolve(raw, &mut sequence);
        assert_eq!(resolved.plan_id.as_str(), "PLAN-0003");
        assert_eq!(resolved.batch.tasks[0].id(), Some("TK-0009"));
        assert_eq!(resolved.batch.tasks[0].get_str("story"), Some("ST-0005"));
        let names = resolved
            .prompts
            .iter()
            .map(PromptFile::file_name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["STORY-ST-0005.md", "TASK-TK-0009.md"]);
        assert_eq!(
            resolved.prompts[1].content,
            "# Prompt\n\n**Role:** dev\n\n**Intent:** build it\n\n"
        );
    }

    #[test]
    fn inline_prompt_replaces_entry_for_the_same_owner() {
        let mut sequence = SequenceState::default();
        let raw = "\
stories:
  - key: s1
    title: S
    prompt: inline body
prompts:
  - storyId: s1
    content: entry body
";
        let resolved = resolve(raw, &mut sequence);
        assert_eq!(
            resolved.prompts,
            vec![PromptFile {
                owner: PromptOwner::Story,
                owner_id: "ST-0001".to_string(),
                content: "inline body".to_string(),
                source: PromptSource::Inline,
            }]
        );
    }

    #[test]
    fn unhyphenated_ids_are_normalized() {
        let mut sequence = SequenceState::default();
        let resolved = resolve(
            "epics:\n  - id: EP0007\nstories:\n  - title: S\n    epic: EP0003\n",
            &mut sequence,
        );
        assert_eq!(resolved.batch.epics[0].id(), Some("EP-0007"));
        assert_eq!(resolved.batch.stories[0].get_str("epic"), Some("EP-0003"));
        assert!(resolved.unresolved.is_empty());
        assert_eq!(sequence.epics, 1);
    }

    #[test]
    fn resolution_is_repeatable_on_a_scratch_copy() {
        let persisted = SequenceState::default();
        let raw = "epics:\n  - key: a\n  - key: b\n";
        let first = resolve(raw, &mut persisted.clone());
        let second = resolve(raw, &mut persisted.clone());
        assert_eq!(first.keys, second.keys);
        assert_eq!(first.plan_id, second.plan_id);
        assert_eq!(persisted, SequenceState::default());
    }

    #[test]
    fn inline_prompt_rendering() {
        assert_eq!(render_inline_prompt(&json!("raw body")), "raw body");
        assert_eq!(
            render_inline_prompt(&json!({ "acceptance": ["a", "b"], "role": "qa" })),
            "# Prompt\n\n**Role:** qa\n\n**Acceptance:** a, b\n\n"
        );
    }

    #[test]
    fn policy_parses_from_text() {
        assert_eq!("error".parse::<UnresolvedKeyPolicy>(), Ok(UnresolvedKeyPolicy::Error));
        assert_eq!("Keep".parse::<UnresolvedKeyPolicy>(), Ok(UnresolvedKeyPolicy::Keep));
        assert!("loud".parse::<UnresolvedKeyPolicy>().is_err());
    }
}
