#![forbid(unsafe_code)]

use super::conflicts::{ConflictFinding, WriteTarget, check_writable, find_conflicts};
use super::files::{read_text, write_atomic};
use super::{
    DocsIndexSummary, ImportOptions, ProjectStore, StoreError, StoryIndexSummary,
    ValidationReport,
};
use dp_core::canonical::{to_canonical_json, to_canonical_yaml};
use dp_core::clock::now_rfc3339;
use dp_core::{
    BatchFormat, BatchResolver, EntityId, EntityKind, KeyMapping, ParsedBatch, PromptSource,
    ResolvedBatch, SequenceState, UnresolvedKeyPolicy, UnresolvedRef, parse_batch,
};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileAction {
    Create,
    Overwrite,
}

impl FileAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Overwrite => "overwrite",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedFile {
    pub path: PathBuf,
    /// Path relative to the metadata directory.
    pub rel: String,
    pub action: FileAction,
    /// Set for prompt files.
    pub prompt: Option<PromptSource>,
}

/// What an import resolves to, before anything is written.
#[derive(Clone, Debug)]
pub struct ImportPlan {
    pub plan_id: String,
    pub epics: usize,
    pub stories: usize,
    pub tasks: usize,
    pub prompts: usize,
    pub keys: Vec<KeyMapping>,
    pub files: Vec<PlannedFile>,
    pub unresolved: Vec<UnresolvedRef>,
    /// Only filled for dry runs; an explain pass does not look for conflicts.
    pub conflicts: Vec<ConflictFinding>,
    /// Counters as they would be persisted by a commit.
    pub sequence_after: SequenceState,
}

#[derive(Clone, Debug)]
pub struct CommitReport {
    pub plan: ImportPlan,
    pub written: Vec<String>,
    pub validation: ValidationReport,
    pub story_index: StoryIndexSummary,
    pub docs_index: DocsIndexSummary,
}

#[derive(Clone, Debug)]
pub enum ImportOutcome {
    DryRun(ImportPlan),
    Committed(Box<CommitReport>),
}

struct Prepared {
    envelope: Value,
    resolved: ResolvedBatch,
    targets: Vec<WriteTarget>,
    plan: ImportPlan,
}

impl ProjectStore {
    pub fn read_batch(&self, input: &Path, format: BatchFormat) -> Result<ParsedBatch, StoreError> {
        if !input.is_file() {
            return Err(StoreError::MissingInput(input.to_path_buf()));
        }
        let raw = read_text(input)?;
        parse_batch(&raw, format)
            .map_err(|err| StoreError::parse(input.display().to_string(), err))
    }

    /// Resolves the batch on a scratch copy of the counters and describes the result.
    pub fn explain_import(&self, input: &Path, format: BatchFormat) -> Result<ImportPlan, StoreError> {
        let parsed = self.read_batch(input, format)?;
        Ok(self.prepare(parsed)?.plan)
    }

    pub fn bulk_import(
        &self,
        input: &Path,
        options: ImportOptions,
    ) -> Result<ImportOutcome, StoreError> {
        let parsed = self.read_batch(input, options.format)?;
        self.import_batch(parsed, options)
    }

    pub fn import_batch(
        &self,
        parsed: ParsedBatch,
        options: ImportOptions,
    ) -> Result<ImportOutcome, StoreError> {
        let mut prepared = self.prepare(parsed)?;

        if options.dry_run {
            prepared.plan.conflicts = find_conflicts(&prepared.targets, options.upsert);
            tracing::info!(
                plan_id = %prepared.plan.plan_id,
                conflicts = prepared.plan.conflicts.len(),
                "dry run resolved"
            );
            return Ok(ImportOutcome::DryRun(prepared.plan));
        }

        let validator = self.schema_validator(EntityKind::Story, options.validate)?;
        if !prepared.plan.unresolved.is_empty() {
            match options.unresolved_keys {
                UnresolvedKeyPolicy::Error => {
                    return Err(StoreError::UnresolvedReferences(prepared.plan.unresolved));
                }
                UnresolvedKeyPolicy::Keep => {
                    for reference in &prepared.plan.unresolved {
                        tracing::warn!(%reference, "keeping unresolved reference verbatim");
                    }
                }
            }
        }
        check_writable(&prepared.targets, options.upsert)?;

        let written = self.commit(&prepared)?;
        let validation = self.validate_kind(&validator)?;
        let story_index = self.reindex_stories()?;
        let docs_index = self.reindex_docs()?;
        Ok(ImportOutcome::Committed(Box::new(CommitReport {
            plan: prepared.plan,
            written,
            validation,
            story_index,
            docs_index,
        })))
    }

    fn prepare(&self, parsed: ParsedBatch) -> Result<Prepared, StoreError> {
        let persisted = self.load_sequence()?;
        let mut scratch = persisted.clone();
        let ParsedBatch { envelope, batch } = parsed;
        let resolved = BatchResolver::new(&mut scratch, now_rfc3339()).resolve(batch);
        check_record_ids(&resolved)?;
        check_prompt_owners(&resolved)?;

        let plan_path = self.record_path(EntityKind::Plan, resolved.plan_id.as_str());
        let mut targets = vec![WriteTarget {
            kind: EntityKind::Plan,
            id: resolved.plan_id.to_string(),
            path: plan_path,
            create_only: true,
        }];
        for (kind, record) in resolved.records() {
            let id = record.id().unwrap_or_default().to_string();
            targets.push(WriteTarget {
                kind,
                path: self.record_path(kind, &id),
                id,
                create_only: false,
            });
        }

        let mut files = targets
            .iter()
            .map(|target| self.planned_file(target.path.clone(), None))
            .collect::<Vec<_>>();
        files.extend(resolved.prompts.iter().map(|prompt| {
            self.planned_file(
                self.prompt_path(prompt.owner, &prompt.owner_id),
                Some(prompt.source),
            )
        }));

        let plan = ImportPlan {
            plan_id: resolved.plan_id.to_string(),
            epics: resolved.batch.epics.len(),
            stories: resolved.batch.stories.len(),
            tasks: resolved.batch.tasks.len(),
            prompts: resolved.prompts.len(),
            keys: resolved.keys.clone(),
            files,
            unresolved: resolved.unresolved.clone(),
            conflicts: Vec::new(),
            sequence_after: scratch,
        };
        tracing::debug!(
            plan_id = %plan.plan_id,
            records = resolved.batch.record_count(),
            prompts = plan.prompts,
            "batch resolved"
        );
        Ok(Prepared {
            envelope,
            resolved,
            targets,
            plan,
        })
    }

    fn planned_file(&self, path: PathBuf, prompt: Option<PromptSource>) -> PlannedFile {
        let action = if path.exists() {
            FileAction::Overwrite
        } else {
            FileAction::Create
        };
        PlannedFile {
            rel: self.relative(&path),
            path,
            action,
            prompt,
        }
    }

    /// Writes plan, records, prompts and counters, in that order. Each write
    /// stands on its own; nothing is undone if a later one fails.
    fn commit(&self, prepared: &Prepared) -> Result<Vec<String>, StoreError> {
        let mut written = Vec::new();
        let plan_id = prepared.resolved.plan_id.as_str();

        let plan_path = self.record_path(EntityKind::Plan, plan_id);
        let plan_text = to_canonical_yaml(&prepared.envelope)
            .map_err(|err| StoreError::parse(self.relative(&plan_path), err))?;
        write_atomic(&plan_path, &plan_text)?;
        written.push(self.relative(&plan_path));

        for (kind, record) in prepared.resolved.records() {
            let path = self.record_path(kind, record.id().unwrap_or_default());
            let text = to_canonical_json(&record.to_value())
                .map_err(|err| StoreError::parse(self.relative(&path), err))?;
            write_atomic(&path, &text)?;
            written.push(self.relative(&path));
        }

        for prompt in &prepared.resolved.prompts {
            let path = self.prompt_path(prompt.owner, &prompt.owner_id);
            write_atomic(&path, &prompt.content)?;
            written.push(self.relative(&path));
        }

        self.persist_sequence(&prepared.plan.sequence_after)?;
        written.push(self.relative(&self.sequence_path()));

        tracing::info!(
            plan_id,
            epics = prepared.plan.epics,
            stories = prepared.plan.stories,
            tasks = prepared.plan.tasks,
            prompts = prepared.plan.prompts,
            "bulk import committed"
        );
        Ok(written)
    }
}

/// Declared ids are never reassigned, so they must already name a file of their kind.
fn check_record_ids(resolved: &ResolvedBatch) -> Result<(), StoreError> {
    for kind in EntityKind::RECORDS {
        for (index, record) in resolved.batch.records(kind).iter().enumerate() {
            let origin = format!("{}[{index}].id", kind.plural());
            let Some(value) = record.get("id") else {
                return Err(StoreError::parse(origin, "missing id"));
            };
            let Some(id) = value.as_str() else {
                return Err(StoreError::parse(origin, format!("id must be a string, got {value}")));
            };
            EntityId::try_new(kind, id).map_err(|err| StoreError::parse(origin, err))?;
        }
    }
    Ok(())
}

/// Prompt owners become part of a file name, so they must be ids of their kind.
fn check_prompt_owners(resolved: &ResolvedBatch) -> Result<(), StoreError> {
    for prompt in &resolved.prompts {
        let origin = format!("prompt for {} {:?}", prompt.owner.kind(), prompt.owner_id);
        EntityId::try_new(prompt.owner.kind(), prompt.owner_id.as_str())
            .map_err(|err| StoreError::parse(origin, err))?;
    }
    Ok(())
}
