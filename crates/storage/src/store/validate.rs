#![forbid(unsafe_code)]

use super::files::{collect_files, read_text};
use super::{ProjectStore, StoreError, ValidateOptions};
use dp_core::EntityKind;
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

/// A compiled structural schema for one record kind.
pub struct SchemaValidator {
    kind: EntityKind,
    compiled: JSONSchema,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl SchemaValidator {
    pub fn compile(
        kind: EntityKind,
        schema: &Value,
        options: ValidateOptions,
    ) -> Result<Self, String> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .should_validate_formats(true)
            .should_ignore_unknown_formats(!options.strict)
            .compile(schema)
            .map_err(|err| err.to_string())?;
        Ok(Self { kind, compiled })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Checks `record` and returns every violation, not just the first.
    pub fn validate(&self, record: &Value) -> Result<(), Vec<String>> {
        match self.compiled.validate(record) {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors
                .map(|err| {
                    let pointer = err.instance_path.to_string();
                    if pointer.is_empty() {
                        err.to_string()
                    } else {
                        format!("{pointer}: {err}")
                    }
                })
                .collect()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// Record file relative to the metadata directory.
    pub path: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: usize,
    pub invalid: usize,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.invalid == 0
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.valid += other.valid;
        self.invalid += other.invalid;
        self.violations.extend(other.violations);
    }

    /// Turns a report with invalid records into [`StoreError::Validation`].
    pub fn into_result(self) -> Result<Self, StoreError> {
        if self.is_ok() {
            return Ok(self);
        }
        Err(StoreError::Validation {
            invalid: self.invalid,
            summary: self
                .violations
                .iter()
                .map(|violation| format!("{} ({})", violation.path, violation.reason))
                .collect(),
        })
    }
}

impl ProjectStore {
    pub fn schema_validator(
        &self,
        kind: EntityKind,
        options: ValidateOptions,
    ) -> Result<SchemaValidator, StoreError> {
        let path = self.schema_path(kind);
        if !path.is_file() {
            return Err(StoreError::MissingSchema(path));
        }
        let raw = read_text(&path)?;
        let schema: Value = serde_json::from_str(&raw).map_err(|err| StoreError::InvalidSchema {
            path: path.clone(),
            message: err.to_string(),
        })?;
        SchemaValidator::compile(kind, &schema, options)
            .map_err(|message| StoreError::InvalidSchema { path, message })
    }

    /// Validates every record file of the validator's kind.
    pub fn validate_kind(&self, validator: &SchemaValidator) -> Result<ValidationReport, StoreError> {
        let mut report = ValidationReport::default();
        for path in collect_files(&self.kind_dir(validator.kind()), "json", &[])? {
            let rel = self.relative(&path);
            let raw = read_text(&path)?;
            let reasons = match serde_json::from_str::<Value>(&raw) {
                Ok(record) => match validator.validate(&record) {
                    Ok(()) => Vec::new(),
                    Err(reasons) => reasons,
                },
                Err(err) => vec![format!("invalid JSON: {err}")],
            };
            if reasons.is_empty() {
                report.valid += 1;
                continue;
            }
            report.invalid += 1;
            for reason in reasons {
                report.violations.push(Violation {
                    path: rel.clone(),
                    reason,
                });
            }
        }
        tracing::info!(
            kind = %validator.kind(),
            valid = report.valid,
            invalid = report.invalid,
            "validated records"
        );
        Ok(report)
    }

    /// Validates stories (schema required) and epics/tasks when they have a schema.
    pub fn validate_project(&self, options: ValidateOptions) -> Result<ValidationReport, StoreError> {
        let mut report = self.validate_kind(&self.schema_validator(EntityKind::Story, options)?)?;
        for kind in [EntityKind::Epic, EntityKind::Task] {
            if !self.schema_path(kind).is_file() {
                continue;
            }
            report.merge(self.validate_kind(&self.schema_validator(kind, options)?)?);
        }
        Ok(report)
    }
}
