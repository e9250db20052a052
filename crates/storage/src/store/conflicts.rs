#![forbid(unsafe_code)]

use super::StoreError;
use dp_core::EntityKind;
use std::collections::HashSet;
use std::path::PathBuf;

/// A file an import intends to create, computed from a resolved record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteTarget {
    pub kind: EntityKind,
    pub id: String,
    pub path: PathBuf,
    /// The file may never be overwritten, not even under upsert.
    pub create_only: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictReason {
    /// The file already exists and overwriting it is not allowed.
    Exists,
    /// Two records of the same batch resolve to this file.
    DuplicateInBatch,
}

impl ConflictReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exists => "already exists",
            Self::DuplicateInBatch => "targeted twice in this batch",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictFinding {
    pub kind: EntityKind,
    pub id: String,
    pub path: PathBuf,
    pub reason: ConflictReason,
}

/// Checks every target before anything is written and reports all findings.
pub fn find_conflicts(targets: &[WriteTarget], upsert: bool) -> Vec<ConflictFinding> {
    let mut seen = HashSet::new();
    let mut findings = Vec::new();
    for target in targets {
        if !seen.insert(target.path.as_path()) {
            findings.push(ConflictFinding {
                kind: target.kind,
                id: target.id.clone(),
                path: target.path.clone(),
                reason: ConflictReason::DuplicateInBatch,
            });
            continue;
        }
        if (target.create_only || !upsert) && target.path.exists() {
            findings.push(ConflictFinding {
                kind: target.kind,
                id: target.id.clone(),
                path: target.path.clone(),
                reason: ConflictReason::Exists,
            });
        }
    }
    findings
}

pub fn check_writable(targets: &[WriteTarget], upsert: bool) -> Result<(), StoreError> {
    let findings = find_conflicts(targets, upsert);
    if findings.is_empty() {
        return Ok(());
    }
    for finding in &findings {
        tracing::warn!(
            kind = %finding.kind,
            id = %finding.id,
            path = %finding.path.display(),
            reason = finding.reason.as_str(),
            "write conflict"
        );
    }
    Err(StoreError::Conflict {
        paths: findings.into_iter().map(|finding| finding.path).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn target(dir: &std::path::Path, id: &str, create_only: bool) -> WriteTarget {
        WriteTarget {
            kind: EntityKind::Story,
            id: id.to_string(),
            path: dir.join(format!("{id}.json")),
            create_only,
        }
    }

    #[test]
    fn all_existing_targets_are_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("ST-0001.json"), "{}").expect("write");
        std::fs::write(dir.path().join("ST-0003.json"), "{}").expect("write");
        let targets = vec![
            target(dir.path(), "ST-0001", false),
            target(dir.path(), "ST-0002", false),
            target(dir.path(), "ST-0003", false),
        ];
        let findings = find_conflicts(&targets, false);
        assert_eq!(
            findings
                .iter()
                .map(|finding| finding.path.clone())
                .collect::<Vec<_>>(),
            vec![dir.path().join("ST-0001.json"), dir.path().join("ST-0003.json")]
        );
        match check_writable(&targets, false) {
            Err(StoreError::Conflict { paths }) => assert_eq!(paths.len(), 2),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn upsert_allows_existing_files_except_create_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("ST-0001.json"), "{}").expect("write");
        std::fs::write(dir.path().join("PLAN-0001.json"), "{}").expect("write");
        assert!(check_writable(&[target(dir.path(), "ST-0001", false)], true).is_ok());
        let findings = find_conflicts(&[target(dir.path(), "PLAN-0001", true)], true);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].reason, ConflictReason::Exists);
    }

    #[test]
    fn duplicate_targets_conflict_in_every_mode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let targets = vec![
            target(dir.path(), "ST-0007", false),
            target(dir.path(), "ST-0007", false),
        ];
        let findings = find_conflicts(&targets, true);
        assert_eq!(
            findings,
            vec![ConflictFinding {
                kind: EntityKind::Story,
                id: "ST-0007".to_string(),
                path: dir.path().join("ST-0007.json"),
                reason: ConflictReason::DuplicateInBatch,
            }]
        );
    }
}
