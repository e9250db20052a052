#![forbid(unsafe_code)]

mod canonicalize;
mod conflicts;
mod error;
mod files;
mod import;
mod index;
mod requests;
mod sequence;
mod validate;

pub use canonicalize::CanonicalizeReport;
pub use conflicts::{ConflictFinding, ConflictReason, WriteTarget, check_writable, find_conflicts};
pub use error::{ErrorKind, StoreError};
pub use import::{CommitReport, FileAction, ImportOutcome, ImportPlan, PlannedFile};
pub use index::{DocsIndexSummary, StoryIndexSummary};
pub use requests::*;
pub use validate::{SchemaValidator, ValidationReport, Violation};

use dp_core::{EntityKind, PromptOwner};
use std::path::{Path, PathBuf};

const PROJECT_DIR: &str = ".project";
const SCHEMAS_DIR: &str = "schemas";
const ROOT_MARKERS: [&str; 2] = [PROJECT_DIR, ".git"];

/// Walks upward from `start` to the first directory holding `.project` or `.git`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| ROOT_MARKERS.iter().any(|marker| dir.join(marker).exists()))
        .map(Path::to_path_buf)
}

/// Filesystem layout of one project's metadata directory.
///
/// The directory is assumed to be owned by a single invocation at a time;
/// nothing here locks it.
#[derive(Clone, Debug)]
pub struct ProjectStore {
    root: PathBuf,
    project_dir: PathBuf,
}

impl ProjectStore {
    pub fn open(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let project_dir = root.join(PROJECT_DIR);
        Self { root, project_dir }
    }

    pub fn discover(start: impl AsRef<Path>) -> Result<Self, StoreError> {
        let start = start.as_ref();
        let root = find_project_root(start).ok_or_else(|| StoreError::NoProjectRoot {
            start: start.to_path_buf(),
        })?;
        tracing::debug!(root = %root.display(), "project root located");
        Ok(Self::open(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn kind_dir(&self, kind: EntityKind) -> PathBuf {
        self.project_dir.join(kind.plural())
    }

    /// Location of a record file; fully determined by kind and id.
    pub fn record_path(&self, kind: EntityKind, id: &str) -> PathBuf {
        self.kind_dir(kind)
            .join(format!("{id}.{}", kind.extension()))
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.project_dir.join("prompts")
    }

    pub fn prompt_path(&self, owner: PromptOwner, owner_id: &str) -> PathBuf {
        self.prompts_dir().join(owner.file_name(owner_id))
    }

    pub fn sequence_path(&self) -> PathBuf {
        self.project_dir.join("sequence.json")
    }

    pub fn schema_path(&self, kind: EntityKind) -> PathBuf {
        self.root
            .join(SCHEMAS_DIR)
            .join(format!("{}.json", kind.as_str()))
    }

    pub fn story_index_path(&self) -> PathBuf {
        self.project_dir.join("index.json")
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.project_dir.join("docs")
    }

    pub fn ideas_dir(&self) -> PathBuf {
        self.project_dir.join("ideas")
    }

    pub fn docs_index_path(&self) -> PathBuf {
        self.docs_dir().join("index.json")
    }

    /// `path` relative to the metadata directory, with `/` separators.
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.project_dir).unwrap_or(path);
        rel.components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn layout_paths() {
        let store = ProjectStore::open("/work/repo");
        assert_eq!(
            store.record_path(EntityKind::Story, "ST-0001"),
            PathBuf::from("/work/repo/.project/stories/ST-0001.json")
        );
        assert_eq!(
            store.record_path(EntityKind::Plan, "PLAN-0001"),
            PathBuf::from("/work/repo/.project/plans/PLAN-0001.yaml")
        );
        assert_eq!(
            store.prompt_path(PromptOwner::Task, "TK-0002"),
            PathBuf::from("/work/repo/.project/prompts/TASK-TK-0002.md")
        );
        assert_eq!(
            store.schema_path(EntityKind::Story),
            PathBuf::from("/work/repo/schemas/story.json")
        );
        assert_eq!(
            store.relative(&store.record_path(EntityKind::Epic, "EP-0001")),
            "epics/EP-0001.json"
        );
    }

    #[test]
    fn root_is_found_from_a_nested_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("src/deep");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::create_dir_all(dir.path().join(".project")).expect("mkdir");
        assert_eq!(find_project_root(&nested), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn discover_without_marker_is_a_precondition_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Guard against a marker somewhere above the temp dir.
        if find_project_root(dir.path()).is_some() {
            return;
        }
        let err = ProjectStore::discover(dir.path()).expect_err("no root");
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }
}
