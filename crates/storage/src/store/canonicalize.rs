#![forbid(unsafe_code)]

use super::files::{collect_files, read_text, write_atomic};
use super::{ProjectStore, StoreError};
use dp_core::canonical::canonicalize_json_text;

/// Generated artifacts that are rebuilt elsewhere and left alone.
const SKIPPED_DIRS: [&str; 1] = ["atlas"];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CanonicalizeReport {
    pub scanned: usize,
    /// Files whose bytes changed, relative to the metadata directory.
    pub rewritten: Vec<String>,
}

impl ProjectStore {
    /// Rewrites every JSON file under the metadata directory in canonical form.
    ///
    /// All files are parsed before the first rewrite, so one malformed file
    /// leaves the whole tree untouched.
    pub fn canonicalize(&self) -> Result<CanonicalizeReport, StoreError> {
        let mut pending = Vec::new();
        let files = collect_files(self.project_dir(), "json", &SKIPPED_DIRS)?;
        for path in &files {
            let raw = read_text(path)?;
            let canonical = canonicalize_json_text(&raw)
                .map_err(|err| StoreError::parse(self.relative(path), err))?;
            if canonical != raw {
                pending.push((path, canonical));
            }
        }

        let mut report = CanonicalizeReport {
            scanned: files.len(),
            rewritten: Vec::with_capacity(pending.len()),
        };
        for (path, canonical) in pending {
            write_atomic(path, &canonical)?;
            report.rewritten.push(self.relative(path));
        }
        tracing::info!(
            scanned = report.scanned,
            rewritten = report.rewritten.len(),
            "canonicalized project files"
        );
        Ok(report)
    }
}
