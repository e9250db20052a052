#![forbid(unsafe_code)]

use dp_core::{BatchFormat, UnresolvedKeyPolicy};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportOptions {
    pub format: BatchFormat,
    /// Overwrite record files that already exist instead of aborting.
    pub upsert: bool,
    /// Report what a commit would do, including conflicts, without writing.
    pub dry_run: bool,
    pub unresolved_keys: UnresolvedKeyPolicy,
    /// Schema settings for the post-commit validation pass.
    pub validate: ValidateOptions,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Unknown `format` keywords in a schema are errors instead of being ignored.
    pub strict: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self { strict: true }
    }
}
