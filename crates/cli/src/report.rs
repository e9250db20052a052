#![forbid(unsafe_code)]

use dp_storage::{CanonicalizeReport, CommitReport, ImportPlan, ProjectStore, ValidationReport};
use std::fmt::Write as _;

pub(crate) fn render_plan(store: &ProjectStore, plan: &ImportPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "plan {}", plan.plan_id);
    let _ = writeln!(
        out,
        "records: {} epics, {} stories, {} tasks, {} prompts",
        plan.epics, plan.stories, plan.tasks, plan.prompts
    );
    if !plan.keys.is_empty() {
        let _ = writeln!(out, "keys:");
        for mapping in &plan.keys {
            let _ = writeln!(out, "  {} {} -> {}", mapping.kind, mapping.key, mapping.id);
        }
    }
    let _ = writeln!(out, "files:");
    for file in &plan.files {
        match file.prompt {
            Some(source) => {
                let _ = writeln!(
                    out,
                    "  {:<9} {} ({} prompt)",
                    file.action.as_str(),
                    file.rel,
                    source.as_str()
                );
            }
            None => {
                let _ = writeln!(out, "  {:<9} {}", file.action.as_str(), file.rel);
            }
        }
    }
    if !plan.unresolved.is_empty() {
        let _ = writeln!(out, "unresolved:");
        for reference in &plan.unresolved {
            let _ = writeln!(out, "  {reference}");
        }
    }
    if !plan.conflicts.is_empty() {
        let _ = writeln!(out, "conflicts:");
        for finding in &plan.conflicts {
            let _ = writeln!(
                out,
                "  {} {}: {} {}",
                finding.kind,
                finding.id,
                store.relative(&finding.path),
                finding.reason.as_str()
            );
        }
    }
    let next = &plan.sequence_after;
    let _ = writeln!(
        out,
        "sequence after: epics={} stories={} tasks={} plans={}",
        next.epics, next.stories, next.tasks, next.plans
    );
    out
}

pub(crate) fn render_commit(store: &ProjectStore, commit: &CommitReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "imported {}: {} files written",
        commit.plan.plan_id,
        commit.written.len()
    );
    for rel in &commit.written {
        let _ = writeln!(out, "  {rel}");
    }
    for reference in &commit.plan.unresolved {
        let _ = writeln!(out, "kept unresolved: {reference}");
    }
    out.push_str(&render_validation(&commit.validation));
    let _ = writeln!(
        out,
        "wrote {}: {} stories, {} epics",
        store.relative(&commit.story_index.path),
        commit.story_index.stories,
        commit.story_index.epics
    );
    let _ = writeln!(
        out,
        "wrote {}: {} docs, {} ideas",
        store.relative(&commit.docs_index.path),
        commit.docs_index.docs,
        commit.docs_index.ideas
    );
    out
}

pub(crate) fn render_validation(report: &ValidationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "validation: {} valid, {} invalid",
        report.valid, report.invalid
    );
    for violation in &report.violations {
        let _ = writeln!(out, "  {}: {}", violation.path, violation.reason);
    }
    out
}

pub(crate) fn render_canonicalize(report: &CanonicalizeReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "canonicalized {} of {} files",
        report.rewritten.len(),
        report.scanned
    );
    for rel in &report.rewritten {
        let _ = writeln!(out, "  {rel}");
    }
    out
}
