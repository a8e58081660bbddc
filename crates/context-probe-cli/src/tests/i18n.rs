// crates/context-probe-cli/src/tests/i18n.rs
// ============================================================================
// Module: CLI Message Catalog Tests
// Description: Unit tests for catalog integrity and placeholder substitution.
// Purpose: Ensure every message renders and keys stay unique.
// Dependencies: context-probe-cli i18n module
// ============================================================================

//! ## Overview
//! Verifies catalog keys are unique, placeholders are well-formed, and the
//! [`t!`](crate::t) macro substitutes named arguments.

use std::collections::BTreeSet;

use crate::i18n::MessageArg;
use crate::i18n::catalog_entries;
use crate::i18n::translate;

fn placeholder_names(template: &str) -> Result<BTreeSet<String>, String> {
    let mut names = BTreeSet::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1 ..];
        let end = after.find('}').ok_or_else(|| format!("unclosed placeholder in {template}"))?;
        let name = &after[.. end];
        if name.is_empty() || !name.chars().all(|ch| ch.is_ascii_lowercase() || ch == '_') {
            return Err(format!("bad placeholder '{name}' in {template}"));
        }
        names.insert(name.to_string());
        rest = &after[end + 1 ..];
    }
    Ok(names)
}

#[test]
fn catalog_keys_are_unique() -> Result<(), String> {
    let mut seen = BTreeSet::new();
    for (key, _) in catalog_entries() {
        if !seen.insert(*key) {
            return Err(format!("duplicate key {key}"));
        }
    }
    Ok(())
}

#[test]
fn catalog_placeholders_are_well_formed() -> Result<(), String> {
    for (_, template) in catalog_entries() {
        placeholder_names(template)?;
    }
    Ok(())
}

#[test]
fn translate_substitutes_every_argument() -> Result<(), String> {
    let rendered = translate(
        "run.complete",
        vec![MessageArg::new("label", "async"), MessageArg::new("log", "debug.async.json")],
    );
    if rendered.contains('{') {
        return Err(format!("unsubstituted placeholder in {rendered}"));
    }
    if !rendered.contains("Test run for async complete!") || !rendered.contains("debug.async.json")
    {
        return Err(format!("unexpected rendering {rendered}"));
    }
    Ok(())
}

#[test]
fn macro_renders_named_arguments() -> Result<(), String> {
    let rendered = crate::t!("run.server_uri", uri = "http://127.0.0.1:3000");
    if rendered == "Server running on http://127.0.0.1:3000" {
        Ok(())
    } else {
        Err(format!("unexpected rendering {rendered}"))
    }
}

#[test]
fn unknown_key_renders_as_itself() -> Result<(), String> {
    let rendered = translate("missing.key", Vec::new());
    if rendered == "missing.key" { Ok(()) } else { Err(rendered) }
}
