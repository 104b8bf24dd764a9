//! Store-wide command handlers

use anyhow::{Context, Result};

use datasync_core::LocalStore;

use crate::output::Output;
use crate::prompt::confirm;

/// List the types that have stored documents
pub fn types(store: &mut LocalStore, output: &Output) -> Result<()> {
    let types = store.types()?;
    output.print_types(&types);
    Ok(())
}

/// Delete all documents of a type
pub fn clear(store: &mut LocalStore, type_name: &str, yes: bool, output: &Output) -> Result<()> {
    if !yes && output.should_prompt() {
        let count = store.count(type_name)?;
        println!("Delete all {} {} document(s)", count, type_name);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store
        .clear(type_name)
        .with_context(|| format!("Failed to clear {}", type_name))?;

    output.success(&format!("Cleared {}", type_name));
    Ok(())
}

/// Delete everything in the store
pub fn reset(store: &mut LocalStore, yes: bool, output: &Output) -> Result<()> {
    if !yes && output.should_prompt() {
        println!(
            "Delete every document below {}",
            store.backend().storage_root().display()
        );
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store.reset().context("Failed to reset store")?;

    output.success("Store reset");
    Ok(())
}
