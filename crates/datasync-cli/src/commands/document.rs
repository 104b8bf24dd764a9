//! Document command handlers

use anyhow::{bail, Context, Result};
use serde_json::Value;

use datasync_core::{Document, LocalStore, ObjectKey};

use crate::output::Output;

/// Count the documents of a type
pub fn count(store: &mut LocalStore, type_name: &str, output: &Output) -> Result<()> {
    let count = store.count(type_name)?;
    output.print_count(type_name, count);
    Ok(())
}

/// List the ids of a type
pub fn keys(store: &mut LocalStore, type_name: &str, output: &Output) -> Result<()> {
    let ids = store.keys(type_name)?;
    output.print_keys(type_name, &ids);
    Ok(())
}

/// Show a single document
pub fn get(store: &mut LocalStore, type_name: &str, id: String, output: &Output) -> Result<()> {
    let key = ObjectKey::new(type_name, id);
    let doc = store.load(&key)?;
    output.print_document(&key, &doc);
    Ok(())
}

/// Create or replace a document
pub fn put(
    store: &mut LocalStore,
    type_name: &str,
    id: String,
    content: &str,
    output: &Output,
) -> Result<()> {
    let doc = parse_document(content)?;
    let key = ObjectKey::new(type_name, id);

    store
        .save(&key, &doc)
        .with_context(|| format!("Failed to save {}", key))?;

    output.success(&format!("Saved {}", key));
    Ok(())
}

/// Delete a document
pub fn remove(store: &mut LocalStore, type_name: &str, id: String, output: &Output) -> Result<()> {
    let key = ObjectKey::new(type_name, id);

    if !store
        .remove(&key)
        .with_context(|| format!("Failed to delete {}", key))?
    {
        bail!("Document not found: {}", key);
    }

    output.success(&format!("Deleted {}", key));
    Ok(())
}

/// Show the documents whose id matches a pattern
pub fn find(store: &mut LocalStore, type_name: &str, pattern: &str, output: &Output) -> Result<()> {
    let docs = store.find(type_name, pattern)?;
    output.print_documents(type_name, &docs);
    Ok(())
}

/// Show all documents of a type
pub fn list(store: &mut LocalStore, type_name: &str, output: &Output) -> Result<()> {
    let docs = store.load_all(type_name)?;
    output.print_documents(type_name, &docs);
    Ok(())
}

/// Parse command line JSON into a document
fn parse_document(json: &str) -> Result<Document> {
    let value: Value = serde_json::from_str(json).context("Invalid JSON")?;
    match value {
        Value::Object(doc) => Ok(doc),
        other => bail!("A document must be a JSON object, got: {}", other),
    }
}
