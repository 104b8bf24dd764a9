//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use datasync_core::{Document, ObjectKey};
use serde_json::Value;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a single document
    pub fn print_document(&self, key: &ObjectKey, doc: &Document) {
        match self.format {
            OutputFormat::Human => {
                println!("── {} ──", key);
                println!("{:#}", Value::Object(doc.clone()));
            }
            OutputFormat::Json => {
                println!("{:#}", Value::Object(doc.clone()));
            }
            OutputFormat::Quiet => {
                println!("{}", Value::Object(doc.clone()));
            }
        }
    }

    /// Print several documents of one type
    pub fn print_documents(&self, type_name: &str, docs: &[Document]) {
        match self.format {
            OutputFormat::Human => {
                if docs.is_empty() {
                    println!("No {} documents found.", type_name);
                    return;
                }
                for doc in docs {
                    println!("{}", truncate(&Value::Object(doc.clone()).to_string(), 100));
                }
                println!("\n{} document(s)", docs.len());
            }
            OutputFormat::Json => {
                let docs: Vec<Value> = docs.iter().cloned().map(Value::Object).collect();
                println!("{:#}", Value::Array(docs));
            }
            OutputFormat::Quiet => {
                for doc in docs {
                    println!("{}", Value::Object(doc.clone()));
                }
            }
        }
    }

    /// Print the ids of a type
    pub fn print_keys(&self, type_name: &str, ids: &[String]) {
        match self.format {
            OutputFormat::Human => {
                if ids.is_empty() {
                    println!("No {} documents found.", type_name);
                    return;
                }
                for id in ids {
                    println!("{}", id);
                }
                println!("\n{} id(s)", ids.len());
            }
            OutputFormat::Json => {
                println!("{}", serde_json::json!(ids));
            }
            OutputFormat::Quiet => {
                for id in ids {
                    println!("{}", id);
                }
            }
        }
    }

    /// Print the document count of a type
    pub fn print_count(&self, type_name: &str, count: u64) {
        match self.format {
            OutputFormat::Human => println!("{}: {} document(s)", type_name, count),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"type": type_name, "count": count})
                );
            }
            OutputFormat::Quiet => println!("{}", count),
        }
    }

    /// Print the stored types
    pub fn print_types(&self, types: &[Vec<u8>]) {
        let names: Vec<String> = types.iter().map(|t| type_label(t)).collect();
        match self.format {
            OutputFormat::Human => {
                if names.is_empty() {
                    println!("No types stored.");
                    return;
                }
                for name in &names {
                    println!("{}", name);
                }
                println!("\n{} type(s)", names.len());
            }
            OutputFormat::Json => {
                println!("{}", serde_json::json!(names));
            }
            OutputFormat::Quiet => {
                for name in &names {
                    println!("{}", name);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }
}

/// Printable form of a type identifier
pub fn type_label(type_name: &[u8]) -> String {
    String::from_utf8_lossy(type_name).into_owned()
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ääääääääääää", 5), "ää...");
    }

    #[test]
    fn test_type_label() {
        assert_eq!(type_label(b"User"), "User");
        assert_eq!(type_label(b"bad\xff"), "bad\u{fffd}");
    }
}
