use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;

/// Reads a persona prompt from a markdown file.
pub fn load_persona(path: &Path) -> Result<String> {
    if path.extension().and_then(|s| s.to_str()) != Some("md") {
        bail!("Persona file must be markdown: {}", path.display());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read persona file: {}", path.display()))?;
    let content = content.trim();
    if content.is_empty() {
        bail!("Persona file is empty: {}", path.display());
    }

    Ok(content.to_string())
}
