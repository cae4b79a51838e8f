//! Static-file adapter pair: `proposals.json` (the canonical machine array)
//! and `proposals.js` (the same array embedded as a source-level constant
//! for the static pages). The two are never patched incrementally: every
//! save regenerates both from one in-memory array, which is the only thing
//! keeping them in lockstep.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::models::proposal::{normalize_collection, Proposal};
use crate::store::adapter::{AdapterKind, CollectionAdapter};

pub const JSON_FILE: &str = "proposals.json";
pub const JS_FILE: &str = "proposals.js";

pub struct StaticFileAdapter {
    json_path: PathBuf,
    js_path: PathBuf,
}

impl StaticFileAdapter {
    pub fn new(data_dir: &Path) -> Self {
        StaticFileAdapter {
            json_path: data_dir.join(JSON_FILE),
            js_path: data_dir.join(JS_FILE),
        }
    }

    /// Reads the JSON file; a missing file is an empty collection, not an
    /// error.
    pub async fn load_json(&self) -> Result<Vec<Proposal>, StoreError> {
        match tokio::fs::read_to_string(&self.json_path).await {
            Ok(raw) => {
                let value: serde_json::Value = serde_json::from_str(&raw)?;
                Ok(normalize_collection(&value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the JS source file and decodes the embedded array literal.
    pub async fn load_js(&self) -> Result<Vec<Proposal>, StoreError> {
        match tokio::fs::read_to_string(&self.js_path).await {
            Ok(raw) => match extract_array(&raw) {
                Some(literal) => {
                    let value: serde_json::Value = serde_json::from_str(literal)?;
                    Ok(normalize_collection(&value))
                }
                None => Ok(Vec::new()),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes both files from one array. JSON first; the JS companion is
    /// rendered from the same serialization so the pair cannot drift.
    pub async fn write_pair(&self, proposals: &[Proposal]) -> Result<(), StoreError> {
        if let Some(dir) = self.json_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_string_pretty(proposals)?;
        tokio::fs::write(&self.json_path, &json).await?;
        tokio::fs::write(&self.js_path, render_js_source(&json)).await?;
        Ok(())
    }
}

#[async_trait]
impl CollectionAdapter for StaticFileAdapter {
    async fn load(&self) -> Result<Vec<Proposal>, StoreError> {
        let js = self.load_js().await?;
        let json = self.load_json().await?;
        Ok(merge_collections(js, json))
    }

    async fn save(&self, proposals: &[Proposal]) -> Result<(), StoreError> {
        self.write_pair(proposals).await
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::StaticFiles
    }
}

pub fn render_js_source(json_array: &str) -> String {
    format!(
        "// Generated by sitegen. Do not edit by hand; edits are overwritten\n\
         // on the next build.\n\
         const PROPOSALS = {json_array};\n"
    )
}

/// Locates the array literal in a JS source file: everything from the first
/// `[` after the assignment through the last `]`.
pub fn extract_array(source: &str) -> Option<&str> {
    let eq = source.find('=')?;
    let start = eq + source[eq..].find('[')?;
    let end = source.rfind(']')?;
    if end < start {
        return None;
    }
    Some(&source[start..=end])
}

/// Composite identity used when reconciling the two files. City and title
/// together stand in for a key because neither file reliably carries ids.
pub fn composite_key(p: &Proposal) -> String {
    format!(
        "{}|{}",
        p.city.trim().to_lowercase(),
        p.title.trim().to_lowercase()
    )
}

/// Merges the two file collections. JS-sourced records win ties on the
/// city+title composite key; the JSON file contributes only records whose
/// key the JS file does not already hold.
pub fn merge_collections(js: Vec<Proposal>, json: Vec<Proposal>) -> Vec<Proposal> {
    let mut seen: HashSet<String> = js.iter().map(composite_key).collect();
    let mut merged = js;
    for record in json {
        if seen.insert(composite_key(&record)) {
            merged.push(record);
        }
    }
    merged
}
