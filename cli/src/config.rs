//! JSON ingest presets.
//!
//! A preset stores the template layout and custom tokens a studio reuses
//! across cards, e.g.
//!
//! ```json
//! {
//!   "folder_templates": { "video": "{project}/{type}/{file_year}" },
//!   "filename_template": "{stem}_{index:03d}",
//!   "custom_tokens": { "project": "harbor" },
//!   "verify": true,
//!   "hash": "blake3"
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ditz_engine::{ChecksumAlgorithm, MediaType, TemplateSet, TokenSet};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Folder template per media type name (`video`, `audio`, `photo`, `other`)
    pub folder_templates: BTreeMap<String, String>,
    pub filename_template: Option<String>,
    pub custom_tokens: TokenSet,
    pub verify: Option<bool>,
    pub hash: Option<ChecksumAlgorithm>,
}

impl IngestConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
        serde_json::from_str(&text)
            .map_err(|e| format!("Invalid config {}: {}", path.display(), e))
    }

    /// Default templates with this preset's entries applied on top.
    pub fn templates(&self) -> Result<TemplateSet, String> {
        let mut templates = TemplateSet::default();
        for (name, template) in &self.folder_templates {
            let media_type = MediaType::from_name(name).ok_or_else(|| {
                format!(
                    "Unknown media type '{}' in folder_templates. Must be 'video', 'audio', 'photo' or 'other'",
                    name
                )
            })?;
            templates = templates.with_folder_template(media_type, template.clone());
        }
        if let Some(filename) = &self.filename_template {
            templates = templates.with_filename_template(filename.clone());
        }
        Ok(templates)
    }
}
