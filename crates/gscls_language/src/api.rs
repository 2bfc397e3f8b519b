//! Built-in API function library, loaded from the language-data JSON feed.
//!
//! Each language id ships a JSON library shaped
//! `{ languageId, gameId, revision, api: [function…] }`. The loader first
//! tries the feed URL, then a local file; only the newest revision is kept
//! per language id. Every loaded function lives in the `sys` namespace and
//! is marked implicit, so `sys::` always resolves.
//!
//! The store is installed once at startup into process-wide read-only state
//! and never mutated after, so lookups need no synchronization.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use serde::Deserialize;

use crate::LanguageId;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLibrary {
    pub language_id: String,
    pub game_id: String,
    pub revision: u32,
    pub api: Vec<ScrFunction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrFunction {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub overloads: Vec<ScrOverload>,
    #[serde(default)]
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrOverload {
    #[serde(default)]
    pub parameters: Vec<ScrParameter>,
    #[serde(default)]
    pub called_on: Option<String>,
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub vararg: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrParameter {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_mandatory")]
    pub mandatory: bool,
}

fn default_mandatory() -> bool {
    true
}

impl ScrFunction {
    /// Arity bounds across the overload set: the loosest minimum and the
    /// widest maximum any overload accepts.
    pub fn arity_bounds(&self) -> (usize, usize) {
        if self.overloads.is_empty() {
            // No overload data; accept anything.
            return (0, usize::MAX);
        }
        let mut min = usize::MAX;
        let mut max = 0usize;
        for overload in &self.overloads {
            let mandatory = overload.parameters.iter().filter(|p| p.mandatory).count();
            min = min.min(mandatory);
            max = max.max(if overload.vararg {
                usize::MAX
            } else {
                overload.parameters.len()
            });
        }
        (min, max)
    }

    /// Hover markdown: signature, description, example.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let params = self
            .overloads
            .first()
            .map(|o| {
                o.parameters
                    .iter()
                    .map(|p| {
                        if p.mandatory {
                            format!("<{}>", p.name)
                        } else {
                            format!("[{}]", p.name)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        out.push_str(&format!("```gsc\n{}({})\n```", self.name, params));
        if let Some(desc) = &self.description {
            out.push_str(&format!("\n\n{desc}"));
        }
        if let Some(example) = &self.example {
            out.push_str(&format!("\n\n**Example**\n\n```gsc\n{example}\n```"));
        }
        out
    }
}

struct LoadedLibrary {
    revision: u32,
    game_id: String,
    functions: HashMap<String, ScrFunction>,
}

/// Per-process store of built-in functions, one library per language id.
#[derive(Default)]
pub struct ApiStore {
    libraries: HashMap<LanguageId, LoadedLibrary>,
}

impl ApiStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a library; a library already present for the same language
    /// id survives unless the incoming revision is newer.
    pub fn install(&mut self, library: ApiLibrary) {
        let Some(language) = LanguageId::from_id(&library.language_id) else {
            log::warn!("api library has unknown languageId '{}'", library.language_id);
            return;
        };
        if let Some(existing) = self.libraries.get(&language) {
            if existing.revision >= library.revision {
                log::debug!(
                    "keeping api revision {} for {language:?}, ignoring {}",
                    existing.revision,
                    library.revision
                );
                return;
            }
        }
        log::info!(
            "installed {} api functions for {language:?} (game {}, revision {})",
            library.api.len(),
            library.game_id,
            library.revision
        );
        let functions = library
            .api
            .into_iter()
            .map(|f| (f.name.to_ascii_lowercase(), f))
            .collect();
        self.libraries.insert(
            language,
            LoadedLibrary {
                revision: library.revision,
                game_id: library.game_id,
                functions,
            },
        );
    }

    pub fn function(&self, language: LanguageId, name: &str) -> Option<&ScrFunction> {
        self.libraries
            .get(&language)?
            .functions
            .get(&name.to_ascii_lowercase())
    }

    pub fn functions(&self, language: LanguageId) -> impl Iterator<Item = &ScrFunction> {
        self.libraries
            .get(&language)
            .into_iter()
            .flat_map(|lib| lib.functions.values())
    }

    pub fn revision(&self, language: LanguageId) -> Option<u32> {
        self.libraries.get(&language).map(|lib| lib.revision)
    }

    pub fn game_id(&self, language: LanguageId) -> Option<&str> {
        self.libraries.get(&language).map(|lib| lib.game_id.as_str())
    }
}

static STORE: OnceLock<ApiStore> = OnceLock::new();

/// Installs the process-wide store. Later calls are ignored; the first
/// installation wins for the lifetime of the process.
pub fn install_global(store: ApiStore) {
    let _ = STORE.set(store);
}

pub fn global() -> Option<&'static ApiStore> {
    STORE.get()
}

/// Loads one library: URL first, local file as fallback.
pub async fn load_library(url: Option<&str>, fallback: &Path) -> Result<ApiLibrary, String> {
    if let Some(url) = url {
        match fetch_library(url).await {
            Ok(library) => return Ok(library),
            Err(err) => log::warn!("api feed fetch from {url} failed: {err}; trying local file"),
        }
    }
    let text = std::fs::read_to_string(fallback)
        .map_err(|e| format!("failed to read {}: {e}", fallback.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("failed to parse {}: {e}", fallback.display()))
}

async fn fetch_library(url: &str) -> Result<ApiLibrary, String> {
    let response = reqwest::get(url).await.map_err(|e| e.to_string())?;
    let response = response.error_for_status().map_err(|e| e.to_string())?;
    response.json().await.map_err(|e| e.to_string())
}
