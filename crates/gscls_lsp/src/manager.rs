//! Workspace script manager: per-file cache, dependency fan-out, locks.
//!
//! The cache is a lock-free concurrent map from URI to [`CachedScript`].
//! Editors are rooted by the client; dependencies are discovered through
//! `#using` and reference-counted by their dependent set — when the last
//! dependent drops, the dependency is evicted.
//!
//! Concurrency model: a per-URI parse lock prevents duplicate work when
//! several dependents trigger the same dependency's parse; a per-URI
//! analysis lock guards the cross-file merge. Locks are always acquired one
//! at a time on disjoint URIs, which is what rules out lock-order
//! deadlocks. Workspace indexing is gated by a counting semaphore sized
//! `max(1, cpu − 1)`.
//!
//! Cancellation is cooperative: checked at stage boundaries and around
//! file I/O. A cancelled pipeline leaves the cache's prior state untouched.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{TextDocumentContentChangeEvent, Url};
use walkdir::WalkDir;

use gscls_base::Span;
use gscls_language::api;
use gscls_language::diag::Diagnostic;
use gscls_language::preproc::FsProvider;
use gscls_language::signature::{DefinitionsTable, ScriptResolver};
use gscls_language::LanguageId;

use crate::line_index::LineIndex;
use crate::script::Script;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Open in the client; parsed and analysed.
    Editor,
    /// Discovered through `#using` or workspace indexing; parse-only until
    /// someone opens it.
    Dependency,
}

#[derive(Clone)]
pub struct CachedScript {
    pub kind: CacheKind,
    pub script: Arc<RwLock<Script>>,
    /// URIs whose analysis pulled this script in.
    pub dependents: Arc<DashSet<Url>>,
}

pub struct ScriptManager {
    cache: DashMap<Url, CachedScript>,
    parse_locks: DashMap<Url, Arc<Mutex<()>>>,
    analysis_locks: DashMap<Url, Arc<Mutex<()>>>,
    resolver: std::sync::RwLock<ScriptResolver>,
    index_gate: Arc<Semaphore>,
}

impl ScriptManager {
    pub fn new(root: PathBuf) -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let permits = cpus.saturating_sub(1).max(1);
        ScriptManager {
            cache: DashMap::new(),
            parse_locks: DashMap::new(),
            analysis_locks: DashMap::new(),
            resolver: std::sync::RwLock::new(ScriptResolver::new(root)),
            index_gate: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn set_root(&self, root: PathBuf) {
        let mut resolver = self.resolver.write().unwrap();
        resolver.root = root;
    }

    pub fn set_shared_scripts(&self, path: Option<PathBuf>) {
        let mut resolver = self.resolver.write().unwrap();
        resolver.shared = path;
    }

    fn resolver(&self) -> ScriptResolver {
        self.resolver.read().unwrap().clone()
    }

    pub fn root(&self) -> PathBuf {
        self.resolver.read().unwrap().root.clone()
    }

    pub fn get(&self, uri: &Url) -> Option<Arc<RwLock<Script>>> {
        self.cache.get(uri).map(|entry| entry.script.clone())
    }

    pub fn kind(&self, uri: &Url) -> Option<CacheKind> {
        self.cache.get(uri).map(|entry| entry.kind)
    }

    /// All cached scripts, for cross-file features.
    pub fn scripts(&self) -> Vec<(Url, Arc<RwLock<Script>>)> {
        self.cache
            .iter()
            .map(|entry| (entry.key().clone(), entry.script.clone()))
            .collect()
    }

    fn parse_lock(&self, uri: &Url) -> Arc<Mutex<()>> {
        self.parse_locks
            .entry(uri.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn analysis_lock(&self, uri: &Url) -> Arc<Mutex<()>> {
        self.analysis_locks
            .entry(uri.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ------------------------------------------------------------------
    // Editor operations
    // ------------------------------------------------------------------

    /// Caches the document, runs the pipeline, returns its diagnostics.
    pub async fn add_editor(
        &self,
        uri: Url,
        language: LanguageId,
        text: String,
        version: i32,
        cancel: CancellationToken,
    ) -> Vec<Diagnostic> {
        let script = self
            .cache
            .entry(uri.clone())
            .and_modify(|entry| entry.kind = CacheKind::Editor)
            .or_insert_with(|| CachedScript {
                kind: CacheKind::Editor,
                script: Arc::new(RwLock::new(Script::new(
                    language,
                    uri.clone(),
                    String::new(),
                    0,
                ))),
                dependents: Arc::new(DashSet::new()),
            })
            .script
            .clone();
        script.write().await.set_source(text, version);
        self.run_pipeline(&uri, &cancel).await
    }

    /// Applies incremental range-replace edits and reruns the pipeline.
    pub async fn update_editor(
        &self,
        uri: &Url,
        changes: &[TextDocumentContentChangeEvent],
        version: i32,
        cancel: CancellationToken,
    ) -> Vec<Diagnostic> {
        let Some(script) = self.get(uri) else {
            return Vec::new();
        };
        {
            let mut guard = script.write().await;
            let mut text = guard.source.clone();
            for change in changes {
                match change.range {
                    Some(range) => {
                        let index = LineIndex::new(&text);
                        let start = index.offset(range.start);
                        let end = index.offset(range.end).max(start);
                        text.replace_range(start..end, &change.text);
                    }
                    None => text = change.text.clone(),
                }
            }
            guard.set_source(text, version);
        }
        self.run_pipeline(uri, &cancel).await
    }

    /// Drops an editor entry and evicts dependencies whose dependent sets
    /// empty out, transitively.
    pub async fn remove_editor(&self, uri: &Url) {
        self.cache.remove(uri);
        self.parse_locks.remove(uri);
        self.analysis_locks.remove(uri);

        let mut dropped = vec![uri.clone()];
        while let Some(gone) = dropped.pop() {
            let mut evict = Vec::new();
            for entry in self.cache.iter() {
                let had = entry.dependents.remove(&gone).is_some();
                if had && entry.dependents.is_empty() && entry.kind == CacheKind::Dependency {
                    evict.push(entry.key().clone());
                }
            }
            for uri in evict {
                if self.cache.remove(&uri).is_some() {
                    log::debug!("evicted dependency {uri}");
                    self.parse_locks.remove(&uri);
                    self.analysis_locks.remove(&uri);
                    dropped.push(uri);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------

    async fn run_pipeline(&self, uri: &Url, cancel: &CancellationToken) -> Vec<Diagnostic> {
        if cancel.is_cancelled() {
            return Vec::new();
        }
        let Some(script) = self.get(uri) else {
            return Vec::new();
        };
        let resolver = self.resolver();

        {
            let parse_lock = self.parse_lock(uri);
            let _parsing = parse_lock.lock().await;
            let mut guard = script.write().await;
            guard.parse(&resolver, &FsProvider);
        }

        if cancel.is_cancelled() {
            return Vec::new();
        }

        // Dependency fan-out: ensure each `#using` target is parsed and
        // snapshot its exports, one lock at a time.
        let dep_paths: Vec<PathBuf> = {
            let guard = script.read().await;
            guard
                .defs
                .dependencies
                .iter()
                .filter_map(|d| d.resolved.clone())
                .collect()
        };
        let mut snapshots = Vec::with_capacity(dep_paths.len());
        for path in dep_paths {
            if cancel.is_cancelled() {
                return Vec::new();
            }
            let Ok(dep_uri) = Url::from_file_path(&path) else {
                continue;
            };
            if dep_uri == *uri {
                continue;
            }
            if let Some(snapshot) = self.ensure_dependency(&dep_uri, &path, uri).await {
                snapshots.push(snapshot);
            }
        }

        if cancel.is_cancelled() {
            return Vec::new();
        }

        let analysis_lock = self.analysis_lock(uri);
        let _analysing = analysis_lock.lock().await;
        let mut guard = script.write().await;
        guard.analyse(&snapshots, api::global());
        guard.diagnostics.clone()
    }

    /// Gets-or-inserts a dependency entry, parses it if needed under its
    /// parse lock, and snapshots its definitions under its analysis lock.
    async fn ensure_dependency(
        &self,
        dep_uri: &Url,
        path: &std::path::Path,
        dependent: &Url,
    ) -> Option<DefinitionsTable> {
        let language = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(LanguageId::from_extension)
            .unwrap_or(LanguageId::Gsc);

        let entry = self
            .cache
            .entry(dep_uri.clone())
            .or_insert_with(|| CachedScript {
                kind: CacheKind::Dependency,
                script: Arc::new(RwLock::new(Script::new(
                    language,
                    dep_uri.clone(),
                    String::new(),
                    0,
                ))),
                dependents: Arc::new(DashSet::new()),
            });
        entry.dependents.insert(dependent.clone());
        let script = entry.script.clone();
        drop(entry);

        {
            let parse_lock = self.parse_lock(dep_uri);
            let _parsing = parse_lock.lock().await;
            let mut guard = script.write().await;
            if !guard.parsed {
                let text = match tokio::fs::read_to_string(path).await {
                    Ok(text) => text,
                    Err(err) => {
                        log::warn!("failed to read dependency {}: {err}", path.display());
                        return None;
                    }
                };
                guard.set_source(text, 0);
                let resolver = self.resolver();
                guard.parse(&resolver, &FsProvider);
            }
        }

        // Snapshot under the dependency's analysis lock so a concurrent
        // analyse of the dependency cannot tear the table.
        let analysis_lock = self.analysis_lock(dep_uri);
        let _snapshotting = analysis_lock.lock().await;
        let guard = script.read().await;
        Some(guard.defs.clone())
    }

    // ------------------------------------------------------------------
    // Cross-file queries
    // ------------------------------------------------------------------

    /// Scans all cached definitions tables for a function or class.
    /// Namespace-qualified lookup is preferred; falls back to any
    /// namespace.
    pub async fn find_symbol_location(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<(Url, Span)> {
        self.find_symbol_location_excluding(namespace, name, None)
            .await
    }

    /// As [`Self::find_symbol_location`], but skips one URI. Callers that
    /// already hold that script's lock use this to avoid re-locking it.
    pub async fn find_symbol_location_excluding(
        &self,
        namespace: Option<&str>,
        name: &str,
        exclude: Option<&Url>,
    ) -> Option<(Url, Span)> {
        let scripts = self.scripts();
        let mut fallback: Option<(Url, Span)> = None;
        for (uri, script) in scripts {
            if exclude == Some(&uri) {
                continue;
            }
            let guard = script.read().await;
            if let Some(ns) = namespace {
                if let Some(entry) = guard.defs.function(ns, name) {
                    if let Ok(found) = Url::parse(&entry.location.uri) {
                        return Some((found, entry.location.span));
                    }
                }
            }
            if fallback.is_none() {
                let hit = guard
                    .defs
                    .function_any_namespace(name)
                    .map(|f| f.location.clone())
                    .or_else(|| guard.defs.class(name).map(|c| c.location.clone()));
                if let Some(location) = hit {
                    if let Ok(found) = Url::parse(&location.uri) {
                        fallback = Some((found, location.span));
                    }
                }
            }
        }
        fallback
    }

    // ------------------------------------------------------------------
    // Workspace indexing
    // ------------------------------------------------------------------

    /// Enumerates every `*.gsc`/`*.csc` under `root` and parses them under
    /// the indexing gate. Analysis is deliberately skipped for unopened
    /// files. Returns per-file diagnostics for publication.
    pub async fn index_workspace(
        self: Arc<Self>,
        root: PathBuf,
        cancel: CancellationToken,
    ) -> Vec<(Url, Vec<Diagnostic>)> {
        let files: Vec<PathBuf> = WalkDir::new(&root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(LanguageId::from_extension)
                    .is_some()
            })
            .map(|entry| entry.into_path())
            .collect();

        log::info!("indexing {} scripts under {}", files.len(), root.display());

        let mut tasks = tokio::task::JoinSet::new();
        for path in files {
            let manager = Arc::clone(&self);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = manager.index_gate.clone().acquire_owned().await.ok()?;
                if cancel.is_cancelled() {
                    return None;
                }
                manager.index_file(path).await
            });
        }

        let mut published = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Some(result)) = joined {
                published.push(result);
            }
        }
        published
    }

    async fn index_file(&self, path: PathBuf) -> Option<(Url, Vec<Diagnostic>)> {
        let uri = Url::from_file_path(&path).ok()?;
        let language = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(LanguageId::from_extension)?;

        // An open editor already carries fresher state than the disk copy.
        if self.kind(&uri) == Some(CacheKind::Editor) {
            return None;
        }

        let text = tokio::fs::read_to_string(&path).await.ok()?;
        let script = self
            .cache
            .entry(uri.clone())
            .or_insert_with(|| CachedScript {
                kind: CacheKind::Dependency,
                script: Arc::new(RwLock::new(Script::new(
                    language,
                    uri.clone(),
                    String::new(),
                    0,
                ))),
                dependents: Arc::new(DashSet::new()),
            })
            .script
            .clone();

        let parse_lock = self.parse_lock(&uri);
        let _parsing = parse_lock.lock().await;
        let resolver = self.resolver();
        let mut guard = script.write().await;
        if !guard.parsed {
            guard.set_source(text, 0);
            guard.parse(&resolver, &FsProvider);
        }
        Some((uri.clone(), guard.diagnostics.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_script(dir: &std::path::Path, rel: &str, contents: &str) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    fn file_uri(path: &std::path::Path) -> Url {
        Url::from_file_path(path).unwrap()
    }

    #[tokio::test]
    async fn add_editor_produces_diagnostics_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(ScriptManager::new(dir.path().to_path_buf()));
        let path = write_script(dir.path(), "a.gsc", "#namespace a;\nfunction f() { x = missing(); }\n");
        let diags = manager
            .add_editor(
                file_uri(&path),
                LanguageId::Gsc,
                fs::read_to_string(&path).unwrap(),
                1,
                CancellationToken::new(),
            )
            .await;
        assert!(!diags.is_empty(), "missing() should produce a diagnostic");
    }

    #[tokio::test]
    async fn cross_file_definition_resolves_after_both_known() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(ScriptManager::new(dir.path().to_path_buf()));
        write_script(
            dir.path(),
            "scripts/lib.gsc",
            "#namespace lib;\nfunction helper() {}\n",
        );
        let a = write_script(
            dir.path(),
            "a.gsc",
            "#using scripts\\lib;\n#namespace a;\nfunction f() { lib::helper(); }\n",
        );

        let diags = manager
            .add_editor(
                file_uri(&a),
                LanguageId::Gsc,
                fs::read_to_string(&a).unwrap(),
                1,
                CancellationToken::new(),
            )
            .await;
        assert!(
            diags.iter().all(|d| d.code.code() != 3001),
            "lib:: must be known after dependency parse: {diags:?}"
        );

        let found = manager
            .find_symbol_location(Some("lib"), "helper")
            .await
            .expect("helper should resolve");
        assert!(found.0.as_str().ends_with("lib.gsc"));
    }

    #[tokio::test]
    async fn dependency_evicted_when_last_dependent_closes() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(ScriptManager::new(dir.path().to_path_buf()));
        let lib = write_script(dir.path(), "scripts/lib.gsc", "#namespace lib;\nfunction h() {}\n");
        let a = write_script(
            dir.path(),
            "a.gsc",
            "#using scripts\\lib;\n#namespace a;\nfunction f() {}\n",
        );

        let a_uri = file_uri(&a);
        let lib_uri = file_uri(&lib);
        manager
            .add_editor(
                a_uri.clone(),
                LanguageId::Gsc,
                fs::read_to_string(&a).unwrap(),
                1,
                CancellationToken::new(),
            )
            .await;
        assert_eq!(manager.kind(&lib_uri), Some(CacheKind::Dependency));

        manager.remove_editor(&a_uri).await;
        assert!(manager.get(&lib_uri).is_none(), "lib should be evicted");
        assert!(manager.get(&a_uri).is_none());
    }

    #[tokio::test]
    async fn open_dependency_survives_as_editor() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(ScriptManager::new(dir.path().to_path_buf()));
        let lib = write_script(dir.path(), "scripts/lib.gsc", "#namespace lib;\nfunction h() {}\n");
        let a = write_script(
            dir.path(),
            "a.gsc",
            "#using scripts\\lib;\n#namespace a;\nfunction f() {}\n",
        );

        let a_uri = file_uri(&a);
        let lib_uri = file_uri(&lib);
        manager
            .add_editor(
                a_uri.clone(),
                LanguageId::Gsc,
                fs::read_to_string(&a).unwrap(),
                1,
                CancellationToken::new(),
            )
            .await;
        // User opens the dependency: it becomes an editor.
        manager
            .add_editor(
                lib_uri.clone(),
                LanguageId::Gsc,
                fs::read_to_string(&lib).unwrap(),
                1,
                CancellationToken::new(),
            )
            .await;
        assert_eq!(manager.kind(&lib_uri), Some(CacheKind::Editor));

        // Closing the original editor must not evict an open editor.
        manager.remove_editor(&a_uri).await;
        assert_eq!(manager.kind(&lib_uri), Some(CacheKind::Editor));
    }

    #[tokio::test]
    async fn incremental_edit_applies_range_replace() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(ScriptManager::new(dir.path().to_path_buf()));
        let a = write_script(dir.path(), "a.gsc", "#namespace a;\nfunction f() { x = 1; }\n");
        let uri = file_uri(&a);
        manager
            .add_editor(
                uri.clone(),
                LanguageId::Gsc,
                fs::read_to_string(&a).unwrap(),
                1,
                CancellationToken::new(),
            )
            .await;

        // Replace `1` with `missing_fn()` on line 1.
        use tower_lsp::lsp_types::{Position, Range};
        let change = TextDocumentContentChangeEvent {
            range: Some(Range {
                start: Position::new(1, 19),
                end: Position::new(1, 20),
            }),
            range_length: None,
            text: "missing_fn()".to_string(),
        };
        let diags = manager
            .update_editor(&uri, &[change], 2, CancellationToken::new())
            .await;
        assert!(
            diags.iter().any(|d| d.message.contains("missing_fn")),
            "edited call should be analysed: {diags:?}"
        );
        let script = manager.get(&uri).unwrap();
        let guard = script.read().await;
        assert!(guard.source.contains("x = missing_fn()"));
        assert_eq!(guard.revision, 2);
    }

    #[tokio::test]
    async fn index_workspace_parses_everything_without_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(ScriptManager::new(dir.path().to_path_buf()));
        write_script(dir.path(), "scripts/a.gsc", "#namespace a;\nfunction fa() {}\n");
        write_script(dir.path(), "scripts/b.csc", "#namespace b;\nfunction fb() {}\n");
        write_script(dir.path(), "scripts/notes.txt", "not a script");

        let results = Arc::clone(&manager)
            .index_workspace(dir.path().to_path_buf(), CancellationToken::new())
            .await;
        assert_eq!(results.len(), 2, "only script suffixes are indexed");

        for (uri, _) in &results {
            let script = manager.get(uri).unwrap();
            let guard = script.read().await;
            assert!(guard.parsed);
            assert!(!guard.analysed, "indexing must skip analysis");
        }

        // Indexed symbols are searchable.
        let hit = manager.find_symbol_location(Some("b"), "fb").await;
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn cancelled_pipeline_leaves_prior_state() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(ScriptManager::new(dir.path().to_path_buf()));
        let a = write_script(dir.path(), "a.gsc", "#namespace a;\nfunction f() {}\n");
        let uri = file_uri(&a);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let diags = manager
            .add_editor(
                uri.clone(),
                LanguageId::Gsc,
                fs::read_to_string(&a).unwrap(),
                1,
                cancel,
            )
            .await;
        assert!(diags.is_empty(), "cancelled pipeline publishes nothing");
        let script = manager.get(&uri).unwrap();
        assert!(!script.read().await.parsed);
    }
}
