//! Reads a file (or string) and drives the Construction Pass; owns the
//! per-load `SecretRegistry`, `DocumentCache`, and include-stack cycle guard.
//! Grounded on `esphome/yaml_util.py`'s `load_yaml`/`_load_yaml_internal`/
//! `load_vars`/`_find_files`, restructured as an explicit context object per
//! the design notes (no process-wide globals).

use crate::constructor::Constructor;
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::expander;
use crate::origin;
use crate::secrets::{DocumentCache, SecretRegistry};
use crate::value::{AnnotatedValue, ValueKind};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SECRETS_FILENAME: &str = "secrets.yaml";

/// Given a path, returns the file's contents or an I/O error. A default
/// filesystem-backed implementation (`FsFileReader`) is provided; callers may
/// substitute their own (e.g. an in-memory filesystem for tests).
pub trait FileReader {
    fn read(&self, path: &Path) -> Result<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsFileReader;

impl FileReader for FsFileReader {
    fn read(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("{}: {e}", path.display()), None))
    }
}

/// The parameters `!include`'s mapping form passes to a remote-fetch
/// collaborator. Actually performing the fetch is out of scope for this
/// crate (see §1); `UnsupportedGitFetcher` reports a clear I/O error.
#[derive(Debug, Clone)]
pub struct GitFetchSpec {
    pub url: String,
    pub git_ref: Option<String>,
    pub refresh: String,
    pub domain: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

pub trait GitFetcher {
    fn fetch(&self, spec: &GitFetchSpec) -> Result<PathBuf>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedGitFetcher;

impl GitFetcher for UnsupportedGitFetcher {
    fn fetch(&self, spec: &GitFetchSpec) -> Result<PathBuf> {
        Err(Error::io(
            format!("git includes are not supported by this loader (url: {})", spec.url),
            None,
        ))
    }
}

/// The per-load context: owns the collaborators, the secret registry, the
/// document cache, and the include stack used for cycle detection. Running
/// multiple loads concurrently means owning multiple `Loader`s (see §5/§9).
pub struct Loader {
    file_reader: Box<dyn FileReader>,
    pub(crate) git_fetcher: Box<dyn GitFetcher>,
    pub(crate) secrets: SecretRegistry,
    doc_cache: DocumentCache,
    include_stack: Vec<PathBuf>,
}

impl Default for Loader {
    fn default() -> Self {
        Loader::new()
    }
}

impl Loader {
    pub fn new() -> Self {
        Loader {
            file_reader: Box::new(FsFileReader),
            git_fetcher: Box::new(UnsupportedGitFetcher),
            secrets: SecretRegistry::new(),
            doc_cache: DocumentCache::new(),
            include_stack: Vec::new(),
        }
    }

    pub fn with_collaborators(
        file_reader: Box<dyn FileReader>,
        git_fetcher: Box<dyn GitFetcher>,
    ) -> Self {
        Loader {
            file_reader,
            git_fetcher,
            secrets: SecretRegistry::new(),
            doc_cache: DocumentCache::new(),
            include_stack: Vec::new(),
        }
    }

    pub fn secrets(&self) -> &SecretRegistry {
        &self.secrets
    }

    /// Reads `path`, feeds its contents to the Construction Pass, and returns
    /// the annotated root with any top-level `substitutions` mapping
    /// stripped (it was already consumed by `load_vars`, if the caller used
    /// it). Resets the secret registry and document cache when requested.
    pub fn load(&mut self, path: &Path, clear_secrets: bool, vars: Environment) -> Result<AnnotatedValue> {
        if clear_secrets {
            self.secrets.clear();
            self.doc_cache.clear();
        }
        self.include_stack.clear();
        tracing::debug!(path = %path.display(), clear_secrets, "loading document");
        let mut value = self.load_internal(path, vars, false)?;
        strip_substitutions(&mut value);
        Ok(value)
    }

    /// The same entry point operating on an in-memory string instead of a
    /// path. `origin_label` is used only for error reporting; relative
    /// `!include` resolution uses `base_dir` instead of a file's parent
    /// directory.
    pub fn load_string(
        &mut self,
        content: &str,
        origin_label: &str,
        base_dir: &Path,
        clear_secrets: bool,
        vars: Environment,
    ) -> Result<AnnotatedValue> {
        if clear_secrets {
            self.secrets.clear();
            self.doc_cache.clear();
        }
        self.include_stack.clear();
        tracing::debug!(origin_label, clear_secrets, "loading in-memory document");
        let file = Some(origin::file_arc(Path::new(origin_label)));
        let mut value =
            self.construct_document(content, file, base_dir.to_path_buf(), vars, false)?;
        strip_substitutions(&mut value);
        Ok(value)
    }

    /// Preloads `path` in expansion-disabled mode, extracts its top-level
    /// `substitutions` mapping, merges command-line `overrides` over it
    /// (each override parsed as a tiny YAML document), then evaluates each
    /// substitution in declaration order so later entries may reference
    /// earlier ones. The result is the initial environment fed to `load`.
    pub fn load_vars(
        &mut self,
        path: &Path,
        overrides: &[(String, String)],
    ) -> Result<Environment> {
        self.include_stack.clear();
        let raw_root = self.load_internal(path, Environment::new(), true)?;

        let mut combined: IndexMap<String, AnnotatedValue> = match raw_root.as_mapping() {
            Some(map) => match map.get("substitutions") {
                Some(v) => match &v.kind {
                    ValueKind::Mapping(m) => m.clone(),
                    ValueKind::Null => IndexMap::new(),
                    _ => {
                        return Err(Error::type_error(
                            "substitutions must be a mapping",
                            Some(v.origin.clone()),
                        ))
                    }
                },
                None => IndexMap::new(),
            },
            None => IndexMap::new(),
        };

        for (key, raw_text) in overrides {
            let label = format!("command line variable '{key}'");
            let parsed = self.load_string(raw_text, &label, Path::new("."), false, Environment::new())?;
            combined.insert(key.clone(), parsed);
        }

        let mut env = Environment::new();
        for (key, value) in combined {
            let resolved = match &value.kind {
                ValueKind::String(s) => {
                    let expanded = expander::expand(s, &env)
                        .map_err(|e| Error::from_expand(e, Some(value.origin.clone())))?;
                    AnnotatedValue::string(expanded, value.origin.clone())
                }
                _ => value,
            };
            env.insert(key, resolved);
        }
        Ok(env)
    }

    /// Serializes `value` to YAML text, redacting any scalar registered in
    /// this loader's secret registry.
    pub fn dump(&self, value: &AnnotatedValue) -> String {
        crate::emit::dump(value, &self.secrets)
    }

    /// Loads `path`, pushing it onto the include stack for the duration of
    /// the recursive construction so that a cyclic `!include` is reported
    /// instead of recursing without bound. Used both by the public entry
    /// points and by every directive that recurses through the loader.
    pub(crate) fn load_internal(
        &mut self,
        path: &Path,
        vars: Environment,
        disable_str_expansion: bool,
    ) -> Result<AnnotatedValue> {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if self.include_stack.contains(&key) {
            return Err(Error::Cycle {
                path: key.display().to_string(),
                origin: None,
            });
        }
        self.include_stack.push(key.clone());
        tracing::trace!(path = %key.display(), "push include stack");
        let result = self.load_internal_inner(path, vars, disable_str_expansion);
        self.include_stack.pop();
        tracing::trace!(path = %key.display(), "pop include stack");
        result
    }

    fn load_internal_inner(
        &mut self,
        path: &Path,
        vars: Environment,
        disable_str_expansion: bool,
    ) -> Result<AnnotatedValue> {
        let content = self.file_reader.read(path)?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        let file = Some(origin::file_arc(path));
        self.construct_document(&content, file, dir, vars, disable_str_expansion)
    }

    fn construct_document(
        &mut self,
        content: &str,
        file: Option<Arc<Path>>,
        current_dir: PathBuf,
        vars: Environment,
        disable_str_expansion: bool,
    ) -> Result<AnnotatedValue> {
        let root = crate::raw::parse_document(content, file.clone())?;
        let mut ctor = Constructor::new(self, vars, current_dir, file);
        ctor.disable_str_expansion = disable_str_expansion;
        // `construct` leaves a top-level `SpreadSequence` (a stray or
        // top-level `!for`) unflattened, since flattening is the enclosing
        // sequence's job; degrade it here, at the public boundary, so it
        // never escapes this module.
        Ok(ctor.construct(&root)?.escape_spread())
    }

    /// Loads `secrets.yaml` from `dir`, sharing one parse across multiple
    /// `!secret` lookups within the same load via the document cache.
    pub(crate) fn load_secrets_file(
        &mut self,
        dir: &Path,
        env: Environment,
    ) -> Result<AnnotatedValue> {
        let path = dir.join(SECRETS_FILENAME);
        let key = path.canonicalize().unwrap_or_else(|_| path.clone());
        if let Some(cached) = self.doc_cache.get(&key) {
            return Ok(cached.clone());
        }
        let value = self.load_internal(&path, env, false)?;
        self.doc_cache.insert(key, value.clone());
        Ok(value)
    }
}

fn strip_substitutions(value: &mut AnnotatedValue) {
    if let ValueKind::Mapping(map) = &mut value.kind {
        map.shift_remove("substitutions");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Initializes the `tracing` subscriber once per test binary so that
    /// `--nocapture` runs show the debug/trace-level logging emitted around
    /// loads, directive dispatch, and include-stack pushes/pops.
    fn init_tracing() {
        use tracing_subscriber::EnvFilter;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// An in-memory filesystem stand-in, so include/secret tests don't touch
    /// the real filesystem.
    #[derive(Default)]
    struct MemoryFileReader {
        files: Mutex<HashMap<PathBuf, String>>,
    }

    impl MemoryFileReader {
        fn new(files: &[(&str, &str)]) -> Self {
            let mut map = HashMap::new();
            for (path, content) in files {
                map.insert(PathBuf::from(path), content.to_string());
            }
            MemoryFileReader {
                files: Mutex::new(map),
            }
        }
    }

    impl FileReader for MemoryFileReader {
        fn read(&self, path: &Path) -> Result<String> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| Error::io(format!("{}: not found", path.display()), None))
        }
    }

    fn loader_with(files: &[(&str, &str)]) -> Loader {
        Loader::with_collaborators(
            Box::new(MemoryFileReader::new(files)),
            Box::new(UnsupportedGitFetcher),
        )
    }

    #[test]
    fn env_fallback_scenario() {
        init_tracing();
        std::env::remove_var("ESP_YAML_TEST_ABSENT");
        let mut loader = loader_with(&[("/main.yaml", "v: !env_var ESP_YAML_TEST_ABSENT hello world\n")]);
        let value = loader.load(Path::new("/main.yaml"), true, Environment::new()).unwrap();
        let map = value.as_mapping().unwrap();
        assert_eq!(map.get("v").unwrap().as_str().unwrap(), "hello world");
    }

    #[test]
    fn include_with_vars_scenario() {
        let mut loader = loader_with(&[
            ("/main.yaml", "v: !include {file: child.yaml, vars: {x: 2}}\n"),
            ("/child.yaml", "value: '{{ x }}'\n"),
        ]);
        let value = loader.load(Path::new("/main.yaml"), true, Environment::new()).unwrap();
        let v = value.as_mapping().unwrap().get("v").unwrap();
        let child = v.as_mapping().unwrap();
        assert_eq!(child.get("value").unwrap().as_str().unwrap(), "2");
    }

    #[test]
    fn for_loop_scenario() {
        let mut loader = loader_with(&[(
            "/main.yaml",
            "pins: [!for {items: [1, 2, 3], var: i, repeat: {gpio: '{{ i }}'}}]\n",
        )]);
        let value = loader.load(Path::new("/main.yaml"), true, Environment::new()).unwrap();
        let pins = value.as_mapping().unwrap().get("pins").unwrap().as_sequence().unwrap();
        assert_eq!(pins.len(), 3);
        for (i, pin) in pins.iter().enumerate() {
            let gpio = pin.as_mapping().unwrap().get("gpio").unwrap().as_str().unwrap();
            assert_eq!(gpio, (i + 1).to_string());
        }
    }

    #[test]
    fn for_flattens_exactly_one_level_among_sibling_items() {
        let mut loader = loader_with(&[(
            "/main.yaml",
            "v: [1, !for {items: [2, 3], repeat: '{{ item }}'}, 4]\n",
        )]);
        let value = loader.load(Path::new("/main.yaml"), true, Environment::new()).unwrap();
        let items = value.as_mapping().unwrap().get("v").unwrap().as_sequence().unwrap();
        let texts: Vec<String> = items.iter().map(|v| v.scalar_text().unwrap()).collect();
        assert_eq!(texts, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn if_else_scenario() {
        let mut loader =
            loader_with(&[("/main.yaml", "mode: !if {condition: true, then: fast, else: slow}\n")]);
        let value = loader.load(Path::new("/main.yaml"), true, Environment::new()).unwrap();
        assert_eq!(
            value.as_mapping().unwrap().get("mode").unwrap().as_str().unwrap(),
            "fast"
        );
    }

    #[test]
    fn duplicate_key_is_an_error() {
        let mut loader = loader_with(&[("/main.yaml", "k: 1\nk: 2\n")]);
        let err = loader
            .load(Path::new("/main.yaml"), true, Environment::new())
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { .. }));
    }

    #[test]
    fn secret_directive_registers_for_redaction() {
        let mut loader = loader_with(&[
            ("/main.yaml", "password: !secret wifi_password\n"),
            ("/secrets.yaml", "wifi_password: hunter2\n"),
        ]);
        let value = loader.load(Path::new("/main.yaml"), true, Environment::new()).unwrap();
        assert_eq!(
            value.as_mapping().unwrap().get("password").unwrap().as_str().unwrap(),
            "hunter2"
        );
        let dumped = loader.dump(&value);
        assert!(dumped.contains("!secret wifi_password"));
        assert!(!dumped.contains("hunter2"));
    }

    #[test]
    fn missing_secret_is_a_name_lookup_error() {
        let mut loader = loader_with(&[
            ("/main.yaml", "password: !secret missing\n"),
            ("/secrets.yaml", "wifi_password: hunter2\n"),
        ]);
        let err = loader
            .load(Path::new("/main.yaml"), true, Environment::new())
            .unwrap_err();
        assert!(matches!(err, Error::NameLookup { .. }));
    }

    #[test]
    fn include_cycle_is_detected() {
        let mut loader = loader_with(&[
            ("/a.yaml", "v: !include b.yaml\n"),
            ("/b.yaml", "v: !include a.yaml\n"),
        ]);
        let err = loader
            .load(Path::new("/a.yaml"), true, Environment::new())
            .unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }));
    }

    #[test]
    fn substitutions_preload_resolves_in_order() {
        let mut loader = loader_with(&[(
            "/main.yaml",
            "substitutions:\n  host: example.com\n  url: 'https://{{ host }}/api'\nvalue: '{{ url }}'\n",
        )]);
        let env = loader.load_vars(Path::new("/main.yaml"), &[]).unwrap();
        assert_eq!(env.get("url").unwrap().as_str().unwrap(), "https://example.com/api");

        let value = loader.load(Path::new("/main.yaml"), true, env).unwrap();
        assert_eq!(
            value.as_mapping().unwrap().get("value").unwrap().as_str().unwrap(),
            "https://example.com/api"
        );
        assert!(!value.as_mapping().unwrap().contains_key("substitutions"));
    }

    #[test]
    fn substitutions_override_from_command_line() {
        let mut loader = loader_with(&[(
            "/main.yaml",
            "substitutions:\n  host: example.com\nvalue: '{{ host }}'\n",
        )]);
        let overrides = vec![("host".to_string(), "override.example".to_string())];
        let env = loader.load_vars(Path::new("/main.yaml"), &overrides).unwrap();
        assert_eq!(env.get("host").unwrap().as_str().unwrap(), "override.example");
    }

    #[test]
    fn literal_block_is_byte_identical() {
        let mut loader =
            loader_with(&[("/main.yaml", "v: !literal '{{ not expanded }}'\n")]);
        let value = loader.load(Path::new("/main.yaml"), true, Environment::new()).unwrap();
        assert_eq!(
            value.as_mapping().unwrap().get("v").unwrap().as_str().unwrap(),
            "{{ not expanded }}"
        );
    }
}
