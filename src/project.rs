//! Project loading and inspection.
//!
//! [`load_project_with`] is the single core operation: it assembles the
//! global properties, detects the file format and asks a [`BuildEngine`] to
//! evaluate the project. The other `load_project*` functions translate a
//! particular override source into an override map and use the built-in
//! [`XmlBuildEngine`].

use std::collections::HashMap;
use std::path::Path;

use crate::config::SwitcherConfiguration;
use crate::engine::{BuildEngine, EvaluatedProject, ProjectCollection, XmlBuildEngine};
use crate::error::{Error, Result};
use crate::format;
use crate::properties::{self, GlobalProperties};

// ═══════════════════════════════════════════════════════════════════════════════
//  ProjectInformation
// ═══════════════════════════════════════════════════════════════════════════════

/// A loaded project together with the collection that owns its evaluation.
///
/// Dropping the value releases the collection and everything the engine
/// cached for it.
#[derive(Debug)]
pub struct ProjectInformation {
    collection: Box<dyn ProjectCollection>,
    project: Box<dyn EvaluatedProject>,
    is_legacy_format: bool,
}

impl ProjectInformation {
    pub fn project(&self) -> &dyn EvaluatedProject {
        self.project.as_ref()
    }

    pub fn collection(&self) -> &dyn ProjectCollection {
        self.collection.as_ref()
    }

    /// `true` when the project file has no `Sdk` attribute on its root.
    pub fn is_legacy_format(&self) -> bool {
        self.is_legacy_format
    }

    /// Shorthand for [`generates_package`] on the loaded project.
    pub fn generates_package(&self) -> bool {
        generates_package(self.project())
    }

    /// Shorthand for [`has_version`] on the loaded project.
    pub fn has_version(&self) -> Result<bool> {
        has_version(self.project())
    }

    /// Split into the owning collection and the evaluated project.
    pub fn into_parts(self) -> (Box<dyn ProjectCollection>, Box<dyn EvaluatedProject>) {
        (self.collection, self.project)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Loading
// ═══════════════════════════════════════════════════════════════════════════════

/// Load `path` with `engine`.
///
/// `overrides` are merged under `SolutionDir`; `None` falls back to the
/// `-property:` switches of the current process. Any failure, including a
/// missing or malformed file, is reported as [`Error::ProjectLoad`] for
/// `path` with the underlying error as its source.
pub fn load_project_with(
    engine: &dyn BuildEngine,
    path: impl AsRef<Path>,
    overrides: Option<&HashMap<String, String>>,
) -> Result<ProjectInformation> {
    let path = path.as_ref();

    let process_overrides;
    let overrides = match overrides {
        Some(o) => o,
        None => {
            process_overrides = properties::from_current_process();
            &process_overrides
        }
    };

    let globals = GlobalProperties::assemble(path, Some(overrides));

    let load = || -> Result<ProjectInformation> {
        let is_legacy_format = format::is_legacy_format(path)?;
        let mut collection = engine.create_collection(globals);
        let project = collection.load_project(path)?;
        Ok(ProjectInformation { collection, project, is_legacy_format })
    };

    let info = load().map_err(|source| {
        tracing::debug!(path = %path.display(), error = %source, "project load failed");
        Error::ProjectLoad {
            path: path.to_path_buf(),
            source: Box::new(source),
        }
    })?;

    tracing::debug!(
        path = %info.project.full_path().display(),
        legacy = info.is_legacy_format,
        "loaded project"
    );
    Ok(info)
}

/// Load `path` with the built-in engine, taking extra global properties from
/// the current process's `-property:` switches.
pub fn load_project(path: impl AsRef<Path>) -> Result<ProjectInformation> {
    load_project_with(&XmlBuildEngine, path, None)
}

/// Load `path` with an explicit override map.
pub fn load_project_with_properties(
    path: impl AsRef<Path>,
    overrides: &HashMap<String, String>,
) -> Result<ProjectInformation> {
    load_project_with(&XmlBuildEngine, path, Some(overrides))
}

/// Load `path` with the `globals` of a switcher configuration.
pub fn load_project_with_configuration(
    path: impl AsRef<Path>,
    configuration: &SwitcherConfiguration,
) -> Result<ProjectInformation> {
    load_project_with(&XmlBuildEngine, path, Some(&configuration.globals))
}

/// Load `path` with the `-property:` switches found in `args`.
pub fn load_project_with_args<I, S>(path: impl AsRef<Path>, args: I) -> Result<ProjectInformation>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let overrides = properties::parse_args(args);
    load_project_with(&XmlBuildEngine, path, Some(&overrides))
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Queries
// ═══════════════════════════════════════════════════════════════════════════════

/// Whether the evaluated `GeneratePackageOnBuild` is `true` (any case).
pub fn generates_package(project: &dyn EvaluatedProject) -> bool {
    project
        .get_property("GeneratePackageOnBuild")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Whether the raw project file contains a literal `<Version>` element.
///
/// This is a plain text search over the file on disk: inherited or
/// defaulted versions do not count, while a `<Version>` inside a comment
/// does.
pub fn has_version(project: &dyn EvaluatedProject) -> Result<bool> {
    let path = project.full_path();
    let data = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(data.contains("<Version>"))
}

/// Whether `path` names a `.csproj` or `.vbproj` file (case-insensitive).
pub fn is_supported_project(path: impl AsRef<Path>) -> bool {
    let lower = path.as_ref().to_string_lossy().to_lowercase();
    lower.ends_with(".csproj") || lower.ends_with(".vbproj")
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use crate::properties::SOLUTION_DIR;

    /// Engine that records the globals it was given and serves canned
    /// properties without reading the project.
    #[derive(Debug, Default)]
    struct FakeEngine {
        properties: HashMap<String, String>,
        reject: bool,
        seen: Arc<Mutex<Vec<GlobalProperties>>>,
    }

    #[derive(Debug)]
    struct FakeCollection {
        globals: GlobalProperties,
        properties: HashMap<String, String>,
        reject: bool,
        loaded: Vec<PathBuf>,
    }

    #[derive(Debug)]
    struct FakeProject {
        path: PathBuf,
        properties: HashMap<String, String>,
    }

    impl BuildEngine for FakeEngine {
        fn create_collection(&self, globals: GlobalProperties) -> Box<dyn ProjectCollection> {
            self.seen.lock().unwrap().push(globals.clone());
            Box::new(FakeCollection {
                globals,
                properties: self.properties.clone(),
                reject: self.reject,
                loaded: Vec::new(),
            })
        }
    }

    impl ProjectCollection for FakeCollection {
        fn global_properties(&self) -> &GlobalProperties {
            &self.globals
        }

        fn load_project(&mut self, path: &Path) -> Result<Box<dyn EvaluatedProject>> {
            if self.reject {
                return Err(Error::invalid_project(path, "rejected"));
            }
            self.loaded.push(path.to_path_buf());
            Ok(Box::new(FakeProject {
                path: path.to_path_buf(),
                properties: self.properties.clone(),
            }))
        }

        fn loaded_projects(&self) -> &[PathBuf] {
            &self.loaded
        }
    }

    impl EvaluatedProject for FakeProject {
        fn full_path(&self) -> &Path {
            &self.path
        }

        fn get_property(&self, name: &str) -> Option<&str> {
            self.properties.get(name).map(String::as_str)
        }

        fn property_names(&self) -> Vec<&str> {
            self.properties.keys().map(String::as_str).collect()
        }
    }

    fn fake_project(properties: &[(&str, &str)], path: &Path) -> FakeProject {
        FakeProject {
            path: path.to_path_buf(),
            properties: properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn write_project(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("App.csproj");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    // ── is_supported_project ─────────────────────────────────────────────

    #[test]
    fn supported_extensions_ignore_case() {
        assert!(is_supported_project("Foo.csproj"));
        assert!(is_supported_project("Foo.CSPROJ"));
        assert!(is_supported_project("/src/Bar.VbProj"));
        assert!(!is_supported_project("Foo.fsproj"));
        assert!(!is_supported_project("Foo.csproj.user"));
        assert!(!is_supported_project("csproj"));
    }

    // ── generates_package ────────────────────────────────────────────────

    #[test]
    fn generates_package_reads_evaluated_property() {
        let path = Path::new("App.csproj");
        assert!(generates_package(&fake_project(&[("GeneratePackageOnBuild", "True")], path)));
        assert!(!generates_package(&fake_project(&[("GeneratePackageOnBuild", "false")], path)));
        assert!(!generates_package(&fake_project(&[("GeneratePackageOnBuild", "yes")], path)));
        assert!(!generates_package(&fake_project(&[], path)));
    }

    // ── has_version ──────────────────────────────────────────────────────

    #[test]
    fn has_version_is_a_text_search() {
        let (_dir, path) = write_project(
            "<Project>\n  <!-- <Version>1.0</Version> -->\n</Project>",
        );
        // Evaluated properties are irrelevant; only the raw text counts.
        assert!(has_version(&fake_project(&[], &path)).unwrap());

        let (_dir, path) = write_project("<Project><VersionPrefix>1.0</VersionPrefix></Project>");
        assert!(!has_version(&fake_project(&[("Version", "1.0.0")], &path)).unwrap());
    }

    #[test]
    fn has_version_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Gone.csproj");
        let err = has_version(&fake_project(&[], &path)).unwrap_err();
        assert!(matches!(err, Error::Io { .. }), "got {err:?}");
    }

    // ── load_project_with ────────────────────────────────────────────────

    #[test]
    fn load_without_overrides_reads_process_switches() {
        let (_dir, path) = write_project("<Project />");
        let engine = FakeEngine::default();

        let info = load_project_with(&engine, &path, None).unwrap();

        assert!(info.is_legacy_format());
        let seen = engine.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].get(SOLUTION_DIR),
            Some(properties::solution_dir(&path).as_str())
        );
        let process = properties::from_current_process();
        assert_eq!(seen[0], GlobalProperties::assemble(&path, Some(&process)));
        assert_eq!(seen[0].len(), 1 + process.len());
    }

    #[test]
    fn load_passes_assembled_globals_to_engine() {
        let (_dir, path) = write_project(r#"<Project Sdk="Microsoft.NET.Sdk" />"#);
        let engine = FakeEngine {
            properties: HashMap::from([("GeneratePackageOnBuild".into(), "true".into())]),
            ..Default::default()
        };
        let overrides = HashMap::from([
            ("Configuration".to_string(), "Release".to_string()),
            (SOLUTION_DIR.to_string(), "/ignored/".to_string()),
        ]);

        let info = load_project_with(&engine, &path, Some(&overrides)).unwrap();

        assert!(!info.is_legacy_format());
        assert!(info.generates_package());
        assert_eq!(info.collection().loaded_projects(), &[path.clone()]);

        let seen = engine.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get("Configuration"), Some("Release"));
        assert_eq!(
            seen[0].get(SOLUTION_DIR),
            Some(properties::solution_dir(&path).as_str())
        );
    }

    #[test]
    fn each_load_gets_a_fresh_collection() {
        let (_dir, path) = write_project("<Project />");
        let engine = FakeEngine::default();
        let empty = HashMap::new();
        let first = load_project_with(&engine, &path, Some(&empty)).unwrap();
        let second = load_project_with(&engine, &path, Some(&empty)).unwrap();
        assert!(first.is_legacy_format());
        assert_eq!(first.collection().loaded_projects().len(), 1);
        assert_eq!(second.collection().loaded_projects().len(), 1);
        assert_eq!(engine.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn engine_rejection_becomes_project_load_error() {
        let (_dir, path) = write_project("<Project />");
        let engine = FakeEngine { reject: true, ..Default::default() };
        let err = load_project_with(&engine, &path, Some(&HashMap::new())).unwrap_err();
        match err {
            Error::ProjectLoad { path: p, source } => {
                assert_eq!(p, path);
                assert!(matches!(*source, Error::InvalidProject { .. }));
            }
            other => panic!("expected ProjectLoad, got {other:?}"),
        }
    }

    #[test]
    fn malformed_xml_never_reaches_engine() {
        let (_dir, path) = write_project("<Project");
        let engine = FakeEngine::default();
        let err = load_project_with(&engine, &path, Some(&HashMap::new())).unwrap_err();
        assert!(matches!(&err, Error::ProjectLoad { source, .. } if matches!(**source, Error::Xml { .. })));
        assert_eq!(err.path(), path.as_path());
        assert!(engine.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn into_parts_hands_back_both_handles() {
        let (_dir, path) = write_project("<Project />");
        let info = load_project_with(&FakeEngine::default(), &path, Some(&HashMap::new())).unwrap();
        let (collection, project) = info.into_parts();
        assert_eq!(project.full_path(), path.as_path());
        assert!(collection.global_properties().contains_key(SOLUTION_DIR));
    }
}
