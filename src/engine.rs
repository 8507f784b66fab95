//! Build-evaluation engine.
//!
//! The loader only needs three things from an engine: a *collection* seeded
//! with global properties, a way to load and evaluate a project file inside
//! that collection, and read access to the evaluated properties. Those are
//! the [`BuildEngine`], [`ProjectCollection`] and [`EvaluatedProject`]
//! traits.
//!
//! [`XmlBuildEngine`] is the built-in implementation. It evaluates the
//! property pass of MSBuild on top of `roxmltree`:
//!
//! - reserved `MSBuild*` properties and global properties are seeded first
//!   and cannot be overridden by the project,
//! - SDK-style projects pick up the nearest `Directory.Build.props`,
//! - `<PropertyGroup>`s, property elements, `<Import>`s and
//!   `<ImportGroup>`s are processed in document order with their
//!   `Condition`s honoured,
//! - `<Choose>` takes its first `<When>` whose condition holds, or else its
//!   `<Otherwise>`,
//! - `$(Name)` references expand against the properties defined so far.
//!
//! A condition the grammar cannot read (property functions nested in
//! unusual ways, item transforms) is logged and treated as false.
//! Property functions such as `$([MSBuild]::VersionGreaterThan(...))` are
//! not evaluated and expand to the empty string.
//!
//! SDK imports, items and targets are not evaluated.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use crate::condition::{self, PropertyLookup};
use crate::error::{Error, Result};
use crate::properties::GlobalProperties;

// ═══════════════════════════════════════════════════════════════════════════════
//  Engine traits
// ═══════════════════════════════════════════════════════════════════════════════

/// Factory for project collections.
pub trait BuildEngine {
    /// Create a fresh collection scoped to `globals`.
    fn create_collection(&self, globals: GlobalProperties) -> Box<dyn ProjectCollection>;
}

/// A set of projects evaluated under the same global properties.
///
/// Dropping the collection releases everything it cached.
pub trait ProjectCollection: fmt::Debug + Send {
    fn global_properties(&self) -> &GlobalProperties;

    /// Parse and evaluate the project at `path`.
    ///
    /// Fails with [`Error::InvalidProject`] when the file is not a
    /// recognisable project.
    fn load_project(&mut self, path: &Path) -> Result<Box<dyn EvaluatedProject>>;

    /// Full paths of the projects loaded through this collection.
    fn loaded_projects(&self) -> &[PathBuf];
}

/// Read access to an evaluated project.
pub trait EvaluatedProject: fmt::Debug + Send {
    /// Absolute path of the project file.
    fn full_path(&self) -> &Path;

    /// Evaluated value of a property (case-insensitive name).
    fn get_property(&self, name: &str) -> Option<&str>;

    /// Names of all evaluated properties.
    fn property_names(&self) -> Vec<&str>;

    /// Files imported during evaluation, in import order.
    fn imports(&self) -> &[PathBuf] {
        &[]
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Property table
// ═══════════════════════════════════════════════════════════════════════════════

/// How a property got its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyOrigin {
    /// Set by the engine (`MSBuildProjectDirectory`, …).
    Reserved,
    /// Passed in as a global property.
    Global,
    /// Defined in the project or one of its imports.
    Project,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: String,
    pub origin: PropertyOrigin,
}

/// Properties keyed case-insensitively, keeping the first spelling seen.
#[derive(Debug, Clone, Default)]
pub struct PropertyTable {
    entries: HashMap<String, Property>,
}

impl PropertyTable {
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.entries.get(&name.to_ascii_lowercase())
    }

    /// Set a project property. Reserved and global properties are
    /// read-only; returns `false` when the write was ignored.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        let key = name.to_ascii_lowercase();
        match self.entries.get_mut(&key) {
            Some(existing) if existing.origin != PropertyOrigin::Project => false,
            Some(existing) => {
                existing.value = value.into();
                true
            }
            None => {
                self.insert(key, name, value, PropertyOrigin::Project);
                true
            }
        }
    }

    fn set_reserved(&mut self, name: &str, value: impl Into<String>) {
        self.insert(name.to_ascii_lowercase(), name, value, PropertyOrigin::Reserved);
    }

    fn set_global(&mut self, name: &str, value: impl Into<String>) {
        let key = name.to_ascii_lowercase();
        match self.entries.get(&key).map(|p| p.origin) {
            // Reserved names cannot be overridden, not even globally.
            Some(PropertyOrigin::Reserved) => {
                tracing::warn!(%name, "ignoring global property that shadows a reserved property");
                return;
            }
            // First global of a name wins.
            Some(PropertyOrigin::Global) => {
                tracing::debug!(%name, "global property already set, keeping first value");
                return;
            }
            _ => {}
        }
        self.insert(key, name, value, PropertyOrigin::Global);
    }

    fn insert(&mut self, key: String, name: &str, value: impl Into<String>, origin: PropertyOrigin) {
        self.entries.insert(
            key,
            Property { name: name.to_string(), value: value.into(), origin },
        );
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PropertyLookup for PropertyTable {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).map(|p| p.value.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  XmlBuildEngine
// ═══════════════════════════════════════════════════════════════════════════════

/// Property-pass evaluator for `.csproj` / `.vbproj` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlBuildEngine;

impl BuildEngine for XmlBuildEngine {
    fn create_collection(&self, globals: GlobalProperties) -> Box<dyn ProjectCollection> {
        Box::new(XmlProjectCollection::new(globals))
    }
}

/// Collection handed out by [`XmlBuildEngine`].
#[derive(Debug, Clone, Default)]
pub struct XmlProjectCollection {
    globals: GlobalProperties,
    loaded: Vec<PathBuf>,
}

impl XmlProjectCollection {
    pub fn new(globals: GlobalProperties) -> Self {
        Self { globals, loaded: Vec::new() }
    }

    /// Evaluate `path` without boxing the result.
    pub fn evaluate(&mut self, path: &Path) -> Result<XmlProject> {
        let full_path =
            std::path::absolute(path).map_err(|e| Error::invalid_project(path, e.to_string()))?;

        let mut evaluator = Evaluator::new(&full_path, &self.globals);
        evaluator.run()?;

        let Evaluator { properties, imports, .. } = evaluator;

        tracing::debug!(
            path = %full_path.display(),
            properties = properties.len(),
            imports = imports.len(),
            "evaluated project"
        );

        self.loaded.push(full_path.clone());
        Ok(XmlProject { full_path, properties, imports })
    }
}

impl ProjectCollection for XmlProjectCollection {
    fn global_properties(&self) -> &GlobalProperties {
        &self.globals
    }

    fn load_project(&mut self, path: &Path) -> Result<Box<dyn EvaluatedProject>> {
        Ok(Box::new(self.evaluate(path)?))
    }

    fn loaded_projects(&self) -> &[PathBuf] {
        &self.loaded
    }
}

/// A project evaluated by [`XmlBuildEngine`].
#[derive(Debug, Clone)]
pub struct XmlProject {
    full_path: PathBuf,
    properties: PropertyTable,
    imports: Vec<PathBuf>,
}

impl XmlProject {
    pub fn properties(&self) -> &PropertyTable {
        &self.properties
    }

    /// Full property record, including where the value came from.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }
}

impl EvaluatedProject for XmlProject {
    fn full_path(&self) -> &Path {
        &self.full_path
    }

    fn get_property(&self, name: &str) -> Option<&str> {
        self.properties.lookup(name)
    }

    fn property_names(&self) -> Vec<&str> {
        self.properties.iter().map(|p| p.name.as_str()).collect()
    }

    fn imports(&self) -> &[PathBuf] {
        &self.imports
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Evaluation
// ═══════════════════════════════════════════════════════════════════════════════

const DIRECTORY_BUILD_PROPS: &str = "Directory.Build.props";

fn dir_with_separator(dir: &Path) -> String {
    let mut s = dir.to_string_lossy().into_owned();
    if !s.ends_with(MAIN_SEPARATOR) {
        s.push(MAIN_SEPARATOR);
    }
    s
}

/// Project files are authored with Windows separators.
fn native_path(raw: &str) -> PathBuf {
    if MAIN_SEPARATOR == '\\' {
        PathBuf::from(raw)
    } else {
        PathBuf::from(raw.replace('\\', "/"))
    }
}

struct Evaluator<'a> {
    project_path: &'a Path,
    properties: PropertyTable,
    imports: Vec<PathBuf>,
    /// Files on the current import chain, for cycle detection.
    stack: Vec<PathBuf>,
}

impl<'a> Evaluator<'a> {
    fn new(project_path: &'a Path, globals: &GlobalProperties) -> Self {
        let mut properties = PropertyTable::default();

        let dir = project_path.parent().unwrap_or_else(|| Path::new(""));
        let file_name = project_path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = project_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = project_path
            .extension()
            .map(|s| format!(".{}", s.to_string_lossy()))
            .unwrap_or_default();

        properties.set_reserved("MSBuildProjectFullPath", project_path.to_string_lossy());
        properties.set_reserved("MSBuildProjectDirectory", dir.to_string_lossy());
        properties.set_reserved("MSBuildProjectFile", file_name);
        properties.set_reserved("MSBuildProjectName", stem);
        properties.set_reserved("MSBuildProjectExtension", extension);

        for (name, value) in globals.iter() {
            properties.set_global(name, value);
        }

        Self {
            project_path,
            properties,
            imports: Vec::new(),
            stack: Vec::new(),
        }
    }

    fn run(&mut self) -> Result<()> {
        let source = std::fs::read_to_string(self.project_path)
            .map_err(|e| Error::invalid_project(self.project_path, e.to_string()))?;
        let doc = roxmltree::Document::parse(&source)
            .map_err(|e| Error::invalid_project(self.project_path, e.to_string()))?;
        let root = doc.root_element();
        check_root(self.project_path, &root)?;

        if root.has_attribute("Sdk") && self.directory_build_props_enabled() {
            if let Some(props) = self.find_directory_build_props() {
                tracing::debug!(path = %props.display(), "importing {DIRECTORY_BUILD_PROPS}");
                self.import_file(self.project_path, &props)?;
            }
        }

        self.evaluate_body(self.project_path, root)
    }

    fn directory_build_props_enabled(&self) -> bool {
        !self
            .properties
            .lookup("ImportDirectoryBuildProps")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("false"))
    }

    /// Nearest `Directory.Build.props` in the project directory or above.
    fn find_directory_build_props(&self) -> Option<PathBuf> {
        self.project_path
            .parent()?
            .ancestors()
            .map(|dir| dir.join(DIRECTORY_BUILD_PROPS))
            .find(|candidate| candidate.is_file())
    }

    /// Evaluate the children of a `<Project>` element declared in `file`.
    fn evaluate_body(&mut self, file: &Path, root: roxmltree::Node) -> Result<()> {
        self.stack.push(file.to_path_buf());
        self.set_this_file(file);

        let result = root
            .children()
            .filter(|n| n.is_element())
            .try_for_each(|child| match child.tag_name().name() {
                "PropertyGroup" => self.evaluate_property_group(file, child),
                "Import" => self.evaluate_import(file, child),
                "ImportGroup" => self.evaluate_import_group(file, child),
                "Choose" => self.evaluate_choose(file, child),
                _ => Ok(()),
            });

        self.stack.pop();
        if let Some(parent) = self.stack.last().cloned() {
            self.set_this_file(&parent);
        }
        result
    }

    fn set_this_file(&mut self, file: &Path) {
        let dir = file.parent().unwrap_or_else(|| Path::new(""));
        self.properties.set_reserved("MSBuildThisFileFullPath", file.to_string_lossy());
        self.properties.set_reserved("MSBuildThisFileDirectory", dir_with_separator(dir));
        self.properties.set_reserved(
            "MSBuildThisFile",
            file.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default(),
        );
    }

    fn condition_holds(&self, file: &Path, node: roxmltree::Node) -> bool {
        let Some(raw) = node.attribute("Condition") else {
            return true;
        };
        if raw.trim().is_empty() {
            return true;
        }
        match condition::parse_condition(raw) {
            Ok(expr) => condition::evaluate(&expr, &self.properties, file.parent()),
            Err(message) => {
                tracing::warn!(file = %file.display(), %message, "treating unreadable condition as false");
                false
            }
        }
    }

    fn evaluate_property_group(&mut self, file: &Path, group: roxmltree::Node) -> Result<()> {
        if !self.condition_holds(file, group) {
            return Ok(());
        }

        for element in group.children().filter(|n| n.is_element()) {
            if !self.condition_holds(file, element) {
                continue;
            }
            let name = element.tag_name().name();
            let raw = element.text().unwrap_or("");
            let value = condition::expand(raw, &self.properties);
            if !self.properties.set(name, value) {
                tracing::debug!(%name, "project cannot override read-only property");
            }
        }

        Ok(())
    }

    /// `<Choose>`: the first `<When>` whose condition holds, else `<Otherwise>`.
    fn evaluate_choose(&mut self, file: &Path, choose: roxmltree::Node) -> Result<()> {
        let branches = choose.children().filter(|n| n.is_element());
        let mut otherwise = None;
        for branch in branches {
            match branch.tag_name().name() {
                "When" if self.condition_holds(file, branch) => {
                    return self.evaluate_branch(file, branch);
                }
                "Otherwise" => otherwise = Some(branch),
                _ => {}
            }
        }
        match otherwise {
            Some(branch) => self.evaluate_branch(file, branch),
            None => Ok(()),
        }
    }

    fn evaluate_branch(&mut self, file: &Path, branch: roxmltree::Node) -> Result<()> {
        branch
            .children()
            .filter(|n| n.is_element())
            .try_for_each(|child| match child.tag_name().name() {
                "PropertyGroup" => self.evaluate_property_group(file, child),
                "Choose" => self.evaluate_choose(file, child),
                _ => Ok(()),
            })
    }

    fn evaluate_import_group(&mut self, file: &Path, group: roxmltree::Node) -> Result<()> {
        if !self.condition_holds(file, group) {
            return Ok(());
        }
        group
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "Import")
            .try_for_each(|import| self.evaluate_import(file, import))
    }

    fn evaluate_import(&mut self, file: &Path, import: roxmltree::Node) -> Result<()> {
        if import.has_attribute("Sdk") {
            tracing::debug!(sdk = ?import.attribute("Sdk"), "SDK imports are not resolved");
            return Ok(());
        }
        let Some(raw) = import.attribute("Project") else {
            return Err(Error::invalid_project(file, "<Import> is missing the Project attribute"));
        };
        if !self.condition_holds(file, import) {
            return Ok(());
        }

        let expanded = condition::expand(raw, &self.properties);
        let target = native_path(expanded.trim());
        let target = match file.parent() {
            Some(dir) if target.is_relative() => dir.join(target),
            _ => target,
        };

        if !target.is_file() {
            tracing::warn!(import = %target.display(), from = %file.display(), "skipping missing import");
            return Ok(());
        }

        self.import_file(file, &target)
    }

    fn import_file(&mut self, from: &Path, target: &Path) -> Result<()> {
        let target = std::path::absolute(target).unwrap_or_else(|_| target.to_path_buf());
        if self.stack.contains(&target) {
            tracing::warn!(import = %target.display(), from = %from.display(), "skipping circular import");
            return Ok(());
        }

        let source = std::fs::read_to_string(&target)
            .map_err(|e| Error::invalid_project(&target, e.to_string()))?;
        let doc = roxmltree::Document::parse(&source)
            .map_err(|e| Error::invalid_project(&target, e.to_string()))?;
        let root = doc.root_element();
        check_root(&target, &root)?;

        self.imports.push(target.clone());
        self.evaluate_body(&target, root)
    }
}

fn check_root(path: &Path, root: &roxmltree::Node) -> Result<()> {
    let name = root.tag_name().name();
    if name != "Project" {
        return Err(Error::invalid_project(
            path,
            format!("root element is <{name}>, expected <Project>"),
        ));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
