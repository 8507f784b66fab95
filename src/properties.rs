//! Global property assembly.
//!
//! Global properties are engine-level inputs that apply to every property
//! and condition of a loaded project. Every load is seeded with
//! `SolutionDir` (the project's directory, with a trailing separator);
//! further properties come from caller overrides, a switcher configuration,
//! or `-property:Key=Value` switches on a command line.
//!
//! Merging is first-write-wins: an entry that is already present is never
//! replaced, so `SolutionDir` always survives an override of the same name.
//! Names compare ASCII-case-insensitively, as they do during evaluation.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, MAIN_SEPARATOR};

/// Name of the implicit global property pointing at the project directory.
pub const SOLUTION_DIR: &str = "SolutionDir";

/// Command-line switch carrying a `Key=Value` global property.
pub const PROPERTY_SWITCH: &str = "-property:";

/// Merged global properties handed to the build engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct GlobalProperties {
    map: BTreeMap<String, String>,
}

impl GlobalProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a map with `SolutionDir` computed from `project_path`.
    pub fn for_project(project_path: impl AsRef<Path>) -> Self {
        let mut props = Self::new();
        props.insert_if_absent(SOLUTION_DIR, solution_dir(project_path.as_ref()));
        props
    }

    /// `SolutionDir` plus `overrides`, with `SolutionDir` taking precedence.
    pub fn assemble(
        project_path: impl AsRef<Path>,
        overrides: Option<&HashMap<String, String>>,
    ) -> Self {
        let mut props = Self::for_project(project_path);
        if let Some(overrides) = overrides {
            props.merge(overrides.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        tracing::debug!(properties = ?props.map, "assembled global properties");
        props
    }

    /// Insert `key` unless a property of the same name (ignoring ASCII case)
    /// is already present. Returns whether the value was inserted.
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.contains_key(&key) {
            tracing::debug!(%key, "global property already set, keeping first value");
            return false;
        }
        self.map.insert(key, value.into());
        true
    }

    /// First-write-wins merge.
    pub fn merge<K, V>(&mut self, entries: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in entries {
            self.insert_if_absent(k, v);
        }
    }

    /// Value of `key`, ignoring ASCII case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map
            .get(key)
            .or_else(|| {
                self.map
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.keys().any(|k| k.eq_ignore_ascii_case(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Directory containing `project_path`, made absolute and terminated with a
/// path separator.
pub fn solution_dir(project_path: &Path) -> String {
    let absolute = std::path::absolute(project_path).unwrap_or_else(|_| project_path.to_path_buf());
    let mut dir = absolute
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !dir.ends_with(MAIN_SEPARATOR) {
        dir.push(MAIN_SEPARATOR);
    }
    dir
}

/// Collect `-property:Key=Value` switches from a full invocation string.
///
/// The line is split on single spaces, so quoted values or values
/// containing spaces are not supported. Tokens without `=` or with an
/// empty key are skipped. The first occurrence of a key wins.
///
/// # Example
/// ```
/// let props = csproj_rs::properties::parse_command_line(
///     "dnt switch-to-projects -property:Configuration=Release -property:Broken",
/// );
/// assert_eq!(props["Configuration"], "Release");
/// assert_eq!(props.len(), 1);
/// ```
pub fn parse_command_line(line: &str) -> HashMap<String, String> {
    let mut props = HashMap::new();

    for token in line.split(' ') {
        let Some(rest) = token.strip_prefix(PROPERTY_SWITCH) else {
            continue;
        };

        let Some((key, value)) = rest.split_once('=') else {
            tracing::debug!(%token, "skipping property switch without '='");
            continue;
        };

        if key.is_empty() {
            tracing::debug!(%token, "skipping property switch with empty name");
            continue;
        }

        if props.keys().any(|k: &String| k.eq_ignore_ascii_case(key)) {
            continue;
        }
        props.insert(key.to_string(), value.to_string());
    }

    props
}

/// [`parse_command_line`] over an argument list, joined with spaces first.
pub fn parse_args<I, S>(args: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let line = args
        .into_iter()
        .map(|a| a.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(" ");
    parse_command_line(&line)
}

/// Global properties passed to the current process as `-property:` switches.
pub fn from_current_process() -> HashMap<String, String> {
    parse_args(std::env::args())
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solution_dir_has_trailing_separator() {
        let path = Path::new("some").join("dir").join("App.csproj");
        let dir = solution_dir(&path);
        assert!(dir.ends_with(MAIN_SEPARATOR), "{dir}");
        assert!(dir.ends_with(&format!("dir{MAIN_SEPARATOR}")), "{dir}");
        assert!(Path::new(&dir).is_absolute(), "{dir}");
    }

    #[test]
    fn solution_dir_for_bare_file_name_is_current_dir() {
        let dir = solution_dir(Path::new("App.csproj"));
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(Path::new(&dir), cwd.as_path());
    }

    #[test]
    fn solution_dir_wins_over_override() {
        let overrides = HashMap::from([
            (SOLUTION_DIR.to_string(), "/elsewhere/".to_string()),
            ("Configuration".to_string(), "Release".to_string()),
        ]);
        let path = Path::new("src").join("App.csproj");
        let props = GlobalProperties::assemble(&path, Some(&overrides));
        assert_eq!(props.get(SOLUTION_DIR), Some(solution_dir(&path).as_str()));
        assert_eq!(props.get("Configuration"), Some("Release"));
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn solution_dir_wins_over_override_in_other_case() {
        let overrides = HashMap::from([
            ("solutiondir".to_string(), "/elsewhere/".to_string()),
            ("SOLUTIONDIR".to_string(), "/other/".to_string()),
        ]);
        let path = Path::new("src").join("App.csproj");
        let props = GlobalProperties::assemble(&path, Some(&overrides));
        assert_eq!(props.len(), 1);
        assert_eq!(props.get("solutiondir"), Some(solution_dir(&path).as_str()));
        assert_eq!(props.iter().next().map(|(k, _)| k), Some(SOLUTION_DIR));
    }

    #[test]
    fn assemble_without_overrides_has_only_solution_dir() {
        let props = GlobalProperties::assemble("App.csproj", None);
        assert_eq!(props.len(), 1);
        assert!(props.contains_key(SOLUTION_DIR));
    }

    #[test]
    fn merge_is_first_write_wins() {
        let mut props = GlobalProperties::new();
        props.merge([("A", "1"), ("B", "2"), ("A", "3")]);
        assert_eq!(props.get("A"), Some("1"));
        assert_eq!(props.get("B"), Some("2"));
        assert!(!props.insert_if_absent("B", "x"));
        assert!(!props.insert_if_absent("b", "x"));
        assert_eq!(props.get("b"), Some("2"));
    }

    #[test]
    fn command_line_single_property() {
        let props = parse_command_line("-property:Config=Release");
        assert_eq!(props.len(), 1);
        assert_eq!(props["Config"], "Release");
    }

    #[test]
    fn command_line_skips_token_without_equals() {
        let props = parse_command_line("tool -property:BadToken -property:A=1");
        assert_eq!(props.len(), 1);
        assert_eq!(props["A"], "1");
    }

    #[test]
    fn command_line_splits_on_first_equals() {
        let props = parse_command_line("-property:DefineConstants=A=B");
        assert_eq!(props["DefineConstants"], "A=B");
    }

    #[test]
    fn command_line_keeps_empty_value_and_drops_empty_key() {
        let props = parse_command_line("-property:Empty= -property:=orphan");
        assert_eq!(props.len(), 1);
        assert_eq!(props["Empty"], "");
    }

    #[test]
    fn command_line_ignores_other_switches() {
        let props = parse_command_line("dnt -p:A=1 /property:B=2 --property:C=3 -Property:D=4");
        assert!(props.is_empty(), "{props:?}");
    }

    #[test]
    fn command_line_first_occurrence_wins() {
        let props = parse_command_line("-property:A=1 -property:A=2 -property:a=3");
        assert_eq!(props.len(), 1);
        assert_eq!(props["A"], "1");
    }

    #[test]
    fn command_line_space_in_value_is_truncated() {
        // Naive splitting: the quoted value loses everything after the space.
        let props = parse_command_line("-property:Title=\"My App\"");
        assert_eq!(props["Title"], "\"My");
    }

    #[test]
    fn args_are_joined_before_parsing() {
        let props = parse_args(["dnt", "-property:A=1", "-property:B=two words"]);
        assert_eq!(props["A"], "1");
        assert_eq!(props["B"], "two");
    }
}
