//! Recipe files: the TOML form of a component.
//!
//! A recipes directory holds one `*.toml` file per component. Files are
//! loaded in file-name order; when two recipes declare the same name the
//! later one replaces the earlier one.
//!
//! ```toml
//! [component]
//! name = "zlib"
//! default_version = "1.2.11"
//! relative_path = "zlib-{{ version }}"
//!
//! [[versions]]
//! version = "1.2.11"
//! sha256 = "c3e5e9fdd5004dcb542feda5ee4f0ff0744628baf8ed2dd5d66f8ca1197cb1a1"
//!
//! [source]
//! url = "https://zlib.net/zlib-{{ version }}.tar.gz"
//!
//! [[dependencies]]
//! name = "rtloader"
//! when = { python_runtime = "3" }
//!
//! [[steps]]
//! command = "./configure --prefix={{ install_dir }}/embedded"
//! env = { CFLAGS = "-fPIC" }
//!
//! [[steps]]
//! make = ["install"]
//! when = { not_os = "windows" }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::core::component::{Checksum, Component, SourceDescriptor, Step, StepKind};
use crate::core::graph::BuildGraph;
use crate::core::platform::{PlatformCondition, TargetPlatform};
use crate::util::diagnostic::Diagnostic;
use crate::util::fs::{is_plain_segment, join_within};
use crate::util::template::{PlaceholderTemplater, Templater};

/// Version used when a recipe declares none (local path sources).
pub const UNVERSIONED: &str = "0.0.0";

/// Error loading a recipe file.
#[derive(Debug, Error, miette::Diagnostic)]
pub enum RecipeError {
    #[error("failed to read recipe {}", path.display())]
    #[diagnostic(code(omnibuild::recipe::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse recipe {}: {message}", path.display())]
    #[diagnostic(code(omnibuild::recipe::parse))]
    Parse { path: PathBuf, message: String },

    #[error("invalid recipe {}: {message}", path.display())]
    #[diagnostic(code(omnibuild::recipe::invalid))]
    Invalid { path: PathBuf, message: String },
}

impl RecipeError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            RecipeError::Io { path, source } => {
                Diagnostic::error(format!("failed to read recipe: {}", source)).with_location(path)
            }
            RecipeError::Parse { path, message } => Diagnostic::error("failed to parse recipe")
                .with_location(path)
                .with_context(message.clone()),
            RecipeError::Invalid { path, message } => Diagnostic::error("invalid recipe")
                .with_location(path)
                .with_context(message.clone())
                .with_suggestion("Each step declares exactly one action, e.g. `command` or `make`"),
        }
    }
}

/// Options applied while turning recipes into components.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Platform used to evaluate conditional dependencies
    pub platform: TargetPlatform,

    /// Version overrides by component name
    pub versions: HashMap<String, String>,
}

impl LoadOptions {
    pub fn new(platform: TargetPlatform) -> Self {
        LoadOptions {
            platform,
            versions: HashMap::new(),
        }
    }

    /// Force a specific version of a component.
    pub fn with_version(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.versions.insert(name.into(), version.into());
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecipeFile {
    component: RecipeMetadata,

    #[serde(default)]
    versions: Vec<VersionEntry>,

    source: Option<RawSource>,

    #[serde(default)]
    dependencies: Vec<RawDependency>,

    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecipeMetadata {
    name: String,
    default_version: Option<String>,
    description: Option<String>,
    license: Option<String>,
    relative_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VersionEntry {
    version: String,
    md5: Option<String>,
    sha256: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSource {
    url: Option<String>,
    path: Option<PathBuf>,
    md5: Option<String>,
    sha256: Option<String>,
    target_filename: Option<String>,
    #[serde(default = "default_true")]
    extract: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependency {
    Name(String),
    Conditional(ConditionalDependency),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConditionalDependency {
    name: String,
    #[serde(default)]
    when: PlatformCondition,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    command: Option<String>,
    make: Option<Vec<String>>,
    mkdir: Option<String>,
    copy: Option<String>,
    delete: Option<String>,
    touch: Option<String>,
    template: Option<String>,
    chmod: Option<String>,

    dest: Option<String>,
    cwd: Option<String>,
    mode: Option<u32>,

    #[serde(default)]
    env: BTreeMap<String, String>,

    #[serde(default)]
    vars: BTreeMap<String, String>,

    #[serde(default)]
    when: PlatformCondition,
}

fn choose_checksum(md5: Option<String>, sha256: Option<String>) -> Option<Checksum> {
    sha256.map(Checksum::Sha256).or(md5.map(Checksum::Md5))
}

impl RawStep {
    fn into_step(self) -> Result<Step, String> {
        let actions = [
            self.command.is_some(),
            self.make.is_some(),
            self.mkdir.is_some(),
            self.copy.is_some(),
            self.delete.is_some(),
            self.touch.is_some(),
            self.template.is_some(),
            self.chmod.is_some(),
        ];
        match actions.iter().filter(|a| **a).count() {
            1 => {}
            0 => return Err("step has no action".to_string()),
            _ => return Err("step declares more than one action".to_string()),
        }

        let kind = if let Some(command) = self.command {
            StepKind::Command {
                command,
                env: self.env,
                cwd: self.cwd,
            }
        } else if let Some(args) = self.make {
            StepKind::Make {
                args,
                env: self.env,
            }
        } else if let Some(path) = self.mkdir {
            StepKind::Mkdir { path }
        } else if let Some(source) = self.copy {
            let dest = self.dest.ok_or("copy step requires `dest`")?;
            StepKind::Copy { source, dest }
        } else if let Some(path) = self.delete {
            StepKind::Delete { path }
        } else if let Some(path) = self.touch {
            StepKind::Touch { path }
        } else if let Some(source) = self.template {
            let dest = self.dest.ok_or("template step requires `dest`")?;
            StepKind::Template {
                source,
                dest,
                vars: self.vars,
                mode: self.mode,
            }
        } else if let Some(path) = self.chmod {
            let mode = self.mode.ok_or("chmod step requires `mode`")?;
            StepKind::Chmod { path, mode }
        } else {
            unreachable!("exactly one action was checked above")
        };

        Ok(Step {
            kind,
            condition: self.when,
        })
    }
}

/// Parse a recipe from its TOML text.
///
/// `path` is used for error messages and to resolve local path sources.
pub fn parse_recipe(
    contents: &str,
    path: &Path,
    opts: &LoadOptions,
) -> Result<Component, RecipeError> {
    let file: RecipeFile = toml::from_str(contents).map_err(|e| RecipeError::Parse {
        path: path.to_path_buf(),
        message: e.message().to_string(),
    })?;

    let invalid = |message: String| RecipeError::Invalid {
        path: path.to_path_buf(),
        message,
    };

    let meta = file.component;
    if meta.name.trim().is_empty() {
        return Err(invalid("component name must not be empty".to_string()));
    }
    // The name becomes a directory under the source root
    if !is_plain_segment(&meta.name) {
        return Err(invalid(format!(
            "component name `{}` must not contain path separators or `..`",
            meta.name
        )));
    }

    let version = opts
        .versions
        .get(&meta.name)
        .cloned()
        .or(meta.default_version)
        .unwrap_or_else(|| UNVERSIONED.to_string());

    let mut vars = BTreeMap::new();
    vars.insert("name".to_string(), meta.name.clone());
    vars.insert("version".to_string(), version.clone());
    let templater = PlaceholderTemplater::new();

    let source = match file.source {
        None => None,
        Some(raw) => match (raw.url, raw.path) {
            (Some(_), Some(_)) => {
                return Err(invalid("source declares both `url` and `path`".to_string()))
            }
            (None, None) => {
                return Err(invalid("source requires `url` or `path`".to_string()))
            }
            (None, Some(rel)) => {
                let base = path.parent().unwrap_or(Path::new("."));
                Some(SourceDescriptor::path(base.join(rel)))
            }
            (Some(url), None) => {
                let url = templater
                    .render(&url, &vars)
                    .map_err(|e| invalid(format!("source url: {}", e)))?;

                let pinned = file.versions.iter().find(|v| v.version == version);
                let checksum = match pinned {
                    Some(entry) => choose_checksum(entry.md5.clone(), entry.sha256.clone()),
                    None => None,
                }
                .or_else(|| choose_checksum(raw.md5, raw.sha256));

                if let Some(checksum) = &checksum {
                    if checksum.value().is_empty()
                        || !checksum.value().chars().all(|c| c.is_ascii_hexdigit())
                    {
                        return Err(invalid(format!(
                            "{} checksum `{}` is not a hex digest",
                            checksum.algorithm(),
                            checksum.value()
                        )));
                    }
                }
                if let Some(name) = &raw.target_filename {
                    if !is_plain_segment(name) {
                        return Err(invalid(format!(
                            "target_filename `{}` must be a plain file name",
                            name
                        )));
                    }
                }

                if checksum.is_none() {
                    tracing::warn!(
                        "component `{}` {} has no checksum; download will not be verified",
                        meta.name,
                        version
                    );
                }

                Some(SourceDescriptor::Url {
                    url,
                    checksum,
                    target_filename: raw.target_filename,
                    extract: raw.extract,
                })
            }
        },
    };

    let relative_path = meta
        .relative_path
        .map(|rel| templater.render(&rel, &vars))
        .transpose()
        .map_err(|e| invalid(format!("relative_path: {}", e)))?;
    if let Some(rel) = &relative_path {
        if join_within(Path::new(""), Path::new(rel)).is_none() {
            return Err(invalid(format!(
                "relative_path `{}` must stay inside the source directory",
                rel
            )));
        }
    }

    let mut component = Component::new(meta.name, version);
    component.description = meta.description;
    component.license = meta.license;
    component.relative_path = relative_path;
    component.source = source;

    for dep in file.dependencies {
        match dep {
            RawDependency::Name(name) => component = component.depends_on(name),
            RawDependency::Conditional(ConditionalDependency { name, when }) => {
                if when.matches(&opts.platform) {
                    component = component.depends_on(name);
                } else {
                    tracing::debug!(
                        "skipping dependency `{}` of `{}` on {}",
                        name,
                        component.name,
                        opts.platform
                    );
                }
            }
        }
    }

    for (index, raw) in file.steps.into_iter().enumerate() {
        let step = raw
            .into_step()
            .map_err(|e| invalid(format!("step {}: {}", index, e)))?;
        component.steps.push(step);
    }

    Ok(component)
}

/// Load a single recipe file.
pub fn load_recipe(path: &Path, opts: &LoadOptions) -> Result<Component, RecipeError> {
    let contents = std::fs::read_to_string(path).map_err(|source| RecipeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_recipe(&contents, path, opts)
}

/// Load every `*.toml` recipe in `dir` into a build graph.
pub fn load_dir(dir: &Path, opts: &LoadOptions) -> Result<BuildGraph, RecipeError> {
    let entries = std::fs::read_dir(dir).map_err(|source| RecipeError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| RecipeError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
            files.push(path);
        }
    }
    files.sort();

    let mut graph = BuildGraph::new();
    for file in files {
        let component = load_recipe(&file, opts)?;
        tracing::debug!("loaded {} from {}", component.id(), file.display());
        if let Some(previous) = graph.insert(component) {
            tracing::info!(
                "recipe {} overrides earlier definition of `{}`",
                file.display(),
                previous.name
            );
        }
    }

    Ok(graph)
}
