//! Implementation of `omnibuild build`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use crate::builder::{
    BuildCache, BuildContext, BuildEvent, BuildExecutor, Collaborators, EventSink, ExecuteError,
    InstallResult, JsonSink, NullSink,
};
use crate::core::{load_dir, BuildGraph, LoadOptions, TargetPlatform};
use crate::sources::{ArchiveExtractor, HttpFetcher};
use crate::util::diagnostic::suggestions;
use crate::util::process::ShellRunner;
use crate::util::template::PlaceholderTemplater;

/// Options for the build command.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Components to build, in order
    pub targets: Vec<String>,

    pub recipes_dir: PathBuf,
    pub install_dir: PathBuf,
    pub source_dir: PathBuf,
    pub cache_dir: PathBuf,

    pub platform: TargetPlatform,

    /// Environment passed to every step
    pub env: BTreeMap<String, String>,

    /// Version overrides (component name -> version)
    pub versions: HashMap<String, String>,

    /// `make -j` parallelism (None = available cores)
    pub jobs: Option<usize>,

    /// Download timeout
    pub timeout: Option<Duration>,

    /// Emit JSON events on stdout
    pub json: bool,

    /// Show a progress bar
    pub progress: bool,
}

/// Result of a build run.
#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    /// Every component of every target, each listed once
    pub results: Vec<InstallResult>,
    pub duration: Duration,
}

impl BuildSummary {
    /// Components built in this run.
    pub fn built(&self) -> usize {
        self.results.iter().filter(|r| !r.cached).count()
    }

    /// Components satisfied from the cache.
    pub fn fresh(&self) -> usize {
        self.results.iter().filter(|r| r.cached).count()
    }
}

/// Load every recipe in `recipes_dir` into a graph.
pub fn load_graph(
    recipes_dir: &Path,
    platform: &TargetPlatform,
    versions: &HashMap<String, String>,
) -> Result<BuildGraph> {
    if !recipes_dir.is_dir() {
        bail!(
            "recipes directory not found: {}\nhelp: {}",
            recipes_dir.display(),
            suggestions::NO_RECIPES
        );
    }

    let mut opts = LoadOptions::new(platform.clone());
    for (name, version) in versions {
        opts = opts.with_version(name.clone(), version.clone());
    }

    let graph = load_dir(recipes_dir, &opts)
        .with_context(|| format!("failed to load recipes from {}", recipes_dir.display()))?;
    tracing::debug!("Loaded {} component(s) from {}", graph.len(), recipes_dir.display());
    Ok(graph)
}

/// Build the requested targets with the production collaborators.
pub fn build(opts: &BuildOptions) -> Result<BuildSummary> {
    let graph = load_graph(&opts.recipes_dir, &opts.platform, &opts.versions)?;

    let runner = ShellRunner::new();
    let mut fetcher = HttpFetcher::new();
    if let Some(timeout) = opts.timeout {
        fetcher = fetcher.with_timeout(timeout);
    }
    let extractor = ArchiveExtractor::new();
    let templater = PlaceholderTemplater::new();
    let tools = Collaborators {
        runner: &runner,
        fetcher: &fetcher,
        extractor: &extractor,
        templater: &templater,
    };

    let sink: &dyn EventSink = if opts.json { &JsonSink } else { &NullSink };
    let mut cache = BuildCache::persistent(opts.cache_dir.join("builds"))?;

    Ok(build_graph(opts, &graph, tools, sink, &mut cache)?)
}

/// Build the requested targets of an already loaded graph.
///
/// All targets are resolved before anything is built, so an unknown
/// component or a cycle is reported without side effects. Targets share
/// `cache`: a component built for one target is a cache hit for the next.
pub fn build_graph(
    opts: &BuildOptions,
    graph: &BuildGraph,
    tools: Collaborators<'_>,
    sink: &dyn EventSink,
    cache: &mut BuildCache,
) -> Result<BuildSummary, ExecuteError> {
    let start = Instant::now();

    for target in &opts.targets {
        if let Err(e) = graph.resolve_order(target) {
            sink.emit(&BuildEvent::BuildFinished {
                success: false,
                built: 0,
                fresh: 0,
                duration_ms: start.elapsed().as_millis() as u64,
            });
            return Err(e.into());
        }
    }

    let mut ctx = BuildContext::new(&opts.install_dir, &opts.source_dir, &opts.cache_dir)
        .with_env(opts.env.clone())
        .with_platform(opts.platform.clone());
    if let Some(jobs) = opts.jobs {
        ctx = ctx.with_workers(jobs);
    }

    tracing::debug!("Building for {}", ctx.platform);

    let executor = BuildExecutor::new(&ctx, tools)
        .events(sink)
        .progress(opts.progress && !opts.json);

    let mut summary = BuildSummary::default();
    let mut seen = HashSet::new();
    let mut outcome = Ok(());

    for target in &opts.targets {
        match executor.execute(graph, target, cache) {
            Ok(results) => {
                for result in results {
                    if seen.insert(result.name.clone()) {
                        summary.results.push(result);
                    }
                }
            }
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }

    summary.duration = start.elapsed();
    sink.emit(&BuildEvent::BuildFinished {
        success: outcome.is_ok(),
        built: summary.built(),
        fresh: summary.fresh(),
        duration_ms: summary.duration.as_millis() as u64,
    });

    outcome.map(|()| summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::events::RecordingSink;
    use crate::core::{Component, GraphError, Step};
    use crate::test_support::{RecordingExtractor, RecordingRunner, StubFetcher};
    use tempfile::TempDir;

    fn options(tmp: &TempDir, targets: &[&str]) -> BuildOptions {
        BuildOptions {
            targets: targets.iter().map(|t| t.to_string()).collect(),
            recipes_dir: tmp.path().join("recipes"),
            install_dir: tmp.path().join("install"),
            source_dir: tmp.path().join("src"),
            cache_dir: tmp.path().join("cache"),
            platform: TargetPlatform::new("linux", "x86_64"),
            env: BTreeMap::new(),
            versions: HashMap::new(),
            jobs: Some(2),
            timeout: None,
            json: false,
            progress: false,
        }
    }

    fn agent_graph() -> BuildGraph {
        [
            Component::new("zlib", "1.2.11").step(Step::command("build-zlib")),
            Component::new("curl", "7.79.1")
                .depends_on("zlib")
                .step(Step::command("build-curl")),
            Component::new("agent", "7.0")
                .depends_on("curl")
                .depends_on("zlib")
                .step(Step::command("build-agent")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_multiple_targets_share_cache() {
        let tmp = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let (fetcher, extractor, templater) =
            (StubFetcher::new(), RecordingExtractor::new(), PlaceholderTemplater::new());
        let tools = Collaborators {
            runner: &runner,
            fetcher: &fetcher,
            extractor: &extractor,
            templater: &templater,
        };
        let sink = RecordingSink::new();
        let mut cache = BuildCache::in_memory();

        let summary = build_graph(
            &options(&tmp, &["curl", "agent"]),
            &agent_graph(),
            tools,
            &sink,
            &mut cache,
        )
        .unwrap();

        assert_eq!(runner.commands(), vec!["build-zlib", "build-curl", "build-agent"]);
        assert_eq!(summary.built(), 3);
        assert_eq!(summary.results.len(), 3);
        assert!(matches!(
            sink.events().last(),
            Some(BuildEvent::BuildFinished { success: true, built: 3, .. })
        ));
    }

    #[test]
    fn test_unknown_target_fails_before_building() {
        let tmp = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let (fetcher, extractor, templater) =
            (StubFetcher::new(), RecordingExtractor::new(), PlaceholderTemplater::new());
        let tools = Collaborators {
            runner: &runner,
            fetcher: &fetcher,
            extractor: &extractor,
            templater: &templater,
        };
        let mut cache = BuildCache::in_memory();

        let err = build_graph(
            &options(&tmp, &["agent", "nope"]),
            &agent_graph(),
            tools,
            &NullSink,
            &mut cache,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ExecuteError::Graph(GraphError::UnknownComponent { .. })
        ));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_failure_reports_unsuccessful_run() {
        let tmp = TempDir::new().unwrap();
        let runner = RecordingRunner::new().fail("build-curl", 2);
        let (fetcher, extractor, templater) =
            (StubFetcher::new(), RecordingExtractor::new(), PlaceholderTemplater::new());
        let tools = Collaborators {
            runner: &runner,
            fetcher: &fetcher,
            extractor: &extractor,
            templater: &templater,
        };
        let sink = RecordingSink::new();
        let mut cache = BuildCache::in_memory();

        let err = build_graph(&options(&tmp, &["agent"]), &agent_graph(), tools, &sink, &mut cache)
            .unwrap_err();

        assert!(err.to_string().contains("curl v7.79.1"));
        assert_eq!(runner.commands(), vec!["build-zlib", "build-curl"]);
        assert!(matches!(
            sink.events().last(),
            Some(BuildEvent::BuildFinished { success: false, built: 0, .. })
        ));
    }

    #[test]
    fn test_load_graph_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let err = load_graph(
            &tmp.path().join("recipes"),
            &TargetPlatform::host(),
            &HashMap::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("recipes directory not found"));
    }
}
