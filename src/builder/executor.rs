//! Build executor with progress reporting.
//!
//! Components are built strictly one at a time, in dependency order. A
//! failure halts the run immediately; nothing after the failing component
//! is attempted.

use std::path::{Path, PathBuf};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

use crate::builder::cache::{BuildCache, CacheEntry, CacheKey};
use crate::builder::context::BuildContext;
use crate::builder::error::{BuildError, ExecuteError, StepFailure};
use crate::builder::events::{BuildEvent, EventSink, NullSink};
use crate::builder::step::StepRunner;
use crate::core::component::{Component, SourceDescriptor};
use crate::core::graph::BuildGraph;
use crate::sources::{Extractor, FetchContext, Fetcher};
use crate::util::fs::{
    copy_dir_all, copy_path, ensure_dir, is_plain_segment, join_within, remove_path,
};
use crate::util::process::ProcessRunner;
use crate::util::template::Templater;

/// Outcome of building one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallResult {
    pub name: String,
    pub version: String,
    pub key: CacheKey,
    /// Directory the component installed into
    pub install_dir: PathBuf,
    /// Satisfied from the cache without running any step
    pub cached: bool,
    /// Steps actually run; zero when cached
    pub steps_run: usize,
}

impl InstallResult {
    pub fn id(&self) -> String {
        format!("{} v{}", self.name, self.version)
    }
}

/// The external collaborators a build needs.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub runner: &'a dyn ProcessRunner,
    pub fetcher: &'a dyn Fetcher,
    pub extractor: &'a dyn Extractor,
    pub templater: &'a dyn Templater,
}

/// Build executor with progress tracking.
pub struct BuildExecutor<'a> {
    ctx: &'a BuildContext,
    tools: Collaborators<'a>,
    events: &'a dyn EventSink,
    progress: bool,
    quiet: bool,
}

impl<'a> BuildExecutor<'a> {
    /// Create a new build executor.
    pub fn new(ctx: &'a BuildContext, tools: Collaborators<'a>) -> Self {
        BuildExecutor {
            ctx,
            tools,
            events: &NullSink,
            progress: false,
            quiet: false,
        }
    }

    /// Send build events to `sink`.
    pub fn events(mut self, sink: &'a dyn EventSink) -> Self {
        self.events = sink;
        self
    }

    /// Show a progress bar while building.
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Suppress status lines on stderr.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Build `target` and everything it depends on.
    pub fn execute(
        &self,
        graph: &BuildGraph,
        target: &str,
        cache: &mut BuildCache,
    ) -> Result<Vec<InstallResult>, ExecuteError> {
        let order = graph.resolve_order(target)?;
        let total = order.len();

        let pb = if self.progress && total > 1 {
            let pb = ProgressBar::new(total as u64);
            let style = ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-");
            pb.set_style(style);
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut results = Vec::with_capacity(total);
        for (i, component) in order.into_iter().enumerate() {
            let id = component.id();
            self.events.emit(&BuildEvent::started(&id, i + 1, total));
            pb.set_message(id.clone());

            let start = Instant::now();
            let result = match self.build_inner(component, cache, &pb) {
                Ok(result) => result,
                Err(err) => {
                    self.events
                        .emit(&BuildEvent::failed(&id, err.step_index, err.cause.to_string()));
                    pb.abandon();
                    return Err(err.into());
                }
            };

            if result.cached {
                self.events.emit(&BuildEvent::fresh(&id, result.key.to_string()));
                self.status(&pb, "Fresh", &id);
            } else {
                self.events.emit(&BuildEvent::ComponentFinished {
                    component_id: id.clone(),
                    key: result.key.to_string(),
                    install_dir: result.install_dir.clone(),
                    steps_run: result.steps_run,
                    duration_ms: start.elapsed().as_millis() as u64,
                });
                self.status(
                    &pb,
                    "Finished",
                    &format!("{} in {:.2}s", id, start.elapsed().as_secs_f64()),
                );
            }

            pb.inc(1);
            results.push(result);
        }

        pb.finish_and_clear();
        Ok(results)
    }

    /// Build one component, or return its cached result.
    pub fn build(
        &self,
        component: &Component,
        cache: &mut BuildCache,
    ) -> Result<InstallResult, BuildError> {
        self.build_inner(component, cache, &ProgressBar::hidden())
    }

    fn build_inner(
        &self,
        component: &Component,
        cache: &mut BuildCache,
        pb: &ProgressBar,
    ) -> Result<InstallResult, BuildError> {
        let id = component.id();
        let key = CacheKey::for_component(component);

        if let Some(entry) = cache.get(&key) {
            if entry.reusable_for(&self.ctx.install_dir, &self.ctx.platform) {
                tracing::debug!("{} is cached ({})", id, key);
                return Ok(InstallResult {
                    name: component.name.clone(),
                    version: component.version.clone(),
                    key,
                    install_dir: entry.install_dir.clone(),
                    cached: true,
                    steps_run: 0,
                });
            }
            tracing::debug!(
                "{} was built into {} for {}, rebuilding",
                id,
                entry.install_dir.display(),
                entry
                    .platform
                    .as_ref()
                    .map_or_else(|| "an unknown platform".to_string(), |p| p.to_string())
            );
        }

        self.status(pb, "Building", &id);

        let fail = |step_index: Option<usize>, cause: StepFailure| {
            BuildError::new(id.clone(), step_index, cause)
        };

        let work_dir = self.prepare_source(component).map_err(|e| fail(None, e))?;
        ensure_dir(&self.ctx.install_dir).map_err(|e| fail(None, StepFailure::io(e)))?;

        let vars = self.ctx.variables(component, &work_dir);
        let steps = StepRunner::new(
            self.ctx,
            self.tools.runner,
            self.tools.templater,
            &work_dir,
            &vars,
        );

        let mut steps_run = 0;
        for (index, step) in component.steps.iter().enumerate() {
            if !step.condition.matches(&self.ctx.platform) {
                tracing::debug!("{}: skipping step {} `{}` on {}", id, index, step.kind, self.ctx.platform);
                continue;
            }

            tracing::debug!("{}: step {} `{}`", id, index, step.kind);
            steps.run(&step.kind).map_err(|e| fail(Some(index), e))?;
            steps_run += 1;
        }

        cache
            .record(
                CacheEntry::new(key.clone(), &self.ctx.install_dir)
                    .for_platform(&self.ctx.platform),
            )
            .map_err(|e| fail(None, StepFailure::io(e)))?;

        Ok(InstallResult {
            name: component.name.clone(),
            version: component.version.clone(),
            key,
            install_dir: self.ctx.install_dir.clone(),
            cached: false,
            steps_run,
        })
    }

    /// Fetch and unpack the component's source into a clean directory.
    ///
    /// Returns the directory steps run in.
    fn prepare_source(&self, component: &Component) -> Result<PathBuf, StepFailure> {
        // The source dir is wiped below, so it must be a child of the source root
        if !is_plain_segment(&component.name) {
            return Err(StepFailure::Io(format!(
                "component name `{}` is not a valid directory name",
                component.name
            )));
        }
        let source_dir = self.ctx.source_dir(component);
        let work_dir = match component.relative_path {
            Some(ref rel) => join_within(&source_dir, Path::new(rel)).ok_or_else(|| {
                StepFailure::Io(format!(
                    "relative path `{}` leaves the source directory",
                    rel
                ))
            })?,
            None => source_dir.clone(),
        };

        remove_path(&source_dir).map_err(StepFailure::io)?;
        ensure_dir(&source_dir).map_err(StepFailure::io)?;

        let Some(ref source) = component.source else {
            ensure_dir(&work_dir).map_err(StepFailure::io)?;
            return Ok(work_dir);
        };

        let fetch_ctx = FetchContext::new(self.ctx.download_dir());
        let fetched = self.tools.fetcher.fetch(source, &fetch_ctx)?;

        match source {
            SourceDescriptor::Url { extract: true, .. } => {
                self.tools.extractor.extract(&fetched, &source_dir)?;
            }
            SourceDescriptor::Url { extract: false, .. } => {
                copy_path(&fetched, &source_dir).map_err(StepFailure::io)?;
            }
            SourceDescriptor::Path { .. } => {
                copy_dir_all(&fetched, &source_dir).map_err(StepFailure::io)?;
            }
        }

        if !work_dir.is_dir() {
            return Err(StepFailure::Io(format!(
                "relative path `{}` does not exist in the unpacked source",
                component.relative_path.as_deref().unwrap_or_default()
            )));
        }
        Ok(work_dir)
    }

    fn status(&self, pb: &ProgressBar, verb: &str, message: &str) {
        if self.quiet {
            return;
        }
        let line = format!("{:>12} {}", verb, message);
        if pb.is_hidden() {
            eprintln!("{}", line);
        } else {
            pb.println(line);
        }
    }
}
