//! Running a single build step.
//!
//! Every path and command line is rendered through the templater right
//! before the step runs. Relative paths resolve against the component's
//! working directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::builder::context::BuildContext;
use crate::builder::error::StepFailure;
use crate::core::component::StepKind;
use crate::util::fs::{
    copy_path, ensure_dir, glob_paths, read_to_string, remove_path, set_mode, touch, write_atomic,
};
use crate::util::process::{make_program, CommandSpec, ProcessRunner};
use crate::util::template::Templater;

/// Runs steps for one component.
pub struct StepRunner<'a> {
    ctx: &'a BuildContext,
    runner: &'a dyn ProcessRunner,
    templater: &'a dyn Templater,
    work_dir: &'a Path,
    vars: &'a BTreeMap<String, String>,
}

impl<'a> StepRunner<'a> {
    pub fn new(
        ctx: &'a BuildContext,
        runner: &'a dyn ProcessRunner,
        templater: &'a dyn Templater,
        work_dir: &'a Path,
        vars: &'a BTreeMap<String, String>,
    ) -> Self {
        StepRunner {
            ctx,
            runner,
            templater,
            work_dir,
            vars,
        }
    }

    fn render(&self, text: &str) -> Result<String, StepFailure> {
        Ok(self.templater.render(text, self.vars)?)
    }

    /// Render a path and resolve it against the working directory.
    fn resolve(&self, path: &str) -> Result<PathBuf, StepFailure> {
        let rendered = PathBuf::from(self.render(path)?);
        Ok(if rendered.is_absolute() {
            rendered
        } else {
            self.work_dir.join(rendered)
        })
    }

    /// Context environment overlaid with the step's own (rendered) entries.
    fn environment(&self, step_env: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>, StepFailure> {
        let mut env = self.ctx.env.clone();
        for (key, value) in step_env {
            env.insert(key.clone(), self.render(value)?);
        }
        Ok(env)
    }

    /// Execute one step.
    pub fn run(&self, kind: &StepKind) -> Result<(), StepFailure> {
        match kind {
            StepKind::Command { command, env, cwd } => {
                let command = self.render(command)?;
                let cwd = match cwd {
                    Some(dir) => self.resolve(dir)?,
                    None => self.work_dir.to_path_buf(),
                };
                self.shell(command, self.environment(env)?, cwd)
            }
            StepKind::Make { args, env } => {
                let mut command = format!("{} -j {}", make_program(), self.ctx.workers);
                for arg in args {
                    command.push(' ');
                    command.push_str(&self.render(arg)?);
                }
                self.shell(command, self.environment(env)?, self.work_dir.to_path_buf())
            }
            StepKind::Mkdir { path } => ensure_dir(&self.resolve(path)?).map_err(StepFailure::io),
            StepKind::Copy { source, dest } => {
                let sources = self.matches(source)?;
                let dest = self.resolve(dest)?;
                if sources.len() > 1 {
                    ensure_dir(&dest).map_err(StepFailure::io)?;
                }
                for src in sources {
                    copy_path(&src, &dest).map_err(StepFailure::io)?;
                }
                Ok(())
            }
            StepKind::Delete { path } => {
                // Deleting something already absent is not an error
                for target in glob_paths(&self.resolve(path)?).map_err(StepFailure::io)? {
                    remove_path(&target).map_err(StepFailure::io)?;
                }
                Ok(())
            }
            StepKind::Touch { path } => touch(&self.resolve(path)?).map_err(StepFailure::io),
            StepKind::Template {
                source,
                dest,
                vars,
                mode,
            } => {
                let source = self.resolve(source)?;
                let template = read_to_string(&source).map_err(StepFailure::io)?;

                let mut variables = self.vars.clone();
                for (key, value) in vars {
                    variables.insert(key.clone(), self.render(value)?);
                }
                let rendered = self.templater.render(&template, &variables)?;

                let dest = self.resolve(dest)?;
                write_atomic(&dest, rendered.as_bytes()).map_err(StepFailure::io)?;
                if let Some(mode) = mode {
                    set_mode(&dest, *mode).map_err(StepFailure::io)?;
                }
                Ok(())
            }
            StepKind::Chmod { path, mode } => {
                for target in self.matches(path)? {
                    set_mode(&target, *mode).map_err(StepFailure::io)?;
                }
                Ok(())
            }
        }
    }

    /// Expand a glob that must match at least one path.
    fn matches(&self, pattern: &str) -> Result<Vec<PathBuf>, StepFailure> {
        let resolved = self.resolve(pattern)?;
        let found = glob_paths(&resolved).map_err(StepFailure::io)?;
        if found.is_empty() {
            return Err(StepFailure::Io(format!(
                "no files match `{}`",
                resolved.display()
            )));
        }
        Ok(found)
    }

    fn shell(
        &self,
        command: String,
        env: BTreeMap<String, String>,
        cwd: PathBuf,
    ) -> Result<(), StepFailure> {
        ensure_dir(&cwd).map_err(StepFailure::io)?;

        let spec = CommandSpec { command, env, cwd };
        let output = self.runner.run(&spec).map_err(|e| StepFailure::Spawn {
            command: spec.command.clone(),
            message: format!("{:#}", e),
        })?;

        let combined = output.combined();
        if !combined.is_empty() {
            tracing::debug!("{}", combined);
        }

        if output.success() {
            Ok(())
        } else {
            Err(StepFailure::Exited {
                command: spec.command,
                code: output.code,
                output: combined,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingRunner;
    use crate::util::process::ProcessOutput;
    use crate::util::template::PlaceholderTemplater;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        ctx: BuildContext,
        work_dir: PathBuf,
        vars: BTreeMap<String, String>,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
        let ctx = BuildContext::new(
            tmp.path().join("install"),
            tmp.path().join("src"),
            tmp.path().join("cache"),
        )
        .with_env(env)
        .with_workers(3);
        let work_dir = tmp.path().join("src/zlib");
        std::fs::create_dir_all(&work_dir).unwrap();

        let component = crate::core::Component::new("zlib", "1.2.11");
        let vars = ctx.variables(&component, &work_dir);
        Fixture {
            _tmp: tmp,
            ctx,
            work_dir,
            vars,
        }
    }

    #[test]
    fn test_command_renders_and_passes_env() {
        let f = fixture();
        let runner = RecordingRunner::new();
        let templater = PlaceholderTemplater::new();
        let steps = StepRunner::new(&f.ctx, &runner, &templater, &f.work_dir, &f.vars);

        let mut env = BTreeMap::new();
        env.insert("CFLAGS".to_string(), "-I{{ install_dir }}/include".to_string());
        steps
            .run(&StepKind::Command {
                command: "./configure --prefix={{ install_dir }}/embedded".to_string(),
                env,
                cwd: None,
            })
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        let install = f.ctx.install_dir.display().to_string();
        assert_eq!(calls[0].command, format!("./configure --prefix={}/embedded", install));
        assert_eq!(calls[0].cwd, f.work_dir);
        assert_eq!(calls[0].env["CFLAGS"], format!("-I{}/include", install));
        assert_eq!(calls[0].env["PATH"], "/usr/bin:/bin");
    }

    #[test]
    fn test_make_uses_workers() {
        let f = fixture();
        let runner = RecordingRunner::new();
        let templater = PlaceholderTemplater::new();
        let steps = StepRunner::new(&f.ctx, &runner, &templater, &f.work_dir, &f.vars);

        steps
            .run(&StepKind::Make {
                args: vec!["install".to_string()],
                env: BTreeMap::new(),
            })
            .unwrap();
        assert!(runner.calls()[0].command.ends_with("make -j 3 install"));
    }

    #[test]
    fn test_failing_command_captures_output() {
        let f = fixture();
        let runner = RecordingRunner::new().respond(
            "configure",
            ProcessOutput {
                code: Some(77),
                stdout: "checking for gcc... no".to_string(),
                stderr: "configure: error: no acceptable C compiler".to_string(),
            },
        );
        let templater = PlaceholderTemplater::new();
        let steps = StepRunner::new(&f.ctx, &runner, &templater, &f.work_dir, &f.vars);

        let err = steps
            .run(&StepKind::Command {
                command: "./configure".to_string(),
                env: BTreeMap::new(),
                cwd: None,
            })
            .unwrap_err();
        match err {
            StepFailure::Exited { code, output, .. } => {
                assert_eq!(code, Some(77));
                assert!(output.contains("no acceptable C compiler"));
            }
            other => panic!("unexpected failure: {:?}", other),
        }
    }

    #[test]
    fn test_undefined_variable_fails_step() {
        let f = fixture();
        let runner = RecordingRunner::new();
        let templater = PlaceholderTemplater::new();
        let steps = StepRunner::new(&f.ctx, &runner, &templater, &f.work_dir, &f.vars);

        let err = steps
            .run(&StepKind::Mkdir {
                path: "{{ prefix }}/bin".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, StepFailure::Template(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_file_steps() {
        let f = fixture();
        let runner = RecordingRunner::new();
        let templater = PlaceholderTemplater::new();
        let steps = StepRunner::new(&f.ctx, &runner, &templater, &f.work_dir, &f.vars);

        std::fs::write(f.work_dir.join("agent.yaml.example"), "api_key:").unwrap();
        std::fs::write(
            f.work_dir.join("agent.service.erb"),
            "ExecStart={{ install_dir }}/bin/agent run -p {{ pid_file }}",
        )
        .unwrap();

        steps
            .run(&StepKind::Mkdir {
                path: "{{ install_dir }}/etc".to_string(),
            })
            .unwrap();
        steps
            .run(&StepKind::Copy {
                source: "*.example".to_string(),
                dest: "{{ install_dir }}/etc/".to_string(),
            })
            .unwrap();
        steps
            .run(&StepKind::Touch {
                path: "{{ install_dir }}/run/.keep".to_string(),
            })
            .unwrap();

        let mut vars = BTreeMap::new();
        vars.insert("pid_file".to_string(), "{{ install_dir }}/run/agent.pid".to_string());
        steps
            .run(&StepKind::Template {
                source: "agent.service.erb".to_string(),
                dest: "{{ install_dir }}/agent.service".to_string(),
                vars,
                mode: Some(0o644),
            })
            .unwrap();

        let install = &f.ctx.install_dir;
        assert!(install.join("etc/agent.yaml.example").is_file());
        assert!(install.join("run/.keep").is_file());
        assert_eq!(
            std::fs::read_to_string(install.join("agent.service")).unwrap(),
            format!(
                "ExecStart={0}/bin/agent run -p {0}/run/agent.pid",
                install.display()
            )
        );

        steps
            .run(&StepKind::Delete {
                path: "{{ install_dir }}/run".to_string(),
            })
            .unwrap();
        assert!(!install.join("run").exists());
    }

    #[test]
    fn test_copy_without_matches_fails() {
        let f = fixture();
        let runner = RecordingRunner::new();
        let templater = PlaceholderTemplater::new();
        let steps = StepRunner::new(&f.ctx, &runner, &templater, &f.work_dir, &f.vars);

        let err = steps
            .run(&StepKind::Copy {
                source: "missing/*.so".to_string(),
                dest: "{{ install_dir }}/lib".to_string(),
            })
            .unwrap_err();
        assert!(err.to_string().contains("no files match"));
    }
}
