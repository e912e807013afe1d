//! Command implementations

pub mod build;
pub mod clean;
pub mod completions;
pub mod plan;

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;

use crate::cli::RecipeArgs;
use omnibuild::core::TargetPlatform;
use omnibuild::util::config::{load_config, Config};
use omnibuild::util::GlobalContext;

/// Settings resolved from the command line, configuration and defaults,
/// in that order of precedence.
pub struct Settings {
    pub config: Config,
    pub recipes_dir: PathBuf,
    pub install_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub platform: TargetPlatform,
    pub versions: HashMap<String, String>,
}

impl Settings {
    pub fn resolve(ctx: &GlobalContext, args: &RecipeArgs) -> Result<Settings> {
        let config = load_config(&ctx.config_path(), &ctx.project_config_path());

        let recipes_dir = args
            .recipes_dir
            .clone()
            .or_else(|| config.build.recipes_dir.clone())
            .map(|p| ctx.resolve_path(&p))
            .unwrap_or_else(|| ctx.recipes_dir());
        let install_dir = args
            .install_dir
            .clone()
            .or_else(|| config.build.install_dir.clone())
            .map(|p| ctx.resolve_path(&p))
            .unwrap_or_else(|| ctx.install_dir());
        let cache_dir = cache_dir(ctx, &config, args.cache_dir.clone());

        let mut platform = config.target_platform();
        if let Some(ref os) = args.os {
            if *os != platform.os {
                // The host family says nothing about another OS
                platform.family = None;
            }
            platform.os = os.clone();
        }
        if let Some(ref arch) = args.arch {
            platform.arch = arch.clone();
        }
        if args.family.is_some() {
            platform.family = args.family.clone();
        }
        for runtime in &args.python_runtimes {
            platform = platform.with_python_runtime(runtime.clone());
        }

        let mut versions: HashMap<String, String> = config.versions.clone().into_iter().collect();
        versions.extend(args.overrides.iter().cloned());

        Ok(Settings {
            config,
            recipes_dir,
            install_dir,
            cache_dir,
            platform,
            versions,
        })
    }
}

/// Cache directory: CLI > config > default.
pub fn cache_dir(ctx: &GlobalContext, config: &Config, cli: Option<PathBuf>) -> PathBuf {
    cli.or_else(|| config.cache.dir.clone())
        .map(|p| ctx.resolve_path(&p))
        .unwrap_or_else(|| ctx.cache_dir())
}
