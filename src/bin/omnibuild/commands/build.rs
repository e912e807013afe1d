//! `omnibuild build` command

use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::time::Duration;

use anyhow::Result;

use crate::cli::{BuildArgs, MessageFormat};
use crate::commands::Settings;
use omnibuild::ops::{build, BuildOptions};
use omnibuild::util::GlobalContext;

/// Variables carried over from the caller's environment. Everything else
/// a step sees comes from configuration or `--env`.
const INHERITED_ENV: &[&str] = &["PATH", "HOME"];

pub fn execute(args: BuildArgs, ctx: &GlobalContext) -> Result<()> {
    let settings = Settings::resolve(ctx, &args.recipes)?;
    let config = &settings.config;

    let source_dir = args
        .source_dir
        .clone()
        .or_else(|| config.build.source_dir.clone())
        .map(|p| ctx.resolve_path(&p))
        .unwrap_or_else(|| ctx.source_dir());

    // Environment: inherited < config < CLI
    let mut env = BTreeMap::new();
    for key in INHERITED_ENV {
        if let Ok(value) = std::env::var(key) {
            env.insert(key.to_string(), value);
        }
    }
    env.extend(config.env.clone());
    env.extend(args.env.iter().cloned());

    let json = args.message_format == MessageFormat::Json;
    let opts = BuildOptions {
        targets: args.targets,
        recipes_dir: settings.recipes_dir,
        install_dir: settings.install_dir,
        source_dir,
        cache_dir: settings.cache_dir,
        platform: settings.platform,
        env,
        versions: settings.versions,
        // Jobs: CLI > config > None (auto-detect)
        jobs: args.jobs.or(config.build.jobs),
        timeout: config.net.timeout.map(Duration::from_secs),
        json,
        progress: !json && std::io::stderr().is_terminal(),
    };

    let summary = build(&opts)?;

    if !json {
        eprintln!(
            "    Finished {} component{} ({} built, {} fresh) in {:.2}s",
            summary.results.len(),
            if summary.results.len() == 1 { "" } else { "s" },
            summary.built(),
            summary.fresh(),
            summary.duration.as_secs_f64()
        );
        eprintln!("   Installed into {}", opts.install_dir.display());
    }

    Ok(())
}
