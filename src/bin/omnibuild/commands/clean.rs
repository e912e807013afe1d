//! `omnibuild clean` command

use anyhow::Result;

use crate::cli::CleanArgs;
use crate::commands::cache_dir;
use omnibuild::ops::{clean, CleanOptions};
use omnibuild::util::config::load_config;
use omnibuild::util::GlobalContext;

pub fn execute(args: CleanArgs, ctx: &GlobalContext) -> Result<()> {
    let config = load_config(&ctx.config_path(), &ctx.project_config_path());
    let cache_dir = cache_dir(ctx, &config, args.cache_dir);

    let source_dir = args.sources.then(|| {
        config
            .build
            .source_dir
            .as_ref()
            .map(|p| ctx.resolve_path(p))
            .unwrap_or_else(|| ctx.source_dir())
    });

    let result = clean(&CleanOptions {
        cache_dir: cache_dir.clone(),
        downloads: args.downloads,
        source_dir: source_dir.clone(),
    })?;

    eprintln!(
        "     Removed {} build record{} from {}",
        result.entries,
        if result.entries == 1 { "" } else { "s" },
        cache_dir.display()
    );
    if args.downloads {
        eprintln!(
            "     Removed {} of downloads",
            format_bytes(result.download_bytes)
        );
    }
    if let Some(dir) = source_dir {
        eprintln!(
            "     Removed {} ({})",
            dir.display(),
            format_bytes(result.source_bytes)
        );
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
