//! `omnibuild plan` command

use anyhow::{Context, Result};

use crate::cli::PlanArgs;
use crate::commands::Settings;
use omnibuild::builder::BuildCache;
use omnibuild::ops::{format_list, format_plan, load_graph, plan};
use omnibuild::util::diagnostic::{emit, Diagnostic};
use omnibuild::util::GlobalContext;

pub fn execute(args: PlanArgs, ctx: &GlobalContext) -> Result<()> {
    let settings = Settings::resolve(ctx, &args.recipes)?;
    let graph = load_graph(&settings.recipes_dir, &settings.platform, &settings.versions)?;

    if args.list {
        print!("{}", format_list(&graph));
        if let Err(e) = graph.validate() {
            emit(&Diagnostic::warning(e.to_string()), ctx.color());
        }
        return Ok(());
    }

    let Some(target) = args.target else {
        anyhow::bail!("no component given");
    };

    if args.dot {
        // Resolve first so unknown names and cycles still fail
        graph.resolve_order(&target)?;
        print!("{}", graph.to_dot());
        return Ok(());
    }

    let mut cache = BuildCache::persistent(settings.cache_dir.join("builds"))?;
    let entries = plan(
        &graph,
        &target,
        &mut cache,
        &settings.install_dir,
        &settings.platform,
    )?;

    if args.json {
        let json = serde_json::to_string_pretty(&entries).context("failed to serialize plan")?;
        println!("{}", json);
    } else {
        eprintln!("    Planning {} for {}", target, settings.platform);
        print!("{}", format_plan(&entries));
    }

    Ok(())
}
