// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod render;

use adgrid_api::ApiClient;
use adgrid_engine::{GridBackend, GridConfig, GridContext, GridRuntime};
use adgrid_model::{BreakdownLevel, EntityKind, EntityRef};
use adgrid_testkit::{DemoBackend, demo_columns};
use anyhow::{Context, Result, anyhow, bail};
use config::Config;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DEMO_SEED: u64 = 42;
const DEMO_POLL_INTERVAL: Duration = Duration::from_millis(200);

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `adgrid --print-example-config` to generate a v1 template",
            options.config_path.display()
        )
    })?;
    init_logging(&config.log_filter())?;

    let grid_level = grid_level_for(options.entity)?;
    let levels = match &options.breakdown {
        Some(levels) => levels.clone(),
        None => default_breakdown(grid_level),
    };
    let base = levels
        .first()
        .copied()
        .context("--breakdown needs at least one level")?;
    let mut grid = GridConfig::new(options.entity, grid_level, levels, demo_columns(base))
        .with_context(|| {
            format!(
                "invalid --breakdown for a {} grid; breakdowns must descend from it",
                grid_level.as_str()
            )
        })?;
    grid.currency = config.currency();
    grid.can_edit_archived = config.can_edit_archived();
    grid.page_size = config.page_size();
    grid.expanded_depth = config.expanded_depth();
    let context = GridContext::new(grid)?;

    let mut show = ShowOptions {
        expand_all: options.expand_all,
        sync: options.sync,
        poll_interval: config.sync_poll_interval()?,
    };

    if options.demo {
        if options.check_only {
            return Ok(());
        }
        let mut backend = DemoBackend::new(DEMO_SEED);
        backend.script_sync([true, true]);
        show.poll_interval = DEMO_POLL_INTERVAL;
        return show_grid(context, backend, &show);
    }

    let client =
        ApiClient::new(config.api_base_url(), config.api_timeout()?).with_context(|| {
            format!(
                "invalid [api] config in {}; fix base_url/timeout values",
                options.config_path.display()
            )
        })?;
    if options.check_only {
        return Ok(());
    }
    show_grid(context, client, &show)
}

fn init_logging(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(filter).with_context(|| {
        format!("invalid log filter {filter:?}; set ADGRID_LOG or [logging].filter to e.g. warn")
    })?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|error| anyhow!("install log subscriber: {error}"))
}

#[derive(Debug, Clone, Copy)]
struct ShowOptions {
    expand_all: bool,
    sync: bool,
    poll_interval: Duration,
}

fn show_grid<B: GridBackend>(
    context: GridContext,
    backend: B,
    options: &ShowOptions,
) -> Result<()> {
    let mut runtime =
        GridRuntime::new(context, backend).with_poll_interval(Some(options.poll_interval));
    runtime.context_mut().load();
    runtime.run_until_idle()?;

    if options.expand_all {
        runtime.context_mut().expand_all();
        runtime.run_until_idle()?;
    }

    if options.sync {
        if !runtime.context_mut().trigger_sync() {
            bail!("--sync needs an entity grid; pass --entity KIND:ID");
        }
        runtime.run_until_idle()?;
        info!("waiting for sync to finish");
        while runtime.context().is_syncing() {
            if !runtime.pump_blocking(options.poll_interval * 2) {
                debug!("no sync status yet");
            }
            runtime.run_until_idle()?;
        }
    }

    print!("{}", render::render_grid(runtime.context()));
    if runtime.context().is_syncing() {
        println!("sync in progress; rerun with --sync to wait for fresh numbers");
    } else if let Some(date) = runtime.context().last_sync_date() {
        println!("last synced {date}");
    }
    Ok(())
}

fn grid_level_for(entity: Option<EntityRef>) -> Result<BreakdownLevel> {
    let Some(entity) = entity else {
        return Ok(BreakdownLevel::AllAccounts);
    };
    match entity.kind {
        EntityKind::Account => Ok(BreakdownLevel::Account),
        EntityKind::Campaign => Ok(BreakdownLevel::Campaign),
        EntityKind::AdGroup => Ok(BreakdownLevel::AdGroup),
        EntityKind::ContentAd => {
            bail!("content ads have no breakdowns -- pass an account, campaign or ad_group entity")
        }
    }
}

fn default_breakdown(grid_level: BreakdownLevel) -> Vec<BreakdownLevel> {
    match grid_level {
        BreakdownLevel::AllAccounts => vec![BreakdownLevel::Account, BreakdownLevel::Campaign],
        BreakdownLevel::Account => vec![BreakdownLevel::Campaign, BreakdownLevel::AdGroup],
        BreakdownLevel::Campaign => vec![BreakdownLevel::AdGroup, BreakdownLevel::Source],
        _ => vec![BreakdownLevel::ContentAd],
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_example: bool,
    check_only: bool,
    demo: bool,
    entity: Option<EntityRef>,
    breakdown: Option<Vec<BreakdownLevel>>,
    expand_all: bool,
    sync: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_example: false,
        check_only: false,
        demo: false,
        entity: None,
        breakdown: None,
        expand_all: false,
        sync: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--entity" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--entity requires KIND:ID, for example account:1"))?;
                let entity = EntityRef::parse(value.as_ref()).ok_or_else(|| {
                    anyhow!(
                        "invalid --entity {:?}; use KIND:ID with KIND one of account, campaign, ad_group",
                        value.as_ref()
                    )
                })?;
                options.entity = Some(entity);
            }
            "--breakdown" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--breakdown requires a comma-separated level list"))?;
                options.breakdown = Some(parse_breakdown(value.as_ref())?);
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--expand-all" => {
                options.expand_all = true;
            }
            "--sync" => {
                options.sync = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn parse_breakdown(raw: &str) -> Result<Vec<BreakdownLevel>> {
    let levels = raw
        .split(',')
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .map(|level| {
            BreakdownLevel::parse(level).ok_or_else(|| {
                anyhow!(
                    "unknown breakdown {level:?}; use account, campaign, ad_group, source, publisher or content_ad"
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;
    if levels.is_empty() {
        bail!("--breakdown needs at least one level");
    }
    Ok(levels)
}

fn print_help() {
    println!("adgrid");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a v1 config template");
    println!("  --entity <kind:id>       Root the grid at an entity (default: all accounts)");
    println!("  --breakdown <a,b,...>    Breakdown levels below the grid level");
    println!("  --expand-all             Expand every breakdown level before printing");
    println!("  --sync                   Start a sync and wait for it before printing");
    println!("  --demo                   Use generated demo data instead of the API");
    println!("  --check                  Validate config and grid setup, then exit");
    println!("  --help                   Show this help");
}

#[cfg(test)]
mod tests {
    use super::{CliOptions, default_breakdown, grid_level_for, parse_cli_args};
    use adgrid_model::{BreakdownLevel, EntityRef};
    use anyhow::Result;
    use std::path::PathBuf;

    fn default_options_path() -> PathBuf {
        PathBuf::from("/tmp/adgrid-config.toml")
    }

    #[test]
    fn parse_cli_args_defaults_to_provided_config_path() -> Result<()> {
        let options = parse_cli_args(Vec::<String>::new(), default_options_path())?;
        assert_eq!(
            options,
            CliOptions {
                config_path: default_options_path(),
                print_config_path: false,
                print_example: false,
                check_only: false,
                demo: false,
                entity: None,
                breakdown: None,
                expand_all: false,
                sync: false,
                show_help: false,
            }
        );
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_config_path_override() -> Result<()> {
        let options = parse_cli_args(
            vec!["--config", "/custom/config.toml"],
            default_options_path(),
        )?;
        assert_eq!(options.config_path, PathBuf::from("/custom/config.toml"));
        Ok(())
    }

    #[test]
    fn parse_cli_args_errors_for_missing_values() {
        for flag in ["--config", "--entity", "--breakdown"] {
            let error = parse_cli_args(vec![flag], default_options_path())
                .expect_err("missing value should fail");
            assert!(error.to_string().contains("requires"), "{flag}: {error}");
        }
    }

    #[test]
    fn parse_cli_args_errors_for_unknown_argument() {
        let error = parse_cli_args(vec!["--wat"], default_options_path())
            .expect_err("unknown arg should fail");
        let message = error.to_string();
        assert!(message.contains("unknown argument"));
        assert!(message.contains("--help"));
    }

    #[test]
    fn parse_cli_args_reads_grid_selection() -> Result<()> {
        let options = parse_cli_args(
            vec![
                "--entity",
                "campaign:12",
                "--breakdown",
                "ad_group, publisher",
                "--expand-all",
                "--demo",
            ],
            default_options_path(),
        )?;
        assert_eq!(options.entity, EntityRef::parse("campaign:12"));
        assert_eq!(
            options.breakdown,
            Some(vec![BreakdownLevel::AdGroup, BreakdownLevel::Publisher])
        );
        assert!(options.expand_all);
        assert!(options.demo);
        assert!(!options.sync);
        Ok(())
    }

    #[test]
    fn parse_cli_args_rejects_bad_entity_and_breakdown() {
        let error = parse_cli_args(vec!["--entity", "account"], default_options_path())
            .expect_err("entity without id should fail");
        assert!(error.to_string().contains("KIND:ID"));

        let error = parse_cli_args(vec!["--breakdown", "campaign,region"], default_options_path())
            .expect_err("unknown level should fail");
        assert!(error.to_string().contains("unknown breakdown \"region\""));

        let error = parse_cli_args(vec!["--breakdown", " , "], default_options_path())
            .expect_err("empty list should fail");
        assert!(error.to_string().contains("at least one level"));
    }

    #[test]
    fn parse_cli_args_sets_print_and_check_flags() -> Result<()> {
        let options = parse_cli_args(
            vec!["--print-config-path", "--print-example-config", "--check", "--sync"],
            default_options_path(),
        )?;
        assert!(options.print_config_path);
        assert!(options.print_example);
        assert!(options.check_only);
        assert!(options.sync);
        assert!(!options.show_help);
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_help_flag_for_long_and_short_variants() -> Result<()> {
        assert!(parse_cli_args(vec!["--help"], default_options_path())?.show_help);
        assert!(parse_cli_args(vec!["-h"], default_options_path())?.show_help);
        Ok(())
    }

    #[test]
    fn grid_level_follows_the_entity() -> Result<()> {
        assert_eq!(grid_level_for(None)?, BreakdownLevel::AllAccounts);
        assert_eq!(
            grid_level_for(EntityRef::parse("ad_group:3"))?,
            BreakdownLevel::AdGroup
        );
        let error = grid_level_for(EntityRef::parse("content_ad:9"))
            .expect_err("content ad grids have no breakdowns");
        assert!(error.to_string().contains("no breakdowns"));
        assert_eq!(
            default_breakdown(BreakdownLevel::Account),
            vec![BreakdownLevel::Campaign, BreakdownLevel::AdGroup]
        );
        Ok(())
    }
}
