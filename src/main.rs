use anyhow::Result;
use clap::Parser;
use perfgate::analysis::{AnalysisConfig, CompetitionSummary, RerunController};
use perfgate::cli::{Cli, LimitsFormat};
use perfgate::limits::{JsonLimitsStore, LimitsStore, ResourceLocator, TomlLimitsStore};
use perfgate::metrics::MetricCatalog;
use perfgate::replay::ReplayFile;
use std::path::Path;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "perfgate.toml";

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(args: &Cli) -> Result<AnalysisConfig> {
    let base = match &args.config {
        Some(path) => AnalysisConfig::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG).is_file() => AnalysisConfig::from_file(DEFAULT_CONFIG)?,
        None => AnalysisConfig::default(),
    };
    let config = args.apply(base);
    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

fn build_store(args: &Cli, config: &AnalysisConfig) -> Box<dyn LimitsStore> {
    let mut locator = ResourceLocator::new();
    if let Some(dir) = &config.base_directory {
        locator = locator.with_base_dir(dir);
    }
    match args.format {
        LimitsFormat::Json => Box::new(JsonLimitsStore::new(locator)),
        LimitsFormat::Toml => Box::new(TomlLimitsStore::new(locator)),
    }
}

fn run_competition(
    controller: &RerunController<'_>,
    config: &AnalysisConfig,
    replay: ReplayFile,
    default_limits: Option<&str>,
) -> Result<CompetitionSummary> {
    let benchmarks = replay.benchmark_set(default_limits)?;
    let mut source = replay.into_source();
    Ok(controller.run(config.clone(), &benchmarks, &mut source))
}

fn print_summary(summary: &CompetitionSummary, quiet: bool) {
    let report = summary.to_report_string();
    if quiet {
        if let Some(line) = report.lines().next() {
            println!("{}", line);
        }
    } else {
        println!("{}", report);
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    let config = load_config(&args)?;
    let store = build_store(&args, &config);
    let catalog = MetricCatalog::standard();
    let controller = RerunController::new(store.as_ref(), &catalog);

    let replays = args
        .replays
        .iter()
        .map(ReplayFile::from_file)
        .collect::<Result<Vec<_>>>()?;
    let default_limits = args.limits.as_deref();

    let summaries: Vec<CompetitionSummary> = if args.parallel {
        std::thread::scope(|scope| {
            let handles: Vec<_> = replays
                .into_iter()
                .map(|replay| {
                    let (controller, config) = (&controller, &config);
                    scope.spawn(move || run_competition(controller, config, replay, default_limits))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .map_err(|_| anyhow::anyhow!("Competition thread panicked"))?
                })
                .collect::<Result<Vec<_>>>()
        })?
    } else {
        replays
            .into_iter()
            .map(|replay| run_competition(&controller, &config, replay, default_limits))
            .collect::<Result<Vec<_>>>()?
    };

    for summary in &summaries {
        print_summary(summary, args.quiet);
    }

    if summaries.iter().all(CompetitionSummary::is_success) {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
