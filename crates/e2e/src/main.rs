//! transfer-e2e - run the money-transfer scenarios

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use transfer_e2e::{DriverKind, NavigationMode, SuiteConfig, SuiteResult, SuiteRunner};

#[derive(Parser)]
#[command(name = "transfer-e2e")]
#[command(about = "End-to-end scenarios for the money-transfer page")]
#[command(version)]
struct Cli {
    /// Suite configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of YAML scenarios, instead of the built-in suite
    #[arg(long)]
    scenarios: Option<PathBuf>,

    /// Run only the scenario with this name
    #[arg(long, conflicts_with = "tag")]
    name: Option<String>,

    /// Run only scenarios with this tag
    #[arg(long)]
    tag: Option<String>,

    /// Port for the content host
    #[arg(short, long)]
    port: Option<u16>,

    /// Page driver
    #[arg(long, value_enum)]
    driver: Option<DriverKind>,

    /// How the page is loaded
    #[arg(long, value_enum)]
    navigation: Option<NavigationMode>,

    /// Directory for test-results.json
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Cli {
    /// File configuration with command-line overrides applied
    fn suite_config(&self) -> anyhow::Result<SuiteConfig> {
        let mut config = match &self.config {
            Some(path) => SuiteConfig::from_file(path)?,
            None => SuiteConfig::default(),
        };

        if let Some(dir) = &self.scenarios {
            config.scenarios_dir = Some(dir.clone());
        }
        if let Some(port) = self.port {
            config.host.port = port;
        }
        if let Some(driver) = self.driver {
            config.driver = driver;
        }
        if let Some(navigation) = self.navigation {
            config.navigation = navigation;
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

async fn run_selected(runner: &mut SuiteRunner, cli: &Cli) -> anyhow::Result<SuiteResult> {
    let result = match (&cli.name, &cli.tag) {
        (Some(name), _) => {
            let single = runner.run_named(name).await?;
            SuiteResult {
                total: 1,
                passed: usize::from(single.success),
                failed: usize::from(!single.success),
                duration_ms: single.duration_ms,
                results: vec![single],
            }
        }
        (None, Some(tag)) => runner.run_tagged(tag).await?,
        (None, None) => runner.run_all().await?,
    };
    Ok(result)
}

async fn run(cli: &Cli) -> anyhow::Result<SuiteResult> {
    let mut runner = SuiteRunner::new(cli.suite_config()?);

    // The host is stopped on every path, including a failed selection.
    let selected = run_selected(&mut runner, cli).await;
    runner.stop_host().await?;

    let result = selected?;
    runner.write_results(&result)?;
    Ok(result)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match run(&cli).await {
        Ok(result) if result.all_passed() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}
