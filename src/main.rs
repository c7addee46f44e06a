use clap::Parser;
use moni_agent::agent;
use moni_agent::collectors::procfs::ProcfsPlatform;
use moni_agent::collectors::system::SysinfoPlatform;
use moni_agent::config::{self, Config, OutputTarget};
use std::time::Duration;
use moni_agent::sink::{JsonLinesSink, SampleSink, SinkError};
use moni_agent::{Platform, PlatformKind, Sampler};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "moni-agent")]
#[command(version, about = "Samples load, cpu, memory, disk and network usage")]
struct Cli {
    #[arg(long, env = "MONI_CONFIG", default_value = "./moni-agent.yaml")]
    config: String,
    /// Time between samples (`300`, `5m`), overrides the config file.
    #[arg(
        long,
        visible_alias = "interval-secs",
        env = "MONI_SAMPLE_INTERVAL",
        value_parser = config::parse_interval
    )]
    interval: Option<Duration>,
    #[arg(long, env = "MONI_PLATFORM")]
    platform: Option<PlatformKind>,
    /// "stdout" or a file to append JSON lines to.
    #[arg(long, env = "MONI_OUTPUT")]
    output: Option<String>,
    /// Take one sample after the interval, write it and exit.
    #[arg(long)]
    once: bool,
    #[arg(long)]
    print_default_config: bool,
    #[arg(long)]
    print_config: bool,
    #[arg(short, long, env = "MONI_VERBOSE")]
    verbose: bool,
}

type BoxedPlatform = Box<dyn Platform + Send>;
type BoxedSink = Box<dyn SampleSink + Send>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "cannot load configuration");
            std::process::exit(1);
        }
    };
    if cli.print_config {
        println!("{}", cfg.describe());
        return;
    }

    let mut sink = match open_sink(&cfg) {
        Ok(sink) => sink,
        Err(err) => {
            error!(error = %err, output = %cfg.output, "cannot open output");
            std::process::exit(1);
        }
    };
    let mut sampler = Sampler::new(build_platform(&cfg));

    info!(
        platform = %cfg.platform,
        output = %cfg.output,
        interval = %humantime::format_duration(cfg.interval()),
        "starting moni-agent"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if cli.once {
        let task = tokio::spawn(async move {
            agent::run_once(&mut sampler, &mut sink, cfg.interval(), shutdown_rx).await
        });
        tokio::select! {
            result = task => match result {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    error!(error = %err, "cannot sample");
                    std::process::exit(1);
                }
                Err(err) => {
                    error!(error = %err, "sampling task failed");
                    std::process::exit(1);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                let _ = shutdown_tx.send(true);
                info!("received Ctrl+C, stopping");
            }
        }
        return;
    }

    let sampler_task = tokio::spawn(async move {
        agent::run(&mut sampler, &mut sink, cfg.interval(), shutdown_rx).await
    });

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "cannot wait for Ctrl+C");
    }
    info!("received Ctrl+C, stopping");

    let _ = shutdown_tx.send(true);

    match sampler_task.await {
        Ok(stats) => info!(
            written = stats.samples_written,
            failed = stats.samples_failed,
            sink_errors = stats.sink_errors,
            "sampling stopped"
        ),
        Err(err) => error!(error = %err, "sampling task failed"),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config, config::ConfigError> {
    let (mut cfg, found) = Config::load_or_default(&cli.config)?;
    if !found {
        info!(path = %cli.config, "config file not found, using defaults");
    }
    if let Some(interval) = cli.interval {
        cfg.interval_secs = interval.as_secs();
    }
    if let Some(platform) = cli.platform {
        cfg.platform = platform;
    }
    if let Some(output) = &cli.output {
        cfg.output = output.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

fn build_platform(cfg: &Config) -> BoxedPlatform {
    match cfg.platform {
        PlatformKind::Procfs => Box::new(ProcfsPlatform::new().df_timeout(cfg.df_timeout())),
        PlatformKind::Sysinfo => {
            Box::new(SysinfoPlatform::with_fs_excludes(cfg.fs_excludes.clone()))
        }
    }
}

fn open_sink(cfg: &Config) -> Result<BoxedSink, SinkError> {
    let sink: BoxedSink = match cfg.output_target() {
        OutputTarget::Stdout => Box::new(JsonLinesSink::stdout()),
        OutputTarget::File(path) => Box::new(JsonLinesSink::append(path)?),
    };
    Ok(sink)
}
