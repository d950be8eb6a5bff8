use anyhow::{anyhow, bail, Context, Result};
use pingstats::{
    config::BUILD_NAME,
    logging, platform,
    probe::{IcmpProber, ProbeSettings},
    render::{self, FilePlot, LiveRenderer, RenderMode, TerminalGuard},
    window, AppConfig, Session,
};
use ratatui::backend::CrosstermBackend;
use std::{fmt::Display, io, path::Path, path::PathBuf, str::FromStr};

const USAGE: &str = "Usage: pingstats [options] <address>\n       \
pingstats [options] --plot-file <csv> [--image <path>]\n\n\
--config <path>        TOML configuration (default: config/pingstats.toml when present)\n\
--log-dir <dir>        Directory for the CSV log (default: .)\n\
--log-name <name>      CSV log name without extension (default: PingStatsLog)\n\
--nofile               Do not write a CSV log\n\
--quiet                Log each probe at debug instead of info\n\
--delay <secs>         Minimum delay between probes (default: 0.22)\n\
--timeout <ms>         Probe timeout (default: 3000)\n\
--size <bytes>         Echo payload size (default: 64)\n\
--table-length <n>     Points kept in the live chart (default: 250)\n\
--refresh <ms>         Live chart refresh interval (default: 200)\n\
--plot-file <csv>      Chart a recorded log instead of probing\n\
--image <path>         With --plot-file, save the chart to <path> instead of showing it\n\
--version              Print version and exit";

#[derive(Debug, Default)]
struct Cli {
    config_path: Option<String>,
    address: Option<String>,
    plot_file: Option<String>,
    image: Option<String>,
    log_dir: Option<String>,
    log_name: Option<String>,
    nofile: bool,
    quiet: bool,
    delay: Option<f64>,
    timeout: Option<u64>,
    size: Option<usize>,
    table_length: Option<usize>,
    refresh: Option<u64>,
}

fn parse_number<T>(flag: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|err| anyhow!("invalid value '{value}' for {flag}: {err}"))
}

impl Cli {
    fn parse(args: &[String]) -> Result<Self> {
        let mut args = args.iter();
        let mut cli = Cli::default();

        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .cloned()
                    .ok_or_else(|| anyhow!("{flag} requires a value"))
            };
            match arg.as_str() {
                "--config" => cli.config_path = Some(value("--config")?),
                "--log-dir" => cli.log_dir = Some(value("--log-dir")?),
                "--log-name" => cli.log_name = Some(value("--log-name")?),
                "--plot-file" => cli.plot_file = Some(value("--plot-file")?),
                "--image" => cli.image = Some(value("--image")?),
                "--nofile" => cli.nofile = true,
                "--quiet" => cli.quiet = true,
                "--delay" => cli.delay = Some(parse_number("--delay", &value("--delay")?)?),
                "--timeout" => cli.timeout = Some(parse_number("--timeout", &value("--timeout")?)?),
                "--size" => cli.size = Some(parse_number("--size", &value("--size")?)?),
                "--refresh" => cli.refresh = Some(parse_number("--refresh", &value("--refresh")?)?),
                "--table-length" => {
                    cli.table_length = Some(window::parse_capacity(&value("--table-length")?)?)
                }
                "--help" | "-h" => {
                    println!("{USAGE}");
                    std::process::exit(0);
                }
                "--version" | "-V" => {
                    println!("{BUILD_NAME} Version {}", env!("CARGO_PKG_VERSION"));
                    std::process::exit(0);
                }
                other if other.starts_with("--") => bail!("unknown option '{other}'"),
                other => {
                    if cli.address.is_none() {
                        cli.address = Some(other.to_string());
                    } else {
                        bail!("unexpected argument '{other}'");
                    }
                }
            }
        }

        if cli.image.is_some() && cli.plot_file.is_none() {
            bail!("--image requires --plot-file");
        }
        Ok(cli)
    }

    fn apply(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.log_dir {
            config.log_directory = dir.clone();
        }
        if let Some(name) = &self.log_name {
            config.log_name = name.clone();
        }
        config.nofile |= self.nofile;
        config.quiet |= self.quiet;
        if let Some(delay) = self.delay {
            config.delay_seconds = delay;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_ms = timeout;
        }
        if let Some(size) = self.size {
            config.payload_size = size;
        }
        if let Some(table_length) = self.table_length {
            config.table_length = table_length;
        }
        if let Some(refresh) = self.refresh {
            config.refresh_ms = refresh;
        }
    }

    fn render_mode(&self, config: &AppConfig) -> RenderMode {
        match &self.plot_file {
            Some(csv) => RenderMode::File {
                csv_path: PathBuf::from(csv),
                image_path: self.image.as_ref().map(PathBuf::from),
            },
            None => RenderMode::Live {
                refresh: config.refresh_interval(),
            },
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = Cli::parse(&args)?;

    let mut config = match &cli.config_path {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("unable to load configuration from {path}"))?,
        None => AppConfig::load_or_default()?,
    };
    cli.apply(&mut config);
    config.validate()?;

    let title = render::window_title(&args)?;

    match cli.render_mode(&config) {
        RenderMode::File {
            csv_path,
            image_path,
        } => {
            let diagnostics = config.diagnostics_directory.as_deref().map(Path::new);
            let _guard = logging::init(&config, diagnostics)?;
            let plot = FilePlot::load(&csv_path, image_path).await?;
            plot.present(&title).await
        }
        RenderMode::Live { refresh } => {
            let address = cli
                .address
                .clone()
                .ok_or_else(|| anyhow!("an address to ping is required\n\n{USAGE}"))?;
            let diagnostics = config.diagnostics_directory.clone().unwrap_or_else(|| ".".into());
            let _guard = logging::init(&config, Some(Path::new(&diagnostics)))?;
            platform::log_platform_guidance();

            let settings = ProbeSettings::new(address)
                .with_timeout(config.timeout())
                .with_payload_size(config.payload_size)
                .with_verbose(config.verbose());
            let prober = IcmpProber::new(settings).await?;
            let renderer = LiveRenderer::new(CrosstermBackend::new(io::stdout()), refresh)?;
            let mut session = Session::open(&config, prober, renderer).await?;

            let terminal = TerminalGuard::enter(&title)?;
            let result = session.run(render::close_requested).await;
            drop(terminal);
            if let Some(recorder) = session.recorder() {
                println!("Samples logged to {}", recorder.path().display());
            }
            println!("{}", session.stats().snapshot().summary());
            result
        }
    }
}
