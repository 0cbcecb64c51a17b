use std::io;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::{debug, LevelFilter};

use layover::progress::Spinner;
use layover::{input, read_image, report, ReportOptions};

#[derive(Parser)]
#[command(name = "layover")]
#[command(about = "Find duplicated bytes across container image layers")]
#[command(version)]
struct Cli {
    /// Path to a `docker save` archive, or `-` for stdin
    #[arg(default_value = "-")]
    archive: String,

    /// Hide layer pairs saving this many KiB or less
    #[arg(short = 'l', long, default_value_t = 10)]
    min_save: u64,

    /// Max number of duplicated files listed per layer pair
    #[arg(short = 'M', long, default_value_t = 10)]
    max_files: usize,

    /// Stop listing files at the first one of this many KiB or less
    #[arg(short = 'm', long, default_value_t = 10)]
    min_file_size: u64,

    /// Report line width
    #[arg(short = 'w', long, default_value_t = 100)]
    width: usize,

    /// Verbose mode (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_env(Env::default())
        .filter_level(log_level)
        .init();

    let opts = ReportOptions {
        min_save_bytes: cli.min_save * 1024,
        max_files_shown: cli.max_files,
        min_file_size_shown: cli.min_file_size * 1024,
        display_width: cli.width,
    };
    debug!("report options: {opts:?}");

    let reader = input::open(&cli.archive)?;

    // The spinner and log lines would fight over stderr, so verbose runs go
    // without one.
    let spinner = (cli.verbose == 0).then(|| Spinner::new("Reading archive ..."));

    let images = match read_image(reader) {
        Ok(images) => images,
        Err(err) => {
            if let Some(spinner) = spinner {
                spinner.abandon();
            }
            return Err(err);
        }
    };

    if let Some(spinner) = spinner {
        let layer_count: usize = images.values().map(|layers| layers.len()).sum();
        spinner.finish(format!(
            "Indexed {layer_count} layers across {} tagged image(s)",
            images.len()
        ));
    }

    let mut stdout = io::stdout().lock();
    report::render(&mut stdout, &images, &opts)
}
