use std::{fs, io, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use easel::CanvasOptions;
use tracing_subscriber::EnvFilter;

/// Arguments common to every demo.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Canvas options as a TOML file. Overrides the demo's defaults.
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[clap(short, long, default_value = "info")]
    pub log_level: String,

    /// Gravity code, 1 (north-west) to 9 (south-east). Applied after
    /// `--config`.
    #[clap(short, long)]
    pub gravity: Option<i64>,

    /// Window type code: 0 normal, 1 desktop, 2 dock, 3 undecorated.
    #[clap(short, long)]
    pub window_type: Option<i64>,

    /// X display to connect to. Defaults to $DISPLAY.
    #[clap(short, long)]
    pub display: Option<String>,
}

impl Args {
    /// Install a formatting subscriber on stderr.
    pub fn init_logging(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.log_level));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }

    /// The canvas options from `--config`, or `default` when none was given,
    /// with any gravity or window type codes from the command line applied.
    pub fn options(&self, default: CanvasOptions) -> Result<CanvasOptions> {
        let mut opts = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                CanvasOptions::from_toml(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => default,
        };
        if let Some(code) = self.gravity {
            opts = opts.gravity_code(code)?;
        }
        if let Some(code) = self.window_type {
            opts = opts.window_type_code(code)?;
        }
        Ok(opts)
    }
}
