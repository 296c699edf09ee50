//! Analog clock in the top right corner. Left click to dismiss.

use anyhow::Result;
use clap::Parser;
use easel::{Atelier, backend::x11::X11};
use easel_demos::{cli::Args, clock};

pub fn main() -> Result<()> {
    let args = Args::parse();
    args.init_logging();
    let display = args.display.clone();
    let atelier = Atelier::new(move || X11::connect_to(display.as_deref()));

    let c = atelier.create_canvas(args.options(clock::options())?, clock::handlers())?;
    c.show()?;
    atelier.start_event_loop()?;
    Ok(())
}
