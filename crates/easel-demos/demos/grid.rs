//! One tile per gravity. Press q or Escape on a tile to quit.

use std::io;

use anyhow::Result;
use clap::Parser;
use easel::{Atelier, backend::x11::X11};
use easel_demos::{cli::Args, grid};

pub fn main() -> Result<()> {
    let args = Args::parse();
    args.init_logging();
    let display = args.display.clone();
    let atelier = Atelier::new(move || X11::connect_to(display.as_deref()));

    let tiles = grid::build(&atelier, &args.options(grid::base())?)?;
    tracing::info!("{} tiles up, press q on any of them to quit", tiles.len());
    atelier.print_canvas_table(&mut io::stdout())?;
    drop(tiles);
    atelier.start_event_loop()?;
    Ok(())
}
