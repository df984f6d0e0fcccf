//! Renders the `convoy.1` man page into `OUT_DIR` from the clap definitions
//! shared with the binary.

use std::io::Write;

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

const MAN_PAGE: &str = "convoy.1";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    for watched in ["build.rs", "src/cli/mod.rs"] {
        writeln!(stdout, "cargo:rerun-if-changed={watched}")?;
    }

    let out_dir = std::env::var("OUT_DIR")
        .map(Utf8PathBuf::from)
        .map_err(|err| format!("OUT_DIR is not usable: {err}"))?;

    let mut page = Vec::new();
    Man::new(cli::Cli::command()).render(&mut page)?;

    Dir::open_ambient_dir(&out_dir, ambient_authority())?.write(MAN_PAGE, page)?;
    Ok(())
}
