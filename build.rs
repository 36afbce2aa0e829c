//! Renders `pbmachine.1` into `OUT_DIR`.
//!
//! The page documents every subcommand and the global `--store-dir` flag,
//! straight from the clap definitions in `src/cli/mod.rs`.

use std::env;
use std::io::Write;

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

const MAN_PAGE: &str = "pbmachine.1";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir = env::var("OUT_DIR").map(Utf8PathBuf::from)?;
    let dir = Dir::open_ambient_dir(&out_dir, ambient_authority())?;

    let mut page = Vec::new();
    Man::new(Cli::command()).render(&mut page)?;
    dir.write(MAN_PAGE, page)?;

    Ok(())
}
