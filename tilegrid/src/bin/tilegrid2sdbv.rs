use std::env;
use std::error::Error;
use std::path::{Path, PathBuf};

use clap::Parser;
use nix::unistd::{AccessFlags, access};
use sdbv_datafile::{OutputStyle, RangesFormat, WriteOptions};
use sdbv_tilegrid::{convert, read_tilegrid};
use simple_error::bail;

#[derive(Debug, Parser)]
#[command(
    name = "tilegrid2sdbv",
    about = "Convert an FPGA tile-grid description to an SDBV data file."
)]
struct Args {
    /// Output directory; enables splitting row data into .data files.
    #[arg(short = 'O', long)]
    output_dir: Option<PathBuf>,
    /// Name of the main output file.
    #[arg(short = 'o', long)]
    output_file_name: String,
    /// Tile-grid description file.
    #[arg(long)]
    input: PathBuf,
}

fn check_output_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    if !path.is_dir() {
        bail!("{}: not a directory", path.display());
    }
    if access(path, AccessFlags::W_OK).is_err() {
        bail!("{}: not writable", path.display());
    }
    Ok(())
}

fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    if let Some(dir) = &args.output_dir {
        check_output_dir(dir)?;
    }

    let tilegrid = read_tilegrid(&args.input)?;
    let mut df = convert(&tilegrid);

    if args.output_dir.is_some() {
        let (stem, ext) = split_ext(&args.output_file_name);
        for (name, grid) in &mut df.grids {
            let infix = if name.is_empty() {
                String::new()
            } else {
                format!(".{name}")
            };
            grid.cells.data.split_into(format!("./{stem}{infix}.data{ext}"));
        }
    }

    let out_dir = match args.output_dir {
        Some(dir) => dir,
        None => env::current_dir()?,
    };
    let opts = WriteOptions {
        style: OutputStyle::Pretty,
        ranges: RangesFormat::Single,
    };
    let files = df.write_files(&args.output_file_name, &out_dir, opts)?;
    for file in files {
        println!("{}", file.display());
    }
    Ok(())
}
