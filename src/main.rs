extern crate clap;
#[macro_use] extern crate log;
extern crate fern;
extern crate chrono;
extern crate term_grid;
extern crate image;

pub mod assembler;
pub mod output;

use clap::{Arg, ArgMatches, App};
use term_grid::{Grid, GridOptions, Direction, Filling, Cell};

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use assembler::format::FORMATS;
use assembler::parser::{Program, DEFAULT_MAX_LINE_LENGTH};
use assembler::{Assembler, Instruction, Word};
use output::OutputFormat;

fn main() {
    let args = process_arguments();
    initialize_logging(args.occurrences_of("verbose"));

    debug!("Arguments:\n\tVerbosity: {}\n\tFormat: {}\n\tMax line length: {}\n\tOutfile: {}\n\tInfile: {}",
        level_filter(args.occurrences_of("verbose")),
        args.value_of("format").unwrap_or("png"),
        args.value_of("max-line-length").unwrap_or("default"),
        args.value_of("output").unwrap_or("None"),
        args.value_of("INPUT").unwrap_or("None")
    );

    if let Err(message) = run(&args) {
        error!("fatal: {}", message);
        std::process::exit(1);
    }
}

fn run(args: &ArgMatches) -> Result<(), String> {
    let format: OutputFormat = args.value_of("format").unwrap_or("png").parse()?;

    let max_line_length = match args.value_of("max-line-length") {
        Some(n) => n.parse::<usize>()
            .map_err(|err| format!("invalid maximum line length `{}`: {}", n, err))?,
        None => DEFAULT_MAX_LINE_LENGTH,
    };

    let ipath = Path::new(args.value_of("INPUT").ok_or("no input file given")?);
    let ifile = File::open(ipath)
        .map_err(|err| format!("unable to open input file `{}`: {}", ipath.display(), err))?;

    let assembler = Assembler::default().max_line_length(max_line_length);
    let program = assembler.scan(BufReader::new(ifile))
        .map_err(|err| format!("{}: {}", ipath.display(), err))?;
    let words = program.emit()
        .map_err(|err| format!("{}: {}", ipath.display(), err))?;
    info!("assembled {} word(s)", words.len());

    if args.is_present("print-debug") {
        print_listing(&program, &words);
    }

    // Serialize fully before touching the output file, so nothing is
    // written on failure.
    let mut bytes = Vec::new();
    format.write(&words, &mut bytes).map_err(|err| err.to_string())?;

    let opath = match args.value_of("output") {
        Some(filename) => PathBuf::from(filename),
        None => {
            let stem = ipath.file_stem().ok_or("input path has no file name")?;
            Path::new(stem).with_extension(format.extension())
        },
    };

    fs::write(&opath, &bytes)
        .map_err(|err| format!("unable to write output file `{}`: {}", opath.display(), err))?;
    info!("wrote {} byte(s) to `{}`", bytes.len(), opath.display());
    Ok(())
}

fn print_listing(program: &Program, words: &[Word]) {
    let mut grid = Grid::new(GridOptions {
        filling:     Filling::Spaces(1),
        direction:   Direction::LeftToRight,
    });

    for (idx, (line, word)) in program.lines().iter().zip(words.iter()).enumerate() {
        let ins = Instruction::disassemble(*word);
        let source = line.tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" ");
        let mnemonic = FORMATS.mnemonic(ins.shape(), ins.opcode()).unwrap_or("?");

        grid.add(Cell::from(format!("0x{:04X}:", idx)));
        grid.add(Cell::from(format!("{:>4}", line.number)));
        grid.add(Cell::from(source));
        grid.add(Cell::from("=>".to_string()));
        grid.add(Cell::from(format!("0x{:06X}", word)));
        grid.add(Cell::from(format!("{} {}", mnemonic, ins)));
    }

    println!("{}", grid.fit_into_columns(6));
}

fn process_arguments() -> ArgMatches<'static> {
    App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(Arg::with_name("INPUT")
            .help("Sets the input file to use")
            .required(true)
            .multiple(false)
            .index(1))
        .arg(Arg::with_name("verbose")
            .short("v")
            .multiple(true)
            .takes_value(false)
            .help("Sets the level of verbosity"))
        .arg(Arg::with_name("output")
            .short("o")
            .takes_value(true)
            .help("write output to an outfile"))
        .arg(Arg::with_name("format")
            .short("f")
            .takes_value(true)
            .possible_values(&["raw", "png"])
            .help("output format: the raw word stream or a 256x256 PNG raster (default)"))
        .arg(Arg::with_name("max-line-length")
            .short("l")
            .takes_value(true)
            .help("longest accepted source line in bytes (default 256)"))
        .arg(Arg::with_name("print-debug")
            .short("d")
            .alias("show")
            .alias("s")
            .takes_value(false)
            .help("prints the debug information alongside the assembly to STDOUT"))
        .get_matches()
}

fn level_filter(verbosity: u64) -> log::LevelFilter {
    match verbosity {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

fn initialize_logging(verbosity: u64) {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level_filter(verbosity))
        .chain(std::io::stderr())
        .apply().ok();
}
