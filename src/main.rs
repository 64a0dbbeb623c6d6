use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use refcat::{Engine, Options, Report};

/// Concatenate the files listed on stdin, one path per line, onto TARGET.
/// Extents are shared with reflinks where the filesystem supports it;
/// anything that can't be linked is copied in full.
#[derive(Parser, Debug)]
#[clap(version, about)]
struct Args {
    /// File to append to. Created with mode 0644 if it doesn't exist, never truncated
    #[clap(value_parser)]
    target: Option<PathBuf>,

    /// Always copy bytes, never attempt to share extents
    #[clap(long)]
    no_clone: bool,

    /// Print a one line summary to stderr when done
    #[clap(long)]
    summary: bool,

    /// Log progress to stderr (-v info, -vv debug)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    refcat::trace::init(args.verbose);

    let Some(target) = args.target else {
        eprintln!("No target specified");
        return ExitCode::from(1);
    };

    let options = Options {
        clone: !args.no_clone,
    };

    match run(target, options) {
        Ok(report) => {
            if args.summary {
                print_summary(&report);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("refcat: {}", err);
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(target: PathBuf, options: Options) -> Result<Report, refcat::Error> {
    let mut engine = Engine::with_options(&target, options)?;
    engine.run(io::stdin().lock())
}

fn print_summary(report: &Report) {
    eprintln!(
        "{} sources: {} cloned, {} copied, {} blank lines skipped, {} bytes",
        report.sources(),
        report.cloned,
        report.copied,
        report.skipped,
        report.bytes
    );
}
