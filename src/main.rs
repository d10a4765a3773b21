//! # mzindex
//!
//! Inspect, index and repair MGF and MSP spectrum files.
//!
//! ```bash
//! # Summarize the index of a file
//! mzindex index run.mgf
//!
//! # Print one spectrum by title
//! mzindex fetch run.mgf "scan=1234"
//!
//! # Remove repeated titles in place
//! mzindex dedup run.mgf
//! ```
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use log::error;

use mzindex::io::{
    build_index, infer_dialect, read_spectra_as, ChargeRange, Completion, Dialect, FileIndex,
    FileSurgeon, LogProgress, ReplaceStrategy, SpectrumFileResult, SpectrumReader, SurgeryReport,
};
use mzindex::SpectrumRecord;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Mgf,
    Msp,
}

/// Index, query and repair MGF and MSP spectrum files
#[derive(Parser)]
#[command(name = "mzindex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// The file format, inferred from the file when omitted
    #[arg(short, long, value_enum, global = true)]
    format: Option<Format>,

    /// Replace rewritten files with a single rename instead of delete then rename
    #[arg(long, global = true)]
    atomic: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index and print its summary
    Index {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Also list every title with its byte offset
        #[arg(long)]
        titles: bool,
    },

    /// Print one spectrum, looked up by title
    Fetch {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(value_name = "TITLE")]
        title: String,

        /// Only print the precursor
        #[arg(long)]
        precursor_only: bool,
    },

    /// Read every spectrum and print a one line summary of each
    Extract {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Remove every record whose title repeats an earlier one
    Dedup {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Append " (n)" to repeated titles
    RenameDuplicates {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Give untitled records a "Spectrum n" title
    AddTitles {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Add a charge line to records without one
    AddCharges {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, default_value = "2")]
        min_charge: u32,

        #[arg(long, default_value = "4")]
        max_charge: u32,
    },

    /// Remove peaks with an intensity of zero
    RemoveZeros {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Split a file into parts of at most N spectra
    Split {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(short = 'n', long, default_value = "10000")]
        max_spectra: usize,
    },
}

fn dialect_for(format: Option<Format>, path: &Path) -> SpectrumFileResult<Dialect> {
    match format {
        #[cfg(feature = "mgf")]
        Some(Format::Mgf) => Ok(Dialect::MGF),
        #[cfg(feature = "msp")]
        Some(Format::Msp) => Ok(Dialect::MSP),
        #[allow(unreachable_patterns)]
        _ => infer_dialect(path),
    }
}

fn print_index(index: &FileIndex, titles: bool) {
    println!("file: {}", index.file_name());
    println!("spectra: {}", index.spectrum_count());
    println!("titled spectra: {}", index.len());
    println!("duplicated titles: {}", index.duplicate_titles().len());
    match index.rt_range() {
        Some((lo, hi)) => println!("retention time: {lo} - {hi}"),
        None => println!("retention time: none"),
    }
    if let Some(mz) = index.max_precursor_mz() {
        println!("max precursor m/z: {mz}");
    }
    if let Some(intensity) = index.max_precursor_intensity() {
        println!("max precursor intensity: {intensity}");
    }
    println!("max charge: {}", index.max_charge());
    println!("max peak count: {}", index.max_peak_count());
    println!("peak picked: {}", index.peak_picked());
    println!("charges missing: {}", index.precursor_charges_missing());
    if let Some(modified) = index.last_modified() {
        println!("last modified: {}", modified.to_rfc3339());
    }
    if titles {
        for (title, offset) in index.iter() {
            println!("{offset}\t{title}");
        }
    }
}

fn describe(record: &SpectrumRecord) -> String {
    let charges: Vec<String> = record
        .precursor
        .charges
        .iter()
        .map(|z| z.to_string())
        .collect();
    let rt = record
        .precursor
        .retention_time
        .map(|rt| rt.to_string())
        .unwrap_or_default();
    format!(
        "{}\t{}\t{}\t{}\t{}",
        record.title,
        record.precursor.mz,
        charges.join(","),
        rt,
        record.len()
    )
}

fn report(completion: Completion<SurgeryReport>, file: &Path) {
    match completion {
        Completion::Finished(report) => println!(
            "{}: {} records, {} modified, {} removed, {} lines removed",
            file.display(),
            report.records,
            report.modified,
            report.removed,
            report.lines_removed
        ),
        Completion::Cancelled => println!("{}: cancelled, file left unchanged", file.display()),
    }
}

fn run(cli: Cli) -> SpectrumFileResult<()> {
    let strategy = if cli.atomic {
        ReplaceStrategy::AtomicRename
    } else {
        ReplaceStrategy::DeleteThenRename
    };
    let surgeon = |dialect: Dialect, label: &str| {
        FileSurgeon::new(dialect)
            .with_replace_strategy(strategy)
            .with_progress(LogProgress::new(label))
    };

    match cli.command {
        Commands::Index { file, titles } => {
            let dialect = dialect_for(cli.format, &file)?;
            let index = build_index(&file, dialect, LogProgress::new("indexing"))?;
            print_index(&index, titles);
        }
        Commands::Fetch {
            file,
            title,
            precursor_only,
        } => {
            let dialect = dialect_for(cli.format, &file)?;
            let index = build_index(&file, dialect, LogProgress::new("indexing"))?;
            let mut reader = SpectrumReader::open_path_as(&file, dialect)?;
            reader.set_index(index);
            if precursor_only {
                match reader.get_precursor_by_title(&title)? {
                    Some(precursor) => println!("{precursor:?}"),
                    None => println!("{title} not found"),
                }
            } else {
                match reader.get_spectrum_by_title(&title)? {
                    Some(record) => {
                        println!("{}", describe(&record));
                        for peak in record.peaks.iter() {
                            println!("{}\t{}", peak.mz, peak.intensity);
                        }
                    }
                    None => println!("{title} not found"),
                }
            }
        }
        Commands::Extract { file } => {
            let dialect = dialect_for(cli.format, &file)?;
            for record in read_spectra_as(&file, dialect)? {
                println!("{}", describe(&record));
            }
        }
        Commands::Dedup { file } => {
            let dialect = dialect_for(cli.format, &file)?;
            report(surgeon(dialect, "dedup").remove_duplicate_titles(&file)?, &file);
        }
        Commands::RenameDuplicates { file } => {
            let dialect = dialect_for(cli.format, &file)?;
            report(surgeon(dialect, "rename").rename_duplicate_titles(&file)?, &file);
        }
        Commands::AddTitles { file } => {
            let dialect = dialect_for(cli.format, &file)?;
            report(surgeon(dialect, "titles").add_missing_titles(&file)?, &file);
        }
        Commands::AddCharges {
            file,
            min_charge,
            max_charge,
        } => {
            let dialect = dialect_for(cli.format, &file)?;
            let completion = surgeon(dialect, "charges")
                .with_charge_range(ChargeRange::new(min_charge, max_charge))
                .add_missing_charges(&file)?;
            report(completion, &file);
        }
        Commands::RemoveZeros { file } => {
            let dialect = dialect_for(cli.format, &file)?;
            report(surgeon(dialect, "zeros").remove_zero_intensity_peaks(&file)?, &file);
        }
        Commands::Split { file, max_spectra } => {
            let dialect = dialect_for(cli.format, &file)?;
            match surgeon(dialect, "split").split_file(&file, max_spectra)? {
                Completion::Finished(parts) => {
                    for index in parts {
                        println!("{}\t{}", index.file_name(), index.spectrum_count());
                    }
                }
                Completion::Cancelled => {
                    println!("{}: cancelled, no parts written", file.display())
                }
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
