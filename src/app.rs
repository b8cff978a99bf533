use crate::archive::Archive;
use crate::cli::{Cli, Command};
use crate::error::Result;
use crate::filter::{FilterFlags, NameFilter, DEFAULT_EXCLUDE};
use crate::store::summary::SUMMARY_MODALITIES;
use clap::Parser;

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    logger.format_timestamp_secs();
    if let Some(level) = cli.log_level {
        logger.filter_level(level);
    }
    let _ = logger.try_init();

    if let Command::Filter {
        names,
        include,
        exclude,
        case_sensitive,
    } = &cli.command
    {
        return filter_names(names, include, exclude, *case_sensitive);
    }

    let archive = Archive::open(cli.config())?;
    dispatch(&archive, cli.command)?;
    archive.close()
}

fn dispatch(archive: &Archive, command: Command) -> Result<()> {
    match command {
        Command::Init => archive.recreate_tables()?,
        Command::Rebuild {
            patient,
            all,
            no_check,
        } => {
            let scanned = archive.rebuild_from_files(patient.as_deref(), !all, !no_check)?;
            println!("Scanned {scanned} files");
        }
        Command::Store { path, remove } => {
            if path.is_dir() {
                let stored = archive.store_directory(&path, remove)?;
                println!("Stored {stored} files");
            } else {
                let outcome = archive.store_file(&path, remove)?;
                println!("{}: {outcome:?}", path.display());
            }
        }
        Command::Delete { selection, files } => {
            let report = archive.delete(&selection.selection()?, files)?;
            println!(
                "Deleted {} images, {} series, {} studies, {} patients, {} files",
                report.images, report.series, report.studies, report.patients, report.files
            );
        }
        Command::Copy {
            selection,
            dest,
            by_patient,
        } => {
            let copied = archive.copy_files(&selection.selection()?, &dest, true, by_patient)?;
            println!("Copied {copied} files to {}", dest.display());
        }
        Command::Summary { order_by } => {
            let summary = archive.series_summary(&order_by)?;
            print!("   {:<14}", "PatientID");
            for modality in SUMMARY_MODALITIES {
                print!("{:>10}", format!("nr{modality}"));
            }
            println!();
            for (index, patient) in summary.iter().enumerate() {
                print!("{:<3}{:<14}", index + 1, patient.patient_id);
                for (_, count) in &patient.counts {
                    print!("{count:>10}");
                }
                println!();
            }
        }
        Command::Query { sql } => match archive.execute_query(&sql) {
            Some(rows) => {
                for row in rows {
                    let line = row
                        .iter()
                        .map(|(column, value)| format!("{column}={}", value.unwrap_or("NULL")))
                        .collect::<Vec<_>>()
                        .join("\t");
                    println!("{line}");
                }
            }
            None => eprintln!("Query failed, see the log for details"),
        },
        Command::Filter { .. } => {}
    }
    Ok(())
}

fn filter_names(
    names: &[String],
    include: &[String],
    exclude: &[String],
    case_sensitive: bool,
) -> Result<()> {
    let flags = FilterFlags {
        case_insensitive: !case_sensitive,
        ..FilterFlags::default()
    };
    let exclude: Vec<&str> = if exclude.is_empty() {
        DEFAULT_EXCLUDE.to_vec()
    } else {
        exclude.iter().map(String::as_str).collect()
    };
    let mut filter = NameFilter::pass_through();
    filter.configure(&exclude, include, flags)?;
    for name in filter.filter(names) {
        println!("{name}");
    }
    Ok(())
}
