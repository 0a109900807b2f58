use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::error;

use shepherd::config::Config;
use shepherd::db::{AttendanceStatus, Database, StudentFields, StudentFilter, StudentUpdate};
use shepherd::export::{self, ExportFormat};
use shepherd::import::{self, ImportMode, ImportReport, Reconciler};
use shepherd::logging;

#[derive(Debug, PartialEq)]
enum Command {
    Init,
    Import { file: PathBuf, mode: ImportMode },
    Export { file: PathBuf },
    Students { filter: StudentFilter },
    Student { id: i64 },
    AddStudent { fields: StudentFields },
    Update { id: i64, update: StudentUpdate },
    Mark { id: i64, status: String, date: Option<NaiveDate> },
    MarkBatch { date: Option<NaiveDate>, entries: Vec<(i64, String)> },
    Delete { id: i64 },
    Note { id: i64, text: String, by: String },
    Notes { id: i64 },
    Servants,
    AddServant { name: String, phone: String },
    Filters { servant: Option<String> },
    Analytics,
}

/// Options that take a value.
const VALUE_FLAGS: [&str; 13] = [
    "--servant",
    "--grade",
    "--gender",
    "--date",
    "--by",
    "--name",
    "--phone",
    "--parent-phone",
    "--dob",
    "--address",
    "--comments",
    "--pictures",
    "--last-call",
];

struct CliArgs {
    config_path: Option<PathBuf>,
    command: Vec<String>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut command = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("shepherd {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" if command.is_empty() => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            _ => command.push(args[i].clone()),
        }
        i += 1;
    }

    CliArgs {
        config_path,
        command,
    }
}

fn parse_command(args: &[String]) -> Result<Command> {
    let Some((name, rest)) = args.split_first() else {
        bail!("no command given, see --help");
    };

    let mut positional = Vec::new();
    let mut flags: Vec<(&str, &str)> = Vec::new();
    let mut fresh = false;
    let mut clear_grade = false;
    let mut i = 0;
    while i < rest.len() {
        let arg = rest[i].as_str();
        match arg {
            "--fresh" => fresh = true,
            "--clear-grade" => clear_grade = true,
            _ if VALUE_FLAGS.contains(&arg) => {
                let value = rest
                    .get(i + 1)
                    .with_context(|| format!("{} requires a value", arg))?;
                flags.push((arg, value.as_str()));
                i += 1;
            }
            _ if arg.starts_with("--") => bail!("unknown option {}", arg),
            _ => positional.push(arg),
        }
        i += 1;
    }

    let flag = |key: &str| {
        flags
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    };
    let arg = |idx: usize, what: &str| -> Result<String> {
        positional
            .get(idx)
            .map(|s| s.to_string())
            .with_context(|| format!("{} requires {}", name, what))
    };
    let id = |idx: usize| -> Result<i64> {
        let raw = arg(idx, "a student ID")?;
        parse_id(&raw)
    };
    let grade = || -> Result<Option<i64>> {
        flag("--grade")
            .map(|g| g.parse().with_context(|| format!("invalid grade {:?}", g)))
            .transpose()
    };
    let date = || -> Result<Option<NaiveDate>> {
        flag("--date")
            .map(|d| {
                NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                    .with_context(|| format!("invalid date {:?}, expected YYYY-MM-DD", d))
            })
            .transpose()
    };

    let command = match name.as_str() {
        "init" => Command::Init,
        "import" => Command::Import {
            file: PathBuf::from(arg(0, "a spreadsheet path")?),
            mode: if fresh { ImportMode::Fresh } else { ImportMode::Merge },
        },
        "export" => Command::Export {
            file: PathBuf::from(arg(0, "an output path")?),
        },
        "students" => Command::Students {
            filter: StudentFilter {
                servant: flag("--servant"),
                grade: grade()?,
                gender: flag("--gender"),
            },
        },
        "student" => Command::Student { id: id(0)? },
        "add-student" => Command::AddStudent {
            fields: StudentFields {
                name: arg(0, "a student name")?,
                grade: grade()?,
                gender: flag("--gender").unwrap_or_default(),
                servant: flag("--servant").unwrap_or_default(),
                phone: flag("--phone").unwrap_or_default(),
                parent_phone: flag("--parent-phone").unwrap_or_default(),
                dob: flag("--dob").unwrap_or_default(),
                address: flag("--address").unwrap_or_default(),
                comments: flag("--comments").unwrap_or_default(),
                pictures: flag("--pictures").unwrap_or_default(),
                last_call: flag("--last-call").unwrap_or_default(),
            },
        },
        "update" => {
            let grade = match (grade()?, clear_grade) {
                (Some(_), true) => bail!("--grade and --clear-grade cannot be combined"),
                (Some(g), false) => Some(Some(g)),
                (None, true) => Some(None),
                (None, false) => None,
            };
            Command::Update {
                id: id(0)?,
                update: StudentUpdate {
                    name: flag("--name"),
                    grade,
                    gender: flag("--gender"),
                    servant: flag("--servant"),
                    phone: flag("--phone"),
                    parent_phone: flag("--parent-phone"),
                    dob: flag("--dob"),
                    address: flag("--address"),
                    comments: flag("--comments"),
                    pictures: flag("--pictures"),
                    last_call: flag("--last-call"),
                },
            }
        }
        "mark" => Command::Mark {
            id: id(0)?,
            status: arg(1, "a status (present or absent)")?,
            date: date()?,
        },
        "mark-batch" => {
            if positional.is_empty() {
                bail!("mark-batch requires at least one ID:STATUS pair");
            }
            let entries = positional
                .iter()
                .map(|pair| {
                    let (raw_id, status) = pair
                        .split_once(':')
                        .with_context(|| format!("expected ID:STATUS, got {:?}", pair))?;
                    Ok((parse_id(raw_id)?, status.to_string()))
                })
                .collect::<Result<Vec<_>>>()?;
            Command::MarkBatch {
                date: date()?,
                entries,
            }
        }
        "delete" => Command::Delete { id: id(0)? },
        "note" => Command::Note {
            id: id(0)?,
            text: arg(1, "the note text")?,
            by: flag("--by").unwrap_or_default(),
        },
        "notes" => Command::Notes { id: id(0)? },
        "servants" => Command::Servants,
        "add-servant" => Command::AddServant {
            name: arg(0, "a servant name")?,
            phone: positional.get(1).map(|s| s.to_string()).unwrap_or_default(),
        },
        "filters" => Command::Filters {
            servant: flag("--servant"),
        },
        "analytics" => Command::Analytics,
        other => bail!("unknown command {:?}, see --help", other),
    };
    Ok(command)
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.parse()
        .with_context(|| format!("invalid student ID {:?}", raw))
}

fn print_help() {
    println!(
        r#"shepherd - youth group attendance tracker

USAGE:
    shepherd [OPTIONS] <COMMAND>

COMMANDS:
    init                                Create the database if needed
    import FILE [--fresh]               Import the "All Kids" sheet (merge by default)
    export FILE                         Export to .xlsx or .json
    students [--servant S] [--grade N] [--gender G]
                                        List students with alert levels
    student ID                          Show a student with history and notes
    add-student NAME [FIELDS]           Add a student
    update ID [--name N] [FIELDS] [--clear-grade]
                                        Change the given fields of a student
    mark ID STATUS [--date YYYY-MM-DD]  Record present/absent (default: today)
    mark-batch ID:STATUS... [--date YYYY-MM-DD]
                                        Record several students at once
    delete ID                           Delete a student and its attendance
    note ID TEXT [--by AUTHOR]          Add a note to a student
    notes ID                            List notes for a student ID
    servants                            List servants
    add-servant NAME [PHONE]            Register a servant
    filters [--servant S]               Show available grades and genders
    analytics                           Dashboard figures

FIELDS:
    --grade N --gender G --servant S --phone P --parent-phone P --dob D
    --address A --comments C --pictures P --last-call L

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    SHEPHERD_CONFIG     Path to config file (overrides default location)
    SHEPHERD_LOG        Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/shepherd/config.toml"#
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(command: Command, config: &Config, db: &Database) -> Result<()> {
    match command {
        Command::Init => print_json(&json!({
            "database": db.path(),
            "created": db.is_new(),
        })),
        Command::Import { file, mode } => {
            let result = Reconciler::new(db, &config.import).import_file(&file, mode);
            let report = ImportReport::from_result(&result);
            print_json(&report)?;
            if !report.is_success() {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Export { file } => {
            let format = ExportFormat::from_path(&file)
                .with_context(|| format!("cannot tell export format of {:?}, use .xlsx or .json", file))?;
            print_json(&export::export_store(db, &file, format)?)
        }
        Command::Students { filter } => match filter {
            StudentFilter {
                servant: Some(servant),
                grade: None,
                gender: None,
            } => print_json(&db.students_by_servant(&servant)?),
            filter => print_json(&db.list_student_summaries(&filter)?),
        },
        Command::Student { id } => print_json(&db.student_details(id)?),
        Command::AddStudent { fields } => {
            let id = db.add_student(&fields)?;
            print_json(&db.get_student(id)?)
        }
        Command::Update { id, update } => {
            db.update_student(id, &update)?;
            print_json(&db.get_student(id)?)
        }
        Command::Mark { id, status, date } => {
            let status = AttendanceStatus::parse(&status)?;
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            db.record_attendance(id, date, status)?;
            print_json(&json!({
                "student_id": id,
                "date": date,
                "status": status,
            }))
        }
        Command::MarkBatch { date, entries } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let entries = entries
                .iter()
                .map(|(id, status)| Ok((*id, AttendanceStatus::parse(status)?)))
                .collect::<shepherd::Result<Vec<_>>>()?;
            let written = db.record_attendance_batch(date, &entries)?;
            print_json(&json!({ "date": date, "written": written }))
        }
        Command::Delete { id } => {
            db.delete_student(id)?;
            print_json(&json!({ "deleted": id }))
        }
        Command::Note { id, text, by } => {
            let note_id = db.add_note(id, &text, &by)?;
            print_json(&json!({ "id": note_id, "student_id": id }))
        }
        Command::Notes { id } => print_json(&db.list_notes(id)?),
        Command::Servants => print_json(&db.list_servants()?),
        Command::AddServant { name, phone } => {
            let added = db.add_servant(&name, &phone)?;
            print_json(&json!({ "name": name, "added": added }))
        }
        Command::Filters { servant } => print_json(&db.filter_options(servant.as_deref())?),
        Command::Analytics => print_json(&db.analytics(Local::now().date_naive())?),
    }
}

fn main() -> Result<()> {
    let args = parse_args();
    let command = parse_command(&args.command)?;

    let config = match args.config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    // Journald on Linux, rolling file otherwise
    let _ = logging::init(&config.log_dir());

    let db = Database::open(&config.database)
        .with_context(|| format!("Failed to open database {:?}", config.database.path))?;
    db.initialize()?;

    if let Err(e) = import::bootstrap(&db, &config.import) {
        error!("Initial import failed: {}", e);
    }

    run(command, &config, &db)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        parse_command(&args)
    }

    #[test]
    fn test_import_defaults_to_merge() {
        assert_eq!(
            parse(&["import", "kids.xlsx"]).unwrap(),
            Command::Import {
                file: PathBuf::from("kids.xlsx"),
                mode: ImportMode::Merge,
            }
        );
        assert_eq!(
            parse(&["import", "--fresh", "kids.xlsx"]).unwrap(),
            Command::Import {
                file: PathBuf::from("kids.xlsx"),
                mode: ImportMode::Fresh,
            }
        );
    }

    #[test]
    fn test_mark_with_date() {
        assert_eq!(
            parse(&["mark", "3", "absent", "--date", "2024-03-01"]).unwrap(),
            Command::Mark {
                id: 3,
                status: "absent".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 3, 1),
            }
        );
        assert!(parse(&["mark", "3", "absent", "--date", "03/01/2024"]).is_err());
        assert!(parse(&["mark", "x", "absent"]).is_err());
    }

    #[test]
    fn test_students_filters() {
        assert_eq!(
            parse(&["students", "--servant", "Mark", "--grade", "7"]).unwrap(),
            Command::Students {
                filter: StudentFilter {
                    servant: Some("Mark".to_string()),
                    grade: Some(7),
                    gender: None,
                },
            }
        );
        assert!(parse(&["students", "--grade"]).is_err());
    }

    #[test]
    fn test_add_student_fields() {
        assert_eq!(
            parse(&[
                "add-student",
                "Sam",
                "--grade",
                "6",
                "--servant",
                "Mark",
                "--parent-phone",
                "555-0101",
            ])
            .unwrap(),
            Command::AddStudent {
                fields: StudentFields {
                    grade: Some(6),
                    servant: "Mark".to_string(),
                    parent_phone: "555-0101".to_string(),
                    ..StudentFields::named("Sam")
                },
            }
        );
        assert!(parse(&["add-student"]).is_err());
    }

    #[test]
    fn test_update_sets_only_given_fields() {
        assert_eq!(
            parse(&["update", "4", "--phone", "555", "--clear-grade"]).unwrap(),
            Command::Update {
                id: 4,
                update: StudentUpdate {
                    phone: Some("555".to_string()),
                    grade: Some(None),
                    ..Default::default()
                },
            }
        );
        assert_eq!(
            parse(&["update", "4", "--grade", "8"]).unwrap(),
            Command::Update {
                id: 4,
                update: StudentUpdate {
                    grade: Some(Some(8)),
                    ..Default::default()
                },
            }
        );
        assert!(parse(&["update", "4", "--grade", "8", "--clear-grade"]).is_err());
    }

    #[test]
    fn test_mark_batch_pairs() {
        assert_eq!(
            parse(&["mark-batch", "1:present", "2:absent", "--date", "2024-03-08"]).unwrap(),
            Command::MarkBatch {
                date: NaiveDate::from_ymd_opt(2024, 3, 8),
                entries: vec![(1, "present".to_string()), (2, "absent".to_string())],
            }
        );
        assert!(parse(&["mark-batch"]).is_err());
        assert!(parse(&["mark-batch", "1-present"]).is_err());
        assert!(parse(&["mark-batch", "one:present"]).is_err());
    }

    #[test]
    fn test_unknown_input() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["dance"]).is_err());
        assert!(parse(&["servants", "--loud"]).is_err());
    }
}
