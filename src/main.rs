use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod edit;
mod error;
mod gateway;
mod loader;
mod models;
mod reconciler;
mod recorder;
mod report;

use config::Config;
use gateway::postgres::PgGateway;
use recorder::{Recorder, Selection};

#[derive(Parser)]
#[command(name = "roll-call")]
#[command(about = "Semester roll-call and attendance summaries", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo semesters and students
    Seed,
    /// Import students from a CSV file (name,roll,email,semester)
    ImportRoster {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List semesters with their student counts
    Semesters,
    /// Show the roster and subjects of a semester
    Roster {
        #[arg(long)]
        semester: String,
    },
    /// Record today's roll-call for a subject
    Record {
        #[arg(long)]
        semester: String,
        /// Checked against the named semester when given
        #[arg(long)]
        semester_id: Option<i64>,
        #[arg(long, default_value = "")]
        subject: String,
        /// Rolls of the students present; everyone else is marked absent
        #[arg(long, value_delimiter = ',')]
        present: Vec<String>,
    },
    /// Show a student's attendance across subjects
    Student {
        #[arg(long)]
        student_id: i64,
        /// JSON subject list or comma-separated subject names
        #[arg(long)]
        subjects: String,
    },
    /// Show totals and percentage for one subject
    Report {
        #[arg(long)]
        student_id: i64,
        #[arg(long)]
        subject: String,
    },
    /// List the roll-call days of a student in a subject
    Calendar {
        #[arg(long)]
        student_id: i64,
        #[arg(long)]
        subject: String,
    },
    /// Overwrite the present count of a student in a subject
    Edit {
        #[arg(long)]
        student_id: i64,
        #[arg(long)]
        subject: String,
        #[arg(long, default_value = "")]
        present: String,
    },
    /// Recompute a semester's summaries from its attendance events
    RebuildSummaries {
        #[arg(long)]
        semester_id: i64,
    },
    /// Write a markdown attendance report for a semester
    SemesterReport {
        #[arg(long)]
        semester: String,
        #[arg(long, default_value = "attendance.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roll_call=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let gateway = PgGateway::connect(&cli.config)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            gateway.init_db().await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            gateway.seed().await?;
            println!("Seed data inserted.");
        }
        Commands::ImportRoster { csv } => {
            let imported = gateway.import_roster(&csv).await?;
            println!("Imported {imported} students from {}.", csv.display());
        }
        Commands::Semesters => {
            let semesters = loader::load_semesters(&gateway).await;
            if semesters.is_empty() {
                println!("No semesters found.");
                return Ok(());
            }
            for entry in semesters {
                let subjects: Vec<String> =
                    loader::parse_subject_catalog(entry.semester.subjects.as_deref())
                        .into_iter()
                        .map(|s| s.name)
                        .collect();
                println!(
                    "- {} (id {}, {}): {} students; subjects: {}",
                    entry.semester.name,
                    entry.semester.semester_id,
                    if entry.semester.is_active { "active" } else { "inactive" },
                    entry.student_count,
                    if subjects.is_empty() { "none".to_string() } else { subjects.join(", ") }
                );
            }
        }
        Commands::Roster { semester } => {
            let roster = loader::load_roster(&gateway, &semester).await;
            let subjects: Vec<&str> = roster.subjects.iter().map(|s| s.name.as_str()).collect();
            println!("Subjects: {}", subjects.join(", "));
            for (index, student) in roster.students.iter().enumerate() {
                println!(
                    "{}. {} (roll {}, id {})",
                    index + 1,
                    student.name,
                    student.roll,
                    student.student_id
                );
            }
            println!("Subject list: {}", serde_json::to_string(&roster.subjects)?);
        }
        Commands::Record {
            semester,
            semester_id,
            subject,
            present,
        } => {
            let (semester_id, roster) = loader::roll_call_target(&gateway, &semester, semester_id)
                .await
                .context("Failed to save attendance")?;
            let mut selection = Selection::new(&subject);
            for roll in present.iter().map(|r| r.trim()).filter(|r| !r.is_empty()) {
                if !roster.students.iter().any(|s| s.roll == roll) {
                    warn!(roll, semester = %semester, "roll is not on the roster");
                }
                selection.toggle(roll);
            }
            let present_count = selection.present_rolls.len();

            let roll_call = Recorder::new(&gateway, cli.config.strategy());
            let outcome = roll_call
                .submit(&roster.students, semester_id, &mut selection)
                .await
                .context("Failed to save attendance")?;

            println!(
                "Attendance saved successfully for {} on {} ({} present, {} students).",
                subject.trim(),
                recorder::format_date(outcome.date),
                present_count,
                outcome.events_written
            );
            if !outcome.summaries_failed.is_empty() {
                warn!(
                    submission_id = %outcome.submission_id,
                    students = ?outcome.summaries_failed,
                    "some summaries lag their events; run rebuild-summaries to catch up"
                );
            }
            if outcome.repeated_roll_call {
                println!("Note: a roll-call for this subject was already recorded today.");
            }
        }
        Commands::Student {
            student_id,
            subjects,
        } => {
            let subjects = loader::parse_subject_argument(&subjects);
            let attendance = report::subject_attendance(&gateway, student_id, &subjects).await;
            if attendance.is_empty() {
                println!("No subjects to show.");
            }
            print!("{}", report::render_subject_attendance(&attendance));
        }
        Commands::Report {
            student_id,
            subject,
        } => {
            let entry = report::student_report(&gateway, student_id, &subject).await;
            println!("{}", entry.subject);
            println!("Total Days: {}", entry.total_classes);
            println!("Present Days: {}", entry.total_present);
            println!("Present Percentage: {}%", entry.percentage);
        }
        Commands::Calendar {
            student_id,
            subject,
        } => {
            let days =
                report::calendar(&gateway, student_id, &subject, recorder::attendance_date()).await;
            print!("{}", report::render_calendar(&days));
        }
        Commands::Edit {
            student_id,
            subject,
            present,
        } => {
            let value = edit::edit_total_present(&gateway, student_id, &subject, &present)
                .await
                .context("Failed to update!")?;
            println!("Attendance updated successfully ({subject}: {value} present).");
        }
        Commands::RebuildSummaries { semester_id } => {
            let outcome = reconciler::rebuild_summaries(&gateway, semester_id).await?;
            println!("Rebuilt {} summaries.", outcome.rebuilt);
            for (student_id, subject) in outcome.failed {
                println!("- could not rebuild student {student_id} in {subject}");
            }
        }
        Commands::SemesterReport { semester, out } => {
            let report = report::semester_report(&gateway, &semester).await;
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
