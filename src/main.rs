mod calendar;
mod catalog;
mod error;
mod models;
mod progress;
mod scheduler;
mod store;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use catalog::Catalog;
use models::JsonOutput;
use store::{SqliteStorage, Store};

const DEFAULT_DB_NAME: &str = "grindstone.db";

#[derive(Parser)]
#[command(name = "grindstone")]
#[command(about = "A study planner tracking subjects, practice questions and day-by-day schedules")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the store with the bundled subjects
    Init,

    /// Manage subjects
    #[command(subcommand)]
    Subject(SubjectCommands),

    /// Manage topics within a subject
    #[command(subcommand)]
    Topic(TopicCommands),

    /// Manage subtopics within a topic
    #[command(subcommand)]
    Subtopic(SubtopicCommands),

    /// Manage the question study plan
    #[command(subcommand)]
    Plan(PlanCommands),

    /// Work the practice-question catalog
    #[command(subcommand)]
    Question(QuestionCommands),

    /// Show what is scheduled for today
    Today,

    /// Show what is scheduled for a given date
    Agenda {
        /// Date (YYYY-MM-DD)
        date: String,
    },

    /// Show completion percentages
    Progress {
        /// Limit to one subject
        #[arg(long, short)]
        subject: Option<String>,
    },

    /// Show combined study statistics
    Stats,
}

#[derive(Subcommand)]
enum SubjectCommands {
    /// List all subjects
    List,

    /// Show one subject's topic tree
    Show {
        /// Subject ID
        id: String,
    },

    /// Add a new subject
    Add {
        /// Subject title
        title: String,

        /// Icon name
        #[arg(long, short)]
        icon: Option<String>,

        /// Description
        #[arg(long, short)]
        description: Option<String>,
    },

    /// Remove a subject
    Remove {
        /// Subject ID
        id: String,
    },

    /// Clear a subject's completion flags and schedule
    Reset {
        /// Subject ID
        id: String,
    },

    /// Distribute a subject's pending subtopics across a date range
    Schedule {
        /// Subject ID
        id: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long, short)]
        start: String,

        /// Number of days
        #[arg(long, short)]
        days: u32,
    },
}

#[derive(Subcommand)]
enum TopicCommands {
    /// Add a topic to a subject
    Add {
        /// Subject ID
        subject: String,

        /// Topic title
        title: String,
    },

    /// Toggle a topic's completion (cascades to its direct subtopics)
    Toggle {
        /// Subject ID
        subject: String,

        /// Topic ID
        topic: String,
    },
}

#[derive(Subcommand)]
enum SubtopicCommands {
    /// Add a subtopic to a topic
    Add {
        /// Subject ID
        subject: String,

        /// Topic ID
        topic: String,

        /// Subtopic title
        title: String,

        /// Nest under an existing subtopic
        #[arg(long, short)]
        parent: Option<String>,

        /// Reference link
        #[arg(long, short)]
        url: Option<String>,
    },

    /// Toggle a subtopic's completion
    Toggle {
        /// Subject ID
        subject: String,

        /// Subtopic ID
        subtopic: String,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Create a study plan over the remaining questions
    Create {
        /// Start date (YYYY-MM-DD)
        #[arg(long, short)]
        start: String,

        /// Number of days
        #[arg(long, short)]
        days: u32,
    },

    /// Show the current plan's day-by-day assignments
    Show,

    /// Discard the current plan
    Reset,
}

#[derive(Subcommand)]
enum QuestionCommands {
    /// List catalog questions
    List {
        /// Limit to one section
        #[arg(long, short)]
        section: Option<String>,

        /// Only questions not yet done
        #[arg(long, short)]
        pending: bool,
    },

    /// Mark a question done
    Done {
        /// Question ID
        id: String,
    },

    /// Undo a done mark
    Undo {
        /// Question ID
        id: String,
    },

    /// Flag a question for revision
    Revise {
        /// Question ID
        id: String,
    },

    /// Remove a revision flag
    Unrevise {
        /// Question ID
        id: String,
    },

    /// Pick a random question to work on
    Pick,
}

fn get_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("GRINDSTONE_DB") {
        return PathBuf::from(path);
    }

    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("grindstone");

    std::fs::create_dir_all(&config_dir).ok();
    config_dir.join(DEFAULT_DB_NAME)
}

fn parse_date(raw: &str) -> Result<NaiveDate, error::Error> {
    raw.parse()
        .map_err(|_| error::Error::invalid_input(format!("invalid date '{raw}', expected YYYY-MM-DD")))
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = get_db_path();
    let storage = SqliteStorage::open(&db_path)?;
    let mut store = Store::open(storage);
    let catalog = Catalog::load()?;
    let today = chrono::Local::now().date_naive();

    match cli.command {
        Commands::Init => {
            let seeded = store.seed_if_empty(today)?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({ "seeded": seeded })))?
                );
            } else if seeded {
                println!(
                    "Seeded {} subjects. Store at: {}",
                    store.subjects().len(),
                    db_path.display()
                );
            } else {
                println!("Store already initialized at: {}", db_path.display());
            }
        }

        Commands::Subject(cmd) => run_subject(cmd, &mut store, cli.json, today)?,
        Commands::Topic(cmd) => run_topic(cmd, &mut store, cli.json)?,
        Commands::Subtopic(cmd) => run_subtopic(cmd, &mut store, cli.json)?,
        Commands::Plan(cmd) => run_plan(cmd, &mut store, &catalog, cli.json)?,
        Commands::Question(cmd) => run_question(cmd, &mut store, &catalog, cli.json, today)?,

        Commands::Today => print_agenda(&store, today, cli.json)?,

        Commands::Agenda { date } => {
            let date = parse_date(&date)?;
            print_agenda(&store, date, cli.json)?;
        }

        Commands::Progress { subject } => {
            let counts = match subject {
                Some(id) => progress::subject_counts(store.subject(&id)?),
                None => progress::tree_counts(store.subjects())
                    .combine(progress::question_counts(&catalog, store.completed_questions())),
            };
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "total": counts.total,
                        "completed": counts.completed,
                        "percentage": counts.percentage()
                    })))?
                );
            } else {
                println!(
                    "{}/{} units completed ({}%)",
                    counts.completed,
                    counts.total,
                    counts.percentage()
                );
            }
        }

        Commands::Stats => {
            let tree = progress::tree_counts(store.subjects());
            let questions = progress::question_counts(&catalog, store.completed_questions());
            let combined = tree.combine(questions);
            let days = progress::days_remaining(store.subjects(), store.study_plan(), today);
            let plan_days = store
                .study_plan()
                .map(|p| progress::plan_days_remaining(p, today));
            let streak = store.study_plan().map_or(0, progress::current_streak);

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "combinedPercentage": combined.percentage(),
                        "subjectPercentage": tree.percentage(),
                        "questionPercentage": questions.percentage(),
                        "totalDays": days.total_days,
                        "remainingDays": days.remaining_days,
                        "planDays": plan_days,
                        "streak": streak
                    })))?
                );
            } else {
                println!("=== Study Statistics ===");
                println!("Combined progress: {}%", combined.percentage());
                println!(
                    "Subjects: {}/{} ({}%)",
                    tree.completed,
                    tree.total,
                    tree.percentage()
                );
                println!(
                    "Questions: {}/{} ({}%)",
                    questions.completed,
                    questions.total,
                    questions.percentage()
                );
                println!(
                    "Days: {} remaining of {}",
                    days.remaining_days, days.total_days
                );
                if let Some(pd) = plan_days {
                    println!(
                        "Question plan: {} remaining of {}",
                        pd.remaining_days, pd.total_days
                    );
                }
                println!("Current streak: {} day(s)", streak);
            }
        }
    }

    Ok(())
}

fn run_subject(
    cmd: SubjectCommands,
    store: &mut Store<SqliteStorage>,
    json: bool,
    today: NaiveDate,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        SubjectCommands::List => {
            let subjects = store.subjects();
            if json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(subjects))?);
            } else if subjects.is_empty() {
                println!("No subjects. Run 'grindstone init' to seed the defaults.");
            } else {
                println!("{:<20} {:<30} {:>9} {:>6}", "ID", "TITLE", "PROGRESS", "DAYS");
                println!("{}", "-".repeat(70));
                for subject in subjects {
                    let counts = progress::subject_counts(subject);
                    println!(
                        "{:<20} {:<30} {:>8}% {:>6}",
                        truncate(&subject.id, 18),
                        truncate(&subject.title, 28),
                        counts.percentage(),
                        subject.schedule.total_days
                    );
                }
            }
        }

        SubjectCommands::Show { id } => {
            let subject = store.subject(&id)?;
            if json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(subject))?);
            } else {
                let counts = progress::subject_counts(subject);
                println!("{} ({})", subject.title, subject.id);
                if !subject.description.is_empty() {
                    println!("{}", subject.description);
                }
                println!("Progress: {}%", counts.percentage());
                if subject.schedule.total_days > 0 {
                    println!(
                        "Scheduled: {} to {} ({} days)",
                        subject.schedule.start_date,
                        subject.schedule.end_date,
                        subject.schedule.total_days
                    );
                }
                for topic in &subject.topics {
                    println!();
                    println!("[{}] {} ({})", check(topic.completed), topic.title, topic.id);
                    for st in &topic.subtopics {
                        print_subtopic(st, 1);
                    }
                }
            }
        }

        SubjectCommands::Add {
            title,
            icon,
            description,
        } => {
            let id = store.add_subject(&title, icon.as_deref(), description.as_deref(), today)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "id": id,
                        "title": title
                    })))?
                );
            } else {
                println!("Added subject '{}' with ID: {}", title, id);
            }
        }

        SubjectCommands::Remove { id } => {
            store.remove_subject(&id)?;
            print_ok(json, || println!("Subject {} removed.", id))?;
        }

        SubjectCommands::Reset { id } => {
            store.reset_subject(&id, today)?;
            print_ok(json, || println!("Subject {} reset.", id))?;
        }

        SubjectCommands::Schedule { id, start, days } => {
            let start = parse_date(&start)?;
            store.schedule_subject(&id, start, days)?;
            let subject = store.subject(&id)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(&subject.schedule))?
                );
            } else {
                println!(
                    "Scheduled {} from {} to {}.",
                    id, subject.schedule.start_date, subject.schedule.end_date
                );
            }
        }
    }
    Ok(())
}

fn run_topic(
    cmd: TopicCommands,
    store: &mut Store<SqliteStorage>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        TopicCommands::Add { subject, title } => {
            let id = store.add_topic(&subject, &title)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({ "id": id })))?
                );
            } else {
                println!("Added topic '{}' with ID: {}", title, id);
            }
        }
        TopicCommands::Toggle { subject, topic } => {
            let completed = store.toggle_topic(&subject, &topic)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(
                        serde_json::json!({ "completed": completed })
                    ))?
                );
            } else {
                println!(
                    "Topic {} marked {}.",
                    topic,
                    if completed { "complete" } else { "incomplete" }
                );
            }
        }
    }
    Ok(())
}

fn run_subtopic(
    cmd: SubtopicCommands,
    store: &mut Store<SqliteStorage>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        SubtopicCommands::Add {
            subject,
            topic,
            title,
            parent,
            url,
        } => {
            let id = store.add_subtopic(&subject, &topic, &title, parent.as_deref(), url)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({ "id": id })))?
                );
            } else {
                println!("Added subtopic '{}' with ID: {}", title, id);
            }
        }
        SubtopicCommands::Toggle { subject, subtopic } => {
            let completed = store.toggle_subtopic(&subject, &subtopic)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(
                        serde_json::json!({ "completed": completed })
                    ))?
                );
            } else {
                println!(
                    "Subtopic {} marked {}.",
                    subtopic,
                    if completed { "complete" } else { "incomplete" }
                );
            }
        }
    }
    Ok(())
}

fn run_plan(
    cmd: PlanCommands,
    store: &mut Store<SqliteStorage>,
    catalog: &Catalog,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        PlanCommands::Create { start, days } => {
            let start = parse_date(&start)?;
            store.create_study_plan(catalog, start, days)?;
            let plan = store
                .study_plan()
                .ok_or_else(|| error::Error::invalid_input("plan was not created"))?;
            if json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(plan))?);
            } else {
                println!(
                    "Plan created: {} days from {}, {} question(s) per day over {} scheduled day(s).",
                    plan.number_of_days,
                    plan.start_date,
                    plan.questions_per_day,
                    plan.question_assignments.len()
                );
            }
        }

        PlanCommands::Show => match store.study_plan() {
            Some(plan) => {
                if json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(plan))?);
                } else {
                    println!(
                        "Plan: {} days from {} ({} question(s)/day target)",
                        plan.number_of_days, plan.start_date, plan.questions_per_day
                    );
                    for (day, ids) in &plan.question_assignments {
                        println!("  {}  {}", day, ids.join(", "));
                    }
                }
            }
            None => {
                if json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::<()>::err("No study plan"))?
                    );
                } else {
                    println!("No study plan. Create one with 'grindstone plan create'.");
                }
            }
        },

        PlanCommands::Reset => {
            store.reset_study_plan();
            print_ok(json, || println!("Study plan cleared."))?;
        }
    }
    Ok(())
}

fn run_question(
    cmd: QuestionCommands,
    store: &mut Store<SqliteStorage>,
    catalog: &Catalog,
    json: bool,
    today: NaiveDate,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        QuestionCommands::List { section, pending } => {
            let sections: Vec<&catalog::Section> = match &section {
                Some(title) => catalog
                    .find_section(title)
                    .map(|s| vec![s])
                    .ok_or_else(|| error::Error::not_found("section", title.clone()))?,
                None => catalog.sections.iter().collect(),
            };

            if json {
                let rows: Vec<serde_json::Value> = sections
                    .iter()
                    .flat_map(|s| {
                        s.questions().filter_map(|q| {
                            let done = store.completed_questions().contains(&q.question_id);
                            if pending && done {
                                return None;
                            }
                            Some(serde_json::json!({
                                "section": s.title,
                                "questionId": q.question_id,
                                "questionHeading": q.question_heading,
                                "difficulty": q.difficulty,
                                "done": done,
                                "revision": store.revision_list().contains(&q.question_id),
                            }))
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string(&JsonOutput::ok(rows))?);
            } else {
                for section in sections {
                    println!("== {} ==", section.title);
                    for q in section.questions() {
                        let done = store.completed_questions().contains(&q.question_id);
                        if pending && done {
                            continue;
                        }
                        let marker = if done { "x" } else { " " };
                        let revision = if store.revision_list().contains(&q.question_id) {
                            " (revision)"
                        } else {
                            ""
                        };
                        let difficulty = q
                            .difficulty
                            .map(|d| d.label())
                            .unwrap_or("-");
                        println!(
                            "[{}] {:<50} {:<8} {}{}",
                            marker,
                            truncate(&q.question_heading, 48),
                            difficulty,
                            q.question_id,
                            revision
                        );
                    }
                    println!();
                }
            }
        }

        QuestionCommands::Done { id } => {
            store.mark_question_done(catalog, &id, today)?;
            print_ok(json, || println!("Question {} marked done.", id))?;
        }

        QuestionCommands::Undo { id } => {
            store.unmark_question_done(&id)?;
            print_ok(json, || println!("Question {} no longer done.", id))?;
        }

        QuestionCommands::Revise { id } => {
            store.mark_revision(catalog, &id)?;
            print_ok(json, || println!("Question {} flagged for revision.", id))?;
        }

        QuestionCommands::Unrevise { id } => {
            store.unmark_revision(&id)?;
            print_ok(json, || println!("Revision flag removed from {}.", id))?;
        }

        QuestionCommands::Pick => match store.random_pick(catalog) {
            Some(q) => {
                if json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(q))?);
                } else {
                    println!("{} ({})", q.question_heading, q.question_id);
                    if let Some(d) = q.difficulty {
                        println!("Difficulty: {}", d.label());
                    }
                    if let Some(link) = &q.question_link {
                        println!("Link: {}", link);
                    }
                }
            }
            None => {
                if json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::<()>::err("Nothing left to pick"))?
                    );
                } else {
                    println!("Nothing left to pick. Everything is done!");
                }
            }
        },
    }
    Ok(())
}

fn print_agenda(
    store: &Store<SqliteStorage>,
    date: NaiveDate,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let topics = calendar::topics_for_date(store.subjects(), date);
    let questions = calendar::questions_for_date(store.study_plan(), date);

    if json {
        println!(
            "{}",
            serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                "date": date.to_string(),
                "topics": topics,
                "questions": questions
            })))?
        );
        return Ok(());
    }

    println!("=== {} ===", date);
    if topics.is_empty() && questions.is_empty() {
        println!("Nothing scheduled.");
        return Ok(());
    }
    for entry in &topics {
        println!("{} / {}:", entry.subject_title, entry.topic_title);
        for st in &entry.subtopics {
            println!("  [{}] {} ({})", check(st.completed), st.title, st.id);
        }
    }
    if !questions.is_empty() {
        println!("Questions:");
        for id in questions {
            println!("  {}", id);
        }
    }
    Ok(())
}

fn print_subtopic(st: &models::SubTopic, depth: usize) {
    let indent = "  ".repeat(depth);
    let date = st
        .scheduled_date
        .map(|d| format!("  @{}", d))
        .unwrap_or_default();
    println!("{}[{}] {} ({}){}", indent, check(st.completed), st.title, st.id, date);
    for child in &st.subtopics {
        print_subtopic(child, depth + 1);
    }
}

fn print_ok(json: bool, text: impl FnOnce()) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
    } else {
        text();
    }
    Ok(())
}

fn check(completed: bool) -> char {
    if completed {
        'x'
    } else {
        ' '
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    // cut on a char boundary so multibyte titles don't panic
    let cut = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max_len - 3)
        .last()
        .unwrap_or(0);
    format!("{}...", &s[..cut])
}
