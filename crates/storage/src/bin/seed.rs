use std::fmt;

use lesson_core::model::{
    QuizItem, RuleBlock, SessionId, TaskDefinition, TaskId, TaskPayload, VocabularyCard,
};
use storage::repository::{SessionRecord, Storage};
use tracing_subscriber::EnvFilter;

const LESSON_ONE_ID: &str = "5d0c3f36-4f0e-4c52-9b7e-000000000001";
const LESSON_TWO_ID: &str = "5d0c3f36-4f0e-4c52-9b7e-000000000002";

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    required_secs: u32,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidRequiredSecs { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidRequiredSecs { raw } => {
                write!(f, "invalid --required-secs value: {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("LESSON_DB_URL").unwrap_or_else(|_| "sqlite://lesson.sqlite3?mode=rwc".into());
        let mut required_secs = 600;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--required-secs" => {
                    let value = require_value(&mut args, "--required-secs")?;
                    required_secs = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidRequiredSecs { raw: value.clone() })?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            required_secs,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://lesson.sqlite3?mode=rwc)");
    eprintln!("  --required-secs <n>       Listening time for vocabulary tasks, 0 = none (default: 600)");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LESSON_DB_URL, RUST_LOG");
}

fn quiz(id: &str, prompt: &str, options: &[&str], correct: usize) -> QuizItem {
    QuizItem::new(
        id,
        prompt,
        options.iter().map(|o| (*o).to_owned()).collect(),
        correct,
    )
}

fn lesson_one(required_secs: u32) -> Vec<TaskDefinition> {
    vec![
        TaskDefinition::new(
            TaskId::new(1),
            "Greetings",
            TaskPayload::Vocabulary {
                cards: vec![
                    VocabularyCard::new("hola").with_translation("hello"),
                    VocabularyCard::new("buenos días").with_translation("good morning"),
                    VocabularyCard::new("gracias").with_translation("thank you"),
                    VocabularyCard::new("hasta luego").with_translation("see you later"),
                ],
                required_time_secs: Some(required_secs),
            },
        ),
        TaskDefinition::new(
            TaskId::new(2),
            "Ser and estar",
            TaskPayload::Rules {
                blocks: vec![RuleBlock {
                    title: "Identity vs. state".into(),
                    body: "Use ser for what something is, estar for how it is.".into(),
                    questions: vec![
                        quiz("r1", "Yo ___ estudiante.", &["soy", "estoy"], 0),
                        quiz("r2", "Ella ___ cansada.", &["es", "está"], 1),
                    ],
                }],
                speak_aloud: true,
            },
        ),
        TaskDefinition::new(
            TaskId::new(3),
            "At the café",
            TaskPayload::Listening {
                audio_key: Some("dialogue-cafe".into()),
                items: vec![
                    quiz("l1", "What does Ana order?", &["té", "café", "agua"], 1),
                    quiz("l2", "How much is it?", &["dos euros", "tres euros"], 0),
                    quiz("l3", "Is it hot?", &["sí", "no"], 0),
                ],
            },
        ),
        TaskDefinition::new(
            TaskId::new(4),
            "Write about yourself",
            TaskPayload::Writing {
                prompts: vec!["Preséntate en tres frases.".into()],
            },
        ),
    ]
}

fn lesson_two(required_secs: u32) -> Vec<TaskDefinition> {
    vec![
        TaskDefinition::new(
            TaskId::new(1),
            "Numbers",
            TaskPayload::Vocabulary {
                cards: vec![
                    VocabularyCard::new("uno").with_translation("one"),
                    VocabularyCard::new("dos").with_translation("two"),
                    VocabularyCard::new("tres").with_translation("three"),
                ],
                required_time_secs: Some(required_secs),
            },
        ),
        TaskDefinition::new(
            TaskId::new(2),
            "Which one fits?",
            TaskPayload::Attention {
                items: vec![
                    quiz("a1", "You enter a shop in the morning.", &["buenas noches", "buenos días"], 1),
                    quiz("a2", "Someone thanks you.", &["de nada", "lo siento"], 0),
                ],
            },
        ),
    ]
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;

    let lessons = [
        (LESSON_ONE_ID, "Lección 1: Hola", lesson_one(args.required_secs)),
        (LESSON_TWO_ID, "Lección 2: Números", lesson_two(args.required_secs)),
    ];
    for (position, (id, title, tasks)) in (1_u32..).zip(lessons) {
        for task in &tasks {
            task.validate()?;
        }
        let record = SessionRecord::new(id.parse::<SessionId>()?, title, position);
        storage.content.upsert_session(&record, &tasks).await?;
        tracing::info!(session_id = %record.id, tasks = tasks.len(), "seeded lesson");
    }

    println!("Seeded 2 lessons into {}", args.db_url);

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
