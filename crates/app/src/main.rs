use std::fmt;

use learn_core::model::{
    AgeRange, CHILD_AGE_MAX, CHILD_AGE_MIN, UserType, WordDraft, words_by_category,
};
use services::config::{BACKEND_URL_VAR, DB_URL_VAR};
use services::{AppContext, BackendConfig, Clock, Locale, SessionError, SessionState, message};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArg { name: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidAge { raw: String },
    InvalidUserType { raw: String },
    InvalidAnswer { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArg { name } => write!(f, "missing <{name}>"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::InvalidAge { raw } => write!(f, "invalid --age value: {raw}"),
            ArgsError::InvalidUserType { raw } => write!(f, "invalid --type value: {raw}"),
            ArgsError::InvalidAnswer { raw } => {
                write!(f, "answer must be `right` or `wrong`, got {raw}")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  wordquest [options] register <username> <password> [--type <role>] [--age <years>]");
    eprintln!("  wordquest [options] login <username> <password>");
    eprintln!("  wordquest [options] logout | status | badges | earned | next | words | books");
    eprintln!("  wordquest [options] add-word <word> <meaning> <category>");
    eprintln!("  wordquest [options] answer <right|wrong>");
    eprintln!("  wordquest [options] puzzle | learned | read");
    eprintln!("  wordquest [options] admin-login <password> | admin-verify | admin-logout");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>   local store (default from {DB_URL_VAR})");
    eprintln!("  --backend <url>     hosted backend (default from {BACKEND_URL_VAR})");
    eprintln!("  --lang <tag>        message language, e.g. en or es (default from LANG)");
    eprintln!("  -v, --verbose       debug logging");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Register {
        username: String,
        password: String,
        user_type: UserType,
        child_age: u8,
    },
    Login {
        username: String,
        password: String,
    },
    Logout,
    Status,
    Badges,
    Earned,
    Next,
    Words,
    Books,
    AddWord {
        text: String,
        meaning: String,
        category: String,
    },
    Answer {
        correct: bool,
    },
    Puzzle,
    Learned,
    Read,
    AdminLogin {
        password: String,
    },
    AdminVerify,
    AdminLogout,
}

struct Args {
    db_url: Option<String>,
    backend_url: Option<String>,
    locale: Locale,
    verbose: bool,
    command: Command,
}

impl Args {
    fn parse(argv: impl IntoIterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let mut args = argv.into_iter();
        let mut db_url = None;
        let mut backend_url = None;
        let mut locale = std::env::var("LANG")
            .map(|tag| Locale::from_tag(&tag))
            .unwrap_or_default();
        let mut verbose = false;
        let mut positional = Vec::new();
        let mut user_type = UserType::Parent;
        let mut child_age = 6;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = Some(normalize_sqlite_url(value));
                }
                "--backend" => backend_url = Some(require_value(&mut args, "--backend")?),
                "--lang" => locale = Locale::from_tag(&require_value(&mut args, "--lang")?),
                "--type" => {
                    let value = require_value(&mut args, "--type")?;
                    user_type = UserType::parse(&value)
                        .map_err(|_| ArgsError::InvalidUserType { raw: value.clone() })?;
                }
                "--age" => {
                    let value = require_value(&mut args, "--age")?;
                    child_age = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidAge { raw: value.clone() })?;
                }
                "--verbose" | "-v" => verbose = true,
                "--help" | "-h" => return Ok(None),
                flag if flag.starts_with('-') => return Err(ArgsError::UnknownArg(arg.clone())),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let Some(name) = positional.next() else {
            return Ok(None);
        };
        let mut next = |name: &'static str| positional.next().ok_or(ArgsError::MissingArg { name });

        let command = match name.as_str() {
            "register" => Command::Register {
                username: next("username")?,
                password: next("password")?,
                user_type,
                child_age,
            },
            "login" => Command::Login {
                username: next("username")?,
                password: next("password")?,
            },
            "logout" => Command::Logout,
            "status" => Command::Status,
            "badges" => Command::Badges,
            "earned" => Command::Earned,
            "next" => Command::Next,
            "words" => Command::Words,
            "books" => Command::Books,
            "add-word" => Command::AddWord {
                text: next("word")?,
                meaning: next("meaning")?,
                category: next("category")?,
            },
            "answer" => {
                let raw = next("right|wrong")?;
                let correct = match raw.as_str() {
                    "right" | "correct" => true,
                    "wrong" | "miss" => false,
                    _ => return Err(ArgsError::InvalidAnswer { raw: raw.clone() }),
                };
                Command::Answer { correct }
            }
            "puzzle" => Command::Puzzle,
            "learned" => Command::Learned,
            "read" => Command::Read,
            "admin-login" => Command::AdminLogin {
                password: next("password")?,
            },
            "admin-verify" => Command::AdminVerify,
            "admin-logout" => Command::AdminLogout,
            _ => return Err(ArgsError::UnknownCommand(name.clone())),
        };
        if let Some(extra) = positional.next() {
            return Err(ArgsError::UnknownArg(extra));
        }

        Ok(Some(Self {
            db_url,
            backend_url,
            locale,
            verbose,
            command,
        }))
    }
}

/// Turn a bare path into an absolute, create-if-missing sqlite URL.
fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}?mode=rwc", absolute.display())
}

fn describe(state: &SessionState) -> String {
    match state {
        SessionState::Anonymous => "signed out".to_owned(),
        SessionState::Authenticating => "signing in".to_owned(),
        SessionState::Authenticated(session) => {
            let profile = session.profile();
            let counters = session.progress().counters();
            format!(
                "{} ({}, child age {}) on {}: quiz {} (streak {}), puzzles {}, words {}, books {}",
                profile.username(),
                profile.user_type().as_str(),
                profile.child_age(),
                profile.site_name(),
                counters.quiz_score(),
                counters.quiz_streak(),
                counters.puzzle_completions(),
                counters.words_learned(),
                counters.books_read(),
            )
        }
    }
}

fn print_unlocked(badges: &[learn_core::model::Badge]) {
    for badge in badges {
        println!("{} unlocked: {}", badge.icon(), badge.name());
    }
}

async fn execute(context: &AppContext, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let sessions = context.sessions();
    let progress = context.progress();
    let content = context.content();
    let admin = context.admin();

    match command {
        Command::Register {
            username,
            password,
            user_type,
            child_age,
        } => {
            sessions
                .register(&username, &password, user_type, child_age)
                .await?;
            println!("{}", describe(&context.state().await));
        }
        Command::Login { username, password } => {
            sessions.login(&username, &password).await?;
            println!("{}", describe(&context.state().await));
        }
        Command::Logout => {
            sessions.logout().await;
            println!("signed out");
        }
        Command::Status => println!("{}", describe(&context.state().await)),
        Command::Badges => {
            if let Err(err) = context.refresh_badges().await {
                debug!(error = %err, "keeping built-in badge catalog");
            }
            for badge in progress.badges().await? {
                let mark = if badge.is_unlocked() { "x" } else { " " };
                println!(
                    "[{mark}] {} {} ({} {})",
                    badge.icon(),
                    badge.name(),
                    badge.required_score(),
                    badge.category().as_str()
                );
            }
        }
        Command::Earned => {
            for earned in sessions.unlocked_badges().await? {
                println!(
                    "badge {} on {}",
                    earned.badge_id,
                    earned.unlocked_at.format("%Y-%m-%d")
                );
            }
        }
        Command::Next => match progress.next_badge().await? {
            Some((badge, remaining)) => {
                println!("{} {}: {remaining} to go", badge.icon(), badge.name());
            }
            None => println!("every badge is unlocked"),
        },
        Command::Words => {
            for (category, words) in words_by_category(&content.words().await?) {
                println!("{category}:");
                for word in words {
                    println!("  {} - {}", word.text(), word.meaning());
                }
            }
        }
        Command::Books => {
            for book in content.books().await? {
                let pages = book.pages().len();
                match book.author() {
                    Some(author) => println!("{} by {author} ({pages} pages)", book.title()),
                    None => println!("{} ({pages} pages)", book.title()),
                }
            }
        }
        Command::AddWord {
            text,
            meaning,
            category,
        } => {
            let word = content
                .add_word(WordDraft {
                    text,
                    meaning,
                    category,
                    image: None,
                    text_audio: None,
                    meaning_audio: None,
                    ages: AgeRange::new(CHILD_AGE_MIN, CHILD_AGE_MAX)?,
                })
                .await?;
            println!("added {} - {}", word.text(), word.meaning());
        }
        Command::Answer { correct: true } => print_unlocked(&progress.answer_correct().await?),
        Command::Answer { correct: false } => progress.answer_wrong().await?,
        Command::Puzzle => print_unlocked(&progress.puzzle_solved().await?),
        Command::Learned => progress.word_learned().await?,
        Command::Read => progress.book_read().await?,
        Command::AdminLogin { password } => {
            admin.login(&password).await?;
            println!("admin signed in");
        }
        Command::AdminVerify => {
            let accepted = admin.verify().await;
            println!("{}", if accepted { "admin token valid" } else { "admin signed out" });
        }
        Command::AdminLogout => {
            admin.logout().await?;
            println!("admin signed out");
        }
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let parsed = match Args::parse(std::env::args().skip(1)) {
        Ok(Some(parsed)) => parsed,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(err) => {
            eprintln!("{err}");
            print_usage();
            return Err(err.into());
        }
    };

    let filter = if parsed.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = BackendConfig::from_env()?;
    if let Some(db_url) = parsed.db_url {
        config.database_url = db_url;
    }
    if let Some(raw) = parsed.backend_url {
        config.backend_url = services::config::parse_url(BACKEND_URL_VAR, &raw)?;
    }

    let context = AppContext::init(&config, Clock::system()).await?;
    let result = execute(&context, parsed.command).await;
    context.dispose().await;

    result.map_err(|err| match err.downcast::<SessionError>() {
        Ok(session_err) => message(session_err.code(), parsed.locale).into(),
        Err(other) => other,
    })
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
