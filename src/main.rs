//! `viona` command line: chat with the assistant and browse what it saved.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use viona_lib::config::AppConfig;
use viona_lib::db::UserProfile;
use viona_lib::prompts::TonePreference;
use viona_lib::{logging, App, SavedRecord};

#[derive(Parser)]
#[command(name = "viona", about = "VIONA - personal AI assistant", version)]
struct Cli {
    /// SQLite database path (overrides VIONA_DB_PATH).
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// User id to act as (overrides VIONA_USER_ID).
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat interactively. `/new` starts a fresh session, `/quit` exits.
    Chat(ChatArgs),

    /// List chat sessions, most recent first.
    Sessions,

    /// Delete a session and its messages.
    DeleteSession { id: String },

    /// Show notes saved with "remember this".
    Notes,

    /// Show ideas saved with "idea:" or "save idea".
    Ideas,

    /// List, add or complete reminders.
    Reminders(ReminderArgs),

    /// Show or update the profile used to personalise replies.
    Profile(ProfileArgs),
}

#[derive(Args)]
struct ChatArgs {
    /// Continue an existing session.
    #[arg(long)]
    session: Option<String>,
}

#[derive(Args)]
struct ReminderArgs {
    /// Add a reminder with this title.
    #[arg(long)]
    add: Option<String>,

    /// Due date for `--add` (free text, e.g. 2026-10-20T18:00).
    #[arg(long, requires = "add")]
    due: Option<String>,

    /// Mark the reminder with this id as done.
    #[arg(long, conflicts_with = "add")]
    done: Option<String>,
}

#[derive(Args)]
struct ProfileArgs {
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    goals: Option<String>,

    /// supportive | professional | casual | motivational
    #[arg(long)]
    tone: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    if let Some(user) = cli.user {
        config.user_id = user;
    }

    // Failures are already reported through the console layer
    let _ = logging::init_logging(&config);
    logging::prune_old_logs(&config.log_dir);

    let app = App::from_config(config)
        .with_context(|| "failed to open the VIONA database")?;
    let user_id = app.config().user_id.clone();

    match cli.command {
        Commands::Chat(args) => run_chat(&app, &user_id, args.session).await?,
        Commands::Sessions => {
            for session in app.list_sessions(&user_id)? {
                println!("{}  {}  {}", session.id, session.updated_at, session.title);
            }
        }
        Commands::DeleteSession { id } => {
            app.delete_session(&user_id, &id)?;
            println!("Deleted session {}", id);
        }
        Commands::Notes => {
            for note in app.list_notes(&user_id)? {
                println!("[{}] {} ({})", note.created_at, note.content, note.source);
            }
        }
        Commands::Ideas => {
            for idea in app.list_ideas(&user_id)? {
                println!("💡 {}\n   {}", idea.title, idea.content);
            }
        }
        Commands::Reminders(args) => run_reminders(&app, &user_id, args)?,
        Commands::Profile(args) => run_profile(&app, &user_id, args)?,
    }

    Ok(())
}

async fn run_chat(app: &App, user_id: &str, session_id: Option<String>) -> Result<()> {
    if !app.config().has_api_key() {
        eprintln!("Note: GEMINI_API_KEY is not set, replies will only explain how to configure it.");
    }
    println!("VIONA is listening. Type /new for a fresh session, /quit to exit.");

    // Listening for SIGINT replaces the default exit, so every signal is forwarded to the loop
    let (tx, interrupts) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });

    chat_loop(app, user_id, session_id, BufReader::new(tokio::io::stdin()), interrupts).await
}

/// Read turns from `input` until EOF, `/quit` or an interrupt at the prompt.
///
/// An interrupt while a reply is pending cancels that turn only.
async fn chat_loop<R>(
    app: &App,
    user_id: &str,
    mut session_id: Option<String>,
    input: R,
    mut interrupts: mpsc::UnboundedReceiver<()>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            Some(()) = interrupts.recv() => {
                println!();
                break;
            }
        };
        let Some(line) = line else { break };

        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/new" => {
                session_id = None;
                println!("(new session)");
                continue;
            }
            _ => {}
        }

        let result = {
            let cancel = CancellationToken::new();
            let current = session_id.clone();
            let send = app.send_chat_message(user_id, current.as_deref(), line, &cancel);
            tokio::pin!(send);

            let result = tokio::select! {
                result = &mut send => result,
                Some(()) = interrupts.recv() => {
                    cancel.cancel();
                    send.await
                }
            };
            result
        };

        let turn = match result {
            Ok(turn) => turn,
            Err(e) => {
                logging::log_error(session_id.as_deref(), &e.to_string());
                eprintln!("error: {}", e);
                continue;
            }
        };

        match &turn.saved {
            Some(SavedRecord::Note(_)) => println!("📝 Saved to Smart Notes!"),
            Some(SavedRecord::Idea(_)) => println!("💡 Saved to Idea Vault!"),
            None => {}
        }
        println!(
            "VIONA [{}]: {}",
            turn.assistant_message
                .tone_detected
                .map(|t| t.as_str())
                .unwrap_or("calm"),
            turn.assistant_message.content
        );

        session_id = Some(turn.session_id);
    }

    Ok(())
}

fn run_reminders(app: &App, user_id: &str, args: ReminderArgs) -> Result<()> {
    if let Some(title) = args.add {
        let reminder = app.add_reminder(user_id, &title, args.due.as_deref())?;
        println!("Added reminder {}", reminder.id);
        return Ok(());
    }
    if let Some(id) = args.done {
        if !app.set_reminder_done(user_id, &id, true)? {
            anyhow::bail!("no reminder with id {}", id);
        }
        println!("Marked {} as done", id);
        return Ok(());
    }

    for reminder in app.list_reminders(user_id)? {
        println!(
            "{} {}  {}{}",
            if reminder.is_done { "[x]" } else { "[ ]" },
            reminder.id,
            reminder.title,
            reminder
                .due_at
                .map(|due| format!(" (due {})", due))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn run_profile(app: &App, user_id: &str, args: ProfileArgs) -> Result<()> {
    let existing = app.get_profile(user_id)?;

    if args.name.is_none() && args.goals.is_none() && args.tone.is_none() {
        match existing {
            Some(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
            None => println!("No profile yet. Set one with --name, --goals and --tone."),
        }
        return Ok(());
    }

    let tone_preference = match args.tone.as_deref() {
        Some(raw) => Some(raw.parse::<TonePreference>()?),
        None => existing.as_ref().and_then(|p| p.tone_preference),
    };

    let profile = UserProfile {
        user_id: user_id.to_string(),
        full_name: args.name.or_else(|| existing.as_ref().and_then(|p| p.full_name.clone())),
        goals: args.goals.or_else(|| existing.as_ref().and_then(|p| p.goals.clone())),
        tone_preference,
        updated_at: String::new(),
    };
    app.save_profile(&profile)?;
    println!("Profile saved.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use viona_lib::db::Store;
    use viona_lib::dispatcher::{CANCELLED_MESSAGE, NOT_CONFIGURED_MESSAGE};
    use viona_lib::error::CandidateError;
    use viona_lib::gemini::{CandidateModel, GeminiClient, GeminiContent, GenerativeBackend};

    /// Never answers within a test's lifetime.
    struct StalledBackend;

    #[async_trait]
    impl GenerativeBackend for StalledBackend {
        async fn generate(
            &self,
            _api_key: &str,
            _model: &CandidateModel,
            _contents: &[GeminiContent],
        ) -> Result<String, CandidateError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".to_string())
        }
    }

    fn app(api_key: Option<&str>, backend: Arc<dyn GenerativeBackend>) -> App {
        let config = AppConfig {
            api_key: api_key.map(str::to_string),
            ..AppConfig::default()
        };
        App::with_backend(config, Store::open_in_memory().unwrap(), backend)
    }

    async fn wait_for_messages(app: &App, count: usize) -> String {
        loop {
            if let Some(session) = app.list_sessions("u1").unwrap().first() {
                if app.session_messages("u1", &session.id).unwrap().len() >= count {
                    return session.id.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_interrupt_at_prompt_after_a_turn_ends_chat() {
        let app = app(None, Arc::new(GeminiClient::new()));
        let (mut stdin, input) = tokio::io::duplex(1024);
        let (tx, rx) = mpsc::unbounded_channel();

        let chat = chat_loop(&app, "u1", None, BufReader::new(input), rx);
        let driver = async {
            stdin.write_all(b"hello\n").await.unwrap();
            wait_for_messages(&app, 2).await;
            tx.send(()).unwrap();
        };

        // input stays open, so only the interrupt can end the loop
        let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(chat, driver) })
            .await
            .expect("chat loop kept running after an interrupt at the prompt");
        result.unwrap();

        let session = &app.list_sessions("u1").unwrap()[0];
        let messages = app.session_messages("u1", &session.id).unwrap();
        assert_eq!(messages[1].content, NOT_CONFIGURED_MESSAGE);
    }

    #[tokio::test]
    async fn test_interrupt_during_reply_cancels_turn_only() {
        let app = app(Some("key"), Arc::new(StalledBackend));
        let (mut stdin, input) = tokio::io::duplex(1024);
        let (tx, rx) = mpsc::unbounded_channel();

        let chat = chat_loop(&app, "u1", None, BufReader::new(input), rx);
        let driver = async {
            stdin.write_all(b"first\n").await.unwrap();
            wait_for_messages(&app, 1).await;
            // cancels the pending reply
            tx.send(()).unwrap();
            let session_id = wait_for_messages(&app, 2).await;

            // the loop survives the cancelled turn and keeps reading
            stdin.write_all(b"/new\n").await.unwrap();
            stdin.write_all(b"/quit\n").await.unwrap();
            session_id
        };

        let (result, session_id) =
            tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(chat, driver) })
                .await
                .unwrap();
        result.unwrap();

        let messages = app.session_messages("u1", &session_id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[1].content, CANCELLED_MESSAGE);
    }

    #[tokio::test]
    async fn test_follow_up_turns_stay_in_one_session() {
        let app = app(None, Arc::new(GeminiClient::new()));
        let input: &[u8] = b"one\ntwo\n\n/new\nthree\n";
        let (_tx, rx) = mpsc::unbounded_channel();

        chat_loop(&app, "u1", None, BufReader::new(input), rx).await.unwrap();

        let sessions = app.list_sessions("u1").unwrap();
        assert_eq!(sessions.len(), 2);
        let counts: Vec<usize> = sessions
            .iter()
            .map(|s| app.session_messages("u1", &s.id).unwrap().len())
            .collect();
        assert!(counts.contains(&4));
        assert!(counts.contains(&2));
    }
}
