//! loandesk - case-file client CLI
//!
//! Drives the client against a live backend: sign in, submit steps, decide
//! files, fetch documents and follow live notifications.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use loandesk_client::{ClientConfig, Command, CommandOutput, HubEvent, LoandeskClient, NoticeKind, RunOutcome};
use loandesk_core::{Attachment, CaseFile, Decision, FileId, FileStatus, Step, StepPayload};
use tracing_subscriber::EnvFilter;

/// loandesk - case-file client
#[derive(Parser, Debug)]
#[command(name = "loandesk")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to TOML configuration; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in and persist the session
    Login {
        #[arg(long)]
        email: String,
        /// Falls back to LOANDESK_PASSWORD
        #[arg(long, env = "LOANDESK_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Drop the persisted session
    Logout,

    /// Show the current session
    Session,

    /// Submit one step of a case file
    Submit {
        #[arg(long)]
        step: Step,
        /// JSON file with the form fields
        #[arg(long)]
        payload: PathBuf,
        /// Existing file; steps before `step` count as completed
        #[arg(long)]
        file_id: Option<String>,
        /// Attachment as `field=path`, repeatable
        #[arg(long = "attach")]
        attachments: Vec<String>,
    },

    /// Approve or reject a file after retyping the challenge
    Decide {
        #[arg(long)]
        file_id: String,
        #[arg(long, value_enum)]
        decision: DecisionArg,
        #[arg(long, default_value = "")]
        remarks: String,
    },

    /// Print the collection dashboard
    Dashboard,

    /// Generate a notice PDF
    Notice {
        #[arg(long, value_enum)]
        kind: NoticeArg,
        /// JSON file with the notice fields
        #[arg(long)]
        body: PathBuf,
        /// Where to write the PDF
        #[arg(long)]
        out: PathBuf,
    },

    /// Follow live notifications until interrupted
    Watch,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DecisionArg {
    Approve,
    Reject,
}

impl From<DecisionArg> for Decision {
    fn from(value: DecisionArg) -> Self {
        match value {
            DecisionArg::Approve => Decision::Approve,
            DecisionArg::Reject => Decision::Reject,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum NoticeArg {
    Legal,
    Company,
}

impl From<NoticeArg> for NoticeKind {
    fn from(value: NoticeArg) -> Self {
        match value {
            NoticeArg::Legal => NoticeKind::Legal,
            NoticeArg::Company => NoticeKind::Company,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = match &cli.config {
        Some(path) => ClientConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => ClientConfig::new(),
    };
    let client = LoandeskClient::from_config(config)?;
    client.resume().context("reading persisted session")?;

    match cli.command {
        Commands::Login { email, password } => {
            let output = finish(client.coordinator().dispatch(Command::Login { email, password }).await)?;
            if let Some(CommandOutput::SignedIn { landing }) = output {
                println!("signed in, landing on {landing}");
            }
        }
        Commands::Logout => {
            finish(client.logout().await)?;
            println!("signed out");
        }
        Commands::Session => {
            let snapshot = client.session().snapshot();
            println!("{}", serde_json::to_string_pretty(&SessionView::from(&snapshot))?);
        }
        Commands::Submit {
            step,
            payload,
            file_id,
            attachments,
        } => {
            let coordinator = client.coordinator();
            let draft = match file_id {
                Some(id) => coordinator.case_files().load(existing_file(FileId::from(id), step))?,
                None => coordinator.case_files().open_default(),
            };
            let mut payload = StepPayload::from_json(read_json(&payload)?);
            for arg in attachments {
                payload = payload.with_attachment(read_attachment(&arg)?);
            }
            let output = finish(
                coordinator
                    .dispatch(Command::SubmitStep { draft, step, payload })
                    .await,
            )?;
            if let Some(CommandOutput::StepSubmitted { transition, file_id }) = output {
                println!("{transition:?}");
                if let Some(id) = file_id {
                    println!("file id: {id}");
                }
            }
        }
        Commands::Decide {
            file_id,
            decision,
            remarks,
        } => {
            let form = client.approval().open(FileId::from(file_id));
            println!("type {} to confirm:", form.challenge());
            let mut confirmation = String::new();
            std::io::stdin().lock().read_line(&mut confirmation)?;
            let confirmation = confirmation.trim_end_matches(['\r', '\n']);
            let outcome = client
                .approval()
                .request_decision(&form, decision.into(), remarks, confirmation)
                .await;
            if let Some(CommandOutput::Decided { file_id, decision, .. }) = finish(outcome)? {
                println!("{file_id}: {decision}");
            }
        }
        Commands::Dashboard => {
            if let Some(CommandOutput::Dashboard(data)) =
                finish(client.coordinator().dispatch(Command::FetchDashboard).await)?
            {
                println!("{}", serde_json::to_string_pretty(&data)?);
            }
        }
        Commands::Notice { kind, body, out } => {
            let command = Command::EditNotice {
                kind: kind.into(),
                body: read_json(&body)?,
            };
            if let Some(CommandOutput::Notice(bytes)) = finish(client.coordinator().dispatch(command).await)? {
                std::fs::write(&out, &bytes).with_context(|| format!("writing {}", out.display()))?;
                println!("wrote {} bytes to {}", bytes.len(), out.display());
            }
        }
        Commands::Watch => watch(&client).await?,
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn finish(outcome: RunOutcome<CommandOutput>) -> Result<Option<CommandOutput>> {
    match outcome {
        RunOutcome::Completed(output) => Ok(Some(output)),
        RunOutcome::Failed(err) => bail!("{} ({})", err.user_message(), err.kind()),
        RunOutcome::Dropped => Ok(None),
    }
}

async fn watch(client: &LoandeskClient) -> Result<()> {
    let hub = client.hub();
    let mut events = hub.subscribe();
    hub.ensure_connected().await?;
    println!("watching notifications, ctrl-c to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(HubEvent::Received(n)) => println!("[{}] {}: {}", n.created_at, n.title, n.message),
                Ok(HubEvent::Chime) => print!("\x07"),
                Ok(HubEvent::BadgeChanged { unread }) => println!("unread: {unread}"),
                Ok(HubEvent::ListReplaced { count }) => println!("{count} notifications"),
                Ok(HubEvent::Disconnected) => {
                    println!("disconnected, reconnecting");
                    hub.ensure_connected().await?;
                }
                Ok(other) => tracing::debug!(?other, "hub event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "watch fell behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    hub.disconnect().await;
    Ok(())
}

/// Case file as the server holds it when submitting `step` of an existing file
fn existing_file(id: FileId, step: Step) -> CaseFile {
    let steps = Step::ALL.to_vec();
    let completed = steps.iter().copied().take_while(|s| *s != step).collect();
    CaseFile {
        id: Some(id),
        steps,
        completed,
        verified: Default::default(),
        active: step,
        status: FileStatus::Pending,
    }
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn read_attachment(arg: &str) -> Result<Attachment> {
    let Some((field, path)) = arg.split_once('=') else {
        bail!("attachment must be field=path, got '{arg}'");
    };
    let path = Path::new(path);
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
    let mime = match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    };
    Ok(Attachment {
        field: field.to_string(),
        file_name,
        mime: mime.to_string(),
        bytes,
    })
}

/// Session as printed; the token is never shown
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionView<'a> {
    authenticated: bool,
    employee_id: Option<&'a str>,
    organizations: Vec<&'a str>,
}

impl<'a> From<&'a loandesk_core::SessionSnapshot> for SessionView<'a> {
    fn from(snapshot: &'a loandesk_core::SessionSnapshot) -> Self {
        Self {
            authenticated: snapshot.authenticated,
            employee_id: snapshot.employee_id.as_deref(),
            organizations: snapshot.organizations.iter().map(|m| m.id.as_str()).collect(),
        }
    }
}
