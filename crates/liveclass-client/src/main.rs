//! `liveclass` command-line client.
//!
//! Thin wrapper over the library: every subcommand performs one operation
//! against the configured backend and prints the result as JSON on stdout.
//! Logs go to stderr.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use common::types::{MeetingId, ParticipantId, SessionId};
use liveclass_client::calendar;
use liveclass_client::models::ParticipantRole;
use liveclass_client::participants::AddOutcome;
use liveclass_client::recordings::ArchiveDestination;
use liveclass_client::scheduler::MeetingState;
use liveclass_client::{ClientConfig, ClientError, LiveClassClient};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "liveclass")]
#[command(about = "Manage live-class sessions, meetings and recordings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, inspect and delete sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Manage a session's participants
    Participants {
        #[command(subcommand)]
        action: ParticipantAction,
    },
    /// Schedule a session's meeting
    Meetings {
        #[command(subcommand)]
        action: MeetingAction,
    },
    /// List, stream and archive recordings
    Recordings {
        #[command(subcommand)]
        action: RecordingAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// List sessions, newest first
    List,
    /// Show one session with its participants and meetings
    Show { session_id: String },
    /// Create a session
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a session
    Delete { session_id: String },
}

#[derive(Subcommand)]
enum ParticipantAction {
    /// Add comma-separated e-mail addresses
    Add {
        session_id: String,
        emails: String,
        #[arg(long, default_value = "student")]
        role: ParticipantRole,
    },
    /// Remove one participant
    Remove {
        session_id: String,
        participant_id: String,
    },
    /// E-mail join details to every participant
    Invite { session_id: String },
}

#[derive(Subcommand)]
enum MeetingAction {
    /// Schedule the meeting (updates it if one exists)
    Schedule { session_id: String, when: String },
    /// Move an existing meeting
    Reschedule {
        session_id: String,
        meeting_id: String,
        when: String,
    },
    /// List the session's meetings
    List { session_id: String },
    /// Print an iCalendar invitation for the session
    Ics { session_id: String },
}

#[derive(Subcommand)]
enum RecordingAction {
    /// Recordings with download links and archived blobs
    List { session_id: String },
    /// Recordings with streaming links
    Streams { session_id: String },
    /// Copy every recording to remote storage or local disk
    Archive {
        session_id: String,
        #[arg(long, default_value = "remote")]
        to: ArchiveDestination,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ClientConfig::from_env().context("Failed to load configuration")?;
    init_tracing(config.json_logs);

    info!(
        target: "liveclass.cli",
        api_url = %config.api_url,
        "Configuration loaded"
    );

    let client = LiveClassClient::connect(&config).map_err(client_error)?;
    run(&client, cli.command).await
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "liveclass=info,liveclass_client=info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

async fn run(client: &LiveClassClient, command: Commands) -> Result<()> {
    let cancel = CancellationToken::new();

    match command {
        Commands::Sessions { action } => match action {
            SessionAction::List => {
                let sessions = client
                    .repository
                    .list(&cancel)
                    .await
                    .map_err(client_error)?;
                print(&sessions)
            }
            SessionAction::Show { session_id } => {
                let session = client
                    .repository
                    .load(&SessionId::new(session_id), &cancel)
                    .await
                    .map_err(client_error)?;
                print(&session)
            }
            SessionAction::Create { title, description } => {
                let session = client
                    .repository
                    .create(&title, description.as_deref())
                    .await
                    .map_err(client_error)?;
                print(&session)
            }
            SessionAction::Delete { session_id } => {
                let id = SessionId::new(session_id);
                client
                    .repository
                    .remove(&id)
                    .await
                    .map_err(client_error)?;
                print(&serde_json::json!({ "deleted": id }))
            }
        },

        Commands::Participants { action } => match action {
            ParticipantAction::Add {
                session_id,
                emails,
                role,
            } => {
                let outcome = client
                    .participants
                    .add_participants(&SessionId::new(session_id), &emails, role)
                    .await
                    .map_err(client_error)?;
                match outcome {
                    AddOutcome::Nothing => Err(anyhow!("No e-mail addresses given")),
                    AddOutcome::Added(participants) => print(&participants),
                }
            }
            ParticipantAction::Remove {
                session_id,
                participant_id,
            } => {
                let participant_id = ParticipantId::new(participant_id);
                client
                    .participants
                    .remove_participant(&SessionId::new(session_id), &participant_id)
                    .await
                    .map_err(client_error)?;
                print(&serde_json::json!({ "removed": participant_id }))
            }
            ParticipantAction::Invite { session_id } => {
                let detail = client
                    .participants
                    .send_invites(&SessionId::new(session_id))
                    .await
                    .map_err(client_error)?;
                print(&serde_json::json!({ "detail": detail }))
            }
        },

        Commands::Meetings { action } => match action {
            MeetingAction::Schedule { session_id, when } => {
                let id = SessionId::new(session_id);
                client
                    .repository
                    .load(&id, &cancel)
                    .await
                    .map_err(client_error)?;
                let meeting = client
                    .scheduler
                    .schedule(&id, Some(&when))
                    .await
                    .map_err(client_error)?;
                print(&meeting)
            }
            MeetingAction::Reschedule {
                session_id,
                meeting_id,
                when,
            } => {
                let id = SessionId::new(session_id);
                client
                    .repository
                    .load(&id, &cancel)
                    .await
                    .map_err(client_error)?;
                let meeting = client
                    .scheduler
                    .reschedule(&id, &MeetingId::new(meeting_id), Some(&when))
                    .await
                    .map_err(client_error)?;
                print(&meeting)
            }
            MeetingAction::List { session_id } => {
                let meetings = client
                    .scheduler
                    .refresh_meetings(&SessionId::new(session_id), &cancel)
                    .await
                    .map_err(client_error)?;
                print(&meetings)
            }
            MeetingAction::Ics { session_id } => {
                let id = SessionId::new(session_id);
                let session = client
                    .repository
                    .load(&id, &cancel)
                    .await
                    .map_err(client_error)?;
                let ics = match client.scheduler.state(&id) {
                    MeetingState::Scheduled(meeting) => {
                        calendar::meeting_invite(&session, &meeting, Utc::now())
                            .map_err(client_error)?
                    }
                    MeetingState::Unscheduled => calendar::placeholder_invite(&session, Utc::now()),
                };
                print!("{ics}");
                Ok(())
            }
        },

        Commands::Recordings { action } => match action {
            RecordingAction::List { session_id } => {
                let listing = client
                    .recordings
                    .list_downloadable(&SessionId::new(session_id), &cancel)
                    .await
                    .map_err(client_error)?;
                print(&listing)
            }
            RecordingAction::Streams { session_id } => {
                let recordings = client
                    .recordings
                    .list_streamable(&SessionId::new(session_id), &cancel)
                    .await
                    .map_err(client_error)?;
                print(&recordings)
            }
            RecordingAction::Archive { session_id, to } => {
                let report = client
                    .recordings
                    .archive(&SessionId::new(session_id), to)
                    .await
                    .map_err(client_error)?;
                print(&report)
            }
        },
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn client_error(error: ClientError) -> anyhow::Error {
    anyhow!(error.user_message())
}
