use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use omnisearch::gemini::GeminiClient;
use omnisearch::voice::{
    AudioContext, AudioOutput, GeminiTts, PcmFormat, PlaybackController, PlaybackHandle,
    PlaybackOutcome, SpeechFetcher, decode_pcm16,
};
use omnisearch::{
    Assistant, ChatSession, Config, ImageAttachment, LegalMethod, Role, SessionStore, SourceScope,
    Voice,
};

/// OmniSearch - search-grounded AI chat with spoken answers
#[derive(Parser)]
#[command(name = "omnisearch", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Voice for spoken answers (kore/female, fenrir/male)
    #[arg(long, env = "OMNISEARCH_VOICE", global = true)]
    voice: Option<Voice>,

    /// Jurisdiction focus (global, nigeria)
    #[arg(long, global = true)]
    scope: Option<SourceScope>,

    /// Legal analysis method (none, irac, ipac, crec)
    #[arg(long, global = true)]
    method: Option<LegalMethod>,

    /// Read every answer aloud
    #[arg(long, global = true)]
    speak: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Ask one question in the current session
    Ask {
        /// Question to ask
        prompt: String,
        /// Attach an image (repeatable)
        #[arg(long = "image")]
        images: Vec<PathBuf>,
    },
    /// Interactive chat (default)
    Chat,
    /// Speak arbitrary text
    Speak {
        /// Text to speak
        text: String,
        /// Write a WAV file instead of playing
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Manage stored sessions
    Sessions {
        #[command(subcommand)]
        action: Option<SessionsCommand>,
    },
    /// Play a short tone through the default output
    TestSpeaker,
}

#[derive(Subcommand)]
enum SessionsCommand {
    /// List sessions, newest first
    List,
    /// Print a session transcript
    Show {
        /// Session id, id prefix or list position
        session: String,
    },
    /// Start a new session
    New,
    /// Delete a session
    Delete {
        /// Session id, id prefix or list position
        session: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn,omnisearch=info",
        1 => "info,omnisearch=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(voice) = cli.voice {
        config.voice.voice = voice;
    }
    if let Some(scope) = cli.scope {
        config.scope = scope;
    }
    if let Some(method) = cli.method {
        config.method = method;
    }
    if cli.speak {
        config.voice.auto_speak = true;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Chat) {
        Command::Ask { prompt, images } => ask(&config, &prompt, &images).await,
        Command::Chat => chat(&config).await,
        Command::Speak { text, out } => speak(&config, &text, out.as_deref()).await,
        Command::Sessions { action } => sessions(&config, action.unwrap_or(SessionsCommand::List)),
        Command::TestSpeaker => test_speaker().await,
    }
}

/// Ask a single question
async fn ask(config: &Config, prompt: &str, image_paths: &[PathBuf]) -> anyhow::Result<()> {
    let images = image_paths
        .iter()
        .map(|p| load_image(p))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let output: Arc<dyn AudioOutput> = Arc::new(AudioContext::new());
    let mut assistant = Assistant::from_config(config, output)?;

    let index = assistant.submit(prompt, images).await?;
    print_message(assistant.current_session(), index);

    if assistant.settings().auto_speak {
        // submit already started playback
        if assistant.playback().is_playing() {
            wait_for_speech(assistant.playback(), None).await;
        }
    }

    Ok(())
}

/// Interactive chat loop
async fn chat(config: &Config) -> anyhow::Result<()> {
    let output: Arc<dyn AudioOutput> = Arc::new(AudioContext::new());
    let mut assistant = Assistant::from_config(config, output)?;

    println!(
        "OmniSearch - session \"{}\" (voice {}, scope {}, method {})",
        assistant.current_session().title,
        assistant.settings().voice,
        assistant.settings().scope,
        assistant.settings().method,
    );
    println!("Commands: /new /sessions /open N /play N /stop /voice V /auto on|off /scope S /method M /quit\n");
    print_transcript(assistant.current_session());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some(command) = line.strip_prefix('/') else {
            match assistant.submit(line, Vec::new()).await {
                Ok(index) => print_message(assistant.current_session(), index),
                Err(e) => println!("! {e}"),
            }
            continue;
        };

        let (name, arg) = command
            .split_once(' ')
            .map_or((command, ""), |(n, a)| (n, a.trim()));
        match name {
            "quit" | "exit" => break,
            "new" => {
                let session = assistant.new_session();
                println!("new session {}", short_id(&session.id));
                print_transcript(assistant.current_session());
            }
            "sessions" => print_sessions(assistant.sessions()),
            "open" => match assistant.open_session(arg) {
                Ok(session) => print_transcript(session),
                Err(e) => println!("! {e}"),
            },
            "play" => match arg.parse::<usize>() {
                Ok(n) => match assistant.play_message(n.saturating_sub(1)).await {
                    Some(handle) => println!("speaking message {}", handle.message_index() + 1),
                    None => println!("no audio for message {n}"),
                },
                Err(_) => println!("usage: /play N"),
            },
            "stop" => {
                assistant.stop();
            }
            "voice" => match arg.parse::<Voice>() {
                Ok(voice) => {
                    assistant.set_voice(voice);
                    println!("voice: {voice}");
                }
                Err(e) => println!("! {e}"),
            },
            "auto" => {
                let enabled = matches!(arg, "on" | "true" | "1");
                assistant.set_auto_speak(enabled);
                println!("auto-speak: {}", if enabled { "ON" } else { "OFF" });
            }
            "scope" => match arg.parse::<SourceScope>() {
                Ok(scope) => {
                    assistant.set_scope(scope);
                    println!("scope: {scope}");
                }
                Err(e) => println!("! {e}"),
            },
            "method" => match arg.parse::<LegalMethod>() {
                Ok(method) => {
                    assistant.set_method(method);
                    println!("method: {method}");
                }
                Err(e) => println!("! {e}"),
            },
            other => println!("unknown command /{other}"),
        }
    }

    assistant.stop();
    Ok(())
}

/// Synthesize text once and play it or write it to disk
async fn speak(config: &Config, text: &str, out: Option<&Path>) -> anyhow::Result<()> {
    let client = GeminiClient::new(
        config.require_api_key()?,
        &config.api.base_url,
        config.api.timeout,
    )?;
    let fetcher = SpeechFetcher::new(Arc::new(GeminiTts::new(
        client,
        config.api.tts_model.clone(),
    )));

    let Some(bytes) = fetcher.fetch(text, config.voice.voice).await else {
        anyhow::bail!("no audio available for this text");
    };
    let buffer = decode_pcm16(&bytes, PcmFormat::TTS);
    println!(
        "{} frames, {:.1}s at {} Hz",
        buffer.frames(),
        buffer.duration().as_secs_f64(),
        buffer.sample_rate()
    );

    if let Some(path) = out {
        std::fs::write(path, buffer.to_wav()?)?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    let playback = PlaybackController::new(Arc::new(AudioContext::new()));
    let handle = playback.play(0, Arc::new(buffer))?;
    wait_for_speech(&playback, Some(handle)).await;
    Ok(())
}

/// Session management without touching the network
fn sessions(config: &Config, action: SessionsCommand) -> anyhow::Result<()> {
    let mut store = SessionStore::load(config.sessions_path());

    match action {
        SessionsCommand::List => print_sessions(store.sessions()),
        SessionsCommand::Show { session } => {
            let session = store
                .resolve(&session)
                .ok_or_else(|| anyhow::anyhow!("no session matches '{session}'"))?;
            print_transcript(session);
        }
        SessionsCommand::New => {
            let id = store.create();
            store.save()?;
            println!("created session {}", short_id(&id));
        }
        SessionsCommand::Delete { session } => {
            let id = store
                .resolve(&session)
                .map(|s| s.id.clone())
                .ok_or_else(|| anyhow::anyhow!("no session matches '{session}'"))?;
            let removed = store.delete(&id)?;
            store.save()?;
            println!("deleted \"{}\"", removed.title);
        }
    }

    Ok(())
}

/// Play one second of a 440 Hz tone
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");

    let format = PcmFormat::TTS;
    let rate = f64::from(format.sample_rate);
    let pcm: Vec<u8> = (0..format.sample_rate)
        .flat_map(|i| {
            let t = f64::from(i) / rate;
            #[allow(clippy::cast_possible_truncation)]
            let sample = (0.3 * (2.0 * std::f64::consts::PI * 440.0 * t).sin() * 32767.0) as i16;
            sample.to_le_bytes()
        })
        .collect();

    let playback = PlaybackController::new(Arc::new(AudioContext::new()));
    let handle = playback.play(0, Arc::new(decode_pcm16(&pcm, format)))?;
    wait_for_speech(&playback, Some(handle)).await;

    println!("Speaker test complete");
    Ok(())
}

/// Wait for playback to end or Ctrl-C
async fn wait_for_speech(playback: &PlaybackController, handle: Option<PlaybackHandle>) {
    let finished = async {
        match handle {
            Some(handle) => handle.finished().await,
            None => {
                let mut speaking = playback.subscribe();
                let _ = speaking.wait_for(Option::is_none).await;
                PlaybackOutcome::Completed
            }
        }
    };

    tokio::select! {
        outcome = finished => {
            tracing::debug!(?outcome, "speech ended");
        }
        _ = tokio::signal::ctrl_c() => {
            playback.stop();
        }
    }
}

/// Read an image file as a prompt attachment
fn load_image(path: &Path) -> anyhow::Result<ImageAttachment> {
    let bytes = std::fs::read(path)?;
    let mime_type = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    };

    Ok(ImageAttachment {
        mime_type: mime_type.to_string(),
        data: STANDARD.encode(bytes),
    })
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn print_sessions(sessions: &[ChatSession]) {
    if sessions.is_empty() {
        println!("no sessions");
        return;
    }
    for (i, session) in sessions.iter().enumerate() {
        let modified = chrono::DateTime::from_timestamp_millis(session.last_modified)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{:>3}. {}  {}  {} ({} messages)",
            i + 1,
            short_id(&session.id),
            modified,
            session.title,
            session.messages.len()
        );
    }
}

fn print_transcript(session: &ChatSession) {
    for index in 0..session.messages.len() {
        print_message(session, index);
    }
}

fn print_message(session: &ChatSession, index: usize) {
    let Some(message) = session.messages.get(index) else {
        return;
    };
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => "omnisearch",
    };
    println!("[{}] {who}: {}", index + 1, message.content);
    for image in &message.images {
        if image.starts_with("data:") {
            println!("    (image attached)");
        } else {
            println!("    image: {image}");
        }
    }
    for source in &message.sources {
        println!("    - {} <{}>", source.title, source.uri);
    }
    println!();
}
