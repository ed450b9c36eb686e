use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use doodle_contracts::config::PipelineConfig;
use doodle_contracts::program::validate::rejection_reason;
use doodle_contracts::speech::{SpeechQueue, SpeechSink};
use doodle_contracts::style;
use doodle_contracts::trace::TracePayload;
use doodle_contracts::transcript::Transcription;
use doodle_engine::{mock_program, Renderer, SketchEngine};

#[derive(Parser)]
#[command(name = "doodle-rs", version, about = "Voice-command drawing pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive session: one drawing command per line on stdin.
    Chat {
        #[arg(long, default_value = "out")]
        out: PathBuf,
        #[arg(long, default_value_t = 60)]
        frames: u64,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        fps: Option<u64>,
    },
    /// Process one command and save the final frame as a PNG.
    Run {
        #[arg(long)]
        command: String,
        #[arg(long, default_value = "out")]
        out: PathBuf,
        #[arg(long, default_value_t = 60)]
        frames: u64,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        fps: Option<u64>,
    },
    /// Parse a command and print the intent as JSON.
    Parse {
        #[arg(long)]
        command: String,
    },
    /// Check a program file against the generation acceptance rules.
    Validate {
        #[arg(long)]
        file: PathBuf,
    },
    /// Render the offline demo program for a command.
    Demo {
        #[arg(long)]
        command: String,
        #[arg(long, default_value = "out")]
        out: PathBuf,
        #[arg(long, default_value_t = 1)]
        frames: u64,
    },
}

/// Speech sink for a terminal session: utterances go to stdout.
struct LogSink;

impl SpeechSink for LogSink {
    fn speak(&mut self, text: &str) -> Result<()> {
        println!("[voice] {text}");
        Ok(())
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("doodle-rs error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat {
            out,
            frames,
            config,
            fps,
        } => {
            let config = PipelineConfig::load_or_default(config.as_deref())?;
            let mut engine = SketchEngine::new(&out, out.join("events.jsonl"), config)?;
            let mut speech = SpeechQueue::new(LogSink, engine.config().feedback.clone());
            chat(&mut engine, &mut speech, &out, frames, fps)
        }
        Command::Run {
            command,
            out,
            frames,
            config,
            fps,
        } => {
            let config = PipelineConfig::load_or_default(config.as_deref())?;
            let mut engine = SketchEngine::new(&out, out.join("events.jsonl"), config)?;
            let mut speech = SpeechQueue::new(LogSink, engine.config().feedback.clone());
            let output = out.join("sketch.png");
            render_command(&mut engine, &mut speech, &command, &output, frames, fps)
        }
        Command::Parse { command } => {
            let intent = doodle_contracts::intent::parse(&command);
            println!("{}", serde_json::to_string_pretty(&intent)?);
            Ok(())
        }
        Command::Validate { file } => {
            let code = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            match rejection_reason(&code) {
                Some(reason) => bail!("{}: {reason}", file.display()),
                None => {
                    println!("{}: ok", file.display());
                    Ok(())
                }
            }
        }
        Command::Demo {
            command,
            out,
            frames,
        } => {
            std::fs::create_dir_all(&out)
                .with_context(|| format!("creating output dir {}", out.display()))?;
            let mut renderer = Renderer::new(style::CANVAS_WIDTH, style::CANVAS_HEIGHT);
            renderer.start_session(&mock_program(&command))?;
            for _ in 0..frames.max(1) {
                renderer.advance_frame()?;
            }
            let output = out.join("demo.png");
            renderer.save_frame(&output)?;
            println!("saved {}", output.display());
            Ok(())
        }
    }
}

fn chat(
    engine: &mut SketchEngine,
    speech: &mut SpeechQueue<LogSink>,
    out: &Path,
    frames: u64,
    fps: Option<u64>,
) -> Result<()> {
    println!("doodle-rs interactive session. Type a drawing command, /help, or /quit.");
    let stdin = std::io::stdin();
    let mut index = 0u32;
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        // Terminal lines stand in for finished utterances.
        let transcription = Transcription::final_utterance(line.trim());
        if !transcription.should_dispatch() {
            continue;
        }
        match transcription.final_text.as_str() {
            "/quit" | "/exit" => break,
            "/help" => {
                println!("Say things like \"draw a red circle\" or \"draw three spinning squares\".");
                println!("/quit ends the session.");
                continue;
            }
            text => {
                index += 1;
                let output = out.join(format!("sketch-{index:03}.png"));
                if let Err(err) = render_command(engine, speech, text, &output, frames, fps) {
                    eprintln!("doodle-rs error: {err:#}");
                }
            }
        }
    }
    Ok(())
}

fn render_command(
    engine: &mut SketchEngine,
    speech: &mut SpeechQueue<LogSink>,
    command: &str,
    output: &Path,
    frames: u64,
    fps: Option<u64>,
) -> Result<()> {
    emit_speech(engine, "processing")?;
    speech.say_processing()?;
    speech.utterance_finished()?;

    let report = match engine.process_command(command) {
        Ok(report) => report,
        Err(err) => {
            emit_speech(engine, "error")?;
            speech.say_error()?;
            speech.utterance_finished()?;
            return Err(err);
        }
    };

    let delay = fps
        .filter(|fps| *fps > 0)
        .map(|fps| Duration::from_millis(1000 / fps));
    for _ in 0..frames.max(1) {
        if let Err(err) = engine.renderer_mut().advance_frame() {
            emit_speech(engine, "error")?;
            speech.say_error()?;
            speech.utterance_finished()?;
            return Err(err);
        }
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
    }

    engine.renderer().save_frame(output)?;
    let mut payload = TracePayload::new();
    payload.insert(
        "path".to_string(),
        Value::String(output.display().to_string()),
    );
    payload.insert(
        "frames".to_string(),
        Value::from(engine.renderer().frame_count()),
    );
    engine.emit("frame_saved", payload)?;
    println!(
        "saved {} (session {}, provider {})",
        output.display(),
        report.session_id,
        report.provider
    );

    emit_speech(engine, "confirmation")?;
    speech.say_confirmation()?;
    speech.utterance_finished()?;
    Ok(())
}

fn emit_speech(engine: &SketchEngine, kind: &str) -> Result<()> {
    let mut payload = TracePayload::new();
    payload.insert("kind".to_string(), Value::String(kind.to_string()));
    engine.emit("speech_queued", payload)?;
    Ok(())
}
