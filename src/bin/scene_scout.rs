//! scene_scout - submit images to a detection service and review the results
//!
//! Modes:
//! 1. One-shot: `--image <path>` or `--camera` acquires one image, runs
//!    detection, prints the results and optionally writes an annotated PNG
//!    and the text report.
//! 2. Interactive: a line-oriented session (`help` lists commands).
//!
//! The backend liveness monitor runs for the whole process in both modes.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;

use scene_scout::config::ClientConfig;
use scene_scout::overlay::{self, Size};
use scene_scout::report;
use scene_scout::session::{Dispatcher, Notice, SessionController, SessionEvent, SessionState};
use scene_scout::source::{camera, ImageSourceManager};
use scene_scout::ui::Ui;
use scene_scout::{CommandSpeaker, HttpDetectService, HttpProbe, LivenessMonitor, NarrationSink};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Submit images to a remote object-detection service and review the detections"
)]
struct Args {
    /// Detection service base URL (overrides config).
    #[arg(long, env = "SCENE_SCOUT_API_URL")]
    api_url: Option<String>,

    /// Image to submit once, then exit.
    #[arg(long, conflicts_with = "camera")]
    image: Option<PathBuf>,

    /// Capture one camera frame, submit it, then exit.
    #[arg(long)]
    camera: bool,

    /// Write the image with detection boxes drawn to this PNG path (one-shot mode).
    #[arg(long, value_name = "PNG")]
    annotate: Option<PathBuf>,

    /// Write detection_report.txt after a successful detection (one-shot mode).
    #[arg(long)]
    report: bool,

    /// Directory for exported reports (overrides config).
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Speak the scene summary when a result arrives.
    #[arg(long)]
    narrate: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

enum AppEvent {
    Line(String),
    InputClosed,
    Session(SessionEvent),
    Shutdown,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = ClientConfig::load()?;
    if let Some(url) = args.api_url.as_deref() {
        cfg.api_url = scene_scout::config::normalize_base_url(url)?;
    }
    if let Some(dir) = args.report_dir.clone() {
        cfg.report_dir = dir;
    }
    if args.narrate {
        cfg.narration.enabled = true;
    }
    let ui = Ui::from_args(Some(args.ui.as_str()), std::io::stderr().is_terminal());

    let probe = Arc::new(HttpProbe::new(&cfg.api_url, cfg.liveness.timeout));
    let liveness = LivenessMonitor::new(probe, cfg.liveness.interval).spawn()?;
    log::info!("checking backend at {}", cfg.api_url);

    let speaker = CommandSpeaker::new(&cfg.narration.command)?;
    let mut narration = NarrationSink::new(Box::new(speaker));
    narration.set_enabled(cfg.narration.enabled);
    let sources = ImageSourceManager::new(camera::camera_for(&cfg.camera));
    let mut session = SessionController::new(sources, narration);

    let (app_tx, app_rx) = mpsc::channel::<AppEvent>();
    let (session_tx, session_rx) = mpsc::channel::<SessionEvent>();
    let forward_tx = app_tx.clone();
    std::thread::spawn(move || {
        for event in session_rx {
            if forward_tx.send(AppEvent::Session(event)).is_err() {
                break;
            }
        }
    });
    let service = Arc::new(HttpDetectService::new(&cfg.api_url, cfg.detect_timeout));
    let dispatcher = Dispatcher::new(service, session_tx);

    let shutdown_tx = app_tx.clone();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(AppEvent::Shutdown);
    })
    .expect("error setting Ctrl-C handler");

    let outcome = if args.image.is_some() || args.camera {
        run_once(&args, &cfg, &ui, &mut session, &dispatcher, &app_rx)
    } else {
        spawn_stdin_reader(app_tx);
        run_interactive(&cfg, &mut session, &dispatcher, &app_rx, &liveness)
    };

    session.shutdown();
    liveness.stop()?;
    outcome
}

fn run_once(
    args: &Args,
    cfg: &ClientConfig,
    ui: &Ui,
    session: &mut SessionController,
    dispatcher: &Dispatcher,
    events: &mpsc::Receiver<AppEvent>,
) -> Result<()> {
    {
        let _stage = ui.stage("Acquire image");
        if let Some(path) = &args.image {
            session.handle(SessionEvent::FileChosen(path.clone()));
        } else {
            session.handle(SessionEvent::CameraActivated);
            session.handle(SessionEvent::CaptureRequested);
        }
    }
    print_notices(session);
    if session.state() != SessionState::ImageReady {
        return Err(anyhow!("no image acquired"));
    }

    let mut stage = ui.stage("Run detection");
    session
        .submit_with(|submission| dispatcher.dispatch(submission))
        .ok_or_else(|| anyhow!("submission was not started"))?;
    while session.state() == SessionState::Submitting {
        match events.recv().context("event channel closed")? {
            AppEvent::Session(event) => {
                session.handle(event);
            }
            AppEvent::Shutdown => {
                stage.fail();
                return Err(anyhow!("interrupted"));
            }
            AppEvent::Line(_) | AppEvent::InputClosed => {}
        }
    }
    if session.state() == SessionState::Error {
        stage.fail();
    }
    drop(stage);
    print_notices(session);

    let Some(result) = session.result() else {
        return Err(anyhow!("detection failed"));
    };
    print!("{}", report::render_summary(result));

    if let Some(path) = &args.annotate {
        write_annotated(session, path)?;
        println!("annotated image written to {}", path.display());
    }
    if args.report {
        if let Some(path) = session.export_report(&cfg.report_dir)? {
            println!("report written to {}", path.display());
        }
    }
    Ok(())
}

fn run_interactive(
    cfg: &ClientConfig,
    session: &mut SessionController,
    dispatcher: &Dispatcher,
    events: &mpsc::Receiver<AppEvent>,
    liveness: &scene_scout::LivenessHandle,
) -> Result<()> {
    println!("scene_scout ready; target {}. Type 'help' for commands.", cfg.api_url);
    prompt();
    for event in events.iter() {
        match event {
            AppEvent::Shutdown | AppEvent::InputClosed => break,
            AppEvent::Session(event) => {
                let before = session.state();
                session.handle(event);
                if session.state() == before {
                    continue;
                }
                match session.state() {
                    SessionState::ResultReady => {
                        if let Some(result) = session.result() {
                            println!();
                            print!("{}", report::render_summary(result));
                        }
                    }
                    SessionState::Error => println!("\ndetection failed"),
                    _ => {}
                }
                print_notices(session);
                prompt();
            }
            AppEvent::Line(line) => {
                let keep_going = run_command(line.trim(), cfg, session, dispatcher, liveness);
                print_notices(session);
                if !keep_going {
                    break;
                }
                prompt();
            }
        }
    }
    Ok(())
}

fn run_command(
    line: &str,
    cfg: &ClientConfig,
    session: &mut SessionController,
    dispatcher: &Dispatcher,
    liveness: &scene_scout::LivenessHandle,
) -> bool {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match command {
        "" => {}
        "open" if !rest.is_empty() => {
            session.handle(SessionEvent::FileChosen(PathBuf::from(rest)));
            describe_image(session);
        }
        "upload" => {
            session.handle(SessionEvent::FileModeSelected);
            println!("file mode");
        }
        "camera" => {
            session.handle(SessionEvent::CameraActivated);
            if session.sources().is_streaming() {
                println!("camera live; type 'capture' to take a still");
            }
        }
        "capture" => {
            session.handle(SessionEvent::CaptureRequested);
            describe_image(session);
        }
        "detect" => {
            let already_running = session.state() == SessionState::Submitting;
            match session.submit_with(|submission| dispatcher.dispatch(submission)) {
                Some(_) if session.state() == SessionState::Submitting => {
                    println!("processing image...");
                }
                Some(_) => println!("detection failed"),
                None if already_running => println!("detection already running"),
                None => println!("select an image first"),
            }
        }
        "clear" => {
            session.handle(SessionEvent::ClearRequested);
            println!("selection cleared");
        }
        "narrate" => {
            session.handle(SessionEvent::NarrationToggled);
            let state = if session.narration_enabled() { "on" } else { "off" };
            println!("voice feedback {}", state);
        }
        "report" => match session.export_report(&cfg.report_dir) {
            Ok(Some(path)) => println!("report written to {}", path.display()),
            Ok(None) => println!("no result to export"),
            Err(err) => eprintln!("error: {:#}", err),
        },
        "status" => {
            let backend = liveness.status();
            println!("backend: {}", backend.label());
            if backend == scene_scout::BackendStatus::Offline {
                println!("  target: {}", cfg.api_url);
            }
            println!("session: {:?}", session.state());
            println!("source: {:?}", session.source_mode());
        }
        "show" => show_overlay(session, rest),
        "help" => print_help(),
        "quit" | "exit" => return false,
        _ => println!("unknown command '{}'; type 'help'", line),
    }
    true
}

fn show_overlay(session: &SessionController, size_arg: &str) {
    let Some(result) = session.result() else {
        println!("no result to show");
        return;
    };
    let natural = session.image().and_then(|image| image.dimensions());
    let container = match parse_size(size_arg).or(natural) {
        Some((w, h)) => Size::new(w as f64, h as f64),
        None => {
            println!("image size unknown; use 'show <W>x<H>'");
            return;
        }
    };
    println!(
        "{} [{}] in {}x{}",
        result.filename,
        report::badge(result),
        container.width,
        container.height
    );
    for annotation in session.overlay(container) {
        println!(
            "  {:<24} left={:.1} top={:.1} w={:.1} h={:.1} [{}]",
            annotation.caption(),
            annotation.rect.left,
            annotation.rect.top,
            annotation.rect.width,
            annotation.rect.height,
            annotation.tier.label()
        );
    }
}

fn parse_size(arg: &str) -> Option<(u32, u32)> {
    let (w, h) = arg.split_once('x')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

fn write_annotated(session: &SessionController, path: &Path) -> Result<()> {
    let working = session
        .image()
        .ok_or_else(|| anyhow!("no image to annotate"))?;
    let mut canvas = image::load_from_memory(&working.payload())
        .context("decode image for annotation")?
        .into_rgb8();
    let (w, h) = canvas.dimensions();
    let annotations = session.overlay(Size::new(w as f64, h as f64));
    overlay::draw_annotations(&mut canvas, &annotations, 2);
    canvas
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("write annotated image {}", path.display()))?;
    Ok(())
}

fn describe_image(session: &SessionController) {
    if let Some(image) = session.image() {
        println!(
            "{} ready as {} ({} bytes)",
            image.origin_filename(),
            image.display(),
            image.payload().len()
        );
    }
}

fn print_notices(session: &mut SessionController) {
    for notice in session.take_notices() {
        match notice {
            Notice::SubmissionFailed(msg) => eprintln!("error: {}", msg),
            Notice::AcquisitionFailed(msg) => eprintln!("could not load image: {}", msg),
            Notice::CameraUnavailable(msg) => eprintln!("camera unavailable: {}", msg),
        }
    }
}

fn spawn_stdin_reader(tx: mpsc::Sender<AppEvent>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(AppEvent::Line(line)).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    log::warn!("stdin read failed: {}", err);
                    break;
                }
            }
        }
        let _ = tx.send(AppEvent::InputClosed);
    });
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn print_help() {
    println!("commands:");
    println!("  open <path>   select an image file");
    println!("  upload        switch to file mode (clears selection)");
    println!("  camera        start the live camera (clears selection)");
    println!("  capture       take a still from the live camera");
    println!("  detect        run detection on the selected image");
    println!("  clear         remove the selected image and result");
    println!("  narrate       toggle spoken scene summaries");
    println!("  report        write {}", report::REPORT_FILENAME);
    println!("  show [WxH]    list detection boxes mapped into a WxH view");
    println!("  status        backend, session and source state");
    println!("  quit          exit");
}
