//! Interactive camera remote: one command per line on stdin.
//!
//! Usage: `fuji-remote [CONFIG.json] [OUTPUT_DIR]`

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use fuji_remote::{
    AutoFocusPoint, ClientConfig, Convergence, Frame, LiveView, Property, RecordingTracker,
    Session, StepProperty, TcpConnector,
};

const HELP: &str = "\
commands:
  connect
  info | caps | shutter
  iso VALUE | white_balance VALUE | film_simulation VALUE | flash VALUE | timer VALUE
  aperture STEPS | set_aperture F_NUMBER            (set_aperture 5.6)
  shutter_speed STEPS | set_shutter_speed SECONDS   (set_shutter_speed 1/250)
  exposure_compensation STEPS | set_exposure_compensation EV   (-2/3, 0.7, 1)
  focus_point X Y | unlock_focus
  start_record | stop_record [ID]
  stream | stop_stream
  quit";

struct Stream {
    live_view: LiveView,
    writer: JoinHandle<Result<u64>>,
}

struct Remote {
    config: ClientConfig,
    output_dir: PathBuf,
    session: Option<Session<TcpConnector>>,
    recording: RecordingTracker,
    stream: Option<Stream>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let config = match args.get(1) {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path))?,
        None => ClientConfig::default(),
    }
    .with_env()
    .context("invalid environment override")?;
    init_tracing(&config.log_filter);

    let output_dir = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("liveview"));
    info!(host = %config.host, output_dir = %output_dir.display(), "fuji-remote ready");

    let mut remote = Remote {
        config,
        output_dir,
        session: None,
        recording: RecordingTracker::new(),
        stream: None,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", HELP);
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = words.split_first() else {
            continue;
        };
        if command == "quit" {
            break;
        }
        if let Err(e) = remote.run(command, args).await {
            eprintln!("{}: {:#}", command, e);
        }
    }

    remote.shutdown().await
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

impl Remote {
    async fn run(&mut self, command: &str, args: &[&str]) -> Result<()> {
        match command {
            "help" => println!("{}", HELP),
            "connect" => self.connect().await?,
            "info" => {
                let settings = self.session()?.fetch_settings().await?;
                println!("{}", serde_json::to_string_pretty(settings)?);
            }
            "caps" => {
                let capabilities = self.session()?.capabilities();
                println!("{}", serde_json::to_string_pretty(capabilities)?);
            }
            "shutter" => {
                let notice = self.session()?.shutter().await?;
                println!("captured ({})", hex::encode(notice));
            }
            "iso" => self.set(Property::Iso, args).await?,
            "white_balance" => self.set(Property::WhiteBalance, args).await?,
            "film_simulation" => self.set(Property::FilmSimulation, args).await?,
            "flash" => self.set(Property::Flash, args).await?,
            "timer" => self.set(Property::SelfTimer, args).await?,
            "aperture" => self.step(StepProperty::Aperture, args).await?,
            "shutter_speed" => self.step(StepProperty::ShutterSpeed, args).await?,
            "exposure_compensation" => {
                self.step(StepProperty::ExposureCompensation, args).await?
            }
            "set_aperture" => {
                let target = parse_f_number(arg(args, 0)?)?;
                let result = self.session()?.set_aperture(target).await?;
                report(&result);
            }
            "set_shutter_speed" => {
                let target = parse_exposure_time(arg(args, 0)?)?;
                let result = self.session()?.set_shutter_speed(target).await?;
                report(&result);
            }
            "set_exposure_compensation" => {
                let target = parse_ev(arg(args, 0)?)?;
                let result = self.session()?.set_exposure_compensation(target).await?;
                report(&result);
            }
            "focus_point" => {
                let x = arg(args, 0)?.parse().context("x must be a number")?;
                let y = arg(args, 1)?.parse().context("y must be a number")?;
                let point = AutoFocusPoint::new(x, y)?;
                let settings = self.session()?.set_focus_point(point).await?;
                println!("{}", serde_json::to_string_pretty(settings)?);
            }
            "unlock_focus" => {
                self.session()?.unlock_focus().await?;
            }
            "start_record" => {
                let session = self.session.as_mut().ok_or_else(not_connected)?;
                let id = self.recording.start(session).await?;
                println!("recording {}", id);
            }
            "stop_record" => {
                let session = self.session.as_mut().ok_or_else(not_connected)?;
                match args.first() {
                    Some(id) => {
                        let id = id.parse().context("recording id must be a number")?;
                        self.recording.stop(session, id).await?
                    }
                    None => self.recording.stop_active(session).await?,
                }
                println!("recording stopped");
            }
            "stream" => self.start_stream().await?,
            "stop_stream" => self.stop_stream().await?,
            other => bail!("unknown command {:?}, try help", other),
        }
        Ok(())
    }

    fn session(&mut self) -> Result<&mut Session<TcpConnector>> {
        self.session.as_mut().ok_or_else(not_connected)
    }

    async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            bail!("already connected");
        }
        let connector = TcpConnector::new(&self.config);
        let mut session = Session::connect(connector, &self.config)
            .await
            .with_context(|| format!("failed to connect to camera at {}", self.config.host))?;
        println!(
            "connected, {} capability descriptors",
            session.capabilities().descriptors().len()
        );
        let settings = session
            .fetch_settings()
            .await
            .map(|settings| serde_json::to_string_pretty(settings));
        self.session = Some(session);
        println!("{}", settings??);
        Ok(())
    }

    async fn set(&mut self, property: Property, args: &[&str]) -> Result<()> {
        let value = parse_value(property, arg(args, 0)?)?;
        let settings = self.session()?.set_property(property, value).await?;
        println!("{}", serde_json::to_string_pretty(settings)?);
        Ok(())
    }

    async fn step(&mut self, property: StepProperty, args: &[&str]) -> Result<()> {
        let count = arg(args, 0)?
            .parse()
            .context("step count must be a signed integer")?;
        let settings = self.session()?.step(property, count).await?;
        match settings.get(property.property()) {
            Some(value) => println!("{} = {}", property.property(), value),
            None => println!("{} not reported", property.property()),
        }
        Ok(())
    }

    async fn start_stream(&mut self) -> Result<()> {
        if self.stream.is_some() {
            bail!("live view already running");
        }
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("failed to create {}", self.output_dir.display()))?;

        let (tx, rx) = mpsc::channel(8);
        let live_view = LiveView::start(self.session()?, tx).await?;
        let writer = tokio::spawn(save_frames(rx, self.output_dir.clone()));
        self.stream = Some(Stream { live_view, writer });
        println!("streaming to {}", self.output_dir.display());
        Ok(())
    }

    async fn stop_stream(&mut self) -> Result<()> {
        let Stream { live_view, writer } = self.stream.take().ok_or_else(|| anyhow!("not streaming"))?;
        let received = live_view.stop().await?;
        let saved = writer.await.context("frame writer panicked")??;
        println!("live view stopped, {} frames received, {} saved", received, saved);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.stream.is_some() {
            if let Err(e) = self.stop_stream().await {
                warn!(error = %e, "live view did not stop cleanly");
            }
        }
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        if self.recording.is_recording() {
            if let Err(e) = self.recording.stop_active(&mut session).await {
                warn!(error = %e, "recording left running");
            }
        }
        session.close().await.context("failed to close session")?;
        Ok(())
    }
}

async fn save_frames(mut frames: mpsc::Receiver<Frame>, dir: PathBuf) -> Result<u64> {
    let mut saved = 0;
    while let Some(frame) = frames.recv().await {
        let path = frame_path(&dir, frame.preamble.frame_number());
        tokio::fs::write(&path, frame.jpeg())
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        saved += 1;
    }
    Ok(saved)
}

fn frame_path(dir: &Path, frame_number: u32) -> PathBuf {
    dir.join(format!("frame_{:08}.jpg", frame_number))
}

fn not_connected() -> anyhow::Error {
    anyhow!("not connected, run connect first")
}

fn arg<'a>(args: &[&'a str], position: usize) -> Result<&'a str> {
    args.get(position)
        .copied()
        .ok_or_else(|| anyhow!("missing argument {}", position + 1))
}

fn report(result: &Convergence) {
    match result.achieved {
        Some(value) => println!("{:?} after {} steps, value {}", result.outcome, result.steps, value),
        None => println!("{:?} after {} steps", result.outcome, result.steps),
    }
}

/// A raw number (decimal or `0x` hex) or a value name from the property's
/// table.
fn parse_value(property: Property, text: &str) -> Result<u32> {
    if let Some(hex) = text.strip_prefix("0x") {
        return u32::from_str_radix(hex, 16).with_context(|| format!("bad hex value {}", text));
    }
    if let Ok(value) = text.parse() {
        return Ok(value);
    }
    property
        .known_values()
        .and_then(|values| values.iter().find(|(_, name)| *name == text))
        .map(|(value, _)| *value)
        .ok_or_else(|| anyhow!("{} is not a {} value", text, property))
}

/// `5.6`, `f5.6` or `f/5.6` to f-number × 100.
fn parse_f_number(text: &str) -> Result<u32> {
    let re = Regex::new(r"^(?:f/?)?(\d+(?:\.\d+)?)$")?;
    let caps = re
        .captures(text)
        .ok_or_else(|| anyhow!("bad f-number {}", text))?;
    let f_number: f64 = caps[1].parse()?;
    Ok((f_number * 100.0).round() as u32)
}

/// `1/250`, `2` or `0.5` seconds to microseconds.
fn parse_exposure_time(text: &str) -> Result<u64> {
    let re = Regex::new(r"^(?:(\d+)/(\d+)|(\d+(?:\.\d+)?))$")?;
    let caps = re
        .captures(text)
        .ok_or_else(|| anyhow!("bad shutter speed {}", text))?;
    if let (Some(numerator), Some(denominator)) = (caps.get(1), caps.get(2)) {
        let numerator: u64 = numerator.as_str().parse()?;
        let denominator: u64 = denominator.as_str().parse()?;
        if denominator == 0 {
            bail!("bad shutter speed {}", text);
        }
        return Ok(numerator * 1_000_000 / denominator);
    }
    let seconds: f64 = caps[3].parse()?;
    Ok((seconds * 1_000_000.0).round() as u64)
}

/// `-2/3`, `+1/3`, `0.7` or `1` EV to EV × 1000.
fn parse_ev(text: &str) -> Result<i32> {
    let re = Regex::new(r"^([+-]?)(?:(\d+)/(\d+)|(\d+(?:\.\d+)?))$")?;
    let caps = re
        .captures(text)
        .ok_or_else(|| anyhow!("bad exposure compensation {}", text))?;
    let sign = if &caps[1] == "-" { -1.0 } else { 1.0 };
    let ev = match (caps.get(2), caps.get(3)) {
        (Some(numerator), Some(denominator)) => {
            let denominator: f64 = denominator.as_str().parse()?;
            if denominator == 0.0 {
                bail!("bad exposure compensation {}", text);
            }
            numerator.as_str().parse::<f64>()? / denominator
        }
        _ => caps[4].parse()?,
    };
    Ok((sign * ev * 1000.0).round() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exposure_time() {
        assert_eq!(parse_exposure_time("1/250").unwrap(), 4_000);
        assert_eq!(parse_exposure_time("2").unwrap(), 2_000_000);
        assert_eq!(parse_exposure_time("0.5").unwrap(), 500_000);
        assert!(parse_exposure_time("1/0").is_err());
        assert!(parse_exposure_time("fast").is_err());
    }

    #[test]
    fn test_parse_f_number() {
        assert_eq!(parse_f_number("5.6").unwrap(), 560);
        assert_eq!(parse_f_number("f/2.8").unwrap(), 280);
        assert_eq!(parse_f_number("f11").unwrap(), 1100);
    }

    #[test]
    fn test_parse_ev() {
        assert_eq!(parse_ev("-2/3").unwrap(), -667);
        assert_eq!(parse_ev("+1/3").unwrap(), 333);
        assert_eq!(parse_ev("1").unwrap(), 1000);
        assert_eq!(parse_ev("-0.7").unwrap(), -700);
    }

    #[test]
    fn test_parse_named_value() {
        assert_eq!(parse_value(Property::WhiteBalance, "auto").unwrap(), 0x0002);
        assert_eq!(parse_value(Property::WhiteBalance, "0x8006").unwrap(), 0x8006);
        assert_eq!(parse_value(Property::Iso, "800").unwrap(), 800);
        assert!(parse_value(Property::Iso, "bright").is_err());
    }

    #[test]
    fn test_frame_path() {
        let path = frame_path(Path::new("out"), 42);
        assert_eq!(path, PathBuf::from("out/frame_00000042.jpg"));
    }
}
