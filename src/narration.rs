//! Spoken scene summaries.

use anyhow::{anyhow, Context, Result};
use std::process::{Command, Stdio};

/// Platform speech capability.
pub trait Speaker: Send {
    fn speak(&mut self, text: &str) -> Result<()>;
}

/// Speaks through an external command (e.g. `espeak`, `say`), text as the last argument.
///
/// The caller does not wait for speech to finish; queueing is left to the platform.
pub struct CommandSpeaker {
    program: String,
    args: Vec<String>,
}

impl CommandSpeaker {
    /// `command` is split on whitespace into program and leading arguments.
    pub fn new(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("speech command must not be empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl Speaker for CommandSpeaker {
    fn speak(&mut self, text: &str) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn speech command {}", self.program))?;
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}

/// Narrates completed results when enabled. Off by default.
pub struct NarrationSink {
    enabled: bool,
    speaker: Box<dyn Speaker>,
    last_spoken: Option<u64>,
}

impl NarrationSink {
    pub fn new(speaker: Box<dyn Speaker>) -> Self {
        Self {
            enabled: false,
            speaker,
            last_spoken: None,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    /// Speak `summary` for completed result `result_key`, at most once per key.
    ///
    /// Returns true when an utterance was requested.
    pub fn narrate(&mut self, result_key: u64, summary: Option<&str>) -> bool {
        if !self.enabled || self.last_spoken == Some(result_key) {
            return false;
        }
        let Some(text) = summary.map(str::trim).filter(|text| !text.is_empty()) else {
            return false;
        };
        self.last_spoken = Some(result_key);
        match self.speaker.speak(text) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("narration failed: {:#}", err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Speaker for Recorder {
        fn speak(&mut self, text: &str) -> Result<()> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn disabled_by_default() {
        let recorder = Recorder::default();
        let mut sink = NarrationSink::new(Box::new(recorder.clone()));
        assert!(!sink.enabled());
        assert!(!sink.narrate(1, Some("hello")));
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[test]
    fn speaks_once_per_result() {
        let recorder = Recorder::default();
        let mut sink = NarrationSink::new(Box::new(recorder.clone()));
        assert!(sink.toggle());
        assert!(sink.narrate(7, Some("Two cars.")));
        assert!(!sink.narrate(7, Some("Two cars.")));
        assert!(sink.narrate(8, Some("One dog.")));
        assert_eq!(*recorder.0.lock().unwrap(), vec!["Two cars.", "One dog."]);
    }

    #[test]
    fn empty_or_missing_summary_is_silent() {
        let recorder = Recorder::default();
        let mut sink = NarrationSink::new(Box::new(recorder.clone()));
        sink.set_enabled(true);
        assert!(!sink.narrate(1, None));
        assert!(!sink.narrate(2, Some("   ")));
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[test]
    fn command_must_name_a_program() {
        assert!(CommandSpeaker::new("  ").is_err());
        let speaker = CommandSpeaker::new("espeak -s 150").unwrap();
        assert_eq!(speaker.program, "espeak");
        assert_eq!(speaker.args, vec!["-s", "150"]);
    }
}
