//! Delivery sinks: the user-visible side of a due reminder.
//!
//! The engine only knows the [`Notifier`] trait. A delivery is two
//! independent calls, a popup and a sound, and either may fail without
//! affecting the other.
//!
//! Sinks are built lazily through a [`NotifierInit`] closure that the
//! lifecycle controller runs inside the scheduler task on first delivery, so
//! a host without a desktop session still starts.
//!
//! # Implementations
//!
//! - [`DesktopNotifier`]: shells out to `notify-send`/`osascript` for the
//!   popup and `paplay`/`aplay`/`afplay` for the sound.
//! - [`LogNotifier`]: writes each delivery as a structured log record.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Upper bound on a single notification command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// A popup or sound could not be produced.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The notification backend could not be initialized.
    #[error("notifier unavailable: {0}")]
    Unavailable(String),

    /// A notification command could not be spawned.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A notification command exited unsuccessfully.
    #[error("{program} exited with code {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    /// A notification command did not finish in time.
    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    /// Any other backend-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Something that can make a reminder visible and audible.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Shows a popup with the reminder title and message.
    async fn show_popup(&self, title: &str, message: &str) -> Result<(), DeliveryError>;

    /// Plays the notification sound.
    async fn play_sound(&self) -> Result<(), DeliveryError>;
}

/// Deferred constructor for the delivery sink.
pub type NotifierInit =
    Box<dyn FnOnce() -> Result<Arc<dyn Notifier>, DeliveryError> + Send + 'static>;

/// Wraps an already-built notifier so it can be passed where a
/// [`NotifierInit`] is expected.
#[must_use]
pub fn ready(notifier: Arc<dyn Notifier>) -> NotifierInit {
    Box::new(move || Ok(notifier))
}

/// Notifier that records deliveries in the log and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn show_popup(&self, title: &str, message: &str) -> Result<(), DeliveryError> {
        info!(title = %title, message = %message, "Reminder");
        Ok(())
    }

    async fn play_sound(&self) -> Result<(), DeliveryError> {
        debug!("Reminder sound (log notifier, silent)");
        Ok(())
    }
}

/// Operating-system flavour the desktop notifier drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
}

impl Platform {
    /// The platform this binary was compiled for, if it is supported.
    #[must_use]
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "macos") {
            Some(Self::MacOs)
        } else if cfg!(target_os = "linux") {
            Some(Self::Linux)
        } else {
            None
        }
    }

    fn popup_program(self) -> &'static str {
        match self {
            Self::Linux => "notify-send",
            Self::MacOs => "osascript",
        }
    }

    fn sound_programs(self) -> &'static [&'static str] {
        match self {
            Self::Linux => &["paplay", "aplay"],
            Self::MacOs => &["afplay"],
        }
    }
}

/// Desktop popup and sound through the platform's command-line tools.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    platform: Platform,
    sound_program: Option<&'static str>,
    sound_path: Option<PathBuf>,
    timeout: Duration,
}

impl DesktopNotifier {
    /// Probes the host for notification tools.
    ///
    /// The sound is optional: a missing player or sound file only disables
    /// sound. A missing popup program is fatal.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Unavailable`] when the platform is
    /// unsupported or its popup program is not on `PATH`.
    pub fn detect(sound_path: Option<PathBuf>) -> Result<Self, DeliveryError> {
        let platform = Platform::current().ok_or_else(|| {
            DeliveryError::Unavailable("desktop notifications unsupported on this OS".into())
        })?;

        let popup = platform.popup_program();
        if !binary_exists(popup) {
            return Err(DeliveryError::Unavailable(format!(
                "{popup} not found on PATH"
            )));
        }

        let sound_program = platform
            .sound_programs()
            .iter()
            .copied()
            .find(|program| binary_exists(program));
        let sound_path = sound_path.filter(|path| path.is_file());

        info!(
            platform = ?platform,
            popup = popup,
            sound_program = ?sound_program,
            sound_path = ?sound_path,
            "Desktop notifier initialized"
        );

        Ok(Self {
            platform,
            sound_program,
            sound_path,
            timeout: COMMAND_TIMEOUT,
        })
    }

    /// Builds a [`NotifierInit`] that probes the host when first used.
    #[must_use]
    pub fn lazy(sound_path: Option<PathBuf>) -> NotifierInit {
        Box::new(move || {
            let notifier = Self::detect(sound_path)?;
            Ok(Arc::new(notifier) as Arc<dyn Notifier>)
        })
    }

    fn popup_args(&self, title: &str, message: &str) -> Vec<String> {
        match self.platform {
            Platform::Linux => vec![
                "--app-name=todolist".to_string(),
                title.to_string(),
                message.to_string(),
            ],
            Platform::MacOs => vec![
                "-e".to_string(),
                format!(
                    "display notification \"{}\" with title \"{}\"",
                    escape_applescript(message),
                    escape_applescript(title)
                ),
            ],
        }
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    fn name(&self) -> &'static str {
        "desktop"
    }

    async fn show_popup(&self, title: &str, message: &str) -> Result<(), DeliveryError> {
        let args = self.popup_args(title, message);
        run_command(self.platform.popup_program(), &args, self.timeout).await
    }

    async fn play_sound(&self) -> Result<(), DeliveryError> {
        let (Some(program), Some(path)) = (self.sound_program, self.sound_path.as_deref()) else {
            debug!("No sound player or sound file configured, skipping sound");
            return Ok(());
        };
        let args = vec![path_arg(path)];
        run_command(program, &args, self.timeout).await
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Checks whether `name` resolves to a file in one of the `PATH` entries.
fn binary_exists(name: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(name).is_file()))
        .unwrap_or(false)
}

/// Runs a command to completion, mapping every failure mode to a
/// [`DeliveryError`].
async fn run_command(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<(), DeliveryError> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| DeliveryError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| DeliveryError::Timeout {
            program: program.to_string(),
            timeout,
        })?
        .map_err(|source| DeliveryError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(DeliveryError::CommandFailed {
            program: program.to_string(),
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
