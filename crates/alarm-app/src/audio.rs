//! Alarm playback through an external player command
//!
//! Playback forces the output volume with the configured volume command,
//! then runs the player in a loop until stopped. Stopping aborts the loop
//! task, which kills the running player.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use alarm_core::prelude::*;

use crate::config::AudioSettings;
use crate::ports::AudioOutput;

/// Pause before restarting a player that exited with an error.
const FAILURE_PAUSE: Duration = Duration::from_secs(1);

/// Pause between two successful runs of the player.
const LOOP_GAP: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub struct CommandAudio {
    player: Option<PathBuf>,
    args: Vec<String>,
    volume_command: Vec<String>,
    runtime: Handle,
    playback: Mutex<Option<JoinHandle<()>>>,
}

impl CommandAudio {
    /// Must be called inside a tokio runtime.
    ///
    /// A player missing from `PATH` is logged; playback requests are then
    /// ignored.
    pub fn new(settings: &AudioSettings) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::audio(format!("no async runtime for playback: {e}")))?;

        let player = match which::which(&settings.player) {
            Ok(path) => {
                debug!("Alarm player: {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Alarm player '{}' not found: {}", settings.player, e);
                None
            }
        };

        Ok(Self {
            player,
            args: settings.args.clone(),
            volume_command: settings.volume_command.clone(),
            runtime,
            playback: Mutex::new(None),
        })
    }

    pub fn is_playing(&self) -> bool {
        self.playback
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl AudioOutput for CommandAudio {
    fn start_looping(&self) {
        let Some(player) = self.player.clone() else {
            warn!("{}", Error::audio("no alarm player available"));
            return;
        };

        let mut playback = self.playback.lock().unwrap_or_else(|e| e.into_inner());
        if playback.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let args = self.args.clone();
        let volume_command = self.volume_command.clone();
        *playback = Some(self.runtime.spawn(async move {
            force_volume(&volume_command).await;
            play_loop(player, args).await;
        }));
    }

    fn stop(&self) {
        if let Some(task) = self
            .playback
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
            debug!("Alarm playback stopped");
        }
    }
}

impl Drop for CommandAudio {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn force_volume(command: &[String]) {
    let Some((program, args)) = command.split_first() else {
        return;
    };

    match Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(status) if status.success() => debug!("Output volume forced to maximum"),
        Ok(status) => warn!("Volume command exited with {}", status),
        Err(e) => warn!("Failed to run volume command '{}': {}", program, e),
    }
}

async fn play_loop(player: PathBuf, args: Vec<String>) {
    loop {
        let child = Command::new(&player)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to start alarm player {}: {}", player.display(), e);
                return;
            }
        };

        match child.wait().await {
            Ok(status) if status.success() => tokio::time::sleep(LOOP_GAP).await,
            Ok(status) => {
                warn!("Alarm player exited with {}", status);
                tokio::time::sleep(FAILURE_PAUSE).await;
            }
            Err(e) => {
                error!("Failed waiting on alarm player: {}", e);
                return;
            }
        }
    }
}
