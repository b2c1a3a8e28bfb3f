use anyhow::{Context, Result, anyhow, bail};
use dirs_next::cache_dir;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tokio::process::Command;
use tracing::{debug, info};

use crate::types::{CaptionTrack, StreamSource};

pub const PLAYER_ENV_KEY: &str = "ANICAT_PLAYER";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Splits a configured player command line such as `mpv --fs` with shell quoting rules.
pub fn parse_player_command(command: &str) -> Result<PlayerCommand> {
    let mut parts = shlex::split(command)
        .ok_or_else(|| anyhow!("could not parse player command `{command}`"))?
        .into_iter();
    let program = parts
        .next()
        .ok_or_else(|| anyhow!("player command is empty"))?;
    Ok(PlayerCommand {
        program,
        args: parts.collect(),
    })
}

#[derive(Debug, Clone)]
pub struct PlaybackRequest<'a> {
    pub source: &'a StreamSource,
    pub captions: &'a [CaptionTrack],
    pub referer: Option<&'a str>,
    pub title: &'a str,
    pub episode: u32,
    pub start_at: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerExit {
    /// Player quit before the end; mpv saved this position.
    Paused { time: f64 },
    Ended,
}

pub fn build_player_args(request: &PlaybackRequest<'_>, watch_later_dir: &Path) -> Vec<String> {
    let mut args = vec![
        String::from("--quiet"),
        String::from("--terminal=no"),
        format!(
            "--force-media-title={} - Episode {}",
            request.title, request.episode
        ),
        String::from("--save-position-on-quit"),
        format!("--watch-later-directory={}", watch_later_dir.display()),
    ];
    if let Some(start) = request.start_at.filter(|t| t.is_finite() && *t > 0.0) {
        args.push(format!("--start={start:.3}"));
    }
    for caption in request.captions {
        args.push(format!("--sub-file={}", caption.url));
    }
    if let Some(referer) = request.referer {
        args.push(format!("--referrer={referer}"));
        args.push(format!("--http-header-fields=Referer: {referer}"));
    }
    args.push(request.source.url.clone());
    args
}

pub async fn launch_player(player: &str, request: &PlaybackRequest<'_>) -> Result<PlayerExit> {
    let command = parse_player_command(player)?;
    let watch_later = prepare_watch_later_dir()?;

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args);
    cmd.args(build_player_args(request, &watch_later));
    info!(
        player = %command.program,
        quality = %request.source.quality,
        episode = request.episode,
        "launching player"
    );

    let status = match cmd.status().await {
        Ok(status) => status,
        Err(err) => {
            clean_watch_later(&watch_later);
            if err.kind() == std::io::ErrorKind::NotFound {
                return Err(anyhow!(
                    "Player '{}' not found. Install mpv or set {} to a valid command.",
                    command.program,
                    PLAYER_ENV_KEY
                ));
            }
            return Err(anyhow!(err).context(format!("failed to launch player '{player}'")));
        }
    };

    // mpv exits with 4 when quit by a signal; the position is still saved.
    let clean_exit = status.success() || status.code() == Some(4);
    collect_exit(&watch_later, clean_exit, status)
}

/// Turns the player's exit into a [`PlayerExit`]. The watch-later dir is
/// removed whatever the outcome.
fn collect_exit(
    watch_later: &Path,
    clean_exit: bool,
    status: impl std::fmt::Display,
) -> Result<PlayerExit> {
    let saved = if clean_exit {
        read_saved_position(watch_later)
    } else {
        Ok(None)
    };
    clean_watch_later(watch_later);
    if !clean_exit {
        bail!("player exited with status {status}");
    }
    Ok(match saved? {
        Some(time) => PlayerExit::Paused { time },
        None => PlayerExit::Ended,
    })
}

fn clean_watch_later(dir: &Path) {
    if let Err(err) = fs::remove_dir_all(dir) {
        debug!(error = %err, dir = %dir.display(), "could not clean watch-later dir");
    }
}

fn prepare_watch_later_dir() -> Result<PathBuf> {
    let base = cache_dir().ok_or_else(|| anyhow!("Could not determine cache directory"))?;
    let dir = base
        .join("anicat")
        .join("watch-later")
        .join(std::process::id().to_string());
    if dir.exists() {
        fs::remove_dir_all(&dir)
            .with_context(|| format!("failed to clear {}", dir.display()))?;
    }
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(dir)
}

/// Reads the `start=` position mpv writes into its watch-later directory on quit.
/// mpv deletes the entry when a file plays to the end, so `None` means it ended.
pub fn read_saved_position(dir: &Path) -> Result<Option<f64>> {
    if !dir.exists() {
        return Ok(None);
    }
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let position = data
            .lines()
            .filter_map(|line| line.trim().strip_prefix("start="))
            .find_map(|value| value.trim().parse::<f64>().ok());
        if position.is_some() {
            return Ok(position);
        }
    }
    Ok(None)
}
