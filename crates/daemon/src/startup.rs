//! Startup checks for clipperd
//!
//! Preflight checks verifying the external pipeline tools exist before the
//! server starts accepting submissions:
//! - yt-dlp availability (fetch tool)
//! - ffmpeg availability (transform tool)

use std::process::Command;
use thiserror::Error;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("yt-dlp not available: {0}")]
    YtDlpUnavailable(String),

    #[error("ffmpeg not available: {0}")]
    FfmpegUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Check if yt-dlp is available by running `yt-dlp --version`
pub fn check_ytdlp_available() -> Result<(), StartupError> {
    let path = which::which("yt-dlp")
        .map_err(|e| StartupError::YtDlpUnavailable(format!("not found in PATH: {}", e)))?;

    let output = Command::new(&path).arg("--version").output().map_err(|e| {
        StartupError::YtDlpUnavailable(format!("yt-dlp --version failed: {}", e))
    })?;

    if !output.status.success() {
        return Err(StartupError::YtDlpUnavailable(
            "yt-dlp --version exited with an error".to_string(),
        ));
    }

    Ok(())
}

/// Check if ffmpeg is available by running `ffmpeg -version`
pub fn check_ffmpeg_available() -> Result<(), StartupError> {
    let path = which::which("ffmpeg")
        .map_err(|e| StartupError::FfmpegUnavailable(format!("not found in PATH: {}", e)))?;

    let output = Command::new(&path).arg("-version").output().map_err(|e| {
        StartupError::FfmpegUnavailable(format!("ffmpeg -version failed: {}", e))
    })?;

    if !output.status.success() {
        return Err(StartupError::FfmpegUnavailable(
            "ffmpeg -version exited with an error".to_string(),
        ));
    }

    Ok(())
}

/// Run all startup checks in order
///
/// 1. yt-dlp availability
/// 2. ffmpeg availability
pub fn run_startup_checks() -> Result<(), StartupError> {
    check_ytdlp_available()?;
    check_ffmpeg_available()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // The checks depend on the host toolchain, so the tests pin down the
    // error surface rather than tool presence.

    #[test]
    fn test_errors_name_the_missing_tool() {
        let err = StartupError::YtDlpUnavailable("not found in PATH".to_string());
        assert!(err.to_string().contains("yt-dlp"));

        let err = StartupError::FfmpegUnavailable("not found in PATH".to_string());
        assert!(err.to_string().contains("ffmpeg"));
    }

    #[test]
    fn test_checks_agree_with_which() {
        // Whatever the host has installed, the check must match `which`.
        match which::which("ffmpeg") {
            Ok(_) => assert!(check_ffmpeg_available().is_ok()),
            Err(_) => assert!(check_ffmpeg_available().is_err()),
        }
        match which::which("yt-dlp") {
            Ok(_) => assert!(check_ytdlp_available().is_ok()),
            Err(_) => assert!(check_ytdlp_available().is_err()),
        }
    }
}
