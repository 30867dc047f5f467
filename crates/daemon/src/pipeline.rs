//! Pipeline builder: turns a validated clip request into a running
//! two-stage fetch/transform pipeline plus an output artifact path.
//!
//! Two strategies are supported. `StreamingPipe` pipes raw media bytes from
//! the fetch tool's stdout into the transform tool's stdin. `DirectUrl`
//! resolves the media locators up front and lets the transform tool fetch
//! them itself with a spoofed browser user agent.

use crate::duration::format_clip_duration;
use crate::progress::ClipRequest;
use crate::sanitize::sanitize_file_name;
use clipperd_config::{PipelineConfig, PipelineStrategy};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::debug;

/// The external fetch tool.
const FETCH_BIN: &str = "yt-dlp";

/// The external transform tool.
const TRANSFORM_BIN: &str = "ffmpeg";

/// Browser user agent presented by network-capable transform invocations,
/// so resolved media URLs are not rejected by the origin.
const SPOOFED_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Error type for pipeline construction
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The metadata invocation of the fetch tool failed or produced nothing
    #[error("Upstream metadata lookup failed: {0}")]
    UpstreamUnavailable(String),

    /// The metadata output did not have the expected shape
    #[error("Unexpected upstream output: expected a title and one or two media URLs, got {0} line(s)")]
    UnexpectedUpstreamOutput(usize),

    /// A pipeline process failed to launch
    #[error("Failed to start {tool}: {source}")]
    StartFailure {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// IO error preparing the scratch directory or process plumbing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A launched pipeline, owned by the job supervisor for the job's lifetime.
pub struct PipelineHandle {
    /// The transform process; its exit status decides the job outcome.
    pub transform: Child,
    /// The fetch process when the strategy uses one; advisory exit status.
    pub fetch: Option<Child>,
    /// The transform's progress stream, consumed by the progress monitor.
    pub progress: ChildStdout,
    /// Where the artifact is being written.
    pub artifact_path: PathBuf,
    /// Artifact file name presented to download clients.
    pub file_name: String,
}

/// Build and launch the pipeline for a validated request.
///
/// The request's clip bounds must already have passed duration validation;
/// `total_duration_us` is the validated clip length. All metadata failures
/// surface here, before any job state exists.
pub async fn build_pipeline(
    request: &ClipRequest,
    total_duration_us: i64,
    config: &PipelineConfig,
) -> Result<PipelineHandle, PipelineError> {
    let quality = if request.quality.is_empty() {
        config.fallback_quality.as_str()
    } else {
        request.quality.as_str()
    };

    match config.strategy {
        PipelineStrategy::StreamingPipe => {
            launch_streaming_pipe(request, total_duration_us, quality, &config.scratch_dir).await
        }
        PipelineStrategy::DirectUrl => {
            launch_direct_url(request, quality, &config.scratch_dir).await
        }
    }
}

/// Launch the streaming-pipe pipeline: fetch writes raw bytes to stdout,
/// transform reads them from stdin.
async fn launch_streaming_pipe(
    request: &ClipRequest,
    total_duration_us: i64,
    quality: &str,
    scratch_dir: &str,
) -> Result<PipelineHandle, PipelineError> {
    // Metadata-only invocation first: it decides the artifact name and is
    // the cheap place to discover an unreachable source.
    let file_name = probe_artifact_name(&request.video_url, quality).await?;
    let artifact_path = resolve_artifact_path(scratch_dir, &file_name).await?;

    let mut fetch = build_fetch_command(&request.video_url, quality)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| PipelineError::StartFailure {
            tool: FETCH_BIN,
            source,
        })?;

    let fetch_stdout = fetch.stdout.take().expect("fetch stdout not captured");
    let fetch_stderr = fetch.stderr.take().expect("fetch stderr not captured");

    let transform_stdin: Stdio = fetch_stdout
        .try_into()
        .map_err(|source| PipelineError::StartFailure {
            tool: TRANSFORM_BIN,
            source,
        })?;

    let spawn_result = build_transform_piped_command(
        &request.clip_start,
        total_duration_us,
        &artifact_path,
    )
    .stdin(transform_stdin)
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn();

    let mut transform = match spawn_result {
        Ok(child) => child,
        Err(source) => {
            // No orphaned producer: the fetch process must not outlive a
            // transform that never started.
            let _ = fetch.kill().await;
            return Err(PipelineError::StartFailure {
                tool: TRANSFORM_BIN,
                source,
            });
        }
    };

    let progress = transform
        .stdout
        .take()
        .expect("transform stdout not captured");
    let transform_stderr = transform
        .stderr
        .take()
        .expect("transform stderr not captured");

    spawn_stderr_logger(fetch_stderr, FETCH_BIN);
    spawn_stderr_logger(transform_stderr, TRANSFORM_BIN);

    Ok(PipelineHandle {
        transform,
        fetch: Some(fetch),
        progress,
        artifact_path,
        file_name,
    })
}

/// Launch the direct-URL pipeline: the transform fetches resolved media
/// locators itself, so there is no producer process to babysit.
async fn launch_direct_url(
    request: &ClipRequest,
    quality: &str,
    scratch_dir: &str,
) -> Result<PipelineHandle, PipelineError> {
    let (title, locators) = probe_media_locators(&request.video_url, quality).await?;

    let file_name = format!("{}-{}p.mp4", sanitize_file_name(&title), quality);
    let artifact_path = resolve_artifact_path(scratch_dir, &file_name).await?;

    let mut transform = build_transform_url_command(
        &request.clip_start,
        &request.clip_end,
        &locators,
        &artifact_path,
    )
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()
    .map_err(|source| PipelineError::StartFailure {
        tool: TRANSFORM_BIN,
        source,
    })?;

    let progress = transform
        .stdout
        .take()
        .expect("transform stdout not captured");
    let transform_stderr = transform
        .stderr
        .take()
        .expect("transform stderr not captured");

    spawn_stderr_logger(transform_stderr, TRANSFORM_BIN);

    Ok(PipelineHandle {
        transform,
        fetch: None,
        progress,
        artifact_path,
        file_name,
    })
}

/// Format selector capping the fetched media at the requested height.
fn format_selector(quality: &str) -> String {
    format!("bv*[height<={0}]+ba/b[height<={0}]/best", quality)
}

/// Ask the fetch tool for the artifact name without downloading anything.
async fn probe_artifact_name(video_url: &str, quality: &str) -> Result<String, PipelineError> {
    let output = Command::new(FETCH_BIN)
        .arg("-f")
        .arg(format_selector(quality))
        .arg("--print")
        .arg("%(title)s-%(height)sp.%(ext)s")
        .arg("--no-playlist")
        .arg("--no-download")
        .arg("--no-warnings")
        .arg(video_url)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| PipelineError::UpstreamUnavailable(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::UpstreamUnavailable(format!(
            "{} exited with {}: {}",
            FETCH_BIN,
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let title = stdout.trim();
    if title.is_empty() {
        return Err(PipelineError::UpstreamUnavailable(format!(
            "{} returned no info for the source",
            FETCH_BIN
        )));
    }

    Ok(sanitize_file_name(title))
}

/// Ask the fetch tool for the title and resolved media URLs.
async fn probe_media_locators(
    video_url: &str,
    quality: &str,
) -> Result<(String, Vec<String>), PipelineError> {
    let output = Command::new(FETCH_BIN)
        .arg("-f")
        .arg(format!("bestvideo[height<={0}]+bestaudio/best[height<={0}]", quality))
        .arg("--get-title")
        .arg("--get-url")
        .arg("--no-playlist")
        .arg("--no-download")
        .arg(video_url)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| PipelineError::UpstreamUnavailable(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::UpstreamUnavailable(format!(
            "{} exited with {}: {}",
            FETCH_BIN,
            output.status,
            stderr.trim()
        )));
    }

    parse_locator_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse the metadata output of a direct-URL probe: a title line followed by
/// one combined locator or separate video/audio locators.
fn parse_locator_output(stdout: &str) -> Result<(String, Vec<String>), PipelineError> {
    let lines: Vec<&str> = stdout
        .trim()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if lines.is_empty() {
        return Err(PipelineError::UpstreamUnavailable(format!(
            "{} returned no info for the source",
            FETCH_BIN
        )));
    }
    if lines.len() < 2 || lines.len() > 3 {
        return Err(PipelineError::UnexpectedUpstreamOutput(lines.len()));
    }

    let title = lines[0].to_string();
    let locators = lines[1..].iter().map(|l| l.to_string()).collect();
    Ok((title, locators))
}

/// Ensure the scratch directory exists and resolve the artifact path in it.
async fn resolve_artifact_path(scratch_dir: &str, file_name: &str) -> Result<PathBuf, PipelineError> {
    tokio::fs::create_dir_all(scratch_dir).await?;
    Ok(Path::new(scratch_dir).join(file_name))
}

/// Fetch command for the streaming-pipe strategy: raw media bytes to stdout.
fn build_fetch_command(video_url: &str, quality: &str) -> Command {
    let mut cmd = Command::new(FETCH_BIN);
    cmd.arg("-f").arg(format_selector(quality));
    cmd.arg("--no-warnings");
    // Write the media stream to stdout for the transform to consume
    cmd.arg("-o").arg("-");
    cmd.arg(video_url);
    cmd
}

/// Transform command for the streaming-pipe strategy: read media from stdin,
/// copy streams without re-encoding, report progress on stdout.
fn build_transform_piped_command(
    clip_start: &str,
    total_duration_us: i64,
    artifact_path: &Path,
) -> Command {
    let mut cmd = Command::new(TRANSFORM_BIN);
    cmd.arg("-hide_banner");
    cmd.arg("-y");
    cmd.arg("-ss").arg(clip_start);
    cmd.arg("-i").arg("pipe:0");
    cmd.arg("-t").arg(format_clip_duration(total_duration_us));
    cmd.arg("-progress").arg("pipe:1");
    // Stream copy trades exact frame accuracy for speed
    cmd.arg("-c").arg("copy");
    cmd.arg(artifact_path);
    cmd
}

/// Transform command for the direct-URL strategy: the transform fetches the
/// resolved locators itself, presenting a browser user agent.
fn build_transform_url_command(
    clip_start: &str,
    clip_end: &str,
    locators: &[String],
    artifact_path: &Path,
) -> Command {
    let mut cmd = Command::new(TRANSFORM_BIN);
    cmd.arg("-hide_banner");
    cmd.arg("-y");
    cmd.arg("-ss").arg(clip_start);
    for locator in locators {
        cmd.arg("-user_agent").arg(SPOOFED_USER_AGENT);
        cmd.arg("-i").arg(locator);
    }
    cmd.arg("-to").arg(clip_end);
    cmd.arg("-progress").arg("pipe:1");
    cmd.arg("-c").arg("copy");
    cmd.arg(artifact_path);
    cmd
}

/// Drain a pipeline process's diagnostic stream, one debug line per line of
/// output. Diagnostics are kept for post-mortems and never reach clients.
fn spawn_stderr_logger(stderr: ChildStderr, tool: &'static str) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(tool, output = %line, "pipeline diagnostics");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::ffi::OsStr;

    /// Helper to convert Command args to a Vec of strings for easier testing
    fn get_command_args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .filter_map(|arg| arg.to_str().map(String::from))
            .collect()
    }

    /// Helper to check if args contain a flag with a specific value
    fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2)
            .any(|pair| pair[0] == flag && pair[1] == value)
    }

    // Strategy for generating plausible quality caps
    fn quality_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("360".to_string()),
            Just("480".to_string()),
            Just("720".to_string()),
            Just("1080".to_string()),
            Just("2160".to_string()),
        ]
    }

    // For any quality cap and source URL, the fetch command streams to
    // stdout with the height-capped format selector.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_fetch_command_completeness(
            quality in quality_strategy(),
            url in "https://[a-z0-9./?=-]{5,40}",
        ) {
            let cmd = build_fetch_command(&url, &quality);
            let args = get_command_args(&cmd);

            prop_assert_eq!(cmd.as_std().get_program(), OsStr::new("yt-dlp"));
            prop_assert!(has_flag_with_value(&args, "-f", &format_selector(&quality)));
            prop_assert!(has_flag_with_value(&args, "-o", "-"));
            prop_assert!(args.contains(&"--no-warnings".to_string()));
            prop_assert_eq!(args.last().cloned(), Some(url));
        }

        #[test]
        fn prop_piped_transform_command_completeness(
            start_secs in 0i64..86_000,
            span in 1i64..300,
        ) {
            let start = crate::duration::format_clip_duration(start_secs * 1_000_000);
            let cmd = build_transform_piped_command(
                &start,
                span * 1_000_000,
                Path::new("/tmp/clip.mp4"),
            );
            let args = get_command_args(&cmd);

            prop_assert_eq!(cmd.as_std().get_program(), OsStr::new("ffmpeg"));
            prop_assert!(has_flag_with_value(&args, "-ss", &start));
            prop_assert!(has_flag_with_value(&args, "-i", "pipe:0"));
            prop_assert!(has_flag_with_value(
                &args,
                "-t",
                &crate::duration::format_clip_duration(span * 1_000_000)
            ));
            prop_assert!(has_flag_with_value(&args, "-progress", "pipe:1"));
            prop_assert!(has_flag_with_value(&args, "-c", "copy"));
            prop_assert_eq!(args.last().cloned(), Some("/tmp/clip.mp4".to_string()));
        }
    }

    #[test]
    fn test_url_transform_command_single_locator() {
        let locators = vec!["https://cdn.example.com/media.mp4".to_string()];
        let cmd = build_transform_url_command(
            "00:00:10",
            "00:00:40",
            &locators,
            Path::new("/tmp/clip.mp4"),
        );
        let args = get_command_args(&cmd);

        assert!(has_flag_with_value(&args, "-ss", "00:00:10"));
        assert!(has_flag_with_value(&args, "-to", "00:00:40"));
        assert!(has_flag_with_value(&args, "-i", "https://cdn.example.com/media.mp4"));
        assert!(has_flag_with_value(&args, "-user_agent", SPOOFED_USER_AGENT));
        assert!(has_flag_with_value(&args, "-c", "copy"));
    }

    #[test]
    fn test_url_transform_command_split_locators() {
        let locators = vec![
            "https://cdn.example.com/video.mp4".to_string(),
            "https://cdn.example.com/audio.m4a".to_string(),
        ];
        let cmd = build_transform_url_command(
            "00:00:10",
            "00:00:40",
            &locators,
            Path::new("/tmp/clip.mp4"),
        );
        let args = get_command_args(&cmd);

        // Both inputs present, each preceded by the spoofed user agent
        assert!(has_flag_with_value(&args, "-i", "https://cdn.example.com/video.mp4"));
        assert!(has_flag_with_value(&args, "-i", "https://cdn.example.com/audio.m4a"));
        assert_eq!(
            args.iter().filter(|a| *a == "-user_agent").count(),
            2
        );
    }

    #[test]
    fn test_parse_locator_output_combined() {
        let (title, locators) =
            parse_locator_output("My Title\nhttps://cdn.example.com/av.mp4\n").unwrap();
        assert_eq!(title, "My Title");
        assert_eq!(locators, vec!["https://cdn.example.com/av.mp4".to_string()]);
    }

    #[test]
    fn test_parse_locator_output_split() {
        let (title, locators) = parse_locator_output(
            "My Title\nhttps://cdn.example.com/v.mp4\nhttps://cdn.example.com/a.m4a\n",
        )
        .unwrap();
        assert_eq!(title, "My Title");
        assert_eq!(locators.len(), 2);
    }

    #[test]
    fn test_parse_locator_output_empty_is_unavailable() {
        let err = parse_locator_output("").unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamUnavailable(_)));
        let err = parse_locator_output("  \n \n").unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamUnavailable(_)));
    }

    #[test]
    fn test_parse_locator_output_wrong_shape() {
        let err = parse_locator_output("Title only\n").unwrap_err();
        assert!(matches!(err, PipelineError::UnexpectedUpstreamOutput(1)));

        let err = parse_locator_output("t\nu1\nu2\nu3\n").unwrap_err();
        assert!(matches!(err, PipelineError::UnexpectedUpstreamOutput(4)));
    }

    #[test]
    fn test_format_selector_embeds_quality() {
        assert_eq!(
            format_selector("720"),
            "bv*[height<=720]+ba/b[height<=720]/best"
        );
    }

    #[tokio::test]
    async fn test_resolve_artifact_path_creates_scratch_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let scratch = temp.path().join("nested").join("scratch");
        let scratch_str = scratch.to_string_lossy().to_string();

        let path = resolve_artifact_path(&scratch_str, "clip.mp4").await.unwrap();

        assert!(scratch.is_dir());
        assert_eq!(path, scratch.join("clip.mp4"));
    }
}
