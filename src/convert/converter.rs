//! External converter process adapter.
//!
//! Wraps a synchronous resampler binary (ffmpeg by default): write the full
//! input to its stdin, close it, read all of stdout, wait for exit. The
//! binary's absence is an expected, recoverable condition reported as
//! `ConversionUnavailable`, never a crash.

use crate::convert::format::AudioFormat;
use crate::error::{Result, RoomscribeError};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// Adapter around the external sample-rate/channel-layout converter.
#[derive(Debug, Clone)]
pub struct FormatConverter {
    binary: PathBuf,
}

impl FormatConverter {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Convert raw PCM between layouts. Blocking: spawns the external
    /// process and waits for it to exit. Run via [`convert_async`] off the
    /// event-handling path.
    ///
    /// Identical source and target layouts short-circuit without spawning.
    ///
    /// [`convert_async`]: FormatConverter::convert_async
    pub fn convert(&self, raw: &[u8], source: AudioFormat, target: AudioFormat) -> Result<Vec<u8>> {
        if source == target {
            return Ok(raw.to_vec());
        }

        debug!(
            binary = %self.binary.display(),
            %source,
            %target,
            input_bytes = raw.len(),
            "spawning converter"
        );

        let mut child = Command::new(&self.binary)
            .args(Self::args(source, target))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let Some(mut stdin) = child.stdin.take() else {
            // Unreachable with Stdio::piped, but reap the child rather than
            // leak a zombie on the error path.
            let _ = child.kill();
            let _ = child.wait();
            return Err(RoomscribeError::ConversionUnavailable {
                message: "converter stdin was not captured".to_string(),
            });
        };

        // Feed stdin from its own thread so a large converted stream cannot
        // deadlock against a full stdout pipe. Dropping the handle closes
        // the write end and signals EOF to the child.
        let input = raw.to_vec();
        let writer = std::thread::spawn(move || {
            let result = stdin.write_all(&input);
            drop(stdin);
            result
        });

        // Reads stdout and stderr to EOF and reaps the child.
        let output = child
            .wait_with_output()
            .map_err(|e| RoomscribeError::ConversionUnavailable {
                message: format!("failed to collect converter output: {e}"),
            })?;

        let write_result = writer.join().map_err(|_| {
            RoomscribeError::ConversionUnavailable {
                message: "converter input writer panicked".to_string(),
            }
        })?;

        if !output.status.success() {
            return Err(RoomscribeError::ConversionUnavailable {
                message: format!(
                    "converter exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        // A successful exit with an unconsumed tail of input (broken pipe on
        // the writer) means the child had all the audio it needed.
        if let Err(e) = write_result
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(RoomscribeError::ConversionUnavailable {
                message: format!("failed to feed converter input: {e}"),
            });
        }

        debug!(output_bytes = output.stdout.len(), "conversion complete");
        Ok(output.stdout)
    }

    /// Convert on the blocking thread pool so the caller's task stays
    /// responsive to session events.
    pub async fn convert_async(
        &self,
        raw: Vec<u8>,
        source: AudioFormat,
        target: AudioFormat,
    ) -> Result<Vec<u8>> {
        let converter = self.clone();
        tokio::task::spawn_blocking(move || converter.convert(&raw, source, target))
            .await
            .map_err(|e| RoomscribeError::ConversionUnavailable {
                message: format!("conversion task panicked: {e}"),
            })?
    }

    fn spawn_error(&self, e: std::io::Error) -> RoomscribeError {
        let message = if e.kind() == std::io::ErrorKind::NotFound {
            format!("converter binary `{}` not found", self.binary.display())
        } else {
            format!("failed to spawn `{}`: {e}", self.binary.display())
        };
        RoomscribeError::ConversionUnavailable { message }
    }

    /// Argument list for a raw-PCM to raw-PCM conversion over stdin/stdout.
    fn args(source: AudioFormat, target: AudioFormat) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "s16le".to_string(),
            "-ar".to_string(),
            source.sample_rate.to_string(),
            "-ac".to_string(),
            source.channels.to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-f".to_string(),
            "s16le".to_string(),
            "-ar".to_string(),
            target.sample_rate.to_string(),
            "-ac".to_string(),
            target.channels.to_string(),
            "pipe:1".to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> AudioFormat {
        AudioFormat::platform_native()
    }

    fn target() -> AudioFormat {
        AudioFormat::transcription_target()
    }

    #[test]
    fn test_passthrough_when_formats_match() {
        let converter = FormatConverter::new("/definitely/not/a/binary");
        let raw = vec![1u8, 2, 3, 4];

        // No process is spawned, so the bogus binary path is never touched.
        let out = converter.convert(&raw, target(), target()).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn test_missing_binary_is_conversion_unavailable() {
        let converter = FormatConverter::new("/definitely/not/a/binary");
        let result = converter.convert(&[0u8; 64], source(), target());

        match result {
            Err(RoomscribeError::ConversionUnavailable { message }) => {
                assert!(message.contains("not found"), "got: {}", message);
            }
            other => panic!("expected ConversionUnavailable, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_conversion_unavailable() {
        // `false` exits 1 without reading stdin.
        let converter = FormatConverter::new("false");
        let result = converter.convert(&[0u8; 64], source(), target());
        assert!(matches!(
            result,
            Err(RoomscribeError::ConversionUnavailable { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_exit_without_consuming_input() {
        // `true` exits 0 immediately; the broken-pipe write is tolerated.
        let converter = FormatConverter::new("true");
        let out = converter.convert(&[0u8; 64], source(), target()).unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_convert_async_surfaces_errors() {
        let converter = FormatConverter::new("/definitely/not/a/binary");
        let result = converter
            .convert_async(vec![0u8; 64], source(), target())
            .await;
        assert!(matches!(
            result,
            Err(RoomscribeError::ConversionUnavailable { .. })
        ));
    }

    #[test]
    fn test_args_describe_both_layouts() {
        let args = FormatConverter::args(source(), target());

        assert_eq!(args.iter().filter(|a| *a == "s16le").count(), 2);
        assert!(args.contains(&"48000".to_string()));
        assert!(args.contains(&"16000".to_string()));
        assert!(args.contains(&"pipe:0".to_string()));
        assert!(args.contains(&"pipe:1".to_string()));

        // Input spec must precede -i, output spec must follow it.
        let i_pos = args.iter().position(|a| a == "-i").unwrap();
        let in_rate = args.iter().position(|a| a == "48000").unwrap();
        let out_rate = args.iter().position(|a| a == "16000").unwrap();
        assert!(in_rate < i_pos);
        assert!(out_rate > i_pos);
    }
}
