use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

/// Output settings for the ffmpeg sink.
#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
}

impl EncodeSettings {
    /// ffmpeg arguments reading raw RGBA frames from stdin.
    pub fn args(&self, output_path: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-f".into(), "rawvideo".into(),
            "-pixel_format".into(), "rgba".into(),
            "-video_size".into(), format!("{}x{}", self.width, self.height),
            "-framerate".into(), self.fps.to_string(),
            "-i".into(), "pipe:0".into(),
            "-c:v".into(), self.codec.clone(),
            "-pix_fmt".into(), self.pix_fmt.clone(),
            "-crf".into(), self.crf.to_string(),
            "-preset".into(), "medium".into(),
            output_path.to_string_lossy().into_owned(),
        ]
    }
}

pub struct FfmpegEncoder {
    child: Child,
    frame_bytes: usize,
}

impl FfmpegEncoder {
    pub fn new(output_path: &Path, settings: &EncodeSettings) -> Result<Self> {
        let child = Command::new("ffmpeg")
            .args(settings.args(output_path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            settings.width,
            settings.height,
            settings.fps,
            settings.codec
        );

        Ok(Self {
            child,
            frame_bytes: settings.width as usize * settings.height as usize * 4,
        })
    }

    pub fn write_frame(&mut self, rgba_pixels: &[u8]) -> Result<()> {
        if rgba_pixels.len() != self.frame_bytes {
            anyhow::bail!(
                "Frame is {} bytes, encoder expects {}",
                rgba_pixels.len(),
                self.frame_bytes
            );
        }
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin.write_all(rgba_pixels).context("Failed to write frame to ffmpeg")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        // EOF on stdin ends the stream.
        drop(self.child.stdin.take());

        let output = self.child.wait_with_output().context("Failed to wait for ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        log::info!("FFmpeg encoding complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_describe_raw_rgba_input() {
        let settings = EncodeSettings {
            width: 640,
            height: 360,
            fps: 60,
            codec: "libx264".into(),
            pix_fmt: "yuv420p".into(),
            crf: 20,
        };
        let args = settings.args(Path::new("out.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-pixel_format rgba"));
        assert!(joined.contains("-video_size 640x360"));
        assert!(joined.contains("-framerate 60"));
        assert!(joined.contains("-crf 20"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
        assert!(!args.iter().any(|a| a == "-c:a"));
    }
}
