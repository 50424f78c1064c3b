use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cymatica", about = "Audio-reactive kaleidoscope visualizer")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG), looped forever
    #[arg(conflicts_with = "mic")]
    pub input: Option<PathBuf>,

    /// Use live microphone input instead of a file
    #[arg(long)]
    pub mic: bool,

    /// Input device name (host default when omitted or not found)
    #[arg(long)]
    pub device: Option<String>,

    /// List input devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Named palette preset
    #[arg(long, conflicts_with = "colors")]
    pub palette: Option<String>,

    /// Palette colours, 1-5 hex values (e.g. "#00ffff,#ff00ff")
    #[arg(long, value_delimiter = ',')]
    pub colors: Vec<String>,

    /// List palette presets and exit
    #[arg(long)]
    pub list_palettes: bool,

    /// Audio sensitivity (0.1-3.0)
    #[arg(long, default_value_t = 1.5)]
    pub sensitivity: f32,

    /// Master brightness (0.1-2.0)
    #[arg(long, default_value_t = 1.0)]
    pub brightness: f32,

    /// Animation speed (0.0-3.0)
    #[arg(long, default_value_t = 0.5)]
    pub speed: f32,

    /// Frame width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Frame height in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Frames per second
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Stop after this many frames
    #[arg(long, conflicts_with = "duration")]
    pub frames: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration: Option<f32>,

    /// Render frames and encode them to a video file through ffmpeg; without it no frames are rendered and the run only monitors audio features
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print one JSON line of audio features per frame to stdout
    #[arg(long)]
    pub dump_features: bool,

    /// Render on the GPU
    #[arg(long)]
    pub gpu: bool,

    /// Hide the particle overlay
    #[arg(long)]
    pub no_particles: bool,

    /// Do not play file input audibly
    #[arg(long)]
    pub no_monitor: bool,

    /// Config file (defaults to ./cymatica.toml or the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Frame budget of the run, if bounded.
    pub fn frame_limit(&self) -> Option<u64> {
        self.frames.or_else(|| {
            self.duration
                .map(|secs| (secs.max(0.0) * self.fps as f32).round() as u64)
        })
    }
}
