mod audio;
mod cli;
mod config;
mod encode;
mod error;
mod palette;
mod render;
mod session;
mod uniforms;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::time::{Duration, Instant};

use audio::analyzer::AnalyzerSettings;
use audio::source::{SourceKind, SourceOptions};
use cli::Cli;
use config::{Backend, Config};
use encode::ffmpeg::{EncodeSettings, FfmpegEncoder};
use palette::Palette;
use render::Renderer;
use session::{Session, SessionConfig};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let cfg = match config::find_config_path(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };
    merge_config(&mut cli, &cfg);

    if cli.list_palettes {
        println!("Available palettes:");
        for (name, colors) in palette::PRESETS {
            println!("  {:<12} {}", name, colors.join(" "));
        }
        return Ok(());
    }

    if cli.list_devices {
        println!("Input devices:");
        for name in audio::capture::list_input_devices() {
            println!("  {}", name);
        }
        return Ok(());
    }

    let kind = if cli.mic {
        SourceKind::Microphone
    } else {
        let input = cli.input.clone().context("Pass an input audio file or --mic")?;
        SourceKind::File(input)
    };

    let limit = cli.frame_limit();
    if cli.output.is_some() && limit.is_none() {
        anyhow::bail!("--output needs --frames or --duration");
    }
    let fps = cli.fps.max(1);
    // File sources render on the frame clock when encoding; everything else is paced live.
    let offline = cli.output.is_some() && !cli.mic;

    log::info!("cymatica - audio-reactive kaleidoscope");
    log::info!("Resolution: {}x{} @ {}fps", cli.width, cli.height, fps);

    let mut session = Session::new(SessionConfig {
        source: SourceOptions {
            device: cli.device.clone(),
            monitor: !cli.no_monitor && !offline,
            window: cfg.audio.fft_size,
        },
        analyzer: AnalyzerSettings {
            fft_size: cfg.audio.fft_size,
            smoothing: cfg.audio.smoothing,
            min_decibels: cfg.audio.min_decibels,
            max_decibels: cfg.audio.max_decibels,
        },
        resolution: [cli.width as f32, cli.height as f32],
    });
    session.set_sensitivity(cli.sensitivity);
    session.set_brightness(cli.brightness);
    session.set_speed(cli.speed);
    session.toggle_particles(!cli.no_particles);
    match cli.palette {
        Some(ref name) => session.replace_palette(preset_palette(name)?),
        None => session.set_palette(&cli.colors).context("Invalid --colors")?,
    }

    session.start_session(&kind).context("Failed to start audio")?;
    log::info!("Play state: {:?}", session.play_state());

    let (renderer, mut encoder) = match cli.output {
        Some(ref path) => {
            let renderer = if cli.gpu {
                Renderer::gpu(cli.width, cli.height)?
            } else {
                Renderer::cpu(cli.width, cli.height)
            };
            let settings = EncodeSettings {
                width: cli.width,
                height: cli.height,
                fps,
                codec: cfg.output.codec.clone(),
                pix_fmt: cfg.output.pix_fmt.clone(),
                crf: cfg.output.crf,
            };
            log::info!("Output: {}", path.display());
            (Some(renderer), Some(FfmpegEncoder::new(path, &settings)?))
        }
        None => (None, None),
    };

    let pb = match limit {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
                    .context("Invalid progress template")?
                    .progress_chars("=>-"),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner} [{elapsed_precise}] {pos} frames {msg}")
                    .context("Invalid progress template")?,
            );
            pb
        }
    };

    let frame_period = Duration::from_secs_f64(1.0 / fps as f64);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let start = Instant::now();
    let mut last = start;
    let mut frame_idx: u64 = 0;

    while limit.map_or(true, |n| frame_idx < n) {
        let (dt, now) = if offline {
            (frame_period.as_secs_f32(), start + frame_period.mul_f64(frame_idx as f64))
        } else {
            let now = Instant::now();
            let dt = now.saturating_duration_since(last).as_secs_f32();
            last = now;
            (dt, now)
        };

        let input = session.frame(dt, now);

        if let (Some(renderer), Some(encoder)) = (renderer.as_ref(), encoder.as_mut()) {
            let pixels = renderer.render(&input)?;
            encoder.write_frame(&pixels)?;
        }

        if let Some(features) = session.features() {
            if cli.dump_features {
                serde_json::to_writer(&mut out, features).context("Failed to write features")?;
                writeln!(out)?;
            }
            if limit.is_none() {
                pb.set_message(format!(
                    "bass {:.2} mid {:.2} treble {:.2} beat {:.2}",
                    features.bands.bass, features.bands.mid, features.bands.treble, features.beat_pulse
                ));
            }
        }

        frame_idx += 1;
        pb.set_position(frame_idx);

        if !offline {
            let due = start + frame_period.mul_f64(frame_idx as f64);
            if let Some(wait) = due.checked_duration_since(Instant::now()) {
                std::thread::sleep(wait);
            }
        }
    }

    pb.finish_with_message("done");
    session.stop_session();

    if let Some(encoder) = encoder {
        log::info!("Finishing encoding...");
        encoder.finish()?;
    }

    if let Some(ref path) = cli.output {
        log::info!("Done! Output: {}", path.display());
    }
    Ok(())
}

/// Config values apply only where the command line kept its default.
fn merge_config(cli: &mut Cli, cfg: &Config) {
    if cli.width == 1280 { cli.width = cfg.output.width; }
    if cli.height == 720 { cli.height = cfg.output.height; }
    if cli.fps == 60 { cli.fps = cfg.output.fps; }
    if cli.sensitivity == 1.5 { cli.sensitivity = cfg.visual.sensitivity; }
    if cli.brightness == 1.0 { cli.brightness = cfg.visual.brightness; }
    if cli.speed == 0.5 { cli.speed = cfg.visual.speed; }
    if cli.colors.is_empty() && cli.palette.is_none() {
        cli.colors = cfg.visual.colors.clone();
    }
    if cli.device.is_none() {
        cli.device = cfg.audio.device.clone();
    }
    if !cli.no_monitor {
        cli.no_monitor = !cfg.audio.monitor;
    }
    if !cli.no_particles {
        cli.no_particles = !cfg.visual.particles;
    }
    if !cli.gpu {
        cli.gpu = cfg.render.backend == Backend::Gpu;
    }
}

fn preset_palette(name: &str) -> Result<Palette> {
    let preset = palette::preset(name)
        .with_context(|| format!("Unknown palette '{}' (see --list-palettes)", name))?;
    Ok(preset?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_fills_only_untouched_flags() {
        let mut cli = Cli::parse_from(["cymatica", "a.wav", "--width", "640"]);
        let cfg = config::parse_config(
            r##"
            [output]
            width = 1920
            height = 1080

            [visual]
            speed = 1.25
            colors = ["#ffffff"]

            [render]
            backend = "gpu"
            "##,
        )
        .unwrap();
        merge_config(&mut cli, &cfg);

        assert_eq!(cli.width, 640);
        assert_eq!(cli.height, 1080);
        assert_eq!(cli.speed, 1.25);
        assert_eq!(cli.colors, vec!["#ffffff"]);
        assert!(cli.gpu);
        assert!(!cli.no_monitor);
    }

    #[test]
    fn named_presets_resolve() {
        assert_eq!(preset_palette("opal").unwrap(), Palette::default());
        assert!(preset_palette("plaid").is_err());
    }
}
