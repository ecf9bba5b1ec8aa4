use seqcache::cli::{Args, Command, PlayArgs};
use seqcache::config::{self, PathConfig, Settings};
use seqcache::core::cache::{Direction, InOutPoints};
use seqcache::core::events::SessionEvent;
use seqcache::entities::{FileInfo, Sequence};
use seqcache::io::{IoSystem, ReadOptions};
use seqcache::text::TextTable;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    // Parse command-line arguments first (needed for log setup)
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }

    init_logging(&args, &path_config)?;
    debug!("Command-line args: {:?}", args);

    let settings_path = config::config_file(config::SETTINGS_FILE, &path_config);
    let settings = Settings::load(&settings_path).unwrap_or_else(|e| {
        warn!("{:#}, using defaults", e);
        Settings::default()
    });

    match &args.command {
        Command::Parse { sequence } => parse(sequence),
        Command::Info { file } => print_info(file, &settings),
        Command::Play(play_args) => play(play_args, &settings),
    }
}

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn parse(input: &str) -> Result<()> {
    let (file, mut sequence) = match input.parse::<Sequence>() {
        Ok(seq) => (None, seq),
        Err(e) => {
            let file = FileInfo::new(input);
            match file.sequence().cloned() {
                Some(seq) => (Some(file), seq),
                None => return Err(e).with_context(|| format!("Not a frame sequence: {}", input)),
            }
        }
    };

    if let Some(file) = &file {
        println!("base:       {}", file.base());
        println!("extension:  {}", file.extension());
    }
    let ranges: Vec<String> = sequence.ranges.iter().map(|r| format!("[{}, {}]", r.min, r.max)).collect();
    println!("ranges:     {}", ranges.join(" "));
    println!("size:       {}", sequence.size());
    println!("pad:        {}", sequence.pad);
    sequence.sort();
    println!("normalized: {}", sequence);
    Ok(())
}

/// Resolve a path to a file info, discovering the sequence on disk for
/// single frames of sequence formats
fn resolve_file(path: &Path, system: &IoSystem) -> Result<FileInfo> {
    let mut file = FileInfo::new(path);
    if !file.is_sequence() && file.sequence().is_some() && system.can_sequence(&file) {
        file.detect_sequence()?;
    }
    if !system.can_read(&file) {
        bail!("Unsupported file: {}", path.display());
    }
    Ok(file)
}

fn read_options(settings: &Settings) -> ReadOptions {
    ReadOptions {
        io: settings.io.clone(),
        ..ReadOptions::default()
    }
}

fn print_info(path: &Path, settings: &Settings) -> Result<()> {
    let system = IoSystem::with_defaults(Arc::new(TextTable::default()));
    let file = resolve_file(path, &system)?;
    let session = system.read(&file, read_options(settings))?;
    let info = session.info().wait()?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn play(args: &PlayArgs, settings: &Settings) -> Result<()> {
    let system = IoSystem::with_defaults(Arc::new(TextTable::default()));
    let file = resolve_file(&args.file, &system)?;
    let session = system.read(&file, read_options(settings))?;
    let info = session.info().wait()?;

    let size = info.sequence_size();
    let fps = args
        .fps
        .or_else(|| info.video.first().map(|v| v.speed.fps()))
        .unwrap_or(24.0)
        .max(0.1);

    let cache_enabled = settings.cache.enabled && !args.no_cache && session.has_cache();
    if cache_enabled {
        let budget = match args.cache_mb {
            Some(mb) => mb * 1024 * 1024,
            None => settings.cache.budget_bytes(1),
        };
        session.set_cache_read_behind(settings.cache.read_behind);
        session.set_cache_max_byte_count(budget);
        session.set_cache_enabled(true);
    }

    let in_out = match (args.in_point, args.out_point) {
        (Some(i), Some(o)) => InOutPoints::new(true, i, o),
        _ => InOutPoints::default(),
    };
    let range = in_out.range(size);
    session.set_in_out_points(in_out);
    session.set_loop(args.loop_playback);

    let direction = if args.reverse { Direction::Reverse } else { Direction::Forward };
    let start = match (range, direction) {
        (Some(r), Direction::Forward) => r.min,
        (Some(r), Direction::Reverse) => r.max,
        (None, _) => 0,
    };
    let ticks = args.frames.unwrap_or_else(|| range.map(|r| r.len()).unwrap_or(size.max(1)));

    info!("Playing {} at {:.3} fps, {} ticks", file, fps, ticks);
    session.seek(start, direction);
    session.set_playback(true);

    let queue = session.video_queue();
    let events = session.events();
    let tick = Duration::from_secs_f32(1.0 / fps);
    let started = Instant::now();
    let mut next_tick = started + tick;
    let (mut shown, mut dropped, mut errors) = (0usize, 0usize, 0usize);

    for _ in 0..ticks {
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        }
        next_tick += tick;

        match queue.pop_frame() {
            Some(frame) => {
                shown += 1;
                session.set_current_frame(frame.frame);
            }
            None if queue.is_drained() => break,
            None => dropped += 1,
        }
        for event in events.try_iter() {
            if let SessionEvent::DecodeError { frame, error, .. } = event {
                errors += 1;
                warn!("Frame {}: {}", frame, error);
            }
        }
    }
    session.set_playback(false);

    let elapsed = started.elapsed().as_secs_f32();
    println!("file:     {}", file);
    println!("shown:    {} / {} ticks ({} dropped, {} decode errors)", shown, ticks, dropped, errors);
    println!("elapsed:  {:.2}s ({:.2} fps effective)", elapsed, shown as f32 / elapsed.max(1e-3));
    if cache_enabled {
        let max = session.cache_max_byte_count().max(1);
        let used = session.cache_byte_count();
        println!(
            "cache:    {} MB / {} MB ({:.1}%), frames {}",
            used / 1024 / 1024,
            max / 1024 / 1024,
            used as f64 * 100.0 / max as f64,
            session.cached_frames()
        );
    }
    session.close();
    Ok(())
}
