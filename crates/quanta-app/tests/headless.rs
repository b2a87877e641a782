use std::fs;
use std::path::PathBuf;

use clap::Parser;
use quanta_app::{Cli, LabKind, RunOptions, load_config, run_music, run_psyche};
use quanta_core::{MotionStyle, MusicConfig, PsycheConfig};

fn options(ticks: u64) -> RunOptions {
    RunOptions {
        ticks,
        dt: 1.0 / 60.0,
        report_every: 60,
    }
}

fn scratch_file(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("quanta-{}-{name}", std::process::id()));
    fs::write(&path, contents).expect("write scratch config");
    path
}

#[test]
fn cli_parses_lab_and_overrides() {
    let cli = Cli::try_parse_from([
        "quanta", "--lab", "psyche", "--ticks", "30", "--seed", "4", "--style", "jazz",
    ])
    .expect("parse");
    assert_eq!(cli.lab, LabKind::Psyche);
    assert_eq!(cli.run_options().ticks, 30);
    let config = cli.psyche_config().expect("config");
    assert_eq!(config.rng_seed, Some(4));
    assert_eq!(config.motion.style, MotionStyle::Jazz);
}

#[test]
fn unknown_style_is_rejected() {
    let cli = Cli::try_parse_from(["quanta", "--style", "waltz"]).expect("parse");
    let err = cli.music_config().expect_err("unknown style");
    assert!(err.to_string().contains("waltz"));
}

#[test]
fn config_file_merges_onto_defaults() {
    let path = scratch_file("music.json", r#"{"particle_count": 32, "bpm": 90.0}"#);
    let config: MusicConfig = load_config(Some(path.as_path())).expect("load");
    fs::remove_file(&path).ok();
    assert_eq!(config.particle_count, 32);
    assert_eq!(config.bpm, 90.0);
    assert_eq!(config.max_speed, MusicConfig::default().max_speed);

    let defaults: PsycheConfig = load_config(None).expect("defaults");
    assert_eq!(defaults, PsycheConfig::default());
}

#[test]
fn malformed_config_reports_the_path() {
    let path = scratch_file("broken.json", "{ not json");
    let err = load_config::<MusicConfig>(Some(path.as_path())).expect_err("parse failure");
    fs::remove_file(&path).ok();
    assert!(format!("{err:#}").contains("broken.json"));
}

#[test]
fn music_run_reports_its_totals() {
    let config = MusicConfig {
        particle_count: 80,
        rng_seed: Some(1),
        ..MusicConfig::default()
    };
    let summary = run_music(config, &options(120)).expect("run");
    assert_eq!(summary.ticks, 120);
    assert_eq!(summary.particles, 80);
    assert!((summary.time - 2.0).abs() < 1e-3);
    assert!((0.0..=1.0 + 1e-5).contains(&summary.order));
}

#[test]
fn psyche_run_reports_its_totals() {
    let config = PsycheConfig {
        particle_count: 120,
        rng_seed: Some(2),
        ..PsycheConfig::default()
    };
    let summary = run_psyche(config, &options(120)).expect("run");
    assert_eq!(summary.ticks, 120);
    assert_eq!(summary.particles, 120);
    assert!(summary.tags_acquired + summary.phase_changes <= summary.events);
    assert!(summary.indices.tension <= 1.0);
}

#[test]
fn invalid_runs_fail_cleanly() {
    let bad_dt = RunOptions {
        dt: 0.0,
        ..options(10)
    };
    assert!(run_music(MusicConfig::default(), &bad_dt).is_err());
    let bad_config = PsycheConfig {
        max_speed: -1.0,
        ..PsycheConfig::default()
    };
    assert!(run_psyche(bad_config, &options(10)).is_err());
}
