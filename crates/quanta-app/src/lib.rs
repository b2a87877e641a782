//! Headless runner plumbing: command-line options, config loading and fixed-step lab drivers.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use quanta_core::psyche::Indices;
use quanta_core::{MotionStyle, MusicConfig, MusicLab, Phase, PsycheConfig, PsycheEvent, PsycheLab};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LabKind {
    Music,
    Psyche,
}

#[derive(Parser, Debug)]
#[command(
    name = "quanta",
    version,
    about = "Drive a Quanta lab headlessly and report summaries"
)]
pub struct Cli {
    /// Which lab to run.
    #[arg(long, value_enum, default_value_t = LabKind::Music)]
    pub lab: LabKind,
    /// Number of steps to run.
    #[arg(long, default_value_t = 600)]
    pub ticks: u64,
    /// Fixed step length in seconds.
    #[arg(long, default_value_t = 1.0 / 60.0)]
    pub dt: f32,
    /// Partial JSON config merged onto the lab defaults.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// RNG seed; overrides the config file.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Motion style by name (e.g. murmuration or polarization).
    #[arg(long)]
    pub style: Option<String>,
    /// Ticks between progress summaries; 0 disables them.
    #[arg(long, default_value_t = 60)]
    pub report_every: u64,
}

impl Cli {
    #[must_use]
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            ticks: self.ticks,
            dt: self.dt,
            report_every: self.report_every,
        }
    }

    fn style(&self) -> Result<Option<MotionStyle>> {
        self.style
            .as_deref()
            .map(|name| MotionStyle::from_name(name).with_context(|| format!("unknown motion style `{name}`")))
            .transpose()
    }

    pub fn music_config(&self) -> Result<MusicConfig> {
        let mut config: MusicConfig = load_config(self.config.as_deref())?;
        if let Some(seed) = self.seed {
            config.rng_seed = Some(seed);
        }
        if let Some(style) = self.style()? {
            config.motion.style = style;
        }
        Ok(config)
    }

    pub fn psyche_config(&self) -> Result<PsycheConfig> {
        let mut config: PsycheConfig = load_config(self.config.as_deref())?;
        if let Some(seed) = self.seed {
            config.rng_seed = Some(seed);
        }
        if let Some(style) = self.style()? {
            config.motion.style = style;
        }
        Ok(config)
    }
}

/// Load a partial JSON override, or the defaults when no path is given.
pub fn load_config<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOptions {
    pub ticks: u64,
    pub dt: f32,
    pub report_every: u64,
}

impl RunOptions {
    fn validate(&self) -> Result<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            bail!("dt must be a positive number of seconds, got {}", self.dt);
        }
        Ok(())
    }

    fn reports_at(&self, tick: u64) -> bool {
        self.report_every > 0 && tick.is_multiple_of(self.report_every)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MusicSummary {
    pub ticks: u64,
    pub time: f32,
    pub particles: usize,
    pub notes: usize,
    pub discharges: usize,
    pub recycled: usize,
    /// Phase synchrony at the end of the run.
    pub order: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PsycheSummary {
    pub ticks: u64,
    pub time: f32,
    pub particles: usize,
    pub events: usize,
    pub discharges: usize,
    pub tags_acquired: usize,
    pub phase_changes: usize,
    pub links: usize,
    pub phase: Phase,
    pub indices: Indices,
}

pub fn run_music(config: MusicConfig, options: &RunOptions) -> Result<MusicSummary> {
    options.validate()?;
    let mut lab = MusicLab::new(config).context("invalid music configuration")?;
    let mut summary = MusicSummary::default();
    for _ in 0..options.ticks {
        let step = lab.step(options.dt, &mut |_| {});
        summary.notes += step.notes;
        summary.discharges += step.discharges;
        summary.recycled += step.recycled;
        if options.reports_at(step.tick.0) {
            info!(
                tick = step.tick.0,
                notes = summary.notes,
                discharges = summary.discharges,
                order = lab.order_parameter().magnitude,
                "music progress"
            );
        }
    }
    summary.ticks = lab.tick().0;
    summary.time = lab.time();
    summary.particles = lab.store().len();
    summary.order = lab.order_parameter().magnitude;
    info!(
        ticks = summary.ticks,
        notes = summary.notes,
        discharges = summary.discharges,
        recycled = summary.recycled,
        "music run finished"
    );
    Ok(summary)
}

pub fn run_psyche(config: PsycheConfig, options: &RunOptions) -> Result<PsycheSummary> {
    options.validate()?;
    let mut lab = PsycheLab::new(config).context("invalid psyche configuration")?;
    let mut summary = PsycheSummary::default();
    for _ in 0..options.ticks {
        let mut tags = 0;
        let mut shifts = 0;
        let step = lab.step(options.dt, &mut |event| match event {
            PsycheEvent::TagAcquired { .. } => tags += 1,
            PsycheEvent::PhaseChanged { .. } => shifts += 1,
            PsycheEvent::Discharge { .. } | PsycheEvent::TagReleased { .. } => {}
        });
        summary.events += step.events;
        summary.discharges += step.discharges;
        summary.tags_acquired += tags;
        summary.phase_changes += shifts;
        if options.reports_at(step.tick.0) {
            let indices = lab.indices();
            info!(
                tick = step.tick.0,
                events = summary.events,
                links = step.links,
                phase = step.phase.name(),
                tension = indices.tension,
                integration = indices.integration,
                fragmentation = indices.fragmentation,
                "psyche progress"
            );
        }
    }
    summary.ticks = lab.tick().0;
    summary.time = lab.time();
    summary.particles = lab.store().len();
    summary.links = lab.links().len();
    summary.phase = lab.phase();
    summary.indices = lab.indices();
    info!(
        ticks = summary.ticks,
        events = summary.events,
        phase_changes = summary.phase_changes,
        phase = summary.phase.name(),
        "psyche run finished"
    );
    Ok(summary)
}
