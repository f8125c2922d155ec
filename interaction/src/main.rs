//! ember-sim: headless driver for the interaction core.
//!
//! Runs a scripted fill, light, consume, and deplete session against the
//! simulated world and prints engine status after every phase.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, trace, warn};

use ember_interaction::config::{
    ConfigSource, InteractionConfig, SexpFileConfig, StaticConfig,
};
use ember_interaction::error::ConfigError;
use ember_interaction::hand::{Hand, ModelHand};
use ember_interaction::haptics::{Haptics, PulseOutput};
use ember_interaction::sim::Rig;

#[derive(Parser, Debug)]
#[command(name = "ember-sim", about = "Headless driver for the Ember interaction core")]
struct Cli {
    /// Plist config file (default: built-in thresholds)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after N ticks
    #[arg(long)]
    ticks: Option<u64>,

    /// Tick period in milliseconds
    #[arg(long, default_value_t = 100.0)]
    tick_ms: f64,

    /// Mirror controller and model hands
    #[arg(long)]
    left_handed: bool,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

/// Config source with command-line overrides applied on every load.
struct Overrides {
    inner: Box<dyn ConfigSource>,
    left_handed: bool,
}

impl ConfigSource for Overrides {
    fn load(&self) -> Result<InteractionConfig, ConfigError> {
        let mut config = self.inner.load()?;
        config.left_handed |= self.left_handed;
        Ok(config)
    }
}

/// Pulse output with no hardware behind it.
struct TracePulses;

impl PulseOutput for TracePulses {
    fn pulse(&self, hand: Hand, intensity: f32) {
        trace!(hand = hand.as_str(), intensity, "pulse");
    }
}

/// Tick budget shared by all phases.
struct Session {
    rig: Rig,
    tick_ms: f64,
    max_ticks: Option<u64>,
}

impl Session {
    /// Run for `duration_ms`. False once the tick budget is spent.
    fn run(&mut self, duration_ms: f64) -> bool {
        let mut elapsed = 0.0;
        while elapsed < duration_ms {
            if self.exhausted() {
                return false;
            }
            self.rig.tick(self.tick_ms);
            elapsed += self.tick_ms;
        }
        true
    }

    fn exhausted(&self) -> bool {
        self.max_ticks
            .map(|max| self.rig.engine.ticks() >= max)
            .unwrap_or(false)
    }

    fn report(&self, phase: &str) {
        info!("Phase complete: {}", phase);
        println!("{}", self.rig.engine.status_sexp());
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("ember-sim {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ember_interaction=info".into()),
        )
        .init();

    info!("ember-sim v{} starting", env!("CARGO_PKG_VERSION"));
    if cli.tick_ms.is_nan() || cli.tick_ms <= 0.0 {
        anyhow::bail!("--tick-ms must be positive, got {}", cli.tick_ms);
    }

    let base: Box<dyn ConfigSource> = match &cli.config {
        Some(path) => Box::new(SexpFileConfig::new(path)),
        None => Box::new(StaticConfig::default()),
    };
    let source = Overrides {
        inner: base,
        left_handed: cli.left_handed,
    };
    // Haptics are sized from the startup config; the engine loads its own copy.
    let startup = match source.load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "config load failed, using defaults");
            InteractionConfig::default()
        }
    };
    let haptics = Haptics::new(&startup, Arc::new(TracePulses));
    let rig = Rig::with_feedback(Box::new(source), Some(Box::new(haptics)));

    let mut session = Session {
        rig,
        tick_ms: cli.tick_ms,
        max_ticks: cli.ticks,
    };
    run_script(&mut session);

    info!(
        ticks = session.rig.engine.ticks(),
        consumed = session.rig.effects.consumed(),
        "session finished"
    );
    Ok(())
}

/// Fill, light, then consume until the container is spent.
fn run_script(s: &mut Session) {
    let container = s.rig.model(Hand::Right);
    let igniter = s.rig.model(Hand::Left);

    // Fill
    s.rig.world.equip(container, "pipe-wood-empty");
    let herb = s.rig.world.place("herb-lavender");
    s.rig.world.grab(Hand::Left, herb);
    s.rig.poses.hands_apart(4.0);
    if !s.run(1200.0) {
        return;
    }
    s.rig.world.release(Hand::Left);
    if !s.run(300.0) {
        return;
    }
    s.report("fill");

    // Light
    s.rig.world.equip(igniter, "flame-spell");
    if !s.run(3500.0) {
        return;
    }
    s.report("light");

    // Consume
    s.rig.poses.rest(Hand::Left);
    let dwell = s.rig.config().inhale_duration_ms + s.tick_ms * 2.0;
    let limit = s.rig.config().max_consumptions + 2;
    for _ in 0..limit {
        if s.rig.engine.state().active_effect().is_none() {
            break;
        }
        let config = s.rig.config().clone();
        s.rig.poses.to_face(Hand::Right, &config);
        if !s.run(dwell) {
            return;
        }
        s.rig.poses.rest(Hand::Right);
        if !s.run(s.tick_ms * 3.0) {
            return;
        }
    }
    s.report("consume");

    // Put everything away
    s.rig.world.unequip(ModelHand::Left);
    s.rig.world.unequip(ModelHand::Right);
    if s.run(s.rig.config().near_clip_restore_ms) {
        s.report("stow");
    }
}
