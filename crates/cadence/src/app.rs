//! # App — the application driver
//!
//! Owns everything with process lifetime: the single [`ThreadPool`], the
//! pause flag, the [`RenderFrame`], the [`EventHub`], the simulated clock,
//! and at most one active [`Scene`]. Drives the scene's tick at a fixed
//! rate; the frame's fixed `dt` is `1 / tick_rate`, matching the original
//! fixed-step model rather than a variable frame delta.
//!
//! The driver deliberately knows nothing about windows or input devices. A
//! backend integrating one calls [`App::emit`] with event keys and drains
//! [`App::frame`] after each tick.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, ConfigError};
use crate::events::{Control, EventContext, EventHub};
use crate::pool::ThreadPool;
use crate::render::RenderFrame;
use crate::scene::{Scene, SceneBuilder};
use crate::time::Time;

/// Driver configuration, loadable from JSON.
///
/// ```json
/// { "worker_threads": 0, "tick_rate": 120, "start_paused": false }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Worker threads for the pool. `0` means all available hardware
    /// concurrency minus the driver thread.
    pub worker_threads: usize,
    /// Ticks per second; the fixed `dt` is its reciprocal.
    pub tick_rate: u32,
    /// Start with the pause flag set.
    pub start_paused: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            tick_rate: 120,
            start_paused: false,
        }
    }
}

impl AppConfig {
    /// Parse a config from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a config from a JSON file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// The application driver.
pub struct App {
    pool: ThreadPool,
    events: EventHub,
    scene: Option<Scene>,
    frame: RenderFrame,
    control: Control,
    time: Time,
    dt: f32,
    tick_rate: u32,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let tick_rate = config.tick_rate.max(1);
        let dt = 1.0 / tick_rate as f32;
        log::info!("app: tick rate {tick_rate} Hz (dt {dt:.5}s)");
        Self {
            pool: ThreadPool::new(config.worker_threads),
            events: EventHub::new(),
            scene: None,
            frame: RenderFrame::new(),
            control: Control {
                exit: false,
                paused: config.start_paused,
            },
            time: Time::new(),
            dt,
            tick_rate,
        }
    }

    /// Build and install a scene, replacing any previous one. Event handlers
    /// registered by the previous scene are dropped first; the new scene's
    /// event hook runs during the build.
    pub fn set_scene(&mut self, builder: SceneBuilder) -> Result<&mut Scene, BuildError> {
        self.events.clear();
        let scene = builder.build(&mut self.events)?;
        Ok(self.scene.insert(scene))
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    pub fn scene_mut(&mut self) -> Option<&mut Scene> {
        self.scene.as_mut()
    }

    /// Advance one frame: clear the frame, tick the scene, advance the clock.
    ///
    /// The pause flag is sampled once here, so toggling it mid-tick takes
    /// effect on the next tick. Without an installed scene the driver
    /// requests exit, mirroring the original's "no scene, exiting".
    pub fn tick(&mut self) {
        self.frame.clear();
        let paused = self.control.paused;
        match &mut self.scene {
            Some(scene) => scene.tick(self.dt, &self.pool, paused, &mut self.frame),
            None => {
                log::warn!("no active scene, requesting exit");
                self.control.exit = true;
                return;
            }
        }
        if !paused {
            self.time.advance(self.dt);
        }
    }

    /// Tick up to `frames` times, stopping early if exit is requested.
    pub fn run_frames(&mut self, frames: u64) {
        for _ in 0..frames {
            if self.control.exit {
                break;
            }
            self.tick();
        }
    }

    /// Tick at the configured rate until exit is requested.
    pub fn run(&mut self) {
        let period = Duration::from_secs_f64(1.0 / f64::from(self.tick_rate));
        while !self.control.exit {
            let start = Instant::now();
            self.tick();
            if let Some(remaining) = period.checked_sub(start.elapsed()) {
                std::thread::sleep(remaining);
            }
        }
        log::info!("app: exiting after {} tick(s)", self.time.tick_count());
    }

    /// Run the handlers registered for an event key. Returns how many ran.
    pub fn emit(&mut self, key: &str) -> usize {
        let mut events = std::mem::take(&mut self.events);
        let mut cx = EventContext {
            scene: self.scene.as_mut(),
            control: &mut self.control,
        };
        let ran = events.emit(key, &mut cx);
        self.events = events;
        ran
    }

    // ── Control ──────────────────────────────────────────────────────

    /// Stop the run loop after the current frame.
    pub fn request_exit(&mut self) {
        self.control.exit = true;
    }

    pub fn exit_requested(&self) -> bool {
        self.control.exit
    }

    /// Flip the pause flag. Read once per tick, so a mid-tick toggle applies
    /// from the next tick on.
    pub fn toggle_pause(&mut self) {
        self.control.paused = !self.control.paused;
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.control.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.control.paused
    }

    // ── Introspection ────────────────────────────────────────────────

    /// Drawables submitted during the most recent tick.
    pub fn frame(&self) -> &RenderFrame {
        &self.frame
    }

    /// Mutable access for driver backends that drain the frame.
    pub fn frame_mut(&mut self) -> &mut RenderFrame {
        &mut self.frame
    }

    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    pub fn time(&self) -> &Time {
        &self.time
    }

    /// The fixed per-tick delta, `1 / tick_rate`.
    pub fn dt(&self) -> f32 {
        self.dt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::system::{Processor, System, UpdateContext};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn quiet_config() -> AppConfig {
        AppConfig {
            worker_threads: 1,
            tick_rate: 120,
            start_paused: false,
        }
    }

    struct Pixel {
        remove: bool,
    }
    impl Entity for Pixel {
        fn removal_requested(&self) -> bool {
            self.remove
        }
        fn request_removal(&mut self) {
            self.remove = true;
        }
    }

    struct Counter {
        ticks: Arc<AtomicU64>,
    }
    impl System for Counter {}
    impl Processor for Counter {
        fn update(&mut self, _cx: &mut UpdateContext<'_>, _dt: f32) {
            self.ticks.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.tick_rate, 120);
        assert!(!config.start_paused);
    }

    #[test]
    fn config_from_json_fills_missing_fields() {
        let config = AppConfig::from_json(r#"{ "worker_threads": 3 }"#).unwrap();
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.tick_rate, 120);
    }

    #[test]
    fn config_rejects_malformed_json() {
        assert!(AppConfig::from_json("{ nope").is_err());
    }

    #[test]
    fn tick_without_scene_requests_exit() {
        let mut app = App::new(quiet_config());
        app.tick();
        assert!(app.exit_requested());
    }

    #[test]
    fn run_frames_ticks_the_scene() {
        let ticks = Arc::new(AtomicU64::new(0));
        let mut app = App::new(quiet_config());
        app.set_scene(SceneBuilder::new().processor_with(Counter {
            ticks: Arc::clone(&ticks),
        }))
        .unwrap();

        app.run_frames(5);
        assert_eq!(ticks.load(Ordering::Relaxed), 5);
        assert_eq!(app.time().tick_count(), 5);
    }

    #[test]
    fn pause_freezes_clock_and_processors() {
        let ticks = Arc::new(AtomicU64::new(0));
        let mut app = App::new(quiet_config());
        app.set_scene(SceneBuilder::new().processor_with(Counter {
            ticks: Arc::clone(&ticks),
        }))
        .unwrap();

        app.run_frames(2);
        app.set_paused(true);
        app.run_frames(3);
        assert_eq!(ticks.load(Ordering::Relaxed), 2);
        assert_eq!(app.time().tick_count(), 2);

        app.set_paused(false);
        app.run_frames(1);
        assert_eq!(ticks.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn events_reach_registered_handlers() {
        let mut app = App::new(quiet_config());
        app.set_scene(
            SceneBuilder::new()
                .entities::<Pixel>()
                .events(|hub| {
                    hub.on("key:escape", |cx| cx.request_exit());
                    hub.on("key:p", |cx| cx.toggle_pause());
                }),
        )
        .unwrap();

        assert_eq!(app.emit("key:unbound"), 0);
        assert_eq!(app.emit("key:p"), 1);
        assert!(app.is_paused());
        app.emit("key:escape");
        assert!(app.exit_requested());
    }

    #[test]
    fn switching_scenes_drops_old_event_handlers() {
        let mut app = App::new(quiet_config());
        app.set_scene(SceneBuilder::new().events(|hub| hub.on("key:a", |_| {})))
            .unwrap();
        assert_eq!(app.emit("key:a"), 1);

        app.set_scene(SceneBuilder::new().events(|hub| hub.on("key:b", |_| {})))
            .unwrap();
        assert_eq!(app.emit("key:a"), 0);
        assert_eq!(app.emit("key:b"), 1);
    }

    #[test]
    fn handlers_can_reach_the_active_scene() {
        let mut app = App::new(quiet_config());
        app.set_scene(
            SceneBuilder::new()
                .entities::<Pixel>()
                .events(|hub| {
                    hub.on("spawn", |cx| {
                        let scene = cx.scene.as_mut().unwrap();
                        scene
                            .registry()
                            .entities_mut::<Pixel>()
                            .create(Pixel { remove: false });
                    });
                }),
        )
        .unwrap();

        app.emit("spawn");
        app.emit("spawn");
        let scene = app.scene().unwrap();
        assert_eq!(scene.registry().entities::<Pixel>().len(), 2);
    }
}
