//! Headless demo: a field of decaying particles.
//!
//! A `Spawner` processor keeps the population topped up, `Movement` advances
//! every particle in parallel, `Decay` flags expired ones for the sweep, and
//! `ParticleRenderer` submits one drawable per survivor. Run with
//! `RUST_LOG=debug` to watch the scene build.

use cadence::prelude::*;

// ── Entities ─────────────────────────────────────────────────────────────

struct Particle {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    ttl: f32,
    remove: bool,
}

impl Entity for Particle {
    fn removal_requested(&self) -> bool {
        self.remove
    }
    fn request_removal(&mut self) {
        self.remove = true;
    }
}

// ── Processors ───────────────────────────────────────────────────────────

#[derive(Default)]
struct Spawner {
    seed: u32,
}

impl Spawner {
    fn next(&mut self) -> f32 {
        // xorshift, plenty for a demo
        self.seed = self.seed.wrapping_mul(747796405).wrapping_add(2891336453);
        (self.seed >> 8) as f32 / (1 << 24) as f32
    }
}

impl System for Spawner {
    fn dependencies() -> Dependencies {
        Dependencies::new().entities::<Particle>()
    }
}

impl Processor for Spawner {
    fn update(&mut self, cx: &mut UpdateContext<'_>, _dt: f32) {
        while cx.entities::<Particle>().len() < 2000 {
            let (a, b, c) = (self.next(), self.next(), self.next());
            cx.create(Particle {
                x: a * 1920.0,
                y: b * 1080.0,
                vx: (a - 0.5) * 200.0,
                vy: (b - 0.5) * 200.0,
                ttl: 1.0 + c * 4.0,
                remove: false,
            });
        }
    }
}

#[derive(Default)]
struct Movement;

impl System for Movement {
    fn dependencies() -> Dependencies {
        Dependencies::new().entities::<Particle>()
    }
}

impl Processor for Movement {
    fn update(&mut self, cx: &mut UpdateContext<'_>, dt: f32) {
        let result = cx.par_each_mut::<Particle, _>(|p| {
            p.x += p.vx * dt;
            p.y += p.vy * dt;
            if !(0.0..1920.0).contains(&p.x) {
                p.vx = -p.vx;
            }
            if !(0.0..1080.0).contains(&p.y) {
                p.vy = -p.vy;
            }
        });
        if let Err(failure) = result {
            log::error!("movement dispatch failed: {failure}");
        }
    }
}

#[derive(Default)]
struct Decay;

impl System for Decay {
    fn dependencies() -> Dependencies {
        Dependencies::new().entities::<Particle>()
    }
}

impl Processor for Decay {
    fn update(&mut self, cx: &mut UpdateContext<'_>, dt: f32) {
        cx.entities_mut::<Particle>().for_each(|p| {
            p.ttl -= dt;
            if p.ttl <= 0.0 {
                p.request_removal();
            }
        });
    }
}

// ── Renderer ─────────────────────────────────────────────────────────────

#[derive(Debug)]
struct DotCommand {
    #[allow(dead_code)]
    x: f32,
    #[allow(dead_code)]
    y: f32,
}

impl Drawable for DotCommand {}

#[derive(Default)]
struct ParticleRenderer;

impl System for ParticleRenderer {
    fn dependencies() -> Dependencies {
        Dependencies::new().entities::<Particle>()
    }
}

impl Renderer for ParticleRenderer {
    fn render(&mut self, pass: &mut RenderPass<'_>) {
        let particles = pass.entities::<Particle>();
        let commands: Vec<DotCommand> = particles
            .iter()
            .map(|p| DotCommand { x: p.x, y: p.y })
            .collect();
        drop(particles);
        for command in commands {
            pass.submit(command);
        }
    }
}

// ── Driver ───────────────────────────────────────────────────────────────

fn main() {
    env_logger::init();

    let mut app = App::new(AppConfig::default());
    app.set_scene(
        SceneBuilder::new()
            .entities::<Particle>()
            .processor::<Spawner>()
            .processor::<Movement>()
            .processor::<Decay>()
            .renderer::<ParticleRenderer>()
            .events(|hub| {
                hub.on("key:escape", |cx| cx.request_exit());
                hub.on("key:space", |cx| cx.toggle_pause());
            }),
    )
    .expect("scene build failed");

    // No windowing backend here: simulate ten seconds of frames, then report.
    app.run_frames(1200);

    println!(
        "simulated {:.1}s over {} ticks, {} drawable(s) in the last frame",
        app.time().elapsed_secs(),
        app.time().tick_count(),
        app.frame().len()
    );
    if let Some(scene) = app.scene() {
        for timing in scene.timings() {
            println!("  {:>9} µs  {}", timing.elapsed_us, timing.name);
        }
    }

    app.emit("key:escape");
    assert!(app.exit_requested());
}
