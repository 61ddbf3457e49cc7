//! # Scene — declaration, initialization, and the per-tick protocol
//!
//! A scene is declared once through [`SceneBuilder`] (entity types,
//! processors, renderers, lifecycle hooks) and then driven one tick at a
//! time. Its life is a small state machine:
//!
//! ```text
//! Uninitialized ──build()──▶ Ready ──(tick loop)──▶ ... ──drop──▶ Terminated
//! ```
//!
//! The builder is the `Uninitialized` state; `build` runs the registry's
//! construct/validate/ready protocol plus the user hooks, and the returned
//! [`Scene`] is `Ready`. Teardown happens on drop, in reverse dependency
//! order.
//!
//! ## The tick
//!
//! Every tick runs exactly three phases, never overlapping:
//!
//! 1. **Updating** — processors in declaration order. While paused, only
//!    processors whose `ignore_pause()` is true run. Each invocation is
//!    individually timed (microseconds, introspection only).
//! 2. **Sweeping** — every container removes entities flagged for removal.
//!    This is the single point in a tick where identities die.
//! 3. **Rendering** — renderers in declaration order, each handed a
//!    [`RenderPass`] over the shared frame.

use std::time::Instant;

use crate::entity::Entity;
use crate::error::BuildError;
use crate::events::EventHub;
use crate::pool::ThreadPool;
use crate::registry::{ContainerDecl, ProcessorDecl, Registry, RendererDecl, SystemTiming};
use crate::render::RenderFrame;
use crate::system::{Processor, Renderer, RenderPass, UpdateContext};

type InitHook = Box<dyn FnOnce(&mut Scene)>;
type EventsHook = Box<dyn FnOnce(&mut EventHub)>;

/// Declares a scene's entity types, systems, and lifecycle hooks.
///
/// Declaration order is execution order: processors update and renderers
/// render exactly in the order they appear here.
///
/// # Example
///
/// ```ignore
/// let scene = SceneBuilder::new()
///     .entities::<Ball>()
///     .processor::<Physics>()
///     .renderer::<BallRenderer>()
///     .on_initialized(|scene| {
///         scene.registry().entities_mut::<Ball>().create(Ball::default());
///     })
///     .build(&mut events)?;
/// ```
#[derive(Default)]
pub struct SceneBuilder {
    containers: Vec<ContainerDecl>,
    processors: Vec<ProcessorDecl>,
    renderers: Vec<RendererDecl>,
    on_initialized: Option<InitHook>,
    register_events: Option<EventsHook>,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an entity container for `T`.
    pub fn entities<T: Entity>(mut self) -> Self {
        self.containers.push(ContainerDecl::of::<T>());
        self
    }

    /// Declare a processor, constructed with `Default`.
    pub fn processor<P: Processor + Default>(self) -> Self {
        self.processor_with(P::default())
    }

    /// Declare a processor from a prepared value.
    pub fn processor_with<P: Processor>(mut self, processor: P) -> Self {
        self.processors.push(ProcessorDecl::of(processor));
        self
    }

    /// Declare a renderer, constructed with `Default`.
    pub fn renderer<R: Renderer + Default>(self) -> Self {
        self.renderer_with(R::default())
    }

    /// Declare a renderer from a prepared value.
    pub fn renderer_with<R: Renderer>(mut self, renderer: R) -> Self {
        self.renderers.push(RendererDecl::of(renderer));
        self
    }

    /// Hook invoked once, after every system's `on_ready`. Typically used to
    /// create the scene's initial entities.
    pub fn on_initialized(mut self, hook: impl FnOnce(&mut Scene) + 'static) -> Self {
        self.on_initialized = Some(Box::new(hook));
        self
    }

    /// Hook invoked once, before the tick loop, to register event callbacks
    /// with the driver's [`EventHub`].
    pub fn events(mut self, hook: impl FnOnce(&mut EventHub) + 'static) -> Self {
        self.register_events = Some(Box::new(hook));
        self
    }

    /// Build the scene: construct and validate the registry, run the ready
    /// phase, register events, then run the `on_initialized` hook.
    pub fn build(self, events: &mut EventHub) -> Result<Scene, BuildError> {
        let registry = Registry::build(self.containers, self.processors, self.renderers)?;
        let mut scene = Scene {
            registry,
            tick_count: 0,
            last_tick_us: 0,
        };
        if let Some(hook) = self.register_events {
            hook(events);
        }
        if let Some(hook) = self.on_initialized {
            hook(&mut scene);
        }
        log::info!("scene ready");
        Ok(scene)
    }
}

/// A built scene, driven by the application one tick at a time.
pub struct Scene {
    registry: Registry,
    tick_count: u64,
    last_tick_us: u64,
}

impl Scene {
    /// The scene's registry: containers and systems.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Advance one tick: update, sweep, render.
    ///
    /// `paused` is sampled once by the caller per tick; while paused, only
    /// processors with `ignore_pause()` run. Rendering always runs.
    pub fn tick(&mut self, dt: f32, pool: &ThreadPool, paused: bool, frame: &mut RenderFrame) {
        let tick_start = Instant::now();

        // Updating
        for slot in self.registry.processor_slots() {
            let mut processor = slot.borrow_mut();
            if paused && !processor.ignore_pause() {
                continue;
            }
            let start = Instant::now();
            let mut cx = UpdateContext::new(&self.registry, pool);
            processor.update(&mut cx, dt);
            slot.set_elapsed_us(start.elapsed().as_micros() as u64);
        }

        // Sweeping: the only point where identities are invalidated.
        let removed = self.registry.sweep_all();
        if removed > 0 {
            log::trace!("sweep removed {removed} entities");
        }

        // Rendering
        for slot in self.registry.renderer_slots() {
            let mut renderer = slot.borrow_mut();
            let start = Instant::now();
            let mut pass = RenderPass::new(&self.registry, frame);
            renderer.render(&mut pass);
            slot.set_elapsed_us(start.elapsed().as_micros() as u64);
        }

        self.last_tick_us = tick_start.elapsed().as_micros() as u64;
        self.tick_count += 1;
    }

    /// Ticks completed so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Duration of the most recent tick, in microseconds.
    pub fn last_tick_us(&self) -> u64 {
        self.last_tick_us
    }

    /// Duration of the most recent tick, in milliseconds.
    pub fn last_tick_ms(&self) -> f32 {
        self.last_tick_us as f32 * 0.001
    }

    /// Per-system timing snapshot (processors then renderers, declaration
    /// order).
    pub fn timings(&self) -> Vec<SystemTiming> {
        self.registry.timings()
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("registry", &self.registry)
            .field("tick_count", &self.tick_count)
            .field("last_tick_us", &self.last_tick_us)
            .finish()
    }
}
