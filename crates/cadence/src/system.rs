//! # Systems — Processors and Renderers
//!
//! A system is a user-defined logic unit owned by the scene's [`Registry`].
//! Two roles exist:
//!
//! - **Processors** run during the update phase, mutate entities, and may fan
//!   out data-parallel work to the thread pool.
//! - **Renderers** run during the render phase, read entities, and submit
//!   drawables to the frame. They never mutate entities — the render view
//!   only hands out shared container borrows.
//!
//! ## Dependencies
//!
//! A system declares, via [`System::dependencies`], which entity container
//! types, processor types, and renderer types it requires. The scene build
//! validates the declaration, so a declared dependency can never be missing
//! at runtime. Resolution happens through the registry on demand, and only
//! once [`on_ready`](System::on_ready) has fired.
//!
//! ## Phase views
//!
//! Systems never see the scheduler. Processors get an [`UpdateContext`]
//! (registry lookups, entity creation, parallel dispatch) and renderers get a
//! [`RenderPass`] (read-only lookups plus frame submission).

use std::any::{Any, TypeId};
use std::cell::{Ref, RefMut};

use crate::container::StableContainer;
use crate::entity::{Entity, Identity};
use crate::error::WorkerFailure;
use crate::pool::ThreadPool;
use crate::registry::Registry;
use crate::render::{Drawable, RenderFrame};

// ── Downcast support ─────────────────────────────────────────────────────

/// Upcast to `dyn Any`, implemented for every `'static` type.
///
/// Lets the registry hand back concrete system types from type-erased slots.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── Dependency declaration ───────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
pub(crate) struct DepKey {
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
}

impl DepKey {
    fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

/// The three sets of types a system requires: entity containers to iterate,
/// processors to consult, renderers to drive.
///
/// # Example
///
/// ```ignore
/// impl System for CollisionSolver {
///     fn dependencies() -> Dependencies {
///         Dependencies::new()
///             .entities::<Ball>()
///             .processor::<SpatialIndex>()
///     }
/// }
/// ```
#[derive(Default)]
pub struct Dependencies {
    pub(crate) entities: Vec<DepKey>,
    pub(crate) processors: Vec<DepKey>,
    pub(crate) renderers: Vec<DepKey>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the entity container for `T`.
    pub fn entities<T: Entity>(mut self) -> Self {
        self.entities.push(DepKey::of::<T>());
        self
    }

    /// Require the processor of type `P`. Declaring your own type fails the
    /// scene build.
    pub fn processor<P: Processor>(mut self) -> Self {
        self.processors.push(DepKey::of::<P>());
        self
    }

    /// Require the renderer of type `R`. Declaring your own type fails the
    /// scene build.
    pub fn renderer<R: Renderer>(mut self) -> Self {
        self.renderers.push(DepKey::of::<R>());
        self
    }
}

// ── System traits ────────────────────────────────────────────────────────

/// Common behavior of processors and renderers.
pub trait System: AsAny {
    /// The dependency sets this system requires. Validated when the scene is
    /// built; defaults to none.
    fn dependencies() -> Dependencies
    where
        Self: Sized,
    {
        Dependencies::new()
    }

    /// Called once after every system of the scene has been constructed and
    /// validated: processors first, then renderers, declaration order.
    /// Dependencies must not be resolved before this fires.
    fn on_ready(&mut self, registry: &Registry) {
        let _ = registry;
    }
}

/// Update-phase system. Invoked once per tick, declaration order.
pub trait Processor: System {
    fn update(&mut self, cx: &mut UpdateContext<'_>, dt: f32);

    /// When true, this processor runs even while the scene is paused.
    fn ignore_pause(&self) -> bool {
        false
    }
}

/// Render-phase system. Invoked once per tick after the sweep, declaration
/// order. Must not mutate entities or request removal.
pub trait Renderer: System {
    fn render(&mut self, pass: &mut RenderPass<'_>);
}

// ── Update-phase view ────────────────────────────────────────────────────

/// What a processor sees during its update: registry lookups, entity
/// creation, and the thread pool for data-parallel work.
pub struct UpdateContext<'a> {
    registry: &'a Registry,
    pool: &'a ThreadPool,
}

impl<'a> UpdateContext<'a> {
    pub(crate) fn new(registry: &'a Registry, pool: &'a ThreadPool) -> Self {
        Self { registry, pool }
    }

    /// The scene's registry, for dependency lookups.
    pub fn registry(&self) -> &Registry {
        self.registry
    }

    /// Shared borrow of the container for `T`. Panics if `T` is undeclared.
    pub fn entities<T: Entity>(&self) -> Ref<'a, StableContainer<T>> {
        self.registry.entities::<T>()
    }

    /// Mutable borrow of the container for `T`. Panics if `T` is undeclared.
    pub fn entities_mut<T: Entity>(&self) -> RefMut<'a, StableContainer<T>> {
        self.registry.entities_mut::<T>()
    }

    /// Create an entity in the container for `T`.
    pub fn create<T: Entity>(&self, value: T) -> Identity {
        self.registry.entities_mut::<T>().create(value)
    }

    /// Shared borrow of another processor. Panics if undeclared.
    pub fn processor<P: Processor>(&self) -> Ref<'a, P> {
        self.registry.processor::<P>()
    }

    /// Mutable borrow of another processor. Panics if undeclared.
    pub fn processor_mut<P: Processor>(&self) -> RefMut<'a, P> {
        self.registry.processor_mut::<P>()
    }

    /// Shared borrow of a renderer. Panics if undeclared.
    pub fn renderer<R: Renderer>(&self) -> Ref<'a, R> {
        self.registry.renderer::<R>()
    }

    /// Mutable borrow of a renderer. Panics if undeclared.
    pub fn renderer_mut<R: Renderer>(&self) -> RefMut<'a, R> {
        self.registry.renderer_mut::<R>()
    }

    /// The application's thread pool, for custom range-partitioned work.
    pub fn pool(&self) -> &ThreadPool {
        self.pool
    }

    /// Apply `f` to every live entity of type `T` in parallel.
    ///
    /// The container's dense storage is range-partitioned across the pool's
    /// workers; entities already flagged for removal are skipped. Blocks
    /// until every range has finished. The container stays exclusively
    /// borrowed for the whole call, so no structural mutation can race the
    /// workers.
    pub fn par_each_mut<T, F>(&self, f: F) -> Result<(), WorkerFailure>
    where
        T: Entity + Send,
        F: Fn(&mut T) + Sync,
    {
        self.par_each_mut_enumerate::<T, _>(|_, entity| f(entity))
    }

    /// Like [`par_each_mut`](UpdateContext::par_each_mut), also passing each
    /// entity's dense row index.
    ///
    /// Row indices are only meaningful until the next sweep.
    pub fn par_each_mut_enumerate<T, F>(&self, f: F) -> Result<(), WorkerFailure>
    where
        T: Entity + Send,
        F: Fn(usize, &mut T) + Sync,
    {
        let mut entities = self.registry.entities_mut::<T>();
        let raw = entities.raw_slice();
        let result = self.pool.dispatch(raw.len(), move |start, end| {
            // SAFETY: dispatch ranges are pairwise disjoint, and `entities`
            // holds the container exclusively borrowed until dispatch
            // returns, so no other access overlaps these rows.
            let chunk = unsafe { raw.range_mut(start, end) };
            for (offset, entity) in chunk.iter_mut().enumerate() {
                if !entity.removal_requested() {
                    f(start + offset, entity);
                }
            }
        });
        drop(entities);
        result
    }
}

// ── Render-phase view ────────────────────────────────────────────────────

/// What a renderer sees during its render pass: read-only registry lookups
/// and the frame submission API.
///
/// There is deliberately no mutable container access here — entity state is
/// frozen between the sweep and the end of the render phase.
pub struct RenderPass<'a> {
    registry: &'a Registry,
    frame: &'a mut RenderFrame,
}

impl<'a> RenderPass<'a> {
    pub(crate) fn new(registry: &'a Registry, frame: &'a mut RenderFrame) -> Self {
        Self { registry, frame }
    }

    /// Shared borrow of the container for `T`. Panics if `T` is undeclared.
    pub fn entities<T: Entity>(&self) -> Ref<'a, StableContainer<T>> {
        self.registry.entities::<T>()
    }

    /// Shared borrow of a processor. Panics if undeclared.
    pub fn processor<P: Processor>(&self) -> Ref<'a, P> {
        self.registry.processor::<P>()
    }

    /// Shared borrow of another renderer. Panics if undeclared.
    pub fn renderer<R: Renderer>(&self) -> Ref<'a, R> {
        self.registry.renderer::<R>()
    }

    /// Submit a drawable to the default layer.
    pub fn submit(&mut self, drawable: impl Drawable) {
        self.frame.submit(drawable);
    }

    /// Submit a drawable to a named layer.
    pub fn submit_to(&mut self, layer: &str, drawable: impl Drawable) {
        self.frame.submit_to(layer, drawable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mote {
        value: u64,
        remove: bool,
    }

    impl Entity for Mote {
        fn removal_requested(&self) -> bool {
            self.remove
        }
        fn request_removal(&mut self) {
            self.remove = true;
        }
    }

    struct Noop;
    impl System for Noop {}
    impl Processor for Noop {
        fn update(&mut self, _cx: &mut UpdateContext<'_>, _dt: f32) {}
    }

    fn registry_with_motes(count: u64) -> Registry {
        use crate::registry::{ContainerDecl, ProcessorDecl};
        let registry = Registry::build(
            vec![ContainerDecl::of::<Mote>()],
            vec![ProcessorDecl::of(Noop)],
            Vec::new(),
        )
        .unwrap();
        {
            let mut motes = registry.entities_mut::<Mote>();
            for value in 0..count {
                motes.create(Mote {
                    value,
                    remove: false,
                });
            }
        }
        registry
    }

    #[test]
    fn par_each_mut_touches_every_live_entity() {
        let registry = registry_with_motes(500);
        let pool = ThreadPool::new(4);
        let cx = UpdateContext::new(&registry, &pool);
        cx.par_each_mut::<Mote, _>(|mote| mote.value += 1000).unwrap();

        let motes = registry.entities::<Mote>();
        assert!(motes.iter().all(|m| m.value >= 1000));
    }

    #[test]
    fn par_each_mut_skips_flagged_entities() {
        let registry = registry_with_motes(100);
        let pool = ThreadPool::new(4);
        registry
            .entities_mut::<Mote>()
            .for_each(|m| {
                if m.value % 2 == 0 {
                    m.request_removal();
                }
            });

        let cx = UpdateContext::new(&registry, &pool);
        cx.par_each_mut::<Mote, _>(|mote| mote.value = 7777).unwrap();

        let motes = registry.entities::<Mote>();
        for m in motes.iter() {
            if m.remove {
                assert_ne!(m.value, 7777, "flagged entities must be skipped");
            } else {
                assert_eq!(m.value, 7777);
            }
        }
    }

    #[test]
    fn par_each_mut_enumerate_passes_row_indices() {
        let registry = registry_with_motes(64);
        let pool = ThreadPool::new(3);
        let cx = UpdateContext::new(&registry, &pool);
        cx.par_each_mut_enumerate::<Mote, _>(|row, mote| {
            assert_eq!(mote.value, row as u64);
        })
        .unwrap();
    }

    #[test]
    fn par_each_mut_on_empty_container_is_a_noop() {
        let registry = registry_with_motes(0);
        let pool = ThreadPool::new(2);
        let cx = UpdateContext::new(&registry, &pool);
        cx.par_each_mut::<Mote, _>(|_| panic!("must not be called"))
            .unwrap();
    }

    #[test]
    fn worker_panic_surfaces_as_failure() {
        let registry = registry_with_motes(10);
        let pool = ThreadPool::new(2);
        let cx = UpdateContext::new(&registry, &pool);
        let err = cx
            .par_each_mut::<Mote, _>(|mote| {
                if mote.value == 3 {
                    panic!("bad mote");
                }
            })
            .unwrap_err();
        assert!(!err.panics.is_empty());
    }
}
