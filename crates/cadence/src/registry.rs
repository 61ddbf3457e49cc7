//! # Registry — the type-indexed hub owning all containers and systems
//!
//! One registry per scene. It owns exactly one [`StableContainer`] per
//! declared entity type, one instance per declared processor type, and one
//! per declared renderer type, keyed by `TypeId` — the same type-to-instance
//! map used for resources elsewhere, except that here the table is closed at
//! build time and validated against each system's declared dependencies.
//!
//! ## Why ownership lives here
//!
//! Systems depend on each other bidirectionally (a processor may need a
//! renderer and vice versa), so handing out references during construction
//! cannot work for cycles. Instead the registry exclusively owns everything
//! and systems resolve dependencies through `&Registry` on demand, which is
//! only permitted once the ready phase has run. There are no stored
//! cross-references, so teardown order cannot dangle anything.
//!
//! ## Build protocol
//!
//! 1. **Construction** — containers, then processors, then renderers, each in
//!    declaration order. Duplicate types fail the build.
//! 2. **Validation** — every declared dependency must resolve to an owned
//!    instance; a system naming its own type fails the build. Nothing can go
//!    missing at first use.
//! 3. **Ready** — `on_ready` on every processor, then every renderer, in
//!    declaration order. Systems may resolve dependencies from here on.
//!
//! Interior mutability: systems and containers sit in `RefCell` slots so the
//! tick thread can hand a borrowed system `&Registry` while it runs. The
//! registry is single-threaded by design; parallelism only ever touches raw
//! container storage through the thread pool.

use std::any::{Any, TypeId};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::{HashMap, HashSet};

use crate::container::StableContainer;
use crate::entity::Entity;
use crate::error::BuildError;
use crate::system::{AsAny, Dependencies, Processor, Renderer};

// ── Type-erased container slot ───────────────────────────────────────────

/// Object-safe view of a [`StableContainer`], for uniform sweeping and
/// downcasting.
pub(crate) trait AnyContainer: Any {
    fn sweep_flagged(&mut self) -> usize;
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Entity> AnyContainer for StableContainer<T> {
    fn sweep_flagged(&mut self) -> usize {
        StableContainer::sweep_flagged(self)
    }

    fn len(&self) -> usize {
        StableContainer::len(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct ContainerSlot {
    name: &'static str,
    cell: RefCell<Box<dyn AnyContainer>>,
}

// ── System slots ─────────────────────────────────────────────────────────

/// An owned system plus its scheduling metadata.
pub(crate) struct SystemSlot<S: ?Sized> {
    name: &'static str,
    cell: RefCell<Box<S>>,
    /// Duration of the most recent invocation, written by the scheduler.
    elapsed_us: Cell<u64>,
}

impl<S: ?Sized> SystemSlot<S> {
    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn borrow_mut(&self) -> RefMut<'_, Box<S>> {
        self.cell.borrow_mut()
    }

    pub(crate) fn set_elapsed_us(&self, us: u64) {
        self.elapsed_us.set(us);
    }
}

/// Which scheduling role a system plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemKind {
    Processor,
    Renderer,
}

/// Per-system timing snapshot, for introspection only — the scheduler never
/// consults it.
#[derive(Clone, Debug)]
pub struct SystemTiming {
    pub name: &'static str,
    pub kind: SystemKind,
    /// Duration of the system's most recent invocation, in microseconds.
    pub elapsed_us: u64,
}

// ── Declarations (produced by SceneBuilder) ──────────────────────────────

pub(crate) struct ContainerDecl {
    type_id: TypeId,
    name: &'static str,
    build: Box<dyn FnOnce() -> Box<dyn AnyContainer>>,
}

impl ContainerDecl {
    pub(crate) fn of<T: Entity>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            build: Box::new(|| Box::new(StableContainer::<T>::new())),
        }
    }
}

pub(crate) struct ProcessorDecl {
    type_id: TypeId,
    name: &'static str,
    deps: Dependencies,
    build: Box<dyn FnOnce() -> Box<dyn Processor>>,
}

impl ProcessorDecl {
    pub(crate) fn of<P: Processor>(value: P) -> Self {
        Self {
            type_id: TypeId::of::<P>(),
            name: std::any::type_name::<P>(),
            deps: P::dependencies(),
            build: Box::new(move || Box::new(value)),
        }
    }
}

pub(crate) struct RendererDecl {
    type_id: TypeId,
    name: &'static str,
    deps: Dependencies,
    build: Box<dyn FnOnce() -> Box<dyn Renderer>>,
}

impl RendererDecl {
    pub(crate) fn of<R: Renderer>(value: R) -> Self {
        Self {
            type_id: TypeId::of::<R>(),
            name: std::any::type_name::<R>(),
            deps: R::dependencies(),
            build: Box::new(move || Box::new(value)),
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────────

/// The owning, type-indexed table of all containers and systems of one scene.
pub struct Registry {
    containers: HashMap<TypeId, ContainerSlot>,
    /// Declaration order of containers, for deterministic sweeping/teardown.
    container_order: Vec<TypeId>,
    processors: Vec<SystemSlot<dyn Processor>>,
    processor_index: HashMap<TypeId, usize>,
    renderers: Vec<SystemSlot<dyn Renderer>>,
    renderer_index: HashMap<TypeId, usize>,
}

impl Registry {
    pub(crate) fn build(
        container_decls: Vec<ContainerDecl>,
        processor_decls: Vec<ProcessorDecl>,
        renderer_decls: Vec<RendererDecl>,
    ) -> Result<Self, BuildError> {
        let mut registry = Self {
            containers: HashMap::new(),
            container_order: Vec::new(),
            processors: Vec::new(),
            processor_index: HashMap::new(),
            renderers: Vec::new(),
            renderer_index: HashMap::new(),
        };

        // Phase 1: construction, declaration order. No cross-references exist
        // yet, so nothing constructed here may resolve a dependency.
        let mut system_types: HashSet<TypeId> = HashSet::new();
        let mut declared_deps: Vec<(&'static str, TypeId, Dependencies)> = Vec::new();

        for decl in container_decls {
            if registry.containers.contains_key(&decl.type_id) {
                return Err(BuildError::DuplicateDeclaration { name: decl.name });
            }
            log::debug!("registry: container {}", decl.name);
            registry.containers.insert(
                decl.type_id,
                ContainerSlot {
                    name: decl.name,
                    cell: RefCell::new((decl.build)()),
                },
            );
            registry.container_order.push(decl.type_id);
        }

        for decl in processor_decls {
            if !system_types.insert(decl.type_id) {
                return Err(BuildError::DuplicateDeclaration { name: decl.name });
            }
            log::debug!("registry: processor {}", decl.name);
            declared_deps.push((decl.name, decl.type_id, decl.deps));
            registry
                .processor_index
                .insert(decl.type_id, registry.processors.len());
            registry.processors.push(SystemSlot {
                name: decl.name,
                cell: RefCell::new((decl.build)()),
                elapsed_us: Cell::new(0),
            });
        }

        for decl in renderer_decls {
            if !system_types.insert(decl.type_id) {
                return Err(BuildError::DuplicateDeclaration { name: decl.name });
            }
            log::debug!("registry: renderer {}", decl.name);
            declared_deps.push((decl.name, decl.type_id, decl.deps));
            registry
                .renderer_index
                .insert(decl.type_id, registry.renderers.len());
            registry.renderers.push(SystemSlot {
                name: decl.name,
                cell: RefCell::new((decl.build)()),
                elapsed_us: Cell::new(0),
            });
        }

        // Phase 2: validation. Every declared dependency must already be
        // owned by this registry; failing here means a lookup can never miss
        // at runtime for a declared dependency.
        for (system, type_id, deps) in &declared_deps {
            let (system, type_id) = (*system, *type_id);
            for dep in &deps.entities {
                if !registry.containers.contains_key(&dep.type_id) {
                    return Err(BuildError::MissingDependency {
                        system,
                        missing: dep.name,
                    });
                }
            }
            for dep in &deps.processors {
                if dep.type_id == type_id {
                    return Err(BuildError::SelfDependency { name: system });
                }
                if !registry.processor_index.contains_key(&dep.type_id) {
                    return Err(BuildError::MissingDependency {
                        system,
                        missing: dep.name,
                    });
                }
            }
            for dep in &deps.renderers {
                if dep.type_id == type_id {
                    return Err(BuildError::SelfDependency { name: system });
                }
                if !registry.renderer_index.contains_key(&dep.type_id) {
                    return Err(BuildError::MissingDependency {
                        system,
                        missing: dep.name,
                    });
                }
            }
        }

        // Phase 3: ready. Processors first, then renderers, declaration
        // order. From here systems may resolve their dependencies.
        for slot in &registry.processors {
            slot.cell.borrow_mut().on_ready(&registry);
        }
        for slot in &registry.renderers {
            slot.cell.borrow_mut().on_ready(&registry);
        }

        log::debug!(
            "registry: built {} container(s), {} processor(s), {} renderer(s)",
            registry.container_order.len(),
            registry.processors.len(),
            registry.renderers.len()
        );
        Ok(registry)
    }

    // ── Container access ─────────────────────────────────────────────

    /// Shared borrow of the container for entity type `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` was not declared in this scene. Declared dependencies
    /// are validated at build time, so this only fires for undeclared types.
    pub fn entities<T: Entity>(&self) -> Ref<'_, StableContainer<T>> {
        self.get_entities::<T>().unwrap_or_else(|| {
            panic!(
                "entity container `{}` is not declared in this scene",
                std::any::type_name::<T>()
            )
        })
    }

    /// Mutable borrow of the container for entity type `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` was not declared in this scene.
    pub fn entities_mut<T: Entity>(&self) -> RefMut<'_, StableContainer<T>> {
        self.get_entities_mut::<T>().unwrap_or_else(|| {
            panic!(
                "entity container `{}` is not declared in this scene",
                std::any::type_name::<T>()
            )
        })
    }

    /// Shared borrow of the container for `T`, or `None` if undeclared.
    pub fn get_entities<T: Entity>(&self) -> Option<Ref<'_, StableContainer<T>>> {
        let slot = self.containers.get(&TypeId::of::<T>())?;
        Some(Ref::map(slot.cell.borrow(), |c| {
            // Deref past the Box: the blanket AsAny impl would otherwise
            // wrap the Box itself and the downcast could never match.
            (**c)
                .as_any()
                .downcast_ref::<StableContainer<T>>()
                .expect("container slot holds a different type")
        }))
    }

    /// Mutable borrow of the container for `T`, or `None` if undeclared.
    pub fn get_entities_mut<T: Entity>(&self) -> Option<RefMut<'_, StableContainer<T>>> {
        let slot = self.containers.get(&TypeId::of::<T>())?;
        Some(RefMut::map(slot.cell.borrow_mut(), |c| {
            (**c)
                .as_any_mut()
                .downcast_mut::<StableContainer<T>>()
                .expect("container slot holds a different type")
        }))
    }

    // ── System access ────────────────────────────────────────────────

    /// Shared borrow of the processor of type `P`.
    ///
    /// # Panics
    ///
    /// Panics if `P` was not declared in this scene.
    pub fn processor<P: Processor>(&self) -> Ref<'_, P> {
        self.get_processor::<P>().unwrap_or_else(|| {
            panic!(
                "processor `{}` is not declared in this scene",
                std::any::type_name::<P>()
            )
        })
    }

    /// Shared borrow of the processor of type `P`, or `None` if undeclared.
    pub fn get_processor<P: Processor>(&self) -> Option<Ref<'_, P>> {
        let index = *self.processor_index.get(&TypeId::of::<P>())?;
        Some(Ref::map(self.processors[index].cell.borrow(), |p| {
            (**p)
                .as_any()
                .downcast_ref::<P>()
                .expect("processor slot holds a different type")
        }))
    }

    /// Mutable borrow of the processor of type `P`.
    ///
    /// # Panics
    ///
    /// Panics if `P` was not declared in this scene.
    pub fn processor_mut<P: Processor>(&self) -> RefMut<'_, P> {
        self.get_processor_mut::<P>().unwrap_or_else(|| {
            panic!(
                "processor `{}` is not declared in this scene",
                std::any::type_name::<P>()
            )
        })
    }

    /// Mutable borrow of the processor of type `P`, or `None` if undeclared.
    pub fn get_processor_mut<P: Processor>(&self) -> Option<RefMut<'_, P>> {
        let index = *self.processor_index.get(&TypeId::of::<P>())?;
        Some(RefMut::map(self.processors[index].cell.borrow_mut(), |p| {
            (**p)
                .as_any_mut()
                .downcast_mut::<P>()
                .expect("processor slot holds a different type")
        }))
    }

    /// Shared borrow of the renderer of type `R`.
    ///
    /// # Panics
    ///
    /// Panics if `R` was not declared in this scene.
    pub fn renderer<R: Renderer>(&self) -> Ref<'_, R> {
        self.get_renderer::<R>().unwrap_or_else(|| {
            panic!(
                "renderer `{}` is not declared in this scene",
                std::any::type_name::<R>()
            )
        })
    }

    /// Shared borrow of the renderer of type `R`, or `None` if undeclared.
    pub fn get_renderer<R: Renderer>(&self) -> Option<Ref<'_, R>> {
        let index = *self.renderer_index.get(&TypeId::of::<R>())?;
        Some(Ref::map(self.renderers[index].cell.borrow(), |r| {
            (**r)
                .as_any()
                .downcast_ref::<R>()
                .expect("renderer slot holds a different type")
        }))
    }

    /// Mutable borrow of the renderer of type `R`.
    ///
    /// # Panics
    ///
    /// Panics if `R` was not declared in this scene.
    pub fn renderer_mut<R: Renderer>(&self) -> RefMut<'_, R> {
        self.get_renderer_mut::<R>().unwrap_or_else(|| {
            panic!(
                "renderer `{}` is not declared in this scene",
                std::any::type_name::<R>()
            )
        })
    }

    /// Mutable borrow of the renderer of type `R`, or `None` if undeclared.
    pub fn get_renderer_mut<R: Renderer>(&self) -> Option<RefMut<'_, R>> {
        let index = *self.renderer_index.get(&TypeId::of::<R>())?;
        Some(RefMut::map(self.renderers[index].cell.borrow_mut(), |r| {
            (**r)
                .as_any_mut()
                .downcast_mut::<R>()
                .expect("renderer slot holds a different type")
        }))
    }

    // ── Scheduler plumbing ───────────────────────────────────────────

    pub(crate) fn processor_slots(&self) -> &[SystemSlot<dyn Processor>] {
        &self.processors
    }

    pub(crate) fn renderer_slots(&self) -> &[SystemSlot<dyn Renderer>] {
        &self.renderers
    }

    /// Sweep every container, removing entities flagged for removal.
    /// Returns the total number of entities removed.
    pub(crate) fn sweep_all(&self) -> usize {
        let mut removed = 0;
        for type_id in &self.container_order {
            removed += self.containers[type_id].cell.borrow_mut().sweep_flagged();
        }
        removed
    }

    /// Per-system timing snapshot: processors then renderers, declaration
    /// order. Values are the most recent invocation durations.
    pub fn timings(&self) -> Vec<SystemTiming> {
        let processors = self.processors.iter().map(|s| SystemTiming {
            name: s.name,
            kind: SystemKind::Processor,
            elapsed_us: s.elapsed_us.get(),
        });
        let renderers = self.renderers.iter().map(|s| SystemTiming {
            name: s.name,
            kind: SystemKind::Renderer,
            elapsed_us: s.elapsed_us.get(),
        });
        processors.chain(renderers).collect()
    }

    /// Names of declared containers, declaration order.
    pub fn container_names(&self) -> Vec<&'static str> {
        self.container_order
            .iter()
            .map(|id| self.containers[id].name)
            .collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("containers", &self.container_order.len())
            .field("processors", &self.processors.len())
            .field("renderers", &self.renderers.len())
            .finish()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        // Reverse dependency order: renderers, then processors (each in
        // reverse declaration order), then containers.
        while self.renderers.pop().is_some() {}
        while self.processors.pop().is_some() {}
        for type_id in std::mem::take(&mut self.container_order).into_iter().rev() {
            self.containers.remove(&type_id);
        }
    }
}
