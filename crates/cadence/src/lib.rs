//! # Cadence — per-frame simulation/render scheduler
//!
//! A small framework for fixed-population, fixed-system simulations: typed
//! entity containers with stable identities, a type-indexed registry wiring
//! processors and renderers together, a deterministic update → sweep → render
//! tick, and a blocking parallel-for thread pool for data-parallel updates.
//!
//! Start with `use cadence::prelude::*`, declare a scene through
//! [`SceneBuilder`](scene::SceneBuilder), and drive it with an
//! [`App`](app::App).

pub mod app;
pub mod container;
pub mod entity;
pub mod error;
pub mod events;
pub mod pool;
pub mod prelude;
pub mod registry;
pub mod render;
pub mod scene;
pub mod system;
pub mod time;
