//! Common imports: `use cadence::prelude::*`.

pub use crate::app::{App, AppConfig};
pub use crate::container::StableContainer;
pub use crate::entity::{Entity, Identity};
pub use crate::error::{BuildError, ConfigError, InvalidIdentity, WorkerFailure};
pub use crate::events::{EventContext, EventHub};
pub use crate::pool::ThreadPool;
pub use crate::registry::{Registry, SystemKind, SystemTiming};
pub use crate::render::{DEFAULT_LAYER, Drawable, RenderFrame};
pub use crate::scene::{Scene, SceneBuilder};
pub use crate::system::{
    AsAny, Dependencies, Processor, Renderer, RenderPass, System, UpdateContext,
};
pub use crate::time::Time;
