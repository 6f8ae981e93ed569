//! Simulation core: the owning world, its arenas and the event loop.

pub(crate) mod arena;
mod events;
mod world;

pub use events::EventHandle;
pub use world::World;
