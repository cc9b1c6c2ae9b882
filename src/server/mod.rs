//! Server core: subscriber registry and the broadcast loop

pub mod broadcast;
pub mod registry;

pub use broadcast::{BroadcastConfig, Broadcaster, CycleReport};
pub use registry::{
    ClientRegistry, RegistryStats, SendOutcome, SubscriberId, ViewMode, FRAME_QUEUE_DEPTH,
};
