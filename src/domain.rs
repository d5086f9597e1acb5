mod container;
pub mod traits;

pub use container::{
    CONTAINER_PREFIX, Container, ContainerStatus, DisplayStatus, Event, EventKind, NewUser, User,
    VolumeKind, extended_expiry,
};
pub use traits::{ContainerRuntime, ContainerSpec};
