mod container_service;
mod context;
mod expiration;
mod inventory;
mod orchestrator;
mod port_allocator;
mod user_service;
mod volume_service;

pub use container_service::{ContainerService, STOP_TIMEOUT};
pub use context::{Clock, Context, SystemClock};
pub use expiration::{Disposition, ExpirationEngine, ExpiryPrompt, SweepReport};
pub use inventory::{
    ConnectionInfo, ContainerInfo, ContainerView, Inventory, ListFilter, UserSummary,
};
pub use orchestrator::{
    CreateOutcome, CreateRequest, MAX_TTL_HOURS, MIN_TTL_HOURS, Orchestrator, RemoveReport,
    RestoreRequest, validate_display_name,
};
pub use port_allocator::{PORT_SEARCH_SPAN, PortAllocator, PortSelection};
pub use user_service::{IssuedCredentials, UserService, validate_username};
pub use volume_service::{OrphanedVolume, ResolvedVolume, VolumeRequest, VolumeService};
