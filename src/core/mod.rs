pub mod dispatch_queue;
pub mod dispatch_service;
pub mod health_service;
pub mod relay_registry;
pub mod selection;
pub mod selection_service;
pub mod task_store;
pub mod transport;

pub use dispatch_queue::{DispatchQueue, InMemoryDispatchQueue};
pub use dispatch_service::{DispatchOutcome, DispatchService};
pub use health_service::{ComponentHealth, HealthService};
pub use relay_registry::{InMemoryRelayRegistry, RelayRegistry};
pub use selection_service::RelaySelectionService;
pub use task_store::{InMemoryTaskStore, TaskStore};
pub use transport::{MailTransport, TransportError};
