pub mod domain;
pub mod hub;
pub mod memory;
pub mod messages;
pub mod ports;
pub mod presence;
pub mod reconcile;
pub mod registry;
pub mod router;

pub use domain::{ConversationId, Message, NewMessage, Notification, PresenceStatus, SessionId, UserId};
pub use hub::{ChatHub, HubOptions, PresenceSnapshot};
pub use messages::MessageStore;
pub use ports::{
    MessageRepository, NotificationService, PortError, PortResult, ServerEvent, SessionTransport,
    UserProfileStore,
};
pub use presence::{PresenceCoordinator, PresenceWriter};
pub use reconcile::{Reconciled, StartupReconciler};
pub use registry::{Registration, SessionRegistry};
pub use router::{Delivery, DeliveryRouter, EchoPolicy};
