pub mod db;
pub mod notifications;

pub use db::DbAdapter;
pub use notifications::DbNotificationAdapter;
