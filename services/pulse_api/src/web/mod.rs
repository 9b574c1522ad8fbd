pub mod connections;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-export the main WebSocket handler to make it easily accessible
// to the binary that builds the web server router.
pub use ws_handler::ws_handler;
pub use rest::{chat_history_handler, mark_read_handler, presence_handler, root_handler, unread_count_handler};
