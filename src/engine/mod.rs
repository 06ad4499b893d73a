pub mod comment;
pub mod events;
pub mod mute_filter;
pub mod panel;
pub mod retained_window;
pub mod scroll_mode;
pub mod session_manager;
pub mod transport;
pub mod validation;
pub mod visibility_buffer;
