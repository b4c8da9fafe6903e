/// Gateway event handler
pub mod handler;

pub use handler::PollEventHandler;
