mod handlers;
mod server;

pub use server::{ApiServer, ServerState};
