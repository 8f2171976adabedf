mod dto;
mod handlers;
mod middleware;
mod routes;

pub use routes::{AppState, create_router};
