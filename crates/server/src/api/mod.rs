pub mod devices;
pub mod handlers;
pub mod routes;
pub mod tasks;
pub mod ws;

pub use routes::create_router;
