pub mod handlers;
pub mod quotas;
pub mod routes;
pub mod sessions;
pub mod uploads;

pub use routes::create_router;
