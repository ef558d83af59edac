mod health;
mod status;

pub use health::{evaluate, health_router, Health};
pub use status::status_router;
