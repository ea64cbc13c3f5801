mod error;
pub mod handlers;
pub mod middleware;
pub mod providers;
pub mod resources;
pub mod routes;
pub mod storage;

pub use error::{ErrorResponse, task_error_response};
pub use routes::create_router;
