pub mod handlers;
pub mod routes;

pub use handlers::PIXEL_GIF;
pub use routes::create_tracker_router;
