//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │      GET /{image_id}/info.json, /{image_id}/{x,y,w,h}/...       │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │  envelope   │  │        routes           │  │
//! │  │ (requests)  │  │ (headers)   │  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod envelope;
pub mod handlers;
pub mod routes;
pub mod viewer;

pub use envelope::{status_for, ResponseFormatter, DEFAULT_FRAME_ANCESTORS};
pub use handlers::{
    health_handler, info_handler, label_handler, properties_handler, thumbnail_handler,
    tile_handler, viewer_handler, AppState, ErrorResponse, HealthResponse, DEFAULT_CACHE_MAX_AGE,
};
pub use routes::{create_router, RouterConfig};
