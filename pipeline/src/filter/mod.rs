pub mod enhance;
pub mod extra;
pub mod rectify;
pub mod traits;
pub mod viewport;

pub use enhance::EnhanceFilter;
pub use extra::{AdaptiveThresholdFilter, InvertFilter, SharpenFilter};
pub use rectify::{order_corners, rectify, Point};
pub use traits::ImageFilter;
pub use viewport::ViewportState;
