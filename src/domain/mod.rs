pub mod dataset;
pub mod escrow;
pub mod ids;
pub mod offer;
pub mod request;

pub use dataset::*;
pub use escrow::*;
pub use ids::*;
pub use offer::*;
pub use request::*;
