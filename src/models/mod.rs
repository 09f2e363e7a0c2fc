pub mod image;
pub mod job;
pub mod plan;
pub mod session;

pub use image::*;
pub use job::*;
pub use plan::*;
pub use session::*;
