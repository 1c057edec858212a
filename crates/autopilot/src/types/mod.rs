pub mod engine;
pub mod order;
pub mod scan;
pub mod signal;

pub use engine::*;
pub use order::*;
pub use scan::*;
pub use signal::*;
