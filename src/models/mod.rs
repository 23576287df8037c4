pub mod segment;
pub mod sentence;
pub mod task;
pub mod unit;
pub mod window;

pub use segment::*;
pub use sentence::*;
pub use task::*;
pub use unit::*;
pub use window::*;
