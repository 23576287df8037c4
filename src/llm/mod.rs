pub mod client;
pub mod extract;
pub mod prompts;
pub mod retry;
pub mod validation;

pub use client::*;
pub use extract::*;
pub use prompts::*;
pub use retry::*;
pub use validation::*;
