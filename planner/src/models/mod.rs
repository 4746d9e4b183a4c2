pub mod candidate;
pub mod schedule;
pub mod site;
pub mod time;

pub use candidate::*;
pub use schedule::*;
pub use site::*;
pub use time::*;
