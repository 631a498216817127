pub mod blacklist;
pub mod endpoint;
pub mod geo;
pub mod report;
pub mod result;
pub mod target;

pub use blacklist::*;
pub use endpoint::*;
pub use geo::*;
pub use report::*;
pub use result::*;
pub use target::*;
