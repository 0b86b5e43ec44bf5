mod booking;
mod business;
mod call;
mod interval;
mod service;
mod staff;

pub use booking::*;
pub use business::*;
pub use call::*;
pub use interval::*;
pub use service::*;
pub use staff::*;
