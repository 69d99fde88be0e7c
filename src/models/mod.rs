pub mod enums;
pub mod health_report;
pub mod recommendation;
pub mod user;

pub use health_report::*;
pub use recommendation::*;
pub use user::*;
