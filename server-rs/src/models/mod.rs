pub mod club;
pub mod plan;
pub mod request;
pub mod submission;
pub mod user;

pub use club::*;
pub use plan::*;
pub use request::*;
pub use submission::*;
pub use user::*;
