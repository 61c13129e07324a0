// HTTP routes
pub mod groups;
pub mod health;
pub mod join_requests;
pub mod messages;
pub mod presence;
pub mod stream;

pub use groups::*;
pub use health::*;
pub use join_requests::*;
pub use messages::*;
pub use presence::*;
pub use stream::*;
