pub mod events;
pub mod loadpoint_state;
pub mod rate;
pub mod session;
pub mod site_state;

pub use events::*;
pub use loadpoint_state::*;
pub use rate::*;
pub use session::*;
pub use site_state::*;
