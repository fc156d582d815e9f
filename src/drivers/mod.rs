//! Driver contracts (§6). Each required trait is a narrow `async_trait`;
//! optional capabilities are discovered at construction time and stored as
//! `Option<Arc<dyn _>>` fields per §9 Capability discovery — never via
//! runtime type assertion (`downcast_ref`/`Any`).

pub mod charger;
pub mod factory;
pub mod meter;
pub mod vehicle;

pub use charger::*;
pub use factory::*;
pub use meter::*;
pub use vehicle::*;
