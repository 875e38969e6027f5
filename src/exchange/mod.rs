//! Interactive exchange core: session store and routing facade.

pub mod facade;
pub mod store;

pub use facade::{AskRequest, Exchange};
pub use store::SessionStore;
