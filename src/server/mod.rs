//! HTTP surface of the bridge: router, launch callback pages, and the
//! server lifecycle.

pub mod callback;
pub mod router;
mod server;

pub use router::{AppState, create_router};
pub use server::Bridge;
