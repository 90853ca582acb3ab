//! Virtual layout core: resolve chains, build virtual copies, and run
//! classification sessions

pub mod bridge;
pub mod factory;
pub mod resolver;
pub mod session;

pub use bridge::{CallbackBridge, PLACEMENT_FAILED};
pub use factory::VirtualObjectFactory;
pub use resolver::ChainResolver;
pub use session::{Classifier, ClassificationSession, SessionReport, SessionState};
