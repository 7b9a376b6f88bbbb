//! The `Transport` trait boundary and the `StepSession` phased contract
//! built on top of it. Concrete transports (a live LLM SDK, a bare
//! CLI process, ...) are external collaborators; this crate defines only
//! the interface they attach to, plus the `StubTransport` used to exercise
//! it without one.

pub mod session;
pub mod stub;
pub mod transport;

pub use session::StepSession;
pub use stub::StubTransport;
pub use transport::{Transport, TokenCounts, TransportCapabilities, WorkOutput};
