//! `capabilities` crate — the `CapabilityInvoker` seam and the transports behind it.
//!
//! The engine never talks to a provider directly. Every step goes through
//! [`CapabilityInvoker::invoke`], which may be backed by in-process handlers
//! ([`CapabilityRegistry`]), a remote provider ([`HttpInvoker`]) or a test
//! double ([`mock::MockInvoker`]).

pub mod error;
pub mod traits;
pub mod registry;
pub mod http;
pub mod mock;

pub use error::CapabilityError;
pub use traits::{CapabilityInvoker, CapabilityRequest};
pub use registry::{Capability, CapabilityRegistry, EchoCapability};
pub use http::HttpInvoker;
