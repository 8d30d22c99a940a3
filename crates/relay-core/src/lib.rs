//! Core forwarding engine for the sponsored-call relay.
//!
//! This crate ties authorization to execution: a [`Forwarder`] checks a
//! signed request against its target's domain and replay ledger and then
//! calls the target on the signer's behalf, while the [`RelayEngine`] routes
//! requests to forwarders and handles fee quotes and settlement. The
//! [`RelayBuilder`] assembles an engine from configuration and factories.

pub mod builder;
pub mod engine;
pub mod erc2771;
pub mod targets;

pub use builder::{BuilderError, RelayBuilder, RelayFactories};
pub use engine::{EngineError, Forwarder, RelayEngine};
pub use erc2771::{encode_forwarded_calldata, Erc2771Context};
pub use targets::{ForwardedCall, TargetError, TargetInterface};
