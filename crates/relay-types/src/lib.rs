//! Common types module for the sponsored-call relay.
//!
//! This module defines the data types shared by every relay component:
//! signed authorization requests, replay tokens, EIP-712 domains, fee
//! payloads and the configuration validation framework used by pluggable
//! implementations.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Authorization request types submitted by callers and relayers.
pub mod authorization;
/// EIP-712 domain descriptor types.
pub mod domain;
/// Fee quote and fee payment types.
pub mod fee;
/// Base trait for self-registering implementations.
pub mod registry;
/// Secret string wrapper for private keys.
pub mod secret_string;
/// Storage namespaces for persisted relay state.
pub mod storage;
/// Utility functions for hashing, encoding and timestamps.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use alloy_primitives::{Address, Bytes, B256, U256};
pub use api::*;
pub use authorization::*;
pub use domain::DomainDescriptor;
pub use fee::*;
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use storage::*;
pub use utils::{current_timestamp, parse_address};
pub use validation::*;
