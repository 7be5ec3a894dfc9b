//! Runtime configuration for AuthBroker
//!
//! The host application loads a read-only [`RuntimeConfig`] describing which
//! identity providers are enabled and their endpoints. The broker core only
//! ever reads this value; it is injected at construction and never consulted
//! through ambient globals.

pub mod types;

pub use types::{
    LoginProvider, OAuth2Config, OAuth2ProviderConfig, OidcConfig, Provider, ProviderDescriptor,
    RuntimeConfig,
};
