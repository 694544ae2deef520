//! Provider domain module
//!
//! A provider is one remote source of tools. Self-hosted tool servers are
//! described by [`ProviderConfig`]; whether one may be contacted at all is a
//! pure decision made by [`ProviderConfig::eligibility`]:
//!
//! | Condition | Result |
//! |-----------|--------|
//! | no endpoint URL | skipped |
//! | auth required, no context | skipped |
//! | auth required, first context lacks refresh token or client registration | skipped |
//! | auth required, several contexts | first context used, others reported |
//! | no auth required | eligible without credentials |

pub mod entities;

pub use entities::{
    AuthContext, Eligibility, OAuthClientInformation, ProviderConfig, SkipReason, TransportKind,
};
