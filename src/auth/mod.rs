//! Authentication module - device-code sign-in and token lifecycle
//!
//! This module provides:
//! - Token cache persistence ([`TokenCache`], [`TokenStore`])
//! - The identity provider seam and its Microsoft implementation
//! - [`AuthCoordinator`], the single entry point for obtaining a credential

mod cache;
mod coordinator;
mod provider;

pub use cache::{AccessToken, Account, TokenCache, TokenStore};
pub use coordinator::{AuthCoordinator, AuthPrompt, AuthStatus, Credential, SignInState};
pub use provider::{
    DeviceFlow, DevicePoll, IdentityProvider, MicrosoftIdentity, RefreshOutcome, TokenGrant,
};

#[cfg(test)]
pub(crate) use provider::FakeIdentityProvider;
