//! holo-auth - HoloPort onboarding relay
//!
//! This library relays device onboarding events to third-party services:
//! - ZeroTier Central membership (with stale-member cleanup)
//! - Postmark templated email for failed registrations
//! - A device-side client that registers with retry
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  HoloPort                    │
//! │        client::RegistrationClient            │
//! └──────────────────────┬───────────────────────┘
//!                        │ POST /v1/zt_registration
//! ┌──────────────────────▼───────────────────────┐
//! │                 holo-auth api                │
//! │  registration  │  notify  │  health          │
//! └───────┬────────────────────────┬─────────────┘
//!         │ MemberRegistrar        │ PostmarkClient
//! ┌───────▼────────┐       ┌───────▼────────┐
//! │ ZeroTier       │       │ Postmark       │
//! │ Central        │       │                │
//! └────────────────┘       └────────────────┘
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod postmark;
pub mod settings;
pub mod transport;
pub mod zerotier;

pub use api::{ApiServer, ApiServerBuilder, ApiState};
pub use client::{Backoff, RegistrationClient};
pub use config::Config;
pub use error::{Error, Result};
pub use postmark::{Audience, PostmarkClient};
pub use settings::{ChainedSettings, EnvSettings, MemorySettings, Settings};
pub use transport::{HttpTransport, OutboundRequest, OutboundResponse, ReqwestTransport};
pub use zerotier::{
    CleanupPolicy, CleanupReport, MemberRegistrar, Registration, RegistrationRequest,
    ZeroTierClient,
};
