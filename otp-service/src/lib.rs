//! OTP / Trip-Verification Service
//!
//! Generates, encrypts, dispatches (SMS + WhatsApp), and verifies one-time
//! codes for login and trip start/end, with a provider-verification
//! fallback path.

pub mod envelope;
pub mod error;
pub mod provider;
pub mod service;
pub mod templates;

pub use envelope::*;
pub use error::*;
pub use provider::*;
pub use service::*;
pub use templates::*;
