//! Delegated credential signing
//!
//! A Cattle-auth reference names a stored credential and a scheme. The
//! [`SignerRegistry`] picks the signer for that scheme, which fetches the
//! secret from a [`metaproxy_core::CredentialStore`] and writes the
//! authentication headers onto the outbound request.

pub mod arbitrary;
pub mod awsv4;
pub mod basic;
pub mod bearer;
pub mod signer;

pub use arbitrary::ArbitrarySigner;
pub use awsv4::AwsV4Signer;
pub use basic::BasicSigner;
pub use bearer::BearerSigner;
pub use signer::{Signer, SignerRegistry};
