//! # kyc-cli — Operator CLI
//!
//! `kycctl` subcommands:
//!
//! - `check-config`: load and print the effective configuration
//! - `status`: read a subject's verification record from the ledger
//! - `signers`: read the authorized signer set and threshold
//! - `compliance`: evaluate a subject against a jurisdiction's rules
//! - `simulate`: run the administrative flow against an in-memory ledger
//!
//! Handlers parse arguments into domain types and delegate to the library
//! crates. Each returns the process exit code.

pub mod check;
pub mod compliance;
pub mod config;
pub mod ledger;
pub mod simulate;
