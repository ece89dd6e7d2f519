//! Core library components.
//!
//! Everything here is independent of the command line: the store format,
//! the encryption algorithms and key managers, and the multi-region KMS
//! orchestration.

pub mod algorithm;
pub mod arn;
pub mod cloud;
pub mod constants;
pub mod context;
pub mod domain;
pub mod editor;
pub mod fanout;
pub mod keymanager;
pub mod kms;
pub mod secrets;
pub mod store;
pub mod types;
