//! Strongbox - envelope-encrypted secrets stored next to your code.
//!
//! Every secret is encrypted with a fresh data key per key it is stored
//! under, and the data key is wrapped by a key manager (AWS KMS, or `none`
//! for local testing). Keys are provisioned as one KMS key per region behind
//! a shared alias so a secret stays readable when a region is down.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── cli/              # Command-line interface
//! │   ├── get/put/list  # Secret operations
//! │   ├── export        # Decrypt everything as TOML
//! │   ├── kms           # Key provisioning, policies and grants
//! │   └── completions   # Shell completions
//! └── core/             # Core library components
//!     ├── algorithm/    # Data encryption algorithms
//!     ├── keymanager/   # Data key custodians (kms, none)
//!     ├── store/        # Secret store trait and TOML file backend
//!     ├── cloud/        # KMS, CloudFormation and STS service traits
//!     ├── kms/          # Multi-region key orchestration
//!     ├── fanout        # Per-region concurrent tasks
//!     ├── context       # Cancellation and deadlines
//!     └── secrets       # Encrypt/decrypt with regional failover
//! ```
//!
//! # Features
//!
//! - `aws`: talk to AWS KMS, CloudFormation and STS
//! - `test-kms`: in-memory cloud for end-to-end tests of the binary

pub mod cli;
pub mod core;
pub mod error;
