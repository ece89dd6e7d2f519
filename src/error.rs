//! Error types.
//!
//! Each subsystem has its own enum; `Error` wraps them so callers can match on
//! the domain that failed while `?` keeps working everywhere.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    KeyManager(#[from] KeyManagerError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Kms(#[from] KmsError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Editor(#[from] EditorError),

    /// Some partitions of a fan-out failed. Side effects of the successful
    /// ones are kept.
    #[error("{}", describe_failures(.failed))]
    PartialFailure { failed: Vec<RegionFailure> },

    #[error("{0} secret(s) could not be decrypted")]
    ExportIncomplete(usize),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Prompt(#[from] dialoguer::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used for exit hints and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    ConsistencyViolation,
    ExternalService,
    PartialFailure,
    Crypto,
    Io,
    Cancelled,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Store(StoreError::FileNotFound(_) | StoreError::NameNotFound(_)) => {
                ErrorKind::NotFound
            }
            Error::Store(StoreError::InvalidBase64 { .. }) => ErrorKind::Crypto,
            Error::Store(_) | Error::Io(_) | Error::Json(_) | Error::Prompt(_) => ErrorKind::Io,
            Error::Cipher(CipherError::UnknownAlgorithm { .. }) => ErrorKind::Validation,
            Error::Cipher(_) => ErrorKind::Crypto,
            Error::KeyManager(KeyManagerError::UnknownKeyManager { .. }) => ErrorKind::Validation,
            Error::KeyManager(KeyManagerError::InvalidKeyId(_)) => ErrorKind::Validation,
            Error::KeyManager(_) => ErrorKind::Crypto,
            Error::Validation(_) | Error::Editor(_) => ErrorKind::Validation,
            Error::Kms(KmsError::AliasNotFound { .. } | KmsError::NoAliasForKey { .. }) => {
                ErrorKind::NotFound
            }
            Error::Kms(KmsError::RegionsAlreadyProvisioned { .. }) => ErrorKind::Validation,
            Error::Kms(_) => ErrorKind::ConsistencyViolation,
            Error::Cloud(_) => ErrorKind::ExternalService,
            Error::PartialFailure { .. } | Error::ExportIncomplete(_) => ErrorKind::PartialFailure,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// One failed partition of a fan-out.
#[derive(Debug)]
pub struct RegionFailure {
    pub region: String,
    pub error: Box<Error>,
}

impl fmt::Display for RegionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.region, self.error)
    }
}

fn describe_failures(failed: &[RegionFailure]) -> String {
    let regions: Vec<&str> = failed.iter().map(|f| f.region.as_str()).collect();
    let details: Vec<String> = failed.iter().map(|f| f.to_string()).collect();
    format!(
        "failed in {} region(s) [{}]: {}",
        failed.len(),
        regions.join(", "),
        details.join("; ")
    )
}

/// Secret store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("secret not found: {0}")]
    NameNotFound(String),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to serialize store: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("{field} is not valid base64: {source}")]
    InvalidBase64 {
        field: &'static str,
        source: base64::DecodeError,
    },
}

/// Algorithm registry and cipher errors.
#[derive(Error, Debug)]
pub enum CipherError {
    #[error("algorithm already registered: {0}")]
    DuplicateName(String),

    #[error("unknown algorithm: {name} (available: {available})")]
    UnknownAlgorithm { name: String, available: String },

    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}

/// Key custodian errors.
#[derive(Error, Debug)]
pub enum KeyManagerError {
    #[error("key manager already registered: {0}")]
    DuplicateLabel(String),

    #[error("unknown key manager: {label} (available: {available})")]
    UnknownKeyManager { label: String, available: String },

    #[error("key {key_id} refused to unwrap the data key: {reason}")]
    DecryptionDenied { key_id: String, reason: String },

    #[error("data key under {key_id} was not issued for secret '{secret_name}'")]
    ContextMismatch { key_id: String, secret_name: String },

    #[error("cannot determine the region of key '{0}': use a full ARN or set AWS_REGION")]
    InvalidKeyId(String),
}

/// Invalid input or flag combinations.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("specify the secret either as an argument or with --from-file, but not both")]
    ConflictingValue,

    #[error("no store file given: pass --filename or set STRONGBOX_FILENAME")]
    MissingFilename,

    #[error("no key template in {}: run `strongbox kms init` or pass --key-id", .0.display())]
    NoKeyTemplate(PathBuf),

    #[error("invalid label '{0}': only letters, digits, '-' and '_' are allowed")]
    InvalidLabel(String),

    #[error("at least one region is required")]
    EmptyRegions,

    #[error("region {region} is not one of the selected regions ({regions})")]
    UnknownRegion { region: String, regions: String },

    #[error("policy is not valid JSON: {0}")]
    InvalidPolicy(serde_json::Error),

    #[error("invalid ARN: {0}")]
    InvalidArn(String),

    #[error("there must be at least one {0} principal")]
    NoPrincipals(&'static str),

    #[error("grantee principal must not be empty")]
    EmptyGrantee,

    #[error("unknown grant operation: {0}")]
    UnknownGrantOperation(String),

    #[error("'{0}' is reserved for the key template")]
    ReservedName(String),

    #[error("secret '{0}' has no values encrypted under KMS")]
    NoKmsValues(String),

    #[error("secret '{0}' is not valid UTF-8: read it with `get --output` instead")]
    NotUtf8(String),
}

/// Multi-region key orchestration errors.
#[derive(Error, Debug)]
pub enum KmsError {
    #[error("alias {alias} does not exist in {}", regions.join(", "))]
    AliasNotFound { alias: String, regions: Vec<String> },

    #[error("no alias in {region} targets key {key_id}")]
    NoAliasForKey { key_id: String, region: String },

    #[error("stack {stack} does not have an output named {output}")]
    MissingStackOutput { stack: String, output: String },

    #[error(
        "a stack named '{stack}' exists in {region}, but the key alias '{alias}' does not. \
         The key was most likely incompletely deleted: delete the stack or use another label"
    )]
    StackWithoutAlias {
        stack: String,
        alias: String,
        region: String,
    },

    #[error(
        "alias {alias} in {region} points at a disabled key: delete the alias if it is no longer in use"
    )]
    KeyDisabled { alias: String, region: String },

    #[error("key policies differ between {reference} and {divergent}")]
    PolicyMismatch { reference: String, divergent: String },

    #[error("grant {name} already exists in {region} with different parameters")]
    GrantConflict { name: String, region: String },

    #[error(
        "{requested} regions were requested, but {provisioned} already have keys for label '{label}': \
         re-run with --create-missing-keys to provision the rest"
    )]
    RegionsAlreadyProvisioned {
        requested: usize,
        provisioned: usize,
        label: String,
    },
}

/// Failures from the key-management, provisioning or identity services.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("AWS support not compiled. Rebuild with: cargo install strongbox --features aws")]
    NotCompiled,

    #[error("{operation} failed: {message}")]
    Service {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },

    #[error("stack {stack} ended in state {status}")]
    StackFailed { stack: String, status: String },
}

impl CloudError {
    pub fn service(operation: &'static str, err: impl fmt::Display) -> Self {
        Self::Service {
            operation,
            message: err.to_string(),
        }
    }
}

/// Interactive editor errors.
#[derive(Error, Debug)]
pub enum EditorError {
    #[error("no editor configured: set the VISUAL or EDITOR environment variable")]
    NoEditor,

    #[error("no change: the edited document is empty")]
    Empty,

    #[error("no change: the edited document is identical to the original")]
    Unchanged,

    #[error("editor '{0}' not found on PATH")]
    NotFound(String),

    #[error("editor exited with {0}")]
    Failed(std::process::ExitStatus),
}

pub type Result<T> = std::result::Result<T, Error>;
