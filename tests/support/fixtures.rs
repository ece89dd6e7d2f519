//! Test fixtures and constants.

/// Regions `kms init` provisions by default.
pub const REGIONS: [&str; 3] = ["us-east-1", "us-west-1", "us-west-2"];

/// Account of the in-memory cloud.
pub const ACCOUNT: &str = "123456789012";

/// Caller ARN reported by the in-memory cloud.
pub const CALLER: &str = "arn:aws:iam::123456789012:user/tester";

/// Standard test secrets used across multiple tests.
pub const STANDARD_SECRETS: &[(&str, &str)] = &[
    ("database_url", "postgres://localhost/mydb"),
    ("api_key", "sk-test-12345"),
    ("jwt_secret", "super-secret-jwt-token"),
];

/// Alias ARN of the default label in `region`.
pub fn alias_arn(region: &str) -> String {
    format!("arn:aws:kms:{}:{}:alias/strongbox-default", region, ACCOUNT)
}
