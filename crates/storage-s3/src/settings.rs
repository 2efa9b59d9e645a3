//! Connection settings for the S3 connector.

/// Static AWS credentials.
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

/// Configuration settings for the S3 connector.
///
/// Anything left `None` falls through to the AWS SDK's default provider chains.
#[derive(Debug, Clone, Default)]
pub struct StorageSettings {
    /// AWS region.
    pub region: Option<String>,
    /// Static credentials; the default credential chain is used when absent.
    pub credentials: Option<AwsCredentials>,
    /// Custom endpoint for S3-compatible stores.
    pub endpoint_url: Option<String>,
    /// Expected bucket owner sent with every request.
    pub expected_bucket_owner: Option<String>,
    /// Use path-style addressing (`endpoint/bucket/key`).
    pub force_path_style: bool,
}

impl StorageSettings {
    /// Build settings from `AWS_REGION`, `AWS_ENDPOINT_URL` and
    /// `AWS_S3_FORCE_PATH_STYLE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name: &str| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    ///
    /// # Arguments
    /// * `lookup` - Returns the value of a variable, or `None` when unset
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v: &String| !v.is_empty());

        Self {
            region: non_empty("AWS_REGION"),
            credentials: None,
            endpoint_url: non_empty("AWS_ENDPOINT_URL"),
            expected_bucket_owner: None,
            force_path_style: non_empty("AWS_S3_FORCE_PATH_STYLE")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }
}
