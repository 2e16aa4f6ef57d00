use thiserror::Error;

/// Everything that can go wrong while turning a policy file into a usable
/// [`crate::Policy`]. Always a configuration-time failure; nothing here is
/// raised once the server is running.
#[derive(Debug, Error)]
pub enum PolicyLoadError {
    #[error("failed to read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid policy YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("environment variable ${0} referenced in policy is not set")]
    MissingEnvVar(String),

    #[error("invalid CIDR '{cidr}' in network.allowed_cidrs: {source}")]
    InvalidCidr {
        cidr: String,
        #[source]
        source: ipnet::AddrParseError,
    },

    #[error("invalid glob pattern '{pattern}' in filesystem.{field}: {source}")]
    InvalidGlob {
        field: &'static str,
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("invalid policy field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}
