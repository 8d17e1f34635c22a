use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Identity file {path} is missing locally but key pair '{key_name}' already exists remotely.")]
    IdentityFileConflict { path: String, key_name: String },
    #[error("Cloud call failed during {context}: {message}")]
    Cloud {
        context: &'static str,
        message: String,
    },
    #[error("Agent AMI build failed: {message}")]
    AmiBuild { message: String },
    #[error("No availability zone is available in region {region}.")]
    NoAvailabilityZone { region: String },
    #[error("Cluster setup failed for {}: {}", failures.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>().join(", "), failures.iter().map(|(_, err)| err.clone()).collect::<Vec<_>>().join("; "))]
    Setup { failures: Vec<(String, String)> },
    #[error("Load agent {identifier} has no backing host.")]
    MissingHost { identifier: String },
    #[error("Data center '{title}' has no unassigned machine left.")]
    NoFreeMachine { title: String },
    #[error("No base AMI is known for region {region}.")]
    UnknownRegion { region: String },
}
