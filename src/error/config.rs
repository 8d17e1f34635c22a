use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unsupported JMeter version '{version}' (need \\d+.\\d+[.\\d+], >= 2.6).")]
    BadJmeterVersion { version: String },
    #[error("Custom installer URL '{url}' must end in .tgz or .tar.gz.")]
    BadInstallerUrl { url: String },
    #[error("Invalid instance type '{instance_type}' (expected <family>.<size>).")]
    BadInstanceType { instance_type: String },
    #[error("Cluster '{cluster}' uses SSH port {port} but has no agent_ami; a pre-built AMI is required for non-standard ports.")]
    AgentAmiRequired { cluster: String, port: u16 },
    #[error("Data center '{title}' has no machines.")]
    NoMachines { title: String },
    #[error("Project code '{code}' is empty after slugification.")]
    EmptyProjectCode { code: String },
    #[error("Unknown monitor type '{monitor}' for target host '{host}'.")]
    UnknownMonitorType { monitor: String, host: String },
    #[error("Neither jmeter.version nor jmeter.custom_installer_url is set.")]
    MissingJmeterSource,
    #[error("No cloud client is available for Amazon cluster '{cluster}'; link a cloud adapter or use data-center clusters.")]
    CloudUnavailable { cluster: String },
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Unsupported config extension '{extension}'. Use .toml or .json.")]
    UnsupportedExtension { extension: String },
    #[error("Config file must have a .toml or .json extension.")]
    MissingExtension,
}
