//! Project configuration: the declarative input consumed by `setup`.
mod jmeter;
mod loader;
mod types;

use sha2::{Digest, Sha256};

pub use jmeter::{resolve_jmeter, JmeterInstall};
pub use loader::{load_config, load_config_file};
pub use types::{
    AmazonCloudConfig, ClusterConfig, ConfigFile, DataCenterConfig, JmeterConfig, PlanConfig,
    TargetHostConfig,
};

use crate::error::ConfigError;
use crate::model::slugify;

/// Stable fingerprint of all configuration inputs. A project whose stored
/// `serial_version` equals this value is already set up; `None` in the
/// store forces a full setup pass.
pub fn fingerprint(config: &ConfigFile, plan_hashes: &[String]) -> String {
    let mut hasher = Sha256::new();
    if let Ok(serialized) = serde_json::to_vec(config) {
        hasher.update(&serialized);
    }
    let mut hashes = plan_hashes.to_vec();
    hashes.sort();
    for hash in hashes {
        hasher.update(hash.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Structural validation, run before any remote interaction.
pub fn validate(config: &ConfigFile) -> Result<(), ConfigError> {
    let code = slugify(&config.project_code);
    if code.chars().all(|ch| ch == '_') {
        return Err(ConfigError::EmptyProjectCode {
            code: config.project_code.clone(),
        });
    }

    resolve_jmeter(&config.jmeter)?;

    for cluster in &config.clusters {
        match cluster {
            ClusterConfig::AmazonCloud(aws) => {
                let instance_type = aws.instance_type();
                let mut parts = instance_type.splitn(2, '.');
                let family = parts.next().unwrap_or_default();
                let size = parts.next().unwrap_or_default();
                if family.is_empty() || size.is_empty() {
                    return Err(ConfigError::BadInstanceType {
                        instance_type: instance_type.to_owned(),
                    });
                }
                if aws.ssh_port() != crate::model::DEFAULT_SSH_PORT && aws.agent_ami.is_none() {
                    return Err(ConfigError::AgentAmiRequired {
                        cluster: aws.region.clone(),
                        port: aws.ssh_port(),
                    });
                }
            }
            ClusterConfig::DataCenter(dc) => {
                if dc.machines.is_empty() {
                    return Err(ConfigError::NoMachines { title: dc.title() });
                }
            }
        }
    }

    for target in &config.target_hosts {
        let monitor = target.monitor_type();
        if monitor != "nmon" {
            return Err(ConfigError::UnknownMonitorType {
                monitor: monitor.to_owned(),
                host: target.host_name.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> ConfigFile {
        ConfigFile {
            project_code: "demo shop".to_owned(),
            jmeter: JmeterConfig {
                version: Some("5.6".to_owned()),
                ..JmeterConfig::default()
            },
            ..ConfigFile::default()
        }
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let config = minimal_config();
        let first = fingerprint(&config, &["abc".to_owned()]);
        let second = fingerprint(&config, &["abc".to_owned()]);
        assert_eq!(first, second);

        let reordered = fingerprint(&config, &["abc".to_owned(), "def".to_owned()]);
        let swapped = fingerprint(&config, &["def".to_owned(), "abc".to_owned()]);
        assert_eq!(reordered, swapped);
        assert_ne!(first, reordered);

        let mut changed = minimal_config();
        changed.master_slave_mode = Some(false);
        assert_ne!(fingerprint(&changed, &["abc".to_owned()]), first);
    }

    #[test]
    fn non_standard_ssh_port_requires_agent_ami() {
        let mut config = minimal_config();
        config.clusters = vec![ClusterConfig::AmazonCloud(AmazonCloudConfig {
            access_key: "A".to_owned(),
            secret_key: "s".to_owned(),
            ssh_identity: "insecure".to_owned(),
            region: "us-east-1".to_owned(),
            ssh_port: Some(8022),
            ..AmazonCloudConfig::default()
        })];
        let error = validate(&config).unwrap_err();
        assert!(matches!(
            error,
            ConfigError::AgentAmiRequired { port: 8022, .. }
        ));

        if let ClusterConfig::AmazonCloud(aws) = &mut config.clusters[0] {
            aws.agent_ami = Some("ami-0123".to_owned());
        }
        validate(&config).unwrap();
    }

    #[test]
    fn data_center_needs_machines() {
        let mut config = minimal_config();
        config.clusters = vec![ClusterConfig::DataCenter(DataCenterConfig {
            user_name: "root".to_owned(),
            ssh_identity: "insecure".to_owned(),
            machines: vec![],
            ..DataCenterConfig::default()
        })];
        assert!(matches!(
            validate(&config),
            Err(ConfigError::NoMachines { .. })
        ));
    }

    #[test]
    fn instance_type_must_have_family_and_size() {
        let mut config = minimal_config();
        config.clusters = vec![ClusterConfig::AmazonCloud(AmazonCloudConfig {
            access_key: "A".to_owned(),
            secret_key: "s".to_owned(),
            ssh_identity: "insecure".to_owned(),
            region: "us-east-1".to_owned(),
            instance_type: Some("m5large".to_owned()),
            ..AmazonCloudConfig::default()
        })];
        assert!(matches!(
            validate(&config),
            Err(ConfigError::BadInstanceType { .. })
        ));
    }
}
