use crate::error::ConfigError;

use super::types::JmeterConfig;

/// Resolved load-generation runtime: which JMeter to install on agents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JmeterInstall {
    pub version: String,
    pub custom_installer_url: Option<String>,
}

/// Resolves the JMeter source from configuration.
///
/// A custom installer must be a `.tgz`/`.tar.gz` bundle; its version is
/// taken from a `<family>-jmeter-<version>` file name, falling back to the
/// whole stem. A plain version must look like `\d+.\d+[.\d+]` and be at
/// least 2.6.
pub fn resolve_jmeter(config: &JmeterConfig) -> Result<JmeterInstall, ConfigError> {
    if let Some(url) = config.custom_installer_url.as_deref() {
        let stem = installer_stem(url).ok_or_else(|| ConfigError::BadInstallerUrl {
            url: url.to_owned(),
        })?;
        let version = stem
            .split_once("-jmeter-")
            .map(|(_, version)| version.to_owned())
            .unwrap_or_else(|| stem.to_owned());
        return Ok(JmeterInstall {
            version,
            custom_installer_url: Some(url.to_owned()),
        });
    }

    let version = config
        .version
        .as_deref()
        .ok_or(ConfigError::MissingJmeterSource)?;
    let (major, minor) = parse_version(version).ok_or_else(|| ConfigError::BadJmeterVersion {
        version: version.to_owned(),
    })?;
    if (major, minor) < (2, 6) {
        return Err(ConfigError::BadJmeterVersion {
            version: version.to_owned(),
        });
    }
    Ok(JmeterInstall {
        version: version.to_owned(),
        custom_installer_url: None,
    })
}

fn installer_stem(url: &str) -> Option<&str> {
    let file_name = url.rsplit('/').next()?;
    let stem = file_name
        .strip_suffix(".tar.gz")
        .or_else(|| file_name.strip_suffix(".tgz"))?;
    if stem.is_empty() {
        return None;
    }
    Some(stem)
}

fn parse_version(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse::<u32>().ok()?;
    let minor = parts.next()?.parse::<u32>().ok()?;
    match parts.next() {
        Some(patch) => {
            patch.parse::<u32>().ok()?;
        }
        None => {}
    }
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_version(version: &str) -> JmeterConfig {
        JmeterConfig {
            version: Some(version.to_owned()),
            ..JmeterConfig::default()
        }
    }

    #[test]
    fn accepts_supported_versions() {
        for version in ["2.6", "2.13", "3.2.1", "5.6.3"] {
            let install = resolve_jmeter(&with_version(version)).expect(version);
            assert_eq!(install.version, version);
            assert!(install.custom_installer_url.is_none());
        }
    }

    #[test]
    fn rejects_old_or_malformed_versions() {
        for version in ["2.5", "1.0", "5", "5.x", "5.6.3.1", "jmeter"] {
            assert!(
                matches!(
                    resolve_jmeter(&with_version(version)),
                    Err(ConfigError::BadJmeterVersion { .. })
                ),
                "{version} should be rejected"
            );
        }
    }

    #[test]
    fn custom_installer_version_comes_from_file_name() {
        let config = JmeterConfig {
            custom_installer_url: Some(
                "https://mirror.example.com/apache-jmeter-5.6.3.tgz".to_owned(),
            ),
            ..JmeterConfig::default()
        };
        let install = resolve_jmeter(&config).expect("installer");
        assert_eq!(install.version, "5.6.3");

        let config = JmeterConfig {
            custom_installer_url: Some("https://mirror.example.com/bespoke-bundle.tar.gz".to_owned()),
            ..JmeterConfig::default()
        };
        let install = resolve_jmeter(&config).expect("installer");
        assert_eq!(install.version, "bespoke-bundle");
    }

    #[test]
    fn custom_installer_must_be_a_tarball() {
        let config = JmeterConfig {
            custom_installer_url: Some("https://mirror.example.com/jmeter-5.6.zip".to_owned()),
            ..JmeterConfig::default()
        };
        assert!(matches!(
            resolve_jmeter(&config),
            Err(ConfigError::BadInstallerUrl { .. })
        ));
    }

    #[test]
    fn installer_takes_precedence_over_version() {
        let config = JmeterConfig {
            version: Some("5.6".to_owned()),
            custom_installer_url: Some(
                "https://mirror.example.com/acme-jmeter-9.9.tgz".to_owned(),
            ),
            ..JmeterConfig::default()
        };
        let install = resolve_jmeter(&config).expect("installer");
        assert_eq!(install.version, "9.9");
        assert!(install.custom_installer_url.is_some());
    }
}
