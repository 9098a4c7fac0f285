use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::{AuthType, Config, DestinationKind};
use crate::error::ConfigError;
use crate::secrets::SecretSource;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.pollers.is_empty() {
        return Err(ConfigError::Validation {
            message: "At least one poller must be configured".to_string(),
        });
    }

    let mut destination_names = HashSet::new();
    for destination in &config.destinations {
        if !destination_names.insert(destination.name.as_str()) {
            return Err(ConfigError::DuplicateDestination(destination.name.clone()));
        }

        if let DestinationKind::WebDav(webdav) = &destination.kind {
            if !(webdav.url.starts_with("http://") || webdav.url.starts_with("https://")) {
                return Err(ConfigError::Validation {
                    message: format!(
                        "Destination '{}' has an invalid WebDAV URL",
                        destination.name
                    ),
                });
            }
        }
    }

    for poller in &config.pollers {
        let name = &poller.source_name;

        if poller.source.host.is_empty() {
            return Err(ConfigError::Validation {
                message: format!("Poller '{}': IMAP host cannot be empty", name),
            });
        }
        if poller.source.username.is_empty() {
            return Err(ConfigError::Validation {
                message: format!("Poller '{}': IMAP username cannot be empty", name),
            });
        }
        if poller.source.port == 0 {
            return Err(ConfigError::Validation {
                message: format!("Poller '{}': invalid IMAP port 0", name),
            });
        }
        if !poller.source.use_tls {
            return Err(ConfigError::Validation {
                message: format!(
                    "Poller '{}': TLS is required for secure email connections",
                    name
                ),
            });
        }
        if poller.source.auth.auth_type == AuthType::OAuth2
            && !SecretSource::imap_access_token(&poller.source.auth).is_configured()
        {
            return Err(ConfigError::Validation {
                message: format!("Poller '{}': OAuth2 requires an access token source", name),
            });
        }
        if poller.directories.is_empty() {
            return Err(ConfigError::Validation {
                message: format!("Poller '{}': at least one directory is required", name),
            });
        }
        if poller.poll_interval == 0 {
            return Err(ConfigError::Validation {
                message: format!("Poller '{}': poll interval must be greater than 0", name),
            });
        }
        if poller.poll_interval > 86_400 {
            tracing::warn!(
                "Poller '{}': poll interval {}s is longer than a day, is this intended?",
                name,
                poller.poll_interval
            );
        }
        if !destination_names.contains(poller.destination.as_str()) {
            return Err(ConfigError::UnknownDestination {
                poller: name.clone(),
                destination: poller.destination.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    const VALID: &str = r#"
destinations:
  - name: archive
    type: filesystem
    path: /srv/attachments
  - name: cloud
    type: webdav
    url: https://cloud.example.com/dav
    username: me
    passwordEnvVar: WEBDAV_PASSWORD
pollers:
  - sourceName: work
    source:
      host: imap.example.com
      username: me@example.com
      auth:
        type: password
        passwordEnvVar: IMAP_PASSWORD
    directories: [INBOX, Invoices]
    allowedSenders: ["billing@example.com"]
    destination: cloud
    destinationDirectory: invoices
    pollInterval: 60
"#;

    #[test]
    fn test_load_valid_config() {
        let config = load_config_from_str(VALID).unwrap();
        assert_eq!(config.destinations.len(), 2);
        assert_eq!(config.pollers.len(), 1);

        let poller = &config.pollers[0];
        assert_eq!(poller.source.port, 993);
        assert!(poller.source.use_tls);
        assert_eq!(poller.directories, vec!["INBOX", "Invoices"]);

        assert!(matches!(
            config.destinations[1].kind,
            DestinationKind::WebDav(_)
        ));
    }

    #[test]
    fn test_poller_configs_resolve_destination() {
        let config = load_config_from_str(VALID).unwrap();
        let pollers = config.poller_configs().unwrap();

        assert_eq!(pollers.len(), 1);
        assert_eq!(pollers[0].destination.name, "cloud");
        assert_eq!(pollers[0].destination_directory, "invoices");
        assert_eq!(pollers[0].poll_interval, Duration::from_secs(60));
        assert_eq!(pollers[0].allowed_senders, vec!["billing@example.com"]);
    }

    #[test]
    fn test_defaults_applied() {
        let yaml = r#"
destinations:
  - name: archive
    type: filesystem
    path: /tmp/out
pollers:
  - sourceName: home
    source:
      host: imap.example.com
      username: me
    destination: archive
"#;
        let config = load_config_from_str(yaml).unwrap();
        let poller = &config.pollers[0];
        assert_eq!(poller.directories, vec!["INBOX"]);
        assert_eq!(poller.poll_interval, 300);
        assert!(poller.allowed_senders.is_empty());
        assert_eq!(poller.source.auth.auth_type, AuthType::Password);
    }

    #[test]
    fn test_validation_failures() {
        let cases: &[(&str, &str)] = &[
            ("no pollers", "destinations: []\npollers: []\n"),
            (
                "unknown destination",
                r#"
pollers:
  - sourceName: a
    source: { host: h, username: u }
    destination: missing
"#,
            ),
            (
                "plaintext imap",
                r#"
destinations: [{ name: d, type: filesystem, path: /tmp }]
pollers:
  - sourceName: a
    source: { host: h, username: u, useTls: false }
    destination: d
"#,
            ),
            (
                "zero interval",
                r#"
destinations: [{ name: d, type: filesystem, path: /tmp }]
pollers:
  - sourceName: a
    source: { host: h, username: u }
    destination: d
    pollInterval: 0
"#,
            ),
            (
                "empty directories",
                r#"
destinations: [{ name: d, type: filesystem, path: /tmp }]
pollers:
  - sourceName: a
    source: { host: h, username: u }
    destination: d
    directories: []
"#,
            ),
            (
                "duplicate destination",
                r#"
destinations:
  - { name: d, type: filesystem, path: /tmp }
  - { name: d, type: filesystem, path: /var }
pollers:
  - sourceName: a
    source: { host: h, username: u }
    destination: d
"#,
            ),
            (
                "oauth2 without token",
                r#"
destinations: [{ name: d, type: filesystem, path: /tmp }]
pollers:
  - sourceName: a
    source: { host: h, username: u, auth: { type: oauth2 } }
    destination: d
"#,
            ),
        ];

        for (name, yaml) in cases {
            assert!(
                load_config_from_str(yaml).is_err(),
                "case '{}' should fail validation",
                name
            );
        }
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(VALID.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.pollers[0].source_name, "work");
    }

    #[test]
    fn test_missing_file() {
        let result = load_config("/nonexistent/maildav/config.yml");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
