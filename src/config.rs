//! Configuration management for Hashstore Server
//!
//! Built once at startup and handed to the store and the router; nothing
//! reads the environment after that.

use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::store::HashAlgorithm;
use crate::upload::extension_of;

/// Maximum accepted request body: 16 MiB
pub const DEFAULT_MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Image, office-document and plain-text formats
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    "png", "gif", "jpg", "jpeg", "doc", "xls", "mpp", "pdf", "ppt", "tiff", "bmp", "docx", "xlsx",
    "pptx", "ps", "odt", "ods", "odp", "odg", "txt",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Store root directory
    pub root: PathBuf,

    /// Digest used for keys; fixed for the lifetime of a store root
    pub hash_algorithm: HashAlgorithm,

    /// Byte-compare uploads against an existing blob with the same key
    pub verify_duplicates: bool,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_body_size: usize,

    /// Lowercase extensions without the leading dot
    pub allowed_extensions: BTreeSet<String>,
}

impl UploadConfig {
    /// Check a client-supplied file name against the extension whitelist
    pub fn allows(&self, filename: &str) -> bool {
        extension_of(filename)
            .map(|ext| self.allowed_extensions.contains(&ext))
            .unwrap_or(false)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            storage: StorageConfig {
                root: PathBuf::from("store"),
                hash_algorithm: HashAlgorithm::Md5,
                verify_duplicates: false,
            },
            upload: UploadConfig {
                max_body_size: DEFAULT_MAX_BODY_SIZE,
                allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                    .iter()
                    .map(|ext| ext.to_string())
                    .collect(),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build a config from any variable source; unset variables keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var(&lookup, "SERVER_PORT", defaults.server.port)?,
            },
            storage: StorageConfig {
                root: lookup("STORE_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.root),
                hash_algorithm: parse_var(
                    &lookup,
                    "HASH_ALGORITHM",
                    defaults.storage.hash_algorithm,
                )?,
                verify_duplicates: parse_var(
                    &lookup,
                    "VERIFY_DUPLICATES",
                    defaults.storage.verify_duplicates,
                )?,
            },
            upload: UploadConfig {
                max_body_size: parse_var(
                    &lookup,
                    "MAX_CONTENT_LENGTH",
                    defaults.upload.max_body_size,
                )?,
                allowed_extensions: match lookup("ALLOWED_EXTENSIONS") {
                    Some(raw) => parse_extensions(&raw)?,
                    None => defaults.upload.allowed_extensions,
                },
            },
        })
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: ToString,
{
    match lookup(var) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn parse_extensions(raw: &str) -> Result<BTreeSet<String>, ConfigError> {
    let extensions: BTreeSet<String> = raw
        .split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();

    if extensions.is_empty() {
        return Err(ConfigError::Invalid {
            var: "ALLOWED_EXTENSIONS",
            value: raw.to_string(),
            reason: "no extensions listed".to_string(),
        });
    }

    Ok(extensions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.storage.root, PathBuf::from("store"));
        assert_eq!(config.storage.hash_algorithm, HashAlgorithm::Md5);
        assert!(!config.storage.verify_duplicates);
        assert_eq!(config.upload.max_body_size, 16 * 1024 * 1024);
        assert_eq!(config.upload.allowed_extensions.len(), 20);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("SERVER_PORT", "8080"),
            ("STORE_ROOT", "/var/lib/hashstore"),
            ("HASH_ALGORITHM", "sha256"),
            ("VERIFY_DUPLICATES", "true"),
            ("MAX_CONTENT_LENGTH", "1024"),
            ("ALLOWED_EXTENSIONS", " .PNG, txt ,,"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.root, PathBuf::from("/var/lib/hashstore"));
        assert_eq!(config.storage.hash_algorithm, HashAlgorithm::Sha256);
        assert!(config.storage.verify_duplicates);
        assert_eq!(config.upload.max_body_size, 1024);
        assert_eq!(
            config.upload.allowed_extensions.into_iter().collect::<Vec<_>>(),
            vec!["png".to_string(), "txt".to_string()]
        );
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup_from(&[("SERVER_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "SERVER_PORT", .. }));

        let err = Config::from_lookup(lookup_from(&[("HASH_ALGORITHM", "crc32")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "HASH_ALGORITHM", .. }));

        let err = Config::from_lookup(lookup_from(&[("ALLOWED_EXTENSIONS", " , ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "ALLOWED_EXTENSIONS", .. }));
    }

    #[test]
    fn test_invalid_value_rejects_whole_config() {
        // Valid settings alongside a bad one must not come back as defaults
        let result = Config::from_lookup(lookup_from(&[
            ("STORE_ROOT", "/var/lib/hashstore"),
            ("HASH_ALGORITHM", "sha1"),
        ]));
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { var: "HASH_ALGORITHM", ref value, .. } if value == "sha1"
        ));
        assert!(err.to_string().contains("HASH_ALGORITHM"));
    }

    #[test]
    fn test_upload_allows() {
        let upload = Config::default().upload;
        assert!(upload.allows("test.txt"));
        assert!(upload.allows("Report.DOCX"));
        assert!(!upload.allows("test.error"));
        assert!(!upload.allows("README"));
        assert!(!upload.allows(".txt"));
    }
}
