use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use toml;

pub const DEFAULT_FILENAME: &str = "config.toml";
pub const DEFAULT_OSDD_URL: &str = "https://eocat.esa.int/eo-catalogue/opensearch/description.xml";
pub const DEFAULT_IDP_HOST: &str = "eoiam-idp.eo.esa.int";

pub const TEMPLATE: &str = r#"[Local_file_system]
data_directory = ''

[OADS_credentials]
username = 'your_username'
password = """your_password"""
# Comment out all collections you do not have access rights to
collections = [
    'EarthCAREAuxiliary',     # EarthCARE Auxiliary Data for Cal/Val Users
    'EarthCAREL2Validated',   # EarthCARE ESA L2 Products
    'EarthCAREL2InstChecked', # EarthCARE ESA L2 Products for Cal/Val Users
    'EarthCAREL2Products',    # EarthCARE ESA L2 Products for the Commissioning Team
    'JAXAL2Validated',        # EarthCARE JAXA L2 Products
    'JAXAL2InstChecked',      # EarthCARE JAXA L2 Products for Cal/Val Users
    'JAXAL2Products',         # EarthCARE JAXA L2 Products for the Commissioning Team
    'EarthCAREL0L1Products',  # EarthCARE L0 and L1 Products for the Commissioning Team
    'EarthCAREL1Validated',   # EarthCARE L1 Products
    'EarthCAREL1InstChecked', # EarthCARE L1 Products for Cal/Val Users
    'EarthCAREOrbitData',     # EarthCARE Orbit Data
]
"#;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(rename = "Local_file_system", default)]
    pub local: LocalFileSystem,
    #[serde(rename = "OADS_credentials")]
    pub credentials: Credentials,
    #[serde(rename = "Catalogue", default)]
    pub catalogue: Catalogue,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct LocalFileSystem {
    #[serde(default)]
    pub data_directory: String,
}

#[derive(Deserialize, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub collections: Vec<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("collections", &self.collections)
            .finish()
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct Catalogue {
    #[serde(default = "default_osdd_url")]
    pub osdd_url: String,
    #[serde(default = "default_idp_host")]
    pub idp_host: String,
}

impl Default for Catalogue {
    fn default() -> Self {
        Self {
            osdd_url: default_osdd_url(),
            idp_host: default_idp_host(),
        }
    }
}

fn default_osdd_url() -> String {
    DEFAULT_OSDD_URL.to_string()
}

fn default_idp_host() -> String {
    DEFAULT_IDP_HOST.to_string()
}

impl Config {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Config(format!(
                "no config file found at {}. Create one with the following content:\n{TEMPLATE}",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// The configured data directory, if one is set.
    pub fn data_directory(self: &Self) -> Option<PathBuf> {
        let dir = self.local.data_directory.trim();
        if dir.is_empty() {
            return None;
        }
        Some(PathBuf::from(dir))
    }
}

/// `config.toml` next to the executable, falling back to the working directory.
pub fn default_path() -> PathBuf {
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_FILENAME)));
    match beside_exe {
        Some(path) if path.exists() => path,
        _ => PathBuf::from(DEFAULT_FILENAME),
    }
}

/// Picks the data directory: explicit argument, then config, then the
/// working directory. The directory must already exist.
pub fn resolve_data_directory(explicit: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    let dir = explicit
        .or_else(|| config.data_directory())
        .unwrap_or_else(|| PathBuf::from("."));
    if !dir.is_dir() {
        return Err(Error::Config(format!(
            "given data folder does not exist: '{}'",
            dir.display()
        )));
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_parses() {
        let config = Config::from_toml(TEMPLATE).unwrap();
        assert_eq!(config.credentials.username, "your_username");
        assert_eq!(config.credentials.collections.len(), 11);
        assert_eq!(config.data_directory(), None);
        assert_eq!(config.catalogue.idp_host, DEFAULT_IDP_HOST);
    }

    #[test]
    fn test_debug_hides_password() {
        let config = Config::from_toml(TEMPLATE).unwrap();
        assert!(!format!("{config:?}").contains("your_password"));
    }

    #[test]
    fn test_read_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_FILENAME);
        let content = TEMPLATE.replace(
            "data_directory = ''",
            &format!("data_directory = '{}'", dir.path().display()),
        );
        fs::write(&path, content).unwrap();

        let config = Config::read(&path).unwrap();
        assert_eq!(config.data_directory().as_deref(), Some(dir.path()));
        assert_eq!(resolve_data_directory(None, &config).unwrap(), dir.path());
    }

    #[test]
    fn test_missing_config_is_fatal() {
        let err = Config::read("/nonexistent/config.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_data_directory() {
        let config = Config::from_toml(TEMPLATE).unwrap();
        let err = resolve_data_directory(Some(PathBuf::from("/nonexistent/data")), &config);
        assert!(matches!(err, Err(Error::Config(_))));
    }
}
