use anyhow::{Context, Result, anyhow};
use dotenvy::dotenv;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs;
use uplift::{StoreCredentials, UploadPolicy};
use url::Url;

pub const KEYRING_SERVICE: &str = "uplift-secret-key";
pub const KEYRING_USER: &str = "S3";

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct ConfigFile {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<Url>,
    pub access_key: Option<String>,
    pub max_file_size: Option<u64>,
    pub allowed_types: Option<Vec<String>>,
    pub expires_in_seconds: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigEnv {
    uplift_bucket: Option<String>,
    uplift_region: Option<String>,
    uplift_endpoint: Option<Url>,
    uplift_access_key: Option<String>,
    uplift_secret_key: Option<String>,
    uplift_max_file_size: Option<u64>,
    uplift_expires_in_seconds: Option<u32>,
}

fn merge_config(base: ConfigFile, override_config: ConfigEnv) -> Result<UploadPolicy> {
    let bucket = override_config
        .uplift_bucket
        .or(base.bucket)
        .ok_or(anyhow!("No bucket configured"))?;

    let region = override_config
        .uplift_region
        .or(base.region)
        .ok_or(anyhow!("No region configured"))?;

    let endpoint = override_config
        .uplift_endpoint
        .or(base.endpoint)
        .ok_or(anyhow!("No endpoint configured"))?;

    let access_key = override_config
        .uplift_access_key
        .or(base.access_key)
        .ok_or(anyhow!("No access key configured"))?;

    let secret_key = if let Some(secret_key) = override_config.uplift_secret_key {
        secret_key
    } else {
        let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
        let secret = entry.get_secret().context(
            "Secret key not specified via environment variable nor present in OS keyring",
        )?;
        String::from_utf8(secret)?
    };

    Ok(UploadPolicy {
        bucket,
        region,
        endpoint: endpoint.to_string().trim_end_matches('/').to_string(),
        credentials: StoreCredentials {
            access_key,
            secret_key,
        },
        max_file_size: override_config.uplift_max_file_size.or(base.max_file_size),
        allowed_types: base.allowed_types,
        expires_in_seconds: override_config
            .uplift_expires_in_seconds
            .or(base.expires_in_seconds),
    })
}

pub fn read_config() -> Result<UploadPolicy> {
    let _ = dotenv();
    let env_config = envy::from_env::<ConfigEnv>().unwrap_or_default();

    let project_dirs = directories::ProjectDirs::from("dev", "uplift", "uplift")
        .ok_or(anyhow!("Unable to determine home directory"))?;
    let config_file = project_dirs.config_dir().join("config.toml");
    let file_config = if let Ok(config) = fs::read_to_string(config_file) {
        toml::from_str(&config)?
    } else {
        ConfigFile::default()
    };

    merge_config(file_config, env_config)
}

pub fn write_config(config: ConfigFile) -> Result<()> {
    let project_dirs = directories::ProjectDirs::from("dev", "uplift", "uplift")
        .ok_or(anyhow!("Unable to determine home directory"))?;
    let config_dir = project_dirs.config_dir();
    fs::create_dir_all(config_dir)?;

    let config_path = config_dir.join("config.toml");
    fs::write(&config_path, toml::to_string_pretty(&config)?)?;
    println!("Configuration written to {}", config_path.display());

    Ok(())
}

pub fn set_secret_key_keyring(secret_key: String) -> Result<()> {
    let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
    entry.set_secret(secret_key.as_bytes())?;
    println!("Secret key stored for use with uplift");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_file_and_endpoint_is_normalized() {
        let base = ConfigFile {
            bucket: Some("file-bucket".to_string()),
            region: Some("us-east-1".to_string()),
            endpoint: Some(Url::parse("http://localhost:9000").unwrap()),
            access_key: Some("file-access".to_string()),
            max_file_size: Some(1000),
            allowed_types: None,
            expires_in_seconds: None,
        };
        let overrides = ConfigEnv {
            uplift_bucket: Some("env-bucket".to_string()),
            uplift_secret_key: Some("env-secret".to_string()),
            ..ConfigEnv::default()
        };

        let policy = merge_config(base, overrides).unwrap();

        assert_eq!(policy.bucket, "env-bucket");
        assert_eq!(policy.endpoint, "http://localhost:9000");
        assert_eq!(policy.credentials.secret_key, "env-secret");
        assert_eq!(policy.max_file_size, Some(1000));
    }
}
