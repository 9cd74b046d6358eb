use std::sync::OnceLock;

use crate::config::StorageConfig;

static VTENSOR_CONFIG: OnceLock<StorageConfig> = OnceLock::new();

pub(crate) fn storage_config() -> &'static StorageConfig {
    VTENSOR_CONFIG.get_or_init(|| match StorageConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring invalid VTENSOR_* configuration");
            StorageConfig::default()
        }
    })
}
