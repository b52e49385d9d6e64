use std::path::Path;

use crate::config::ResolvedConfig;
use crate::duration::format_duration;

pub fn config_output(config_path: &Path, config: &ResolvedConfig) -> serde_json::Value {
    serde_json::json!({
        "config_file": config_path.display().to_string(),
        "store": {
            "project_id": config.store.project_id,
            "database": config.store.database,
            "base_url": config.store.base_url,
            "batch_limit": config.store.batch_limit,
            "request_timeout": format_duration(config.store.request_timeout),
        },
        "credentials": {
            "token_env": config.token_env,
            "token_file": config.token_file.as_ref().map(|p| p.display().to_string()),
        },
        "bucket": config.bucket,
        "attachments": {
            "path_prefix": config.attachments.path_prefix,
            "max_details": config.attachments.max_details,
        },
        "log": {
            "filter": config.log.filter,
            "json": config.log.json,
        }
    })
}
