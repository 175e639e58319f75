use crate::config::deployment::Deployment;
use crate::utils::error::{ProvisionError, Result};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

impl Deployment {
    /// 從 TOML 檔案載入部署設定
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProvisionError::config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ProvisionError::ConfigError { message } => {
                ProvisionError::config(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    /// 從 TOML 字串解析，缺少的欄位使用預設值
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = substitute_env_vars(content);

        toml::from_str(&processed_content)
            .map_err(|e| ProvisionError::config(format!("TOML parsing error: {}", e)))
    }
}

/// 替換環境變數 (例如 ${LOCATION})，未設定的變數保持原樣
fn substitute_env_vars(content: &str) -> String {
    static VAR: OnceLock<Regex> = OnceLock::new();
    let re = VAR.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static regex"));

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    })
    .into_owned()
}
