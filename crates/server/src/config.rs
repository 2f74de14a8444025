use config::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub webhook: WebhookSettings,
    pub graph: GraphSettings,
}

#[derive(Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: String,
}

#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
}

#[derive(Deserialize, Clone)]
pub struct WebhookSettings {
    // 平台握手用的验证口令
    pub verify_token: String,
    // 配了就强制校验 X-Hub-Signature-256，不配跳过
    #[serde(default)]
    pub app_secret: Option<String>,
}

#[derive(Deserialize, Clone)]
pub struct GraphSettings {
    pub base_url: String,
    // 每次出站发送前的强制间隔（毫秒）
    pub pacing_ms: u64,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());
        let env_map = collect_env_vars();

        let s = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.cors_origins", "*")?
            .set_default("database.url", "sqlite://data/dmflow.db")?
            .set_default("webhook.verify_token", "change_me_please")?
            .set_default("graph.base_url", dispatch::GraphConfig::default().base_url)?
            .set_default("graph.pacing_ms", 1500)?
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::File::with_name(&format!("config.{}", run_mode)).required(false))
            .add_source(config::File::from_str(
                &serde_json::to_string(&env_map)
                    .expect("Environment variables should serialize to JSON"),
                config::FileFormat::Json,
            ))
            .build()?;

        s.try_deserialize()
    }
}

fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("DMFLOW_"))
        .map(|(k, v)| {
            let new_key = k
                .trim_start_matches("DMFLOW_")
                .replace("__", ".")
                .to_lowercase();
            (new_key, v)
        })
        .collect()
}
