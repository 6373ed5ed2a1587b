//! Serde integration tests

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use varconf::{
    ConfigError, ConfigurationParser, ParserConfig, SerdeError, from_configuration, from_path,
    from_str, from_str_with_config,
};

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum Mode {
    Development,
    Production,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Server {
    host: String,
    port: u16,
    mode: Mode,
    workers: Option<u32>,
    #[serde(rename = "allowed.hosts")]
    allowed_hosts: Vec<String>,
    #[serde(default)]
    tls: bool,
}

#[derive(Debug, Deserialize, PartialEq)]
struct AppConfig {
    server: Server,
    labels: BTreeMap<String, String>,
}

const APP: &str = r#"
[server]
host = 0.0.0.0
port = 8443
mode = production
workers = 4
allowed.hosts = example.com "intranet host" ${host}

[labels]
team = payments
tier = ${server:mode}
"#;

#[test]
fn test_full_document() {
    let config: AppConfig = from_str(APP).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8443);
    assert_eq!(config.server.mode, Mode::Production);
    assert_eq!(config.server.workers, Some(4));
    assert_eq!(
        config.server.allowed_hosts,
        vec!["example.com", "intranet host", "0.0.0.0"]
    );
    assert!(!config.server.tls);
    assert_eq!(config.labels["tier"], "production");
}

#[test]
fn test_serialize_to_json() {
    let config = ConfigurationParser::new().parse_str(APP).unwrap();
    let json = serde_json::to_value(&config).unwrap();
    assert_eq!(json["server"]["port"], "8443");
    assert_eq!(json["labels"]["team"], "payments");
    assert!(json.get("env").is_none());

    let sections: Vec<&String> = json.as_object().unwrap().keys().collect();
    assert_eq!(sections.len(), 2);
}

#[test]
fn test_enum_mismatch() {
    let text = APP.replace("mode = production", "mode = staging");
    let err = from_str::<AppConfig>(&text).unwrap_err();
    assert!(matches!(err, ConfigError::Serde(SerdeError::Custom(_))), "{err:?}");
    assert!(err.to_string().contains("staging"));
}

#[test]
fn test_parse_errors_pass_through() {
    assert!(matches!(
        from_str::<AppConfig>("[server\n"),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_windows_syntax_through_config() {
    let values: HashMap<String, HashMap<String, String>> = from_str_with_config(
        "[s]\nroot = C:\\\\app\ndata = %root%\\\\data\n",
        ParserConfig::new().with_syntax(varconf::SubstitutionSyntax::WindowsCmd),
    )
    .unwrap();
    assert_eq!(values["s"]["data"], "C:\\app\\data");
}

#[test]
fn test_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.cfg");
    std::fs::write(&path, APP).unwrap();

    let config: AppConfig = from_path(&path).unwrap();
    assert_eq!(config.server.port, 8443);

    let parsed = ConfigurationParser::new().parse_path(&path).unwrap();
    let again: AppConfig = from_configuration(&parsed).unwrap();
    assert_eq!(again, config);
}
