//! Built-in `system`, `env` and `program` sections

use indexmap::IndexMap;
use url::Url;

/// Format of the `program:now` timestamp
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Every process environment variable whose name and value are valid UTF-8
pub(crate) fn env_variables() -> Vec<(String, String)> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Host and user facts
pub(crate) fn system_variables() -> Vec<(String, String)> {
    let family = if cfg!(windows) { "windows" } else { "unix" };
    let line_separator = if cfg!(windows) { "\r\n" } else { "\n" };
    let path_separator = if cfg!(windows) { ";" } else { ":" };

    let mut vars = vec![
        ("os.name".to_string(), std::env::consts::OS.to_string()),
        ("os.arch".to_string(), std::env::consts::ARCH.to_string()),
        ("os.family".to_string(), family.to_string()),
        (
            "file.separator".to_string(),
            std::path::MAIN_SEPARATOR.to_string(),
        ),
        ("path.separator".to_string(), path_separator.to_string()),
        ("line.separator".to_string(), line_separator.to_string()),
    ];

    if let Ok(dir) = std::env::current_dir() {
        vars.push(("user.dir".to_string(), dir.to_string_lossy().into_owned()));
    }
    if let Some(home) = first_env(&["HOME", "USERPROFILE"]) {
        vars.push(("user.home".to_string(), home));
    }
    if let Some(user) = first_env(&["USER", "USERNAME", "LOGNAME"]) {
        vars.push(("user.name".to_string(), user));
    }
    vars.push((
        "crate.version".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    ));
    vars
}

/// Facts about the running program followed by caller-supplied entries
pub(crate) fn program_variables(
    populate: bool,
    extra: &IndexMap<String, String>,
) -> Vec<(String, String)> {
    let mut vars = Vec::new();

    if populate {
        if let Ok(cwd) = std::env::current_dir() {
            if let Ok(url) = Url::from_directory_path(&cwd) {
                vars.push(("cwd.url".to_string(), url.to_string()));
            }
            vars.push(("cwd".to_string(), cwd.to_string_lossy().into_owned()));
        }
        vars.push((
            "now".to_string(),
            chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
        ));
        vars.push(("pid".to_string(), std::process::id().to_string()));
    }

    for (name, value) in extra {
        vars.retain(|(existing, _)| existing != name);
        vars.push((name.clone(), value.clone()));
    }
    vars
}

fn first_env(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| std::env::var(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(vars: &'a [(String, String)], name: &str) -> Option<&'a str> {
        vars.iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_system_variables() {
        let vars = system_variables();
        assert_eq!(lookup(&vars, "os.name"), Some(std::env::consts::OS));
        assert_eq!(
            lookup(&vars, "crate.version"),
            Some(env!("CARGO_PKG_VERSION"))
        );
        assert!(lookup(&vars, "file.separator").is_some());
    }

    #[test]
    fn test_program_variables() {
        let mut extra = IndexMap::new();
        extra.insert("name".to_string(), "demo".to_string());
        extra.insert("pid".to_string(), "override".to_string());

        let vars = program_variables(true, &extra);
        assert_eq!(lookup(&vars, "name"), Some("demo"));
        assert_eq!(lookup(&vars, "pid"), Some("override"));
        let now = lookup(&vars, "now").unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(now, TIMESTAMP_FORMAT).is_ok());

        let vars = program_variables(false, &extra);
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn test_env_variables() {
        unsafe {
            std::env::set_var("VARCONF_SPECIAL_TEST", "present");
        }
        let vars = env_variables();
        assert_eq!(lookup(&vars, "VARCONF_SPECIAL_TEST"), Some("present"));
    }
}
