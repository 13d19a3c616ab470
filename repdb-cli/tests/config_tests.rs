use std::io::Write;

use anyhow::Result;

use repdbcli::config::ConfigLoad;

#[test]
fn defaults_apply_without_a_file() {
    let cfg = ConfigLoad::default();
    assert_eq!(cfg.prompt.as_deref(), Some("repdb"));
    assert!(!cfg.is_quiet());
    assert!(!cfg.is_show_stats());
}

#[test]
fn terminal_sessions_get_stats() {
    let mut cfg = ConfigLoad::default();
    cfg.terminal_update();
    assert!(cfg.is_show_stats());
}

#[test]
fn loads_settings_from_yaml() -> Result<()> {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile()?;
    writeln!(file, "version: 1")?;
    writeln!(file, "prompt: sim")?;
    writeln!(file, "show_stats: true")?;

    let cfg = ConfigLoad::new(file.path().to_str().expect("utf-8 temp path"))?;
    assert_eq!(cfg.prompt.as_deref(), Some("sim"));
    assert!(cfg.is_show_stats());
    // unset keys keep their None and the accessors fall back
    assert!(!cfg.is_quiet());
    Ok(())
}

#[test]
fn missing_files_are_an_error() {
    assert!(ConfigLoad::new("no/such/config.yaml").is_err());
}
