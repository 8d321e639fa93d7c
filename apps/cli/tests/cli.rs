use std::error::Error;
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

const SHARED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<application>
  <component name="Editor" wrap="true">
    <option name="tabSize" value="2" />
  </component>
  <component name="Recent">
    <option name="files">
      <list>
        <option value="a.txt" />
      </list>
    </option>
  </component>
</application>
"#;

fn cli() -> Result<Command, Box<dyn Error>> {
    let cmd = Command::cargo_bin("statekeep")?;
    Ok(cmd)
}

fn write_shared(dir: &Path) -> Result<std::path::PathBuf, Box<dyn Error>> {
    let path = dir.join("other.xml");
    fs::write(&path, SHARED)?;
    Ok(path)
}

#[test]
fn list_prints_component_names_in_order() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = write_shared(dir.path())?;

    cli()?
        .arg("list")
        .arg(&path)
        .assert()
        .success()
        .stdout("Editor\nRecent\n");
    Ok(())
}

#[test]
fn show_prints_a_single_block() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = write_shared(dir.path())?;

    cli()?
        .args(["show", "--component", "Editor"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"name="Editor""#))
        .stdout(predicate::str::contains("tabSize"))
        .stdout(predicate::str::contains("Recent").not());
    Ok(())
}

#[test]
fn show_reports_unknown_component() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = write_shared(dir.path())?;

    cli()?
        .args(["show", "--component", "Missing"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("component 'Missing' not found"));
    Ok(())
}

#[test]
fn remove_keeps_sibling_blocks() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = write_shared(dir.path())?;

    cli()?
        .arg("remove")
        .arg(&path)
        .arg("Editor")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 'Editor'"));

    let text = fs::read_to_string(&path)?;
    assert!(!text.contains("Editor"));
    assert!(text.contains(r#"<component name="Recent">"#));
    assert!(text.contains("a.txt"));
    assert!(!dir.path().join("other.xml.tmp").exists());
    Ok(())
}

#[test]
fn removing_the_last_block_deletes_the_file() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("single.xml");
    fs::write(
        &path,
        r#"<project version="4"><component name="Tasks"><option name="count" value="1" /></component></project>"#,
    )?;

    cli()?
        .arg("remove")
        .arg(&path)
        .arg("Tasks")
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted empty"));
    assert!(!path.exists());
    Ok(())
}

#[test]
fn remove_unknown_component_leaves_file_alone() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = write_shared(dir.path())?;

    cli()?
        .arg("remove")
        .arg(&path)
        .arg("Nope")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    assert_eq!(fs::read_to_string(&path)?, SHARED);
    Ok(())
}

#[test]
fn scan_reports_documents_and_flags_malformed_ones() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    write_shared(dir.path())?;
    let nested = dir.path().join(".statekeep");
    fs::create_dir_all(&nested)?;
    fs::write(nested.join("broken.xml"), "<project><component name=\"X\">")?;
    fs::write(nested.join("notes.txt"), "ignored")?;
    fs::write(nested.join("foreign.xml"), "<html><body /></html>")?;

    cli()?
        .arg("scan")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("other.xml: Editor, Recent"))
        .stdout(predicate::str::contains("broken.xml: malformed"))
        .stdout(predicate::str::contains("foreign.xml").not())
        .stdout(predicate::str::contains("Scanned 1 state document(s), 1 malformed"));
    Ok(())
}

#[test]
fn scan_rejects_a_file_argument() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = write_shared(dir.path())?;

    cli()?
        .arg("scan")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a directory"));
    Ok(())
}

#[test]
fn resolve_uses_config_roots() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let config = dir.path().join("statekeep.json");
    fs::write(
        &config,
        r#"{ "paths": { "project_config_dir": "/srv/project/.statekeep" } }"#,
    )?;

    cli()?
        .args(["resolve", "$PROJECT_CONFIG_DIR$/vcs.xml", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("/srv/project/.statekeep"))
        .stdout(predicate::str::contains("vcs.xml"));
    Ok(())
}

#[test]
fn resolve_defaults_to_current_directory() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;

    cli()?
        .current_dir(dir.path())
        .args(["resolve", "$WORKSPACE_FILE$"])
        .assert()
        .success()
        .stdout(predicate::str::contains("workspace.xml"));
    Ok(())
}

#[test]
fn resolve_rejects_unknown_placeholder() -> Result<(), Box<dyn Error>> {
    cli()?
        .args(["resolve", "$HOME$/x.xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid template"));
    Ok(())
}

#[test]
fn resolve_reports_unconfigured_root() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let config = dir.path().join("statekeep.json");
    fs::write(&config, "{}")?;

    cli()?
        .args(["resolve", "$APP_CONFIG$/ui.xml", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no root configured"));
    Ok(())
}
