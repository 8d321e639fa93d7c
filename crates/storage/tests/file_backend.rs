use std::error::Error;
use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use statekeep_core::{
    ComponentDescriptor, ComponentRegistry, ComponentScope, LifecycleManager, PathTemplate,
    PersistentComponent, PersistentState, ProjectScheme, ReloadEvent, SaveTrigger, SchemaBuilder,
    StateTree, StorageBackend, StorageError, StorageSpec,
};
use statekeep_storage::{FileBackend, PathRoots, SchemeSetting, StorageConfig};
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Default)]
struct WindowState {
    width: u32,
    maximized: bool,
    recent: Vec<String>,
}

impl PersistentState for WindowState {
    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.field("width", |s| &s.width, |s| &mut s.width).attribute();
        schema.field("maximized", |s| &s.maximized, |s| &mut s.maximized);
        schema.field("recent", |s| &s.recent, |s| &mut s.recent);
    }
}

#[derive(Debug, Default)]
struct Window {
    state: WindowState,
    reloads: usize,
}

impl PersistentComponent for Window {
    type State = WindowState;

    fn state(&self) -> WindowState {
        self.state.clone()
    }

    fn load_state(&mut self, state: WindowState) {
        self.state = state;
    }

    fn on_reloaded(&mut self, _event: &ReloadEvent) {
        self.reloads += 1;
    }
}

fn template(text: &str) -> PathTemplate {
    PathTemplate::parse(text).expect("template")
}

fn manager(backend: FileBackend, location: &str) -> LifecycleManager<FileBackend> {
    let mut registry = ComponentRegistry::new(ComponentScope::Application);
    let descriptor = ComponentDescriptor::<WindowState>::builder("Window")
        .storage(StorageSpec::new(location).expect("spec"))
        .build()
        .expect("descriptor");
    registry
        .register(descriptor, Window::default())
        .expect("register");
    LifecycleManager::new(registry, backend, ProjectScheme::Default)
}

#[test]
fn missing_file_reads_as_nothing() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let backend = FileBackend::new(PathRoots::under(dir.path())).without_watching();
    let location = template("$APP_CONFIG$/window.xml");

    assert!(!backend.exists(&location));
    assert!(backend.read(&location)?.is_none());
    Ok(())
}

#[test]
fn write_replaces_file_and_leaves_no_temporary() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let mut backend = FileBackend::new(PathRoots::under(dir.path())).without_watching();
    let location = template("$APP_CONFIG$/window.xml");

    backend.write(&location, &StateTree::new("application"))?;
    let document = StateTree::new("application")
        .with_child(StateTree::new("component").with_attribute("name", "Window"));
    backend.write(&location, &document)?;

    let path = dir.path().join("options").join("window.xml");
    let text = fs::read_to_string(&path)?;
    assert!(text.starts_with("<?xml"));
    assert!(text.contains(r#"<component name="Window" />"#) || text.contains(r#"<component name="Window"/>"#));
    assert!(!dir.path().join("options").join("window.xml.tmp").exists());
    assert_eq!(backend.read(&location)?, Some(document));
    Ok(())
}

#[test]
fn malformed_file_is_reported() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let backend = FileBackend::new(PathRoots::under(dir.path())).without_watching();
    fs::create_dir_all(dir.path().join("options"))?;
    fs::write(dir.path().join("options").join("window.xml"), "<application><component>")?;

    let result = backend.read(&template("$APP_CONFIG$/window.xml"));
    assert!(matches!(result, Err(StorageError::Malformed { .. })));
    Ok(())
}

#[test]
fn deleting_twice_is_not_an_error() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let mut backend = FileBackend::new(PathRoots::under(dir.path())).without_watching();
    let location = template("$WORKSPACE_FILE$");

    backend.write(&location, &StateTree::new("project"))?;
    assert!(backend.exists(&location));
    backend.delete(&location)?;
    backend.delete(&location)?;
    assert!(!backend.exists(&location));
    Ok(())
}

#[test]
fn unconfigured_root_is_unresolved() {
    let mut backend = FileBackend::new(PathRoots::default()).without_watching();
    let location = template("$APP_CONFIG$/window.xml");
    let result = backend.write(&location, &StateTree::new("application"));
    assert!(matches!(result, Err(StorageError::Unresolved { .. })));
    assert!(!backend.exists(&location));
}

#[test]
fn state_survives_a_restart() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let roots = PathRoots::under(dir.path());

    let mut first = manager(FileBackend::new(roots.clone()).without_watching(), "$APP_CONFIG$/window.xml");
    first.load_all();
    first.component_mut::<Window>("Window").expect("window").state = WindowState {
        width: 800,
        maximized: true,
        recent: vec!["notes.txt".into()],
    };
    first.save(SaveTrigger::Shutdown)?;

    let mut second = manager(FileBackend::new(roots).without_watching(), "$APP_CONFIG$/window.xml");
    let report = second.load_all();
    assert_eq!(report.loaded, vec!["Window".to_string()]);
    let window = second.component::<Window>("Window").expect("window");
    assert_eq!(window.state.width, 800);
    assert!(window.state.maximized);
    assert_eq!(window.state.recent, vec!["notes.txt".to_string()]);
    Ok(())
}

#[test]
fn returning_to_defaults_deletes_the_file() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let mut manager = manager(
        FileBackend::new(PathRoots::under(dir.path())).without_watching(),
        "$APP_CONFIG$/window.xml",
    );
    manager.load_all();
    let path = dir.path().join("options").join("window.xml");

    manager.component_mut::<Window>("Window").expect("window").state.width = 640;
    manager.save(SaveTrigger::Explicit)?;
    assert!(path.exists());

    manager.component_mut::<Window>("Window").expect("window").state = WindowState::default();
    let report = manager.save(SaveTrigger::Explicit)?;
    assert_eq!(report.deleted, vec![template("$APP_CONFIG$/window.xml")]);
    assert!(!path.exists());
    Ok(())
}

#[test]
fn external_edit_is_picked_up_by_the_watcher() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let mut manager = manager(FileBackend::new(PathRoots::under(dir.path())), "$APP_CONFIG$/window.xml");
    manager.load_all();

    // 等待 watcher 啟動。 / Allow watcher to settle.
    thread::sleep(Duration::from_millis(100));
    fs::write(
        dir.path().join("options").join("window.xml"),
        r#"<application><component name="Window" width="1024" /></application>"#,
    )?;

    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        manager.process_external_changes();
        if manager.component::<Window>("Window").expect("window").state.width == 1024 {
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }

    let window = manager.component::<Window>("Window").expect("window");
    assert_eq!(window.state.width, 1024);
    assert!(window.reloads >= 1);
    Ok(())
}

#[test]
fn config_defaults_when_missing_and_round_trips() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("statekeep.json");

    let config = StorageConfig::load(&path)?;
    assert_eq!(config, StorageConfig::default());
    assert!(config.watch);
    assert_eq!(config.temp_suffix, "tmp");

    let mut config = StorageConfig {
        paths: PathRoots::under(dir.path()),
        scheme: SchemeSetting::Directory,
        ..StorageConfig::default()
    };
    config.save(&path)?;
    let reloaded = StorageConfig::load(&path)?;
    assert_eq!(reloaded, config);
    assert_eq!(reloaded.project_scheme(), ProjectScheme::DirectoryBased);

    config.version = 0;
    config.temp_suffix = ".".to_string();
    config.sanitize();
    assert_eq!(config.version, statekeep_storage::CONFIG_VERSION);
    assert_eq!(config.temp_suffix, "tmp");
    Ok(())
}

#[test]
fn partial_config_fills_missing_fields() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("statekeep.json");
    fs::write(&path, r#"{ "paths": { "app_config": "/srv/options" }, "watch": false }"#)?;

    let config = StorageConfig::load(&path)?;
    assert_eq!(config.version, statekeep_storage::CONFIG_VERSION);
    assert!(!config.watch);
    assert_eq!(config.scheme, SchemeSetting::Default);
    assert_eq!(
        config.paths.expand(&template("$APP_CONFIG$/ui.xml"))?,
        std::path::PathBuf::from("/srv/options/ui.xml")
    );
    Ok(())
}

#[test]
fn unparsable_config_is_an_error() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("statekeep.json");
    fs::write(&path, "{ not json")?;
    assert!(matches!(
        StorageConfig::load(&path),
        Err(statekeep_storage::ConfigError::Parse { .. })
    ));
    Ok(())
}

#[test]
fn failed_rename_leaves_no_temporary_and_keeps_old_content() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let mut backend = FileBackend::new(PathRoots::under(dir.path())).without_watching();
    let location = template("$APP_CONFIG$/window.xml");
    // A non-empty directory at the document path makes the final rename fail.
    let blocked = dir.path().join("options").join("window.xml");
    fs::create_dir_all(&blocked)?;
    fs::write(blocked.join("keep.txt"), "original")?;

    let document = StateTree::new("application")
        .with_child(StateTree::new("component").with_attribute("name", "Window"));
    let result = backend.write(&location, &document);

    assert!(matches!(result, Err(StorageError::Io { operation: "write", .. })));
    assert!(!dir.path().join("options").join("window.xml.tmp").exists());
    assert!(blocked.is_dir());
    assert_eq!(fs::read_to_string(blocked.join("keep.txt"))?, "original");
    assert!(!backend.exists(&location));
    Ok(())
}

#[test]
fn failed_save_keeps_the_previous_file() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let mut manager = manager(
        FileBackend::new(PathRoots::under(dir.path())).without_watching(),
        "$APP_CONFIG$/window.xml",
    );
    manager.load_all();
    let path = dir.path().join("options").join("window.xml");

    manager.component_mut::<Window>("Window").expect("window").state.width = 800;
    manager.save(SaveTrigger::Explicit)?;
    let before = fs::read_to_string(&path)?;

    // The temporary cannot be created while a directory holds its name.
    let temporary = dir.path().join("options").join("window.xml.tmp");
    fs::create_dir_all(temporary.join("busy"))?;
    manager.component_mut::<Window>("Window").expect("window").state.width = 1024;
    let err = manager.save(SaveTrigger::Explicit).expect_err("write must fail");

    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures[0].0, template("$APP_CONFIG$/window.xml"));
    assert!(matches!(err.failures[0].1, StorageError::Io { .. }));
    assert_eq!(fs::read_to_string(&path)?, before);
    assert!(temporary.join("busy").is_dir());
    Ok(())
}

#[test]
fn unwritable_document_is_rejected_before_touching_disk() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let mut backend = FileBackend::new(PathRoots::under(dir.path())).without_watching();
    let location = template("$APP_CONFIG$/window.xml");
    backend.write(&location, &StateTree::new("application"))?;
    let path = dir.path().join("options").join("window.xml");
    let before = fs::read_to_string(&path)?;

    let broken = StateTree::new("application").with_child(StateTree::default());
    let result = backend.write(&location, &broken);

    assert!(matches!(result, Err(StorageError::Malformed { .. })));
    assert_eq!(fs::read_to_string(&path)?, before);
    assert!(!dir.path().join("options").join("window.xml.tmp").exists());
    Ok(())
}
