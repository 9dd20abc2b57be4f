//! End-to-end reconciliation runs against temporary module and target trees

#![allow(clippy::unwrap_used, clippy::panic)]

use settle_config::{Configuration, Environment, StaticClassifier};
use settle_core::PropertyValue;
use settle_core::path::AbsPath;
use settle_engine::{
    NodeOutcome, RecordingCommand, Reconciler, RedbPersistentState, RunReport, STATE_DB_NAME,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

struct Workspace {
    temp: TempDir,
    state: RedbPersistentState,
}

impl Workspace {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("module")).unwrap();
        let state = RedbPersistentState::new(temp.path().join("state").join(STATE_DB_NAME)).unwrap();
        Self { temp, state }
    }

    fn module(&self) -> PathBuf {
        self.temp.path().join("module")
    }

    fn target(&self) -> PathBuf {
        self.temp.path().join("target")
    }

    fn source(&self, rel: &str, content: &str) -> &Self {
        let path = self.module().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        self
    }

    fn remove_source(&self, rel: &str) {
        let path = self.module().join(rel);
        if path.is_dir() {
            fs::remove_dir_all(path).unwrap();
        } else {
            fs::remove_file(path).unwrap();
        }
    }

    fn config(&self) -> Configuration {
        Configuration::new(
            AbsPath::new(self.module()).unwrap(),
            AbsPath::new(self.target()).unwrap(),
        )
        .with_backup_dir(Some(AbsPath::new(self.temp.path().join("backups")).unwrap()))
        .with_classifier(Arc::new(StaticClassifier(Environment::Testing)))
    }

    fn apply(&self, config: &Configuration) -> RunReport {
        Reconciler::new(config, Arc::new(RecordingCommand::new()))
            .with_state(&self.state)
            .execute()
            .unwrap()
    }

    fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.target().join(rel)).unwrap()
    }

    fn exists(&self, rel: &str) -> bool {
        self.target().join(rel).exists()
    }
}

#[test]
fn test_sweep_deletes_only_previously_managed_paths() {
    let ws = Workspace::new();
    ws.source("dir1/f1.txt", "one")
        .source("dir2/dir21/f21.txt", "twenty-one")
        .source("f.txt", "f")
        .source("keep.txt", "keep");
    let config = ws.config();
    ws.apply(&config);

    // never managed by this module
    fs::create_dir_all(ws.target().join("dir3")).unwrap();
    fs::write(ws.target().join("dir3/f3.txt"), "mine").unwrap();
    let outside = ws.temp.path().join("outside.txt");
    fs::write(&outside, "outside").unwrap();

    ws.remove_source("dir1/f1.txt");
    ws.remove_source("dir2");
    ws.remove_source("f.txt");
    let report = ws.apply(&config);

    assert!(!ws.exists("dir1/f1.txt"));
    assert!(ws.exists("dir1"));
    assert!(!ws.exists("dir2/dir21/f21.txt"));
    assert!(!ws.exists("dir2"));
    assert!(!ws.exists("f.txt"));
    assert!(!ws.exists("ff.txt"));
    assert_eq!(ws.read("dir3/f3.txt"), "mine");
    assert_eq!(ws.read("keep.txt"), "keep");
    assert!(outside.exists());

    let mut deleted = report.deleted.clone();
    deleted.sort();
    assert_eq!(
        deleted,
        vec!["dir1/f1.txt", "dir2", "dir2/dir21", "dir2/dir21/f21.txt", "f.txt"]
    );
    // everything deleted was backed up first
    assert_eq!(report.backups.len(), 5);
    for record in &report.backups {
        assert!(record.backup.exists(), "{} missing", record.backup.display());
    }
}

#[test]
fn test_templates_render_with_properties() {
    let ws = Workspace::new();
    ws.source("fav.txt.tmpl", "first={{ favlang }}\nsecond={{ favlang2 }}\n")
        .source(
            "conf/langs.tmpl",
            "{% for lang in [favlang, favlang2] %}- {{ lang | upper }}\n{% endfor %}",
        )
        .source("plain.txt", "{{ favlang }}");
    let config = ws
        .config()
        .with_property("favlang", PropertyValue::from("aaaaaa"))
        .with_property("favlang2", PropertyValue::from("bbbbbb"));
    ws.apply(&config);

    assert_eq!(ws.read("fav.txt"), "first=aaaaaa\nsecond=bbbbbb\n");
    assert_eq!(ws.read("conf/langs"), "- AAAAAA\n- BBBBBB\n");
    // only template sources are rendered
    assert_eq!(ws.read("plain.txt"), "{{ favlang }}");
    assert!(!ws.exists("fav.txt.tmpl"));
}

const GUARD: &str = r#"
# only deploy where var is set correctly
pre {
{% if var != "xyz" %}ABORT{% endif %}
}
"#;

#[test]
fn test_module_abort_skips_subtree() {
    let ws = Workspace::new();
    ws.source("app/Module.hook", GUARD)
        .source("app/f.txt", "f")
        .source("app/dir3/f3.txt", "f3")
        .source("other.txt", "other");
    let config = ws
        .config()
        .with_property("var", PropertyValue::from("var errada"));
    let report = ws.apply(&config);

    assert!(!ws.exists("app"));
    assert!(!ws.exists("app/f.txt"));
    assert!(!ws.exists("app/dir3/f3.txt"));
    assert_eq!(ws.read("other.txt"), "other");
    assert_eq!(report.outcome_of("app"), Some(NodeOutcome::Aborted));
    assert_eq!(report.outcome_of("app/f.txt"), Some(NodeOutcome::SkippedByModule));
    assert_eq!(
        report.outcome_of("app/dir3/f3.txt"),
        Some(NodeOutcome::SkippedByModule)
    );
}

#[test]
fn test_module_abort_keeps_previously_deployed_files() {
    let ws = Workspace::new();
    ws.source("app/Module.hook", GUARD).source("app/f.txt", "f");

    let good = ws.config().with_property("var", PropertyValue::from("xyz"));
    ws.apply(&good);
    assert_eq!(ws.read("app/f.txt"), "f");

    let bad = ws
        .config()
        .with_property("var", PropertyValue::from("var errada"));
    let report = ws.apply(&bad);
    assert!(report.deleted.is_empty());
    assert_eq!(ws.read("app/f.txt"), "f");

    // the protected paths remain managed
    ws.remove_source("app");
    let report = ws.apply(&good);
    assert!(!ws.exists("app"));
    assert!(report.deleted.contains(&"app/f.txt".to_string()));
}

#[test]
fn test_module_post_runs_after_files() {
    let ws = Workspace::new();
    ws.source(
        "Module.hook",
        "post {\n{% if exists('f.txt') and exists('dir3/f3.txt') %}{{ touch(target_dir ~ '/Module.postexecuted') }}{% endif %}\n}\n",
    )
    .source("f.txt", "f")
    .source("dir3/f3.txt", "f3");
    ws.apply(&ws.config());

    assert!(ws.exists("f.txt"));
    assert!(ws.exists("dir3/f3.txt"));
    assert!(ws.exists("Module.postexecuted"));
}

#[cfg(unix)]
#[test]
fn test_file_post_renames_and_changes_mode() {
    use std::os::unix::fs::PermissionsExt;

    let ws = Workspace::new();
    ws.source("f.txt", "f").source(
        "f.txt.hook",
        "post {\n{{ mv(target, target ~ '.postexecuted') }}\n{{ chmod('0600', target ~ '.postexecuted') }}\n}\n",
    );
    fs::set_permissions(ws.module().join("f.txt"), fs::Permissions::from_mode(0o644)).unwrap();
    ws.apply(&ws.config());

    assert!(!ws.exists("f.txt"));
    assert_eq!(ws.read("f.txt.postexecuted"), "f");
    let mode = fs::metadata(ws.target().join("f.txt.postexecuted"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_path_variables_expand() {
    let ws = Workspace::new();
    ws.source("dir@var@/file@var@.txt", "content");
    let config = ws.config().with_property("var", PropertyValue::from("test"));
    let report = ws.apply(&config);

    assert_eq!(ws.read("dirtest/filetest.txt"), "content");
    assert!(!ws.exists("dir@var@"));
    let node = report
        .nodes
        .iter()
        .find(|n| n.node == "dir@var@/file@var@.txt")
        .unwrap();
    assert_eq!(node.target.as_deref(), Some("dirtest/filetest.txt"));
}

#[test]
fn test_second_run_is_idempotent() {
    let ws = Workspace::new();
    ws.source("Module.hook", "pre {\n{{ set_temporary('greeting', 'hello') }}\n}\n")
        .source("etc/app.conf.tmpl", "greeting={{ greeting }}\n")
        .source("etc/static.txt", "static")
        .source("bin/run.sh", "#!/bin/sh\n");

    fs::create_dir_all(ws.target().join("etc")).unwrap();
    fs::write(ws.target().join("etc/static.txt"), "edited by hand").unwrap();

    let config = ws.config();
    let first = ws.apply(&config);
    assert!(first.changed());
    assert_eq!(first.backups.len(), 1);
    assert_eq!(first.outcome_of("etc/static.txt"), Some(NodeOutcome::Updated));
    assert_eq!(ws.read("etc/app.conf"), "greeting=hello\n");

    let second = ws.apply(&config);
    assert!(!second.changed());
    assert!(second.backups.is_empty());
    assert!(second.deleted.is_empty());
    assert_eq!(second.count(NodeOutcome::Unchanged), second.nodes.len());
    assert_eq!(ws.read("etc/static.txt"), "static");
}

#[cfg(unix)]
#[test]
fn test_mode_set_by_post_hook_is_stable_across_runs() {
    use std::os::unix::fs::PermissionsExt;

    let ws = Workspace::new();
    ws.source("secret.txt", "s3cret")
        .source("secret.txt.hook", "post {\n{{ chmod('0600', target) }}\n}\n");
    fs::set_permissions(ws.module().join("secret.txt"), fs::Permissions::from_mode(0o644)).unwrap();

    let config = ws.config();
    let runs: Vec<RunReport> = (0..3).map(|_| ws.apply(&config)).collect();

    let outcomes: Vec<_> = runs.iter().map(|r| r.outcome_of("secret.txt")).collect();
    assert_eq!(
        outcomes,
        vec![
            Some(NodeOutcome::Created),
            Some(NodeOutcome::Unchanged),
            Some(NodeOutcome::Unchanged)
        ]
    );
    assert!(runs.iter().all(|r| r.backups.is_empty()));
    let mode = fs::metadata(ws.target().join("secret.txt"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_environment_reaches_hooks() {
    let ws = Workspace::new();
    ws.source(
        "only-prod.txt.hook",
        "pre {\n{% if not is_production() %}ABORT{% endif %}\n}",
    )
    .source("only-prod.txt", "prod")
    .source("always.txt", "always");
    let report = ws.apply(&ws.config());

    assert_eq!(report.environment, Environment::Testing);
    assert!(!ws.exists("only-prod.txt"));
    assert!(ws.exists("always.txt"));
}
