//! Reconciliation of a sync root against a module tree
//!
//! One [`Reconciler::execute`] call is one run:
//!
//! 1. classify the host environment (once) and seed the property store
//! 2. scan the module tree
//! 3. walk the nodes in scan order; every node runs
//!    `pre -> action -> post -> drain` and a module keeps its scope open until
//!    its whole subtree is done, so its post block runs last
//! 4. sweep: delete previously managed paths that lost their node
//! 5. store the new managed-path manifest
//!
//! An ABORT from a module's pre block skips its subtree. Nothing under an
//! aborted module or at an aborted file is written or deleted during that run.
//! The first error stops the run; backups taken so far stay on disk.

use crate::backup::BackupManager;
use crate::command::{Command, remove_path};
use crate::hooks::{Capabilities, HookEvaluator, HookResult, NodeBindings};
use crate::node::{ModuleNode, NodeKind};
use crate::properties::{self, PropertyStore, SharedProperties};
use crate::report::{NodeOutcome, NodeReport, RunReport};
use crate::scanner::ModuleTreeScanner;
use crate::state::{ManagedManifest, ManifestStore, PersistentState};
use crate::sync::{mode_of, sync_directory, sync_file};
use chrono::Local;
use settle_config::{Configuration, EnvironmentClassifier, MemoizedClassifier};
use settle_core::path::{AbsPath, RelPath};
use settle_core::{Result, TemplateRenderer};
use settle_template::TemplateEngine;
use std::fs;
use std::sync::Arc;

pub struct Reconciler<'a> {
    config: &'a Configuration,
    command: Arc<dyn Command>,
    state: Option<&'a dyn PersistentState>,
    renderer: Box<dyn TemplateRenderer>,
}

/// A module whose scope is still open
struct OpenModule<'n> {
    node: &'n ModuleNode,
    bindings: NodeBindings,
}

/// Mutable bookkeeping of one run
struct Run<'n> {
    properties: SharedProperties,
    evaluator: HookEvaluator,
    backups: BackupManager,
    open: Vec<OpenModule<'n>>,
    skip: Option<RelPath>,
    protected: Vec<RelPath>,
    applied: ManagedManifest,
    reports: Vec<NodeReport>,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a Configuration, command: Arc<dyn Command>) -> Self {
        Self {
            config,
            command,
            state: None,
            renderer: Box::new(TemplateEngine::new()),
        }
    }

    /// Track managed paths in `state`; without it the sweep has nothing to delete
    #[must_use]
    pub fn with_state(mut self, state: &'a dyn PersistentState) -> Self {
        self.state = Some(state);
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Box<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Run one reconciliation
    ///
    /// # Errors
    ///
    /// Fails on the first scan, hook, template, backup or I/O error.
    #[tracing::instrument(skip(self), fields(
        module = %self.config.module_root(),
        target = %self.config.sync_root(),
    ))]
    pub fn execute(&self) -> Result<RunReport> {
        let started = Local::now();
        let sync_root = self.config.sync_root().clone();

        let classifier = MemoizedClassifier::new(self.config.classifier());
        let environment = classifier.classify()?;
        tracing::info!(%environment, "Reconciling");

        let nodes = ModuleTreeScanner::new(
            self.config.module_root().clone(),
            self.config.template_suffix(),
        )
        .scan()?;

        let previous = match self.state {
            Some(state) => ManifestStore::new(state, sync_root.as_path()).load()?,
            None => ManagedManifest::new(),
        };

        let properties = PropertyStore::from_bindings(self.config.properties().clone()).into_shared();
        let capabilities = Arc::new(Capabilities::new(
            Arc::clone(&self.command),
            properties.clone(),
            self.config.dependencies().clone(),
            environment,
            sync_root.clone(),
        ));
        let backups = match self.config.backup_dir() {
            Some(dir) => BackupManager::new(sync_root.clone(), dir, started),
            None => BackupManager::disabled(sync_root.clone()),
        };

        let mut run = Run {
            evaluator: HookEvaluator::new(
                &capabilities,
                properties.clone(),
                environment,
                sync_root.clone(),
            ),
            properties,
            backups,
            open: Vec::new(),
            skip: None,
            protected: Vec::new(),
            applied: ManagedManifest::new(),
            reports: Vec::with_capacity(nodes.len()),
        };

        for node in &nodes {
            self.visit(&mut run, node, &previous)?;
        }
        while let Some(module) = run.open.pop() {
            finish_module(&mut run, &module)?;
        }

        let deleted = self.sweep(&mut run, &previous)?;

        if let Some(state) = self.state {
            let mut manifest = run.applied.clone();
            for (rel, entry) in previous.paths() {
                if run.protected.iter().any(|p| rel.starts_with(p)) && !manifest.contains(&rel) {
                    manifest.insert(&rel, entry.clone());
                }
            }
            ManifestStore::new(state, sync_root.as_path()).save(&manifest)?;
        }

        let report = RunReport {
            environment,
            nodes: run.reports,
            deleted,
            backups: run.backups.into_records(),
        };
        tracing::info!(
            created = report.count(NodeOutcome::Created),
            updated = report.count(NodeOutcome::Updated),
            unchanged = report.count(NodeOutcome::Unchanged),
            aborted = report.count(NodeOutcome::Aborted),
            deleted = report.deleted.len(),
            "Reconciliation finished"
        );
        Ok(report)
    }

    fn visit<'n>(
        &self,
        run: &mut Run<'n>,
        node: &'n ModuleNode,
        previous: &ManagedManifest,
    ) -> Result<()> {
        // close modules whose subtree ended
        while let Some(top) = run.open.last() {
            if node.rel().starts_with(top.node.rel()) {
                break;
            }
            if let Some(module) = run.open.pop() {
                finish_module(run, &module)?;
            }
        }

        if let Some(skip) = &run.skip {
            if node.rel().starts_with(skip) {
                tracing::debug!(node = %node.rel(), "Skipped by aborted module");
                run.reports.push(NodeReport {
                    node: node.rel().to_key(),
                    kind: node.kind(),
                    target: None,
                    outcome: NodeOutcome::SkippedByModule,
                });
                return Ok(());
            }
            run.skip = None;
        }

        properties::lock(&run.properties)?.begin_scope();

        let target = node.resolve_target(&*properties::lock(&run.properties)?)?;
        let bindings = self.bindings(node, &target);

        if run.evaluator.evaluate_pre(node, &bindings)? == HookResult::Abort {
            tracing::info!(node = %node.rel(), "Aborted by pre hook");
            if node.is_module() {
                run.skip = Some(node.rel().clone());
            }
            run.protected.push(target.clone());
            run.reports.push(NodeReport {
                node: node.rel().to_key(),
                kind: node.kind(),
                target: Some(target.to_key()),
                outcome: NodeOutcome::Aborted,
            });
            properties::lock(&run.properties)?.drain_temporary();
            return Ok(());
        }

        // the pre block may have changed properties used in the target path
        let target = node.resolve_target(&*properties::lock(&run.properties)?)?;
        let bindings = self.bindings(node, &target);
        let dest = self.config.sync_root().join(&target);

        let synced = match node.kind() {
            NodeKind::Module => sync_directory(node, &dest, &target, &mut run.backups)?,
            NodeKind::File => {
                let context =
                    serde_json::Value::Object(properties::lock(&run.properties)?.to_context());
                sync_file(
                    node,
                    &dest,
                    &target,
                    self.renderer.as_ref(),
                    &context,
                    previous.get(&target),
                    &mut run.backups,
                )?
            }
        };

        let outcome = NodeOutcome::from(synced.outcome);
        if outcome == NodeOutcome::Unchanged {
            tracing::debug!(node = %node.rel(), "Unchanged");
        } else {
            tracing::info!(node = %node.rel(), target = %target, "{outcome}");
        }
        run.reports.push(NodeReport {
            node: node.rel().to_key(),
            kind: node.kind(),
            target: Some(target.to_key()),
            outcome,
        });

        let mut entry = synced.entry;
        match node.kind() {
            NodeKind::Module => run.open.push(OpenModule { node, bindings }),
            NodeKind::File => {
                run.evaluator.evaluate_post(node, &bindings)?;
                // a post block that moved the target leaves nothing to record
                entry.deployed_mode = mode_of(dest.as_path()).ok().flatten();
                properties::lock(&run.properties)?.drain_temporary();
            }
        }
        if !target.is_root() {
            run.applied.insert(&target, entry);
        }
        Ok(())
    }

    fn bindings(&self, node: &ModuleNode, target: &RelPath) -> NodeBindings {
        let sync_root = self.config.sync_root();
        let target_abs = sync_root.join(target);
        let (target_dir, module_dir) = match node.kind() {
            NodeKind::Module => (target_abs.clone(), node.source().clone()),
            NodeKind::File => (
                target_abs.parent().unwrap_or_else(|| sync_root.clone()),
                node.source()
                    .parent()
                    .unwrap_or_else(|| self.config.module_root().clone()),
            ),
        };

        NodeBindings {
            node: node.rel().to_key(),
            kind: node.kind(),
            source: node.source().as_path().to_path_buf(),
            target: target_abs.into_path_buf(),
            target_dir: target_dir.into_path_buf(),
            module_dir: module_dir.into_path_buf(),
        }
    }

    /// Delete previously managed paths that have no node in this run
    #[tracing::instrument(skip_all)]
    fn sweep(&self, run: &mut Run<'_>, previous: &ManagedManifest) -> Result<Vec<String>> {
        let sync_root: &AbsPath = self.config.sync_root();

        let mut candidates: Vec<RelPath> = previous
            .paths()
            .map(|(rel, _)| rel)
            .filter(|rel| !run.applied.contains(rel))
            .filter(|rel| !run.protected.iter().any(|p| rel.starts_with(p)))
            // never remove a directory something live still lives in
            .filter(|rel| {
                !run.protected.iter().any(|p| p.starts_with(rel))
                    && !run
                        .applied
                        .paths()
                        .any(|(applied, _)| applied.starts_with(rel))
            })
            .collect();

        candidates.sort_by(|a, b| b.depth().cmp(&a.depth()).then_with(|| a.cmp(b)));

        let mut deleted = Vec::new();
        for rel in candidates {
            let path = sync_root.join(&rel);
            if fs::symlink_metadata(path.as_path()).is_err() {
                continue;
            }
            run.backups.capture(&rel)?;
            remove_path(path.as_path())?;
            tracing::info!(path = %rel, "Deleted");
            deleted.push(rel.to_key());
        }
        Ok(deleted)
    }
}

fn finish_module(run: &mut Run<'_>, module: &OpenModule<'_>) -> Result<()> {
    run.evaluator.evaluate_post(module.node, &module.bindings)?;
    properties::lock(&run.properties)?.drain_temporary();
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::command::RecordingCommand;
    use crate::state::MockPersistentState;
    use settle_core::PropertyValue;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let fx = Self {
                temp: TempDir::new().unwrap(),
            };
            fs::create_dir_all(fx.module()).unwrap();
            fx
        }

        fn module(&self) -> std::path::PathBuf {
            self.temp.path().join("module")
        }

        fn target(&self) -> std::path::PathBuf {
            self.temp.path().join("target")
        }

        fn write(&self, rel: &str, content: &str) {
            let path = self.module().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        fn config(&self) -> Configuration {
            Configuration::new(
                AbsPath::new(self.module()).unwrap(),
                AbsPath::new(self.target()).unwrap(),
            )
        }

        fn exists(&self, rel: &str) -> bool {
            self.target().join(rel).exists()
        }
    }

    fn run(config: &Configuration, state: &MockPersistentState) -> RunReport {
        Reconciler::new(config, Arc::new(RecordingCommand::new()))
            .with_state(state)
            .execute()
            .unwrap()
    }

    #[test]
    fn test_nested_module_temporaries_visible_to_children() {
        let fx = Fixture::new();
        fx.write("etc/Module.hook", "pre {\n{{ set_temporary('who', 'module') }}\n}\npost {\n{{ touch(target_dir ~ '/' ~ get('who')) }}\n}\n");
        fx.write("etc/f.txt.tmpl", "{{ who }}\n");
        fx.write("g.txt.tmpl", "{{ who is defined }}\n");

        let state = MockPersistentState::new();
        run(&fx.config(), &state);

        assert_eq!(fs::read_to_string(fx.target().join("etc/f.txt")).unwrap(), "module\n");
        assert!(fx.exists("etc/module"));
        assert_eq!(fs::read_to_string(fx.target().join("g.txt")).unwrap(), "false\n");
    }

    #[test]
    fn test_file_temporary_does_not_leak_to_siblings() {
        let fx = Fixture::new();
        fx.write("etc/Module.hook", "pre {\n{{ set_temporary('x', 'module') }}\n}\n");
        fx.write("etc/a.txt.tmpl", "{{ x }}\n");
        fx.write("etc/a.txt.tmpl.hook", "pre {\n{{ set_temporary('x', 'from-a') }}\n}\n");
        fx.write("etc/b.txt.tmpl", "{{ x }}\n");

        let state = MockPersistentState::new();
        run(&fx.config(), &state);

        assert_eq!(fs::read_to_string(fx.target().join("etc/a.txt")).unwrap(), "from-a\n");
        assert_eq!(fs::read_to_string(fx.target().join("etc/b.txt")).unwrap(), "module\n");
    }

    #[test]
    fn test_file_abort_skips_only_that_file() {
        let fx = Fixture::new();
        fx.write("a.txt", "a");
        fx.write("a.txt.hook", "pre { ABORT }");
        fx.write("b.txt", "b");

        let state = MockPersistentState::new();
        let report = run(&fx.config(), &state);

        assert!(!fx.exists("a.txt"));
        assert!(fx.exists("b.txt"));
        assert_eq!(report.outcome_of("a.txt"), Some(NodeOutcome::Aborted));
        assert_eq!(report.outcome_of("b.txt"), Some(NodeOutcome::Created));
    }

    #[test]
    fn test_aborted_file_is_not_swept() {
        let fx = Fixture::new();
        fx.write("a.txt", "a");
        let state = MockPersistentState::new();
        run(&fx.config(), &state);
        assert!(fx.exists("a.txt"));

        fx.write("a.txt.hook", "pre { ABORT }");
        let report = run(&fx.config(), &state);
        assert!(fx.exists("a.txt"));
        assert!(report.deleted.is_empty());

        // still managed: removing the source later deletes the target
        fs::remove_file(fx.module().join("a.txt.hook")).unwrap();
        fs::remove_file(fx.module().join("a.txt")).unwrap();
        let report = run(&fx.config(), &state);
        assert_eq!(report.deleted, vec!["a.txt"]);
        assert!(!fx.exists("a.txt"));
    }

    #[test]
    fn test_hook_validation_error_stops_run() {
        let fx = Fixture::new();
        fx.write("Module.hook", "pre { RETRY }");
        fx.write("a.txt", "a");

        let config = fx.config();
        let err = Reconciler::new(&config, Arc::new(RecordingCommand::new()))
            .execute()
            .unwrap_err();
        assert!(matches!(err, settle_core::Error::HookValidation { .. }));
        assert!(!fx.exists("a.txt"));
    }

    #[test]
    fn test_scan_error_before_any_mutation() {
        let fx = Fixture::new();
        fx.write("a.txt", "a");
        fx.write("z/ghost.hook", "pre { }");

        let config = fx.config();
        let err = Reconciler::new(&config, Arc::new(RecordingCommand::new()))
            .execute()
            .unwrap_err();
        assert!(matches!(err, settle_core::Error::Scan { .. }));
        assert!(!fx.target().exists());
    }

    #[test]
    fn test_without_state_nothing_is_deleted() {
        let fx = Fixture::new();
        fx.write("a.txt", "a");
        fs::create_dir_all(fx.target()).unwrap();
        fs::write(fx.target().join("stray.txt"), "x").unwrap();

        let config = fx.config();
        let report = Reconciler::new(&config, Arc::new(RecordingCommand::new()))
            .execute()
            .unwrap();
        assert!(report.deleted.is_empty());
        assert!(fx.exists("stray.txt"));
    }

    #[test]
    fn test_pre_hook_can_set_path_variable() {
        let fx = Fixture::new();
        fx.write("conf@suffix@.txt", "x");
        fx.write("conf@suffix@.txt.hook", "pre {\n{{ set_temporary('suffix', '-prod') }}\n}");

        let state = MockPersistentState::new();
        let report = run(&fx.config(), &state);
        assert!(fx.exists("conf-prod.txt"));
        assert_eq!(
            report.nodes.last().unwrap().target.as_deref(),
            Some("conf-prod.txt")
        );
    }

    #[test]
    fn test_properties_from_configuration() {
        let fx = Fixture::new();
        fx.write("port.tmpl", "{{ port + 1 }}");
        let config = fx.config().with_property("port", PropertyValue::Integer(8079));
        let state = MockPersistentState::new();
        run(&config, &state);
        assert_eq!(fs::read_to_string(fx.target().join("port")).unwrap(), "8080");
    }
}
