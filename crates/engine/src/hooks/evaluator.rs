//! Hook evaluation
//!
//! Blocks are rendered as templates in an environment that carries the
//! [`Capabilities`] functions. The context holds every current property plus the
//! bindings of the node being processed:
//!
//! | name         | value                                            |
//! |--------------|--------------------------------------------------|
//! | `node`       | path of the node relative to the module root     |
//! | `kind`       | `module` or `file`                               |
//! | `source`     | absolute source path                             |
//! | `target`     | absolute target path                             |
//! | `target_dir` | target directory (the target itself for modules) |
//! | `module_dir` | source directory of the owning module            |
//! | `sync_root`  | root of the target tree                          |
//! | `env`        | environment name                                 |
//!
//! Node bindings shadow properties of the same name.

use super::capabilities::Capabilities;
use super::result::HookResult;
use crate::node::{ModuleNode, NodeKind};
use crate::properties::{self, SharedProperties};
use settle_config::Environment;
use settle_core::path::AbsPath;
use settle_core::{Error, Result};
use settle_template::TemplateEngine;
use std::path::PathBuf;
use std::sync::Arc;

/// Per-node values exposed to hook blocks
#[derive(Debug, Clone)]
pub struct NodeBindings {
    pub node: String,
    pub kind: NodeKind,
    pub source: PathBuf,
    pub target: PathBuf,
    pub target_dir: PathBuf,
    pub module_dir: PathBuf,
}

pub struct HookEvaluator {
    engine: TemplateEngine,
    properties: SharedProperties,
    environment: Environment,
    sync_root: AbsPath,
}

impl HookEvaluator {
    pub fn new(
        capabilities: &Arc<Capabilities>,
        properties: SharedProperties,
        environment: Environment,
        sync_root: AbsPath,
    ) -> Self {
        let mut engine = TemplateEngine::new();
        Capabilities::register(capabilities, engine.env_mut());
        Self {
            engine,
            properties,
            environment,
            sync_root,
        }
    }

    fn context(&self, bindings: &NodeBindings) -> Result<serde_json::Value> {
        let mut context = properties::lock(&self.properties)?.to_context();

        let path = |p: &PathBuf| serde_json::Value::String(p.to_string_lossy().into_owned());
        context.insert("node".into(), bindings.node.clone().into());
        context.insert("kind".into(), bindings.kind.as_str().into());
        context.insert("source".into(), path(&bindings.source));
        context.insert("target".into(), path(&bindings.target));
        context.insert("target_dir".into(), path(&bindings.target_dir));
        context.insert("module_dir".into(), path(&bindings.module_dir));
        context.insert(
            "sync_root".into(),
            path(&self.sync_root.as_path().to_path_buf()),
        );
        context.insert("env".into(), self.environment.as_str().into());

        Ok(serde_json::Value::Object(context))
    }

    fn render(&self, node: &ModuleNode, block: &str, body: &str, bindings: &NodeBindings) -> Result<String> {
        let hook_path = node
            .hook()
            .map(|h| h.path().display().to_string())
            .unwrap_or_default();
        // the property lock is released before rendering; capabilities take it again
        let context = self.context(bindings)?;

        self.engine
            .render_named_str(&format!("{hook_path}:{block}"), body, &context)
            .map_err(|e| Error::HookExecution(format!("{} {block} block of {}: {e}", node.kind(), node.rel())))
    }

    /// Evaluate the pre block of `node`
    ///
    /// No hook, no pre block or empty output all mean [`HookResult::Continue`].
    ///
    /// # Errors
    ///
    /// Returns `Error::HookExecution` if the block fails to render and
    /// `Error::HookValidation` if its result keyword is unknown or not permitted
    /// for the node kind.
    #[tracing::instrument(skip(self, node, bindings), fields(node = %node.rel()))]
    pub fn evaluate_pre(&self, node: &ModuleNode, bindings: &NodeBindings) -> Result<HookResult> {
        let Some(hook) = node.hook() else {
            return Ok(HookResult::Continue);
        };
        let Some(body) = hook.pre() else {
            return Ok(HookResult::Continue);
        };

        let output = self.render(node, "pre", body, bindings)?;
        let Some(keyword) = output.lines().map(str::trim).rfind(|l| !l.is_empty()) else {
            tracing::debug!("Pre block produced no result, continuing");
            return Ok(HookResult::Continue);
        };

        let result = HookResult::parse(keyword).ok_or_else(|| {
            Error::hook_validation(
                hook.path(),
                format!("pre block of {} returned unknown result '{keyword}'", node.rel()),
            )
        })?;

        let kind = node.kind().hook_kind();
        if !kind.permits(result) {
            return Err(Error::hook_validation(
                hook.path(),
                format!(
                    "{result} is not permitted for {} hooks (node {})",
                    kind.name(),
                    node.rel()
                ),
            ));
        }

        tracing::debug!(%result, "Pre block evaluated");
        Ok(result)
    }

    /// Evaluate the post block of `node`, discarding its output
    ///
    /// # Errors
    ///
    /// Returns `Error::HookExecution` if the block fails.
    #[tracing::instrument(skip(self, node, bindings), fields(node = %node.rel()))]
    pub fn evaluate_post(&self, node: &ModuleNode, bindings: &NodeBindings) -> Result<()> {
        let Some(body) = node.hook().and_then(|h| h.post()) else {
            return Ok(());
        };

        let output = self.render(node, "post", body, bindings)?;
        if !output.trim().is_empty() {
            tracing::debug!(output = %output.trim(), "Post block output");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::command::RecordingCommand;
    use crate::hooks::HookDefinition;
    use crate::properties::PropertyStore;
    use settle_config::DependencyMap;
    use settle_core::PropertyValue;
    use settle_core::path::RelPath;

    fn evaluator(properties: &SharedProperties) -> HookEvaluator {
        let sync_root = AbsPath::new("/srv/app".into()).unwrap();
        let caps = Arc::new(Capabilities::new(
            Arc::new(RecordingCommand::new()),
            properties.clone(),
            DependencyMap::new(),
            Environment::Staging,
            sync_root.clone(),
        ));
        HookEvaluator::new(&caps, properties.clone(), Environment::Staging, sync_root)
    }

    fn node(kind: NodeKind, pre: Option<&str>, post: Option<&str>) -> ModuleNode {
        let hook = HookDefinition::new(
            "/mod/etc/Module.hook",
            kind,
            pre.map(str::to_string),
            post.map(str::to_string),
        );
        ModuleNode::new(
            RelPath::from_key("etc").unwrap(),
            kind,
            AbsPath::new("/mod/etc".into()).unwrap(),
            RelPath::from_key("etc").unwrap(),
            false,
            Some(hook),
        )
    }

    fn bindings() -> NodeBindings {
        NodeBindings {
            node: "etc".to_string(),
            kind: NodeKind::Module,
            source: "/mod/etc".into(),
            target: "/srv/app/etc".into(),
            target_dir: "/srv/app/etc".into(),
            module_dir: "/mod/etc".into(),
        }
    }

    #[test]
    fn test_abort_when_property_differs() {
        let pre = r#"{% if var != "xyz" %}ABORT{% endif %}"#;
        let props = PropertyStore::from_bindings([("var", PropertyValue::from("var errada"))]).into_shared();
        let eval = evaluator(&props);
        assert_eq!(
            eval.evaluate_pre(&node(NodeKind::Module, Some(pre), None), &bindings()).unwrap(),
            HookResult::Abort
        );

        properties::lock(&props).unwrap().set_permanent("var", "xyz");
        assert_eq!(
            eval.evaluate_pre(&node(NodeKind::Module, Some(pre), None), &bindings()).unwrap(),
            HookResult::Continue
        );
    }

    #[test]
    fn test_missing_blocks_continue() {
        let props = PropertyStore::new().into_shared();
        let eval = evaluator(&props);
        assert_eq!(
            eval.evaluate_pre(&node(NodeKind::File, None, Some("x")), &bindings()).unwrap(),
            HookResult::Continue
        );
        assert_eq!(
            eval.evaluate_pre(&node(NodeKind::File, Some("  \n"), None), &bindings()).unwrap(),
            HookResult::Continue
        );
        eval.evaluate_post(&node(NodeKind::File, Some("ABORT"), None), &bindings())
            .unwrap();
    }

    #[test]
    fn test_last_line_is_result() {
        let props = PropertyStore::new().into_shared();
        let eval = evaluator(&props);
        let pre = "checking {{ node }} in {{ env }}\nabort\n";
        assert_eq!(
            eval.evaluate_pre(&node(NodeKind::File, Some(pre), None), &bindings()).unwrap(),
            HookResult::Abort
        );
    }

    #[test]
    fn test_unknown_result_is_validation_error() {
        let props = PropertyStore::new().into_shared();
        let eval = evaluator(&props);
        let err = eval
            .evaluate_pre(&node(NodeKind::Module, Some("SKIP_ALL"), None), &bindings())
            .unwrap_err();
        assert!(matches!(err, Error::HookValidation { .. }));
    }

    #[test]
    fn test_render_failure_is_execution_error() {
        let props = PropertyStore::new().into_shared();
        let eval = evaluator(&props);
        let err = eval
            .evaluate_pre(&node(NodeKind::Module, Some("{{ undefined_thing }}"), None), &bindings())
            .unwrap_err();
        assert!(matches!(err, Error::HookExecution(_)));
        assert!(err.to_string().contains("etc"));
    }

    #[test]
    fn test_bindings_shadow_properties() {
        let props = PropertyStore::from_bindings([("target", PropertyValue::from("shadowed"))]).into_shared();
        let eval = evaluator(&props);
        let pre = r#"{% if target == "/srv/app/etc" and sync_root == "/srv/app" %}CONTINUE{% else %}ABORT{% endif %}"#;
        assert_eq!(
            eval.evaluate_pre(&node(NodeKind::Module, Some(pre), None), &bindings()).unwrap(),
            HookResult::Continue
        );
    }

    #[test]
    fn test_post_sets_properties() {
        let props = PropertyStore::new().into_shared();
        let eval = evaluator(&props);
        eval.evaluate_post(
            &node(NodeKind::File, None, Some("{{ set_permanent('done', kind) }}")),
            &bindings(),
        )
        .unwrap();
        assert_eq!(
            properties::lock(&props).unwrap().get("done"),
            Some(&PropertyValue::from("module"))
        );
    }
}
