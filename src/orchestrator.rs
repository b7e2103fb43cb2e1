use crate::config::Options;
use crate::context::CancelToken;
use crate::error::MultiError;
use crate::node::Node;
use crate::operator::{Phase, Registry};
use crate::postprocess;
use crate::scheduler;

/// Runs Merge -> Param -> Eval in order, coordinates cycle checking, and
/// applies post-processing (spec.md §4.G). An orchestrator owns its
/// registry and options instance - no process-wide mutable state (spec.md
/// §9 Design Notes: "a clean rebuild puts these on the orchestrator
/// instance").
pub struct Orchestrator {
    registry: Registry,
    options: Options,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(options: Options) -> Result<Self, crate::error::Error> {
        Self::with_registry(options, Registry::with_builtins())
    }

    pub fn with_registry(options: Options, registry: Registry) -> Result<Self, crate::error::Error> {
        options.validate()?;
        Ok(Orchestrator {
            registry,
            options,
            cancel: CancelToken::new(),
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// A handle a caller can use to request cancellation mid-run from
    /// another thread (spec.md §5 "Suspension points").
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Evaluate `tree` in place, returning the finished document or the
    /// aggregate of every error encountered.
    pub fn evaluate(&self, mut tree: Node) -> Result<Node, MultiError> {
        let mut errors = MultiError::new();

        if !self.options.skip_eval {
            let merge_errors = self.run_phase(&mut tree, Phase::Merge);
            errors.extend(merge_errors);

            let param_errors = self.run_phase(&mut tree, Phase::Param);
            if !param_errors.is_empty() {
                errors.extend(param_errors);
                return Err(errors);
            }

            let eval_errors = self.run_phase(&mut tree, Phase::Eval);
            errors.extend(eval_errors);
        }

        if let Err(e) = postprocess::cycle_guard(&tree, &self.options) {
            errors.push(e);
            return Err(errors);
        }

        postprocess::prune(&mut tree, &self.options.prune_paths, &self.options);

        if let Err(e) = postprocess::sort(&mut tree, &self.options.sort_paths, &self.options) {
            errors.push(e);
        }

        if !self.options.cherry_pick_paths.is_empty() {
            tree = postprocess::cherry_pick(&tree, &self.options.cherry_pick_paths, &self.options);
        }

        errors.into_result(tree)
    }

    fn run_phase(&self, tree: &mut Node, phase: Phase) -> MultiError {
        scheduler::run_phase(
            tree,
            phase,
            &self.registry,
            &self.options,
            &self.options.trace,
            &self.cancel,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn tree_with(pairs: Vec<(&str, Node)>) -> Node {
        let mut m = BTreeMap::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v);
        }
        Node::Mapping(m)
    }

    #[test]
    fn evaluates_simple_document() {
        let mut meta = BTreeMap::new();
        meta.insert("base".to_string(), Node::string("app"));
        meta.insert("ver".to_string(), Node::string("1.0"));
        let tree = tree_with(vec![
            ("meta", Node::Mapping(meta)),
            ("name", Node::string(r#"(( concat meta.base "-" meta.ver ))"#)),
            ("full", Node::string("(( grab name ))")),
        ]);
        let orch = Orchestrator::new(Options::default()).unwrap();
        let result = orch.evaluate(tree).unwrap();
        let m = result.as_mapping().unwrap();
        assert_eq!(m.get("full").unwrap().as_str(), Some("app-1.0"));
    }

    #[test]
    fn cherry_pick_prunes_bad_branch_before_eval_fails() {
        let tree = tree_with(vec![
            ("a", Node::string("(( grab b ))")),
            ("b", Node::string("hi")),
            ("bad", Node::string("(( grab nonexistent ))")),
        ]);
        let mut options = Options::default();
        options.cherry_pick_paths = vec![crate::cursor::Cursor::parse("a")];
        let orch = Orchestrator::new(options).unwrap();
        let result = orch.evaluate(tree).unwrap();
        let m = result.as_mapping().unwrap();
        assert_eq!(m.get("a").unwrap().as_str(), Some("hi"));
        assert!(m.get("bad").is_none());
    }

    #[test]
    fn param_error_short_circuits_before_eval() {
        let tree = tree_with(vec![
            ("secret", Node::string(r#"(( param "set me" ))"#)),
            ("derived", Node::string("(( grab secret ))")),
        ]);
        let orch = Orchestrator::new(Options::default()).unwrap();
        let err = orch.evaluate(tree).unwrap_err();
        assert_eq!(err.errors().len(), 1);
    }

    #[test]
    fn rejects_invalid_options() {
        let mut options = Options::default();
        options.max_workers = 0;
        assert!(Orchestrator::new(options).is_err());
    }
}
