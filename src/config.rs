use crate::cursor::Cursor;
use crate::error::Error;
use crate::trace::Trace;

/// Tie-break order within a scheduler wave (spec.md §4.D.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    Alphabetical,
    Insertion,
}

impl Default for TieBreak {
    fn default() -> Self {
        TieBreak::Alphabetical
    }
}

/// The configuration knobs consumed by the core (spec.md §6 table).
#[derive(Debug, Clone)]
pub struct Options {
    pub cherry_pick_paths: Vec<Cursor>,
    pub prune_paths: Vec<Cursor>,
    pub skip_eval: bool,
    pub fallback_append: bool,
    pub dataflow_order: TieBreak,
    pub skip_vault: bool,
    pub skip_aws: bool,
    pub max_workers: usize,
    pub min_ops_for_parallel: usize,
    pub max_cycle_depth: usize,
    pub redact: bool,
    /// Paths to sort, each paired with the mapping field to sort sequence
    /// elements by (spec.md §4.F "Sort").
    pub sort_paths: Vec<(Cursor, String)>,
    /// Name-field set for array-by-name addressing, first match wins.
    pub name_fields: Vec<String>,
    pub trace: Trace,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            cherry_pick_paths: Vec::new(),
            prune_paths: Vec::new(),
            skip_eval: false,
            fallback_append: false,
            dataflow_order: TieBreak::Alphabetical,
            skip_vault: false,
            skip_aws: false,
            max_workers: 1,
            min_ops_for_parallel: 1,
            max_cycle_depth: 4096,
            redact: false,
            sort_paths: Vec::new(),
            name_fields: crate::node::DEFAULT_NAME_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            trace: Trace::None,
        }
    }
}

impl Options {
    /// Validate the numeric knobs, producing a Configuration error for
    /// obviously-unusable values (spec.md §7: "invalid options, e.g. negative
    /// concurrency"). `usize` can't go negative, so the check here is the
    /// Rust-shaped equivalent: zero is as meaningless as negative would be.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_workers == 0 {
            return Err(Error::Configuration {
                message: "max_workers must be at least 1".into(),
            });
        }
        if self.max_cycle_depth == 0 {
            return Err(Error::Configuration {
                message: "max_cycle_depth must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_workers() {
        let mut opts = Options::default();
        opts.max_workers = 0;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn default_name_fields_match_spec() {
        let opts = Options::default();
        assert_eq!(opts.name_fields, vec!["name", "id", "key"]);
    }
}
