use std::fmt::Display;

/// A debugging verbosity level for the scan/scheduler, in the same shape as
/// `lang_pt`'s `Log<T>`: silent by default, opt into increasingly detailed
/// stdout tracing. This never affects the returned tree or errors - it is a
/// pure debugging aid, gated to debug builds just like the teacher's
/// `#[cfg(debug_assertions)]` lexeme tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Trace {
    None,
    Default,
    Verbose,
}

impl Default for Trace {
    fn default() -> Self {
        Trace::None
    }
}

impl Trace {
    fn order(&self) -> u8 {
        match self {
            Trace::None => 0,
            Trace::Default => 1,
            Trace::Verbose => 2,
        }
    }

    /// Emit a wave-boundary line at `Trace::Default` or above.
    pub fn wave<T: Display>(&self, wave: usize, free_count: usize, phase: T) {
        #[cfg(debug_assertions)]
        if self.order() >= Trace::Default.order() {
            println!("[{} wave {}]: {} free opcalls", phase, wave, free_count);
        }
    }

    /// Emit a per-opcall dispatch line at `Trace::Verbose` only.
    pub fn dispatch<T: Display>(&self, canonical_cursor: T, operator: T) {
        #[cfg(debug_assertions)]
        if self.order() >= Trace::Verbose.order() {
            println!("  -> running ({} {})", operator, canonical_cursor);
        }
    }
}
