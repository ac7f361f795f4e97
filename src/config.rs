//! VM tuning knobs (supplemented ambient stack). None of this changes
//! evaluator semantics; it only sizes the data stack and arena up front and
//! toggles bounce-level tracing, the way a host picks buffer sizes for a
//! parser or allocator at startup.

/// Environment variables are read once, at [`VmConfig::from_env`] time —
/// never polled later, so a running `Vm` never observes an external
/// process mutating its own tuning.
const DATA_STACK_INITIAL_ENV: &str = "REBOL_CORE_DATA_STACK_INITIAL";
const DATA_STACK_GROWTH_ENV: &str = "REBOL_CORE_DATA_STACK_GROWTH";
const ARENA_PAGE_SIZE_ENV: &str = "REBOL_CORE_ARENA_PAGE_SIZE";
const TRACE_BOUNCES_ENV: &str = "REBOL_CORE_TRACE_BOUNCES";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VmConfig {
    /// Cells reserved on the data stack before its first growth.
    pub data_stack_initial: usize,
    /// Cells added each time the data stack grows past its capacity.
    pub data_stack_growth: usize,
    /// Stubs reserved in the arena's slot vector before its first growth.
    pub arena_page_size: usize,
    /// Emit a `tracing::trace!` at every trampoline bounce (push/pop/done/
    /// thrown). Off by default — even at trace level this is noisy enough
    /// to matter on a hot loop.
    pub trace_bounces: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig { data_stack_initial: 256, data_stack_growth: 256, arena_page_size: 1024, trace_bounces: false }
    }
}

impl VmConfig {
    /// Start from [`Default::default`] and let `REBOL_CORE_*` env vars
    /// override individual fields. An env var present but unparsable is a
    /// configuration mistake, not a silent fallback, so it's logged and
    /// otherwise ignored rather than failing `Vm::boot`.
    pub fn from_env() -> Self {
        let mut config = VmConfig::default();
        if let Some(value) = read_usize_env(DATA_STACK_INITIAL_ENV) {
            config.data_stack_initial = value;
        }
        if let Some(value) = read_usize_env(DATA_STACK_GROWTH_ENV) {
            config.data_stack_growth = value;
        }
        if let Some(value) = read_usize_env(ARENA_PAGE_SIZE_ENV) {
            config.arena_page_size = value;
        }
        if let Ok(raw) = std::env::var(TRACE_BOUNCES_ENV) {
            config.trace_bounces = matches!(raw.as_str(), "1" | "true" | "yes");
        }
        config
    }
}

fn read_usize_env(name: &str) -> Option<usize> {
    match std::env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(var = name, raw, "ignoring unparsable environment override");
                None
            }
        },
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_nonzero_sizes() {
        let config = VmConfig::default();
        assert!(config.data_stack_initial > 0);
        assert!(config.arena_page_size > 0);
        assert!(!config.trace_bounces);
    }

    #[test]
    fn from_env_overrides_only_the_vars_that_are_set() {
        std::env::remove_var(DATA_STACK_INITIAL_ENV);
        std::env::remove_var(DATA_STACK_GROWTH_ENV);
        std::env::remove_var(ARENA_PAGE_SIZE_ENV);
        std::env::set_var(TRACE_BOUNCES_ENV, "true");

        let config = VmConfig::from_env();

        assert_eq!(config.data_stack_initial, VmConfig::default().data_stack_initial);
        assert!(config.trace_bounces);

        std::env::remove_var(TRACE_BOUNCES_ENV);
    }
}
