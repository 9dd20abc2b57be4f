//! Hook results and the result kinds each node kind permits

use std::fmt;

/// Outcome of a pre block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookResult {
    /// Apply the node's default action
    Continue,
    /// Skip the node; for a module, skip its whole subtree
    Abort,
}

impl HookResult {
    pub const ALL: &'static [HookResult] = &[HookResult::Continue, HookResult::Abort];

    /// Keyword as written in a hook
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "CONTINUE",
            Self::Abort => "ABORT",
        }
    }

    /// Case-insensitive keyword lookup
    pub fn parse(keyword: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(keyword.trim()))
    }
}

impl fmt::Display for HookResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hook owner kind, deciding which results a pre block may produce
pub trait HookKind: Send + Sync {
    fn name(&self) -> &'static str;

    fn permitted_results(&self) -> &'static [HookResult];

    fn permits(&self, result: HookResult) -> bool {
        self.permitted_results().contains(&result)
    }
}

/// `Module.hook` of a directory
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleHookKind;

impl HookKind for ModuleHookKind {
    fn name(&self) -> &'static str {
        "module"
    }

    fn permitted_results(&self) -> &'static [HookResult] {
        &[HookResult::Continue, HookResult::Abort]
    }
}

/// `<name>.hook` next to a file
#[derive(Debug, Clone, Copy, Default)]
pub struct FileHookKind;

impl HookKind for FileHookKind {
    fn name(&self) -> &'static str {
        "file"
    }

    fn permitted_results(&self) -> &'static [HookResult] {
        &[HookResult::Continue, HookResult::Abort]
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(HookResult::parse("ABORT"), Some(HookResult::Abort));
        assert_eq!(HookResult::parse("abort"), Some(HookResult::Abort));
        assert_eq!(HookResult::parse("  Continue "), Some(HookResult::Continue));
        assert_eq!(HookResult::parse("SKIP"), None);
    }

    #[test]
    fn test_kinds_permit_both() {
        let kinds: [&dyn HookKind; 2] = [&ModuleHookKind, &FileHookKind];
        for kind in kinds {
            assert!(kind.permits(HookResult::Continue));
            assert!(kind.permits(HookResult::Abort));
        }
    }

    struct ContinueOnly;

    impl HookKind for ContinueOnly {
        fn name(&self) -> &'static str {
            "restricted"
        }

        fn permitted_results(&self) -> &'static [HookResult] {
            &[HookResult::Continue]
        }
    }

    #[test]
    fn test_restricted_kind() {
        assert!(!ContinueOnly.permits(HookResult::Abort));
    }
}
