//! Search configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// File name of the persisted transition system inside the result folder.
pub const SYSTEM_FILE: &str = "transition_system.enc";

/// A reachability engine.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SearchMode {
    /// Depth-indexed unrolling of the transition system.
    Unroll,
    /// Region search over symbolic states.
    Symbolic,
    /// Region search over concrete states.
    Enumerative,
    /// Symbolic region search that halts on the first reached error.
    Synchronised,
}

impl SearchMode {
    pub const ALL: [SearchMode; 4] = [
        SearchMode::Unroll,
        SearchMode::Symbolic,
        SearchMode::Enumerative,
        SearchMode::Synchronised,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SearchMode::Unroll => "unroll",
            SearchMode::Symbolic => "symbolic",
            SearchMode::Enumerative => "enumerative",
            SearchMode::Synchronised => "synchronised",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SearchMode::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown search mode: {}", s))
    }
}

/// Which engines run, how deep, and what is written afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Folder receiving saved artifacts (default: "result/default")
    pub result_folder: PathBuf,
    /// Run the enumerative region search (default: false)
    pub enumerative: bool,
    /// Run the symbolic region search (default: true)
    pub symbolic: bool,
    /// Run the depth-indexed unrolling (default: true)
    pub unrolled: bool,
    /// Stop the symbolic search on the first reached error (default: false)
    pub stop_on_error: bool,
    /// Depth bound; `None` searches to the fixpoint (default: None)
    pub max_search_depth: Option<usize>,
    /// Persist the transition system to the result folder (default: false)
    pub save_transition_system: bool,
    /// Collect per-phase timings (default: false)
    pub profile: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            result_folder: PathBuf::from("result/default"),
            enumerative: false,
            symbolic: true,
            unrolled: true,
            stop_on_error: false,
            max_search_depth: None,
            save_transition_system: false,
            profile: false,
        }
    }
}

impl SearchConfig {
    /// Configuration running exactly one engine.
    pub fn for_mode(mode: SearchMode) -> Self {
        Self {
            enumerative: mode == SearchMode::Enumerative,
            symbolic: matches!(mode, SearchMode::Symbolic | SearchMode::Synchronised),
            unrolled: mode == SearchMode::Unroll,
            stop_on_error: mode == SearchMode::Synchronised,
            ..Self::default()
        }
    }

    /// Engines to run, in execution order.
    pub fn modes(&self) -> Vec<SearchMode> {
        let mut modes = Vec::new();
        if self.unrolled {
            modes.push(SearchMode::Unroll);
        }
        if self.symbolic {
            if self.stop_on_error {
                modes.push(SearchMode::Synchronised);
            } else {
                modes.push(SearchMode::Symbolic);
            }
        }
        if self.enumerative {
            modes.push(SearchMode::Enumerative);
        }
        modes
    }

    pub fn system_file(&self) -> PathBuf {
        self.result_folder.join(SYSTEM_FILE)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_default_modes() {
        let config = SearchConfig::default();
        assert_eq!(config.modes(), vec![SearchMode::Unroll, SearchMode::Symbolic]);
        assert_eq!(config.max_search_depth, None);
        assert_eq!(
            config.system_file(),
            PathBuf::from("result/default").join("transition_system.enc")
        );
    }

    #[test]
    fn test_single_mode() {
        for mode in SearchMode::ALL {
            assert_eq!(SearchConfig::for_mode(mode).modes(), vec![mode]);
        }
    }

    #[test]
    fn test_mode_names() {
        assert_eq!("Enumerative".parse::<SearchMode>(), Ok(SearchMode::Enumerative));
        assert_eq!(SearchMode::Synchronised.to_string(), "synchronised");
        assert!("parallel".parse::<SearchMode>().is_err());
    }
}
