//! Behaviour flags for a single optimize pass

use bitflags::bitflags;

bitflags! {
    /// Conditions that modify the behaviour of one [`Optimizer::optimize`] call.
    ///
    /// [`Optimizer::optimize`]: super::Optimizer::optimize
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OptimizeConditions: u32 {
        /// Kill the Windows shell (explorer) for the duration of the session
        const KILL_EXPLORER_EXE = 1;
        /// The console window should stay visible after optimizing
        const NO_HIDE = 1 << 1;
        /// Raise whitelisted processes to Above Normal
        const BOOST_PRIORITIES = 1 << 2;
        /// Leave non-whitelisted processes at their current priority
        const IGNORE_ORDINARY_PROCESSES = 1 << 3;
        /// Move games onto the priority cores and everything else off them
        const OPTIMIZE_AFFINITY = 1 << 4;
        /// Pin streaming software to the configured cores
        const STREAMER_MODE = 1 << 5;
    }
}

/// A flag combination that cannot do what the caller probably intended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagConflict {
    /// Nothing is boosted and nothing is lowered
    NoOp,
    /// Affinity optimization has no ordinary processes to move
    AffinityOverriddenByIgnore,
    /// Streamer mode takes precedence over affinity optimization
    StreamerOverridesAffinity,
}

impl FlagConflict {
    pub fn message(self, flags: OptimizeConditions) -> String {
        match self {
            FlagConflict::NoOp => format!(
                "The given flags ({:?}) stop the optimizer from doing any optimization: \
                 priorities are not boosted and ordinary processes are ignored.",
                flags
            ),
            FlagConflict::AffinityOverriddenByIgnore => {
                "Flag conflict! OPTIMIZE_AFFINITY is overridden by IGNORE_ORDINARY_PROCESSES."
                    .to_string()
            }
            FlagConflict::StreamerOverridesAffinity => {
                "Flag conflict! STREAMER_MODE overrides OPTIMIZE_AFFINITY.".to_string()
            }
        }
    }
}

impl OptimizeConditions {
    /// Every advisory conflict present in this flag set, in a fixed order.
    pub fn conflicts(self) -> Vec<FlagConflict> {
        let mut conflicts = Vec::new();

        if !self.contains(Self::BOOST_PRIORITIES) && self.contains(Self::IGNORE_ORDINARY_PROCESSES) {
            conflicts.push(FlagConflict::NoOp);
        }
        if self.contains(Self::IGNORE_ORDINARY_PROCESSES | Self::OPTIMIZE_AFFINITY) {
            conflicts.push(FlagConflict::AffinityOverriddenByIgnore);
        }
        if self.contains(Self::STREAMER_MODE | Self::OPTIMIZE_AFFINITY) {
            conflicts.push(FlagConflict::StreamerOverridesAffinity);
        }

        conflicts
    }

    /// Parses the command-shell switch syntax, e.g. `"-k --boostpriorities -i"`.
    ///
    /// Matching is case-insensitive; unknown switches are ignored.
    pub fn parse_flags(input: &str) -> Self {
        input
            .split_whitespace()
            .map(str::to_ascii_lowercase)
            .fold(Self::empty(), |flags, switch| {
                flags
                    | match switch.as_str() {
                        "-k" | "--killexplorerexe" => Self::KILL_EXPLORER_EXE,
                        "-nh" | "--nohide" => Self::NO_HIDE,
                        "-b" | "--boostpriorities" => Self::BOOST_PRIORITIES,
                        "-i" | "--ignoreordinaryprocesses" => Self::IGNORE_ORDINARY_PROCESSES,
                        "-a" | "--optimizeaffinity" => Self::OPTIMIZE_AFFINITY,
                        "-s" | "--streamermode" => Self::STREAMER_MODE,
                        other => {
                            log::warn!("Ignoring unknown optimize switch '{}'", other);
                            Self::empty()
                        }
                    }
            })
    }
}
