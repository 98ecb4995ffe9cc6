//! Lifecycle scopes and return states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Request-processing stage whose subroutine is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// No subroutine running yet.
    Unknown,
    /// `vcl_recv`
    Recv,
    /// `vcl_hash`
    Hash,
    /// `vcl_hit`
    Hit,
    /// `vcl_miss`
    Miss,
    /// `vcl_pass`
    Pass,
    /// `vcl_fetch`
    Fetch,
    /// `vcl_error`
    Error,
    /// `vcl_deliver`
    Deliver,
    /// `vcl_log`
    Log,
}

impl Scope {
    /// Every lifecycle scope, in lifecycle order.
    pub const LIFECYCLE: [Scope; 9] = [
        Scope::Recv,
        Scope::Hash,
        Scope::Hit,
        Scope::Miss,
        Scope::Pass,
        Scope::Fetch,
        Scope::Error,
        Scope::Deliver,
        Scope::Log,
    ];

    /// Reserved subroutine name for this scope.
    pub fn subroutine(self) -> &'static str {
        match self {
            Scope::Unknown => "",
            Scope::Recv => "vcl_recv",
            Scope::Hash => "vcl_hash",
            Scope::Hit => "vcl_hit",
            Scope::Miss => "vcl_miss",
            Scope::Pass => "vcl_pass",
            Scope::Fetch => "vcl_fetch",
            Scope::Error => "vcl_error",
            Scope::Deliver => "vcl_deliver",
            Scope::Log => "vcl_log",
        }
    }

    /// Scope of a reserved subroutine name.
    pub fn from_subroutine(name: &str) -> Option<Scope> {
        Scope::LIFECYCLE
            .into_iter()
            .find(|scope| scope.subroutine() == name)
    }

    /// Return states a subroutine of this scope may produce.
    pub fn legal_returns(self) -> &'static [ReturnState] {
        use ReturnState::*;
        match self {
            Scope::Unknown => &[],
            Scope::Recv => &[Lookup, Pass, Error],
            Scope::Hash => &[Hash],
            Scope::Hit => &[Deliver, DeliverStale, Error],
            Scope::Miss => &[Fetch, Pass, Error, DeliverStale],
            Scope::Pass => &[Pass, Error],
            Scope::Fetch => &[Deliver, DeliverStale, Pass, Error],
            Scope::Error | Scope::Deliver | Scope::Log => &[Deliver],
        }
    }

    /// State assumed when the subroutine ends without `return(state)`.
    pub fn default_return(self) -> Option<ReturnState> {
        match self {
            Scope::Unknown => None,
            Scope::Recv => Some(ReturnState::Lookup),
            Scope::Hash => Some(ReturnState::Hash),
            Scope::Hit => Some(ReturnState::Deliver),
            Scope::Miss => Some(ReturnState::Fetch),
            Scope::Pass => Some(ReturnState::Pass),
            Scope::Fetch | Scope::Error | Scope::Deliver | Scope::Log => {
                Some(ReturnState::Deliver)
            }
        }
    }

    /// Whether `restart;` may run here.
    pub fn allows_restart(self) -> bool {
        !matches!(self, Scope::Hash | Scope::Log | Scope::Unknown)
    }

    /// Whether `error;` may run here.
    pub fn allows_error(self) -> bool {
        matches!(
            self,
            Scope::Recv | Scope::Hit | Scope::Miss | Scope::Pass | Scope::Fetch
        )
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scope::Unknown => "unknown",
            Scope::Recv => "recv",
            Scope::Hash => "hash",
            Scope::Hit => "hit",
            Scope::Miss => "miss",
            Scope::Pass => "pass",
            Scope::Fetch => "fetch",
            Scope::Error => "error",
            Scope::Deliver => "deliver",
            Scope::Log => "log",
        })
    }
}

/// Bit set of scopes, used for function availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeSet(u16);

impl ScopeSet {
    /// `vcl_recv`
    pub const RECV: ScopeSet = ScopeSet(1 << 0);
    /// `vcl_hash`
    pub const HASH: ScopeSet = ScopeSet(1 << 1);
    /// `vcl_hit`
    pub const HIT: ScopeSet = ScopeSet(1 << 2);
    /// `vcl_miss`
    pub const MISS: ScopeSet = ScopeSet(1 << 3);
    /// `vcl_pass`
    pub const PASS: ScopeSet = ScopeSet(1 << 4);
    /// `vcl_fetch`
    pub const FETCH: ScopeSet = ScopeSet(1 << 5);
    /// `vcl_error`
    pub const ERROR: ScopeSet = ScopeSet(1 << 6);
    /// `vcl_deliver`
    pub const DELIVER: ScopeSet = ScopeSet(1 << 7);
    /// `vcl_log`
    pub const LOG: ScopeSet = ScopeSet(1 << 8);
    /// Every lifecycle scope.
    pub const ALL: ScopeSet = ScopeSet(0x1ff);

    /// Whether the set includes `scope`.
    pub fn contains(self, scope: Scope) -> bool {
        let bit = match scope {
            Scope::Unknown => return false,
            Scope::Recv => Self::RECV,
            Scope::Hash => Self::HASH,
            Scope::Hit => Self::HIT,
            Scope::Miss => Self::MISS,
            Scope::Pass => Self::PASS,
            Scope::Fetch => Self::FETCH,
            Scope::Error => Self::ERROR,
            Scope::Deliver => Self::DELIVER,
            Scope::Log => Self::LOG,
        };
        self.0 & bit.0 != 0
    }
}

impl BitOr for ScopeSet {
    type Output = ScopeSet;

    fn bitor(self, rhs: Self) -> Self::Output {
        ScopeSet(self.0 | rhs.0)
    }
}

/// Value of `return(state)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnState {
    /// `lookup`
    Lookup,
    /// `pass`
    Pass,
    /// `error`
    Error,
    /// `hash`
    Hash,
    /// `fetch`
    Fetch,
    /// `deliver`
    Deliver,
    /// `deliver_stale`
    DeliverStale,
}

impl ReturnState {
    /// Parse a state identifier.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "lookup" => ReturnState::Lookup,
            "pass" => ReturnState::Pass,
            "error" => ReturnState::Error,
            "hash" => ReturnState::Hash,
            "fetch" => ReturnState::Fetch,
            "deliver" => ReturnState::Deliver,
            "deliver_stale" => ReturnState::DeliverStale,
            _ => return None,
        })
    }
}

impl fmt::Display for ReturnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReturnState::Lookup => "lookup",
            ReturnState::Pass => "pass",
            ReturnState::Error => "error",
            ReturnState::Hash => "hash",
            ReturnState::Fetch => "fetch",
            ReturnState::Deliver => "deliver",
            ReturnState::DeliverStale => "deliver_stale",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subroutine_names_round_trip() {
        for scope in Scope::LIFECYCLE {
            assert_eq!(Scope::from_subroutine(scope.subroutine()), Some(scope));
        }
        assert_eq!(Scope::from_subroutine("custom"), None);
    }

    #[test]
    fn pass_is_not_a_legal_return_from_hit() {
        assert!(!Scope::Hit.legal_returns().contains(&ReturnState::Pass));
        assert!(Scope::Miss.legal_returns().contains(&ReturnState::Pass));
        for scope in Scope::LIFECYCLE {
            let default = scope.default_return().unwrap();
            assert!(
                scope.legal_returns().contains(&default),
                "{scope} default {default} must be reachable"
            );
        }
    }

    #[test]
    fn scope_sets_combine() {
        let set = ScopeSet::RECV | ScopeSet::ERROR;
        assert!(set.contains(Scope::Recv));
        assert!(set.contains(Scope::Error));
        assert!(!set.contains(Scope::Deliver));
        assert!(ScopeSet::ALL.contains(Scope::Log));
        assert!(!ScopeSet::ALL.contains(Scope::Unknown));
    }
}
