//! Protocol revisions of the Ember EVM.

use core::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

/// A named protocol version gate.
///
/// Revisions are totally ordered. Features introduced by a revision stay
/// enabled in every later one, so gating code compares with
/// [`is_at_least`](Revision::is_at_least) rather than with equality.
#[repr(u8)]
#[derive(
    Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Revision {
    /// The oldest revision supported by the processor.
    Istanbul,
    /// Introduces the transaction access list (EIP-2930).
    Berlin,
    /// Introduces the base fee (EIP-1559) and lowers the refund cap (EIP-3529).
    London,
    /// The merge revision.
    Paris,
    /// Introduces the init-code size limit (EIP-3860).
    Shanghai,
    /// Introduces blob transactions (EIP-4844) and transient storage.
    #[default]
    Cancun,
    /// Introduces the BLS12-381 precompiles and set-code transactions.
    Prague,
}

/// String identifiers of the protocol revisions.
pub mod name {
    /// The string identifier of the Istanbul revision.
    pub const ISTANBUL: &str = "Istanbul";
    /// The string identifier of the Berlin revision.
    pub const BERLIN: &str = "Berlin";
    /// The string identifier of the London revision.
    pub const LONDON: &str = "London";
    /// The string identifier of the Paris revision.
    pub const PARIS: &str = "Paris";
    /// The string identifier of the Shanghai revision.
    pub const SHANGHAI: &str = "Shanghai";
    /// The string identifier of the Cancun revision.
    pub const CANCUN: &str = "Cancun";
    /// The string identifier of the Prague revision.
    pub const PRAGUE: &str = "Prague";
}

impl Revision {
    /// Checks whether this revision includes the features of `other`.
    ///
    /// Revisions are backward compatible, so a later revision always includes
    /// the features of an earlier one.
    pub const fn is_at_least(self, other: Self) -> bool {
        other as u8 <= self as u8
    }
}

/// Error returned when parsing an unknown revision name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown revision")]
pub struct UnknownRevision;

impl From<Revision> for &'static str {
    fn from(revision: Revision) -> Self {
        match revision {
            Revision::Istanbul => name::ISTANBUL,
            Revision::Berlin => name::BERLIN,
            Revision::London => name::LONDON,
            Revision::Paris => name::PARIS,
            Revision::Shanghai => name::SHANGHAI,
            Revision::Cancun => name::CANCUN,
            Revision::Prague => name::PRAGUE,
        }
    }
}

impl FromStr for Revision {
    type Err = UnknownRevision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            name::ISTANBUL => Ok(Self::Istanbul),
            name::BERLIN => Ok(Self::Berlin),
            name::LONDON => Ok(Self::London),
            name::PARIS => Ok(Self::Paris),
            name::SHANGHAI => Ok(Self::Shanghai),
            name::CANCUN => Ok(Self::Cancun),
            name::PRAGUE => Ok(Self::Prague),
            _ => Err(UnknownRevision),
        }
    }
}

impl Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: &'static str = (*self).into();
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revisions_are_totally_ordered() {
        assert!(Revision::Berlin.is_at_least(Revision::Istanbul));
        assert!(Revision::Berlin.is_at_least(Revision::Berlin));
        assert!(!Revision::Berlin.is_at_least(Revision::London));
        assert!(Revision::Prague.is_at_least(Revision::Cancun));
        assert!(Revision::Istanbul < Revision::Prague);
    }

    #[test]
    fn names_round_trip() {
        for revision in [
            Revision::Istanbul,
            Revision::Berlin,
            Revision::London,
            Revision::Paris,
            Revision::Shanghai,
            Revision::Cancun,
            Revision::Prague,
        ] {
            assert_eq!(revision.to_string().parse::<Revision>(), Ok(revision));
        }
        assert_eq!("Atlantis".parse::<Revision>(), Err(UnknownRevision));
    }
}
