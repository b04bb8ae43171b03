//! API key permission scopes
//!
//! A bitmask over {ingest, read, admin}. Admin implies every other scope.

use std::fmt;
use std::ops::BitOr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scope(u32);

impl Scope {
    pub const NONE: Scope = Scope(0);
    pub const INGEST: Scope = Scope(1);
    pub const READ: Scope = Scope(1 << 1);
    pub const ADMIN: Scope = Scope(1 << 2);

    /// True when this scope set grants the required scope; admin grants all.
    pub fn has(self, required: Scope) -> bool {
        if self.0 & Self::ADMIN.0 != 0 {
            return true;
        }
        self.0 & required.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Scope {
        Scope(bits & (Self::INGEST.0 | Self::READ.0 | Self::ADMIN.0))
    }

    /// Parse a comma-separated scope list; unknown tokens are ignored.
    pub fn parse(s: &str) -> Scope {
        let mut scope = Scope::NONE;
        for part in s.split(',') {
            match part {
                "ingest" => scope = scope | Scope::INGEST,
                "read" => scope = scope | Scope::READ,
                "admin" => scope = scope | Scope::ADMIN,
                _ => {}
            }
        }
        scope
    }
}

impl BitOr for Scope {
    type Output = Scope;

    fn bitor(self, rhs: Scope) -> Scope {
        Scope(self.0 | rhs.0)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut names = Vec::new();
        if self.0 & Self::INGEST.0 != 0 {
            names.push("ingest");
        }
        if self.0 & Self::READ.0 != 0 {
            names.push("read");
        }
        if self.0 & Self::ADMIN.0 != 0 {
            names.push("admin");
        }
        write!(f, "{}", names.join(","))
    }
}
