//! Open flags: the POSIX-style subset both filesystem implementations
//! support.

use std::ops::BitOr;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const READ_ONLY: OpenFlags = OpenFlags(0o0);
    pub const WRITE_ONLY: OpenFlags = OpenFlags(0o1);
    pub const READ_WRITE: OpenFlags = OpenFlags(0o2);
    pub const CREATE: OpenFlags = OpenFlags(0o100);
    pub const EXCLUSIVE: OpenFlags = OpenFlags(0o200);
    pub const TRUNCATE: OpenFlags = OpenFlags(0o1000);
    pub const APPEND: OpenFlags = OpenFlags(0o2000);
    pub const SYNC: OpenFlags = OpenFlags(0o10000);

    const ACCESS_MASK: u32 = 0o3;
    const KNOWN: u32 = 0o13303;

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0 && (other.0 != 0 || self.0 & Self::ACCESS_MASK == 0)
    }

    const fn access(self) -> u32 {
        self.0 & Self::ACCESS_MASK
    }

    pub const fn is_readable(self) -> bool {
        matches!(self.access(), 0o0 | 0o2)
    }

    pub const fn is_writable(self) -> bool {
        matches!(self.access(), 0o1 | 0o2)
    }

    /// Rejects unknown bits and contradictory access modes.
    pub fn validate(self) -> crate::Result<()> {
        if self.0 & !Self::KNOWN != 0 {
            return Err(Error::InvalidArgument(format!(
                "unsupported open flags {:#o}",
                self.0
            )));
        }
        if self.access() == Self::ACCESS_MASK {
            return Err(Error::InvalidArgument(
                "write-only and read-write are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}
