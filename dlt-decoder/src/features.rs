//! Feature flags recording which header fields of a trace line are valid

use std::fmt;
use std::ops::{BitOr, BitOrAssign, Sub};

/// Immutable set of the nine line features
///
/// A field whose feature is not set carries no meaning, whatever value it
/// holds. Combining sets is a bitwise OR, removal is AND-NOT, and only the
/// low nine bits can ever be set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LineFeatures(u16);

impl LineFeatures {
    pub const NONE: LineFeatures = LineFeatures(0);
    pub const ECU_ID: LineFeatures = LineFeatures(0x001);
    pub const APP_ID: LineFeatures = LineFeatures(0x002);
    pub const CTX_ID: LineFeatures = LineFeatures(0x004);
    pub const LOG_TIMESTAMP: LineFeatures = LineFeatures(0x008);
    pub const DEVICE_TIMESTAMP: LineFeatures = LineFeatures(0x010);
    pub const MESSAGE_TYPE: LineFeatures = LineFeatures(0x020);
    pub const SESSION_ID: LineFeatures = LineFeatures(0x040);
    pub const VERBOSE: LineFeatures = LineFeatures(0x080);
    pub const BIG_ENDIAN: LineFeatures = LineFeatures(0x100);

    const MASK: u16 = 0x1FF;

    /// Builds a set from raw bits, dropping anything above bit 8
    pub const fn from_bits(bits: u16) -> Self {
        LineFeatures(bits & Self::MASK)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn union(self, other: LineFeatures) -> Self {
        LineFeatures(self.0 | other.0)
    }

    pub const fn difference(self, other: LineFeatures) -> Self {
        LineFeatures(self.0 & !other.0)
    }

    /// True if every flag of `other` is set
    pub const fn contains(self, other: LineFeatures) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns a copy with `flag` set or cleared
    pub const fn with(self, flag: LineFeatures, set: bool) -> Self {
        if set {
            self.union(flag)
        } else {
            self.difference(flag)
        }
    }

    pub fn ecu_id(self) -> bool {
        self.contains(Self::ECU_ID)
    }

    pub fn app_id(self) -> bool {
        self.contains(Self::APP_ID)
    }

    pub fn ctx_id(self) -> bool {
        self.contains(Self::CTX_ID)
    }

    pub fn log_timestamp(self) -> bool {
        self.contains(Self::LOG_TIMESTAMP)
    }

    pub fn device_timestamp(self) -> bool {
        self.contains(Self::DEVICE_TIMESTAMP)
    }

    pub fn message_type(self) -> bool {
        self.contains(Self::MESSAGE_TYPE)
    }

    pub fn session_id(self) -> bool {
        self.contains(Self::SESSION_ID)
    }

    pub fn verbose(self) -> bool {
        self.contains(Self::VERBOSE)
    }

    pub fn big_endian(self) -> bool {
        self.contains(Self::BIG_ENDIAN)
    }
}

impl BitOr for LineFeatures {
    type Output = LineFeatures;

    fn bitor(self, rhs: LineFeatures) -> LineFeatures {
        self.union(rhs)
    }
}

impl BitOrAssign for LineFeatures {
    fn bitor_assign(&mut self, rhs: LineFeatures) {
        *self = self.union(rhs);
    }
}

impl Sub for LineFeatures {
    type Output = LineFeatures;

    fn sub(self, rhs: LineFeatures) -> LineFeatures {
        self.difference(rhs)
    }
}

impl fmt::Debug for LineFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(LineFeatures, &str); 9] = [
            (LineFeatures::ECU_ID, "EcuId"),
            (LineFeatures::APP_ID, "AppId"),
            (LineFeatures::CTX_ID, "CtxId"),
            (LineFeatures::LOG_TIMESTAMP, "LogTimeStamp"),
            (LineFeatures::DEVICE_TIMESTAMP, "DevTimeStamp"),
            (LineFeatures::MESSAGE_TYPE, "MessageType"),
            (LineFeatures::SESSION_ID, "SessionId"),
            (LineFeatures::VERBOSE, "Verbose"),
            (LineFeatures::BIG_ENDIAN, "BigEndian"),
        ];

        let mut set = f.debug_set();
        for (flag, name) in NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{}", name));
            }
        }
        set.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_and_difference() {
        let features = LineFeatures::ECU_ID | LineFeatures::APP_ID | LineFeatures::VERBOSE;
        assert!(features.ecu_id());
        assert!(features.app_id());
        assert!(features.verbose());
        assert!(!features.ctx_id());

        let removed = features - LineFeatures::APP_ID;
        assert!(!removed.app_id());
        assert!(removed.ecu_id());
        assert_eq!(removed.bits(), 0x081);
    }

    #[test]
    fn test_union_is_associative() {
        let a = LineFeatures::ECU_ID;
        let b = LineFeatures::SESSION_ID;
        let c = LineFeatures::BIG_ENDIAN;
        assert_eq!((a | b) | c, a | (b | c));
    }

    #[test]
    fn test_only_low_nine_bits() {
        assert_eq!(LineFeatures::from_bits(0xFFFF).bits(), 0x1FF);
        assert_eq!(LineFeatures::from_bits(0x200), LineFeatures::NONE);
    }

    #[test]
    fn test_with() {
        let features = LineFeatures::NONE.with(LineFeatures::DEVICE_TIMESTAMP, true);
        assert!(features.device_timestamp());
        assert!(features.with(LineFeatures::DEVICE_TIMESTAMP, false).is_empty());
    }

    #[test]
    fn test_debug_lists_names() {
        let features = LineFeatures::ECU_ID | LineFeatures::BIG_ENDIAN;
        assert_eq!(format!("{:?}", features), "{EcuId, BigEndian}");
    }
}
