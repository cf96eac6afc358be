use std::{
    fmt::{self, Formatter},
    num::ParseIntError,
    str::FromStr,
};

/// protocol version number
///
/// on the wire this is a 4 bytes big endian signed integer sent by the
/// client right after it received the magic header.
///
/// Versions will be listed here overtime. The server accepts a client
/// only if its version [`is_supported`], there is no negotiation: the
/// server replies with an acceptance or a rejection byte.
///
/// [`is_supported`]: Version::is_supported
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Version(i32);

impl Version {
    /// the encoded size of the [`Version`].
    ///
    /// ```
    /// # use dynarmor_network::Version;
    /// assert_eq!(Version::SIZE, 4)
    /// ```
    pub const SIZE: usize = std::mem::size_of::<i32>();

    /// version 0:
    ///
    /// RSA authenticated transport of an AES session key
    pub const V0: Self = Self(0);

    /// get the minimal supported version supported by this implementation
    pub const MIN: Self = Self::V0;

    /// get the current version implemented by this implementation
    pub const CURRENT: Self = Self::V0;

    /// get the maximal supported version supported by this implementation
    pub const MAX: Self = Self::CURRENT;

    /// returns if the version is currently supported or not
    ///
    /// ```
    /// # use dynarmor_network::Version;
    /// assert!(
    ///   Version::CURRENT.is_supported() ==
    ///   (Version::CURRENT >= Version::MIN && Version::CURRENT <= Version::MAX)
    /// );
    /// ```
    #[inline]
    pub fn is_supported(self) -> bool {
        Self::MIN <= self && self <= Self::MAX
    }

    #[inline]
    pub const fn from_i32(version: i32) -> Self {
        Self(version)
    }

    #[inline]
    pub const fn to_i32(self) -> i32 {
        self.0
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Version {
    type Err = ParseIntError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        i32::from_str(s).map(Self)
    }
}
