use super::{Parse, Serialize};
use crate::jvm::Error;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Class file format version
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    /// Java 6: the first version where the verifier may use stack map frames
    pub const JAVA6: Version = Version {
        major: 50,
        minor: 0,
    };

    /// Java 7: the first version where stack map frames are mandatory
    pub const JAVA7: Version = Version {
        major: 51,
        minor: 0,
    };
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.minor.serialize(writer)?;
        self.major.serialize(writer)?;
        Ok(())
    }
}

impl Parse for Version {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let minor = u16::parse(reader)?;
        let major = u16::parse(reader)?;
        Ok(Version { major, minor })
    }
}
