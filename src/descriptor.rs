//! Header stored in front of every candidate firmware image.

use embedded_storage::nor_flash::ReadNorFlash;
use serde::{Deserialize, Serialize};

use crate::{Error, layout::FlashRegion};

/// 12 bytes, little endian, immediately preceding the raw image.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareDescriptor {
    /// Must equal [`FirmwareDescriptor::SIZE`].
    #[serde(with = "postcard::fixint::le")]
    pub description_length: u32,
    #[serde(with = "postcard::fixint::le")]
    pub firmware_length: u32,
    /// CRC-32 of the `firmware_length` image bytes.
    #[serde(with = "postcard::fixint::le")]
    pub checksum: u32,
}

impl FirmwareDescriptor {
    pub const SIZE: u32 = 12;

    pub fn new(firmware_length: u32, checksum: u32) -> Self {
        Self {
            description_length: Self::SIZE,
            firmware_length,
            checksum,
        }
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE as usize]) -> Result<Self, Error> {
        postcard::from_bytes(bytes).map_err(|_| Error::Descriptor)
    }

    pub fn to_bytes(&self) -> Result<[u8; Self::SIZE as usize], Error> {
        let mut bytes = [0u8; Self::SIZE as usize];
        postcard::to_slice(self, &mut bytes).map_err(|_| Error::Descriptor)?;
        Ok(bytes)
    }

    /// Read the descriptor at the start of `region`.
    pub fn read<F: ReadNorFlash>(flash: &mut F, region: FlashRegion) -> Result<Self, Error> {
        let mut bytes = [0u8; Self::SIZE as usize];
        let at = region.subrange(0, Self::SIZE)?;
        flash.read(at.begin, &mut bytes).map_err(Error::flash)?;
        Self::from_bytes(&bytes)
    }

    /// Structural check of the header against the regions it is copied between.
    pub fn is_valid(&self, source: FlashRegion, destination: FlashRegion) -> bool {
        self.description_length == Self::SIZE
            && self.firmware_length != 0
            && self.firmware_length <= destination.len()
            && source.subrange(Self::SIZE, self.firmware_length).is_ok()
    }

    /// Where the image bytes live, directly after the header.
    pub fn image(&self, source: FlashRegion) -> Result<FlashRegion, Error> {
        source.subrange(Self::SIZE, self.firmware_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_is_little_endian() {
        let descriptor = FirmwareDescriptor::new(0x0001_0203, 0xdead_beef);

        assert_eq!(
            descriptor.to_bytes().unwrap(),
            [12, 0, 0, 0, 0x03, 0x02, 0x01, 0x00, 0xef, 0xbe, 0xad, 0xde]
        );
    }

    #[test]
    fn parses_raw_header() {
        let bytes = [12, 0, 0, 0, 0x00, 0x10, 0, 0, 0x78, 0x56, 0x34, 0x12];
        let descriptor = FirmwareDescriptor::from_bytes(&bytes).unwrap();

        assert_eq!(descriptor.description_length, 12);
        assert_eq!(descriptor.firmware_length, 0x1000);
        assert_eq!(descriptor.checksum, 0x1234_5678);
    }

    #[test]
    fn validity() {
        let source = FlashRegion::new(0x2000, 0x3000);
        let destination = FlashRegion::new(0, 0x800);

        assert!(FirmwareDescriptor::new(0x800, 0).is_valid(source, destination));
        assert!(!FirmwareDescriptor::new(0, 0).is_valid(source, destination));
        assert!(!FirmwareDescriptor::new(0x801, 0).is_valid(source, destination));

        let wrong_header = FirmwareDescriptor {
            description_length: 16,
            ..FirmwareDescriptor::new(0x10, 0)
        };
        assert!(!wrong_header.is_valid(source, destination));

        let big_destination = FlashRegion::new(0, 0x2000);
        assert!(FirmwareDescriptor::new(0x1000 - 12, 0).is_valid(source, big_destination));
        assert!(!FirmwareDescriptor::new(0x1000 - 11, 0).is_valid(source, big_destination));
    }
}
