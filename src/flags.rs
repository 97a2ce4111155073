//! The 16-bit general-purpose bit flag field carried by local headers and
//! central directory headers.

/// General-purpose bit flags, per APPNOTE §4.4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u16);

impl Flags {
    /// Bit 0: the entry is encrypted. Read-only in this engine — writing an
    /// entry with this bit set is rejected, since encryption is unsupported.
    pub const ENCRYPTED: u16 = 1 << 0;
    /// Bit 3: sizes and CRC-32 are zero in the local header and follow the
    /// compressed data in a data descriptor instead.
    pub const DATA_DESCRIPTOR: u16 = 1 << 3;
    /// Bit 6: strong encryption is in use. Read-only, same as bit 0.
    pub const STRONG_ENCRYPTION: u16 = 1 << 6;
    /// Bit 11: the path and comment are UTF-8 rather than the legacy code
    /// page.
    pub const UTF8: u16 = 1 << 11;

    /// Wraps a raw 16-bit flag field.
    pub fn from_bits(bits: u16) -> Self {
        Flags(bits)
    }

    /// Returns the raw 16-bit flag field.
    pub fn bits(&self) -> u16 {
        self.0
    }

    /// Bit 0.
    pub fn is_encrypted(&self) -> bool {
        self.0 & Self::ENCRYPTED != 0
    }

    /// Bit 3.
    pub fn has_data_descriptor(&self) -> bool {
        self.0 & Self::DATA_DESCRIPTOR != 0
    }

    /// Bit 6.
    pub fn is_strong_encrypted(&self) -> bool {
        self.0 & Self::STRONG_ENCRYPTION != 0
    }

    /// Bit 11.
    pub fn has_utf8_strings(&self) -> bool {
        self.0 & Self::UTF8 != 0
    }

    fn set_bit(&mut self, bit: u16, value: bool) {
        if value {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    /// Sets or clears bit 3.
    pub fn set_data_descriptor(&mut self, value: bool) {
        self.set_bit(Self::DATA_DESCRIPTOR, value);
    }

    /// Sets or clears bit 11.
    pub fn set_utf8(&mut self, value: bool) {
        self.set_bit(Self::UTF8, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_accessors_match_bit_positions() {
        let mut flags = Flags::from_bits(0);
        assert!(!flags.has_utf8_strings());
        flags.set_utf8(true);
        assert!(flags.has_utf8_strings());
        assert_eq!(flags.bits(), Flags::UTF8);

        flags.set_data_descriptor(true);
        assert!(flags.has_data_descriptor());
        assert_eq!(flags.bits(), Flags::UTF8 | Flags::DATA_DESCRIPTOR);
    }
}
