//! Wire constants of the OpenPGP card application

/// Application identifier of the OpenPGP card application (RID + PIX prefix)
pub const OPENPGP_AID: &[u8] = b"\xD2\x76\x00\x01\x24\x01";

/// Block waiting time integer used for SELECT and GET DATA transfers
pub const EXTENDED_BWI: u8 = 0x04;

/// Instruction bytes
pub mod ins {
    /// SELECT FILE
    pub const SELECT: u8 = 0xA4;
    /// GET DATA
    pub const GET_DATA: u8 = 0xCA;
    /// VERIFY
    pub const VERIFY: u8 = 0x20;
    /// PERFORM SECURITY OPERATION
    pub const PSO: u8 = 0x2A;
}

/// SELECT by DF name
pub const SELECT_BY_NAME: (u8, u8) = (0x04, 0x00);

/// PSO:DECIPHER parameters (P1 = plain value, P2 = enciphered data)
pub const PSO_DECIPHER: (u8, u8) = (0x80, 0x86);

/// Data object tags
pub mod tags {
    /// URL of the public key
    pub const PUBLIC_KEY_URL: u16 = 0x5F50;
}

/// PIN access condition references used with VERIFY
pub mod pin_reference {
    /// PW1 for PSO:DECIPHER and other non-signing operations
    pub const PW1_OTHER: u8 = 0x82;
    /// PW1 for PSO:COMPUTE DIGITAL SIGNATURE
    pub const PW1_SIGN: u8 = 0x81;
}

/// Symmetric algorithm identifiers carried in the deciphered session key
pub mod algorithm {
    /// AES with 256-bit key
    pub const AES_256: u8 = 0x09;
}

/// Padding indicator byte for an RSA cryptogram
pub const RSA_PADDING_INDICATOR: u8 = 0x00;
