//! Typed snapshots of the exchange program's on-chain accounts.
//!
//! All accounts share the same framing: an 8-byte discriminator followed
//! by little-endian packed fields. Decoding is pure: the same bytes always
//! produce the same snapshot.

mod assets_list;
mod exchange_account;
mod exchange_state;

pub use assets_list::{Asset, AssetsList, Collateral, Synthetic, MAX_LIST_ENTRIES};
pub use exchange_account::{CollateralEntry, ExchangeAccount, MAX_COLLATERALS, NOT_FLAGGED};
pub use exchange_state::ExchangeState;

use solana_sdk::pubkey::Pubkey;

/// Why raw account bytes could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected discriminator for {kind}")]
    Discriminator { kind: &'static str },

    #[error("{kind} data too short: {len} bytes, need {need}")]
    TooShort {
        kind: &'static str,
        len: usize,
        need: usize,
    },

    #[error("{kind} field `{field}` out of range: {value}")]
    OutOfRange {
        kind: &'static str,
        field: &'static str,
        value: u64,
    },
}

/// A type with a fixed on-chain layout.
pub trait AccountDecode: Sized {
    /// Human-readable account kind, used in errors and logs.
    const KIND: &'static str;
    /// Leading 8-byte discriminator.
    const DISCRIMINATOR: [u8; 8];
    /// Total packed size including the discriminator.
    const LEN: usize;

    /// Decode the fields following the discriminator.
    fn decode_body(reader: &mut Reader<'_>) -> Result<Self, DecodeError>;

    /// Decode a full account image.
    fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < Self::LEN {
            return Err(DecodeError::TooShort {
                kind: Self::KIND,
                len: data.len(),
                need: Self::LEN,
            });
        }
        if data[..8] != Self::DISCRIMINATOR {
            return Err(DecodeError::Discriminator { kind: Self::KIND });
        }
        Self::decode_body(&mut Reader::new(&data[8..]))
    }
}

/// Little-endian cursor over a length-checked buffer.
///
/// Callers validate the total length up front (see [`AccountDecode::decode`]),
/// so individual reads index directly.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    pub fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    pub fn bool(&mut self) -> bool {
        self.u8() != 0
    }

    pub fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    pub fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    pub fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }

    pub fn pubkey(&mut self) -> Pubkey {
        Pubkey::new_from_array(self.take())
    }

    pub fn skip(&mut self, len: usize) {
        self.pos += len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_sequence() {
        let key = Pubkey::new_unique();
        let mut buf = vec![1u8];
        buf.extend_from_slice(&0xBEEFu16.to_le_bytes());
        buf.extend_from_slice(&7u32.to_le_bytes());
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        buf.extend_from_slice(key.as_ref());

        let mut r = Reader::new(&buf);
        assert!(r.bool());
        assert_eq!(r.u16(), 0xBEEF);
        assert_eq!(r.u32(), 7);
        assert_eq!(r.u64(), u64::MAX);
        assert_eq!(r.pubkey(), key);
    }
}
