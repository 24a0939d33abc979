/*
    REFERENCES
    ----------

    1. https://w3c.github.io/encrypted-media/format-registry/initdata/cenc.html#common-system-definition
    2. https://github.com/shaka-project/shaka-packager/blob/56e227267c9091a0f65b4d92d9064dda4557f3a7/packager/tools/pssh/pssh-box.py
    3. https://github.com/rlaphoenix/pywidevine/blob/master/pywidevine/pssh.py

*/

use crate::{Error, KeyId, Result};
use base64::Engine;

/// Widevine system id `edef8ba9-79d6-4ace-a3c8-27dcd51d21ed`.
pub const WIDEVINE_SYSTEM_ID: [u8; 16] = [
    0xed, 0xef, 0x8b, 0xa9, 0x79, 0xd6, 0x4a, 0xce, 0xa3, 0xc8, 0x27, 0xdc, 0xd5, 0x1d, 0x21, 0xed,
];

const BOX_TYPE: &[u8; 4] = b"pssh";
const HEADER_SIZE: usize = 32;

// Widevine header protobuf, field 2 (key_id), wire type 2, length 16.
const WIDEVINE_KEY_ID_TAG: [u8; 2] = [0x12, 0x10];

/// Layout of the data carried after the system id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PsshPayload {
    /// The 16 raw key id bytes. The whole box is 48 bytes.
    #[default]
    Raw,
    /// The key id wrapped as a widevine header `key_id` field. The whole box is 50 bytes.
    WidevineHeader,
}

/// Version 0 `PSSH` box for a single key id.
///
/// | offset | size | value                         |
/// |--------|------|-------------------------------|
/// | 0      | 4    | total size (big endian)       |
/// | 4      | 4    | `pssh`                        |
/// | 8      | 4    | version and flags, all zero   |
/// | 12     | 16   | [`WIDEVINE_SYSTEM_ID`]        |
/// | 28     | 4    | data size (big endian)        |
/// | 32     | ..   | data, see [`PsshPayload`]     |
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PsshBox {
    pub key_id: KeyId,
    pub payload: PsshPayload,
}

impl PsshBox {
    pub fn new(key_id: KeyId) -> Self {
        Self {
            key_id,
            payload: PsshPayload::Raw,
        }
    }

    pub fn with_payload(key_id: KeyId, payload: PsshPayload) -> Self {
        Self { key_id, payload }
    }

    fn data(&self) -> Vec<u8> {
        match self.payload {
            PsshPayload::Raw => self.key_id.as_bytes().to_vec(),
            PsshPayload::WidevineHeader => {
                let mut data = WIDEVINE_KEY_ID_TAG.to_vec();
                data.extend_from_slice(self.key_id.as_bytes());
                data
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let data = self.data();
        let size = (HEADER_SIZE + data.len()) as u32;

        let mut bytes = Vec::with_capacity(size as usize);
        bytes.extend_from_slice(&size.to_be_bytes());
        bytes.extend_from_slice(BOX_TYPE);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(&WIDEVINE_SYSTEM_ID);
        bytes.extend_from_slice(&(data.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&data);
        bytes
    }

    /// Standard base64 (with padding) of [`PsshBox::to_bytes`].
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
    }

    /// Read back a box in either of the layouts produced by this crate.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::new("Data too short to be a valid PSSH box"));
        }

        let size = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;

        if size != bytes.len() {
            return Err(Error::new(format!(
                "PSSH box declares {} bytes but {} were given",
                size,
                bytes.len()
            )));
        }

        if &bytes[4..8] != BOX_TYPE {
            return Err(Error::new_with_input(
                "Expected 'pssh' box type",
                String::from_utf8_lossy(&bytes[4..8]),
            ));
        }

        if bytes[8..12] != [0, 0, 0, 0] {
            return Err(Error::new("Only version 0 PSSH boxes are supported"));
        }

        if bytes[12..28] != WIDEVINE_SYSTEM_ID {
            return Err(Error::new_with_input(
                "System id is not widevine",
                hex::encode(&bytes[12..28]),
            ));
        }

        let data_size = u32::from_be_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]) as usize;
        let data = &bytes[HEADER_SIZE..];

        if data_size != data.len() {
            return Err(Error::new("PSSH data size does not match box size"));
        }

        let (payload, kid) = match data.len() {
            16 => (PsshPayload::Raw, data),
            18 if data[..2] == WIDEVINE_KEY_ID_TAG => (PsshPayload::WidevineHeader, &data[2..]),
            _ => return Err(Error::new("PSSH data does not hold a single key id")),
        };

        let mut key_id = [0_u8; 16];
        key_id.copy_from_slice(kid);

        Ok(Self {
            key_id: KeyId::from_bytes(key_id),
            payload,
        })
    }

    pub fn from_base64(input: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(input.trim())
            .map_err(|_| Error::new("PSSH is not valid base64"))?;
        Self::from_bytes(&bytes)
    }
}
