//! User/template upload bundles
//!
//! CMD_SAVE_USERTEMPS applies a buffer uploaded beforehand:
//!
//! ```text
//! [upack_size u32][table_size u32][fpack_size u32][upack][table][fpack]
//! ```
//!
//! `upack` holds user records. `table` holds 8-byte entries
//! `type i8, uid u16, finger i8, offset u32` pointing into `fpack`; a template
//! runs up to the next entry's offset, the last one to the end of `fpack`.

use byteorder::{ByteOrder, LittleEndian};
use zkwire_types::{user::decode_users, Error, Result, TemplateRecord, UserLayout, UserRecord};

const TABLE_ENTRY_SIZE: usize = 8;
const ENTRY_FINGERPRINT: u8 = 2;
const FINGER_BASE: u8 = 0x10;

/// Records carried by one upload
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Bundle {
    pub users: Vec<UserRecord>,
    pub templates: Vec<TemplateRecord>,
}

pub fn parse_bundle(data: &[u8]) -> Result<Bundle> {
    let header = data.get(..12).ok_or(Error::MalformedRecord {
        record: "upload bundle",
        expected: 12,
        actual: data.len(),
    })?;
    let upack_size = LittleEndian::read_u32(&header[0..4]) as usize;
    let table_size = LittleEndian::read_u32(&header[4..8]) as usize;
    let fpack_size = LittleEndian::read_u32(&header[8..12]) as usize;

    let total = 12 + upack_size + table_size + fpack_size;
    if data.len() < total {
        return Err(Error::MalformedRecord {
            record: "upload bundle",
            expected: total,
            actual: data.len(),
        });
    }

    let upack = &data[12..12 + upack_size];
    let table = &data[12 + upack_size..12 + upack_size + table_size];
    let fpack = &data[12 + upack_size + table_size..total];

    let users = if upack.is_empty() {
        Vec::new()
    } else {
        decode_users(upack, UserLayout::detect(upack.len()))?
    };

    let entries: Vec<&[u8]> = table.chunks_exact(TABLE_ENTRY_SIZE).collect();
    let mut templates = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        if entry[0] != ENTRY_FINGERPRINT {
            continue;
        }
        let uid = LittleEndian::read_u16(&entry[1..3]);
        let finger_index = entry[3].wrapping_sub(FINGER_BASE);
        let start = LittleEndian::read_u32(&entry[4..8]) as usize;
        let end = entries
            .get(i + 1)
            .map_or(fpack.len(), |next| LittleEndian::read_u32(&next[4..8]) as usize);

        let bytes = fpack.get(start..end).ok_or_else(|| {
            Error::Validation(format!(
                "template {start}..{end} outside {} byte template pack",
                fpack.len()
            ))
        })?;
        templates.push(TemplateRecord::new(uid, finger_index, bytes)?);
    }

    Ok(Bundle { users, templates })
}
