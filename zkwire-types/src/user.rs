//! User records
//!
//! Two fixed layouts exist in the field:
//!
//! | Layout   | Size | Fields |
//! |----------|------|--------|
//! | Extended | 72   | uid u16, privilege u8, password 8s, name 24s, card u32, pad, group 7s, pad, user_id 24s |
//! | Compact  | 28   | uid u16, privilege u8, password 5s, name 8s, card u32, pad, group u8, timezone u16, user_id u32 |

use std::fmt;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    error::{Error, Result},
    fields::{read_str, write_str},
};

/// User privilege level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Privilege {
    #[default]
    User,
    Enroller,
    Manager,
    Admin,
    /// Vendor-specific level
    Other(u8),
}

impl From<u8> for Privilege {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::User,
            2 => Self::Enroller,
            12 => Self::Manager,
            14 => Self::Admin,
            other => Self::Other(other),
        }
    }
}

impl From<Privilege> for u8 {
    fn from(value: Privilege) -> u8 {
        match value {
            Privilege::User => 0,
            Privilege::Enroller => 2,
            Privilege::Manager => 12,
            Privilege::Admin => 14,
            Privilege::Other(other) => other,
        }
    }
}

/// Binary user layout spoken by a terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum UserLayout {
    /// 28-byte record of older firmware
    Compact,
    /// 72-byte record
    #[default]
    Extended,
}

impl UserLayout {
    /// Record width in bytes
    pub const fn record_size(self) -> usize {
        match self {
            Self::Compact => 28,
            Self::Extended => 72,
        }
    }

    /// Guess the layout of a user data set body
    ///
    /// A body that divides into 72-byte records is taken as extended.
    pub fn detect(body_len: usize) -> Self {
        if body_len >= 72 && body_len % 72 == 0 {
            Self::Extended
        } else {
            Self::Compact
        }
    }
}

/// A user enrolled on the terminal
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UserRecord {
    /// Internal slot number, unique per device
    pub uid: u16,
    /// Enrollment number shown to people
    pub user_id: String,
    pub name: String,
    pub privilege: Privilege,
    pub password: String,
    pub card_number: u32,
    pub group_id: String,
}

impl UserRecord {
    /// Create a plain user whose enrollment number equals its uid
    pub fn new(uid: u16, name: impl Into<String>) -> Self {
        Self {
            uid,
            user_id: uid.to_string(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = privilege;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_card(mut self, card_number: u32) -> Self {
        self.card_number = card_number;
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    /// Decode one record
    ///
    /// # Errors
    ///
    /// [`Error::MalformedRecord`] if `data` is shorter than the layout.
    pub fn decode(data: &[u8], layout: UserLayout) -> Result<Self> {
        let size = layout.record_size();
        if data.len() < size {
            return Err(Error::MalformedRecord {
                record: "user",
                expected: size,
                actual: data.len(),
            });
        }

        let mut cur = Cursor::new(&data[..size]);
        let parsed = match layout {
            UserLayout::Extended => decode_extended(&mut cur),
            UserLayout::Compact => decode_compact(&mut cur),
        };
        parsed.map_err(|e| Error::Parse(e.to_string()))
    }

    /// Encode one record
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if a field does not fit its slot, or, for the
    /// compact layout, if `user_id` / `group_id` are not numeric.
    pub fn encode(&self, layout: UserLayout) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(layout.record_size());
        out.write_u16::<LittleEndian>(self.uid)?;
        out.write_u8(self.privilege.into())?;

        match layout {
            UserLayout::Extended => {
                write_str(&mut out, &self.password, 8, "password")?;
                write_str(&mut out, &self.name, 24, "name")?;
                out.write_u32::<LittleEndian>(self.card_number)?;
                out.write_u8(0)?;
                write_str(&mut out, &self.group_id, 7, "group_id")?;
                out.write_u8(0)?;
                write_str(&mut out, &self.user_id, 24, "user_id")?;
            }
            UserLayout::Compact => {
                write_str(&mut out, &self.password, 5, "password")?;
                write_str(&mut out, &self.name, 8, "name")?;
                out.write_u32::<LittleEndian>(self.card_number)?;
                out.write_u8(0)?;
                out.write_u8(parse_numeric(&self.group_id, "group_id")?)?;
                out.write_u16::<LittleEndian>(0)?;
                out.write_u32::<LittleEndian>(parse_numeric(&self.user_id, "user_id")?)?;
            }
        }

        Ok(out)
    }
}

fn parse_numeric<T: std::str::FromStr + Default>(value: &str, field: &str) -> Result<T> {
    if value.is_empty() {
        return Ok(T::default());
    }
    value
        .parse()
        .map_err(|_| Error::Validation(format!("{field} '{value}' must be numeric in the compact layout")))
}

fn read_slot(cur: &mut Cursor<&[u8]>, width: usize) -> std::io::Result<String> {
    let mut slot = vec![0u8; width];
    cur.read_exact(&mut slot)?;
    Ok(read_str(&slot))
}

fn decode_extended(cur: &mut Cursor<&[u8]>) -> std::io::Result<UserRecord> {
    let uid = cur.read_u16::<LittleEndian>()?;
    let privilege = Privilege::from(cur.read_u8()?);
    let password = read_slot(cur, 8)?;
    let name = read_slot(cur, 24)?;
    let card_number = cur.read_u32::<LittleEndian>()?;
    cur.read_u8()?;
    let group_id = read_slot(cur, 7)?;
    cur.read_u8()?;
    let user_id = read_slot(cur, 24)?;

    Ok(UserRecord {
        uid,
        user_id,
        name,
        privilege,
        password,
        card_number,
        group_id,
    })
}

fn decode_compact(cur: &mut Cursor<&[u8]>) -> std::io::Result<UserRecord> {
    let uid = cur.read_u16::<LittleEndian>()?;
    let privilege = Privilege::from(cur.read_u8()?);
    let password = read_slot(cur, 5)?;
    let name = read_slot(cur, 8)?;
    let card_number = cur.read_u32::<LittleEndian>()?;
    cur.read_u8()?;
    let group = cur.read_u8()?;
    let _timezone = cur.read_u16::<LittleEndian>()?;
    let user_id = cur.read_u32::<LittleEndian>()?;

    Ok(UserRecord {
        uid,
        user_id: user_id.to_string(),
        name,
        privilege,
        password,
        card_number,
        group_id: group.to_string(),
    })
}

/// Decode a user data set body (size prefix already stripped)
///
/// # Errors
///
/// [`Error::MalformedRecord`] when a trailing slot is narrower than a record.
pub fn decode_users(body: &[u8], layout: UserLayout) -> Result<Vec<UserRecord>> {
    let size = layout.record_size();
    let mut chunks = body.chunks_exact(size);
    let users = chunks
        .by_ref()
        .map(|chunk| UserRecord::decode(chunk, layout))
        .collect::<Result<Vec<_>>>()?;

    let rest = chunks.remainder();
    if !rest.is_empty() {
        return Err(Error::MalformedRecord {
            record: "user",
            expected: size,
            actual: rest.len(),
        });
    }
    Ok(users)
}

/// Encode users back to back
pub fn encode_users(users: &[UserRecord], layout: UserLayout) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(users.len() * layout.record_size());
    for user in users {
        out.extend_from_slice(&user.encode(layout)?);
    }
    Ok(out)
}

impl fmt::Display for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "User[uid: {}, id: {}, name: {}, privilege: {:?}]",
            self.uid, self.user_id, self.name, self.privilege
        )
    }
}
