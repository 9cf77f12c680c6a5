//! Fingerprint template records
//!
//! On the wire a template is `size u16, uid u16, finger i8, valid i8` followed
//! by the template bytes, where `size` counts the 6-byte header too.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Header bytes in front of each template
pub const TEMPLATE_HEADER_SIZE: usize = 6;

/// A stored fingerprint template
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TemplateRecord {
    pub uid: u16,
    /// Finger slot, 0..=9
    pub finger_index: u8,
    pub valid: bool,
    pub template: Vec<u8>,
}

impl TemplateRecord {
    pub fn new(uid: u16, finger_index: u8, template: impl Into<Vec<u8>>) -> Result<Self> {
        if finger_index > 9 {
            return Err(Error::Validation(format!(
                "finger index {} out of range 0..=9",
                finger_index
            )));
        }
        Ok(Self {
            uid,
            finger_index,
            valid: true,
            template: template.into(),
        })
    }

    /// Encoded size including the header
    pub fn size(&self) -> usize {
        self.template.len() + TEMPLATE_HEADER_SIZE
    }

    /// Encode header and template bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        let size = u16::try_from(self.size()).map_err(|_| {
            Error::Validation(format!("template of {} bytes is too large", self.template.len()))
        })?;

        let mut out = vec![0u8; TEMPLATE_HEADER_SIZE];
        LittleEndian::write_u16(&mut out[0..2], size);
        LittleEndian::write_u16(&mut out[2..4], self.uid);
        out[4] = self.finger_index;
        out[5] = u8::from(self.valid);
        out.extend_from_slice(&self.template);
        Ok(out)
    }
}

/// Decode the template at the front of `data`
///
/// Returns the record and the number of bytes consumed.
pub fn decode_template(data: &[u8]) -> Result<(TemplateRecord, usize)> {
    if data.len() < TEMPLATE_HEADER_SIZE {
        return Err(Error::MalformedRecord {
            record: "template",
            expected: TEMPLATE_HEADER_SIZE,
            actual: data.len(),
        });
    }

    let size = LittleEndian::read_u16(&data[0..2]) as usize;
    if size < TEMPLATE_HEADER_SIZE || data.len() < size {
        return Err(Error::MalformedRecord {
            record: "template",
            expected: size.max(TEMPLATE_HEADER_SIZE),
            actual: data.len(),
        });
    }

    let record = TemplateRecord {
        uid: LittleEndian::read_u16(&data[2..4]),
        finger_index: data[4],
        valid: data[5] != 0,
        template: data[TEMPLATE_HEADER_SIZE..size].to_vec(),
    };
    Ok((record, size))
}

/// Decode a template data set body (size prefix already stripped)
pub fn decode_templates(mut body: &[u8]) -> Result<Vec<TemplateRecord>> {
    let mut templates = Vec::new();
    while !body.is_empty() {
        let (record, used) = decode_template(body)?;
        templates.push(record);
        body = &body[used..];
    }
    Ok(templates)
}

/// Encode templates back to back
pub fn encode_templates(templates: &[TemplateRecord]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for template in templates {
        out.extend_from_slice(&template.encode()?);
    }
    Ok(out)
}
