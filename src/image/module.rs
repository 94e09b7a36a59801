//! The serialized module container the host hands to the load hook.

use crate::{
    utils::io::{read_bytes_at, read_u16_at, read_u32_at},
    Result,
};

/// Magic bytes at the start of every module image.
pub const MODULE_MAGIC: [u8; 4] = *b"LMOD";

/// The only container format version this crate understands.
pub const MODULE_FORMAT_VERSION: u16 = 1;

/// One named method inside a module image.
///
/// The body is kept in its encoded form; the interceptor only decodes the
/// bodies of methods it actually rewrites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodEntry {
    /// Method name as the host compiled it, e.g. `validateCertificateBinding`.
    pub name: String,
    /// Type descriptor string distinguishing overloads.
    pub descriptor: String,
    /// Encoded method body, parseable by [`crate::image::MethodBody::parse`].
    pub body: Vec<u8>,
}

/// A parsed module image: an ordered list of named methods.
///
/// Method order is preserved across a parse/serialize round trip so that an
/// untouched module re-encodes byte-exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleImage {
    /// Methods in their on-disk order.
    pub methods: Vec<MethodEntry>,
}

impl ModuleImage {
    /// Parses a serialized module image.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for a wrong magic, an unsupported
    /// format version or invalid UTF-8 in a name, and
    /// [`crate::Error::OutOfBounds`] for truncated input.
    pub fn parse(data: &[u8]) -> Result<ModuleImage> {
        let mut cursor = 0;

        let magic = read_bytes_at(data, &mut cursor, 4)?;
        if magic != MODULE_MAGIC {
            return Err(malformed_error!(
                "Invalid module magic - {:02X?}",
                magic
            ));
        }

        let version = read_u16_at(data, &mut cursor)?;
        if version != MODULE_FORMAT_VERSION {
            return Err(malformed_error!(
                "Unsupported module format version - {}",
                version
            ));
        }

        let method_count = read_u16_at(data, &mut cursor)?;
        let mut methods = Vec::with_capacity(usize::from(method_count));

        for _ in 0..method_count {
            let name = read_string(data, &mut cursor)?;
            let descriptor = read_string(data, &mut cursor)?;

            let body_len = read_u32_at(data, &mut cursor)? as usize;
            let body = read_bytes_at(data, &mut cursor, body_len)?.to_vec();

            methods.push(MethodEntry {
                name,
                descriptor,
                body,
            });
        }

        Ok(ModuleImage { methods })
    }

    /// Serializes the image back into the container format.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::Error::Malformed`] when a count or length exceeds
    /// the range its field can encode.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let method_count = u16::try_from(self.methods.len())
            .map_err(|_| malformed_error!("Module holds more than 65535 methods"))?;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MODULE_MAGIC);
        bytes.extend_from_slice(&MODULE_FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&method_count.to_le_bytes());

        for method in &self.methods {
            write_string(&mut bytes, &method.name)?;
            write_string(&mut bytes, &method.descriptor)?;

            let body_len = u32::try_from(method.body.len())
                .map_err(|_| malformed_error!("Method body size exceeds u32 range"))?;
            bytes.extend_from_slice(&body_len.to_le_bytes());
            bytes.extend_from_slice(&method.body);
        }

        Ok(bytes)
    }

    /// Looks up a method by name, ignoring the descriptor.
    ///
    /// The targeted methods have no overloads in practice; the first match
    /// wins if one ever appears.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodEntry> {
        self.methods.iter().find(|method| method.name == name)
    }

    /// Mutable variant of [`ModuleImage::method`].
    pub fn method_mut(&mut self, name: &str) -> Option<&mut MethodEntry> {
        self.methods.iter_mut().find(|method| method.name == name)
    }
}

fn read_string(data: &[u8], cursor: &mut usize) -> Result<String> {
    let len = read_u16_at(data, cursor)?;
    let bytes = read_bytes_at(data, cursor, usize::from(len))?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| malformed_error!("Invalid UTF-8 in module string"))
}

fn write_string(bytes: &mut Vec<u8>, value: &str) -> Result<()> {
    let len = u16::try_from(value.len())
        .map_err(|_| malformed_error!("String exceeds u16 length range"))?;
    bytes.extend_from_slice(&len.to_le_bytes());
    bytes.extend_from_slice(value.as_bytes());
    Ok(())
}
