//! Representation and parsing of compiled method bodies.
//!
//! Supports both header encodings: a one-byte tiny header for small bodies
//! with default limits, and a 12-byte fat header carrying flags, the maximum
//! stack depth, the code size and the local variable slot count, optionally
//! followed by a 4-aligned exception handler section.
//!
//! # Tiny format
//!
//! One byte: the low 2 bits are `0b10`, the upper 6 bits the code size. Only
//! available when the code is at most 63 bytes, the stack fits the default of
//! 8 slots and there are no locals and no handlers.
//!
//! # Fat format
//!
//! A little-endian `u16` whose low 2 bits are `0b11`, flags in the low 12
//! bits and the header size in u32 units in the top 4 bits, followed by
//! `u16 max_stack`, `u32 code_size` and `u32 local_slots`. When
//! [`MethodBodyFlags::MORE_SECTS`] is set, the code is followed (4-aligned)
//! by an exception handler section: kind byte, handler count, two reserved
//! bytes, then four `u16` offsets per handler.

use bitflags::bitflags;

use crate::{
    utils::io::{read_bytes_at, read_u16_at, read_u32_at, read_u8_at},
    Error::OutOfBounds,
    Result,
};

/// Default maximum stack depth implied by the tiny header.
const TINY_MAX_STACK: u16 = 8;

/// Largest code size the tiny header can express.
const TINY_MAX_CODE_SIZE: usize = 0x3F;

/// Fat header size in bytes (3 u32 units).
const FAT_HEADER_SIZE: usize = 12;

bitflags! {
    /// Method body header flags.
    ///
    /// The low 2 bits select the header format; the remaining bits are only
    /// meaningful for fat headers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodBodyFlags: u16 {
        /// Tiny header: code size packed into the remaining 6 bits.
        const TINY_FORMAT = 0x0002;
        /// Fat header: full 12-byte header.
        const FAT_FORMAT = 0x0003;
        /// An extra data section (exception handlers) follows the code.
        const MORE_SECTS = 0x0008;
        /// Local variable slots are zero-initialized before execution.
        const INIT_LOCALS = 0x0010;
    }
}

bitflags! {
    /// Kind flags for the data section following a fat body's code.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u8 {
        /// The section is an exception handler table.
        const EHTABLE = 0x01;
    }
}

/// One exception handler region.
///
/// All offsets and lengths are in bytes relative to the start of the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of the protected region.
    pub try_offset: u16,
    /// Length of the protected region.
    pub try_length: u16,
    /// Start of the handler code.
    pub handler_offset: u16,
    /// Length of the handler code.
    pub handler_length: u16,
}

/// The decoded, structurally editable form of one compiled method body.
///
/// A `MethodBody` is owned exclusively by whichever transformation is
/// rewriting it; transformations produce new bodies rather than mutating
/// shared state. Rewriting never changes the method's externally visible
/// signature - that lives in the surrounding [`crate::image::MethodEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBody {
    /// Maximum number of values on the evaluation stack.
    pub max_stack: u16,
    /// Number of local variable slots.
    pub local_slots: u16,
    /// Whether local slots are zero-initialized.
    pub init_locals: bool,
    /// The encoded instruction stream.
    pub code: Vec<u8>,
    /// Exception handler regions, possibly empty.
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Creates a body with no locals and no exception handlers.
    #[must_use]
    pub fn new(code: Vec<u8>, max_stack: u16) -> Self {
        MethodBody {
            max_stack,
            local_slots: 0,
            init_locals: false,
            code,
            exception_handlers: Vec::new(),
        }
    }

    /// Parses an encoded method body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Empty`] for empty input,
    /// [`crate::Error::OutOfBounds`] for truncated input and
    /// [`crate::Error::Malformed`] for unknown header formats or section
    /// kinds.
    pub fn parse(data: &[u8]) -> Result<MethodBody> {
        if data.is_empty() {
            return Err(crate::Error::Empty);
        }

        let first_byte = data[0];
        match MethodBodyFlags::from_bits_truncate(u16::from(first_byte & 0b0000_0011)) {
            MethodBodyFlags::TINY_FORMAT => {
                let size_code = (first_byte >> 2) as usize;
                if 1 + size_code > data.len() {
                    return Err(OutOfBounds);
                }

                Ok(MethodBody {
                    max_stack: TINY_MAX_STACK,
                    local_slots: 0,
                    init_locals: false,
                    code: data[1..1 + size_code].to_vec(),
                    exception_handlers: Vec::new(),
                })
            }
            MethodBodyFlags::FAT_FORMAT => {
                let mut cursor = 0;
                let first_duo = read_u16_at(data, &mut cursor)?;

                let size_header = usize::from(first_duo >> 12) * 4;
                if size_header != FAT_HEADER_SIZE {
                    return Err(malformed_error!(
                        "Unexpected fat header size - {} bytes",
                        size_header
                    ));
                }

                let flags = MethodBodyFlags::from_bits_truncate(first_duo & 0x0FFF);
                let max_stack = read_u16_at(data, &mut cursor)?;
                let size_code = read_u32_at(data, &mut cursor)? as usize;
                let local_slots_raw = read_u32_at(data, &mut cursor)?;
                let local_slots = u16::try_from(local_slots_raw)
                    .map_err(|_| malformed_error!("Local slot count exceeds u16 range"))?;

                let code = read_bytes_at(data, &mut cursor, size_code)?.to_vec();

                let mut exception_handlers = Vec::new();
                if flags.contains(MethodBodyFlags::MORE_SECTS) {
                    // Section starts at the next 4-byte boundary after the code
                    cursor = (cursor + 3) & !3;

                    let kind = SectionFlags::from_bits_truncate(read_u8_at(data, &mut cursor)?);
                    if !kind.contains(SectionFlags::EHTABLE) {
                        return Err(malformed_error!(
                            "Unknown data section kind - 0x{:02X}",
                            kind.bits()
                        ));
                    }

                    let count = read_u8_at(data, &mut cursor)?;
                    let _reserved = read_u16_at(data, &mut cursor)?;

                    for _ in 0..count {
                        exception_handlers.push(ExceptionHandler {
                            try_offset: read_u16_at(data, &mut cursor)?,
                            try_length: read_u16_at(data, &mut cursor)?,
                            handler_offset: read_u16_at(data, &mut cursor)?,
                            handler_length: read_u16_at(data, &mut cursor)?,
                        });
                    }
                }

                Ok(MethodBody {
                    max_stack,
                    local_slots,
                    init_locals: flags.contains(MethodBodyFlags::INIT_LOCALS),
                    code,
                    exception_handlers,
                })
            }
            _ => Err(malformed_error!(
                "Method header is neither FAT nor TINY - {}",
                first_byte
            )),
        }
    }

    /// Encodes the body, choosing the tiny header when eligible.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::Error::Malformed`] when the code size exceeds the
    /// u32 range or more than 255 exception handlers are present.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.is_tiny_eligible() {
            // Code size fits 6 bits by eligibility
            #[allow(clippy::cast_possible_truncation)]
            let first_byte = ((self.code.len() as u8) << 2) | 0b0000_0010;
            let mut bytes = Vec::with_capacity(1 + self.code.len());
            bytes.push(first_byte);
            bytes.extend_from_slice(&self.code);
            return Ok(bytes);
        }

        let size_code = u32::try_from(self.code.len())
            .map_err(|_| malformed_error!("Method body size exceeds u32 range"))?;

        let mut flags = MethodBodyFlags::FAT_FORMAT;
        if self.init_locals {
            flags |= MethodBodyFlags::INIT_LOCALS;
        }
        if !self.exception_handlers.is_empty() {
            flags |= MethodBodyFlags::MORE_SECTS;
        }

        // Header size in u32 units goes into the top 4 bits
        let first_duo = flags.bits() | ((FAT_HEADER_SIZE as u16 / 4) << 12);

        let mut bytes = Vec::with_capacity(FAT_HEADER_SIZE + self.code.len());
        bytes.extend_from_slice(&first_duo.to_le_bytes());
        bytes.extend_from_slice(&self.max_stack.to_le_bytes());
        bytes.extend_from_slice(&size_code.to_le_bytes());
        bytes.extend_from_slice(&u32::from(self.local_slots).to_le_bytes());
        bytes.extend_from_slice(&self.code);

        if !self.exception_handlers.is_empty() {
            while bytes.len() % 4 != 0 {
                bytes.push(0x00);
            }

            let count = u8::try_from(self.exception_handlers.len())
                .map_err(|_| malformed_error!("More than 255 exception handlers"))?;
            bytes.push(SectionFlags::EHTABLE.bits());
            bytes.push(count);
            bytes.extend_from_slice(&0u16.to_le_bytes());

            for handler in &self.exception_handlers {
                bytes.extend_from_slice(&handler.try_offset.to_le_bytes());
                bytes.extend_from_slice(&handler.try_length.to_le_bytes());
                bytes.extend_from_slice(&handler.handler_offset.to_le_bytes());
                bytes.extend_from_slice(&handler.handler_length.to_le_bytes());
            }
        }

        Ok(bytes)
    }

    /// Returns a new body with `prologue` spliced ahead of the existing code.
    ///
    /// The splice preserves the method's frame shape: exception handler
    /// offsets are shifted by the prologue length, and the stack reservation
    /// becomes the larger of the original and the prologue's requirement.
    /// Branches inside the original code are displacement-relative and need
    /// no adjustment. The original body is not modified.
    ///
    /// # Arguments
    ///
    /// * `prologue` - Encoded instructions to run before the original code
    /// * `prologue_stack` - Maximum stack depth the prologue needs
    ///
    /// # Errors
    ///
    /// Fails with [`crate::Error::Malformed`] when a shifted handler offset
    /// no longer fits the 16-bit encoding.
    pub fn splice_prologue(&self, prologue: &[u8], prologue_stack: u16) -> Result<MethodBody> {
        let shift = u16::try_from(prologue.len())
            .map_err(|_| malformed_error!("Prologue exceeds 16-bit offset range"))?;

        let mut exception_handlers = Vec::with_capacity(self.exception_handlers.len());
        for handler in &self.exception_handlers {
            let try_offset = handler
                .try_offset
                .checked_add(shift)
                .ok_or_else(|| malformed_error!("Shifted try offset exceeds u16 range"))?;
            let handler_offset = handler
                .handler_offset
                .checked_add(shift)
                .ok_or_else(|| malformed_error!("Shifted handler offset exceeds u16 range"))?;
            exception_handlers.push(ExceptionHandler {
                try_offset,
                try_length: handler.try_length,
                handler_offset,
                handler_length: handler.handler_length,
            });
        }

        let mut code = Vec::with_capacity(prologue.len() + self.code.len());
        code.extend_from_slice(prologue);
        code.extend_from_slice(&self.code);

        Ok(MethodBody {
            max_stack: self.max_stack.max(prologue_stack),
            local_slots: self.local_slots,
            init_locals: self.init_locals,
            code,
            exception_handlers,
        })
    }

    /// Whether the body fits the tiny header encoding.
    fn is_tiny_eligible(&self) -> bool {
        self.code.len() <= TINY_MAX_CODE_SIZE
            && self.max_stack <= TINY_MAX_STACK
            && self.local_slots == 0
            && !self.init_locals
            && self.exception_handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fat_body() -> MethodBody {
        MethodBody {
            max_stack: 16,
            local_slots: 2,
            init_locals: true,
            code: vec![0x00; 70],
            exception_handlers: vec![ExceptionHandler {
                try_offset: 4,
                try_length: 10,
                handler_offset: 14,
                handler_length: 6,
            }],
        }
    }

    #[test]
    fn test_tiny_roundtrip() {
        let body = MethodBody::new(vec![0x02, 0x0A], 1);
        let bytes = body.to_bytes().unwrap();

        // Tiny header: (2 << 2) | 0b10
        assert_eq!(bytes[0], 0x0A);
        assert_eq!(bytes.len(), 3);

        let parsed = MethodBody::parse(&bytes).unwrap();
        assert_eq!(parsed.code, body.code);
        assert_eq!(parsed.max_stack, 8);
        assert_eq!(parsed.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_fat_roundtrip() {
        let body = fat_body();
        let bytes = body.to_bytes().unwrap();

        // Fat format flags in the first u16
        let first_duo = u16::from_le_bytes([bytes[0], bytes[1]]);
        assert_eq!(first_duo & 0x0003, 0x0003);
        assert_eq!(first_duo >> 12, 3);

        let parsed = MethodBody::parse(&bytes).unwrap();
        assert_eq!(parsed, body);
        assert_eq!(parsed.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_fat_forced_by_stack_depth() {
        let body = MethodBody::new(vec![0x00; 4], 9);
        let bytes = body.to_bytes().unwrap();
        assert_eq!(bytes.len(), 12 + 4);

        let parsed = MethodBody::parse(&bytes).unwrap();
        assert_eq!(parsed.max_stack, 9);
    }

    #[test]
    fn test_fat_forced_by_code_size() {
        let body = MethodBody::new(vec![0x00; 64], 2);
        let bytes = body.to_bytes().unwrap();
        let first_duo = u16::from_le_bytes([bytes[0], bytes[1]]);
        assert_eq!(first_duo & 0x0003, 0x0003);
    }

    #[test]
    fn test_parse_empty() {
        assert!(matches!(MethodBody::parse(&[]), Err(crate::Error::Empty)));
    }

    #[test]
    fn test_parse_unknown_format() {
        // Low bits 0b00 are neither tiny nor fat
        assert!(MethodBody::parse(&[0x00]).is_err());
    }

    #[test]
    fn test_parse_truncated_tiny() {
        // Claims 4 bytes of code, provides 1
        assert!(matches!(
            MethodBody::parse(&[0b0001_0010, 0x00]),
            Err(crate::Error::OutOfBounds)
        ));
    }

    #[test]
    fn test_parse_truncated_fat() {
        let bytes = fat_body().to_bytes().unwrap();
        assert!(MethodBody::parse(&bytes[..bytes.len() - 4]).is_err());
    }

    #[test]
    fn test_splice_prologue_shifts_handlers() {
        let body = fat_body();
        let prologue = [0x00, 0x00, 0x00, 0x00, 0x00]; // 5 bytes
        let spliced = body.splice_prologue(&prologue, 2).unwrap();

        assert_eq!(spliced.code.len(), body.code.len() + 5);
        assert_eq!(&spliced.code[..5], &prologue);
        assert_eq!(spliced.exception_handlers[0].try_offset, 9);
        assert_eq!(spliced.exception_handlers[0].handler_offset, 19);
        assert_eq!(spliced.exception_handlers[0].try_length, 10);
        // Stack reservation keeps the larger requirement
        assert_eq!(spliced.max_stack, 16);
        // Locals are untouched
        assert_eq!(spliced.local_slots, 2);
        assert!(spliced.init_locals);
    }

    #[test]
    fn test_splice_prologue_raises_stack() {
        let body = MethodBody::new(vec![0x0B], 1);
        let spliced = body.splice_prologue(&[0x00], 4).unwrap();
        assert_eq!(spliced.max_stack, 4);
    }

    #[test]
    fn test_splice_does_not_modify_original() {
        let body = fat_body();
        let before = body.clone();
        let _ = body.splice_prologue(&[0x00], 1).unwrap();
        assert_eq!(body, before);
    }
}
