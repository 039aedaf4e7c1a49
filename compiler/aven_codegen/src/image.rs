//! Stable `.avc` serialization for [`CompiledModule`].
//!
//! Design goals:
//! - Portable, explicit encoding: little-endian, fixed-width integers,
//!   length-prefixed strings, tagged constants.
//! - Deterministic output: `encode -> decode -> encode` is byte-identical,
//!   which the content-addressed output cache depends on.
//! - Versioned: a loader built against a different format version refuses
//!   the file instead of misinterpreting it.

use aven_ir::Location;

use crate::code::{CaptureSource, CatchRange, CompiledCode, CompiledModule, Constant, Instruction};

const MAGIC: &[u8; 4] = b"AVBC";
const VERSION_MAJOR: u16 = 1;
const VERSION_MINOR: u16 = 0;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct EncodeError {
    pub message: String,
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "encode error: {}", self.message)
    }
}

impl std::error::Error for EncodeError {}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DecodeError {
    pub message: String,
    pub offset: usize,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "decode error at byte {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for DecodeError {}

/// Serialize a compiled module to its on-disk byte form.
pub fn to_bytes(module: &CompiledModule) -> Result<Vec<u8>, EncodeError> {
    let mut enc = Encoder::new();
    enc.write_bytes(MAGIC);
    enc.write_u16(VERSION_MAJOR);
    enc.write_u16(VERSION_MINOR);
    enc.write_module(module)?;
    Ok(enc.finish())
}

/// Load a compiled module from its on-disk byte form, refusing a version
/// mismatch and trailing garbage.
pub fn from_bytes(bytes: &[u8]) -> Result<CompiledModule, DecodeError> {
    let mut dec = Decoder::new(bytes);
    dec.expect_bytes(MAGIC)?;
    let major = dec.read_u16()?;
    let minor = dec.read_u16()?;
    if major != VERSION_MAJOR || minor != VERSION_MINOR {
        return Err(dec.err(format!(
            "unsupported image version {major}.{minor} (expected {VERSION_MAJOR}.{VERSION_MINOR})"
        )));
    }

    let module = dec.read_module()?;
    if dec.remaining() != 0 {
        return Err(dec.err("trailing bytes".to_string()));
    }
    Ok(module)
}

struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_bits().to_le_bytes());
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    fn write_len(&mut self, len: usize) -> Result<(), EncodeError> {
        let len: u32 = len.try_into().map_err(|_| EncodeError {
            message: "length overflow".to_string(),
        })?;
        self.write_u32(len);
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<(), EncodeError> {
        self.write_len(s.len())?;
        self.write_bytes(s.as_bytes());
        Ok(())
    }

    fn write_regs(&mut self, regs: &[u32]) -> Result<(), EncodeError> {
        self.write_len(regs.len())?;
        for reg in regs {
            self.write_u32(*reg);
        }
        Ok(())
    }

    fn write_module(&mut self, module: &CompiledModule) -> Result<(), EncodeError> {
        self.write_string(&module.name)?;
        self.write_len(module.imports.len())?;
        for import in &module.imports {
            self.write_string(import)?;
        }
        self.write_code(&module.body)
    }

    fn write_code(&mut self, code: &CompiledCode) -> Result<(), EncodeError> {
        self.write_string(&code.name)?;
        self.write_u32(code.registers);
        self.write_u32(code.locals);
        self.write_u32(code.arguments);
        self.write_u32(code.required_arguments);
        self.write_bool(code.rest_argument);

        self.write_len(code.captures.len())?;
        for capture in &code.captures {
            match capture {
                CaptureSource::Local(slot) => {
                    self.write_u8(0);
                    self.write_u32(*slot);
                }
                CaptureSource::Outer(index) => {
                    self.write_u8(1);
                    self.write_u32(*index);
                }
            }
        }

        self.write_len(code.instructions.len())?;
        for instruction in &code.instructions {
            self.write_instruction(instruction)?;
        }
        for location in &code.locations {
            self.write_u32(location.line);
            self.write_u32(location.column);
        }

        self.write_len(code.literals.len())?;
        for literal in &code.literals {
            match literal {
                Constant::Int(value) => {
                    self.write_u8(0);
                    self.write_i64(*value);
                }
                Constant::Float(value) => {
                    self.write_u8(1);
                    self.write_f64(*value);
                }
                Constant::String(value) => {
                    self.write_u8(2);
                    self.write_string(value)?;
                }
                Constant::Code(nested) => {
                    self.write_u8(3);
                    self.write_code(nested)?;
                }
            }
        }

        self.write_len(code.catch_table.len())?;
        for entry in &code.catch_table {
            self.write_u32(entry.start);
            self.write_u32(entry.end);
            self.write_u32(entry.handler);
            self.write_u32(entry.register);
        }
        Ok(())
    }

    fn write_instruction(&mut self, instruction: &Instruction) -> Result<(), EncodeError> {
        match instruction {
            Instruction::LoadLiteral { dst, literal } => {
                self.write_u8(0);
                self.write_u32(*dst);
                self.write_u32(*literal);
            }
            Instruction::LoadBool { dst, value } => {
                self.write_u8(1);
                self.write_u32(*dst);
                self.write_bool(*value);
            }
            Instruction::LoadNil { dst } => {
                self.write_u8(2);
                self.write_u32(*dst);
            }
            Instruction::LoadSelf { dst } => {
                self.write_u8(3);
                self.write_u32(*dst);
            }
            Instruction::LoadType { dst, name } => {
                self.write_u8(4);
                self.write_u32(*dst);
                self.write_u32(*name);
            }
            Instruction::GetLocal { dst, local } => {
                self.write_u8(5);
                self.write_u32(*dst);
                self.write_u32(*local);
            }
            Instruction::SetLocal { local, src } => {
                self.write_u8(6);
                self.write_u32(*local);
                self.write_u32(*src);
            }
            Instruction::GetGlobal { dst, global } => {
                self.write_u8(7);
                self.write_u32(*dst);
                self.write_u32(*global);
            }
            Instruction::SetGlobal { global, src } => {
                self.write_u8(8);
                self.write_u32(*global);
                self.write_u32(*src);
            }
            Instruction::GetAttribute {
                dst,
                receiver,
                name,
            } => {
                self.write_u8(9);
                self.write_u32(*dst);
                self.write_u32(*receiver);
                self.write_u32(*name);
            }
            Instruction::SetAttribute {
                receiver,
                name,
                src,
            } => {
                self.write_u8(10);
                self.write_u32(*receiver);
                self.write_u32(*name);
                self.write_u32(*src);
            }
            Instruction::Send {
                dst,
                receiver,
                name,
                args,
            } => {
                self.write_u8(11);
                self.write_u32(*dst);
                self.write_u32(*receiver);
                self.write_u32(*name);
                self.write_regs(args)?;
            }
            Instruction::Allocate { dst, name } => {
                self.write_u8(12);
                self.write_u32(*dst);
                self.write_u32(*name);
            }
            Instruction::Array { dst, items } => {
                self.write_u8(13);
                self.write_u32(*dst);
                self.write_regs(items)?;
            }
            Instruction::Map { dst, pairs } => {
                self.write_u8(14);
                self.write_u32(*dst);
                self.write_regs(pairs)?;
            }
            Instruction::Move { dst, src } => {
                self.write_u8(15);
                self.write_u32(*dst);
                self.write_u32(*src);
            }
            Instruction::Branch {
                condition,
                then_pc,
                else_pc,
            } => {
                self.write_u8(16);
                self.write_u32(*condition);
                self.write_u32(*then_pc);
                self.write_u32(*else_pc);
            }
            Instruction::Jump { target_pc } => {
                self.write_u8(17);
                self.write_u32(*target_pc);
            }
            Instruction::Return { src } => {
                self.write_u8(18);
                self.write_u32(*src);
            }
            Instruction::Throw { src } => {
                self.write_u8(19);
                self.write_u32(*src);
            }
            Instruction::GetCapture { dst, capture } => {
                self.write_u8(20);
                self.write_u32(*dst);
                self.write_u32(*capture);
            }
            Instruction::SetCapture { capture, src } => {
                self.write_u8(21);
                self.write_u32(*capture);
                self.write_u32(*src);
            }
        }
        Ok(())
    }
}

struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn err(&self, message: String) -> DecodeError {
        DecodeError {
            message,
            offset: self.pos,
        }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(self.err(format!("unexpected end of input (wanted {n} bytes)")));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn expect_bytes(&mut self, expected: &[u8]) -> Result<(), DecodeError> {
        let actual = self.take(expected.len())?;
        if actual != expected {
            return Err(self.err("bad magic".to_string()));
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i64(&mut self) -> Result<i64, DecodeError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(i64::from_le_bytes(raw))
    }

    fn read_f64(&mut self) -> Result<f64, DecodeError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_bits(u64::from_le_bytes(raw)))
    }

    fn read_bool(&mut self) -> Result<bool, DecodeError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.err(format!("invalid boolean byte {other}"))),
        }
    }

    fn read_len(&mut self) -> Result<usize, DecodeError> {
        Ok(self.read_u32()? as usize)
    }

    fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_len()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| self.err("invalid utf-8".to_string()))
    }

    fn read_regs(&mut self) -> Result<Vec<u32>, DecodeError> {
        let len = self.read_len()?;
        let mut regs = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            regs.push(self.read_u32()?);
        }
        Ok(regs)
    }

    fn read_module(&mut self) -> Result<CompiledModule, DecodeError> {
        let name = self.read_string()?;
        let import_count = self.read_len()?;
        let mut imports = Vec::with_capacity(import_count.min(1024));
        for _ in 0..import_count {
            imports.push(self.read_string()?);
        }
        let body = self.read_code()?;
        Ok(CompiledModule {
            name,
            imports,
            body,
        })
    }

    fn read_code(&mut self) -> Result<CompiledCode, DecodeError> {
        let name = self.read_string()?;
        let registers = self.read_u32()?;
        let locals = self.read_u32()?;
        let arguments = self.read_u32()?;
        let required_arguments = self.read_u32()?;
        let rest_argument = self.read_bool()?;

        let capture_count = self.read_len()?;
        let mut captures = Vec::with_capacity(capture_count.min(1024));
        for _ in 0..capture_count {
            let capture = match self.read_u8()? {
                0 => CaptureSource::Local(self.read_u32()?),
                1 => CaptureSource::Outer(self.read_u32()?),
                other => return Err(self.err(format!("invalid capture tag {other}"))),
            };
            captures.push(capture);
        }

        let count = self.read_len()?;
        let mut instructions = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            instructions.push(self.read_instruction()?);
        }
        let mut locations = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let line = self.read_u32()?;
            let column = self.read_u32()?;
            locations.push(Location::new(line, column));
        }

        let literal_count = self.read_len()?;
        let mut literals = Vec::with_capacity(literal_count.min(4096));
        for _ in 0..literal_count {
            let literal = match self.read_u8()? {
                0 => Constant::Int(self.read_i64()?),
                1 => Constant::Float(self.read_f64()?),
                2 => Constant::String(self.read_string()?),
                3 => Constant::Code(Box::new(self.read_code()?)),
                other => return Err(self.err(format!("invalid constant tag {other}"))),
            };
            literals.push(literal);
        }

        let catch_count = self.read_len()?;
        let mut catch_table = Vec::with_capacity(catch_count.min(1024));
        for _ in 0..catch_count {
            catch_table.push(CatchRange {
                start: self.read_u32()?,
                end: self.read_u32()?,
                handler: self.read_u32()?,
                register: self.read_u32()?,
            });
        }

        Ok(CompiledCode {
            name,
            instructions,
            locations,
            literals,
            registers,
            locals,
            arguments,
            required_arguments,
            rest_argument,
            captures,
            catch_table,
        })
    }

    fn read_instruction(&mut self) -> Result<Instruction, DecodeError> {
        let instruction = match self.read_u8()? {
            0 => Instruction::LoadLiteral {
                dst: self.read_u32()?,
                literal: self.read_u32()?,
            },
            1 => Instruction::LoadBool {
                dst: self.read_u32()?,
                value: self.read_bool()?,
            },
            2 => Instruction::LoadNil {
                dst: self.read_u32()?,
            },
            3 => Instruction::LoadSelf {
                dst: self.read_u32()?,
            },
            4 => Instruction::LoadType {
                dst: self.read_u32()?,
                name: self.read_u32()?,
            },
            5 => Instruction::GetLocal {
                dst: self.read_u32()?,
                local: self.read_u32()?,
            },
            6 => Instruction::SetLocal {
                local: self.read_u32()?,
                src: self.read_u32()?,
            },
            7 => Instruction::GetGlobal {
                dst: self.read_u32()?,
                global: self.read_u32()?,
            },
            8 => Instruction::SetGlobal {
                global: self.read_u32()?,
                src: self.read_u32()?,
            },
            9 => Instruction::GetAttribute {
                dst: self.read_u32()?,
                receiver: self.read_u32()?,
                name: self.read_u32()?,
            },
            10 => Instruction::SetAttribute {
                receiver: self.read_u32()?,
                name: self.read_u32()?,
                src: self.read_u32()?,
            },
            11 => Instruction::Send {
                dst: self.read_u32()?,
                receiver: self.read_u32()?,
                name: self.read_u32()?,
                args: self.read_regs()?,
            },
            12 => Instruction::Allocate {
                dst: self.read_u32()?,
                name: self.read_u32()?,
            },
            13 => Instruction::Array {
                dst: self.read_u32()?,
                items: self.read_regs()?,
            },
            14 => Instruction::Map {
                dst: self.read_u32()?,
                pairs: self.read_regs()?,
            },
            15 => Instruction::Move {
                dst: self.read_u32()?,
                src: self.read_u32()?,
            },
            16 => Instruction::Branch {
                condition: self.read_u32()?,
                then_pc: self.read_u32()?,
                else_pc: self.read_u32()?,
            },
            17 => Instruction::Jump {
                target_pc: self.read_u32()?,
            },
            18 => Instruction::Return {
                src: self.read_u32()?,
            },
            19 => Instruction::Throw {
                src: self.read_u32()?,
            },
            20 => Instruction::GetCapture {
                dst: self.read_u32()?,
                capture: self.read_u32()?,
            },
            21 => Instruction::SetCapture {
                capture: self.read_u32()?,
                src: self.read_u32()?,
            },
            other => return Err(self.err(format!("invalid instruction tag {other}"))),
        };
        Ok(instruction)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample_module() -> CompiledModule {
        let nested = CompiledCode {
            name: "main.closure#1".to_string(),
            instructions: vec![
                Instruction::GetCapture { dst: 0, capture: 0 },
                Instruction::Return { src: 0 },
            ],
            locations: vec![Location::new(2, 5), Location::new(2, 5)],
            literals: Vec::new(),
            registers: 1,
            locals: 0,
            arguments: 0,
            required_arguments: 0,
            rest_argument: false,
            captures: vec![CaptureSource::Local(0)],
            catch_table: Vec::new(),
        };
        let body = CompiledCode {
            name: "main".to_string(),
            instructions: vec![
                Instruction::LoadLiteral { dst: 0, literal: 0 },
                Instruction::LoadLiteral { dst: 1, literal: 2 },
                Instruction::Send {
                    dst: 2,
                    receiver: 0,
                    name: 1,
                    args: vec![1],
                },
                Instruction::Return { src: 2 },
            ],
            locations: vec![
                Location::new(1, 1),
                Location::new(1, 5),
                Location::new(1, 3),
                Location::new(1, 1),
            ],
            literals: vec![
                Constant::Int(42),
                Constant::String("call".to_string()),
                Constant::Code(Box::new(nested)),
            ],
            registers: 3,
            locals: 1,
            arguments: 0,
            required_arguments: 0,
            rest_argument: false,
            captures: Vec::new(),
            catch_table: vec![CatchRange {
                start: 0,
                end: 3,
                handler: 3,
                register: 2,
            }],
        };
        CompiledModule {
            name: "main".to_string(),
            imports: vec!["std::prelude".to_string()],
            body,
        }
    }

    #[test]
    fn test_round_trip_preserves_everything() {
        let module = sample_module();
        let bytes = match to_bytes(&module) {
            Ok(bytes) => bytes,
            Err(error) => panic!("{error}"),
        };
        let decoded = match from_bytes(&bytes) {
            Ok(decoded) => decoded,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(decoded, module);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let module = sample_module();
        let first = to_bytes(&module);
        let second = to_bytes(&module);
        assert_eq!(first, second);
    }

    #[test]
    fn test_version_mismatch_is_refused() {
        let module = sample_module();
        let mut bytes = match to_bytes(&module) {
            Ok(bytes) => bytes,
            Err(error) => panic!("{error}"),
        };
        // Bump the major version in place.
        bytes[4] = VERSION_MAJOR as u8 + 1;

        let result = from_bytes(&bytes);
        assert!(matches!(result, Err(DecodeError { .. })));
    }

    #[test]
    fn test_trailing_bytes_are_refused() {
        let module = sample_module();
        let mut bytes = match to_bytes(&module) {
            Ok(bytes) => bytes,
            Err(error) => panic!("{error}"),
        };
        bytes.push(0);

        let result = from_bytes(&bytes);
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_magic_is_refused() {
        let result = from_bytes(b"NOPE\x01\x00\x00\x00");
        assert!(result.is_err());
    }
}
