//! IR → bytecode lowering.
//!
//! Blocks are concatenated in id order (entry first; the builder creates
//! join blocks after their predecessors, so forward control flow stays
//! forward). Branch targets become absolute instruction offsets resolved in
//! a first pass; `CatchStart`/`CatchEnd` markers are consumed here to
//! compute catch-table offsets and are never emitted.

use aven_ir::SharedInterner;
use aven_mir::{Capture, IrArena, IrUnit, Op, UnitId};
use rustc_hash::FxHashMap;

use crate::code::{CaptureSource, CatchRange, CompiledCode, CompiledModule, Constant, Instruction};

/// A compiler defect detected while generating code from an IR unit: the
/// unit is inconsistent (dangling block, register used before definition)
/// and must not be lowered. This is not a user-facing diagnostic.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct InternalError {
    pub unit: String,
    pub message: String,
}

impl std::fmt::Display for InternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "internal error in unit `{}`: {}", self.unit, self.message)
    }
}

impl std::error::Error for InternalError {}

/// Generate the compiled record for a whole module.
#[tracing::instrument(level = "debug", skip_all, fields(module = name))]
pub fn generate_module(
    name: &str,
    imports: &[String],
    arena: &IrArena,
    root: UnitId,
    interner: &SharedInterner,
) -> Result<CompiledModule, InternalError> {
    let body = generate_unit(arena, root, interner)?;
    Ok(CompiledModule {
        name: name.to_string(),
        imports: imports.to_vec(),
        body,
    })
}

/// Generate one unit's compiled record, recursing into nested units
/// referenced from its literal pool.
pub fn generate_unit(
    arena: &IrArena,
    id: UnitId,
    interner: &SharedInterner,
) -> Result<CompiledCode, InternalError> {
    let unit = arena.get(id);
    verify(unit)?;

    // Final literal pool: IR entries keep their indices, with nested units
    // inlined; name strings are appended on demand, deduplicated.
    let mut pool = PoolBuilder::default();
    for literal in unit.literals.iter() {
        match literal {
            aven_mir::Literal::Int(value) => pool.constants.push(Constant::Int(*value)),
            aven_mir::Literal::Float(value) => pool.constants.push(Constant::Float(*value)),
            aven_mir::Literal::String(value) => {
                let index = pool.constants.len() as u32;
                pool.strings.insert(value.clone(), index);
                pool.constants.push(Constant::String(value.clone()));
            }
            aven_mir::Literal::Unit(nested) => {
                let code = generate_unit(arena, *nested, interner)?;
                pool.constants.push(Constant::Code(Box::new(code)));
            }
        }
    }

    // First pass: absolute offset of each block, markers excluded.
    let mut block_offsets = Vec::with_capacity(unit.blocks.len());
    let mut offset = 0u32;
    for block in &unit.blocks {
        block_offsets.push(offset);
        offset += block
            .instructions
            .iter()
            .filter(|ins| !matches!(ins.op, Op::CatchStart { .. } | Op::CatchEnd { .. }))
            .count() as u32;
    }

    // Second pass: emission with resolved targets and marker offsets.
    let mut instructions = Vec::with_capacity(offset as usize);
    let mut locations = Vec::with_capacity(offset as usize);
    let mut range_starts: FxHashMap<u32, u32> = FxHashMap::default();
    let mut range_ends: FxHashMap<u32, u32> = FxHashMap::default();

    for block in &unit.blocks {
        for ins in &block.instructions {
            let pc = instructions.len() as u32;
            let lowered = match &ins.op {
                Op::CatchStart { marker } => {
                    range_starts.insert(*marker, pc);
                    continue;
                }
                Op::CatchEnd { marker } => {
                    range_ends.insert(*marker, pc);
                    continue;
                }
                Op::LoadLiteral { dst, literal } => Instruction::LoadLiteral {
                    dst: dst.raw(),
                    literal: literal.raw(),
                },
                Op::LoadBool { dst, value } => Instruction::LoadBool {
                    dst: dst.raw(),
                    value: *value,
                },
                Op::LoadNil { dst } => Instruction::LoadNil { dst: dst.raw() },
                Op::LoadSelf { dst } => Instruction::LoadSelf { dst: dst.raw() },
                Op::LoadType { dst, name } => Instruction::LoadType {
                    dst: dst.raw(),
                    name: pool.string(interner.lookup(*name)),
                },
                Op::GetLocal { dst, local } => Instruction::GetLocal {
                    dst: dst.raw(),
                    local: *local,
                },
                Op::SetLocal { local, src } => Instruction::SetLocal {
                    local: *local,
                    src: src.raw(),
                },
                Op::GetGlobal { dst, global } => Instruction::GetGlobal {
                    dst: dst.raw(),
                    global: *global,
                },
                Op::SetGlobal { global, src } => Instruction::SetGlobal {
                    global: *global,
                    src: src.raw(),
                },
                Op::GetCapture { dst, capture } => Instruction::GetCapture {
                    dst: dst.raw(),
                    capture: *capture,
                },
                Op::SetCapture { capture, src } => Instruction::SetCapture {
                    capture: *capture,
                    src: src.raw(),
                },
                Op::GetAttribute {
                    dst,
                    receiver,
                    name,
                } => Instruction::GetAttribute {
                    dst: dst.raw(),
                    receiver: receiver.raw(),
                    name: pool.string(interner.lookup(*name)),
                },
                Op::SetAttribute {
                    receiver,
                    name,
                    src,
                } => Instruction::SetAttribute {
                    receiver: receiver.raw(),
                    name: pool.string(interner.lookup(*name)),
                    src: src.raw(),
                },
                Op::Send {
                    dst,
                    receiver,
                    name,
                    args,
                } => Instruction::Send {
                    dst: dst.raw(),
                    receiver: receiver.raw(),
                    name: pool.string(interner.lookup(*name)),
                    args: args.iter().map(|arg| arg.raw()).collect(),
                },
                Op::Allocate { dst, name } => Instruction::Allocate {
                    dst: dst.raw(),
                    name: pool.string(interner.lookup(*name)),
                },
                Op::Array { dst, items } => Instruction::Array {
                    dst: dst.raw(),
                    items: items.iter().map(|item| item.raw()).collect(),
                },
                Op::Map { dst, entries } => Instruction::Map {
                    dst: dst.raw(),
                    pairs: entries
                        .iter()
                        .flat_map(|(key, value)| [key.raw(), value.raw()])
                        .collect(),
                },
                Op::Move { dst, src } => Instruction::Move {
                    dst: dst.raw(),
                    src: src.raw(),
                },
                Op::Branch {
                    condition,
                    then_block,
                    else_block,
                } => Instruction::Branch {
                    condition: condition.raw(),
                    then_pc: block_offsets[then_block.index()],
                    else_pc: block_offsets[else_block.index()],
                },
                Op::Jump { block } => Instruction::Jump {
                    target_pc: block_offsets[block.index()],
                },
                Op::Return { src } => Instruction::Return { src: src.raw() },
                Op::Throw { src } => Instruction::Throw { src: src.raw() },
            };
            instructions.push(lowered);
            locations.push(ins.location);
        }
    }

    // The catch table keeps IR table order (innermost-first), re-expressed
    // in resolved offsets.
    let mut catch_table = Vec::with_capacity(unit.catch_table.len());
    for entry in &unit.catch_table {
        let (Some(&start), Some(&end)) = (
            range_starts.get(&entry.marker),
            range_ends.get(&entry.marker),
        ) else {
            return Err(InternalError {
                unit: unit.name.clone(),
                message: format!("catch entry {} has no delimited range", entry.marker),
            });
        };
        catch_table.push(CatchRange {
            start,
            end,
            handler: block_offsets[entry.handler.index()],
            register: entry.register.raw(),
        });
    }

    Ok(CompiledCode {
        name: unit.name.clone(),
        instructions,
        locations,
        literals: pool.constants,
        registers: unit.registers,
        locals: unit.locals,
        arguments: unit.arguments,
        required_arguments: unit.required_arguments,
        rest_argument: unit.rest_argument,
        captures: unit
            .captures
            .iter()
            .map(|capture| match capture {
                Capture::Local(slot) => CaptureSource::Local(*slot),
                Capture::Outer(index) => CaptureSource::Outer(*index),
            })
            .collect(),
        catch_table,
    })
}

#[derive(Default)]
struct PoolBuilder {
    constants: Vec<Constant>,
    strings: FxHashMap<String, u32>,
}

impl PoolBuilder {
    fn string(&mut self, text: String) -> u32 {
        if let Some(&existing) = self.strings.get(&text) {
            return existing;
        }
        let index = self.constants.len() as u32;
        self.strings.insert(text.clone(), index);
        self.constants.push(Constant::String(text));
        index
    }
}

/// Consistency checks before lowering. Failures are compiler defects.
fn verify(unit: &IrUnit) -> Result<(), InternalError> {
    let defect = |message: String| InternalError {
        unit: unit.name.clone(),
        message,
    };

    // Registers the runtime writes before the unit's own code runs.
    let mut defined = vec![false; unit.registers as usize];
    for entry in &unit.catch_table {
        if entry.handler.index() >= unit.blocks.len() {
            return Err(defect(format!(
                "catch handler targets missing block b{}",
                entry.handler.raw()
            )));
        }
        let index = entry.register.raw() as usize;
        if index >= defined.len() {
            return Err(defect(format!(
                "catch register r{} out of range",
                entry.register.raw()
            )));
        }
        defined[index] = true;
    }

    // Walk blocks in layout order: every use must follow a definition.
    for block in &unit.blocks {
        for ins in &block.instructions {
            let mut uses: Vec<u32> = Vec::new();
            let mut defs: Vec<u32> = Vec::new();
            match &ins.op {
                Op::LoadLiteral { dst, literal } => {
                    if literal.index() >= unit.literals.len() {
                        return Err(defect(format!(
                            "literal index {} out of range",
                            literal.raw()
                        )));
                    }
                    defs.push(dst.raw());
                }
                Op::LoadBool { dst, .. }
                | Op::LoadNil { dst }
                | Op::LoadSelf { dst }
                | Op::LoadType { dst, .. }
                | Op::GetLocal { dst, .. }
                | Op::GetGlobal { dst, .. }
                | Op::Allocate { dst, .. } => defs.push(dst.raw()),
                Op::SetLocal { src, .. }
                | Op::SetGlobal { src, .. }
                | Op::Return { src }
                | Op::Throw { src } => uses.push(src.raw()),
                Op::GetCapture { dst, capture } => {
                    if *capture as usize >= unit.captures.len() {
                        return Err(defect(format!("capture index {capture} out of range")));
                    }
                    defs.push(dst.raw());
                }
                Op::SetCapture { capture, src } => {
                    if *capture as usize >= unit.captures.len() {
                        return Err(defect(format!("capture index {capture} out of range")));
                    }
                    uses.push(src.raw());
                }
                Op::GetAttribute { dst, receiver, .. } => {
                    uses.push(receiver.raw());
                    defs.push(dst.raw());
                }
                Op::SetAttribute { receiver, src, .. } => {
                    uses.push(receiver.raw());
                    uses.push(src.raw());
                }
                Op::Send {
                    dst,
                    receiver,
                    args,
                    ..
                } => {
                    uses.push(receiver.raw());
                    uses.extend(args.iter().map(|arg| arg.raw()));
                    defs.push(dst.raw());
                }
                Op::Array { dst, items } => {
                    uses.extend(items.iter().map(|item| item.raw()));
                    defs.push(dst.raw());
                }
                Op::Map { dst, entries } => {
                    for (key, value) in entries {
                        uses.push(key.raw());
                        uses.push(value.raw());
                    }
                    defs.push(dst.raw());
                }
                Op::Move { dst, src } => {
                    uses.push(src.raw());
                    defs.push(dst.raw());
                }
                Op::Branch {
                    condition,
                    then_block,
                    else_block,
                } => {
                    uses.push(condition.raw());
                    for target in [then_block, else_block] {
                        if target.index() >= unit.blocks.len() {
                            return Err(defect(format!(
                                "branch targets missing block b{}",
                                target.raw()
                            )));
                        }
                    }
                }
                Op::Jump { block } => {
                    if block.index() >= unit.blocks.len() {
                        return Err(defect(format!(
                            "jump targets missing block b{}",
                            block.raw()
                        )));
                    }
                }
                Op::CatchStart { .. } | Op::CatchEnd { .. } => {}
            }

            for register in uses {
                if !defined.get(register as usize).copied().unwrap_or(false) {
                    return Err(defect(format!(
                        "register r{register} used before definition"
                    )));
                }
            }
            for register in defs {
                match defined.get_mut(register as usize) {
                    Some(slot) => *slot = true,
                    None => {
                        return Err(defect(format!("register r{register} out of range")));
                    }
                }
            }
        }
    }

    Ok(())
}
