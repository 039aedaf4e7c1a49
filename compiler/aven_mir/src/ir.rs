//! The typed intermediate representation.
//!
//! One [`IrUnit`] exists per method, closure or module body: a list of basic
//! blocks of instructions over virtual registers, plus the unit's literal
//! pool and catch table. Units live in an [`IrArena`] and reference each
//! other by [`UnitId`], never by owning pointer, so mutually-referencing
//! closures form no ownership cycle.

use aven_ir::{Location, Name};
use smallvec::SmallVec;

use crate::pool::{LiteralId, LiteralPool};

/// A virtual register. Allocated monotonically per unit and never reused
/// across unrelated live ranges.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(transparent)]
pub struct Register(u32);

impl Register {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Register(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Index of a basic block within its unit.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// Every unit's entry block.
    pub const ENTRY: BlockId = BlockId(0);

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        BlockId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a unit within the [`IrArena`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(transparent)]
pub struct UnitId(u32);

impl UnitId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        UnitId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// An instruction operation.
///
/// `CatchStart`/`CatchEnd` delimit a protected instruction range; they are
/// consumed by the code generator when computing catch-table offsets and are
/// never emitted into the final stream.
#[derive(Clone, PartialEq, Debug)]
pub enum Op {
    /// Load a literal-pool value into a register.
    LoadLiteral { dst: Register, literal: LiteralId },
    LoadBool { dst: Register, value: bool },
    LoadNil { dst: Register },
    /// Load the receiver the unit runs on.
    LoadSelf { dst: Register },
    /// Load a named type object.
    LoadType { dst: Register, name: Name },
    GetLocal { dst: Register, local: u32 },
    SetLocal { local: u32, src: Register },
    GetGlobal { dst: Register, global: u32 },
    SetGlobal { global: u32, src: Register },
    /// Read a binding captured from an enclosing unit.
    GetCapture { dst: Register, capture: u32 },
    SetCapture { capture: u32, src: Register },
    GetAttribute { dst: Register, receiver: Register, name: Name },
    SetAttribute { receiver: Register, name: Name, src: Register },
    /// Send a message; `args` are evaluated left to right.
    Send {
        dst: Register,
        receiver: Register,
        name: Name,
        args: SmallVec<[Register; 4]>,
    },
    /// Allocate an instance of a named type.
    Allocate { dst: Register, name: Name },
    Array { dst: Register, items: SmallVec<[Register; 4]> },
    /// Build a map from alternating key/value registers.
    Map { dst: Register, entries: Vec<(Register, Register)> },
    Move { dst: Register, src: Register },
    /// Conditional branch on a boolean register.
    Branch {
        condition: Register,
        then_block: BlockId,
        else_block: BlockId,
    },
    Jump { block: BlockId },
    Return { src: Register },
    Throw { src: Register },
    /// Marker: the protected range of catch entry `marker` starts here.
    CatchStart { marker: u32 },
    /// Marker: the protected range of catch entry `marker` ends here.
    CatchEnd { marker: u32 },
}

/// One instruction: an operation plus the source location it lowers.
#[derive(Clone, PartialEq, Debug)]
pub struct Ins {
    pub op: Op,
    pub location: Location,
}

/// A basic block. Control only leaves through the final instruction.
#[derive(Default, Clone, PartialEq, Debug)]
pub struct Block {
    pub instructions: Vec<Ins>,
}

impl Block {
    /// Successor blocks reached through the terminator, if any.
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        let mut out = SmallVec::new();
        match self.instructions.last().map(|ins| &ins.op) {
            Some(Op::Branch {
                then_block,
                else_block,
                ..
            }) => {
                out.push(*then_block);
                out.push(*else_block);
            }
            Some(Op::Jump { block }) => out.push(*block),
            _ => {}
        }
        out
    }

    /// Whether the block ends in an instruction control cannot fall past.
    pub fn is_terminated(&self) -> bool {
        matches!(
            self.instructions.last().map(|ins| &ins.op),
            Some(Op::Branch { .. } | Op::Jump { .. } | Op::Return { .. } | Op::Throw { .. })
        )
    }
}

/// One catch-table entry: a handler block and the register the runtime
/// writes the thrown value into before jumping there. The protected range
/// is delimited by `CatchStart`/`CatchEnd` markers carrying `marker`.
///
/// The table is ordered innermost-first: entries are pushed when their
/// guarded scope is left, so an inner `try` lands before its enclosing one.
#[derive(Clone, PartialEq, Debug)]
pub struct CatchEntry {
    pub marker: u32,
    pub handler: BlockId,
    pub register: Register,
}

/// How one capture slot of a closure unit is filled when the closure is
/// created, expressed relative to the unit that creates it.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Capture {
    /// A local slot of the creating unit.
    Local(u32),
    /// A capture slot of the creating unit, forwarded inward through
    /// nested closures.
    Outer(u32),
}

/// One compiled definition: method, closure or module body.
#[derive(Clone, PartialEq, Debug)]
pub struct IrUnit {
    /// Qualified name, e.g. `main.Point.magnitude`.
    pub name: String,
    pub blocks: Vec<Block>,
    /// Number of virtual registers allocated so far.
    pub registers: u32,
    /// Total parameter count, including optional and rest parameters.
    pub arguments: u32,
    /// Leading parameters without defaults.
    pub required_arguments: u32,
    pub rest_argument: bool,
    /// Number of local variable slots; parameters occupy slots `0..arguments`.
    pub locals: u32,
    /// Bindings captured from enclosing units, indexed by `GetCapture`/
    /// `SetCapture` operands.
    pub captures: Vec<Capture>,
    pub literals: LiteralPool,
    pub catch_table: Vec<CatchEntry>,
}

impl IrUnit {
    pub fn new(name: impl Into<String>) -> Self {
        IrUnit {
            name: name.into(),
            blocks: vec![Block::default()],
            registers: 0,
            arguments: 0,
            required_arguments: 0,
            rest_argument: false,
            locals: 0,
            captures: Vec::new(),
            literals: LiteralPool::new(),
            catch_table: Vec::new(),
        }
    }

    /// Allocate a fresh virtual register.
    pub fn new_register(&mut self) -> Register {
        let register = Register(self.registers);
        self.registers += 1;
        register
    }

    /// Allocate a fresh local variable slot.
    pub fn new_local(&mut self) -> u32 {
        let local = self.locals;
        self.locals += 1;
        local
    }

    /// Append an empty block, returning its id.
    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::default());
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    /// Append an instruction to the given block.
    pub fn push(&mut self, block: BlockId, op: Op, location: Location) {
        self.blocks[block.index()]
            .instructions
            .push(Ins { op, location });
    }
}

/// Arena of all IR units of one module. Literal-pool entries reference
/// nested units (closures, methods) by [`UnitId`] into this arena.
#[derive(Default)]
pub struct IrArena {
    units: Vec<IrUnit>,
}

impl IrArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, unit: IrUnit) -> UnitId {
        let id = UnitId(self.units.len() as u32);
        self.units.push(unit);
        id
    }

    pub fn get(&self, id: UnitId) -> &IrUnit {
        &self.units[id.index()]
    }

    pub fn get_mut(&mut self, id: UnitId) -> &mut IrUnit {
        &mut self.units[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &IrUnit> {
        self.units.iter()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_registers_are_monotonic() {
        let mut unit = IrUnit::new("main");
        let a = unit.new_register();
        let b = unit.new_register();
        assert_eq!(a.raw(), 0);
        assert_eq!(b.raw(), 1);
        assert_eq!(unit.registers, 2);
    }

    #[test]
    fn test_successors_of_a_branch() {
        let mut unit = IrUnit::new("main");
        let then_block = unit.new_block();
        let else_block = unit.new_block();
        let condition = unit.new_register();
        unit.push(
            BlockId::ENTRY,
            Op::Branch {
                condition,
                then_block,
                else_block,
            },
            Location::DUMMY,
        );

        let successors = unit.block(BlockId::ENTRY).successors();
        assert_eq!(successors.as_slice(), &[then_block, else_block]);
    }

    #[test]
    fn test_unterminated_block_has_no_successors() {
        let mut unit = IrUnit::new("main");
        let dst = unit.new_register();
        unit.push(BlockId::ENTRY, Op::LoadNil { dst }, Location::DUMMY);

        assert!(unit.block(BlockId::ENTRY).successors().is_empty());
        assert!(!unit.block(BlockId::ENTRY).is_terminated());
    }
}
