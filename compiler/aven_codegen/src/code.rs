//! The compiled bytecode data model.
//!
//! A [`CompiledModule`] is what gets serialized to disk: a header (module
//! name, import list) plus the module body's [`CompiledCode`] record, with
//! nested records (methods, closures) inlined recursively as literals.

use aven_ir::Location;

/// A constant in a compiled unit's literal pool. Name operands (message,
/// attribute and type names) are pool strings referenced by index.
#[derive(Clone, PartialEq, Debug)]
pub enum Constant {
    Int(i64),
    Float(f64),
    String(String),
    /// A nested compiled unit, inlined recursively.
    Code(Box<CompiledCode>),
}

/// A flat bytecode instruction. All branch targets are absolute
/// instruction offsets within the owning unit's stream.
#[derive(Clone, PartialEq, Debug)]
pub enum Instruction {
    LoadLiteral { dst: u32, literal: u32 },
    LoadBool { dst: u32, value: bool },
    LoadNil { dst: u32 },
    LoadSelf { dst: u32 },
    LoadType { dst: u32, name: u32 },
    GetLocal { dst: u32, local: u32 },
    SetLocal { local: u32, src: u32 },
    GetGlobal { dst: u32, global: u32 },
    SetGlobal { global: u32, src: u32 },
    GetCapture { dst: u32, capture: u32 },
    SetCapture { capture: u32, src: u32 },
    GetAttribute { dst: u32, receiver: u32, name: u32 },
    SetAttribute { receiver: u32, name: u32, src: u32 },
    Send {
        dst: u32,
        receiver: u32,
        name: u32,
        args: Vec<u32>,
    },
    Allocate { dst: u32, name: u32 },
    Array { dst: u32, items: Vec<u32> },
    /// Alternating key/value registers.
    Map { dst: u32, pairs: Vec<u32> },
    Move { dst: u32, src: u32 },
    Branch {
        condition: u32,
        then_pc: u32,
        else_pc: u32,
    },
    Jump { target_pc: u32 },
    Return { src: u32 },
    Throw { src: u32 },
}

/// A protected range in resolved instruction offsets: a throw at offset
/// `start <= pc < end` jumps to `handler`, with the thrown value written
/// into `register` first. Entries are searched in table order, which is
/// innermost-first.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct CatchRange {
    pub start: u32,
    pub end: u32,
    pub handler: u32,
    pub register: u32,
}

/// How one capture slot of a nested unit is filled when its closure is
/// created: from a local of the creating unit, or forwarded from one of
/// the creating unit's own capture slots.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CaptureSource {
    Local(u32),
    Outer(u32),
}

/// One compiled definition: instruction stream, literal pool, counts and
/// catch table.
#[derive(Clone, PartialEq, Debug)]
pub struct CompiledCode {
    /// Qualified name, e.g. `main.Point.magnitude`.
    pub name: String,
    pub instructions: Vec<Instruction>,
    /// Source locations, parallel to `instructions`.
    pub locations: Vec<Location>,
    pub literals: Vec<Constant>,
    pub registers: u32,
    pub locals: u32,
    pub arguments: u32,
    pub required_arguments: u32,
    pub rest_argument: bool,
    /// Capture sources, indexed by `GetCapture`/`SetCapture` operands.
    pub captures: Vec<CaptureSource>,
    pub catch_table: Vec<CatchRange>,
}

impl CompiledCode {
    /// The catch entry a throw at `pc` dispatches to: the first entry in
    /// table order whose range contains the offset.
    pub fn catch_entry_for(&self, pc: u32) -> Option<&CatchRange> {
        self.catch_table
            .iter()
            .find(|entry| entry.start <= pc && pc < entry.end)
    }
}

/// One module's serializable output.
#[derive(Clone, PartialEq, Debug)]
pub struct CompiledModule {
    pub name: String,
    /// Imported module names, in declaration order.
    pub imports: Vec<String>,
    pub body: CompiledCode,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn empty_code() -> CompiledCode {
        CompiledCode {
            name: "main".to_string(),
            instructions: Vec::new(),
            locations: Vec::new(),
            literals: Vec::new(),
            registers: 0,
            locals: 0,
            arguments: 0,
            required_arguments: 0,
            rest_argument: false,
            captures: Vec::new(),
            catch_table: Vec::new(),
        }
    }

    #[test]
    fn test_innermost_catch_entry_wins() {
        let mut code = empty_code();
        code.catch_table = vec![
            CatchRange {
                start: 0,
                end: 10,
                handler: 30,
                register: 0,
            },
            CatchRange {
                start: 0,
                end: 20,
                handler: 40,
                register: 1,
            },
        ];

        assert_eq!(code.catch_entry_for(5).map(|e| e.handler), Some(30));
        assert_eq!(code.catch_entry_for(15).map(|e| e.handler), Some(40));
        assert_eq!(code.catch_entry_for(25), None);
    }
}
