//! AST → IR lowering.
//!
//! Produces one [`IrUnit`] per method, closure and module body. Each
//! syntactic construct lowers to a fixed instruction pattern; a reference
//! the resolver could not pin down yields a diagnostic and a placeholder
//! value, never an abort of the surrounding definitions.
//!
//! Binding placement mirrors name resolution exactly: module-level
//! definitions are globals (including inside `if` arms and `try` bodies,
//! which introduce no scope of their own), method and closure definitions
//! are locals, and a closure reading an enclosing unit's local gets a
//! capture slot filled when the closure is created.

use aven_diagnostic::{self as diag, Diagnostic};
use aven_ir::{Location, Name, Node, NodeId, Param, SharedInterner, SourceModule};
use aven_typeck::TypedModule;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::ir::{BlockId, Capture, CatchEntry, IrArena, IrUnit, Op, Register, UnitId};
use crate::pool::Literal;

/// The lowered form of one module: an arena of units, with `root` holding
/// the module body.
pub struct LoweredModule {
    pub arena: IrArena,
    pub root: UnitId,
}

/// Lower a resolved module into IR.
#[tracing::instrument(level = "debug", skip_all, fields(module = module.name.as_str()))]
pub fn lower_module(
    module: &SourceModule,
    typed: &TypedModule,
    interner: &SharedInterner,
) -> (LoweredModule, Vec<Diagnostic>) {
    let mut builder = Builder {
        module,
        typed,
        interner,
        arena: IrArena::new(),
        frames: Vec::new(),
        diagnostics: Vec::new(),
        owners: vec![module.name.clone()],
        catch_markers: 0,
        closure_counter: 0,
    };

    let root = builder.lower_unit(module.name.clone(), &[], &module.body, FrameKind::ModuleBody);
    let lowered = LoweredModule {
        arena: builder.arena,
        root,
    };
    (lowered, builder.diagnostics)
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum FrameKind {
    /// Top-level bindings are globals.
    ModuleBody,
    /// Stops the outward capture walk: a method sees its own locals and
    /// globals, never enclosing locals.
    Method,
    /// May capture bindings from enclosing frames up to the nearest method.
    Closure,
}

/// State of one unit being built. Frames form a stack during lowering: the
/// module body at the bottom, one frame per method or closure body above.
struct Frame {
    unit: IrUnit,
    current: BlockId,
    /// Lexical scopes mapping names to local slots, innermost last.
    scopes: Vec<FxHashMap<Name, u32>>,
    /// Capture slot already allocated per captured name.
    capture_slots: FxHashMap<Name, u32>,
    kind: FrameKind,
}

impl Frame {
    fn lookup_local(&self, name: Name) -> Option<u32> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&name).copied())
    }
}

struct Builder<'a> {
    module: &'a SourceModule,
    typed: &'a TypedModule,
    interner: &'a SharedInterner,
    arena: IrArena,
    frames: Vec<Frame>,
    diagnostics: Vec<Diagnostic>,
    /// Qualified-name prefixes; the innermost is the owner of methods
    /// defined at the current nesting level.
    owners: Vec<String>,
    /// Monotonic marker ids shared by all units of the module, pairing
    /// `CatchStart`/`CatchEnd` with their catch-table entries.
    catch_markers: u32,
    closure_counter: u32,
}

impl<'a> Builder<'a> {
    fn new_marker(&mut self) -> u32 {
        let marker = self.catch_markers;
        self.catch_markers += 1;
        marker
    }

    fn owner(&self) -> &str {
        self.owners.last().map(String::as_str).unwrap_or_default()
    }

    /// The frame of the unit currently being lowered.
    fn frame(&mut self) -> &mut Frame {
        let top = self.frames.len() - 1;
        &mut self.frames[top]
    }

    fn emit(&mut self, op: Op, location: Location) {
        let frame = self.frame();
        let block = frame.current;
        frame.unit.push(block, op, location);
    }

    fn current_terminated(&mut self) -> bool {
        let frame = self.frame();
        frame.unit.block(frame.current).is_terminated()
    }

    /// Lower one definition body into a fresh unit.
    fn lower_unit(
        &mut self,
        name: String,
        params: &[Param],
        body: &[NodeId],
        kind: FrameKind,
    ) -> UnitId {
        let mut unit = IrUnit::new(name);
        unit.arguments = params.len() as u32;
        unit.required_arguments = params
            .iter()
            .take_while(|param| param.default.is_none() && !param.rest)
            .count() as u32;
        unit.rest_argument = params.last().map(|param| param.rest).unwrap_or(false);

        let mut frame = Frame {
            unit,
            current: BlockId::ENTRY,
            scopes: vec![FxHashMap::default()],
            capture_slots: FxHashMap::default(),
            kind,
        };

        // Parameters occupy the first local slots, in declaration order.
        for param in params {
            let slot = frame.unit.new_local();
            if let Some(scope) = frame.scopes.last_mut() {
                scope.insert(param.name, slot);
            }
        }
        self.frames.push(frame);

        let last = self.lower_body(body);
        if !self.current_terminated() {
            let src = match last {
                Some(register) => register,
                None => self.load_nil(Location::DUMMY),
            };
            self.emit(Op::Return { src }, Location::DUMMY);
        }

        let unit = match self.frames.pop() {
            Some(frame) => frame.unit,
            None => IrUnit::new(String::new()),
        };
        self.arena.alloc(unit)
    }

    fn lower_body(&mut self, body: &[NodeId]) -> Option<Register> {
        let mut last = None;
        for &id in body {
            last = Some(self.lower_node(id));
        }
        last
    }

    fn load_nil(&mut self, location: Location) -> Register {
        let dst = self.frame().unit.new_register();
        self.emit(Op::LoadNil { dst }, location);
        dst
    }

    fn load_self(&mut self, location: Location) -> Register {
        let dst = self.frame().unit.new_register();
        self.emit(Op::LoadSelf { dst }, location);
        dst
    }

    fn load_literal(&mut self, literal: Literal, location: Location) -> Register {
        let frame = self.frame();
        let dst = frame.unit.new_register();
        let literal = frame.unit.literals.insert(literal);
        self.emit(Op::LoadLiteral { dst, literal }, location);
        dst
    }

    fn lower_node(&mut self, id: NodeId) -> Register {
        let location = self.module.arena.location(id);
        let node = self.module.arena.node(id).clone();
        match node {
            Node::Int(value) => self.load_literal(Literal::Int(value), location),
            Node::Float(value) => self.load_literal(Literal::Float(value), location),
            Node::Str(value) => self.load_literal(Literal::String(value), location),
            Node::True => {
                let dst = self.frame().unit.new_register();
                self.emit(Op::LoadBool { dst, value: true }, location);
                dst
            }
            Node::False => {
                let dst = self.frame().unit.new_register();
                self.emit(Op::LoadBool { dst, value: false }, location);
                dst
            }
            Node::Nil => self.load_nil(location),
            Node::SelfRef => self.load_self(location),
            Node::Import { .. } => self.load_nil(location),

            Node::Array(items) => {
                let items: SmallVec<[Register; 4]> = items
                    .iter()
                    .map(|&item| self.lower_node(item))
                    .collect();
                let dst = self.frame().unit.new_register();
                self.emit(Op::Array { dst, items }, location);
                dst
            }
            Node::Map(pairs) => {
                let entries: Vec<(Register, Register)> = pairs
                    .iter()
                    .map(|&(key, value)| {
                        let key = self.lower_node(key);
                        let value = self.lower_node(value);
                        (key, value)
                    })
                    .collect();
                let dst = self.frame().unit.new_register();
                self.emit(Op::Map { dst, entries }, location);
                dst
            }

            Node::Identifier(name) => self.lower_identifier(name, location),
            Node::Constant(name) => {
                let dst = self.frame().unit.new_register();
                self.emit(Op::LoadType { dst, name }, location);
                dst
            }

            Node::DefineVar { name, value, .. } => {
                let src = self.lower_node(value);
                self.store_new_binding(name, src, location);
                src
            }
            Node::AssignVar { name, value } => {
                let src = self.lower_node(value);
                if let Some(local) = self.frame().lookup_local(name) {
                    self.emit(Op::SetLocal { local, src }, location);
                } else if let Some(capture) = self.capture_binding(name) {
                    self.emit(Op::SetCapture { capture, src }, location);
                } else if let Some(symbol) = self.typed.globals.lookup(name) {
                    self.emit(
                        Op::SetGlobal {
                            global: symbol.index,
                            src,
                        },
                        location,
                    );
                } else {
                    self.undefined(name, location);
                }
                src
            }

            Node::GetAttribute(name) => {
                let receiver = self.load_self(location);
                let dst = self.frame().unit.new_register();
                self.emit(
                    Op::GetAttribute {
                        dst,
                        receiver,
                        name,
                    },
                    location,
                );
                dst
            }
            Node::SetAttribute { name, value } => {
                let receiver = self.load_self(location);
                let src = self.lower_node(value);
                self.emit(
                    Op::SetAttribute {
                        receiver,
                        name,
                        src,
                    },
                    location,
                );
                src
            }

            Node::Send {
                receiver,
                name,
                args,
                ..
            } => self.lower_send(receiver, name, &args, location),

            Node::Closure { params, body } => {
                self.closure_counter += 1;
                let name = format!("{}.closure#{}", self.module.name, self.closure_counter);
                let unit = self.lower_unit(name, &params, &body, FrameKind::Closure);
                self.load_literal(Literal::Unit(unit), location)
            }

            Node::If {
                condition,
                then_body,
                else_body,
            } => self.lower_if(condition, &then_body, &else_body, location),

            Node::And { left, right } => self.lower_short_circuit(left, right, true, location),
            Node::Or { left, right } => self.lower_short_circuit(left, right, false, location),

            Node::Try {
                body,
                error_name,
                handler,
            } => self.lower_try(&body, error_name, &handler, location),

            Node::Throw { value } => {
                let src = self.lower_node(value);
                self.emit(Op::Throw { src }, location);
                src
            }
            Node::Return { value } => {
                let src = match value {
                    Some(value) => self.lower_node(value),
                    None => self.load_nil(location),
                };
                self.emit(Op::Return { src }, location);
                src
            }

            Node::MethodDef {
                name, params, body, ..
            } => {
                let receiver = self.load_self(location);
                self.lower_method(receiver, name, &params, &body, location)
            }

            Node::ClassDef { name, body, .. } | Node::TraitDef { name, body, .. } => {
                let dst = self.frame().unit.new_register();
                self.emit(Op::LoadType { dst, name }, location);

                let owner = format!("{}.{}", self.owner(), self.interner.lookup(name));
                self.owners.push(owner);
                for &member in &body {
                    self.lower_member(dst, member);
                }
                self.owners.pop();
                dst
            }

            // Attribute slots without initializers produce no code; the
            // declaration already lives in the type model.
            Node::AttributeDef { name, value, .. } => match value {
                Some(value) => {
                    let receiver = self.load_self(location);
                    let src = self.lower_node(value);
                    self.emit(
                        Op::SetAttribute {
                            receiver,
                            name,
                            src,
                        },
                        location,
                    );
                    src
                }
                None => self.load_nil(location),
            },
        }
    }

    /// Lower one class/trait body member, attaching methods and attribute
    /// initializers to the type object in `receiver`.
    fn lower_member(&mut self, receiver: Register, id: NodeId) {
        let location = self.module.arena.location(id);
        let node = self.module.arena.node(id).clone();
        match node {
            Node::MethodDef {
                name, params, body, ..
            } => {
                self.lower_method(receiver, name, &params, &body, location);
            }
            Node::AttributeDef {
                name,
                value: Some(value),
                ..
            } => {
                let src = self.lower_node(value);
                self.emit(
                    Op::SetAttribute {
                        receiver,
                        name,
                        src,
                    },
                    location,
                );
            }
            _ => {}
        }
    }

    /// Lower a method body to a nested unit and attach it to its receiver.
    fn lower_method(
        &mut self,
        receiver: Register,
        name: Name,
        params: &[Param],
        body: &[NodeId],
        location: Location,
    ) -> Register {
        let qualified = format!("{}.{}", self.owner(), self.interner.lookup(name));
        let unit = self.lower_unit(qualified, params, body, FrameKind::Method);
        let src = self.load_literal(Literal::Unit(unit), location);
        self.emit(
            Op::SetAttribute {
                receiver,
                name,
                src,
            },
            location,
        );
        src
    }

    /// Name lookup order mirrors the resolver: locals, then captured
    /// enclosing locals, then module globals.
    fn lower_identifier(&mut self, name: Name, location: Location) -> Register {
        if let Some(local) = self.frame().lookup_local(name) {
            let dst = self.frame().unit.new_register();
            self.emit(Op::GetLocal { dst, local }, location);
            return dst;
        }
        if let Some(capture) = self.capture_binding(name) {
            let dst = self.frame().unit.new_register();
            self.emit(Op::GetCapture { dst, capture }, location);
            return dst;
        }
        if let Some(symbol) = self.typed.globals.lookup(name) {
            let dst = self.frame().unit.new_register();
            self.emit(
                Op::GetGlobal {
                    dst,
                    global: symbol.index,
                },
                location,
            );
            return dst;
        }
        self.undefined(name, location);
        self.load_nil(location)
    }

    /// Resolve `name` as a captured binding of the current frame,
    /// allocating capture slots through intermediate closures as needed.
    fn capture_binding(&mut self, name: Name) -> Option<u32> {
        let top = self.frames.len() - 1;
        self.resolve_capture(top, name)
    }

    /// Only closure frames capture; the walk checks each enclosing frame's
    /// locals and stops after the nearest method or the module body, the
    /// same chain name resolution walks.
    fn resolve_capture(&mut self, level: usize, name: Name) -> Option<u32> {
        if self.frames[level].kind != FrameKind::Closure {
            return None;
        }
        if let Some(&slot) = self.frames[level].capture_slots.get(&name) {
            return Some(slot);
        }
        let parent = level - 1;
        let entry = match self.frames[parent].lookup_local(name) {
            Some(local) => Capture::Local(local),
            None => Capture::Outer(self.resolve_capture(parent, name)?),
        };
        let frame = &mut self.frames[level];
        let slot = frame.unit.captures.len() as u32;
        frame.unit.captures.push(entry);
        frame.capture_slots.insert(name, slot);
        Some(slot)
    }

    fn undefined(&mut self, name: Name, location: Location) {
        let text = self.interner.lookup(name);
        self.diagnostics.push(diag::undefined_identifier(
            &text,
            &self.module.path,
            location,
        ));
    }

    /// Bind a fresh name: a global slot in the module body, a new local
    /// slot everywhere else.
    fn store_new_binding(&mut self, name: Name, src: Register, location: Location) {
        let frame = self.frame();
        let top_level = frame.kind == FrameKind::ModuleBody && frame.scopes.len() == 1;
        if top_level {
            if let Some(symbol) = self.typed.globals.lookup(name) {
                self.emit(
                    Op::SetGlobal {
                        global: symbol.index,
                        src,
                    },
                    location,
                );
                return;
            }
        }
        let frame = self.frame();
        let local = frame.unit.new_local();
        if let Some(scope) = frame.scopes.last_mut() {
            scope.insert(name, local);
        }
        self.emit(Op::SetLocal { local, src }, location);
    }

    fn lower_send(
        &mut self,
        receiver: Option<NodeId>,
        name: Name,
        args: &[NodeId],
        location: Location,
    ) -> Register {
        // `Type.new` lowers to an allocation, with `init` run when the call
        // site supplies arguments.
        if self.interner.lookup(name) == "new" {
            if let Some(receiver_id) = receiver {
                if let Node::Constant(type_name) = *self.module.arena.node(receiver_id) {
                    let args: SmallVec<[Register; 4]> = args
                        .iter()
                        .map(|&arg| self.lower_node(arg))
                        .collect();
                    let dst = self.frame().unit.new_register();
                    self.emit(
                        Op::Allocate {
                            dst,
                            name: type_name,
                        },
                        location,
                    );
                    if !args.is_empty() {
                        let discard = self.frame().unit.new_register();
                        let init = self.interner.intern("init");
                        self.emit(
                            Op::Send {
                                dst: discard,
                                receiver: dst,
                                name: init,
                                args,
                            },
                            location,
                        );
                    }
                    return dst;
                }
            }
        }

        let receiver = match receiver {
            Some(node) => self.lower_node(node),
            None => self.load_self(location),
        };
        let args: SmallVec<[Register; 4]> = args
            .iter()
            .map(|&arg| self.lower_node(arg))
            .collect();
        let dst = self.frame().unit.new_register();
        self.emit(
            Op::Send {
                dst,
                receiver,
                name,
                args,
            },
            location,
        );
        dst
    }

    /// `if` lowers to a conditional branch, one block per arm, and a join
    /// block; each arm writes its value into a shared result register.
    fn lower_if(
        &mut self,
        condition: NodeId,
        then_body: &[NodeId],
        else_body: &[NodeId],
        location: Location,
    ) -> Register {
        let condition = self.lower_node(condition);
        let result = self.frame().unit.new_register();

        let then_block = self.frame().unit.new_block();
        let else_block = self.frame().unit.new_block();
        self.emit(
            Op::Branch {
                condition,
                then_block,
                else_block,
            },
            location,
        );

        self.frame().current = then_block;
        self.lower_arm(then_body, result, location);
        let then_exit = self.frame().current;

        self.frame().current = else_block;
        self.lower_arm(else_body, result, location);
        let else_exit = self.frame().current;

        // Join blocks come after their predecessors, so final block layout
        // in id order keeps forward branches forward.
        let join = self.frame().unit.new_block();
        for exit in [then_exit, else_exit] {
            let frame = self.frame();
            if !frame.unit.block(exit).is_terminated() {
                frame.unit.push(exit, Op::Jump { block: join }, location);
            }
        }
        self.frame().current = join;
        result
    }

    /// Arms introduce no binding scope of their own: a definition inside
    /// an arm lives in the enclosing scope, the same place name resolution
    /// puts it.
    fn lower_arm(&mut self, body: &[NodeId], result: Register, location: Location) {
        let last = self.lower_body(body);
        if !self.current_terminated() {
            let src = match last {
                Some(register) => register,
                None => self.load_nil(location),
            };
            self.emit(Op::Move { dst: result, src }, location);
        }
    }

    /// `and`/`or` lower to a branch that skips evaluation of the right
    /// operand; both paths write the shared result register.
    fn lower_short_circuit(
        &mut self,
        left: NodeId,
        right: NodeId,
        is_and: bool,
        location: Location,
    ) -> Register {
        let left = self.lower_node(left);
        let result = self.frame().unit.new_register();
        self.emit(
            Op::Move {
                dst: result,
                src: left,
            },
            location,
        );

        let rhs_block = self.frame().unit.new_block();
        let join = self.frame().unit.new_block();
        let (then_block, else_block) = if is_and {
            (rhs_block, join)
        } else {
            (join, rhs_block)
        };
        self.emit(
            Op::Branch {
                condition: left,
                then_block,
                else_block,
            },
            location,
        );

        self.frame().current = rhs_block;
        let right = self.lower_node(right);
        self.emit(
            Op::Move {
                dst: result,
                src: right,
            },
            location,
        );
        self.emit(Op::Jump { block: join }, location);

        self.frame().current = join;
        result
    }

    /// `try` wraps the guarded instructions in `CatchStart`/`CatchEnd`
    /// markers and adds a catch entry targeting the handler block. Entries
    /// are pushed when the guarded scope is left, which orders the table
    /// innermost-first for nested scopes. The guarded body shares the
    /// enclosing scope; only the handler scopes its error binding.
    fn lower_try(
        &mut self,
        body: &[NodeId],
        error_name: Option<Name>,
        handler: &[NodeId],
        location: Location,
    ) -> Register {
        let marker = self.new_marker();
        let error_register = self.frame().unit.new_register();
        let result = self.frame().unit.new_register();

        self.emit(Op::CatchStart { marker }, location);
        let body_value = self.lower_body(body);
        self.emit(Op::CatchEnd { marker }, location);
        if !self.current_terminated() {
            let src = match body_value {
                Some(register) => register,
                None => self.load_nil(location),
            };
            self.emit(Op::Move { dst: result, src }, location);
        }
        let body_exit = self.frame().current;

        let handler_block = self.frame().unit.new_block();
        self.frame().current = handler_block;
        self.frame().scopes.push(FxHashMap::default());
        if let Some(error_name) = error_name {
            let frame = self.frame();
            let local = frame.unit.new_local();
            if let Some(scope) = frame.scopes.last_mut() {
                scope.insert(error_name, local);
            }
            self.emit(
                Op::SetLocal {
                    local,
                    src: error_register,
                },
                location,
            );
        }
        let handler_value = self.lower_body(handler);
        self.frame().scopes.pop();
        if !self.current_terminated() {
            let src = match handler_value {
                Some(register) => register,
                None => self.load_nil(location),
            };
            self.emit(Op::Move { dst: result, src }, location);
        }
        let handler_exit = self.frame().current;

        let join = self.frame().unit.new_block();
        for exit in [body_exit, handler_exit] {
            let frame = self.frame();
            if !frame.unit.block(exit).is_terminated() {
                frame.unit.push(exit, Op::Jump { block: join }, location);
            }
        }

        self.frame().unit.catch_table.push(CatchEntry {
            marker,
            handler: handler_block,
            register: error_register,
        });

        self.frame().current = join;
        result
    }
}
