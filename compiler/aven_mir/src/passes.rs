//! IR cleanup passes: constant-initializer hoisting and dead-block
//! elimination.

use rustc_hash::FxHashSet;

use crate::ir::{BlockId, IrUnit, Op};

/// Hoist module-level global initializations whose value is a literal to
/// the front of the entry block, so they run once at module load before
/// anything else. Declaration order among hoisted bindings is preserved.
///
/// Only the first store of a global is an initialization: once a global
/// has been read or written, later stores to it keep their place, so a
/// reassignment never moves past an intervening read.
#[tracing::instrument(level = "debug", skip_all, fields(unit = unit.name.as_str()))]
pub fn hoist_literal_globals(unit: &mut IrUnit) {
    let entry = unit.block_mut(BlockId::ENTRY);
    let mut hoisted = Vec::new();
    let mut rest = Vec::with_capacity(entry.instructions.len());
    let mut touched = FxHashSet::default();

    let mut instructions = std::mem::take(&mut entry.instructions).into_iter().peekable();
    while let Some(ins) = instructions.next() {
        if let Op::LoadLiteral { dst, .. } = ins.op {
            let initializes = match instructions.peek().map(|next| &next.op) {
                Some(Op::SetGlobal { global, src }) if *src == dst => touched.insert(*global),
                _ => false,
            };
            if initializes {
                hoisted.push(ins);
                if let Some(store) = instructions.next() {
                    hoisted.push(store);
                }
            } else {
                rest.push(ins);
            }
            continue;
        }
        if let Op::GetGlobal { global, .. } | Op::SetGlobal { global, .. } = ins.op {
            touched.insert(global);
        }
        rest.push(ins);
    }

    hoisted.extend(rest);
    entry.instructions = hoisted;
}

/// Remove blocks unreachable from the entry block.
///
/// Reachability follows terminator edges and the catch-handler edges of
/// live protected ranges: a handler whose `CatchStart` marker sits in a
/// live block is a root even when no normal-flow predecessor reaches it.
/// Catch entries of dead ranges are dropped. Running the pass twice is the
/// same as running it once.
#[tracing::instrument(level = "debug", skip_all, fields(unit = unit.name.as_str()))]
pub fn eliminate_dead_blocks(unit: &mut IrUnit) {
    let live = reachable_blocks(unit);
    if live.len() == unit.blocks.len() {
        return;
    }

    // Old id → new id for surviving blocks, preserving relative order.
    let mut remap = vec![None; unit.blocks.len()];
    let mut next = 0u32;
    for (index, slot) in remap.iter_mut().enumerate() {
        if live.contains(&BlockId::from_raw(index as u32)) {
            *slot = Some(BlockId::from_raw(next));
            next += 1;
        }
    }
    let remapped = |old: BlockId| remap[old.index()].unwrap_or(old);

    let mut blocks = Vec::with_capacity(live.len());
    for (index, mut block) in std::mem::take(&mut unit.blocks).into_iter().enumerate() {
        if remap[index].is_none() {
            continue;
        }
        for ins in &mut block.instructions {
            match &mut ins.op {
                Op::Branch {
                    then_block,
                    else_block,
                    ..
                } => {
                    *then_block = remapped(*then_block);
                    *else_block = remapped(*else_block);
                }
                Op::Jump { block } => *block = remapped(*block),
                _ => {}
            }
        }
        blocks.push(block);
    }
    unit.blocks = blocks;

    let live_markers = live_markers(unit);
    unit.catch_table.retain(|entry| live_markers.contains(&entry.marker));
    for entry in &mut unit.catch_table {
        entry.handler = remapped(entry.handler);
    }
}

/// Blocks reachable from entry, following terminators and live catch
/// handlers until a fixed point.
fn reachable_blocks(unit: &IrUnit) -> FxHashSet<BlockId> {
    let mut live = FxHashSet::default();
    let mut work = vec![BlockId::ENTRY];

    while let Some(id) = work.pop() {
        if !live.insert(id) {
            continue;
        }
        let block = unit.block(id);
        work.extend(block.successors());
        for ins in &block.instructions {
            if let Op::CatchStart { marker } = ins.op {
                for entry in &unit.catch_table {
                    if entry.marker == marker {
                        work.push(entry.handler);
                    }
                }
            }
        }
    }
    live
}

/// Markers whose protected range starts in a surviving block. Called after
/// pruning, so every remaining block is live.
fn live_markers(unit: &IrUnit) -> FxHashSet<u32> {
    let mut markers = FxHashSet::default();
    for block in &unit.blocks {
        for ins in &block.instructions {
            if let Op::CatchStart { marker } = ins.op {
                markers.insert(marker);
            }
        }
    }
    markers
}

#[cfg(test)]
mod tests {
    use aven_ir::Location;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ir::CatchEntry;
    use crate::pool::Literal;

    #[test]
    fn test_unreachable_block_is_pruned_and_targets_remapped() {
        let mut unit = IrUnit::new("main");
        let dead = unit.new_block();
        let tail = unit.new_block();
        let src = unit.new_register();
        unit.push(BlockId::ENTRY, Op::Jump { block: tail }, Location::DUMMY);
        unit.push(dead, Op::LoadNil { dst: src }, Location::DUMMY);
        unit.push(tail, Op::Return { src }, Location::DUMMY);

        eliminate_dead_blocks(&mut unit);

        assert_eq!(unit.blocks.len(), 2);
        // The jump now targets the tail's new id.
        assert_eq!(
            unit.block(BlockId::ENTRY).instructions[0].op,
            Op::Jump {
                block: BlockId::from_raw(1)
            }
        );
    }

    #[test]
    fn test_catch_handler_without_predecessor_survives() {
        let mut unit = IrUnit::new("main");
        let handler = unit.new_block();
        let register = unit.new_register();
        let src = unit.new_register();
        unit.push(BlockId::ENTRY, Op::CatchStart { marker: 0 }, Location::DUMMY);
        unit.push(BlockId::ENTRY, Op::CatchEnd { marker: 0 }, Location::DUMMY);
        unit.push(BlockId::ENTRY, Op::Return { src }, Location::DUMMY);
        unit.push(handler, Op::Return { src: register }, Location::DUMMY);
        unit.catch_table.push(CatchEntry {
            marker: 0,
            handler,
            register,
        });

        eliminate_dead_blocks(&mut unit);

        assert_eq!(unit.blocks.len(), 2);
        assert_eq!(unit.catch_table.len(), 1);
    }

    #[test]
    fn test_dead_range_drops_its_catch_entry() {
        let mut unit = IrUnit::new("main");
        let dead = unit.new_block();
        let handler = unit.new_block();
        let register = unit.new_register();
        let src = unit.new_register();
        unit.push(BlockId::ENTRY, Op::Return { src }, Location::DUMMY);
        unit.push(dead, Op::CatchStart { marker: 0 }, Location::DUMMY);
        unit.push(dead, Op::CatchEnd { marker: 0 }, Location::DUMMY);
        unit.push(handler, Op::Return { src: register }, Location::DUMMY);
        unit.catch_table.push(CatchEntry {
            marker: 0,
            handler,
            register,
        });

        eliminate_dead_blocks(&mut unit);

        assert_eq!(unit.blocks.len(), 1);
        assert!(unit.catch_table.is_empty());
    }

    #[test]
    fn test_elimination_is_idempotent() {
        let mut unit = IrUnit::new("main");
        let dead = unit.new_block();
        let src = unit.new_register();
        unit.push(BlockId::ENTRY, Op::Return { src }, Location::DUMMY);
        unit.push(dead, Op::LoadNil { dst: src }, Location::DUMMY);

        eliminate_dead_blocks(&mut unit);
        let once = unit.clone();
        eliminate_dead_blocks(&mut unit);

        assert_eq!(unit, once);
    }

    #[test]
    fn test_hoisting_preserves_declaration_order() {
        let mut unit = IrUnit::new("main");
        let a = unit.new_register();
        let b = unit.new_register();
        let other = unit.new_register();
        let first = unit.literals.insert(Literal::Int(1));
        let second = unit.literals.insert(Literal::Int(2));

        unit.push(BlockId::ENTRY, Op::LoadSelf { dst: other }, Location::DUMMY);
        unit.push(
            BlockId::ENTRY,
            Op::LoadLiteral { dst: a, literal: first },
            Location::DUMMY,
        );
        unit.push(BlockId::ENTRY, Op::SetGlobal { global: 0, src: a }, Location::DUMMY);
        unit.push(
            BlockId::ENTRY,
            Op::LoadLiteral { dst: b, literal: second },
            Location::DUMMY,
        );
        unit.push(BlockId::ENTRY, Op::SetGlobal { global: 1, src: b }, Location::DUMMY);

        hoist_literal_globals(&mut unit);

        let ops: Vec<&Op> = unit
            .block(BlockId::ENTRY)
            .instructions
            .iter()
            .map(|ins| &ins.op)
            .collect();
        assert!(matches!(ops[0], Op::LoadLiteral { .. }));
        assert!(matches!(ops[1], Op::SetGlobal { global: 0, .. }));
        assert!(matches!(ops[2], Op::LoadLiteral { .. }));
        assert!(matches!(ops[3], Op::SetGlobal { global: 1, .. }));
        assert!(matches!(ops[4], Op::LoadSelf { .. }));
    }

    #[test]
    fn test_reassignment_stays_after_intervening_read() {
        // let a = 1; let b = a; a = 2 — hoisting the second store of `a`
        // would make the read of `a` observe 2.
        let mut unit = IrUnit::new("main");
        let initial = unit.new_register();
        let copied = unit.new_register();
        let updated = unit.new_register();
        let one = unit.literals.insert(Literal::Int(1));
        let two = unit.literals.insert(Literal::Int(2));

        unit.push(BlockId::ENTRY, Op::LoadSelf { dst: copied }, Location::DUMMY);
        unit.push(
            BlockId::ENTRY,
            Op::LoadLiteral { dst: initial, literal: one },
            Location::DUMMY,
        );
        unit.push(
            BlockId::ENTRY,
            Op::SetGlobal { global: 0, src: initial },
            Location::DUMMY,
        );
        unit.push(
            BlockId::ENTRY,
            Op::GetGlobal { dst: copied, global: 0 },
            Location::DUMMY,
        );
        unit.push(
            BlockId::ENTRY,
            Op::SetGlobal { global: 1, src: copied },
            Location::DUMMY,
        );
        unit.push(
            BlockId::ENTRY,
            Op::LoadLiteral { dst: updated, literal: two },
            Location::DUMMY,
        );
        unit.push(
            BlockId::ENTRY,
            Op::SetGlobal { global: 0, src: updated },
            Location::DUMMY,
        );

        hoist_literal_globals(&mut unit);

        let ops: Vec<&Op> = unit
            .block(BlockId::ENTRY)
            .instructions
            .iter()
            .map(|ins| &ins.op)
            .collect();
        // Only the initialization moves; the reassignment keeps its place
        // after the read.
        assert!(matches!(ops[0], Op::LoadLiteral { .. }));
        assert!(matches!(ops[1], Op::SetGlobal { global: 0, .. }));
        assert!(matches!(ops[2], Op::LoadSelf { .. }));
        assert!(matches!(ops[3], Op::GetGlobal { global: 0, .. }));
        assert!(matches!(ops[4], Op::SetGlobal { global: 1, .. }));
        assert!(matches!(ops[5], Op::LoadLiteral { .. }));
        assert!(matches!(ops[6], Op::SetGlobal { global: 0, .. }));
    }
}
