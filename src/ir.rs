//! A basic-block linearization over locations (`spec.md` §4.9, "IR Sketch").
//! Generation from the typed expression/statement tree is out of scope —
//! this module only owns the block/node/location shapes and the handful of
//! builder operations a lowering pass would call.
//!
//! Blocks are arena-indexed rather than `Rc`-linked: unlike `Type`/`Expr`,
//! an IR function's blocks and nodes are all owned together by one
//! `IrFunction` and never shared or outlive it, so a `Vec`-backed arena with
//! `prev`/`next` index links (mirroring the teacher's basic-block idiom in
//! its MIR builder) is the natural fit instead of per-node `Rc`s.

use crate::symbol::Symbol;

/// Index of a basic block within an [`IrFunction`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(u32);

impl BlockId {
    pub const ENTRY: BlockId = BlockId(0);

    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of an IR node within an [`IrFunction`]'s node arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Log2 of a location's byte width: 0 => 1 byte, 3 => 8 bytes.
pub type WidthLog2 = u8;

/// One storage location a node's operand or destination may reference
/// (`spec.md` §4.9).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    /// A value held directly in register `index`, of width `2^width_log2` bytes.
    Register { index: u32, width_log2: WidthLog2 },
    /// A pointer held in register `index`, dereferenced for a value of
    /// width `2^width_log2` bytes.
    PointerInRegister { index: u32, width_log2: WidthLog2 },
    /// An immediate value, always carried as 8 raw bytes regardless of its
    /// logical width (`spec.md` §4.9 "8-byte immediate").
    Immediate { bytes: [u8; 8], width_log2: WidthLog2 },
}

impl Location {
    #[must_use]
    pub fn width_log2(self) -> WidthLog2 {
        match self {
            Location::Register { width_log2, .. } | Location::PointerInRegister { width_log2, .. } | Location::Immediate { width_log2, .. } => width_log2,
        }
    }

    #[must_use]
    pub fn width_bytes(self) -> u32 {
        1u32 << self.width_log2()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryIrOp {
    Neg,
    Not,
    Move,
    SignExtend,
    ZeroExtend,
    Truncate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryIrOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    CmpEq,
    CmpNe,
    CmpLt,
    CmpLe,
}

/// One instruction within a block (`spec.md` §4.9).
#[derive(Clone, Copy, Debug)]
pub enum IrNodeKind {
    Unary { op: UnaryIrOp, src: Location, dst: Location },
    Binary { op: BinaryIrOp, src1: Location, src2: Location, dst: Location },
    Jump { dst_block: BlockId },
    JumpCond { reg: Location, dst_block: BlockId },
    CallByName { name: Symbol },
    CallByPointer { reg: Location },
    ReturnVoid,
    ReturnReg { reg: Location },
}

/// One node of a block's doubly linked list. `prev`/`next` are `None` at
/// the ends of the list.
#[derive(Clone, Copy, Debug)]
struct IrNode {
    kind: IrNodeKind,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

/// A basic block: a doubly linked list of nodes, identified by its head and
/// tail within the function's node arena.
#[derive(Clone, Copy, Debug, Default)]
struct BasicBlock {
    head: Option<NodeId>,
    tail: Option<NodeId>,
}

/// A function body: a set of basic blocks plus a distinguished entry block
/// (`spec.md` §4.9). Blocks and nodes live in flat arenas indexed by
/// [`BlockId`]/[`NodeId`]; there is no reference counting here since the
/// whole function is owned by a single lowering pass.
#[derive(Clone, Debug, Default)]
pub struct IrFunction {
    blocks: Vec<BasicBlock>,
    nodes: Vec<IrNode>,
}

impl IrFunction {
    /// A fresh function with just its entry block, empty.
    #[must_use]
    pub fn new() -> Self {
        IrFunction { blocks: vec![BasicBlock::default()], nodes: Vec::new() }
    }

    #[must_use]
    pub fn entry(&self) -> BlockId {
        BlockId::ENTRY
    }

    /// Allocates a new, empty basic block and returns its id.
    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(u32::try_from(self.blocks.len()).expect("block count exceeds u32"));
        self.blocks.push(BasicBlock::default());
        id
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Appends a node to the end of `block`'s instruction list.
    pub fn push(&mut self, block: BlockId, kind: IrNodeKind) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).expect("node count exceeds u32"));
        let prev = self.blocks[block.index()].tail;
        self.nodes.push(IrNode { kind, prev, next: None });
        if let Some(prev_id) = prev {
            self.nodes[prev_id.index()].next = Some(id);
        } else {
            self.blocks[block.index()].head = Some(id);
        }
        self.blocks[block.index()].tail = Some(id);
        id
    }

    #[must_use]
    pub fn node_kind(&self, node: NodeId) -> &IrNodeKind {
        &self.nodes[node.index()].kind
    }

    /// Iterates a block's nodes head-to-tail by walking the linked list.
    pub fn nodes_in(&self, block: BlockId) -> impl Iterator<Item = NodeId> + '_ {
        let mut cur = self.blocks[block.index()].head;
        std::iter::from_fn(move || {
            let id = cur?;
            cur = self.nodes[id.index()].next;
            Some(id)
        })
    }

    /// `true` once `block`'s node list ends in a block-terminating node
    /// (`jump`, `jump-cond`, `return-void`, `return-reg`).
    #[must_use]
    pub fn is_terminated(&self, block: BlockId) -> bool {
        self.blocks[block.index()]
            .tail
            .is_some_and(|id| matches!(self.nodes[id.index()].kind, IrNodeKind::Jump { .. } | IrNodeKind::JumpCond { .. } | IrNodeKind::ReturnVoid | IrNodeKind::ReturnReg { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolSpace;

    fn reg(index: u32) -> Location {
        Location::Register { index, width_log2: 2 }
    }

    #[test]
    fn entry_block_exists_on_a_fresh_function() {
        let f = IrFunction::new();
        assert_eq!(f.entry(), BlockId::ENTRY);
        assert_eq!(f.block_count(), 1);
    }

    #[test]
    fn pushed_nodes_preserve_insertion_order() {
        let mut f = IrFunction::new();
        let entry = f.entry();
        f.push(entry, IrNodeKind::Unary { op: UnaryIrOp::Move, src: reg(0), dst: reg(1) });
        f.push(entry, IrNodeKind::Binary { op: BinaryIrOp::Add, src1: reg(1), src2: reg(0), dst: reg(2) });
        f.push(entry, IrNodeKind::ReturnReg { reg: reg(2) });

        let kinds: Vec<&IrNodeKind> = f.nodes_in(entry).map(|id| f.node_kind(id)).collect();
        assert!(matches!(kinds[0], IrNodeKind::Unary { .. }));
        assert!(matches!(kinds[1], IrNodeKind::Binary { .. }));
        assert!(matches!(kinds[2], IrNodeKind::ReturnReg { .. }));
    }

    #[test]
    fn block_is_terminated_only_after_a_terminator_node() {
        let mut f = IrFunction::new();
        let entry = f.entry();
        f.push(entry, IrNodeKind::Unary { op: UnaryIrOp::Move, src: reg(0), dst: reg(1) });
        assert!(!f.is_terminated(entry));
        f.push(entry, IrNodeKind::ReturnVoid);
        assert!(f.is_terminated(entry));
    }

    #[test]
    fn new_block_allocates_a_distinct_id() {
        let mut f = IrFunction::new();
        let b1 = f.new_block();
        let b2 = f.new_block();
        assert_ne!(b1, b2);
        assert_eq!(f.block_count(), 3);
    }

    #[test]
    fn jump_and_call_nodes_carry_their_target() {
        let mut f = IrFunction::new();
        let entry = f.entry();
        let target = f.new_block();
        f.push(entry, IrNodeKind::JumpCond { reg: reg(0), dst_block: target });
        f.push(target, IrNodeKind::Jump { dst_block: entry });

        let space = SymbolSpace::new();
        let callee = space.force_str("memcpy");
        let other = f.new_block();
        f.push(other, IrNodeKind::CallByName { name: callee });
        f.push(other, IrNodeKind::ReturnVoid);
        assert!(f.is_terminated(other));
    }

    #[test]
    fn immediate_width_is_derived_from_width_log2() {
        let imm = Location::Immediate { bytes: [0; 8], width_log2: 3 };
        assert_eq!(imm.width_bytes(), 8);
        let small = Location::Register { index: 0, width_log2: 0 };
        assert_eq!(small.width_bytes(), 1);
    }
}
