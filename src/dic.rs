//! The engine's DIC (patricia radix tree) index structure.
//!
//! [`Tree`] builds the tree bit-for-bit the way Nintendo's tool does and
//! exposes the resulting [`IndexTableEntry`] rows; [`DicWriter`] wraps a
//! `Tree` with the on-disk `"DIC "` emission, and [`DicReader`] parses just
//! enough of that layout to recover the ordered key list.

use log::trace;

use crate::error::{Error, Result};
use crate::stream::{BinaryRead, Placeholder, ReadStream, WriteStream};

fn bit_mismatch(a: u128, b: u128) -> i32 {
    let bits = a.max(b).max(1).ilog2() + 1;
    for i in 0..bits as i32 {
        if (a >> i) & 1 != (b >> i) & 1 {
            return i;
        }
    }
    -1
}

fn first_1bit(n: u128) -> i32 {
    n.trailing_zeros() as i32
}

fn bit(n: u128, b: i32) -> u32 {
    // `b` may be -1 (the root sentinel's bit index); Nintendo's engine
    // relies on shifting by the 32-bit-unsigned reinterpretation of that
    // (effectively a huge shift) always yielding 0, which is exactly how
    // an arbitrary-precision integer behaves here. `u128` isn't
    // arbitrary-precision, so shifts at or past its width are handled
    // explicitly instead of overflowing.
    let shift = (b as u32) & 0xffff_ffff;
    if shift >= 128 {
        0
    } else {
        ((n >> shift) & 1) as u32
    }
}

/// `D(name)`: interpret a key's UTF-8 bytes as a big-endian integer. DIC
/// keys in practice are short identifiers, so `u128` comfortably covers
/// every real name while keeping the bit arithmetic in plain integers
/// instead of an arbitrary-precision type.
fn name_to_int(name: &str) -> u128 {
    let bytes = name.as_bytes();
    assert!(
        bytes.len() <= 16,
        "DIC keys longer than 16 bytes are not supported: {name:?}"
    );
    let mut buf = [0u8; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    u128::from_be_bytes(buf)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexTableEntry {
    pub compact_bit_idx: i32,
    pub idx0: u16,
    pub idx1: u16,
}

#[derive(Debug)]
struct Node {
    data: u128,
    name: String,
    bit_idx: i32,
    parent: usize,
    child: [usize; 2],
}

const ROOT: usize = 0;

/// Binary radix search tree used to build a DIC's index table.
///
/// Node `0` is always the root sentinel (`bit_idx = -1`, self-looping on
/// `child[0]`). Every other node is appended to `nodes` at the moment it's
/// created, so a node's index into `nodes` *is* its insertion ordinal —
/// exactly the `(ordinal, node)` pair the reference implementation tracks
/// in a side dict, for free.
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new() -> Self {
        let root = Node {
            data: 0,
            name: String::new(),
            bit_idx: -1,
            parent: ROOT,
            child: [ROOT, ROOT],
        };
        Tree { nodes: vec![root] }
    }

    fn compact_bit_idx(&self, idx: usize) -> i32 {
        if idx == ROOT {
            return -1;
        }
        let b = self.nodes[idx].bit_idx;
        let byte_idx = b >> 3;
        (byte_idx << 3) | (b - 8 * byte_idx)
    }

    /// `Search(D)`: traverse from root following `bit(D, bit_idx)` until
    /// `bit_idx` fails to strictly increase.
    fn search_node(&self, data: u128, prev: bool) -> usize {
        if self.nodes[ROOT].child[0] == ROOT {
            return ROOT;
        }
        let mut node = self.nodes[ROOT].child[0];
        let mut prev_node = node;
        loop {
            prev_node = node;
            node = self.nodes[node].child[bit(data, self.nodes[node].bit_idx) as usize];
            if self.nodes[node].bit_idx <= self.nodes[prev_node].bit_idx {
                break;
            }
        }
        if prev {
            prev_node
        } else {
            node
        }
    }

    /// Searches for `data`, returning it back if some inserted key matches
    /// it exactly (property P2's observable interface).
    pub fn search(&self, data: u128) -> Option<u128> {
        let node = self.search_node(data, false);
        (self.nodes[node].data == data).then_some(data)
    }

    fn new_node(&mut self, data: u128, name: String, bit_idx: i32, parent: usize) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node {
            data,
            name,
            bit_idx,
            parent,
            child: [ROOT, ROOT],
        });
        idx
    }

    pub fn insert(&mut self, name: &str) {
        let data = name_to_int(name);

        let mut current = self.search_node(data, true);
        let b = bit_mismatch(self.nodes[current].data, data);
        while b < self.nodes[self.nodes[current].parent].bit_idx {
            current = self.nodes[current].parent;
        }

        if b < self.nodes[current].bit_idx {
            // Splice a new node above `current`.
            let parent = self.nodes[current].parent;
            let new = self.new_node(data, name.to_string(), b, parent);
            self.nodes[new].child[(bit(data, b) ^ 1) as usize] = current;
            let parent_bit = self.nodes[parent].bit_idx;
            self.nodes[parent].child[bit(data, parent_bit) as usize] = new;
            self.nodes[current].parent = new;
        } else if b > self.nodes[current].bit_idx {
            // Attach as a child of `current`.
            let new = self.new_node(data, name.to_string(), b, current);
            if bit(self.nodes[current].data, b) == bit(data, b) ^ 1 {
                self.nodes[new].child[(bit(data, b) ^ 1) as usize] = current;
            } else {
                self.nodes[new].child[(bit(data, b) ^ 1) as usize] = ROOT;
            }
            let current_bit = self.nodes[current].bit_idx;
            self.nodes[current].child[bit(data, current_bit) as usize] = new;
        } else {
            // Same depth: a higher discriminating bit is needed.
            let mut new_bit_idx = first_1bit(data);
            let existing_child = self.nodes[current].child[bit(data, b) as usize];
            if existing_child != ROOT {
                new_bit_idx = bit_mismatch(self.nodes[existing_child].data, data);
            }
            let new = self.new_node(data, name.to_string(), new_bit_idx, current);
            self.nodes[new].child[(bit(data, new_bit_idx) ^ 1) as usize] = existing_child;
            self.nodes[current].child[bit(data, b) as usize] = new;
        }
        trace!("dic: inserted {name:?}");
    }

    /// Emits the index table in insertion order (root first); `idx0`/`idx1`
    /// are the insertion-ordinal indices of the left/right children.
    pub fn index_table(&self) -> Vec<IndexTableEntry> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| IndexTableEntry {
                compact_bit_idx: self.compact_bit_idx(i),
                idx0: node.child[0] as u16,
                idx1: node.child[1] as u16,
            })
            .collect()
    }

    fn name_at(&self, ordinal: usize) -> &str {
        &self.nodes[ordinal].name
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes a DIC's on-disk index table, in insertion order, for a set of
/// keys inserted with [`DicWriter::insert`].
pub struct DicWriter {
    tree: Tree,
}

impl DicWriter {
    pub fn new() -> Self {
        DicWriter { tree: Tree::new() }
    }

    pub fn insert(&mut self, key: &str) {
        self.tree.insert(key);
    }

    /// Reserves a forward-patched pointer site for this DIC. The caller
    /// holds onto the returned placeholder and patches it with the table's
    /// start offset once [`DicWriter::write`] is called.
    pub fn write_placeholder_offset(&self, stream: &mut WriteStream) -> Placeholder {
        stream.write_placeholder_ptr()
    }

    pub fn write(&self, stream: &mut WriteStream) {
        stream.write_bytes(b"DIC ");
        let table = self.tree.index_table();
        stream.write_u32((table.len() - 1) as u32);
        for (i, entry) in table.iter().enumerate() {
            stream.write_u32(entry.compact_bit_idx as u32);
            stream.write_u16(entry.idx0);
            stream.write_u16(entry.idx1);
            // The root sentinel's name is "" — still a registered string
            // ref, same as every other entry; the engine pools it too.
            stream.write_string_ref(self.tree.name_at(i), false);
        }
    }
}

impl Default for DicWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses just the DIC header and yields its keys in table order.
#[derive(Debug, Default)]
pub struct DicReader {
    pub items: Vec<String>,
}

impl BinaryRead for DicReader {
    fn read_from(stream: &mut ReadStream) -> Result<Self> {
        let magic = stream.read_bytes(4)?;
        if magic != b"DIC " {
            return Err(Error::InvariantViolated(format!(
                "bad DIC magic: {magic:?}"
            )));
        }
        let num_entries = stream.read_u32()?;
        // Root sentinel entry: u32 compact_bit_idx, u16 idx0, u16 idx1, u64 string ref.
        stream.skip(4 + 2 + 2 + 8);
        let mut items = Vec::with_capacity(num_entries as usize);
        for _ in 0..num_entries {
            stream.skip(4 + 2 + 2);
            let name = stream.read_string_ref()?;
            if name.is_empty() {
                return Err(Error::InvariantViolated("DIC entry with empty name".into()));
            }
            items.push(name);
        }
        Ok(DicReader { items })
    }
}
