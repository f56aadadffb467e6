//! Huffman codes for hierarchical softmax.
//!
//! Frequent words get short codes. Each word's `point` lists the inner nodes
//! on its path from the root, and those are the rows of `syn1` the kernel
//! trains for that word.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use log::info;

use crate::vocab::{HuffmanCode, Vocabulary};

enum Node {
    Leaf(usize),
    Inner { id: usize, left: Box<Node>, right: Box<Node> },
}

/// Heap entry, ordered so the `BinaryHeap` pops the smallest count first and
/// breaks ties by insertion order.
struct Pending {
    count: u64,
    seq: usize,
    node: Node,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        (self.count, self.seq) == (other.count, other.seq)
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.count, other.seq).cmp(&(self.count, self.seq))
    }
}

/// Build the tree over `vocab`'s counts and store a code on every word.
///
/// Returns the length of the longest code. An empty vocabulary gets no tree.
pub fn assign_binary_codes(vocab: &mut Vocabulary) -> usize {
    let vocab_size = vocab.len();
    info!("constructing a huffman tree from {vocab_size} words");

    let mut heap: BinaryHeap<Pending> = vocab
        .iter()
        .enumerate()
        .map(|(i, vw)| Pending {
            count: vw.count,
            seq: i,
            node: Node::Leaf(i),
        })
        .collect();
    let mut merge_step = 0;
    let root = loop {
        let Some(first) = heap.pop() else {
            return 0;
        };
        let Some(second) = heap.pop() else {
            break first.node;
        };
        heap.push(Pending {
            count: first.count + second.count,
            seq: vocab_size + merge_step,
            node: Node::Inner {
                id: vocab_size + merge_step,
                left: Box::new(first.node),
                right: Box::new(second.node),
            },
        });
        merge_step += 1;
    };

    // Walk the tree with an explicit stack, so deep trees can't overflow.
    let mut max_depth = 0;
    let mut stack: Vec<(Node, Vec<u8>, Vec<u32>)> = vec![(root, vec![], vec![])];
    while let Some((node, code, point)) = stack.pop() {
        match node {
            Node::Leaf(i) => {
                max_depth = max_depth.max(code.len());
                vocab.word_mut(i).huffman = Some(HuffmanCode { code, point });
            }
            Node::Inner { id, left, right } => {
                let mut point = point;
                point.push((id - vocab_size) as u32);
                let mut left_code = code.clone();
                left_code.push(0);
                let mut right_code = code;
                right_code.push(1);
                stack.push((*right, right_code, point.clone()));
                stack.push((*left, left_code, point));
            }
        }
    }
    info!("built huffman tree with maximum node depth {max_depth}");
    max_depth
}
