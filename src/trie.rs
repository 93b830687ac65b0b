use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A node in the copy-on-write trie. Nodes are immutable once published:
/// every mutation clones the nodes along its path and shares everything
/// else. A node carrying a value marks the end of a stored key; values
/// are type-erased so one trie can hold values of different types.
#[derive(Default)]
struct TrieNode {
    children: BTreeMap<u8, Arc<TrieNode>>,
    value: Option<Arc<dyn Any + Send + Sync>>,
}

impl TrieNode {
    fn with_child(key: u8, child: Arc<TrieNode>) -> TrieNode {
        let mut children = BTreeMap::new();
        children.insert(key, child);
        TrieNode { children, value: None }
    }
}

/// An immutable persistent trie over byte-string keys. `put` and
/// `remove` leave the current trie untouched and return a new one that
/// shares all unmodified subtrees with it, so readers of an old root
/// keep seeing a consistent snapshot with no coordination.
///
/// Cloning a trie is O(1): it copies the root pointer.
#[derive(Clone, Default)]
pub struct Trie {
    root: Option<Arc<TrieNode>>,
}

impl Trie {
    pub fn new() -> Trie {
        Trie { root: None }
    }

    /// Look up a value by key. Returns None on a missing edge, on a
    /// terminal node that carries no value, and on a value of a
    /// different type than requested. The reference is valid for as
    /// long as this trie instance is.
    pub fn get<T: 'static>(&self, key: &[u8]) -> Option<&T> {
        let mut node = self.root.as_ref()?;
        for byte in key {
            node = node.children.get(byte)?;
        }
        node.value.as_ref()?.downcast_ref::<T>()
    }

    /// Store a value under the key, overwriting any previous value, and
    /// return the resulting trie. Values are moved in, so non-clonable
    /// types work.
    pub fn put<T: Send + Sync + 'static>(&self, key: &[u8], value: T) -> Trie {
        let root = match &self.root {
            Some(root) => Arc::clone(root),
            None => Arc::new(TrieNode::default()),
        };

        // walk as far as edges match, remembering the nodes passed
        let mut path = vec![Arc::clone(&root)];
        let mut node = root;
        let mut matched = 0;
        while matched < key.len() {
            let next = match node.children.get(&key[matched]) {
                Some(child) => Arc::clone(child),
                None => break,
            };
            path.push(Arc::clone(&next));
            node = next;
            matched += 1;
        }

        let value: Arc<dyn Any + Send + Sync> = Arc::new(value);
        let mut chain = if matched == key.len() {
            // the terminal exists: rebuild it around the new value,
            // keeping its children
            path.pop();
            Arc::new(TrieNode { children: node.children.clone(), value: Some(value) })
        } else {
            // fresh chain of nodes for the unmatched suffix, with the
            // value node at the tip
            let mut tip = Arc::new(TrieNode { children: BTreeMap::new(), value: Some(value) });
            for idx in (matched + 1..key.len()).rev() {
                tip = Arc::new(TrieNode::with_child(key[idx], tip));
            }
            tip
        };

        // clone each node along the matched prefix from the deepest
        // upward, swapping in the child that leads to the new chain
        while let Some(top) = path.pop() {
            let byte = key[path.len()];
            let mut children = top.children.clone();
            children.insert(byte, chain);
            chain = Arc::new(TrieNode { children, value: top.value.clone() });
        }

        Trie { root: Some(chain) }
    }

    /// Remove the value stored under the key, pruning any nodes left
    /// behind with neither value nor children, and return the resulting
    /// trie. Removing an absent key returns an identical trie.
    pub fn remove(&self, key: &[u8]) -> Trie {
        let root = match &self.root {
            Some(root) => Arc::clone(root),
            None => return Trie::new(),
        };

        // walk the full key, keeping both the nodes passed and the edge
        // bytes taken; pruning below uses the recorded edges, never the
        // ascent depth
        let mut path = vec![Arc::clone(&root)];
        let mut edges = Vec::with_capacity(key.len());
        let mut node = root;
        for &byte in key {
            let next = match node.children.get(&byte) {
                Some(child) => Arc::clone(child),
                None => return self.clone(),
            };
            path.push(Arc::clone(&next));
            edges.push(byte);
            node = next;
        }
        if node.value.is_none() {
            return self.clone();
        }

        let mut chain;
        if !node.children.is_empty() {
            // the terminal stays as a plain structural node
            path.pop();
            chain = Arc::new(TrieNode { children: node.children.clone(), value: None });
        } else {
            // drop the terminal, then ascend past nodes the removal
            // leaves empty and valueless, pruning the dead branch at the
            // nearest surviving ancestor
            path.pop();
            let (ancestor, pruned_edge) = loop {
                let candidate = match path.pop() {
                    Some(candidate) => candidate,
                    // every ancestor was structural-only
                    None => return Trie::new(),
                };
                let edge = edges[path.len()];
                if candidate.value.is_some() || candidate.children.len() > 1 {
                    break (candidate, edge);
                }
            };
            let mut children = ancestor.children.clone();
            children.remove(&pruned_edge);
            chain = Arc::new(TrieNode { children, value: ancestor.value.clone() });
        }

        while let Some(top) = path.pop() {
            let byte = edges[path.len()];
            let mut children = top.children.clone();
            children.insert(byte, chain);
            chain = Arc::new(TrieNode { children, value: top.value.clone() });
        }

        Trie { root: Some(chain) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_trie() {
        let trie = Trie::new();
        assert_eq!(None, trie.get::<u32>(b""));
        assert_eq!(None, trie.get::<u32>(b"a"));
    }

    #[test]
    fn test_put_and_get() {
        let t0 = Trie::new();
        let t1 = t0.put(b"ab", 1u32);
        let t2 = t1.put(b"abc", 2u32);

        assert_eq!(None, t0.get::<u32>(b"ab"));
        assert_eq!(Some(&1), t1.get::<u32>(b"ab"));
        assert_eq!(None, t1.get::<u32>(b"abc"));
        assert_eq!(Some(&1), t2.get::<u32>(b"ab"));
        assert_eq!(Some(&2), t2.get::<u32>(b"abc"));
    }

    #[test]
    fn test_remove_keeps_old_roots_intact() {
        let t2 = Trie::new().put(b"ab", 1u32).put(b"abc", 2u32);
        let t3 = t2.remove(b"abc");

        assert_eq!(Some(&1), t3.get::<u32>(b"ab"));
        assert_eq!(None, t3.get::<u32>(b"abc"));
        // the previous version is unaffected
        assert_eq!(Some(&2), t2.get::<u32>(b"abc"));
    }

    #[test]
    fn test_put_is_pure_and_idempotent() {
        let t = Trie::new().put(b"k", 7u32);
        let twice = t.put(b"k", 7u32).put(b"k", 7u32);
        assert_eq!(Some(&7), twice.get::<u32>(b"k"));
        assert_eq!(Some(&7), t.get::<u32>(b"k"));

        let gone = t.remove(b"k").remove(b"k");
        assert_eq!(None, gone.get::<u32>(b"k"));
        assert_eq!(Some(&7), t.get::<u32>(b"k"));
    }

    #[test]
    fn test_overwrite_keeps_children() {
        let t = Trie::new().put(b"a", 1u32).put(b"ab", 2u32).put(b"a", 10u32);
        assert_eq!(Some(&10), t.get::<u32>(b"a"));
        assert_eq!(Some(&2), t.get::<u32>(b"ab"));
    }

    #[test]
    fn test_type_mismatch_is_none() {
        let t = Trie::new().put(b"k", 1u32);
        assert_eq!(None, t.get::<u64>(b"k"));
        assert_eq!(None, t.get::<String>(b"k"));
        assert_eq!(Some(&1u32), t.get::<u32>(b"k"));
    }

    #[test]
    fn test_mixed_value_types() {
        let t = Trie::new().put(b"n", 1u32).put(b"s", "str".to_string());
        assert_eq!(Some(&1), t.get::<u32>(b"n"));
        assert_eq!(Some(&"str".to_string()), t.get::<String>(b"s"));
    }

    #[test]
    fn test_move_only_values() {
        struct MoveOnly(u32);

        let t = Trie::new().put(b"m", MoveOnly(5));
        assert_eq!(5, t.get::<MoveOnly>(b"m").unwrap().0);
    }

    #[test]
    fn test_empty_key_value_at_root() {
        let t = Trie::new().put(b"", 42u32);
        assert_eq!(Some(&42), t.get::<u32>(b""));

        let t = t.put(b"a", 1u32);
        assert_eq!(Some(&42), t.get::<u32>(b""));
        assert_eq!(Some(&1), t.get::<u32>(b"a"));

        let t = t.remove(b"");
        assert_eq!(None, t.get::<u32>(b""));
        assert_eq!(Some(&1), t.get::<u32>(b"a"));
    }

    #[test]
    fn test_remove_absent_key() {
        let t = Trie::new().put(b"ab", 1u32);
        let same = t.remove(b"zz");
        assert_eq!(Some(&1), same.get::<u32>(b"ab"));

        // a prefix of a stored key holds no value
        let same = t.remove(b"a");
        assert_eq!(Some(&1), same.get::<u32>(b"ab"));

        let empty = Trie::new().remove(b"x");
        assert_eq!(None, empty.get::<u32>(b"x"));
    }

    #[test]
    fn test_remove_prunes_structural_chain() {
        // "a" -> value, then a chain of structural nodes down to "abcde"
        let t = Trie::new().put(b"a", 1u32).put(b"abcde", 2u32);
        let pruned = t.remove(b"abcde");

        assert_eq!(Some(&1), pruned.get::<u32>(b"a"));
        assert_eq!(None, pruned.get::<u32>(b"abcde"));
        // intermediate structural nodes went with the branch
        let t2 = pruned.put(b"ab", 3u32);
        assert_eq!(Some(&3), t2.get::<u32>(b"ab"));
    }

    #[test]
    fn test_remove_last_key_leaves_empty_trie() {
        let t = Trie::new().put(b"abc", 1u32);
        let empty = t.remove(b"abc");
        assert_eq!(None, empty.get::<u32>(b"abc"));
        assert_eq!(None, empty.get::<u32>(b"a"));
        // the earlier version still holds its value
        assert_eq!(Some(&1), t.get::<u32>(b"abc"));
    }

    #[test]
    fn test_remove_at_branching_node() {
        let t = Trie::new().put(b"ax", 1u32).put(b"ay", 2u32);
        let pruned = t.remove(b"ax");
        assert_eq!(None, pruned.get::<u32>(b"ax"));
        assert_eq!(Some(&2), pruned.get::<u32>(b"ay"));
    }

    #[test]
    fn test_structural_sharing() {
        // the untouched sibling subtree is the same allocation in both
        // versions
        let t1 = Trie::new().put(b"left", 1u32).put(b"right", 2u32);
        let t2 = t1.put(b"left", 10u32);

        let sibling1 = t1.root.as_ref().unwrap().children.get(&b'r').unwrap();
        let sibling2 = t2.root.as_ref().unwrap().children.get(&b'r').unwrap();
        assert!(Arc::ptr_eq(sibling1, sibling2));

        let changed1 = t1.root.as_ref().unwrap().children.get(&b'l').unwrap();
        let changed2 = t2.root.as_ref().unwrap().children.get(&b'l').unwrap();
        assert!(!Arc::ptr_eq(changed1, changed2));
    }
}
