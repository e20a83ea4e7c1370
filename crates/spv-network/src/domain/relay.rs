//! # Relay Dependencies
//!
//! Relevant transactions whose parents are not yet known are held here until
//! every parent has arrived or been reported missing.

use std::collections::{HashMap, HashSet};

use shared_types::{Hash, Transaction};

/// Held transactions and the parents they wait on.
#[derive(Debug, Default)]
pub struct RelayTracker {
    held: HashMap<Hash, HeldTx>,
    /// Parent hash → held children waiting on it.
    waiting: HashMap<Hash, HashSet<Hash>>,
}

#[derive(Debug)]
struct HeldTx {
    tx: Transaction,
    missing: HashSet<Hash>,
}

impl RelayTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold `tx` until `missing` parents resolve.
    ///
    /// Returns the parents not already being waited on, which the caller
    /// should request.
    pub fn hold(&mut self, tx: Transaction, missing: HashSet<Hash>) -> Vec<Hash> {
        let hash = tx.hash();
        let mut to_request = Vec::new();
        for parent in &missing {
            let children = self.waiting.entry(*parent).or_default();
            if children.is_empty() {
                to_request.push(*parent);
            }
            children.insert(hash);
        }
        self.held.insert(hash, HeldTx { tx, missing });
        to_request
    }

    /// Whether `hash` is a parent someone is waiting on.
    pub fn is_awaited(&self, hash: &Hash) -> bool {
        self.waiting.contains_key(hash)
    }

    pub fn is_held(&self, hash: &Hash) -> bool {
        self.held.contains_key(hash)
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Mark `parent` as arrived or not found.
    ///
    /// Returns transactions left with no outstanding dependency, in the order
    /// they become free.
    pub fn resolve(&mut self, parent: &Hash) -> Vec<Transaction> {
        let mut released = Vec::new();
        let Some(children) = self.waiting.remove(parent) else {
            return released;
        };
        for child in children {
            let ready = match self.held.get_mut(&child) {
                Some(held) => {
                    held.missing.remove(parent);
                    held.missing.is_empty()
                }
                None => false,
            };
            if ready {
                if let Some(held) = self.held.remove(&child) {
                    released.push(held.tx);
                }
            }
        }
        released
    }

    /// Drop `hash` and everything transitively depending on it.
    ///
    /// Returns the hashes of the purged held transactions.
    pub fn purge(&mut self, hash: &Hash) -> Vec<Hash> {
        let mut purged = Vec::new();
        let mut stack = vec![*hash];
        while let Some(current) = stack.pop() {
            if let Some(held) = self.held.remove(&current) {
                for parent in held.missing {
                    if let Some(children) = self.waiting.get_mut(&parent) {
                        children.remove(&current);
                        if children.is_empty() {
                            self.waiting.remove(&parent);
                        }
                    }
                }
                purged.push(current);
            }
            if let Some(children) = self.waiting.remove(&current) {
                stack.extend(children);
            }
        }
        purged
    }
}
