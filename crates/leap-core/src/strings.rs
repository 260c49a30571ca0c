//! Global string table
//!
//! Hardware sends 32-bit uids instead of text; the software side maps them
//! back. Uids are handed out densely from 0 and adding the same string
//! twice returns the same uid.

use crate::error::{LeapError, LeapResult};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct StringTable {
    inner: RwLock<Strings>,
}

#[derive(Debug, Default)]
struct Strings {
    by_uid: Vec<String>,
    by_text: HashMap<String, u32>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from a list of strings; uid == index for unique entries
    pub fn from_strings<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table = Self::new();
        for s in strings {
            table.add_string(s);
        }
        table
    }

    pub fn add_string(&self, s: impl Into<String>) -> u32 {
        let s = s.into();
        let mut inner = self.inner.write().unwrap();
        if let Some(uid) = inner.by_text.get(&s) {
            return *uid;
        }
        let uid = inner.by_uid.len() as u32;
        inner.by_uid.push(s.clone());
        inner.by_text.insert(s, uid);
        uid
    }

    pub fn lookup(&self, uid: u32) -> LeapResult<String> {
        self.inner
            .read()
            .unwrap()
            .by_uid
            .get(uid as usize)
            .cloned()
            .ok_or(LeapError::UnknownString(uid))
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().by_uid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
