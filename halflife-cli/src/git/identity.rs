//! Author identity resolution
//!
//! Authors are interned to dense integer ids keyed by lowercased email
//! (falling back to the name when the email is empty), which is what the
//! packed per-line provenance stores. The reversed dictionary maps ids
//! back to a display string and travels with the analysis result so two
//! independently produced results can be combined.

use git2::Signature;
use halflife_core::provenance::AUTHOR_MISSING;
use rustc_hash::FxHashMap;

/// Interns commit authors into dense ids.
#[derive(Default)]
pub struct PeopleRegistry {
    index: FxHashMap<String, u32>,
    names: Vec<String>,
}

impl PeopleRegistry {
    /// Id for this signature, allocating one on first sight. Signatures
    /// with neither a usable email nor name map to [`AUTHOR_MISSING`].
    pub fn resolve(&mut self, signature: &Signature<'_>) -> u32 {
        let email = signature.email().unwrap_or("").trim().to_lowercase();
        let name = signature.name().unwrap_or("").trim().to_string();
        let key = if email.is_empty() {
            name.to_lowercase()
        } else {
            email.clone()
        };
        if key.is_empty() {
            return AUTHOR_MISSING;
        }
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = self.names.len() as u32;
        self.index.insert(key, id);
        self.names.push(if email.is_empty() {
            name
        } else {
            format!("{} <{}>", name, email)
        });
        id
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The reversed dictionary: display name per dense id.
    pub fn into_names(self) -> Vec<String> {
        self.names
    }
}

/// Merges two reversed dictionaries into their sorted union. For every
/// name the returned map holds `[merged index, index in first, index in
/// second]`, with -1 for a dictionary that does not know the name.
pub fn merge_reversed_dicts(
    first: &[String],
    second: &[String],
) -> (FxHashMap<String, [i32; 3]>, Vec<String>) {
    let mut people: FxHashMap<String, [i32; 3]> = FxHashMap::default();
    for (i, name) in first.iter().enumerate() {
        people.entry(name.clone()).or_insert([-1; 3])[1] = i as i32;
    }
    for (i, name) in second.iter().enumerate() {
        people.entry(name.clone()).or_insert([-1; 3])[2] = i as i32;
    }
    let mut merged: Vec<String> = people.keys().cloned().collect();
    merged.sort();
    for (i, name) in merged.iter().enumerate() {
        people.get_mut(name).expect("name from the key set")[0] = i as i32;
    }
    (people, merged)
}
