//! Context item sets
//!
//! A [`ContextItemSet`] is one snapshot of shared context expressed as string
//! properties. Item names are hierarchical (`Subject.Attribute`) and compared
//! case-insensitively; the casing used the first time a name is stored is kept.

use crate::context::serializer::{SerializerRegistry, HL7_TIMESTAMP};
use crate::error::ContextError;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

/// Case-insensitively keyed property bag.
///
/// Entries are ordered by their lower-cased name so the serialized form is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextItemSet {
    /// lower-cased name -> (stored name, value)
    items: BTreeMap<String, (String, String)>,
}

impl ContextItemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a serialized `name=value` per line blob.
    pub fn parse(text: &str) -> Self {
        let mut items = Self::new();
        items.add_items_from_text(text);
        items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Clear all context items.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Stored item names, in their original casing.
    pub fn item_names(&self) -> impl Iterator<Item = &str> {
        self.items.values().map(|(name, _)| name.as_str())
    }

    /// Iterate `(stored name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Retrieves a context item by name.
    pub fn get_item(&self, name: &str) -> Option<&str> {
        self.items
            .get(&name.to_lowercase())
            .map(|(_, value)| value.as_str())
    }

    /// Retrieves a context item qualified by a suffix (`name.suffix`).
    pub fn get_item_with_suffix(&self, name: &str, suffix: &str) -> Option<&str> {
        self.get_item(&format!("{}.{}", name, suffix))
    }

    /// Upsert an item. `None` removes the item.
    pub fn set_item<V: Into<String>>(&mut self, name: &str, value: Option<V>) {
        let key = name.to_lowercase();

        match value {
            None => {
                self.items.remove(&key);
            }
            Some(value) => {
                let value = value.into();
                match self.items.get_mut(&key) {
                    Some(entry) => entry.1 = value,
                    None => {
                        self.items.insert(key, (name.to_string(), value));
                    }
                }
            }
        }
    }

    /// Upsert an item qualified by a suffix (`name.suffix`).
    pub fn set_item_with_suffix<V: Into<String>>(
        &mut self,
        name: &str,
        suffix: &str,
        value: Option<V>,
    ) {
        self.set_item(&format!("{}.{}", name, suffix), value);
    }

    /// Store a typed value through the serializer registered for its type.
    pub fn set_typed<T: Any>(
        &mut self,
        name: &str,
        value: Option<&T>,
        registry: &SerializerRegistry,
    ) -> Result<(), ContextError> {
        match value {
            None => {
                self.set_item::<String>(name, None);
                Ok(())
            }
            Some(value) => {
                let text = registry.serialize(value)?;
                self.set_item(name, Some(text));
                Ok(())
            }
        }
    }

    /// Typed retrieval. An absent or empty item yields `Ok(None)`.
    pub fn get_typed<T: Any>(
        &self,
        name: &str,
        registry: &SerializerRegistry,
    ) -> Result<Option<T>, ContextError> {
        registry.require::<T>()?;

        match self.get_item(name) {
            None | Some("") => Ok(None),
            Some(text) => registry.deserialize::<T>(text).map(Some),
        }
    }

    /// Store a timestamp in HL7 form (`yyyyMMddHHmmss`).
    pub fn set_date<Tz: TimeZone>(&mut self, name: &str, date: Option<&DateTime<Tz>>) {
        let text = date.map(|d| d.with_timezone(&Utc).format(HL7_TIMESTAMP).to_string());
        self.set_item(name, text);
    }

    /// Read an HL7 timestamp. Unparseable values yield `None`.
    pub fn get_date(&self, name: &str) -> Option<DateTime<Utc>> {
        parse_hl7(self.get_item(name)?)
    }

    /// All `(suffix, value)` pairs for items under `prefix`.
    ///
    /// `prefix` is matched case-insensitively, with a trailing `.` implied. Suffixes
    /// keep the stored casing.
    pub fn get_suffixes(&self, prefix: &str) -> BTreeMap<String, String> {
        self.suffixes(prefix, false)
    }

    /// True if any item belongs to `subject`.
    pub fn contains_subject(&self, subject: &str) -> bool {
        !self.suffixes(subject, true).is_empty()
    }

    /// Remove every item under `subject`.
    pub fn remove_subject(&mut self, subject: &str) {
        let prefix = normalize_prefix(subject);
        self.items.retain(|key, _| !key.starts_with(&prefix));
    }

    /// Merge items from `other`, overwriting on name collision.
    pub fn add_items(&mut self, other: &ContextItemSet) {
        for (name, value) in other.iter() {
            self.set_item(name, Some(value));
        }
    }

    /// Merge items from serialized text. Lines without `=` are skipped.
    pub fn add_items_from_text(&mut self, text: &str) {
        for line in text.split(['\r', '\n']) {
            if let Some((name, value)) = line.split_once('=') {
                self.set_item(name, Some(value));
            }
        }
    }

    fn suffixes(&self, prefix: &str, first_only: bool) -> BTreeMap<String, String> {
        let prefix = normalize_prefix(prefix);
        let mut matches = BTreeMap::new();

        for (key, (name, value)) in self.items.range(prefix.clone()..) {
            if !key.starts_with(&prefix) {
                break;
            }

            let suffix = original_suffix(name, prefix.len()).unwrap_or(&key[prefix.len()..]);
            matches.insert(suffix.to_string(), value.clone());

            if first_only {
                break;
            }
        }

        matches
    }
}

/// Slices `name` after the characters whose lowercase form spans `lowered_len` bytes.
///
/// Lowercasing can change byte length, so the prefix length measured on the key
/// does not always fall on a boundary of the stored name.
fn original_suffix(name: &str, lowered_len: usize) -> Option<&str> {
    let mut consumed = 0;
    for (index, ch) in name.char_indices() {
        if consumed == lowered_len {
            return Some(&name[index..]);
        }
        if consumed > lowered_len {
            return None;
        }
        consumed += ch.to_lowercase().map(char::len_utf8).sum::<usize>();
    }
    (consumed == lowered_len).then_some("")
}

impl fmt::Display for ContextItemSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            writeln!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for ContextItemSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut items = Self::new();
        for (name, value) in iter {
            items.set_item(name.as_ref(), Some(value.as_ref()));
        }
        items
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let prefix = prefix.to_lowercase();
    if prefix.ends_with('.') {
        prefix
    } else {
        prefix + "."
    }
}

/// Parse an HL7 timestamp, with or without a trailing `±zzzz` offset.
pub(crate) fn parse_hl7(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if text.len() > 14 {
        let with_offset = DateTime::<FixedOffset>::parse_from_str(text, "%Y%m%d%H%M%S%z").ok()?;
        return Some(with_offset.with_timezone(&Utc));
    }

    let naive = match text.len() {
        14 => NaiveDateTime::parse_from_str(text, HL7_TIMESTAMP).ok()?,
        12 => NaiveDateTime::parse_from_str(&format!("{}00", text), HL7_TIMESTAMP).ok()?,
        8 => NaiveDateTime::parse_from_str(&format!("{}000000", text), HL7_TIMESTAMP).ok()?,
        _ => return None,
    };

    Some(Utc.from_utc_datetime(&naive))
}
