//! Word dictionary consulted by queries. Tables are loaded from JSON; a
//! small built-in dictionary ships with the crate for demos and tests.

use std::collections::HashMap;

use serde::Deserialize;

const BUILTIN_JSON: &str = include_str!("../assets/dictionary.json");

/// One dictionary word. `terms` holds one surface form per subtype column
/// of the owning table; `attributes` is an opaque bag (pronunciation data
/// and the like) preserved for filters that understand it.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Entry {
    pub terms: Vec<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub syllables: Option<u32>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl Entry {
    /// Surface form for a subtype column, falling back to the first term.
    pub fn term(&self, column: usize) -> &str {
        self.terms
            .get(column)
            .or_else(|| self.terms.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.iter().any(|c| c.eq_ignore_ascii_case(name))
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub subtypes: Vec<String>,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

impl Table {
    /// Column index of a subtype name. Column 0 is the default subtype.
    pub fn subtype_index(&self, name: &str) -> Option<usize> {
        self.subtypes.iter().position(|s| s.eq_ignore_ascii_case(name))
    }
}

#[derive(Deserialize, Debug)]
struct DictionaryData {
    tables: Vec<Table>,
}

/// A set of named tables. Lookup is case-insensitive on the table name.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    tables: HashMap<String, Table>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let data: DictionaryData = serde_json::from_str(json)?;
        let mut dict = Dictionary::new();
        for table in data.tables {
            dict.add_table(table);
        }
        Ok(dict)
    }

    /// The dictionary bundled with the crate.
    pub fn builtin() -> Self {
        Self::from_json(BUILTIN_JSON).expect("built-in dictionary is valid JSON")
    }

    pub fn add_table(&mut self, table: Table) {
        self.tables.insert(table.name.to_lowercase(), table);
    }

    /// Table names, sorted for stable iteration.
    pub fn tables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.values().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(&name.to_lowercase())
    }

    /// Surface forms of every entry in a table for one subtype.
    pub fn entries(&self, table: &str, subtype: Option<&str>) -> Option<Vec<&str>> {
        let table = self.table(table)?;
        let column = match subtype {
            Some(name) => table.subtype_index(name)?,
            None => 0,
        };
        Some(table.entries.iter().map(|e| e.term(column)).collect())
    }

    /// Opaque attribute bag of one entry.
    pub fn attributes_of(&self, table: &str, entry: usize) -> Option<&HashMap<String, String>> {
        Some(&self.table(table)?.entries.get(entry)?.attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_dictionary_loads() {
        let dict = Dictionary::builtin();
        assert!(dict.table("noun").is_some());
        assert!(dict.table("adj").is_some());
    }

    #[test]
    fn table_lookup_is_case_insensitive() {
        let dict = Dictionary::builtin();
        assert!(dict.table("NOUN").is_some());
    }

    #[test]
    fn entries_select_subtype_column() {
        let dict = Dictionary::builtin();
        let singular = dict.entries("noun", Some("singular")).unwrap();
        let plural = dict.entries("noun", Some("plural")).unwrap();
        assert_eq!(singular.len(), plural.len());
        assert!(singular.contains(&"cat"));
        assert!(plural.contains(&"cats"));
    }

    #[test]
    fn unknown_subtype_is_none() {
        let dict = Dictionary::builtin();
        assert!(dict.entries("noun", Some("dative")).is_none());
    }

    #[test]
    fn from_json_round_trip() {
        let dict = Dictionary::from_json(
            r#"{ "tables": [ { "name": "color", "subtypes": ["name"],
                 "entries": [ { "terms": ["red"], "classes": ["warm"], "syllables": 1 } ] } ] }"#,
        )
        .unwrap();
        assert_eq!(dict.entries("color", None).unwrap(), vec!["red"]);
        assert!(dict.table("color").unwrap().entries[0].has_class("WARM"));
    }
}
