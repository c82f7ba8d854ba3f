//! Query values and the engine that filters a dictionary table down to one
//! entry. Misses are soft: the engine returns a diagnostic token for the
//! output stream instead of failing the run.

use std::collections::HashMap;

use rand::Rng;

use crate::dictionary::{Dictionary, Table};
use crate::rst::RantRegex;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassFilterRule {
    pub class_name: String,
    /// `false` is a blacklist term.
    pub include: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegexFilter {
    /// Positive filters must match the surface form; negative must not.
    pub positive: bool,
    pub regex: RantRegex,
}

/// Inclusive syllable-count bounds; an open side imposes no bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyllableRange {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

impl SyllableRange {
    pub fn contains(&self, n: u32) -> bool {
        self.min.map_or(true, |min| n >= min) && self.max.map_or(true, |max| n <= max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierKind {
    /// Every query holding this carrier yields the same entry.
    Match,
    /// The result must differ from the entry held under this carrier id.
    Unique,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Carrier {
    pub id: String,
    pub kind: CarrierKind,
}

/// A parsed `<table.subtype-class?…>` form.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub subtype: Option<String>,
    pub class_filter: Vec<ClassFilterRule>,
    pub regex_filters: Vec<RegexFilter>,
    pub syllables: Option<SyllableRange>,
    pub exclusive: bool,
    pub carrier: Option<Carrier>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            subtype: None,
            class_filter: Vec::new(),
            regex_filters: Vec::new(),
            syllables: None,
            exclusive: false,
            carrier: None,
        }
    }
}

/// Carrier assignments for one run: carrier id to (table key, entry index).
#[derive(Debug, Default)]
pub struct CarrierState {
    held: HashMap<String, (String, usize)>,
}

impl CarrierState {
    fn get(&self, id: &str, table: &str) -> Option<usize> {
        self.held
            .get(id)
            .filter(|(t, _)| t.eq_ignore_ascii_case(table))
            .map(|(_, i)| *i)
    }

    fn hold(&mut self, id: &str, table: &str, entry: usize) {
        self.held.insert(id.to_string(), (table.to_lowercase(), entry));
    }
}

/// Entry indices surviving the query's class, regex, and syllable filters,
/// in table order. Carrier semantics are applied by `evaluate`, not here.
pub fn filter_indices(query: &Query, table: &Table) -> Vec<usize> {
    let column = match &query.subtype {
        Some(name) => match table.subtype_index(name) {
            Some(i) => i,
            None => return Vec::new(),
        },
        None => 0,
    };

    let includes: Vec<&str> = query
        .class_filter
        .iter()
        .filter(|r| r.include)
        .map(|r| r.class_name.as_str())
        .collect();

    table
        .entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| {
            for rule in &query.class_filter {
                if rule.include != entry.has_class(&rule.class_name) {
                    return false;
                }
            }
            if query.exclusive
                && !entry
                    .classes
                    .iter()
                    .all(|c| includes.iter().any(|i| i.eq_ignore_ascii_case(c)))
            {
                return false;
            }
            let term = entry.term(column);
            for filter in &query.regex_filters {
                if filter.regex.regex().is_match(term) != filter.positive {
                    return false;
                }
            }
            if let Some(range) = &query.syllables {
                match entry.syllables {
                    Some(n) if range.contains(n) => {}
                    _ => return false,
                }
            }
            true
        })
        .map(|(i, _)| i)
        .collect()
}

/// Resolve a query to an entry's surface form, or to the soft-miss token
/// when nothing matches.
pub fn evaluate(
    query: &Query,
    dictionary: Option<&Dictionary>,
    carriers: &mut CarrierState,
    rng: &mut impl Rng,
) -> String {
    let miss = || format!("<{}?>", query.table);

    let Some(table) = dictionary.and_then(|d| d.table(&query.table)) else {
        return miss();
    };
    let column = match &query.subtype {
        Some(name) => match table.subtype_index(name) {
            Some(i) => i,
            None => return miss(),
        },
        None => 0,
    };

    // A held match carrier short-circuits the filters: later queries
    // inherit the first query's choice.
    if let Some(carrier) = &query.carrier {
        if carrier.kind == CarrierKind::Match {
            if let Some(held) = carriers.get(&carrier.id, &query.table) {
                return table.entries[held].term(column).to_string();
            }
        }
    }

    let mut survivors = filter_indices(query, table);
    if let Some(carrier) = &query.carrier {
        if carrier.kind == CarrierKind::Unique {
            if let Some(held) = carriers.get(&carrier.id, &query.table) {
                survivors.retain(|&i| i != held);
            }
        }
    }
    if survivors.is_empty() {
        return miss();
    }

    let chosen = survivors[rng.gen_range(0..survivors.len())];
    if let Some(carrier) = &query.carrier {
        if carrier.kind == CarrierKind::Match {
            carriers.hold(&carrier.id, &query.table, chosen);
        }
    }
    table.entries[chosen].term(column).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn dict() -> Dictionary {
        Dictionary::from_json(
            r#"{ "tables": [ { "name": "noun", "subtypes": ["singular", "plural"],
                 "entries": [
                   { "terms": ["cat", "cats"], "classes": ["animal"], "syllables": 1 },
                   { "terms": ["dog", "dogs"], "classes": ["animal"], "syllables": 1 },
                   { "terms": ["pangolin", "pangolins"], "classes": ["animal", "rare"], "syllables": 3 },
                   { "terms": ["teacup", "teacups"], "classes": ["object"], "syllables": 2 }
                 ] } ] }"#,
        )
        .unwrap()
    }

    #[test]
    fn include_rules_are_conjunctive() {
        let d = dict();
        let mut q = Query::table("noun");
        q.class_filter.push(ClassFilterRule {
            class_name: "animal".into(),
            include: true,
        });
        q.class_filter.push(ClassFilterRule {
            class_name: "rare".into(),
            include: true,
        });
        assert_eq!(filter_indices(&q, d.table("noun").unwrap()), vec![2]);
    }

    #[test]
    fn exclude_rule_removes_matches() {
        let d = dict();
        let mut q = Query::table("noun");
        q.class_filter.push(ClassFilterRule {
            class_name: "rare".into(),
            include: false,
        });
        assert_eq!(filter_indices(&q, d.table("noun").unwrap()), vec![0, 1, 3]);
    }

    #[test]
    fn exclusive_mode_forbids_extra_classes() {
        let d = dict();
        let mut q = Query::table("noun");
        q.exclusive = true;
        q.class_filter.push(ClassFilterRule {
            class_name: "animal".into(),
            include: true,
        });
        // pangolin also carries "rare", which is not declared.
        assert_eq!(filter_indices(&q, d.table("noun").unwrap()), vec![0, 1]);
    }

    #[test]
    fn syllable_range_is_inclusive() {
        let d = dict();
        let mut q = Query::table("noun");
        q.syllables = Some(SyllableRange {
            min: Some(2),
            max: Some(3),
        });
        assert_eq!(filter_indices(&q, d.table("noun").unwrap()), vec![2, 3]);
    }

    #[test]
    fn regex_filters_apply_to_selected_subtype() {
        let d = dict();
        let mut q = Query::table("noun");
        q.subtype = Some("plural".into());
        q.regex_filters.push(RegexFilter {
            positive: true,
            regex: RantRegex::new("^cat", "").unwrap(),
        });
        assert_eq!(filter_indices(&q, d.table("noun").unwrap()), vec![0]);
    }

    #[test]
    fn missing_table_is_soft() {
        let d = dict();
        let q = Query::table("verb");
        let mut carriers = CarrierState::default();
        let mut rng = Pcg64::seed_from_u64(1);
        assert_eq!(evaluate(&q, Some(&d), &mut carriers, &mut rng), "<verb?>");
    }

    #[test]
    fn match_carrier_pins_the_entry() {
        let d = dict();
        let mut q = Query::table("noun");
        q.carrier = Some(Carrier {
            id: "a".into(),
            kind: CarrierKind::Match,
        });
        let mut carriers = CarrierState::default();
        let mut rng = Pcg64::seed_from_u64(7);
        let first = evaluate(&q, Some(&d), &mut carriers, &mut rng);
        for _ in 0..20 {
            assert_eq!(evaluate(&q, Some(&d), &mut carriers, &mut rng), first);
        }
    }

    #[test]
    fn unique_carrier_avoids_held_entry() {
        let d = dict();
        let mut held = Query::table("noun");
        held.carrier = Some(Carrier {
            id: "a".into(),
            kind: CarrierKind::Match,
        });
        let mut other = Query::table("noun");
        other.carrier = Some(Carrier {
            id: "a".into(),
            kind: CarrierKind::Unique,
        });
        let mut carriers = CarrierState::default();
        let mut rng = Pcg64::seed_from_u64(3);
        let pinned = evaluate(&held, Some(&d), &mut carriers, &mut rng);
        for _ in 0..20 {
            assert_ne!(evaluate(&other, Some(&d), &mut carriers, &mut rng), pinned);
        }
    }
}
