//! Input canonicalization ahead of feature construction.
//!
//! Neighborhood spellings are folded onto the names the model was trained
//! with, story counts stand in for the floor of houses and villas, and
//! transient fields are dropped. Nothing here fails: malformed optional
//! values are simply left out of the record.

use crate::features::{ListingRecord, Scalar};
use crate::query::PriceQuery;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Free-text spelling (trimmed, lower-cased) → canonical neighborhood name.
const NEIGHBORHOOD_ALIASES: &[(&str, &str)] = &[
    ("shmesani", "Shmaisani"),
    ("um uthina", "Um Uthaiena"),
    ("rabieh", "Al Rabiah"),
    ("swefieh", "Swefieh"),
    ("abdoun", "Abdoun"),
    ("abdoun al janobi", "Abdoun"),
    ("abdoun al shamali", "Abdoun"),
    ("dabouq", "Dabouq"),
    ("deir ghbar", "Deir Ghbar"),
    ("mecca st", "Mecca St"),
    ("mecca street", "Mecca St"),
    ("mecca", "Mecca St"),
    ("jabal amman", "Jabal Amman"),
    ("khalda", "Khalda"),
    ("tla ali", "Tla Ali"),
    ("tla al ali", "Tla Ali"),
    ("tla al ali al shamali", "Tla Ali"),
    ("tla al ali al sharqi", "Tla Ali"),
    ("jubeiha", "Jubaiha"),
    ("jubaiha", "Jubaiha"),
    ("university", "University District"),
    ("university street", "University District"),
    ("seventh circle", "7th Circle"),
    ("7th circle", "7th Circle"),
    ("al gardens", "Gardens"),
    ("gardens", "Gardens"),
    ("um uthaiena al gharbi", "Um Uthaiena"),
    ("um uthaiena al sharqi", "Um Uthaiena"),
    ("nazzal", "Hai Nazzal"),
    ("yasmeen", "Daheit Al Yasmeen"),
    ("al yasmeen", "Daheit Al Yasmeen"),
    ("rasheed", "Daheit Al Rasheed"),
    ("al rasheed", "Daheit Al Rasheed"),
    ("hussain", "Jabal Al Hussain"),
    ("jabal hussain", "Jabal Al Hussain"),
    ("lweibdeh", "Jabal Al-Lweibdeh"),
    ("al lweibdeh", "Jabal Al-Lweibdeh"),
    ("nuzha", "Jabal Al Nuzha"),
    ("al nuzha", "Jabal Al Nuzha"),
    ("taj", "Jabal Al-Taj"),
    ("al taj", "Jabal Al-Taj"),
    ("bayader", "Al Bayader"),
    ("al bayader wadi al seer", "Al Bayader"),
    ("bnayyat", "Al Bnayyat"),
    ("bunayat", "Al Bnayyat"),
    ("jandaweel", "Al Jandaweel"),
    ("kursi", "Al Kursi"),
    ("rawnaq", "Al Rawnaq"),
    ("ridwan", "Al Ridwan"),
    ("urdon st", "Al Urdon Street"),
    ("urdon street", "Al Urdon Street"),
    ("yadudah", "Al Yadudah"),
    ("summaq", "Um El Summaq"),
    ("um summaq", "Um El Summaq"),
    ("umm summaq", "Um El Summaq"),
    ("ashrafyeh", "Al Ashrafyeh"),
    ("al ashrafyeh", "Al Ashrafyeh"),
    ("muqabalain", "Al Muqabalain"),
    ("al muqabalain", "Al Muqabalain"),
    ("qwaismeh", "Al Qwaismeh"),
    ("al qwaismeh", "Al Qwaismeh"),
    ("nakheel", "Dahiet Al-Nakheel"),
    ("al nakheel", "Dahiet Al-Nakheel"),
    ("rawda", "Dahiet Al-Rawda"),
    ("al rawda", "Dahiet Al-Rawda"),
    ("zohor", "Jabal Al Zohor"),
    ("al zohor", "Jabal Al Zohor"),
    ("zohoor", "Jabal Al Zohor"),
    ("al zohoor", "Jabal Al Zohor"),
    ("nathif", "Jabal Al-Nathif"),
    ("al nathif", "Jabal Al-Nathif"),
    ("marj al hamam", "Marj El Hamam"),
    ("tabarbour", "Tabarboor"),
    ("kamaliya", "Al Kamaliya"),
    ("al kamaliya", "Al Kamaliya"),
    ("haj hassan", "Daheit Al-Haj Hassan"),
    ("al haj hassan", "Daheit Al-Haj Hassan"),
    ("ameer hasan", "Daheit Al Ameer Hasan"),
    ("al ameer hasan", "Daheit Al Ameer Hasan"),
];

static BUILTIN: Lazy<NeighborhoodAliasTable> =
    Lazy::new(|| NeighborhoodAliasTable::from_pairs(NEIGHBORHOOD_ALIASES.iter().copied()));

/// Read-only mapping from neighborhood spellings to canonical names.
#[derive(Debug, Clone)]
pub struct NeighborhoodAliasTable {
    aliases: HashMap<String, String>,
}

impl NeighborhoodAliasTable {
    /// The process-wide table the model was trained against.
    pub fn builtin() -> &'static NeighborhoodAliasTable {
        &BUILTIN
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let aliases = pairs
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v.to_string()))
            .collect();
        Self { aliases }
    }

    /// Canonical form of a neighborhood name. Unmapped names are title-cased.
    pub fn canonical(&self, raw: &str) -> String {
        let key = raw.trim().to_lowercase();
        match self.aliases.get(&key) {
            Some(name) => name.clone(),
            None => title_case(&key),
        }
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Iterate over the distinct canonical names.
    pub fn canonical_names(&self) -> impl Iterator<Item = &str> {
        let mut names: Vec<&str> = self.aliases.values().map(String::as_str).collect();
        names.sort_unstable();
        names.dedup();
        names.into_iter()
    }
}

/// Title-case with word-boundary semantics: a letter is upper-cased when the
/// character before it is not a cased letter, lower-cased otherwise.
///
/// `"jabal al-lweibdeh"` → `"Jabal Al-Lweibdeh"`, `"7th"` → `"7Th"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_cased = false;
    for ch in s.chars() {
        let cased = ch.is_lowercase() || ch.is_uppercase();
        if cased {
            if prev_cased {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
        } else {
            out.push(ch);
        }
        prev_cased = cased;
    }
    out
}

/// Turn a validated query into the record the feature builder consumes.
pub fn normalize(query: &PriceQuery, aliases: &NeighborhoodAliasTable) -> ListingRecord {
    let floor = match query.floor {
        None if query.property_type.counts_stories() => query.total_floors,
        floor => floor,
    };

    let area = query.area_sqm;
    let area_sq = (area.is_finite() && area > 0.0).then(|| area * area);

    ListingRecord {
        bedrooms: Some(Scalar::Number(f64::from(query.bedrooms))),
        bathrooms: Some(Scalar::Number(f64::from(query.bathrooms))),
        area_sqm: Some(Scalar::Number(area)),
        area_sq,
        floor: floor.map(Scalar::Number),
        building_age: query.building_age.map(Scalar::Number),
        city: query.city.clone(),
        neighborhood: aliases.canonical(&query.neighborhood),
        property_type: query.property_type.as_str().to_string(),
        furnished: Some(Scalar::Bool(query.furnished)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::fixtures::request;

    #[test]
    fn test_title_case_word_boundaries() {
        assert_eq!(title_case("jabal al-lweibdeh"), "Jabal Al-Lweibdeh");
        assert_eq!(title_case("DEIR GHBAR"), "Deir Ghbar");
        assert_eq!(title_case("7th circle"), "7Th Circle");
        assert_eq!(title_case(""), "");
        assert_eq!(title_case("مفروش"), "مفروش");
    }

    #[test]
    fn test_alias_lookup_is_case_insensitive() {
        let table = NeighborhoodAliasTable::builtin();
        assert_eq!(table.canonical("  SHMESANI "), "Shmaisani");
        assert_eq!(table.canonical("Tla Al Ali Al Shamali"), "Tla Ali");
        assert_eq!(table.canonical("seventh circle"), "7th Circle");
    }

    #[test]
    fn test_unmapped_neighborhood_title_cased() {
        let table = NeighborhoodAliasTable::builtin();
        assert_eq!(table.canonical("  wadi saqra "), "Wadi Saqra");
        assert_eq!(table.canonical(""), "");
    }

    #[test]
    fn test_canonical_names_are_fixed_points() {
        let table = NeighborhoodAliasTable::builtin();
        for name in table.canonical_names() {
            assert_eq!(table.canonical(name), name, "alias target `{name}` not stable");
        }
        let once = table.canonical("um summaq");
        assert_eq!(table.canonical(&once), once);
    }

    #[test]
    fn test_villa_floor_defaults_to_total_floors() {
        let mut req = request("Villa");
        req.floor = None;
        req.total_floors = Some(3.0);
        let record = normalize(&req.validate().unwrap(), NeighborhoodAliasTable::builtin());
        assert_eq!(record.floor, Some(Scalar::Number(3.0)));
    }

    #[test]
    fn test_apartment_ignores_total_floors() {
        let mut req = request("Apartment");
        req.floor = None;
        req.total_floors = Some(9.0);
        let record = normalize(&req.validate().unwrap(), NeighborhoodAliasTable::builtin());
        assert_eq!(record.floor, None);
    }

    #[test]
    fn test_explicit_floor_wins_over_total_floors() {
        let mut req = request("House");
        req.floor = Some(2.0);
        req.total_floors = Some(4.0);
        let record = normalize(&req.validate().unwrap(), NeighborhoodAliasTable::builtin());
        assert_eq!(record.floor, Some(Scalar::Number(2.0)));
    }

    #[test]
    fn test_area_square_derived() {
        let record = normalize(
            &request("Apartment").validate().unwrap(),
            NeighborhoodAliasTable::builtin(),
        );
        assert_eq!(record.area_sq, Some(22_500.0));
        assert_eq!(record.neighborhood, "Khalda");
        assert_eq!(record.property_type, "Apartment");
        assert_eq!(record.furnished, Some(Scalar::Bool(false)));
    }
}
