//! Static two-stage county-name lookup.
//!
//! The portal's column headers have drifted over the years: English and
//! German spellings, renamed administrative units, and counties that
//! were merged into neighbours. Pass 1 folds raw header variants onto
//! one canonical county name; pass 2 maps canonical names onto the
//! final administrative code. The passes are applied in order and kept
//! separate on purpose — collapsing them into one map would lose the
//! ability to route several historical spellings through one canonical
//! name.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Aggregate column exported alongside the per-district Berlin columns.
/// Not a county; excluded before the reshape.
pub const BERLIN_AGGREGATE: &str = "City of Berlin";

/// Pass 1: raw header variants → canonical county name.
static NAME_VARIANTS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        // renamed units
        ("LK Aachen", "Städteregion Aachen"),
        ("SK Aachen", "Städteregion Aachen"),
        ("Stadtverband Saarbrücken", "Regionalverband Saarbrücken"),
        ("LK Hannover", "Region Hannover"),
        ("SK Hannover", "Region Hannover"),
        // merged units, reported under the absorbing county
        ("LK Osterode am Harz", "LK Göttingen"),
        ("SK Eisenach", "Wartburgkreis"),
        ("LK Eisenach", "Wartburgkreis"),
        // spelling drift
        ("LK St. Wendel", "LK Sankt Wendel"),
        ("Berlin-Mitte", "SK Berlin Mitte"),
        ("Berlin-Pankow", "SK Berlin Pankow"),
        ("Berlin-Spandau", "SK Berlin Spandau"),
        ("Berlin-Neukölln", "SK Berlin Neukölln"),
        ("Berlin-Lichtenberg", "SK Berlin Lichtenberg"),
        ("Berlin-Reinickendorf", "SK Berlin Reinickendorf"),
        ("Berlin-Friedrichshain-Kreuzberg", "SK Berlin Friedrichshain-Kreuzberg"),
        ("Berlin-Charlottenburg-Wilmersdorf", "SK Berlin Charlottenburg-Wilmersdorf"),
        ("Berlin-Steglitz-Zehlendorf", "SK Berlin Steglitz-Zehlendorf"),
        ("Berlin-Tempelhof-Schöneberg", "SK Berlin Tempelhof-Schöneberg"),
        ("Berlin-Treptow-Köpenick", "SK Berlin Treptow-Köpenick"),
        ("Berlin-Marzahn-Hellersdorf", "SK Berlin Marzahn-Hellersdorf"),
    ])
});

/// Pass 2: canonical county name → administrative code. Codes are kept
/// as exported (leading zeros dropped); the transformer pads to the
/// 5-character key width.
static COUNTY_CODES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("SK Flensburg", "1001"),
        ("SK Kiel", "1002"),
        ("SK Lübeck", "1003"),
        ("SK Neumünster", "1004"),
        ("LK Dithmarschen", "1051"),
        ("SK Hamburg", "2000"),
        ("LK Göttingen", "3159"),
        ("Region Hannover", "3241"),
        ("SK Köln", "5315"),
        ("Städteregion Aachen", "5334"),
        ("SK Frankfurt am Main", "6412"),
        ("SK Stuttgart", "8111"),
        ("SK München", "9162"),
        ("LK Sankt Wendel", "10046"),
        ("Regionalverband Saarbrücken", "10041"),
        ("SK Berlin Mitte", "11001"),
        ("SK Berlin Friedrichshain-Kreuzberg", "11002"),
        ("SK Berlin Pankow", "11003"),
        ("SK Berlin Charlottenburg-Wilmersdorf", "11004"),
        ("SK Berlin Spandau", "11005"),
        ("SK Berlin Steglitz-Zehlendorf", "11006"),
        ("SK Berlin Tempelhof-Schöneberg", "11007"),
        ("SK Berlin Neukölln", "11008"),
        ("SK Berlin Treptow-Köpenick", "11009"),
        ("SK Berlin Marzahn-Hellersdorf", "11010"),
        ("SK Berlin Lichtenberg", "11011"),
        ("SK Berlin Reinickendorf", "11012"),
        ("SK Potsdam", "12054"),
        ("LK Mecklenburgische Seenplatte", "13071"),
        ("SK Dresden", "14612"),
        ("SK Leipzig", "14713"),
        ("SK Erfurt", "16051"),
        ("Wartburgkreis", "16063"),
    ])
});

/// Resolve one raw county header through both passes. Names missing
/// from a pass travel through it unchanged, so an already-canonical
/// name or an already-numeric key is not an error.
pub fn resolve(raw: &str) -> String {
    let raw = raw.trim();
    let canonical = NAME_VARIANTS.get(raw).copied().unwrap_or(raw);
    COUNTY_CODES
        .get(canonical)
        .copied()
        .unwrap_or(canonical)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_routes_through_canonical_name() {
        // two raw spellings, one code
        assert_eq!(resolve("LK Aachen"), "5334");
        assert_eq!(resolve("Städteregion Aachen"), "5334");
    }

    #[test]
    fn merged_county_reports_under_absorbing_unit() {
        assert_eq!(resolve("LK Osterode am Harz"), "3159");
        assert_eq!(resolve("SK Eisenach"), "16063");
    }

    #[test]
    fn unknown_name_passes_through_both_stages() {
        assert_eq!(resolve("LK Nirgendwo"), "LK Nirgendwo");
        assert_eq!(resolve("1001"), "1001");
    }

    #[test]
    fn whitespace_is_trimmed_before_lookup() {
        assert_eq!(resolve("  SK Hamburg "), "2000");
    }
}
