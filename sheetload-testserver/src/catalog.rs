use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sheet {
    pub id: u64,
    pub name: &'static str,
    pub composer: &'static str,
    pub category: &'static str,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub id: u64,
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub family: &'static str,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySlot {
    pub id: u64,
    pub instrument_id: u64,
    pub start_date: &'static str,
    pub end_date: &'static str,
}

pub const SHEET_CATEGORIES: &[&str] = &["CLASSICAL", "ROCK", "JAZZ", "POP", "BLUES"];
pub const INSTRUMENT_TYPES: &[&str] = &["ACOUSTIC", "ELECTRIC", "DIGITAL"];
pub const INSTRUMENT_FAMILIES: &[&str] = &["KEYBOARD", "GUITAR", "STRING", "WIND", "PERCUSSION"];

pub fn sheets() -> Vec<Sheet> {
    vec![
        Sheet {
            id: 1,
            name: "Moonlight Sonata",
            composer: "Beethoven",
            category: "CLASSICAL",
            price: 4.5,
        },
        Sheet {
            id: 2,
            name: "Piano Sonata No. 11",
            composer: "Mozart",
            category: "CLASSICAL",
            price: 3.0,
        },
        Sheet {
            id: 3,
            name: "Stairway to Heaven",
            composer: "Led Zeppelin",
            category: "ROCK",
            price: 6.0,
        },
        Sheet {
            id: 4,
            name: "Take Five",
            composer: "Paul Desmond",
            category: "JAZZ",
            price: 5.25,
        },
    ]
}

pub fn instruments() -> Vec<Instrument> {
    vec![
        Instrument {
            id: 1,
            name: "Yamaha Grand Piano",
            kind: "ACOUSTIC",
            family: "KEYBOARD",
            price: 120.0,
        },
        Instrument {
            id: 2,
            name: "Fender Stratocaster",
            kind: "ELECTRIC",
            family: "GUITAR",
            price: 35.0,
        },
        Instrument {
            id: 3,
            name: "Roland Digital Piano",
            kind: "DIGITAL",
            family: "KEYBOARD",
            price: 40.0,
        },
        Instrument {
            id: 4,
            name: "Stradivarius Copy Violin",
            kind: "ACOUSTIC",
            family: "STRING",
            price: 60.0,
        },
    ]
}

pub fn availability(instrument_id: u64) -> Vec<AvailabilitySlot> {
    vec![AvailabilitySlot {
        id: instrument_id * 10,
        instrument_id,
        start_date: "2026-01-01",
        end_date: "2026-12-31",
    }]
}

/// Price of any catalog item. Sheets and instruments share one id space for pricing,
/// sheets first.
pub fn item_price(id: u64) -> Option<f64> {
    sheets()
        .into_iter()
        .find(|s| s.id == id)
        .map(|s| s.price)
        .or_else(|| instruments().into_iter().find(|i| i.id == id).map(|i| i.price))
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
