//! Shared value parsing for upstream records.
//!
//! ENERGY STAR CSV exports deliver every cell as text, while SODA JSON
//! delivers a mix of strings and numbers. These helpers accept both.

use efficiency_index_source_models::RawRecord;

/// Returns the first of `fields` holding a non-empty value, together with
/// the column name it came from.
#[must_use]
pub fn first_present<'a>(
    record: &'a RawRecord,
    fields: &'a [String],
) -> Option<(&'a str, &'a serde_json::Value)> {
    fields.iter().find_map(|field| {
        let value = record.get(field)?;
        match value {
            serde_json::Value::String(s) if s.trim().is_empty() => None,
            _ => Some((field.as_str(), value)),
        }
    })
}

/// Renders a scalar JSON value as trimmed text.
#[must_use]
pub fn value_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parses a finite number from a JSON number or a numeric string.
///
/// Thousands separators and surrounding whitespace are ignored.
#[must_use]
pub fn parse_number(value: &serde_json::Value) -> Option<f64> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Parses a yes/no style flag.
#[must_use]
pub fn parse_flag(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" | "1" => Some(true),
            "no" | "n" | "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Cleans an upstream brand name for display.
///
/// Whitespace runs collapse to a single space. Words that are entirely
/// upper- or lowercase are title-cased, except all-caps words of up to
/// three letters (`GE`, `LG`, `A.O.`), which are usually acronyms. Only
/// letters count toward that length, so dotted acronyms stay intact. Mixed
/// case words are already styled by the manufacturer and kept as-is.
#[must_use]
pub fn clean_manufacturer(name: &str) -> String {
    name.split_whitespace()
        .map(clean_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn clean_word(word: &str) -> String {
    let has_upper = word.chars().any(char::is_uppercase);
    let has_lower = word.chars().any(char::is_lowercase);

    if has_upper && !has_lower && word.chars().filter(|c| c.is_alphabetic()).count() <= 3 {
        return word.to_string();
    }
    if has_upper && has_lower {
        return word.to_string();
    }

    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
    })
}
