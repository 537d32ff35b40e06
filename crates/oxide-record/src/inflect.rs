//! English inflection for table-name and foreign-key conventions.

use convert_case::{Case, Casing};

const UNCOUNTABLE: &[&str] = &[
    "equipment",
    "information",
    "metadata",
    "money",
    "news",
    "rice",
    "series",
    "sheep",
    "species",
];

const IRREGULAR: &[(&str, &str)] = &[
    ("child", "children"),
    ("foot", "feet"),
    ("goose", "geese"),
    ("man", "men"),
    ("mouse", "mice"),
    ("ox", "oxen"),
    ("person", "people"),
    ("tooth", "teeth"),
    ("woman", "women"),
];

/// Converts `PascalCase` or `camelCase` to `snake_case`.
#[must_use]
pub fn to_snake_case(name: &str) -> String {
    name.to_case(Case::Snake)
}

/// Pluralizes the last word of a `snake_case` name.
///
/// ```
/// use oxide_record::inflect::pluralize;
///
/// assert_eq!(pluralize("diary_entry"), "diary_entries");
/// assert_eq!(pluralize("box"), "boxes");
/// assert_eq!(pluralize("person"), "people");
/// ```
#[must_use]
pub fn pluralize(word: &str) -> String {
    let (head, last) = split_last(word);
    format!("{head}{}", plural_word(last))
}

/// Singularizes the last word of a `snake_case` name.
#[must_use]
pub fn singularize(word: &str) -> String {
    let (head, last) = split_last(word);
    format!("{head}{}", singular_word(last))
}

/// Infers a table name from a model name.
///
/// `DiaryEntry` becomes `diary_entries`. Names that do not start with an
/// uppercase letter are taken to be table names already and returned as is.
#[must_use]
pub fn table_name_for(model: &str) -> String {
    if !model.chars().next().is_some_and(char::is_uppercase) {
        return model.to_owned();
    }
    pluralize(&to_snake_case(model))
}

/// The conventional foreign-key column pointing at `table`: `posts` → `post_id`.
#[must_use]
pub fn foreign_key_for(table: &str) -> String {
    format!("{}_id", singularize(table))
}

fn split_last(word: &str) -> (&str, &str) {
    word.rfind('_')
        .map_or(("", word), |i| (&word[..=i], &word[i + 1..]))
}

fn plural_word(word: &str) -> String {
    let lower = word.to_lowercase();
    if word.is_empty() || UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_owned();
    }
    if let Some((_, plural)) = IRREGULAR.iter().find(|(single, _)| *single == lower) {
        return (*plural).to_owned();
    }
    if IRREGULAR.iter().any(|(_, plural)| *plural == lower) {
        return word.to_owned();
    }
    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        return format!("{word}es");
    }
    format!("{word}s")
}

fn singular_word(word: &str) -> String {
    let lower = word.to_lowercase();
    if word.is_empty() || UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_owned();
    }
    if let Some((single, _)) = IRREGULAR.iter().find(|(_, plural)| *plural == lower) {
        return (*single).to_owned();
    }
    if IRREGULAR.iter().any(|(single, _)| *single == lower) {
        return word.to_owned();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{stem}y");
        }
    }
    for suffix in ["sses", "ches", "shes", "xes", "zes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_owned();
        }
    }
    if word.ends_with("ss") {
        return word.to_owned();
    }
    word.strip_suffix('s').unwrap_or(word).to_owned()
}
