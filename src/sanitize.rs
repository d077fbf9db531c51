//! Filename sanitizing for relayed files
//!
//! Titles coming back from the media source are free text: punctuation, mixed
//! scripts, emoji and runs of spaces. Before a file is uploaded its name goes
//! through a fixed pipeline:
//!
//! 1. [`clean_punctuation`] drops a small blacklist of symbols and spells `&` as `and`
//! 2. [`transliterate`] (optional) converts Cyrillic to Latin
//! 3. [`strip_foreign`] drops glyphs from blacklisted code-point ranges
//! 4. whitespace runs become a single underscore
//!
//! Every step is total: characters a step does not know about pass through
//! unchanged.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// Symbols removed outright by [`clean_punctuation`]
const PUNCTUATION_BLACKLIST: &[char] = &['!', '@', '#', '«', '$', '»'];

/// Code-point ranges dropped by [`strip_foreign`] (CJK unified ideographs)
const FOREIGN_RANGES: &[RangeInclusive<char>] = &['\u{4E00}'..='\u{9FA5}'];

/// Stem used when sanitizing leaves nothing of the original file name
const FALLBACK_STEM: &str = "track";

/// Latin clusters and short English words replaced before single-letter
/// mapping when transliterating Latin to Cyrillic. Order matters: earlier
/// entries are substituted first.
const REVERSE_CLUSTERS: &[(&str, &str)] = &[
    ("Zh", "Ж"),
    ("Ts", "Ц"),
    ("Ch", "Ч"),
    ("Sh", "Ш"),
    ("Sch", "Щ"),
    ("Yu", "Ю"),
    ("Ya", "Я"),
    ("Yo", "Ё"),
    ("yo", "ё"),
    ("zh", "ж"),
    ("ts", "ц"),
    ("ch", "ч"),
    ("sh", "ш"),
    ("sch", "щ"),
    ("yu", "ю"),
    ("ya", "я"),
    ("a ", ""),
    ("A ", ""),
    ("An ", ""),
    ("an ", ""),
    ("The ", ""),
    ("the ", ""),
    ("of ", ""),
    ("Of ", ""),
    ("To ", "к "),
    ("to ", "к "),
    ("On ", "на "),
    ("on ", "на "),
    ("in ", "в"),
    ("In ", "в "),
    ("is ", ""),
    ("Is ", ""),
    ("are ", ""),
    ("Are ", ""),
];

/// Transliteration direction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Cyrillic to Latin, character by character
    CyrillicToLatin,
    /// Latin to Cyrillic, clusters and short words first, then single letters
    LatinToCyrillic,
}

/// Run the whole pipeline on a bare name
///
/// # Examples
///
/// ```
/// use audio_relay::sanitize::sanitize;
///
/// assert_eq!(sanitize("Песня Title", true), "Pesnya_Title");
/// assert_eq!(sanitize("Rock & Roll!", false), "Rock_and_Roll");
/// assert_eq!(sanitize("", true), "");
/// ```
#[must_use]
pub fn sanitize(raw: &str, transliterate_text: bool) -> String {
    let cleaned = clean_punctuation(raw);
    let converted = if transliterate_text {
        transliterate(&cleaned, Direction::CyrillicToLatin)
    } else {
        cleaned
    };
    underscore_whitespace(&strip_foreign(&converted))
}

/// Sanitize the file name of `path`, keeping its directory and extension
///
/// The returned path is where the file should be renamed to. A stem that
/// sanitizes to nothing is replaced with a fixed fallback.
#[must_use]
pub fn sanitize_path(path: &Path, transliterate_text: bool) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut clean_stem = sanitize(&stem, transliterate_text);
    if clean_stem.is_empty() {
        clean_stem = FALLBACK_STEM.to_string();
    }

    let file_name = match extension {
        Some(ext) => format!("{}.{}", clean_stem, sanitize(&ext, transliterate_text)),
        None => clean_stem,
    };

    match path.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// Remove blacklisted symbols and replace `&` with the word `and`
#[must_use]
pub fn clean_punctuation(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '&' {
            out.push_str("and");
        } else if !PUNCTUATION_BLACKLIST.contains(&c) {
            out.push(c);
        }
    }
    out
}

/// Transliterate between Cyrillic and Latin
///
/// An uppercase letter that maps to several letters (`Ж` → `Zh`) stays
/// title-cased only when the next character is a lowercase letter of the same
/// table; otherwise the whole cluster is uppercased (`ЖУК` → `ZHUK`).
///
/// The two directions are deliberately not inverses of each other: the
/// Latin-to-Cyrillic direction also rewrites or drops short English words.
///
/// ```
/// use audio_relay::sanitize::{transliterate, Direction};
///
/// assert_eq!(transliterate("Жук", Direction::CyrillicToLatin), "Zhuk");
/// assert_eq!(transliterate("ЖУК", Direction::CyrillicToLatin), "ZHUK");
/// assert_eq!(transliterate("Sasha", Direction::LatinToCyrillic), "Саша");
/// ```
#[must_use]
pub fn transliterate(s: &str, direction: Direction) -> String {
    match direction {
        Direction::CyrillicToLatin => map_letters(s, cyrillic_lower, cyrillic_upper),
        Direction::LatinToCyrillic => {
            let mut replaced = s.to_string();
            for (from, to) in REVERSE_CLUSTERS {
                if replaced.contains(from) {
                    replaced = replaced.replace(from, to);
                }
            }
            map_letters(&replaced, latin_lower, latin_upper)
        }
    }
}

/// Drop characters that fall inside a blacklisted code-point range
#[must_use]
pub fn strip_foreign(s: &str) -> String {
    s.chars()
        .filter(|c| !FOREIGN_RANGES.iter().any(|range| range.contains(c)))
        .collect()
}

fn underscore_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_run = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_run {
                out.push('_');
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

fn map_letters(
    s: &str,
    lower: fn(char) -> Option<&'static str>,
    upper: fn(char) -> Option<&'static str>,
) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() * 2);

    for (index, &c) in chars.iter().enumerate() {
        if let Some(mapped) = lower(c) {
            out.push_str(mapped);
        } else if let Some(mapped) = upper(c) {
            let next_is_lower = chars
                .get(index + 1)
                .is_some_and(|&next| lower(next).is_some());
            if next_is_lower {
                out.push_str(mapped);
            } else {
                out.push_str(&mapped.to_uppercase());
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn cyrillic_lower(c: char) -> Option<&'static str> {
    let mapped = match c {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' => "e",
        'ё' => "yo",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'й' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "h",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "sch",
        'ъ' => "",
        'ы' => "y",
        'ь' => "",
        'э' => "e",
        'ю' => "yu",
        'я' => "ya",
        _ => return None,
    };
    Some(mapped)
}

fn cyrillic_upper(c: char) -> Option<&'static str> {
    let mapped = match c {
        'А' => "A",
        'Б' => "B",
        'В' => "V",
        'Г' => "G",
        'Д' => "D",
        'Е' => "E",
        'Ё' => "E",
        'Ж' => "Zh",
        'З' => "Z",
        'И' => "I",
        'Й' => "Y",
        'К' => "K",
        'Л' => "L",
        'М' => "M",
        'Н' => "N",
        'О' => "O",
        'П' => "P",
        'Р' => "R",
        'С' => "S",
        'Т' => "T",
        'У' => "U",
        'Ф' => "F",
        'Х' => "H",
        'Ц' => "Ts",
        'Ч' => "Ch",
        'Ш' => "Sh",
        'Щ' => "Sch",
        'Ъ' => "",
        'Ы' => "Y",
        'Ь' => "",
        'Э' => "E",
        'Ю' => "Yu",
        'Я' => "Ya",
        _ => return None,
    };
    Some(mapped)
}

fn latin_lower(c: char) -> Option<&'static str> {
    let mapped = match c {
        'a' => "а",
        'b' => "б",
        'v' => "в",
        'g' => "г",
        'd' => "д",
        'e' => "э",
        'z' => "з",
        'i' => "и",
        'y' => "ы",
        'k' => "к",
        'l' => "л",
        'm' => "м",
        'n' => "н",
        'o' => "о",
        'p' => "п",
        'r' => "р",
        's' => "с",
        't' => "т",
        'u' => "у",
        'f' => "ф",
        'h' => "х",
        'j' => "дж",
        _ => return None,
    };
    Some(mapped)
}

fn latin_upper(c: char) -> Option<&'static str> {
    let mapped = match c {
        'A' => "А",
        'B' => "Б",
        'V' => "В",
        'G' => "Г",
        'D' => "Д",
        'E' => "Э",
        'Z' => "З",
        'I' => "И",
        'Y' => "Ы",
        'K' => "К",
        'L' => "Л",
        'M' => "М",
        'N' => "Н",
        'O' => "О",
        'P' => "П",
        'R' => "Р",
        'S' => "С",
        'T' => "Т",
        'U' => "У",
        'F' => "Ф",
        'H' => "Х",
        'J' => "Дж",
        _ => return None,
    };
    Some(mapped)
}
