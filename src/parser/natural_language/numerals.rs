//! Spelled-out hour numerals
//!
//! A single lookup table maps every accepted numeral word to its value. The
//! regex alternation built from it lists longer words first so that `二十三`
//! is never read as `二`.

use once_cell::sync::Lazy;

/// Numeral words accepted as clock hours, 1 to 23.
pub const HOUR_WORDS: &[(&str, u32)] = &[
    ("一", 1),
    ("二", 2),
    ("两", 2),
    ("三", 3),
    ("四", 4),
    ("五", 5),
    ("六", 6),
    ("七", 7),
    ("八", 8),
    ("九", 9),
    ("十", 10),
    ("十一", 11),
    ("十二", 12),
    ("十三", 13),
    ("十四", 14),
    ("十五", 15),
    ("十六", 16),
    ("十七", 17),
    ("十八", 18),
    ("十九", 19),
    ("二十", 20),
    ("二十一", 21),
    ("二十二", 22),
    ("二十三", 23),
];

/// Regex alternation of every numeral word, longest first.
pub static NUMERAL_ALTERNATION: Lazy<String> = Lazy::new(|| {
    let mut words: Vec<&str> = HOUR_WORDS.iter().map(|(word, _)| *word).collect();
    words.sort_by_key(|w| std::cmp::Reverse(w.chars().count()));
    words.join("|")
});

/// Look up a numeral word.
pub fn numeral_value(word: &str) -> Option<u32> {
    HOUR_WORDS.iter().find(|(w, _)| *w == word).map(|(_, value)| *value)
}

/// Parse either ASCII digits or a numeral word.
pub fn parse_number(token: &str) -> Option<u32> {
    if token.chars().all(|c| c.is_ascii_digit()) {
        token.parse().ok()
    } else {
        numeral_value(token)
    }
}
