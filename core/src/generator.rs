//! Password generator: charset assembly plus shuffle-and-pick.
//!
//! The option names match the `user.*` keys the option board keeps in the
//! Monitor tree, so `GeneratorOptions::from_value(monitor.get("user"))`
//! reads the live settings directly.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;


pub const LETTERS: &str = "abcdefghijklmnopqrstuvwxyz";
pub const NUMBERS: &str = "0123456789";
pub const PUNCTUATION: &str = ".?!,;:-'\"";
pub const ENCLOSURES: &str = "(){}[]<>";
pub const SYMBOLS: &str = "@#$%^&*";
pub const AMBIGUOUS: &str = "~`_=+\\|/";
pub const SIMILAR: &str = "1iIlL0oO";
pub const HEX: &str = "0123456789ABCDEF";

pub const MIN_LENGTH: u64 = 1;
pub const MAX_LENGTH: u64 = 1024;


#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerateError {
    #[error("no characters to choose from: every character class is off")]
    EmptyCharset,
    #[error("cannot read generator options: {0}")]
    BadOptions(String),
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorOptions {
    pub ambiguous: bool,
    pub enclosures: bool,
    pub lowercase: bool,
    pub numbers: bool,
    pub punctuation: bool,
    /// Keep look-alike characters (`1iIlL0oO`).
    pub similar: bool,
    pub spaces: bool,
    pub symbols: bool,
    pub uppercase: bool,
    /// Replace the whole set with `0-9A-F`.
    pub hexonly: bool,
    #[serde(rename = "plength", alias = "length")]
    pub length: u64,
    /// Template where each `?` becomes a random character.
    pub format: Option<String>,
    /// Use exactly these characters instead of the classes above.
    pub charset: Option<String>,
    pub include: Option<String>,
    pub exclude: Option<String>,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        GeneratorOptions {
            ambiguous: true,
            enclosures: true,
            lowercase: true,
            numbers: true,
            punctuation: true,
            similar: true,
            spaces: false,
            symbols: true,
            uppercase: true,
            hexonly: false,
            length: 20,
            format: None,
            charset: None,
            include: None,
            exclude: None,
        }
    }
}

impl GeneratorOptions {
    /// Read options from a mapping such as the Monitor's `user` subtree.
    /// Missing keys fall back to the defaults; unknown keys are ignored.
    pub fn from_value(value: &Value) -> Result<Self, GenerateError> {
        serde_json::from_value(value.clone()).map_err(|e| GenerateError::BadOptions(e.to_string()))
    }
}


/// Clamp a requested length into the accepted range.
pub fn clamp_length(n: u64) -> u64 {
    n.clamp(MIN_LENGTH, MAX_LENGTH)
}


/// Assemble the candidate characters for `opts`.
pub fn build_charset(opts: &GeneratorOptions) -> Vec<char> {
    if let Some(custom) = &opts.charset {
        return apply_includes(opts, custom.clone()).chars().collect();
    }

    let mut set = String::new();
    if opts.uppercase {
        set.push_str(&LETTERS.to_uppercase());
    }
    if opts.lowercase {
        set.push_str(LETTERS);
    }
    if opts.numbers {
        set.push_str(NUMBERS);
    }
    if opts.punctuation {
        set.push_str(PUNCTUATION);
    }
    if opts.enclosures {
        set.push_str(ENCLOSURES);
    }
    if opts.symbols {
        set.push_str(SYMBOLS);
    }
    if opts.ambiguous {
        set.push_str(AMBIGUOUS);
    }
    if opts.spaces {
        set.push(' ');
    }
    if !opts.similar {
        set.retain(|c| !SIMILAR.contains(c));
    }
    if opts.hexonly {
        set = HEX.to_string();
    }

    apply_includes(opts, set).chars().collect()
}


/// Generate one password.
pub fn generate<R: Rng>(opts: &GeneratorOptions, rng: &mut R) -> Result<String, GenerateError> {
    let mut charset = build_charset(opts);
    if charset.is_empty() {
        return Err(GenerateError::EmptyCharset);
    }

    let mut pick = |rng: &mut R| {
        charset.shuffle(rng);
        charset[rng.random_range(0..charset.len())]
    };

    match &opts.format {
        Some(format) => Ok(format
            .chars()
            .map(|c| if c == '?' { pick(&mut *rng) } else { c })
            .collect()),
        None => Ok((0..opts.length).map(|_| pick(&mut *rng)).collect()),
    }
}


fn apply_includes(opts: &GeneratorOptions, mut set: String) -> String {
    if let Some(exclude) = &opts.exclude {
        set.retain(|c| !exclude.contains(c));
    }
    if let Some(include) = &opts.include {
        set.push_str(include);
    }
    set
}
