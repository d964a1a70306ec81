//! Host key event → C64 matrix translation.
//!
//! # Pipeline (for beginners)
//!
//! ```text
//! key name ──build_combination──► "SHIFT_LEFT|a" ──combination_to_matrix──► [0x8F, 0x8A]
//!                     │
//!                     └──► CommandLine("load…") ──translate_text──► TEXT-press, one frame per
//!                                                                   character, TEXT-release
//! ```
//!
//! 1. **build_combination** decides *which* keys realise a host key: the
//!    matrix key itself, shift plus the lowercase letter, or an alias from
//!    the configuration.
//! 2. **combination_to_matrix** turns the pipe-joined key names into scan
//!    codes with the press flag applied.
//! 3. **translate** ties the two together and returns the frames to send.
//!
//! The translator is a pure function of its [`KeyConfig`]; it performs no
//! I/O and never fails.  Unknown keys produce no frames and a log line.

pub mod directive;

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::keymap::KeyConfig;
use crate::protocol::frame::MatrixFrame;
use crate::protocol::scancode::ScanCode;

/// Separator between the terms of a combination.
pub const COMBINATION_SEPARATOR: char = '|';

/// Suffix forcing a term to be released while the rest is pressed.
pub const OFF_SUFFIX: &str = "_OFF";

/// Shift term added in front of lowercase letters for uppercase input.
pub const SHIFT_TERM: &str = "SHIFT_LEFT";

/// Shift-release term added in front of `no-shift` keys.
pub const SHIFT_OFF_TERM: &str = "SHIFT_LEFT_OFF";

/// Special key bracketing text-mode input.
pub const TEXT_MODE_KEY: &str = "TEXT";

/// Longest alias chain followed before giving up.
pub const MAX_ALIAS_DEPTH: usize = 16;

/// Matches a `{NAME}` placeholder or any single character, newlines included.
const TOKEN_PATTERN: &str = r"(?s)\{(\w+)\}|.";

fn token_regex() -> &'static Regex {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    TOKEN_RE.get_or_init(|| Regex::new(TOKEN_PATTERN).expect("token pattern is a valid regex"))
}

/// What a host key resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Combination {
    /// Pipe-joined key terms asserted together, e.g. `"SHIFT_LEFT|a"`.
    Keys(String),
    /// Literal text to type in text mode.
    CommandLine(String),
}

/// Translates host key events into matrix frames for one layout.
#[derive(Debug, Clone)]
pub struct KeyTranslator {
    config: KeyConfig,
}

impl KeyTranslator {
    pub fn new(config: KeyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KeyConfig {
        &self.config
    }

    /// Translates one key event into the frames to send, in order.
    ///
    /// A plain key yields at most one frame.  A text directive yields the
    /// whole text-mode sequence on press and nothing on release.  An
    /// unknown key yields nothing.
    pub fn translate(&self, key: &str, pressed: bool) -> Vec<MatrixFrame> {
        match self.build_combination(key, pressed) {
            None => {
                debug!("no combination for key {key:?}");
                Vec::new()
            }
            Some(Combination::CommandLine(text)) => {
                if pressed {
                    self.translate_text(&text)
                } else {
                    Vec::new()
                }
            }
            Some(Combination::Keys(keys)) => {
                let frame = self.combination_to_matrix(&keys, pressed);
                if frame.is_empty() {
                    debug!("unknown key combination: {keys}");
                    Vec::new()
                } else {
                    debug!("key combination: {keys}");
                    debug!("values: {}", frame.hex_string());
                    vec![frame]
                }
            }
        }
    }

    /// Resolves a host key name to the combination that realises it.
    ///
    /// Rules, first match wins:
    /// 1. a matrix key maps to itself, behind `SHIFT_LEFT_OFF` when it is a
    ///    `no-shift` key;
    /// 2. a single uppercase letter maps to `SHIFT_LEFT|<lowercase>`;
    /// 3. a mapped key follows its alias chain.
    ///
    /// On release, the configured special-release key is appended.
    pub fn build_combination(&self, key: &str, pressed: bool) -> Option<Combination> {
        let combination = self.resolve_key(key, &mut Vec::new());
        if pressed {
            return combination;
        }

        let Some(extra) = self.config.release_key(key) else {
            return combination;
        };
        match combination {
            Some(Combination::Keys(keys)) => Some(Combination::Keys(format!(
                "{keys}{COMBINATION_SEPARATOR}{extra}"
            ))),
            None => Some(Combination::Keys(extra.to_string())),
            directive => directive,
        }
    }

    /// Converts a pipe-joined combination into scan codes.
    ///
    /// Each code appears at most once, in first-seen order.  Terms that are
    /// neither matrix nor special keys are dropped.
    pub fn combination_to_matrix(&self, combination: &str, pressed: bool) -> MatrixFrame {
        let mut codes: Vec<ScanCode> = Vec::new();

        for term in combination.split(COMBINATION_SEPARATOR) {
            if term.is_empty() {
                continue;
            }
            let (name, effective) = match term.strip_suffix(OFF_SUFFIX) {
                Some(base) if pressed => (base, false),
                Some(_) => continue,
                None => (term, pressed),
            };

            let Some(code) = self.config.resolve_term(name) else {
                warn!("unknown key {name:?} in combination {combination:?}");
                continue;
            };
            if codes.iter().any(|c| c.value() == code.value()) {
                continue;
            }
            codes.push(code.with_pressed(effective));
        }

        MatrixFrame::new(codes)
    }

    /// Types `text` in the firmware's text mode.
    ///
    /// The result is `TEXT` pressed, one pressed frame per character, then
    /// `TEXT` released.  The firmware releases each character itself.
    /// Returns nothing if the layout lacks the `TEXT` special key.
    pub fn translate_text(&self, text: &str) -> Vec<MatrixFrame> {
        let enter = self.combination_to_matrix(TEXT_MODE_KEY, true);
        if enter.is_empty() {
            warn!(
                "layout {:?} has no {TEXT_MODE_KEY} key; cannot type text",
                self.config.layout()
            );
            return Vec::new();
        }

        let mut frames = vec![enter];
        for token in token_regex().find_iter(text) {
            let name = token_key_name(token.as_str());
            match self.build_combination(name, true) {
                Some(Combination::Keys(keys)) => {
                    let frame = self.combination_to_matrix(&keys, true);
                    if frame.is_empty() {
                        warn!("character {name:?} has no matrix codes; skipped");
                    } else {
                        debug!("text {name:?}: {}", frame.hex_string());
                        frames.push(frame);
                    }
                }
                Some(Combination::CommandLine(_)) => {
                    warn!("nested text directive for {name:?} ignored");
                }
                None => warn!("no combination for character {name:?}; skipped"),
            }
        }
        frames.push(self.combination_to_matrix(TEXT_MODE_KEY, false));
        frames
    }

    fn resolve_key(&self, key: &str, visited: &mut Vec<String>) -> Option<Combination> {
        if self.config.is_matrix_key(key) {
            let keys = if self.config.is_no_shift(key) {
                format!("{SHIFT_OFF_TERM}{COMBINATION_SEPARATOR}{key}")
            } else {
                key.to_string()
            };
            return Some(Combination::Keys(keys));
        }

        if let Some(lower) = shifted_letter(key) {
            return Some(Combination::Keys(format!(
                "{SHIFT_TERM}{COMBINATION_SEPARATOR}{lower}"
            )));
        }

        let alias = self.config.mapping(key)?;
        visited.push(key.to_string());
        self.expand_alias(alias, visited)
    }

    fn expand_alias(&self, alias: &str, visited: &mut Vec<String>) -> Option<Combination> {
        if let Some(text) = directive::strip_line_prefix(alias) {
            return Some(Combination::CommandLine(text.to_string()));
        }
        if let Some(text) = directive::expand_macro(alias) {
            return Some(Combination::CommandLine(text));
        }
        if alias.contains(COMBINATION_SEPARATOR) {
            return Some(Combination::Keys(alias.to_string()));
        }

        if visited.iter().any(|seen| seen == alias) || visited.len() >= MAX_ALIAS_DEPTH {
            warn!(
                "alias chain {} -> {alias} does not terminate; dropping",
                visited.join(" -> ")
            );
            return None;
        }

        let expandable = self.config.is_matrix_key(alias)
            || shifted_letter(alias).is_some()
            || self.config.mapping(alias).is_some();
        if expandable {
            self.resolve_key(alias, visited)
        } else {
            // Terminal token such as a special key name.
            Some(Combination::Keys(alias.to_string()))
        }
    }
}

/// Lowercase form of a single uppercase letter, accented letters included.
fn shifted_letter(key: &str) -> Option<String> {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_alphabetic() && c.is_uppercase() => {
            Some(c.to_lowercase().collect())
        }
        _ => None,
    }
}

/// Key name for one text-mode token: a placeholder loses its braces and
/// reserved characters are renamed.
fn token_key_name(token: &str) -> &str {
    if token.len() > 2 && token.starts_with('{') && token.ends_with('}') {
        return &token[1..token.len() - 1];
    }
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => directive::normalize_char(c).unwrap_or(token),
        _ => token,
    }
}
