//! Text-mode directives and the named macros that expand to them.
//!
//! A directive is an alias expression of the form `CommandLine:<text>`.
//! Instead of pressing one key combination it makes the translator type
//! `<text>` character by character inside the firmware's text mode.
//! Inside the text, `{NAME}` stands for the key called `NAME`.

/// Prefix marking a literal-text directive.
pub const LINE_PREFIX: &str = "CommandLine:";

/// Misspelled prefix still found in older configuration files.
pub const LEGACY_LINE_PREFIX: &str = "CommadLine:";

/// Number of cursor-right presses `LOAD_8` uses to skip over the filename
/// the C64 prints after a directory listing.
const LOAD_8_CURSOR_RIGHTS: usize = 19;

/// Returns the text of a `CommandLine:` directive, or `None` if `expr` is
/// not a directive.
pub fn strip_line_prefix(expr: &str) -> Option<&str> {
    expr.strip_prefix(LINE_PREFIX)
        .or_else(|| expr.strip_prefix(LEGACY_LINE_PREFIX))
}

/// Expands a named macro into its directive text.
pub fn expand_macro(name: &str) -> Option<String> {
    let text = match name {
        "LOAD_8" => format!(
            "load{},8:{{RETURN}}",
            "{CURSOR_RIGHT}".repeat(LOAD_8_CURSOR_RIGHTS)
        ),
        "LOAD_DIR" => r#"load"$",8:{RETURN}"#.to_string(),
        "LOAD_ACEONE" => r#"load"http://c64.aceone.se",8:{RETURN}"#.to_string(),
        "LOAD_MEATLOAF" => r#"load"ml:*",8:{RETURN}"#.to_string(),
        _ => return None,
    };
    Some(text)
}

/// Key name substituted for characters that cannot appear verbatim in a
/// combination or that have no printable matrix key.
pub fn normalize_char(c: char) -> Option<&'static str> {
    match c {
        '\n' => Some("RETURN"),
        ' ' => Some("SPACE"),
        // `|` separates combination terms; the C64 shows ↑ in its place.
        '|' => Some("UP_ARROW"),
        // The C64 has no underscore; ← sits on that code point.
        '_' => Some("LEFT_ARROW"),
        _ => None,
    }
}
