//! Reads and writes the single "bot section" of a page: a block of wikitext
//! delimited by `<!-- BEGIN BOT SECTION -->` and `<!-- END BOT SECTION -->`
//! that a bot owns and humans leave alone. Only one bot section per page is
//! supported; a page with none gets one appended on first write.

use std::fmt::Write as _;

/// Behavior flags for [`replace`], combined with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags(u8);

impl Flags {
    /// Fail instead of creating a section if the page doesn't have one.
    pub const MUST_EXIST: Flags = Flags(1);
    /// Don't insert the usual `\n` padding around the section body.
    pub const COMPACT: Flags = Flags(2);
    /// Prefix the body with an `<!-- update #N -->` comment, incremented
    /// on every write. Used on pages that get reset to a base state
    /// (e.g. a periodically-cleared error list) so MediaWiki's rollback
    /// detection doesn't fire when the body shrinks back to empty.
    pub const UPDATE_COUNTER: Flags = Flags(4);

    pub const fn empty() -> Self {
        Flags(0)
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;
    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// The page split around its bot section, and what markers/counter were found.
struct SplitPage<'a> {
    prefix: &'a str,
    bot_section: &'a str,
    suffix: &'a str,
    has_begin_marker: bool,
    has_end_marker: bool,
    update_counter: i64,
}

/// Extracts the next wikicode comment starting at or after `from`.
///
/// Returns `(comment_start, comment_text, normalized_inner, next_search_from)`.
/// If several `<!--` appear before the first `-->`, the comment is assumed to
/// start at the last one (mirrors how MediaWiki's own comment stripping
/// tolerates unmatched nested openers).
fn extract_comment(code: &str, from: usize) -> Option<(usize, &str, String, usize)> {
    const OPENING: &str = "<!--";
    const CLOSING: &str = "-->";

    let mut comment_start = code[from..].find(OPENING)? + from;
    loop {
        let text_start = comment_start + OPENING.len();
        let next_opening = code[text_start..].find(OPENING).map(|p| p + text_start);
        let search_end = next_opening.unwrap_or(code.len());
        match code[text_start..search_end].find(CLOSING) {
            Some(rel_end) => {
                let text_end = text_start + rel_end;
                let comment = &code[comment_start..text_end + CLOSING.len()];
                let normalized = code[text_start..text_end].trim().to_uppercase();
                let next_from = next_opening.unwrap_or(code.len());
                return Some((comment_start, comment, normalized, next_from));
            }
            None => match next_opening {
                Some(next) => comment_start = next,
                None => return None,
            },
        }
    }
}

const UPDATE_COUNTER_PREFIX: &str = "UPDATE #";

fn parse_bot_section(code: &str) -> SplitPage<'_> {
    let mut state = 0u8;
    let mut section_start = 0usize;
    let mut has_begin_marker = false;
    let mut has_end_marker = false;
    let mut update_counter = 0i64;
    let mut prefix_end = 0usize;
    let mut body_end = code.len();
    let mut suffix_start = code.len();

    let mut pos = 0usize;
    while let Some((comment_start, comment, normalized, next_pos)) = extract_comment(code, pos) {
        pos = next_pos;
        match state {
            0 => {
                if normalized == "BEGIN BOT SECTION" || normalized == "DÉBUT DE LA ZONE DE TRAVAIL DU BOT" {
                    has_begin_marker = true;
                    section_start = comment_start + comment.len();
                    prefix_end = section_start;
                    state = 1;
                }
            }
            1 => {
                state = 2;
                if comment_start == prefix_end && normalized.starts_with(UPDATE_COUNTER_PREFIX) {
                    update_counter = normalized[UPDATE_COUNTER_PREFIX.len()..]
                        .parse::<i64>()
                        .unwrap_or(0)
                        .max(0);
                    section_start += comment.len();
                    continue;
                }
                if normalized == "END BOT SECTION" || normalized == "FIN DE LA ZONE DE TRAVAIL DU BOT" {
                    has_end_marker = true;
                    body_end = comment_start;
                    suffix_start = comment_start;
                    state = 3;
                }
            }
            2 | 3 => {
                if normalized == "END BOT SECTION" || normalized == "FIN DE LA ZONE DE TRAVAIL DU BOT" {
                    has_end_marker = true;
                    body_end = comment_start;
                    suffix_start = comment_start;
                    state = 3;
                }
            }
            _ => unreachable!(),
        }
    }

    match state {
        0 => SplitPage {
            prefix: code,
            bot_section: "",
            suffix: "",
            has_begin_marker,
            has_end_marker,
            update_counter,
        },
        1 | 2 => SplitPage {
            prefix: &code[..prefix_end],
            bot_section: &code[section_start..],
            suffix: "",
            has_begin_marker,
            has_end_marker,
            update_counter,
        },
        _ => SplitPage {
            prefix: &code[..prefix_end],
            bot_section: &code[section_start..body_end],
            suffix: &code[suffix_start..],
            has_begin_marker,
            has_end_marker,
            update_counter,
        },
    }
}

fn bot_section_changed(old_body: &str, new_body: &str, flags: Flags) -> bool {
    if !flags.contains(Flags::COMPACT) {
        let Some(mut old_body) = old_body.strip_prefix('\n') else {
            return true;
        };
        if !new_body.is_empty() && !new_body.ends_with('\n') {
            let Some(trimmed) = old_body.strip_suffix('\n') else {
                return true;
            };
            old_body = trimmed;
        }
        return old_body != new_body;
    }
    old_body != new_body
}

/// Returns the bot section's body, or the whole page if the closing marker is
/// missing, or an empty string if there's no bot section at all. A leading
/// `\n` right after the opening marker is stripped.
pub fn read(code: &str) -> &str {
    let body = parse_bot_section(code).bot_section;
    body.strip_prefix('\n').unwrap_or(body)
}

/// Replaces the bot section's body with `new_body`, creating the markers (and
/// the section itself, at the end of the page) if they're missing.
///
/// Returns `false` without modifying `code` if `Flags::MUST_EXIST` is set and
/// the page has no bot section. Returns `true` and leaves `code` untouched if
/// the body is unchanged — with `Flags::UPDATE_COUNTER`, this is what keeps a
/// no-op write from bumping the counter.
pub fn replace(code: &mut String, new_body: &str, flags: Flags) -> bool {
    let split = parse_bot_section(code);

    if !split.has_begin_marker && flags.contains(Flags::MUST_EXIST) {
        return false;
    }
    if !bot_section_changed(split.bot_section, new_body, flags) {
        return true;
    }

    let new_line_1 = if !split.has_begin_marker && !code.is_empty() && !code.ends_with('\n') {
        "\n"
    } else {
        ""
    };
    let begin_marker = if !split.has_begin_marker { "<!-- BEGIN BOT SECTION -->" } else { "" };
    let update_counter_comment = if flags.contains(Flags::UPDATE_COUNTER) {
        let mut s = String::new();
        let _ = write!(s, "<!-- update #{} -->", split.update_counter + 1);
        s
    } else {
        String::new()
    };
    let new_line_2 = if !flags.contains(Flags::COMPACT) { "\n" } else { "" };
    let end_marker = if !split.has_end_marker { "<!-- END BOT SECTION -->" } else { "" };
    let new_line_3 = if !flags.contains(Flags::COMPACT) && !new_body.is_empty() && !new_body.ends_with('\n') {
        "\n"
    } else {
        ""
    };

    let mut rebuilt = String::with_capacity(
        split.prefix.len() + new_line_1.len() + begin_marker.len() + update_counter_comment.len()
            + new_line_2.len() + new_body.len() + new_line_3.len() + end_marker.len() + split.suffix.len(),
    );
    rebuilt.push_str(split.prefix);
    rebuilt.push_str(new_line_1);
    rebuilt.push_str(begin_marker);
    rebuilt.push_str(&update_counter_comment);
    rebuilt.push_str(new_line_2);
    rebuilt.push_str(new_body);
    rebuilt.push_str(new_line_3);
    rebuilt.push_str(end_marker);
    rebuilt.push_str(split.suffix);

    *code = rebuilt;
    true
}
