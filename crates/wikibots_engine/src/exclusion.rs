//! `{{nobots}}`/`{{bots}}` exclusion-template handling.
//!
//! Lets a page opt a bot (or a class of bot messages) out of edits via the
//! `{{bots}}` template family, following the convention documented at
//! <https://en.wikipedia.org/wiki/Template:Bots>.

fn item_in_list(item: &str, values: &str) -> bool {
    values
        .split(',')
        .map(str::trim)
        .any(|v| v == item || v == "all")
}

/// Returns `true` if `code` contains a `{{nobots}}` template, or a `{{bots}}`
/// template whose `allow`/`deny`/`optout` parameters exclude `bot` (or, for
/// `optout`, `message_type`).
///
/// Scans left to right for `{{`, so later templates are still found even if
/// an earlier one is malformed; only the first matching exclusion wins (the
/// scan doesn't need to keep going once one denies the edit).
pub fn test_bot_exclusion(code: &str, bot: &str, message_type: &str) -> bool {
    let mut rest = code;
    loop {
        let Some(template_begin) = rest.find("{{") else { break };
        let after_open = &rest[template_begin + 2..];
        let Some(name_end_rel) = after_open.find(['|', '{', '}']) else { break };
        let after_name = &after_open[name_end_rel..];
        let Some(template_end_rel) = after_name.find(['{', '}']) else { break };

        let template_name = after_open[..name_end_rel].trim();

        if template_name == "Nobots" || template_name == "nobots" {
            return true;
        } else if (template_name == "Bots" || template_name == "bots") && template_end_rel > 0 {
            let fields = &after_name[1..template_end_rel];
            for field in fields.split('|') {
                let Some(eq) = field.find('=') else { continue };
                let param = field[..eq].trim();
                let values = &field[eq + 1..];
                let denies = (param == "allow" && !item_in_list(bot, values))
                    || (param == "deny" && item_in_list(bot, values))
                    || (param == "optout" && !message_type.is_empty() && item_in_list(message_type, values));
                if denies {
                    return true;
                }
            }
        }

        rest = &after_name[template_end_rel..];
    }
    false
}
