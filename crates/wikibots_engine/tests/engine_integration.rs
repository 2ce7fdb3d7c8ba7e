use wikibots_engine::bot_section::{self, Flags};
use wikibots_engine::exclusion::test_bot_exclusion;
use wikibots_engine::namespace_util::parse_title;

#[test]
fn bot_section_round_trips_through_a_human_edited_page() {
    let mut page = String::from("Some intro text written by a human.\n\nSee also: [[Other page]]\n");

    assert!(bot_section::replace(&mut page, "* Item one\n* Item two\n", Flags::empty()));
    assert!(page.contains("BEGIN BOT SECTION"));
    assert!(page.contains("Item one"));
    assert!(page.contains("Some intro text written by a human."));

    // A human edits around the bot section; the next replace only touches
    // the section body, leaving their edit untouched.
    page.push_str("\nA human added this note afterward.\n");
    assert!(bot_section::replace(&mut page, "* Item one\n* Item two\n* Item three\n", Flags::empty()));
    assert!(page.contains("Item three"));
    assert!(page.contains("A human added this note afterward."));

    let body = bot_section::read(&page);
    assert!(body.contains("Item three"));
}

#[test]
fn bot_section_must_exist_fails_on_a_page_with_no_section() {
    let mut page = String::from("No bot section here.");
    assert!(!bot_section::replace(&mut page, "new body", Flags::MUST_EXIST));
    assert_eq!(page, "No bot section here.");
}

#[test]
fn exclusion_blocks_nobots_but_allows_named_optout() {
    assert!(test_bot_exclusion("{{nobots}}", "ExampleBot", ""));
    assert!(!test_bot_exclusion("no template here", "ExampleBot", ""));

    // optout only denies this bot's message type, not unrelated maintenance.
    assert!(test_bot_exclusion(
        "{{bots|optout=maintenance}}",
        "ExampleBot",
        "maintenance"
    ));
    assert!(!test_bot_exclusion(
        "{{bots|optout=maintenance}}",
        "ExampleBot",
        "newsletter"
    ));

    assert!(test_bot_exclusion("{{bots|deny=ExampleBot}}", "ExampleBot", ""));
    assert!(!test_bot_exclusion("{{bots|allow=OtherBot}}", "ExampleBot", ""));
}

#[test]
fn namespace_util_splits_prefix_from_bare_titles() {
    let talk = parse_title("Talk:Some article");
    assert_eq!(talk.namespace.0, 1);
    assert_eq!(talk.name, "Some article");

    let main = parse_title("Some article");
    assert_eq!(main.namespace.0, 0);
    assert_eq!(main.name, "Some article");
}
