use agent_inquiry::remote::transport::OutboundMessage;
use agent_inquiry::slack::blocks::{
    fallback_text, message_blocks, option_buttons, text_section, truncate, MAX_BUTTON_TEXT,
};
use slack_morphism::prelude::{SlackActionBlockElement, SlackBlock, SlackBlockText};

fn options(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("option {i}")).collect()
}

fn section_text(block: &SlackBlock) -> String {
    match block {
        SlackBlock::Section(section) => match section.text {
            Some(SlackBlockText::MarkDown(ref md)) => md.text.clone(),
            ref other => panic!("expected markdown section text, got {other:?}"),
        },
        other => panic!("expected section block, got {other:?}"),
    }
}

fn buttons(block: &SlackBlock) -> Vec<(String, Option<String>)> {
    match block {
        SlackBlock::Actions(actions) => actions
            .elements
            .iter()
            .map(|element| match element {
                SlackActionBlockElement::Button(button) => {
                    (button.action_id.0.clone(), button.value.clone())
                }
                other => panic!("expected button, got {other:?}"),
            })
            .collect(),
        other => panic!("expected actions block, got {other:?}"),
    }
}

#[test]
fn text_section_uses_markdown() {
    assert_eq!(section_text(&text_section("*hi*")), "*hi*");
}

#[test]
fn no_options_means_no_action_blocks() {
    assert!(option_buttons(&[]).is_empty());
}

#[test]
fn five_options_fit_in_one_block() {
    let blocks = option_buttons(&options(5));
    assert_eq!(blocks.len(), 1);
    assert_eq!(buttons(&blocks[0]).len(), 5);
}

#[test]
fn seven_options_split_into_two_blocks() {
    let blocks = option_buttons(&options(7));
    assert_eq!(blocks.len(), 2);

    let first = buttons(&blocks[0]);
    let second = buttons(&blocks[1]);
    assert_eq!(first.len(), 5);
    assert_eq!(second.len(), 2);
    assert_eq!(second[1].0, "option_6");
    assert_eq!(second[1].1.as_deref(), Some("option 7"));
}

#[test]
fn button_value_is_the_full_option_text() {
    let long = "x".repeat(120);
    let blocks = option_buttons(std::slice::from_ref(&long));
    let (_, value) = buttons(&blocks[0]).remove(0);
    assert_eq!(value.as_deref(), Some(long.as_str()));
}

#[test]
fn message_blocks_render_text_options_and_footer() {
    let message = OutboundMessage::with_options("**Deploy?**", vec!["yes".into(), "no".into()])
        .footed("*10s* remaining");
    let blocks = message_blocks(&message);

    assert_eq!(blocks.len(), 3);
    assert_eq!(section_text(&blocks[0]), "*Deploy?*");
    assert_eq!(buttons(&blocks[1]).len(), 2);
    assert_eq!(section_text(&blocks[2]), "_10s_ remaining");
}

#[test]
fn settled_message_drops_buttons() {
    let message = OutboundMessage::with_options("Pick", vec!["a".into(), "b".into()]);
    let blocks = message_blocks(&message.settled("Selected: **a**"));

    assert_eq!(blocks.len(), 2);
    assert!(blocks.iter().all(|b| matches!(b, SlackBlock::Section(_))));
}

#[test]
fn fallback_text_includes_footer() {
    let message = OutboundMessage::text("Question").footed("done");
    assert_eq!(fallback_text(&message), "Question\ndone");
}

#[test]
fn truncate_marks_cut_with_ellipsis() {
    let cut = truncate(&"y".repeat(100), MAX_BUTTON_TEXT);
    assert_eq!(cut.chars().count(), MAX_BUTTON_TEXT);
    assert!(cut.ends_with('\u{2026}'));
    assert_eq!(truncate("short", MAX_BUTTON_TEXT), "short");
}
