//! Slack Block Kit message builders.
//!
//! Renders an [`OutboundMessage`] as a Markdown section, rows of option
//! buttons, and an optional status footer.

use slack_morphism::prelude::{
    SlackActionBlockElement, SlackActionsBlock, SlackBlock, SlackBlockButtonElement,
    SlackBlockId, SlackBlockPlainTextOnly, SlackBlockText, SlackSectionBlock,
};

use crate::remote::transport::OutboundMessage;
use crate::slack::markup::to_mrkdwn;

/// Most buttons Slack shows in one actions block.
pub const MAX_BUTTONS_PER_BLOCK: usize = 5;

/// Longest text Slack accepts on a button.
pub const MAX_BUTTON_TEXT: usize = 75;

/// Longest text Slack accepts in a section block.
pub const MAX_SECTION_TEXT: usize = 3000;

/// Prefix of every option button's `action_id`.
pub const OPTION_ACTION_PREFIX: &str = "option_";

/// Build a Markdown (`mrkdwn`) section block.
#[must_use]
pub fn text_section(text: &str) -> SlackBlock {
    SlackBlock::Section(
        SlackSectionBlock::new()
            .with_text(SlackBlockText::MarkDown(truncate(text, MAX_SECTION_TEXT).into())),
    )
}

/// One button per option, at most [`MAX_BUTTONS_PER_BLOCK`] per actions block.
///
/// Each button's `value` is the full option text, so a click carries the
/// selected option back verbatim.
#[must_use]
pub fn option_buttons(options: &[String]) -> Vec<SlackBlock> {
    options
        .chunks(MAX_BUTTONS_PER_BLOCK)
        .enumerate()
        .map(|(row, chunk)| {
            let elements: Vec<SlackActionBlockElement> = chunk
                .iter()
                .enumerate()
                .map(|(col, option)| {
                    let index = row * MAX_BUTTONS_PER_BLOCK + col;
                    SlackActionBlockElement::Button(
                        SlackBlockButtonElement::new(
                            format!("{OPTION_ACTION_PREFIX}{index}").into(),
                            SlackBlockPlainTextOnly::from(truncate(option, MAX_BUTTON_TEXT).as_str()),
                        )
                        .with_value(option.clone()),
                    )
                })
                .collect();
            SlackBlock::Actions(
                SlackActionsBlock::new(elements).with_block_id(SlackBlockId(format!("options_{row}"))),
            )
        })
        .collect()
}

/// Full block list for an outbound message.
#[must_use]
pub fn message_blocks(message: &OutboundMessage) -> Vec<SlackBlock> {
    let mut blocks = vec![text_section(&to_mrkdwn(&message.text))];
    blocks.extend(option_buttons(&message.options));
    if let Some(ref footer) = message.footer {
        blocks.push(text_section(&to_mrkdwn(footer)));
    }
    blocks
}

/// Plain-text fallback shown in notifications.
#[must_use]
pub fn fallback_text(message: &OutboundMessage) -> String {
    let mut text = to_mrkdwn(&message.text);
    if let Some(ref footer) = message.footer {
        text.push('\n');
        text.push_str(&to_mrkdwn(footer));
    }
    truncate(&text, MAX_SECTION_TEXT)
}

/// Truncate to at most `max` characters, marking the cut with an ellipsis.
#[must_use]
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{kept}\u{2026}")
}
