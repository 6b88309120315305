//! Bubble styles for the message list.
//!
//! Rendering reads the per-turn [`ToneState`] directly. In
//! [`HighlightMode::Latest`] only the most recent user message is colored,
//! and only once its own tone record has arrived; every other user message
//! renders neutral.

use serde::{Deserialize, Serialize};

use tonechat_core::config::{DisplayConfig, HighlightMode};
use tonechat_core::types::{Message, Rgba, TurnId};

use crate::color::{color_fraction, interpolate};
use crate::turn::{ToneState, TurnLedger};

/// Colors used by the message list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    pub neutral_text: Rgba,
    pub alert_text: Rgba,
    pub agent_text: Rgba,
    pub user_bubble: Rgba,
    pub agent_bubble: Rgba,
}

impl From<&DisplayConfig> for Palette {
    fn from(config: &DisplayConfig) -> Self {
        Self {
            neutral_text: config.neutral_text,
            alert_text: config.alert_text,
            agent_text: config.agent_text,
            user_bubble: config.user_bubble,
            agent_bubble: config.agent_bubble,
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::from(&DisplayConfig::default())
    }
}

/// How one bubble is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BubbleStyle {
    pub text: Rgba,
    pub bubble: Rgba,
    /// Anger fraction applied to the text color, if any.
    pub fraction: Option<f64>,
}

/// A message paired with its style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub message: Message,
    pub style: BubbleStyle,
}

/// Style every message of `messages` in order.
pub fn render(
    messages: &[Message],
    ledger: &TurnLedger,
    palette: &Palette,
    mode: HighlightMode,
) -> Vec<RenderedMessage> {
    let latest_user = messages
        .iter()
        .rev()
        .find(|m| m.is_user())
        .and_then(|m| m.turn_id);

    messages
        .iter()
        .map(|message| RenderedMessage {
            style: style_for(message, latest_user, ledger, palette, mode),
            message: message.clone(),
        })
        .collect()
}

fn style_for(
    message: &Message,
    latest_user: Option<TurnId>,
    ledger: &TurnLedger,
    palette: &Palette,
    mode: HighlightMode,
) -> BubbleStyle {
    if !message.is_user() {
        return BubbleStyle {
            text: palette.agent_text,
            bubble: palette.agent_bubble,
            fraction: None,
        };
    }

    let highlighted = match mode {
        HighlightMode::Latest => message.turn_id.is_some() && message.turn_id == latest_user,
        HighlightMode::EveryScored => true,
    };
    let fraction = message
        .turn_id
        .filter(|_| highlighted)
        .and_then(|turn| ledger.tone(turn))
        .and_then(ToneState::record)
        .map(|record| color_fraction(record.anger()));

    BubbleStyle {
        text: match fraction {
            Some(f) => interpolate(palette.neutral_text, palette.alert_text, f),
            None => palette.neutral_text,
        },
        bubble: palette.user_bubble,
        fraction,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tonechat_core::types::{ToneScore, ToneScoreRecord};

    fn scored(ledger: &mut TurnLedger, message: &Message, anger: f64) {
        let turn = message.turn_id.unwrap();
        ledger.open(turn, message.id).unwrap();
        ledger.issue(turn).unwrap();
        ledger
            .resolve_tone(
                turn,
                ToneState::Scored(ToneScoreRecord {
                    turn_id: turn,
                    emotion: vec![ToneScore::new("anger", "Anger", anger)],
                    language: vec![],
                    social: vec![],
                }),
            )
            .unwrap();
    }

    fn pending(ledger: &mut TurnLedger, message: &Message) {
        let turn = message.turn_id.unwrap();
        ledger.open(turn, message.id).unwrap();
        ledger.issue(turn).unwrap();
    }

    #[test]
    fn test_agent_messages_use_agent_palette() {
        let ledger = TurnLedger::new();
        let palette = Palette::default();
        let messages = vec![Message::agent(None, "Hello")];
        let rendered = render(&messages, &ledger, &palette, HighlightMode::Latest);
        assert_eq!(rendered[0].style.text, Rgba::WHITE);
        assert_eq!(rendered[0].style.bubble, Rgba::SLATE);
        assert!(rendered[0].style.fraction.is_none());
    }

    #[test]
    fn test_latest_scored_user_message_is_colored() {
        let mut ledger = TurnLedger::new();
        let palette = Palette::default();
        let user = Message::user(TurnId::new(), "I am furious");
        scored(&mut ledger, &user, 0.9);
        let messages = vec![user.clone(), Message::agent(user.turn_id, "Sorry")];

        let rendered = render(&messages, &ledger, &palette, HighlightMode::Latest);
        assert_eq!(rendered[0].style.fraction, Some(0.9));
        assert_eq!(rendered[0].style.bubble, Rgba::LIGHT_GRAY);
        assert_eq!(
            rendered[0].style.text,
            interpolate(Rgba::WHITE, Rgba::RED, 0.9)
        );
    }

    #[test]
    fn test_pending_latest_leaves_all_neutral() {
        let mut ledger = TurnLedger::new();
        let palette = Palette::default();
        let first = Message::user(TurnId::new(), "I am furious");
        let second = Message::user(TurnId::new(), "hello?");
        scored(&mut ledger, &first, 0.9);
        pending(&mut ledger, &second);

        let rendered = render(
            &[first, second],
            &ledger,
            &palette,
            HighlightMode::Latest,
        );
        assert!(rendered.iter().all(|r| r.style.fraction.is_none()));
        assert!(rendered.iter().all(|r| r.style.text == Rgba::WHITE));
    }

    #[test]
    fn test_every_scored_keeps_older_colors() {
        let mut ledger = TurnLedger::new();
        let palette = Palette::default();
        let first = Message::user(TurnId::new(), "I am furious");
        let second = Message::user(TurnId::new(), "ok thanks");
        scored(&mut ledger, &first, 0.9);
        scored(&mut ledger, &second, 0.1);
        let messages = vec![first, second];

        let every = render(&messages, &ledger, &palette, HighlightMode::EveryScored);
        assert_eq!(every[0].style.fraction, Some(0.9));
        assert_eq!(every[1].style.fraction, Some(0.1));

        let latest = render(&messages, &ledger, &palette, HighlightMode::Latest);
        assert_eq!(latest[0].style.fraction, None);
        assert_eq!(latest[1].style.fraction, Some(0.1));
    }

    #[test]
    fn test_palette_from_config() {
        let config = DisplayConfig {
            alert_text: Rgba::rgb(0.5, 0.0, 0.5),
            ..DisplayConfig::default()
        };
        let palette = Palette::from(&config);
        assert_eq!(palette.alert_text, Rgba::rgb(0.5, 0.0, 0.5));
        assert_eq!(palette.neutral_text, Rgba::WHITE);
    }
}
