// src/engine/actions.rs - Side effects requested by a verdict

use log::{debug, info};

use crate::config::EngineSettings;
use crate::types::{ChatMessage, PinRequest, Verdict};

/// What the chat renderer does with a classified message. Each effect can be
/// invoked on its own.
pub trait HighlightActions {
    /// Hide the message
    fn suppress(&mut self, message: &ChatMessage);

    /// Visually emphasize the message
    fn mark(&mut self, message: &ChatMessage, color: &str);

    /// Play the highlight sound
    fn notify(&mut self);

    /// Show a transient pinned card for the highlight
    fn pin(&mut self, request: &PinRequest);
}

impl Verdict {
    /// Invoke the side effects of this verdict. The sound and the pinned card
    /// are subject to the user's settings; marking never is.
    pub fn dispatch<A: HighlightActions + ?Sized>(
        &self,
        message: &ChatMessage,
        settings: &EngineSettings,
        actions: &mut A,
    ) {
        match self {
            Verdict::Suppress => actions.suppress(message),
            Verdict::Highlight { color, notify, pin } => {
                actions.mark(message, color);

                if *notify && settings.highlight_feedback {
                    actions.notify();
                }

                if let Some(request) = pin {
                    if settings.pinned_highlights {
                        actions.pin(request);
                    } else {
                        debug!("Pinned highlights disabled, not pinning message from {}", request.sender);
                    }
                }
            }
            Verdict::Pass => {}
        }
    }
}

/// Actions that only log, for running the engine without a renderer
#[derive(Debug, Default)]
pub struct LogActions;

impl HighlightActions for LogActions {
    fn suppress(&mut self, message: &ChatMessage) {
        info!("Hiding message from {}: {}", message.sender().unwrap_or("?"), message.text);
    }

    fn mark(&mut self, message: &ChatMessage, color: &str) {
        info!("Highlighting message from {} in {}: {}", message.sender().unwrap_or("?"), color, message.text);
    }

    fn notify(&mut self) {
        info!("Highlight sound");
    }

    fn pin(&mut self, request: &PinRequest) {
        info!("Pinning highlight from {}: {}", request.sender, request.text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl HighlightActions for Recorder {
        fn suppress(&mut self, _message: &ChatMessage) {
            self.calls.push("suppress".to_string());
        }

        fn mark(&mut self, _message: &ChatMessage, color: &str) {
            self.calls.push(format!("mark {}", color));
        }

        fn notify(&mut self) {
            self.calls.push("notify".to_string());
        }

        fn pin(&mut self, request: &PinRequest) {
            self.calls.push(format!("pin {}", request.sender));
        }
    }

    fn highlight(notify: bool, pinned: bool) -> (ChatMessage, Verdict) {
        let message = ChatMessage::new("alice", "hello", Utc::now());
        let pin = pinned.then(|| PinRequest {
            sender: "alice".to_string(),
            text: "hello".to_string(),
            timestamp: message.timestamp,
        });
        let verdict = Verdict::Highlight { color: "#123456".to_string(), notify, pin };
        (message, verdict)
    }

    #[test]
    fn test_dispatch_full_highlight() {
        let (message, verdict) = highlight(true, true);
        let mut recorder = Recorder::default();

        verdict.dispatch(&message, &EngineSettings::default(), &mut recorder);
        assert_eq!(recorder.calls, vec!["mark #123456", "notify", "pin alice"]);
    }

    #[test]
    fn test_dispatch_honors_settings() {
        let (message, verdict) = highlight(true, true);
        let settings = EngineSettings {
            highlight_feedback: false,
            pinned_highlights: false,
            ..EngineSettings::default()
        };
        let mut recorder = Recorder::default();

        verdict.dispatch(&message, &settings, &mut recorder);
        assert_eq!(recorder.calls, vec!["mark #123456"]);
    }

    #[test]
    fn test_dispatch_duplicate_only_marks() {
        let (message, verdict) = highlight(false, false);
        let mut recorder = Recorder::default();

        verdict.dispatch(&message, &EngineSettings::default(), &mut recorder);
        assert_eq!(recorder.calls, vec!["mark #123456"]);
    }

    #[test]
    fn test_dispatch_suppress_and_pass() {
        let message = ChatMessage::new("alice", "hello", Utc::now());
        let mut recorder = Recorder::default();

        Verdict::Suppress.dispatch(&message, &EngineSettings::default(), &mut recorder);
        Verdict::Pass.dispatch(&message, &EngineSettings::default(), &mut recorder);
        assert_eq!(recorder.calls, vec!["suppress"]);
    }
}
