//! Command and callback routing.
//!
//! The router is the [`Registrar`] handed to plugins at load time; the bot
//! registers its own commands on it the same way.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use crate::core::{CallbackContext, CallbackHandler, CommandContext, CommandHandler, Registrar};

/// A parsed `/command arg1 arg2`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: Vec<String>,
}

/// Parse a message text as a bot command.
///
/// Accepts `/name`, `/name@BotName` and whitespace-separated arguments.
/// Returns `None` for anything that is not a command.
pub fn parse_command(text: &str) -> Option<ParsedCommand> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?.strip_prefix('/')?;
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() {
        return None;
    }

    Some(ParsedCommand {
        name: name.to_ascii_lowercase(),
        args: parts.map(str::to_string).collect(),
    })
}

/// Routes commands by name and callbacks by data prefix
#[derive(Default)]
pub struct Router {
    commands: BTreeMap<String, Arc<dyn CommandHandler>>,
    callbacks: Vec<(String, Arc<dyn CallbackHandler>)>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered command names, sorted
    pub fn command_names(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    pub fn callback_prefixes(&self) -> Vec<&str> {
        self.callbacks.iter().map(|(p, _)| p.as_str()).collect()
    }

    /// Run the handler for `command`. Returns `false` when none is registered.
    pub async fn dispatch_command(&self, command: ParsedCommand, ctx: CommandContext) -> Result<bool> {
        let Some(handler) = self.commands.get(&command.name) else {
            debug!(command = %command.name, "No handler for command");
            return Ok(false);
        };
        handler.handle(ctx).await?;
        Ok(true)
    }

    /// Run the handler with the longest prefix matching `ctx.data`.
    /// Returns `false` when nothing matches.
    pub async fn dispatch_callback(&self, ctx: CallbackContext) -> Result<bool> {
        let handler = self
            .callbacks
            .iter()
            .filter(|(prefix, _)| ctx.data.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, handler)| Arc::clone(handler));

        match handler {
            Some(handler) => {
                handler.handle(ctx).await?;
                Ok(true)
            }
            None => {
                debug!(data = %ctx.data, "No handler for callback");
                Ok(false)
            }
        }
    }
}

impl Registrar for Router {
    fn add_command(&mut self, name: &str, handler: Arc<dyn CommandHandler>) {
        let name = name.trim_start_matches('/').to_ascii_lowercase();
        if self.commands.insert(name.clone(), handler).is_some() {
            warn!(command = %name, "Command registered twice, keeping the latest handler");
        }
    }

    fn add_callback(&mut self, prefix: &str, handler: Arc<dyn CallbackHandler>) {
        if let Some(slot) = self.callbacks.iter_mut().find(|(p, _)| p == prefix) {
            warn!(prefix, "Callback prefix registered twice, keeping the latest handler");
            slot.1 = handler;
        } else {
            self.callbacks.push((prefix.to_string(), handler));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::core::{InlineKeyboard, SourceMessage};

    struct SilentMessage;

    #[async_trait]
    impl SourceMessage for SilentMessage {
        fn chat_id(&self) -> i64 {
            1
        }
        fn user_id(&self) -> i64 {
            1
        }
        async fn reply_text(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn reply_with_buttons(&self, _: &str, _: InlineKeyboard) -> Result<()> {
            Ok(())
        }
        async fn reply_document(&self, _: &Path, _: &str) -> Result<()> {
            Ok(())
        }
        async fn edit_text(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    struct Tagged(&'static str, Arc<Recorder>);

    #[async_trait]
    impl CommandHandler for Tagged {
        async fn handle(&self, ctx: CommandContext) -> Result<()> {
            self.1 .0.lock().unwrap().push(format!("{}:{}", self.0, ctx.args.join(",")));
            Ok(())
        }
    }

    #[async_trait]
    impl CallbackHandler for Tagged {
        async fn handle(&self, ctx: CallbackContext) -> Result<()> {
            self.1 .0.lock().unwrap().push(format!("{}:{}", self.0, ctx.data));
            Ok(())
        }
    }

    fn command_ctx(args: &[&str]) -> CommandContext {
        CommandContext {
            message: Arc::new(SilentMessage),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn callback_ctx(data: &str) -> CallbackContext {
        CallbackContext {
            message: Arc::new(SilentMessage),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(
            parse_command("/setreminder 07:30"),
            Some(ParsedCommand {
                name: "setreminder".to_string(),
                args: vec!["07:30".to_string()],
            })
        );
        assert_eq!(parse_command("/Start@DiaryBot").unwrap().name, "start");
        assert_eq!(
            parse_command("/setstyle  short   and warm ").unwrap().args,
            vec!["short", "and", "warm"]
        );
        assert_eq!(parse_command("hello /start"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command(""), None);
    }

    #[tokio::test]
    async fn test_dispatch_command_by_name() {
        let rec = Arc::new(Recorder::default());
        let mut router = Router::new();
        router.add_command("journivsetup", Arc::new(Tagged("setup", Arc::clone(&rec))));

        let hit = router
            .dispatch_command(parse_command("/journivsetup a b").unwrap(), command_ctx(&["a", "b"]))
            .await
            .unwrap();
        let miss = router
            .dispatch_command(parse_command("/nope").unwrap(), command_ctx(&[]))
            .await
            .unwrap();

        assert!(hit);
        assert!(!miss);
        assert_eq!(*rec.0.lock().unwrap(), vec!["setup:a,b"]);
    }

    #[tokio::test]
    async fn test_longest_callback_prefix_wins() {
        let rec = Arc::new(Recorder::default());
        let mut router = Router::new();
        router.add_callback("journiv_", Arc::new(Tagged("short", Arc::clone(&rec))));
        router.add_callback("journiv_select_", Arc::new(Tagged("long", Arc::clone(&rec))));

        assert!(router.dispatch_callback(callback_ctx("journiv_select_1_A")).await.unwrap());
        assert!(router.dispatch_callback(callback_ctx("journiv_other")).await.unwrap());
        assert!(!router.dispatch_callback(callback_ctx("audio_page|2")).await.unwrap());

        assert_eq!(
            *rec.0.lock().unwrap(),
            vec!["long:journiv_select_1_A", "short:journiv_other"]
        );
    }

    #[test]
    fn test_reregistering_replaces_handler() {
        let rec = Arc::new(Recorder::default());
        let mut router = Router::new();
        router.add_command("/Start", Arc::new(Tagged("a", Arc::clone(&rec))));
        router.add_command("start", Arc::new(Tagged("b", Arc::clone(&rec))));
        router.add_callback("x_", Arc::new(Tagged("a", Arc::clone(&rec))));
        router.add_callback("x_", Arc::new(Tagged("b", Arc::clone(&rec))));

        assert_eq!(router.command_names(), vec!["start"]);
        assert_eq!(router.callback_prefixes(), vec!["x_"]);
    }
}
