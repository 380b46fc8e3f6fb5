//! Telegram bot host.
//!
//! Long-polls the Bot API and handles one update at a time:
//! voice notes go through the diary pipeline, `/commands` and button
//! callbacks go through the [`Router`].

pub mod buttons;
pub mod handlers;
pub mod message;
pub mod pipeline;
pub mod router;
pub mod styles;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::adapters::telegram::{CallbackQuery, Message, Update};
use crate::adapters::TelegramClient;
use crate::config::paths;
use crate::core::{CallbackContext, CommandContext, SourceMessage};

pub use handlers::{register_builtins, BotServices};
pub use message::TelegramMessage;
pub use pipeline::DiaryPipeline;
pub use router::{parse_command, ParsedCommand, Router};
pub use styles::StyleStore;

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Owns the polling loop
pub struct BotHost {
    client: Arc<TelegramClient>,
    router: Router,
    services: Arc<BotServices>,
}

impl BotHost {
    pub fn new(client: Arc<TelegramClient>, router: Router, services: Arc<BotServices>) -> Self {
        Self {
            client,
            router,
            services,
        }
    }

    /// Poll forever, handling updates sequentially
    pub async fn run(self) -> Result<()> {
        let mut offset: i64 = 0;
        info!(commands = ?self.router.command_names(), "Bot started");

        loop {
            let updates = match self.client.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %format!("{:#}", e), "Telegram poll error");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                self.handle_update(update).await;
            }
        }
    }

    async fn handle_update(&self, update: Update) {
        let update_id = update.update_id;

        if let Some(query) = update.callback_query {
            self.handle_callback(query).await;
        } else if let Some(message) = update.message {
            let reply_to = self.message_handle(&message);
            if let Err(e) = self.handle_message(message).await {
                error!(update_id, error = %format!("{:#}", e), "Failed to handle message");
                if let Some(reply_to) = reply_to {
                    let _ = reply_to
                        .reply_text("❌ Something went wrong while handling that.")
                        .await;
                }
            }
        } else {
            debug!(update_id, "Ignoring unsupported update");
        }
    }

    fn message_handle(&self, message: &Message) -> Option<Arc<dyn SourceMessage>> {
        let user_id = message.from.as_ref()?.id;
        Some(Arc::new(TelegramMessage::new(
            Arc::clone(&self.client),
            message.chat.id,
            user_id,
        )))
    }

    async fn handle_message(&self, message: Message) -> Result<()> {
        let Some(source) = self.message_handle(&message) else {
            return Ok(());
        };

        if let Some(voice) = &message.voice {
            let user_id = source.user_id();
            let dest = self
                .services
                .paths
                .audio_dir(user_id)
                .join(paths::audio_filename(Local::now()));

            info!(user_id, duration = voice.duration, "Voice note received");
            self.client.download_file(&voice.file_id, &dest).await?;
            self.services.pipeline.audio_file_to_diary(source, &dest).await?;
            return Ok(());
        }

        let Some(command) = message.text.as_deref().and_then(parse_command) else {
            return Ok(());
        };

        let name = command.name.clone();
        let ctx = CommandContext {
            message: source,
            args: command.args.clone(),
        };
        if !self.router.dispatch_command(command, ctx).await? {
            debug!(command = %name, "Unknown command");
        }
        Ok(())
    }

    async fn handle_callback(&self, query: CallbackQuery) {
        if let Err(e) = self.client.answer_callback_query(&query.id).await {
            debug!(error = %e, "Failed to answer callback query");
        }

        let (Some(data), Some(message)) = (query.data, query.message) else {
            return;
        };

        let source: Arc<dyn SourceMessage> = Arc::new(
            TelegramMessage::new(Arc::clone(&self.client), message.chat.id, query.from.id)
                .editable(message.message_id),
        );
        let ctx = CallbackContext {
            message: Arc::clone(&source),
            data,
        };

        if let Err(e) = self.router.dispatch_callback(ctx).await {
            error!(error = %format!("{:#}", e), "Failed to handle callback");
            let _ = source
                .reply_text("❌ Something went wrong while handling that.")
                .await;
        }
    }
}
