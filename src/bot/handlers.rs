//! Built-in bot commands and the file picker callbacks.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use super::buttons::{self, FileKind, PickerAction};
use super::pipeline::DiaryPipeline;
use super::styles::StyleStore;
use crate::config::paths::is_plain_file_name;
use crate::config::ArtifactPaths;
use crate::core::{
    CallbackContext, CallbackHandler, CommandContext, CommandHandler, Registrar, SourceMessage,
    UserConfigStore,
};
use crate::reminders::normalize_reminder_time;

/// State shared by the built-in handlers
pub struct BotServices {
    pub paths: ArtifactPaths,
    pub users: Arc<UserConfigStore>,
    pub styles: StyleStore,
    pub pipeline: Arc<DiaryPipeline>,
}

impl BotServices {
    pub fn new(users: Arc<UserConfigStore>, pipeline: Arc<DiaryPipeline>) -> Self {
        let paths = pipeline.paths().clone();
        Self {
            styles: StyleStore::new(paths.clone()),
            paths,
            users,
            pipeline,
        }
    }

    fn dir_for(&self, kind: FileKind, user_id: i64) -> PathBuf {
        match kind {
            FileKind::Audio => self.paths.audio_dir(user_id),
            FileKind::Transcription => self.paths.transcription_dir(user_id),
        }
    }
}

/// Register every built-in command and callback on `registrar`
pub fn register_builtins(registrar: &mut dyn Registrar, services: Arc<BotServices>) {
    let command = |kind: Builtin| -> Arc<dyn CommandHandler> {
        Arc::new(BuiltinCommand {
            kind,
            services: Arc::clone(&services),
        })
    };

    registrar.add_command("start", command(Builtin::Start));
    registrar.add_command("setstyle", command(Builtin::SetStyle));
    registrar.add_command("getstyle", command(Builtin::GetStyle));
    registrar.add_command("setreminder", command(Builtin::SetReminder));
    registrar.add_command("enableai", command(Builtin::SetAi(true)));
    registrar.add_command("disableai", command(Builtin::SetAi(false)));
    registrar.add_command("processaudio", command(Builtin::Picker(FileKind::Audio)));
    registrar.add_command(
        "processtranscription",
        command(Builtin::Picker(FileKind::Transcription)),
    );

    for kind in [FileKind::Audio, FileKind::Transcription] {
        registrar.add_callback(
            &kind.callback_prefix(),
            Arc::new(FilePicker {
                kind,
                services: Arc::clone(&services),
            }),
        );
    }
}

#[derive(Debug, Clone, Copy)]
enum Builtin {
    Start,
    SetStyle,
    GetStyle,
    SetReminder,
    SetAi(bool),
    Picker(FileKind),
}

struct BuiltinCommand {
    kind: Builtin,
    services: Arc<BotServices>,
}

#[async_trait]
impl CommandHandler for BuiltinCommand {
    async fn handle(&self, ctx: CommandContext) -> Result<()> {
        let message = &ctx.message;
        let user_id = message.user_id();

        match self.kind {
            Builtin::Start => {
                message
                    .reply_text("Hey! Send me a voice note when you're ready.")
                    .await
            }
            Builtin::SetStyle => {
                if ctx.args.is_empty() {
                    return message
                        .reply_text(
                            "Please include your diary style sample.\nUsage:\n/setstyle <your sample diary entry>",
                        )
                        .await;
                }
                self.services.styles.set(user_id, &ctx.args.join(" ")).await?;
                message.reply_text("✅ Your diary style has been saved!").await
            }
            Builtin::GetStyle => {
                let style = self.services.styles.get(user_id).await?;
                message.reply_text(&style).await
            }
            Builtin::SetReminder => {
                let Some(raw) = ctx.args.first() else {
                    return message
                        .reply_text("⏰ Usage: /setreminder HH:MM (24-hour format)")
                        .await;
                };
                let Ok(time) = normalize_reminder_time(raw) else {
                    return message
                        .reply_text("❌ Invalid time format. Use HH:MM in 24-hour format.")
                        .await;
                };
                self.services.users.set_reminder(user_id, Some(time.clone()))?;
                info!(user_id, reminder = %time, "Reminder set");
                message
                    .reply_text(&format!("✅ Your daily reminder is set for {}.", time))
                    .await
            }
            Builtin::SetAi(enabled) => {
                self.services.users.set_ai_enabled(user_id, enabled)?;
                let text = if enabled {
                    "🤖 Enabled AI processing"
                } else {
                    "🤖 Disabled AI processing"
                };
                message.reply_text(text).await
            }
            Builtin::Picker(kind) => send_picker(&self.services, message.as_ref(), kind, 1, false).await,
        }
    }
}

/// Show one page of the picker, as a new message or by editing the current one
async fn send_picker(
    services: &BotServices,
    message: &dyn SourceMessage,
    kind: FileKind,
    page: usize,
    edit: bool,
) -> Result<()> {
    let files = buttons::list_files(&services.dir_for(kind, message.user_id()), kind)?;
    if files.is_empty() {
        return message.reply_text(kind.empty_message()).await;
    }

    let page = buttons::paginate(&files, page);
    let keyboard = buttons::file_keyboard(kind, &page);
    if edit {
        message.edit_with_buttons(kind.prompt(), keyboard).await
    } else {
        message.reply_with_buttons(kind.prompt(), keyboard).await
    }
}

/// `audio_*` / `transcription_*` button presses
struct FilePicker {
    kind: FileKind,
    services: Arc<BotServices>,
}

#[async_trait]
impl CallbackHandler for FilePicker {
    async fn handle(&self, ctx: CallbackContext) -> Result<()> {
        let Some(action) = buttons::parse_picker_data(self.kind, &ctx.data) else {
            return Ok(());
        };

        let file_name = match action {
            PickerAction::Page(page) => {
                return send_picker(&self.services, ctx.message.as_ref(), self.kind, page, true).await;
            }
            PickerAction::Process(file_name) => file_name,
        };

        let user_id = ctx.message.user_id();
        let path = self.services.dir_for(self.kind, user_id).join(&file_name);
        if !is_plain_file_name(&file_name) || !path.is_file() {
            return ctx.message.edit_text("❌ File not found.").await;
        }

        info!(user_id, file = %file_name, kind = self.kind.prefix(), "Reprocessing stored file");
        let pipeline = &self.services.pipeline;
        match self.kind {
            FileKind::Audio => {
                pipeline.audio_file_to_diary(ctx.message, &path).await?;
            }
            FileKind::Transcription => {
                pipeline
                    .transcribed_file_to_diary(ctx.message, &path, None)
                    .await?;
            }
        }
        Ok(())
    }
}
