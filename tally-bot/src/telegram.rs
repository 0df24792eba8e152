//! Telegram transport: turns updates into engine calls and engine replies
//! into messages.
//!
//! The file URL handed to the extractor embeds the bot token, so it is
//! never logged.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tally_core::{ChatKey, Engine, ImageRef, Prompt, Reply, Responder, SessionError};
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQuery, FileMeta, InlineKeyboardButton, InlineKeyboardMarkup, MaybeInaccessibleMessage,
    ParseMode,
};
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};

use crate::config::ChatSection;
use crate::render::{self, Choice};

const UNEXPECTED: &str = "Unexpected error, please try again.";
const WELCOME: &str = "Welcome! Start tracking expenses.\n\n\
Set your categories with /set_categories or /get_categories, then send a screenshot of your payments.";
const NOT_UNDERSTOOD: &str = "Send a screenshot of your payments, or /help for commands.";

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "snake_case", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "start tracking expenses")]
    Start,
    #[command(description = "show this text")]
    Help,
    #[command(description = "set categories, e.g. /set_categories Food, Travel, Shopping")]
    SetCategories(String),
    #[command(description = "load categories from the sheet")]
    GetCategories,
    #[command(description = "resend transactions that failed to reach the sheet")]
    Retry,
    #[command(description = "show where you are")]
    Status,
}

struct BotContext {
    engine: Engine,
    chat: ChatSection,
    username: String,
}

/// Sends engine replies to one chat.
pub struct ChatResponder {
    bot: Bot,
    chat_id: ChatId,
    chat: ChatSection,
}

impl ChatResponder {
    pub fn new(bot: Bot, chat_id: ChatId, chat: ChatSection) -> Self {
        Self { bot, chat_id, chat }
    }
}

fn keyboard(prompt: &Prompt, columns: usize) -> InlineKeyboardMarkup {
    let rows = render::keyboard_rows(prompt, columns)
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|b| InlineKeyboardButton::callback(b.text, b.data))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

#[async_trait]
impl Responder for ChatResponder {
    async fn send(&self, reply: Reply) -> Result<()> {
        match reply {
            Reply::Text(text) => {
                self.bot.send_message(self.chat_id, text).await?;
            }
            Reply::Markdown(text) => {
                self.bot
                    .send_message(self.chat_id, text)
                    .parse_mode(ParseMode::MarkdownV2)
                    .await?;
            }
            Reply::Prompt(prompt) => {
                let text = render::prompt_text(&prompt, &self.chat.currency_symbol);
                self.bot
                    .send_message(self.chat_id, text)
                    .reply_markup(keyboard(&prompt, self.chat.keyboard_columns))
                    .await?;
            }
        }
        Ok(())
    }
}

fn key_of(chat_id: ChatId) -> ChatKey {
    ChatKey(chat_id.0)
}

/// Largest photo size, or an image sent as a file.
fn image_file(msg: &Message) -> Option<&FileMeta> {
    if let Some(sizes) = msg.photo() {
        return sizes.last().map(|p| &p.file);
    }
    let doc = msg.document()?;
    let is_image = doc
        .mime_type
        .as_ref()
        .is_some_and(|m| m.type_().as_str() == "image");
    is_image.then_some(&doc.file)
}

async fn file_url(bot: &Bot, meta: &FileMeta) -> Result<ImageRef> {
    let file = bot.get_file(meta.id.clone()).await.context("getFile")?;
    let url = bot
        .api_url()
        .join(&format!("file/bot{}/{}", bot.token(), file.path))
        .context("build file url")?;
    Ok(ImageRef::new(url.to_string()))
}

async fn handle_command(ctx: &BotContext, cmd: Command, chat: ChatKey, out: &ChatResponder) -> Result<()> {
    debug!(chat = %chat, command = ?cmd, "command");
    match cmd {
        Command::Start => out.send(Reply::Text(WELCOME.to_string())).await,
        Command::Help => {
            out.send(Reply::Text(Command::descriptions().to_string()))
                .await
        }
        Command::SetCategories(raw) => ctx.engine.set_categories(chat, &raw, out).await,
        Command::GetCategories => ctx.engine.load_categories(chat, out).await,
        Command::Retry => ctx.engine.retry_flush(chat, out).await,
        Command::Status => ctx.engine.status(chat, out).await,
    }
}

async fn handle_message(ctx: &BotContext, bot: &Bot, msg: &Message) -> Result<()> {
    let chat = key_of(msg.chat.id);
    let out = ChatResponder::new(bot.clone(), msg.chat.id, ctx.chat.clone());

    if let Some(meta) = image_file(msg) {
        info!(chat = %chat, "image received");
        let image = file_url(bot, meta).await?;
        return ctx.engine.handle_image(chat, &image, &out).await;
    }

    let Some(text) = msg.text() else {
        return out.send(Reply::Text(NOT_UNDERSTOOD.to_string())).await;
    };
    match Command::parse(text, &ctx.username) {
        Ok(cmd) => handle_command(ctx, cmd, chat, &out).await,
        Err(e) => {
            debug!(chat = %chat, error = %e, "not a command");
            out.send(Reply::Text(NOT_UNDERSTOOD.to_string())).await
        }
    }
}

async fn handle_callback(ctx: &BotContext, bot: &Bot, query: &CallbackQuery) -> Result<()> {
    let Some(message) = &query.message else {
        debug!("callback without message");
        return Ok(());
    };
    let Some((tag, choice)) = query.data.as_deref().and_then(render::parse_callback) else {
        debug!("callback without category data");
        return Ok(());
    };

    let chat_id = message.chat().id;
    let chat = key_of(chat_id);
    let out = ChatResponder::new(bot.clone(), chat_id, ctx.chat.clone());

    let label = match choice {
        Choice::Label(label) => label,
        // resolved against the prompt the button was sent with; the engine
        // rechecks the tag under the session lock
        Choice::Index(i) => match ctx
            .engine
            .current_prompt(chat)
            .await
            .filter(|p| p.tag() == tag)
            .and_then(|p| p.choices.get(i).cloned())
        {
            Some(label) => label,
            None => {
                return out
                    .send(Reply::Text(SessionError::StaleChoice.user_message()))
                    .await;
            }
        },
    };

    // The pressed keyboard is spent either way.
    if let MaybeInaccessibleMessage::Regular(m) = message {
        if let Err(e) = bot.edit_message_reply_markup(chat_id, m.id).await {
            debug!(chat = %chat, error = %e, "could not clear keyboard");
        }
    }

    ctx.engine.record_choice(chat, tag, &label, &out).await
}

async fn report(bot: &Bot, chat_id: Option<ChatId>, err: anyhow::Error) {
    error!(error = %format!("{err:#}"), "update handler failed");
    if let Some(chat_id) = chat_id {
        if let Err(e) = bot.send_message(chat_id, UNEXPECTED).await {
            warn!(error = %e, "could not report failure to chat");
        }
    }
}

/// Long-poll Telegram until interrupted.
pub async fn run(token: String, engine: Engine, chat: ChatSection) -> Result<()> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("build telegram http client")?;
    let bot = Bot::with_client(token, client);

    let me = bot.get_me().await.context("getMe (check BOT_TOKEN)")?;
    let username = me.username().to_string();
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!(error = %e, "could not register bot commands");
    }

    let ctx = Arc::new(BotContext {
        engine,
        chat,
        username,
    });

    let message_handler = Update::filter_message().endpoint({
        let ctx = ctx.clone();
        move |bot: Bot, msg: Message| {
            let ctx = ctx.clone();
            async move {
                if let Err(e) = handle_message(&ctx, &bot, &msg).await {
                    report(&bot, Some(msg.chat.id), e).await;
                }
                respond(())
            }
        }
    });

    let callback_handler = Update::filter_callback_query().endpoint({
        let ctx = ctx.clone();
        move |bot: Bot, query: CallbackQuery| {
            let ctx = ctx.clone();
            async move {
                let result = handle_callback(&ctx, &bot, &query).await;
                if let Err(e) = bot.answer_callback_query(query.id.clone()).await {
                    debug!(error = %e, "answer callback failed");
                }
                if let Err(e) = result {
                    let chat_id = query.message.as_ref().map(|m| m.chat().id);
                    report(&bot, chat_id, e).await;
                }
                respond(())
            }
        }
    });

    let handler = dptree::entry()
        .branch(message_handler)
        .branch(callback_handler);

    info!(bot = %me.username(), "telegram bot listening");
    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    info!("telegram bot stopped");
    Ok(())
}
