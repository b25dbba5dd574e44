//! teloxide wiring: the update schema, endpoints that feed updates into the
//! routers in `handlers`, and alert delivery over the bot.

use crate::handlers::{self, AppContext, Caller, Outcome};
use crate::model::ConversationState;
use crate::notifier::{Alert, AlertSink};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::InlineKeyboardMarkup;
use teloxide::utils::command::BotCommands;
use tracing::debug;

pub type Storage = InMemStorage<ConversationState>;
pub type BotDialogue = Dialogue<ConversationState, Storage>;
type HandlerResult = Result<()>;

#[derive(Debug, Clone, BotCommands)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "Register and show the main menu")]
    Start,
}

/// Conversation state is keyed by the sender, not the chat, so in a group
/// each member has their own pending prompt.
fn user_dialogue(storage: Arc<Storage>, caller: &Caller) -> BotDialogue {
    Dialogue::new(storage, ChatId(caller.id))
}

pub fn schema() -> UpdateHandler<anyhow::Error> {
    let messages = Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(on_command),
        )
        .branch(dptree::endpoint(on_text));
    let callbacks = Update::filter_callback_query().endpoint(on_callback);

    dptree::entry().branch(messages).branch(callbacks)
}

async fn on_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    storage: Arc<Storage>,
    ctx: Arc<AppContext>,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let caller = Caller::from(user);
    let dialogue = user_dialogue(storage, &caller);
    let outcome = match cmd {
        Command::Start => handlers::start(&ctx, &caller).await,
    };
    reply(&bot, msg.chat.id, &dialogue, outcome).await
}

async fn on_text(
    bot: Bot,
    msg: Message,
    storage: Arc<Storage>,
    ctx: Arc<AppContext>,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "Please send a text message.")
            .await?;
        return Ok(());
    };
    let caller = Caller::from(user);
    let dialogue = user_dialogue(storage, &caller);
    let state = dialogue.get_or_default().await?;
    let outcome = handlers::handle_text(&ctx, &caller, state, text).await;
    reply(&bot, msg.chat.id, &dialogue, outcome).await
}

async fn on_callback(
    bot: Bot,
    query: CallbackQuery,
    storage: Arc<Storage>,
    ctx: Arc<AppContext>,
) -> HandlerResult {
    // Stop the client's loading indicator before doing any work.
    bot.answer_callback_query(query.id.clone()).await?;

    let caller = Caller::from(&query.from);
    let dialogue = user_dialogue(storage, &caller);
    let data = query.data.as_deref().unwrap_or_default();
    let outcome = handlers::handle_callback(&ctx, &caller, data).await;
    let chat_id = query
        .message
        .as_ref()
        .map(|m| m.chat.id)
        .unwrap_or(ChatId(caller.id));
    reply(&bot, chat_id, &dialogue, outcome).await
}

/// Store the next conversation state and send the reply.
async fn reply(bot: &Bot, chat_id: ChatId, dialogue: &BotDialogue, outcome: Outcome) -> HandlerResult {
    debug!(
        chat = chat_id.0,
        user = dialogue.chat_id().0,
        next = outcome.next.as_str(),
        "storing conversation state"
    );
    if outcome.next.is_idle() {
        dialogue.reset().await?;
    } else {
        dialogue.update(outcome.next).await?;
    }

    let mut request = bot.send_message(chat_id, outcome.reply.text);
    if let Some(menu) = outcome.reply.menu {
        request = request.reply_markup(InlineKeyboardMarkup::from(menu));
    }
    request.await?;
    Ok(())
}

#[async_trait]
impl AlertSink for Bot {
    async fn deliver(&self, alert: &Alert) -> Result<()> {
        let chat: i64 = alert
            .chat_id
            .parse()
            .with_context(|| format!("invalid chat id {}", alert.chat_id))?;
        self.send_message(ChatId(chat), alert.text.clone()).await?;
        Ok(())
    }
}
