use std::sync::Arc;

use anyhow::Context;
use taskflow_core::view::{Keyboard, MAIN_MENU};
use taskflow_core::{App, ChatUser, Inbound, Markup, RenderTarget, Reply, Screen, dispatch};
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup, MessageId,
    ParseMode, User,
};
use teloxide::{ApiError, RequestError};
use tracing::{debug, error, info, warn};

/// Long-polls until Ctrl-C.
pub async fn run(token: String, app: Arc<App>) {
    let bot = Bot::new(token);

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    info!("polling for updates");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![app])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn chat_user(from: &User) -> anyhow::Result<ChatUser> {
    let id = i64::try_from(from.id.0).context("user id out of range")?;
    Ok(ChatUser {
        id,
        first_name: Some(from.first_name.clone()),
        last_name: from.last_name.clone(),
    })
}

async fn handle_message(bot: Bot, msg: Message, app: Arc<App>) -> anyhow::Result<()> {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let user = chat_user(from)?;
    let inbound = Inbound::from_text(text);
    debug!(user_id = user.id, ?inbound, "message");

    let replies = run_dispatch(&app, &user, inbound, false).await;
    deliver(&bot, msg.chat.id, None, replies).await;
    Ok(())
}

async fn handle_callback(bot: Bot, q: CallbackQuery, app: Arc<App>) -> anyhow::Result<()> {
    let user = chat_user(&q.from)?;
    let inbound = Inbound::from_callback(q.data.as_deref().unwrap_or_default());
    debug!(user_id = user.id, ?inbound, "callback");

    let replies = run_dispatch(&app, &user, inbound, true).await;
    let notice = replies.iter().find_map(|r| match r {
        Reply::Notice { text, alert } => Some((text.clone(), *alert)),
        Reply::Show { .. } => None,
    });
    let screens: Vec<Reply> = replies
        .into_iter()
        .filter(|r| matches!(r, Reply::Show { .. }))
        .collect();

    let mut answer = bot.answer_callback_query(q.id.clone());
    if let Some((text, alert)) = notice {
        answer = answer.text(text).show_alert(alert);
    }
    if let Err(err) = answer.await {
        warn!(error = %err, "failed to answer callback");
    }

    match q.message {
        Some(message) => deliver(&bot, message.chat.id, Some(message.id), screens).await,
        None => {
            let chat = ChatId(user.id);
            deliver(&bot, chat, None, screens).await;
        }
    }
    Ok(())
}

async fn run_dispatch(app: &App, user: &ChatUser, inbound: Inbound, from_button: bool) -> Vec<Reply> {
    match dispatch(app, user, inbound).await {
        Ok(replies) => replies,
        Err(err) => {
            error!(user_id = user.id, error = %err, "handler failed");
            let text = err.user_message();
            if from_button {
                vec![Reply::alert(text)]
            } else {
                vec![Reply::send(Screen::plain(text))]
            }
        }
    }
}

fn inline_keyboard(kb: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(kb.rows.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.action.to_string()))
            .collect::<Vec<_>>()
    }))
}

fn main_menu() -> KeyboardMarkup {
    KeyboardMarkup::new(
        MAIN_MENU
            .iter()
            .map(|row| row.iter().map(|label| KeyboardButton::new(*label)).collect::<Vec<_>>()),
    )
    .resize_keyboard(true)
}

/// Delivery failures are logged and skipped; the next reply still goes out.
async fn deliver(bot: &Bot, chat: ChatId, origin: Option<MessageId>, replies: Vec<Reply>) {
    for reply in replies {
        let result = match (reply, origin) {
            (
                Reply::Show {
                    target: RenderTarget::Edit,
                    screen,
                },
                Some(message_id),
            ) if !matches!(screen.markup, Markup::MainMenu) => {
                edit(bot, chat, message_id, screen).await
            }
            (Reply::Show { screen, .. }, _) => send(bot, chat, screen).await,
            (Reply::Notice { text, .. }, _) => send(bot, chat, Screen::plain(text)).await,
        };
        match result {
            Ok(()) => {}
            Err(RequestError::Api(ApiError::MessageNotModified)) => {
                debug!("message not modified");
            }
            Err(err) => warn!(chat = chat.0, error = %err, "failed to deliver reply"),
        }
    }
}

async fn send(bot: &Bot, chat: ChatId, screen: Screen) -> Result<(), RequestError> {
    let req = bot.send_message(chat, screen.text).parse_mode(ParseMode::Html);
    let req = match &screen.markup {
        Markup::Inline(kb) => req.reply_markup(inline_keyboard(kb)),
        Markup::MainMenu => req.reply_markup(main_menu()),
        Markup::None => req,
    };
    req.await?;
    Ok(())
}

async fn edit(bot: &Bot, chat: ChatId, message_id: MessageId, screen: Screen) -> Result<(), RequestError> {
    let req = bot
        .edit_message_text(chat, message_id, screen.text)
        .parse_mode(ParseMode::Html);
    let req = match &screen.markup {
        Markup::Inline(kb) => req.reply_markup(inline_keyboard(kb)),
        Markup::MainMenu | Markup::None => req,
    };
    req.await?;
    Ok(())
}
