use crate::error::NotificationError;
use anyhow::Context;
use std::future::Future;
use teloxide::Bot;
use teloxide::payloads::SendMessageSetters;
use teloxide::requests::{Request, Requester};
use teloxide::types::{ChatId, Me, ParseMode, Recipient};
use tracing::{error, info};

/// Outbound text channel. A send is attempted once; callers log failures and
/// carry on.
pub trait Notifier {
    fn send(&self, text: &str) -> impl Future<Output = Result<(), NotificationError>> + Send;
}

/// Numeric ids address users and groups; anything else is taken as a
/// channel username such as `@pending_orders`.
fn recipient(chat_id: &str) -> Recipient {
    match chat_id.trim().parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(chat_id.trim().to_string()),
    }
}

/// Sends Markdown messages to one chat through the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
    chat: Recipient,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: &str) -> Self {
        TelegramNotifier {
            bot: Bot::new(token),
            chat: recipient(chat_id),
        }
    }

    /// Points the bot at another Bot API server.
    pub fn with_api_url(api_url: &str, token: &str, chat_id: &str) -> anyhow::Result<Self> {
        let url = reqwest::Url::parse(api_url)
            .with_context(|| format!("Invalid Telegram API URL '{api_url}'"))?;

        Ok(TelegramNotifier {
            bot: Bot::new(token).set_api_url(url),
            chat: recipient(chat_id),
        })
    }

    /// Checks the token by asking Telegram who the bot is.
    pub async fn get_me(&self) -> Result<Me, NotificationError> {
        Ok(self.bot.get_me().send().await?)
    }

    // Legacy Markdown matches the `**bold**` and backtick layout of the messages.
    #[allow(deprecated)]
    async fn send_markdown(&self, text: &str) -> Result<(), NotificationError> {
        self.bot
            .send_message(self.chat.clone(), text)
            .parse_mode(ParseMode::Markdown)
            .send()
            .await?;
        Ok(())
    }
}

impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotificationError> {
        match self.send_markdown(text).await {
            Ok(()) => {
                info!("Message sent successfully");
                Ok(())
            }
            Err(e) => {
                error!("Telegram error: {}", e);
                Err(e)
            }
        }
    }
}
