use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use chatbridge::chatbot::message::is_code_file;
use chatbridge::chatbot::{
    ArtifactDir, Attachment, ChatMessage, ChatbotConfig, ChatbotEngine, OpenAiGenerator, TelegramClient,
};
use chatbridge::config::Config;
use chatbridge::openai;

struct BotState {
    config: Config,
    telegram: Arc<TelegramClient>,
    engine: ChatbotEngine,
}

impl BotState {
    async fn new(config: Config, bot: &Bot) -> Self {
        let bot_user_id = match bot.get_me().await {
            Ok(me) => {
                info!("Bot user ID: {}, username: @{}", me.id, me.username());
                me.id.0 as i64
            }
            Err(e) => {
                warn!("Failed to get bot info: {e}");
                0
            }
        };

        let client = Arc::new(openai::Client::new(
            config.openai_api_key.clone(),
            config.openai_organization.clone(),
            config.chat_model.clone(),
        ));
        let generator = OpenAiGenerator::new(
            client.clone(),
            ArtifactDir::new(&config.file_path, &config.file_name_format),
            config.generation_settings(),
        );
        let telegram = Arc::new(TelegramClient::new(bot.clone()));

        let chatbot_config = ChatbotConfig {
            bot_user_id,
            bot_name: config.bot_name.clone(),
            system_prompt: config.system_prompt.clone(),
            history_length: config.history_length,
            max_message_len: config.max_message_len,
        };
        let engine = ChatbotEngine::new(chatbot_config, client, Arc::new(generator), telegram.clone());

        Self { config, telegram, engine }
    }
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "chatbridge.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::never(&log_dir, "chatbridge.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting chatbridge...");
    info!("Loaded config from {config_path}");
    info!("Artifacts go to {}", config.file_path.display());
    if !config.allowed_chats.is_empty() {
        info!("Allowed chats: {:?}", config.allowed_chats);
    }

    let bot = Bot::new(&config.telegram_bot_token);
    let state = Arc::new(BotState::new(config, &bot).await);

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_new_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_new_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    if !state.config.is_allowed_chat(msg.chat.id) {
        return Ok(());
    }
    if msg.from.is_none() {
        return Ok(());
    }

    let chat_msg = telegram_to_chat_message(&msg, &state.telegram).await;
    state.engine.handle_message(chat_msg).await;
    Ok(())
}

async fn telegram_to_chat_message(msg: &Message, telegram: &TelegramClient) -> ChatMessage {
    let user = msg.from.as_ref();
    let user_id = user.map(|u| u.id.0 as i64).unwrap_or(0);
    let display_name = user.map(|u| u.full_name()).unwrap_or_else(|| "unknown".to_string());
    let text = msg.text().or(msg.caption()).unwrap_or("").to_string();

    let attachment = match msg.document() {
        Some(doc) => {
            let file_name = doc.file_name.clone().unwrap_or_default();
            let data = if is_code_file(&file_name) {
                match telegram.download_document(&doc.file.id.0).await {
                    Ok(data) => Some(data),
                    Err(e) => {
                        error!("Failed to fetch {file_name}: {e}");
                        None
                    }
                }
            } else {
                None
            };
            Some(Attachment { file_name, data })
        }
        None => None,
    };

    ChatMessage {
        message_id: msg.id.0 as i64,
        chat_id: msg.chat.id.0,
        user_id,
        display_name,
        text,
        attachment,
    }
}
