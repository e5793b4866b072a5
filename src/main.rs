mod config;
mod llm;
mod messages;
mod quiz;
mod ranking;
mod session;
mod youtube;

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use config::{Config, LlmBackend};
use dotenv::dotenv;
use llm::{chatgpt::ChatGptBackend, llama::LlamaServer, TextGenerator};
use log::{error, info, warn};
use quiz::{assistant::StudyAssistant, parse_choice, QuizRun};
use ranking::RankedVideo;
use session::{SaveOutcome, StudySession};
use teloxide::{
    dispatching::dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage},
    prelude::*,
    types::{ChatAction, InputFile, KeyboardButton, KeyboardMarkup, ParseMode},
};
use youtube::{transcript::TranscriptFetcher, YouTubeClient};

type StudyDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type SessionStorage = Arc<ErasedStorage<State>>;

#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    Menu {
        session: StudySession,
    },
    ReceiveSearchQuery {
        session: StudySession,
    },
    ReceiveVideoChoice {
        session: StudySession,
        results: Vec<RankedVideo>,
    },
    StudyVideo {
        session: StudySession,
    },
    Quiz {
        session: StudySession,
        run: QuizRun,
    },
    SavedVideos {
        session: StudySession,
    },
    ReceiveMemo {
        session: StudySession,
    },
    Checklist {
        session: StudySession,
        date: NaiveDate,
    },
}

/// Long-lived clients shared by every chat.
pub struct Services {
    youtube: YouTubeClient,
    transcripts: TranscriptFetcher,
    assistant: StudyAssistant,
    config: Config,
}

#[tokio::main]
async fn main() {
    let dotenv_result = dotenv();

    pretty_env_logger::init();
    info!("Starting study buddy bot...");
    if let Err(err) = dotenv_result {
        warn!("No .env file loaded: {}", err);
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("Invalid configuration: {}", err);
            std::process::exit(1);
        }
    };
    if config.youtube_api_key.is_none() {
        warn!("YOUTUBE_API_KEY is not set, searches will fail");
    }

    let bot = Bot::from_env();

    info!("Opening dialogue storage at {}", config.database_path);
    let storage: SessionStorage = match SqliteStorage::open(&config.database_path, Json).await {
        Ok(storage) => storage.erase(),
        Err(err) => {
            error!("Could not open {}: {}", config.database_path, err);
            std::process::exit(1);
        }
    };

    let generator: Arc<dyn TextGenerator> = match &config.llm {
        LlmBackend::Llama { server_url } => {
            Arc::new(LlamaServer::new(server_url.clone(), config.inference_timeout))
        }
        LlmBackend::ChatGpt { api_key, model } => Arc::new(ChatGptBackend::new(
            api_key.clone(),
            model,
            config.inference_timeout,
        )),
    };
    info!("Using {} for summaries and quizzes", generator.name());

    let transcripts = match TranscriptFetcher::new() {
        Ok(transcripts) => transcripts,
        Err(err) => {
            error!("Could not set up the transcript client: {}", err);
            std::process::exit(1);
        }
    };

    let services = Arc::new(Services {
        youtube: YouTubeClient::new(config.youtube_api_key.clone()),
        transcripts,
        assistant: StudyAssistant::new(
            generator,
            config.quiz_language.clone(),
            config.inference_timeout,
        ),
        config,
    });

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, ErasedStorage<State>, State>()
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::Menu { session }].endpoint(menu))
            .branch(
                dptree::case![State::ReceiveSearchQuery { session }]
                    .endpoint(receive_search_query),
            )
            .branch(
                dptree::case![State::ReceiveVideoChoice { session, results }]
                    .endpoint(receive_video_choice),
            )
            .branch(dptree::case![State::StudyVideo { session }].endpoint(study_video))
            .branch(dptree::case![State::Quiz { session, run }].endpoint(quiz))
            .branch(dptree::case![State::SavedVideos { session }].endpoint(saved_videos))
            .branch(dptree::case![State::ReceiveMemo { session }].endpoint(receive_memo))
            .branch(dptree::case![State::Checklist { session, date }].endpoint(checklist)),
    )
    .dependencies(dptree::deps![storage, services])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;
}

const SEARCH: &str = "🔎 영상 검색";
const SAVED: &str = "🔖 저장한 영상";
const MEMO: &str = "📝 학습 메모";
const CHECKLIST: &str = "📍 공부 기록";
const CURRENT_VIDEO: &str = "▶ 선택한 영상";
const TAKE_QUIZ: &str = "❓ 퀴즈 풀기";
const NEW_QUIZ: &str = "🔄 새 퀴즈 만들기";
const SAVE_VIDEO: &str = "🔖 저장";
const EXPORT_MEMO: &str = "💾 .txt로 저장";
const BACK: &str = "⬅ 메뉴로";
const OPEN_PREFIX: &str = "▶";
const DELETE_PREFIX: &str = "🗑";
const TOGGLE_PREFIX: &str = "✔";
const SKIP: &str = "다음 문제";

fn keyboard(rows: Vec<Vec<String>>) -> KeyboardMarkup {
    KeyboardMarkup::new(
        rows.into_iter()
            .map(|row| row.into_iter().map(KeyboardButton::new).collect::<Vec<_>>())
            .collect::<Vec<_>>(),
    )
    .resize_keyboard(true)
}

fn menu_keyboard(session: &StudySession) -> KeyboardMarkup {
    let mut rows = vec![
        vec![SEARCH.to_string(), SAVED.to_string()],
        vec![MEMO.to_string(), CHECKLIST.to_string()],
    ];
    if session.selected.is_some() {
        rows.insert(0, vec![CURRENT_VIDEO.to_string()]);
    }
    keyboard(rows)
}

fn video_keyboard() -> KeyboardMarkup {
    keyboard(vec![
        vec![TAKE_QUIZ.to_string(), NEW_QUIZ.to_string()],
        vec![SAVE_VIDEO.to_string(), BACK.to_string()],
    ])
}

fn back_keyboard() -> KeyboardMarkup {
    keyboard(vec![vec![BACK.to_string()]])
}

fn numbered_keyboard(prefix: &str, count: usize) -> Vec<Vec<String>> {
    let labels = (1..=count)
        .map(|n| {
            if prefix.is_empty() {
                n.to_string()
            } else {
                format!("{} {}", prefix, n)
            }
        })
        .collect::<Vec<_>>();
    labels.chunks(5).map(|row| row.to_vec()).collect()
}

async fn show_menu(
    bot: &Bot,
    dialogue: &StudyDialogue,
    session: StudySession,
    chat_id: ChatId,
    text: &str,
) -> HandlerResult {
    bot.send_message(chat_id, text)
        .reply_markup(menu_keyboard(&session))
        .await?;
    dialogue.update(State::Menu { session }).await?;
    Ok(())
}

async fn start(bot: Bot, dialogue: StudyDialogue, msg: Message) -> HandlerResult {
    info!("New chat {}", msg.chat.id);
    bot.send_message(msg.chat.id, messages::GREETING_TEXT).await?;
    show_menu(
        &bot,
        &dialogue,
        StudySession::default(),
        msg.chat.id,
        "무엇을 해 볼까요?",
    )
    .await
}

async fn menu(
    bot: Bot,
    dialogue: StudyDialogue,
    session: StudySession,
    msg: Message,
    services: Arc<Services>,
) -> HandlerResult {
    match msg.text() {
        Some(SEARCH) => {
            bot.send_message(msg.chat.id, "검색어를 입력해 주세요. (예: 광합성)")
                .reply_markup(back_keyboard())
                .await?;
            dialogue.update(State::ReceiveSearchQuery { session }).await?;
        }
        Some(SAVED) => {
            send_saved_videos(&bot, msg.chat.id, &session).await?;
            dialogue.update(State::SavedVideos { session }).await?;
        }
        Some(MEMO) => {
            bot.send_message(msg.chat.id, messages::memo(&session.memo))
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboard(vec![vec![EXPORT_MEMO.to_string(), BACK.to_string()]]))
                .await?;
            dialogue.update(State::ReceiveMemo { session }).await?;
        }
        Some(CHECKLIST) => {
            let date = Local::now().date_naive();
            show_checklist(&bot, &dialogue, session, msg.chat.id, date).await?;
        }
        Some(CURRENT_VIDEO) if session.selected.is_some() => {
            open_video(&bot, &dialogue, session, msg.chat.id, &services).await?;
        }
        _ => {
            show_menu(
                &bot,
                &dialogue,
                session,
                msg.chat.id,
                "아래 메뉴 중 하나를 선택해 주세요.",
            )
            .await?;
        }
    }
    Ok(())
}

async fn receive_search_query(
    bot: Bot,
    dialogue: StudyDialogue,
    mut session: StudySession,
    msg: Message,
    services: Arc<Services>,
) -> HandlerResult {
    let query = match msg.text().map(str::trim) {
        Some(BACK) => return show_menu(&bot, &dialogue, session, msg.chat.id, "메뉴로 돌아왔어요.").await,
        Some(query) if !query.is_empty() => query.to_string(),
        _ => {
            bot.send_message(msg.chat.id, "검색어를 텍스트로 입력해 주세요.")
                .await?;
            return Ok(());
        }
    };

    let _ = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await;

    let results = match services
        .youtube
        .search_videos(&query, services.config.search_max_results)
        .await
    {
        Ok(results) => results,
        Err(err) => {
            error!("Search for {:?} failed: {}", query, err);
            return show_menu(
                &bot,
                &dialogue,
                session,
                msg.chat.id,
                &format!("영상 검색 중 오류가 발생했습니다: {}", err),
            )
            .await;
        }
    };

    if results.is_empty() {
        bot.send_message(msg.chat.id, "검색 결과가 없습니다. 다른 검색어를 입력해 주세요.")
            .await?;
        return Ok(());
    }

    // A new search starts over
    session.clear_selection();

    let mut rows = numbered_keyboard("", results.len());
    rows.push(vec![BACK.to_string()]);
    bot.send_message(msg.chat.id, messages::search_results(&query, &results))
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard(rows))
        .await?;

    dialogue
        .update(State::ReceiveVideoChoice { session, results })
        .await?;
    Ok(())
}

async fn receive_video_choice(
    bot: Bot,
    dialogue: StudyDialogue,
    (mut session, results): (StudySession, Vec<RankedVideo>),
    msg: Message,
    services: Arc<Services>,
) -> HandlerResult {
    let text = msg.text().unwrap_or_default();
    if text == BACK {
        return show_menu(&bot, &dialogue, session, msg.chat.id, "메뉴로 돌아왔어요.").await;
    }

    let Some(video) = messages::parse_numbered(text, "").and_then(|idx| results.get(idx)) else {
        bot.send_message(
            msg.chat.id,
            format!("1부터 {} 사이의 번호를 골라 주세요.", results.len()),
        )
        .await?;
        return Ok(());
    };

    info!("Chat {} selected video {}", msg.chat.id, video.video.video_id);
    session.select_video(video.clone());
    open_video(&bot, &dialogue, session, msg.chat.id, &services).await
}

/// Shows the selected video, fetching its transcript and summary on first view.
async fn open_video(
    bot: &Bot,
    dialogue: &StudyDialogue,
    mut session: StudySession,
    chat_id: ChatId,
    services: &Services,
) -> HandlerResult {
    let Some(selected) = session.selected.as_mut() else {
        return show_menu(bot, dialogue, session, chat_id, "먼저 영상을 검색해서 선택해 주세요.").await;
    };

    bot.send_message(chat_id, messages::video_card(&selected.video))
        .parse_mode(ParseMode::Html)
        .await?;

    if selected.transcript.is_none() {
        let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;
        match services
            .transcripts
            .fetch(&selected.video.video.video_id, &services.config.transcript_language)
            .await
        {
            Ok(transcript) => selected.transcript = Some(transcript.plain_text()),
            Err(err) => {
                warn!("No transcript for {}: {}", selected.video.video.video_id, err);
                bot.send_message(chat_id, format!("자막을 가져오는 중 오류 발생: {}", err))
                    .await?;
            }
        }
    }

    if selected.summary.is_none() {
        if let Some(transcript) = &selected.transcript {
            let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;
            match services.assistant.summarize(transcript).await {
                Ok(summary) if !summary.is_empty() => selected.summary = Some(summary),
                Ok(_) => {
                    bot.send_message(chat_id, "요약 생성에 실패했습니다. 다시 시도해 주세요.")
                        .await?;
                }
                Err(err) => {
                    error!("Summary failed: {}", err);
                    bot.send_message(chat_id, format!("AI 요약 생성 중 오류가 발생했습니다: {}", err))
                        .await?;
                }
            }
        }
    }

    if let Some(summary) = &selected.summary {
        bot.send_message(chat_id, messages::summary(summary))
            .parse_mode(ParseMode::Html)
            .await?;
    }

    bot.send_message(chat_id, "무엇을 할까요?")
        .reply_markup(video_keyboard())
        .await?;
    dialogue.update(State::StudyVideo { session }).await?;
    Ok(())
}

async fn study_video(
    bot: Bot,
    dialogue: StudyDialogue,
    mut session: StudySession,
    msg: Message,
    services: Arc<Services>,
) -> HandlerResult {
    match msg.text() {
        Some(TAKE_QUIZ) => start_quiz(&bot, &dialogue, session, msg.chat.id, &services, false).await,
        Some(NEW_QUIZ) => start_quiz(&bot, &dialogue, session, msg.chat.id, &services, true).await,
        Some(SAVE_VIDEO) => {
            let reply = match session.save_selected() {
                SaveOutcome::Saved => "저장되었습니다. ℹ️",
                SaveOutcome::AlreadySaved => "이미 저장된 영상입니다. ⚠️",
                SaveOutcome::NothingSelected => "선택한 영상이 없습니다.",
            };
            bot.send_message(msg.chat.id, reply)
                .reply_markup(video_keyboard())
                .await?;
            dialogue.update(State::StudyVideo { session }).await?;
            Ok(())
        }
        Some(BACK) => show_menu(&bot, &dialogue, session, msg.chat.id, "메뉴로 돌아왔어요.").await,
        _ => {
            bot.send_message(msg.chat.id, "아래 버튼 중 하나를 선택해 주세요.")
                .reply_markup(video_keyboard())
                .await?;
            Ok(())
        }
    }
}

async fn start_quiz(
    bot: &Bot,
    dialogue: &StudyDialogue,
    mut session: StudySession,
    chat_id: ChatId,
    services: &Services,
    force_new: bool,
) -> HandlerResult {
    let Some(selected) = session.selected.as_mut() else {
        return show_menu(bot, dialogue, session, chat_id, "먼저 영상을 검색해서 선택해 주세요.").await;
    };
    let Some(summary) = selected.summary.clone() else {
        bot.send_message(chat_id, "자막을 먼저 불러온 뒤 요약을 생성해야 퀴즈를 만들 수 있어요.")
            .reply_markup(video_keyboard())
            .await?;
        return Ok(());
    };

    let cached = if force_new {
        None
    } else {
        selected.cached_quiz().map(<[_]>::to_vec)
    };
    let items = match cached {
        Some(items) => items,
        None => {
            let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;
            match services
                .assistant
                .generate_quiz(&summary, services.config.quiz_questions)
                .await
            {
                Ok(items) => {
                    selected.remember_quiz(&summary, items.clone());
                    items
                }
                Err(err) => {
                    error!("Quiz generation failed: {}", err);
                    bot.send_message(chat_id, format!("퀴즈 생성 중 오류가 발생했습니다: {}", err))
                        .reply_markup(video_keyboard())
                        .await?;
                    dialogue.update(State::StudyVideo { session }).await?;
                    return Ok(());
                }
            }
        }
    };

    if items.is_empty() {
        bot.send_message(chat_id, "퀴즈를 생성하지 못했습니다. 다시 시도해 주세요.")
            .reply_markup(keyboard(vec![vec![NEW_QUIZ.to_string(), BACK.to_string()]]))
            .await?;
        dialogue.update(State::StudyVideo { session }).await?;
        return Ok(());
    }

    let run = QuizRun::new(items, summary);
    send_question(bot, chat_id, &run).await?;
    dialogue.update(State::Quiz { session, run }).await?;
    Ok(())
}

async fn send_question(bot: &Bot, chat_id: ChatId, run: &QuizRun) -> HandlerResult {
    let Some(item) = run.current() else {
        return Ok(());
    };

    let mut rows = item
        .labelled_options()
        .into_iter()
        .map(|option| vec![option])
        .collect::<Vec<_>>();
    if rows.is_empty() {
        rows.push(vec![SKIP.to_string()]);
    }
    rows.push(vec![BACK.to_string()]);

    bot.send_message(
        chat_id,
        messages::question(run.current_question + 1, run.items.len(), item),
    )
    .parse_mode(ParseMode::Html)
    .reply_markup(keyboard(rows))
    .await?;
    Ok(())
}

async fn quiz(
    bot: Bot,
    dialogue: StudyDialogue,
    (session, mut run): (StudySession, QuizRun),
    msg: Message,
) -> HandlerResult {
    let text = msg.text().unwrap_or_default();
    if text == BACK {
        return show_menu(&bot, &dialogue, session, msg.chat.id, "퀴즈를 그만두고 메뉴로 돌아왔어요.").await;
    }

    let Some(item) = run.current().cloned() else {
        bot.send_message(msg.chat.id, messages::quiz_finished(run.score, run.items.len()))
            .reply_markup(video_keyboard())
            .await?;
        dialogue.update(State::StudyVideo { session }).await?;
        return Ok(());
    };

    // A question without options can't be answered, any reply moves on
    let choice = if item.options.is_empty() {
        Some(0)
    } else {
        parse_choice(text, item.options.len())
    };
    let Some(verdict) = choice.and_then(|choice| run.answer(choice)) else {
        bot.send_message(msg.chat.id, "보기 중에서 하나를 골라 주세요.")
            .await?;
        return Ok(());
    };

    bot.send_message(msg.chat.id, messages::verdict(&item, verdict))
        .parse_mode(ParseMode::Html)
        .await?;

    if run.is_finished() {
        info!(
            "Chat {} finished a quiz with {}/{}",
            msg.chat.id,
            run.score,
            run.items.len()
        );
        bot.send_message(msg.chat.id, messages::quiz_finished(run.score, run.items.len()))
            .reply_markup(video_keyboard())
            .await?;
        dialogue.update(State::StudyVideo { session }).await?;
        return Ok(());
    }

    send_question(&bot, msg.chat.id, &run).await?;
    dialogue.update(State::Quiz { session, run }).await?;
    Ok(())
}

async fn send_saved_videos(bot: &Bot, chat_id: ChatId, session: &StudySession) -> HandlerResult {
    let count = session.saved_videos.len();
    let mut rows = numbered_keyboard(OPEN_PREFIX, count);
    rows.extend(numbered_keyboard(DELETE_PREFIX, count));
    rows.push(vec![BACK.to_string()]);

    bot.send_message(chat_id, messages::saved_videos(&session.saved_videos))
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard(rows))
        .await?;
    Ok(())
}

async fn saved_videos(
    bot: Bot,
    dialogue: StudyDialogue,
    mut session: StudySession,
    msg: Message,
    services: Arc<Services>,
) -> HandlerResult {
    let text = msg.text().unwrap_or_default();
    if text == BACK {
        return show_menu(&bot, &dialogue, session, msg.chat.id, "메뉴로 돌아왔어요.").await;
    }

    if let Some(idx) = messages::parse_numbered(text, OPEN_PREFIX) {
        if session.open_saved(idx) {
            return open_video(&bot, &dialogue, session, msg.chat.id, &services).await;
        }
    } else if let Some(idx) = messages::parse_numbered(text, DELETE_PREFIX) {
        if let Some(removed) = session.remove_saved(idx) {
            bot.send_message(
                msg.chat.id,
                format!("'{}' 영상을 삭제했습니다.", removed.video.title),
            )
            .await?;
            send_saved_videos(&bot, msg.chat.id, &session).await?;
            dialogue.update(State::SavedVideos { session }).await?;
            return Ok(());
        }
    }

    bot.send_message(msg.chat.id, "목록에 있는 번호 버튼을 눌러 주세요.")
        .await?;
    Ok(())
}

async fn receive_memo(
    bot: Bot,
    dialogue: StudyDialogue,
    mut session: StudySession,
    msg: Message,
) -> HandlerResult {
    match msg.text() {
        Some(BACK) => show_menu(&bot, &dialogue, session, msg.chat.id, "메뉴로 돌아왔어요.").await,
        Some(EXPORT_MEMO) => {
            match session.memo_export() {
                Some(bytes) => {
                    bot.send_document(
                        msg.chat.id,
                        InputFile::memory(bytes).file_name("study_memo.txt"),
                    )
                    .await?;
                }
                None => {
                    bot.send_message(msg.chat.id, "메모를 입력하면 저장할 수 있어요.")
                        .await?;
                }
            }
            Ok(())
        }
        Some(memo) => {
            session.set_memo(memo);
            bot.send_message(msg.chat.id, "메모를 저장했어요.").await?;
            dialogue.update(State::ReceiveMemo { session }).await?;
            Ok(())
        }
        None => {
            bot.send_message(msg.chat.id, "메모는 텍스트로 보내 주세요.")
                .await?;
            Ok(())
        }
    }
}

async fn show_checklist(
    bot: &Bot,
    dialogue: &StudyDialogue,
    mut session: StudySession,
    chat_id: ChatId,
    date: NaiveDate,
) -> HandlerResult {
    let rows = session.checklist(date);
    let text = messages::checklist(date, rows);

    let mut buttons = numbered_keyboard(TOGGLE_PREFIX, rows.len());
    buttons.push(vec![BACK.to_string()]);

    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard(buttons))
        .await?;
    dialogue.update(State::Checklist { session, date }).await?;
    Ok(())
}

async fn checklist(
    bot: Bot,
    dialogue: StudyDialogue,
    (mut session, date): (StudySession, NaiveDate),
    msg: Message,
) -> HandlerResult {
    let Some(text) = msg.text().map(str::trim) else {
        bot.send_message(msg.chat.id, "할 일은 텍스트로 보내 주세요.")
            .await?;
        return Ok(());
    };

    if text == BACK {
        return show_menu(&bot, &dialogue, session, msg.chat.id, "메뉴로 돌아왔어요.").await;
    }

    if let Ok(other_date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return show_checklist(&bot, &dialogue, session, msg.chat.id, other_date).await;
    }

    if let Some(idx) = messages::parse_numbered(text, TOGGLE_PREFIX) {
        if session.toggle_checklist_item(date, idx).is_none() {
            bot.send_message(msg.chat.id, "그 번호의 항목이 없습니다.").await?;
            return Ok(());
        }
    } else if !text.is_empty() {
        session.add_checklist_item(date, text);
    }

    show_checklist(&bot, &dialogue, session, msg.chat.id, date).await
}
