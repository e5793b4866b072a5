//! Chat texts. Everything returned here is meant for `ParseMode::Html`.

use chrono::NaiveDate;
use teloxide::utils::html::escape;

use crate::quiz::{option_letter, QuizItem, Verdict};
use crate::ranking::RankedVideo;
use crate::session::ChecklistItem;

pub const GREETING_TEXT: &str = "안녕하세요! 저는 공부 도우미 봇이에요. 🎓\n\
유튜브에서 공부할 영상을 찾아 주고, 자막을 요약하고, 요약으로 퀴즈를 만들어 드려요.\n\
메모와 날짜별 체크리스트도 기록할 수 있어요.";

/// 1234567 -> "1,234,567"
pub fn group_digits(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

/// "3" -> Some(2), and with a prefix "🗑 3" -> Some(2). Numbers are 1-based.
pub fn parse_numbered(text: &str, prefix: &str) -> Option<usize> {
    let n: usize = text.trim().strip_prefix(prefix)?.trim().parse().ok()?;
    n.checked_sub(1)
}

pub fn search_results(query: &str, results: &[RankedVideo]) -> String {
    let mut text = format!("<b>검색 결과 (추천 순)</b> · {}\n", escape(query));
    for (idx, ranked) in results.iter().enumerate() {
        text.push_str(&format!(
            "\n{}. {} ({}회)\n    {} · 점수 {:.2}",
            idx + 1,
            escape(&ranked.video.title),
            group_digits(ranked.video.view_count),
            escape(&ranked.video.channel_title),
            ranked.score
        ));
    }
    text.push_str("\n\n볼 영상의 번호를 골라 주세요.");
    text
}

pub fn video_card(ranked: &RankedVideo) -> String {
    let video = &ranked.video;
    format!(
        "<b>제목:</b> {}\n채널: {} • 조회수: {}회\n{}",
        escape(&video.title),
        escape(&video.channel_title),
        group_digits(video.view_count),
        video.watch_url()
    )
}

pub fn summary(summary: &str) -> String {
    format!("<b>AI 요약 결과</b>\n\n{}", escape(summary))
}

pub fn question(number: usize, total: usize, item: &QuizItem) -> String {
    let mut text = format!(
        "<b>문제 {}/{}.</b> {}\n",
        number,
        total,
        escape(&item.question)
    );
    for option in item.labelled_options() {
        text.push('\n');
        text.push_str(&escape(&option));
    }
    text
}

pub fn verdict(item: &QuizItem, verdict: Verdict) -> String {
    let mut text = match verdict {
        Verdict::Correct => "✅ 정답입니다!".to_string(),
        Verdict::Incorrect { correct_index } => format!(
            "❌ 오답입니다.\n<b>정답:</b> {}. {}",
            option_letter(correct_index),
            escape(item.correct_option().unwrap_or_default())
        ),
        Verdict::UnknownAnswer => "⚠️ 정답 정보를 제대로 불러오지 못했습니다.".to_string(),
    };
    if !item.explanation.trim().is_empty() {
        text.push_str(&format!("\n<b>해설:</b> {}", escape(&item.explanation)));
    }
    text
}

pub fn quiz_finished(score: u32, total: usize) -> String {
    format!(
        "퀴즈가 끝났어요! 정답률: {}/{} 문제 정답\n다음에는 무엇을 할까요?",
        score, total
    )
}

pub fn saved_videos(videos: &[RankedVideo]) -> String {
    if videos.is_empty() {
        return "아직 저장된 영상이 없습니다. 영상을 선택하고 '저장' 버튼을 눌러 보세요.".to_string();
    }
    let mut text = format!("총 <b>{}개</b>의 영상이 저장되어 있습니다.\n", videos.len());
    for (idx, ranked) in videos.iter().enumerate() {
        text.push_str(&format!(
            "\n{}. <b>{}</b>\n    채널: {} • 조회수: {}회",
            idx + 1,
            escape(&ranked.video.title),
            escape(&ranked.video.channel_title),
            group_digits(ranked.video.view_count)
        ));
    }
    text
}

pub fn memo(memo: &str) -> String {
    if memo.trim().is_empty() {
        "<b>📝 학습 메모</b>\n\n(비어 있음)\n\n공부하면서 떠오르는 내용을 보내 주시면 메모로 저장해 둘게요."
            .to_string()
    } else {
        format!(
            "<b>📝 학습 메모</b>\n\n{}\n\n새 메시지를 보내면 메모가 바뀝니다.",
            escape(memo)
        )
    }
}

pub fn checklist(date: NaiveDate, rows: &[ChecklistItem]) -> String {
    let mut text = format!("<b>📍 {} 체크리스트</b>\n", date.format("%Y-%m-%d"));
    for (idx, row) in rows.iter().enumerate() {
        let mark = if row.done { "✅" } else { "⬜" };
        let task = if row.text.is_empty() {
            "-".to_string()
        } else {
            escape(&row.text)
        };
        text.push_str(&format!("\n{} {}. {}", mark, idx + 1, task));
    }
    text.push_str(
        "\n\n할 일을 보내면 추가되고, 번호 버튼을 누르면 완료 표시가 바뀝니다.\n\
다른 날짜는 YYYY-MM-DD 형식으로 보내 주세요.",
    );
    text
}
