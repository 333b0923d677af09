//! Keyword patterns for the rules tier.
//!
//! Each intent has a small set of weighted regexes. A pattern's weight is
//! added to its intent's score once, however many times it matches.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::Intent;

/// A weighted signal for one intent.
pub struct IntentPattern {
    pub intent: Intent,
    pub weight: f64,
    pub regex: Regex,
}

fn pattern(intent: Intent, weight: f64, re: &str) -> IntentPattern {
    IntentPattern {
        intent,
        weight,
        regex: Regex::new(re).unwrap(),
    }
}

lazy_static! {
    /// Greetings and small talk, matched against the whole normalized text.
    pub static ref GREETING_PATTERN: Regex = Regex::new(
        r"^(hi|hello|hey|thanks|thank you|bye|goodbye|good (morning|afternoon|evening)|how are you)[!.?]*$"
    ).unwrap();

    pub static ref INTENT_PATTERNS: Vec<IntentPattern> = vec![
        // =====================================================================
        // CODE
        // =====================================================================
        pattern(Intent::CodeGeneration, 2.0,
            r"\b(write|implement|create|generate|build)\b.{0,40}\b(function|class|script|program|method|api|endpoint|module|code)\b"),
        pattern(Intent::CodeGeneration, 1.0,
            r"\b(python|rust|javascript|typescript|java|golang|sql|bash)\b"),
        pattern(Intent::CodeGeneration, 0.5, r"```"),

        pattern(Intent::Debugging, 2.0,
            r"\b(debug|fix|bug|error|exception|stack ?trace|traceback|segfault|panic(ked|s)?)\b"),
        pattern(Intent::Debugging, 1.0,
            r"\b(doesn'?t work|not working|fails?|failing|crash(es|ed|ing)?|broken)\b"),

        // =====================================================================
        // DATA & WRITING
        // =====================================================================
        pattern(Intent::DataAnalysis, 2.0,
            r"\b(analy[sz]e|analysis)\b.{0,40}\b(data|dataset|csv|sales|metrics|numbers|trends?)\b"),
        pattern(Intent::DataAnalysis, 1.0,
            r"\b(statistic(s|al)?|correlation|regression|average|median|chart|plot|spreadsheet)\b"),

        pattern(Intent::CreativeWriting, 2.0,
            r"\b(write|compose|tell)\b.{0,30}\b(story|poem|song|lyrics|haiku|novel|fiction|screenplay)\b"),
        pattern(Intent::CreativeWriting, 1.0,
            r"\b(creative|imaginative|fantasy|character|plot twist|rhyme)\b"),

        pattern(Intent::TechnicalWriting, 2.0,
            r"\b(write|draft|create)\b.{0,30}\b(documentation|docs|readme|specification|spec|tutorial|guide|manual)\b"),
        pattern(Intent::TechnicalWriting, 1.0,
            r"\b(api reference|user guide|design doc|technical (report|writing))\b"),

        pattern(Intent::Summarization, 2.0,
            r"\b(summari[sz]e|summary|tl;?dr|condense|recap)\b"),
        pattern(Intent::Summarization, 1.0,
            r"\b(key points|main points|in (a few|three|two) (sentences|bullets))\b"),

        pattern(Intent::Translation, 2.0, r"\btranslat(e|ion|ing)\b"),
        pattern(Intent::Translation, 1.0,
            r"\b(into|to|in) (english|french|spanish|german|italian|portuguese|chinese|japanese|korean|russian|arabic|hindi)\b"),

        // =====================================================================
        // QUESTIONS & REASONING
        // =====================================================================
        pattern(Intent::QuestionAnswering, 1.5,
            r"^(what|who|when|where|which|how (many|much|do|does|is|can)|why is|is there|are there)\b"),
        pattern(Intent::QuestionAnswering, 0.5, r"\?$"),

        pattern(Intent::Reasoning, 2.0,
            r"\b(prove|deduce|reason through|logic puzzle|step by step|solve)\b"),
        pattern(Intent::Reasoning, 1.0,
            r"\b(compare|trade-?offs?|pros and cons|evaluate|should i|implications?)\b"),

        pattern(Intent::Conversation, 1.0,
            r"\b(chat|talk|how('s| is) it going|what'?s up|nice to meet you)\b"),
    ];
}
