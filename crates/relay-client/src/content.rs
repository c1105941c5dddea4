//! Study content generation on top of [`AiService`]

use relay_core::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::ClientError;
use crate::parse::split_dual_sections;
use crate::quota::UsageClass;
use crate::service::AiService;

/// Requests above this many questions are split into batches
const SINGLE_CALL_QUESTIONS: usize = 30;
const QUESTION_BATCH_SIZE: usize = 20;
const CHAPTER_COUNT: usize = 15;

const CHAPTER_SYSTEM_PROMPT: &str =
    "You are a helpful educational assistant. You MUST return strictly valid JSON array. Do not wrap in markdown block.";
const QUESTION_SYSTEM_PROMPT: &str =
    "You are an exam generator. You MUST return strict valid JSON array only.";
const NOTES_SYSTEM_PROMPT: &str = "You are an expert teacher.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Result of a dual generation: long-form notes plus an optional summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualNotes {
    pub premium: String,
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChapterItem {
    title: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Clone)]
pub struct ContentGenerator {
    service: AiService,
    instruction: Option<String>,
}

impl ContentGenerator {
    pub fn new(service: AiService) -> Self {
        Self {
            service,
            instruction: None,
        }
    }

    /// Extra instruction prepended to every generation prompt
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    fn prompt(&self, body: &str) -> String {
        match &self.instruction {
            Some(i) => format!("IMPORTANT INSTRUCTION: {}\n{}", i, body),
            None => body.to_string(),
        }
    }

    /// Chapter list for a course subject. Never fails: any error yields two
    /// placeholder chapters.
    pub async fn list_chapters(&self, course: &str, subject: &str) -> Vec<Chapter> {
        let prompt = format!(
            "List {} standard chapters for {} Subject: {}. Return JSON array: [{{\"title\": \"...\", \"description\": \"...\"}}].",
            CHAPTER_COUNT, course, subject
        );
        let messages = vec![Message::system(CHAPTER_SYSTEM_PROMPT), Message::user(prompt)];

        let result = self
            .service
            .ask_json::<Vec<ChapterItem>>(messages, UsageClass::Student)
            .await;

        match result {
            Ok(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| Chapter {
                    id: format!("ch-{}", i + 1),
                    title: item.title,
                    description: item.description.unwrap_or_default(),
                })
                .collect(),
            Err(e) => {
                warn!("Chapter listing failed, using placeholders: {}", e);
                placeholder_chapters()
            }
        }
    }

    /// `count` practice questions on `topic`, as raw JSON items.
    ///
    /// Large requests fan out in batches through the bulk engine; failed
    /// batches are dropped, so fewer than `count` items may come back.
    pub async fn generate_questions(
        &self,
        subject: &str,
        topic: &str,
        count: usize,
        class: UsageClass,
    ) -> Result<Vec<Value>, ClientError> {
        let prompt = self.prompt(&format!(
            "Create {} MCQs for {}, Chapter: \"{}\".",
            count, subject, topic
        ));

        let mut items: Vec<Value> = if count > SINGLE_CALL_QUESTIONS {
            let batches = count.div_ceil(QUESTION_BATCH_SIZE);
            info!("Generating {} questions in {} batches", count, batches);
            let tasks: Vec<_> = (0..batches)
                .map(|i| {
                    let messages = vec![
                        Message::system(QUESTION_SYSTEM_PROMPT),
                        Message::user(format!("{} BATCH {}", prompt, i + 1)),
                    ];
                    let service = &self.service;
                    move || async move { service.ask_json::<Vec<Value>>(messages, class).await }
                })
                .collect();
            self.service.bulk(tasks).await.into_iter().flatten().collect()
        } else {
            let messages = vec![Message::system(QUESTION_SYSTEM_PROMPT), Message::user(prompt)];
            self.service.ask_json(messages, class).await?
        };

        items.truncate(count);
        Ok(items)
    }

    /// Notes on `topic`; `detailed` selects deep-dive over summary notes
    pub async fn generate_notes<C>(
        &self,
        topic: &str,
        detailed: bool,
        class: UsageClass,
        on_chunk: C,
    ) -> Result<String, ClientError>
    where
        C: FnMut(&str),
    {
        let body = if detailed {
            format!("Write PREMIUM DEEP DIVE NOTES for {}", topic)
        } else {
            format!("Write SHORT SUMMARY NOTES for {}", topic)
        };
        let messages = vec![
            Message::system(NOTES_SYSTEM_PROMPT),
            Message::user(self.prompt(&body)),
        ];
        self.service.ask_streaming(messages, class, on_chunk).await
    }

    /// Long-form notes and a summary from one generation
    pub async fn generate_dual_notes(
        &self,
        topic: &str,
        class: UsageClass,
    ) -> Result<DualNotes, ClientError> {
        let prompt = self.prompt(&format!(
            "Generate Premium & Free Notes for {} in format <<<PREMIUM>>> ... <<<SUMMARY>>> ...",
            topic
        ));
        let text = self.service.ask(vec![Message::user(prompt)], class).await?;
        let sections = split_dual_sections(&text);
        Ok(DualNotes {
            premium: sections.primary,
            summary: sections.summary,
        })
    }

    /// Translate `content` (plain text or a JSON document) into `language`
    pub async fn translate(
        &self,
        content: &str,
        language: &str,
        is_json: bool,
        class: UsageClass,
    ) -> Result<String, ClientError> {
        let kind = if is_json { "JSON Data" } else { "Educational Content" };
        let prompt = format!(
            "You are an expert translator. Translate the following {} into {}. \
             Keep technical terms recognisable. Simple tone.\nCONTENT:\n{}",
            kind, language, content
        );
        self.service.ask(vec![Message::user(prompt)], class).await
    }
}

fn placeholder_chapters() -> Vec<Chapter> {
    (1..=2)
        .map(|i| Chapter {
            id: i.to_string(),
            title: format!("Chapter {}", i),
            description: String::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::{ScriptedBackend, fast_service};
    use relay_core::ChatCompletion;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_list_chapters_parses_fenced_json() {
        let backend = Arc::new(ScriptedBackend::answering(
            "```json\n[{\"title\": \"Motion\", \"description\": \"Kinematics\"}, {\"title\": \"Force\"}]\n```",
        ));
        let generator = ContentGenerator::new(fast_service(backend));
        let chapters = generator.list_chapters("Class 9", "Physics").await;
        assert_eq!(
            chapters,
            vec![
                Chapter {
                    id: "ch-1".into(),
                    title: "Motion".into(),
                    description: "Kinematics".into()
                },
                Chapter {
                    id: "ch-2".into(),
                    title: "Force".into(),
                    description: String::new()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_list_chapters_degrades_on_bad_output() {
        let backend = Arc::new(ScriptedBackend::answering("I cannot help with that"));
        let generator = ContentGenerator::new(fast_service(backend));
        let chapters = generator.list_chapters("Class 9", "Physics").await;
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, "Chapter 1");
    }

    #[tokio::test]
    async fn test_small_question_request_is_one_call() {
        let backend = Arc::new(ScriptedBackend::answering("[{\"q\": 1}, {\"q\": 2}, {\"q\": 3}]"));
        let generator = ContentGenerator::new(fast_service(backend.clone()));
        let items = generator
            .generate_questions("Physics", "Motion", 2, UsageClass::Student)
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_large_question_request_fans_out() {
        let batch: Vec<Value> = (0..20).map(|i| serde_json::json!({"q": i})).collect();
        let backend = Arc::new(ScriptedBackend::answering(
            &serde_json::to_string(&batch).unwrap(),
        ));
        let generator = ContentGenerator::new(fast_service(backend.clone()));
        let items = generator
            .generate_questions("Physics", "Motion", 45, UsageClass::Pilot)
            .await
            .unwrap();
        assert_eq!(backend.call_count(), 3);
        assert_eq!(items.len(), 45);

        let prompts: Vec<String> = backend
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.messages[1].content.clone())
            .collect();
        assert!(prompts.iter().any(|p| p.ends_with("BATCH 3")));
    }

    #[tokio::test]
    async fn test_dual_notes_split() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push(Ok(ChatCompletion::from_text(
            "<<<PREMIUM>>> Long notes <<<SUMMARY>>> Short notes",
        )));
        let generator =
            ContentGenerator::new(fast_service(backend)).with_instruction("Use SI units");
        let notes = generator.generate_dual_notes("Motion", UsageClass::Student).await.unwrap();
        assert_eq!(notes.premium, "Long notes");
        assert_eq!(notes.summary.as_deref(), Some("Short notes"));
    }

    #[tokio::test]
    async fn test_generate_notes_prepends_instruction() {
        let backend = Arc::new(ScriptedBackend::answering("notes"));
        let generator =
            ContentGenerator::new(fast_service(backend.clone())).with_instruction("Be brief");
        let mut streamed = String::new();
        generator
            .generate_notes("Optics", true, UsageClass::Student, |c| streamed.push_str(c))
            .await
            .unwrap();
        assert_eq!(streamed, "notes");
        let sent = backend.requests.lock().unwrap()[0].messages[1].content.clone();
        assert!(sent.starts_with("IMPORTANT INSTRUCTION: Be brief"));
        assert!(sent.contains("PREMIUM DEEP DIVE NOTES for Optics"));
    }

    #[tokio::test]
    async fn test_translate_prompt_mentions_language() {
        let backend = Arc::new(ScriptedBackend::answering("नमस्ते"));
        let generator = ContentGenerator::new(fast_service(backend.clone()));
        let out = generator
            .translate("Hello", "Hindi", false, UsageClass::Student)
            .await
            .unwrap();
        assert_eq!(out, "नमस्ते");
        let sent = backend.requests.lock().unwrap()[0].messages[0].content.clone();
        assert!(sent.contains("into Hindi"));
    }
}
